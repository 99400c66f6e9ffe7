//! Binary/Unary & Numeric Coercion.
//!
//! Lowers arithmetic/bitwise/compare operators across fixed-width ints,
//! floats, big ints/uints/floats and strings, and performs the implicit
//! numeric coercion required ahead of any binary op.
//!
//! LLVM IR has no dynamic numeric dispatch, so this module must decide
//! the common operand type itself before emitting a single `add`/
//! `fadd`/`icmp` instruction.

use crate::func::FuncEmitter;
use crate::mir::{BinOp, UnOp};
use crate::types::{self, LlvmType, NumericKind};
use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BigKind {
    Int,
    Uint,
    Float,
}

impl BigKind {
    pub(crate) fn prefix(self) -> &'static str {
        match self {
            BigKind::Int => "rt_bigint",
            BigKind::Uint => "rt_biguint",
            BigKind::Float => "rt_bigfloat",
        }
    }
}

/// One side of a coercion decision: either an ordinary LLVM scalar or a
/// big-numeric handle.
#[derive(Debug, Clone)]
pub enum NumericOperand {
    Scalar { value: String, llvm: LlvmType, kind: NumericKind, bits: u32 },
    Big { ptr: String, kind: BigKind },
}

fn big_kind_of(interner: &dyn crate::types::TypeInterner, ty: crate::mir::TypeId) -> Result<Option<BigKind>> {
    if types::is_big_int_type(interner, ty)? {
        Ok(Some(BigKind::Int))
    } else if types::is_big_uint_type(interner, ty)? {
        Ok(Some(BigKind::Uint))
    } else if types::is_big_float_type(interner, ty)? {
        Ok(Some(BigKind::Float))
    } else {
        Ok(None)
    }
}

/// Classify an already-lowered (value, type) pair into a `NumericOperand`.
pub fn classify(
    fe: &FuncEmitter<'_, '_>,
    value: String,
    ty: crate::mir::TypeId,
) -> Result<NumericOperand> {
    let interner = fe.mcx.interner;
    if let Some(big) = big_kind_of(interner, ty)? {
        return Ok(NumericOperand::Big { ptr: value, kind: big });
    }
    let kind = types::numeric_kind_of(interner, ty)?;
    let llvm = types::llvm_type(interner, ty)?;
    let bits = match llvm {
        LlvmType::I8 => 8,
        LlvmType::I16 => 16,
        LlvmType::I32 => 32,
        LlvmType::I64 => 64,
        LlvmType::Half => 16,
        LlvmType::Float => 32,
        LlvmType::Double => 64,
        _ => 0,
    };
    Ok(NumericOperand::Scalar { value, llvm, kind, bits })
}

/// Widens a scalar to a wider scalar of the same numeric kind: widen the
/// smaller fixed-width operand to the larger. Signed/unsigned and
/// int/float distinctions are preserved; cross-kind coercion is out of
/// scope for this helper.
fn widen_scalar(
    fe: &mut FuncEmitter<'_, '_>,
    value: &str,
    from: LlvmType,
    to: LlvmType,
    kind: NumericKind,
) -> String {
    if from == to {
        return value.to_string();
    }
    let temp = fe.fresh_temp_pub();
    let op = match kind {
        NumericKind::Int => "sext",
        NumericKind::Uint => "zext",
        NumericKind::Float => "fpext",
        NumericKind::None => "bitcast",
    };
    fe.push(format!("{temp} = {op} {} {value} to {}", from.text(), to.text()));
    temp
}

/// Casts a scalar up to a big-numeric handle of the matching kind: the
/// non-big side is always cast up to the big side.
fn scalar_to_big(fe: &mut FuncEmitter<'_, '_>, value: &str, llvm: LlvmType, kind: NumericKind, big: BigKind) -> String {
    let temp = fe.fresh_temp_pub();
    match (kind, big) {
        (NumericKind::Int, BigKind::Int) => {
            let v = widen_to_i64(fe, value, llvm, true);
            fe.push(format!("{temp} = call ptr @rt_bigint_from_i64(i64 {v})"));
        }
        (NumericKind::Uint, BigKind::Uint) => {
            let v = widen_to_i64(fe, value, llvm, false);
            fe.push(format!("{temp} = call ptr @rt_biguint_from_u64(i64 {v})"));
        }
        (NumericKind::Float, BigKind::Float) => {
            let v = widen_float_to_double(fe, value, llvm);
            fe.push(format!("{temp} = call ptr @rt_bigfloat_from_f64(double {v})"));
        }
        _ => {
            // Mismatched kinds never reach this helper; coerce_pair only
            // calls it when both sides share a numeric kind.
            fe.push(format!("{temp} = bitcast ptr null to ptr"));
        }
    }
    temp
}

/// Shared with `call.rs`'s `__to<String>`/`exit`/`__len` lowering, which
/// widen a small scalar up to the `i64` the runtime ABI carries it in.
pub(crate) fn widen_to_i64(fe: &mut FuncEmitter<'_, '_>, value: &str, from: LlvmType, signed: bool) -> String {
    if from == LlvmType::I64 {
        return value.to_string();
    }
    let temp = fe.fresh_temp_pub();
    let op = if signed { "sext" } else { "zext" };
    fe.push(format!("{temp} = {op} {} {value} to i64", from.text()));
    temp
}

pub(crate) fn widen_float_to_double(fe: &mut FuncEmitter<'_, '_>, value: &str, from: LlvmType) -> String {
    if from == LlvmType::Double {
        return value.to_string();
    }
    let temp = fe.fresh_temp_pub();
    fe.push(format!("{temp} = fpext {} {value} to double", from.text()));
    temp
}

/// The full numeric coercion decision tree. Returns the pair of
/// operands, now both representable by the same op (either two scalars
/// of equal LLVM type, or two big-numeric handles of the same kind).
pub fn coerce_pair(
    fe: &mut FuncEmitter<'_, '_>,
    lhs: NumericOperand,
    rhs: NumericOperand,
) -> (NumericOperand, NumericOperand) {
    match (&lhs, &rhs) {
        (NumericOperand::Scalar { kind: NumericKind::None, .. }, _)
        | (_, NumericOperand::Scalar { kind: NumericKind::None, .. }) => (lhs, rhs),
        (NumericOperand::Big { kind: bk, .. }, NumericOperand::Scalar { value, llvm, kind, .. }) => {
            if matches_big_kind(*kind, *bk) {
                let big = scalar_to_big(fe, value, *llvm, *kind, *bk);
                (lhs, NumericOperand::Big { ptr: big, kind: *bk })
            } else {
                (lhs, rhs)
            }
        }
        (NumericOperand::Scalar { value, llvm, kind, .. }, NumericOperand::Big { kind: bk, .. }) => {
            if matches_big_kind(*kind, *bk) {
                let big = scalar_to_big(fe, value, *llvm, *kind, *bk);
                (NumericOperand::Big { ptr: big, kind: *bk }, rhs)
            } else {
                (lhs, rhs)
            }
        }
        (NumericOperand::Big { .. }, NumericOperand::Big { .. }) => (lhs, rhs),
        (
            NumericOperand::Scalar { value: lv, llvm: lt, kind: lk, bits: lb },
            NumericOperand::Scalar { value: rv, llvm: rt, kind: rk, bits: rb },
        ) => {
            if lk != rk || lt == rt {
                return (lhs, rhs);
            }
            if lb >= rb {
                let w = widen_scalar(fe, rv, *rt, *lt, *rk);
                (lhs, NumericOperand::Scalar { value: w, llvm: *lt, kind: *rk, bits: *lb })
            } else {
                let w = widen_scalar(fe, lv, *lt, *rt, *lk);
                (NumericOperand::Scalar { value: w, llvm: *rt, kind: *lk, bits: *rb }, rhs)
            }
        }
    }
}

fn matches_big_kind(kind: NumericKind, big: BigKind) -> bool {
    matches!(
        (kind, big),
        (NumericKind::Int, BigKind::Int) | (NumericKind::Uint, BigKind::Uint) | (NumericKind::Float, BigKind::Float)
    )
}

/// Lowers a binary arithmetic/compare/bitwise op once both operands have
/// already been coerced to a common representation. Returns the
/// result's (value, LlvmType).
pub fn lower_binary(
    fe: &mut FuncEmitter<'_, '_>,
    op: BinOp,
    lhs: NumericOperand,
    rhs: NumericOperand,
) -> Result<(String, LlvmType)> {
    match (lhs, rhs) {
        (NumericOperand::Big { ptr: l, kind }, NumericOperand::Big { ptr: r, .. }) => {
            lower_big_binary(fe, op, kind, &l, &r)
        }
        (NumericOperand::Scalar { value: l, llvm, kind, .. }, NumericOperand::Scalar { value: r, .. }) => {
            lower_scalar_binary(fe, op, &l, &r, llvm, kind)
        }
        _ => bail!("coerce_pair must unify both operands before lower_binary is called"),
    }
}

fn lower_big_binary(
    fe: &mut FuncEmitter<'_, '_>,
    op: BinOp,
    kind: BigKind,
    l: &str,
    r: &str,
) -> Result<(String, LlvmType)> {
    let prefix = kind.prefix();
    let temp = fe.fresh_temp_pub();
    let is_cmp = matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge);
    if is_cmp {
        let cmp_temp = fe.fresh_temp_pub();
        fe.push(format!("{cmp_temp} = call i32 @{prefix}_cmp(ptr {l}, ptr {r})"));
        let icmp = match op {
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "slt",
            BinOp::Le => "sle",
            BinOp::Gt => "sgt",
            BinOp::Ge => "sge",
            _ => unreachable!(),
        };
        fe.push(format!("{temp} = icmp {icmp} i32 {cmp_temp}, 0"));
        return Ok((temp, LlvmType::I1));
    }
    if kind == BigKind::Float && matches!(op, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr) {
        bail!("bitwise/shift operators are not defined on big floats");
    }
    let suffix = match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Rem => "mod",
        BinOp::BitAnd => "bit_and",
        BinOp::BitOr => "bit_or",
        BinOp::BitXor => "bit_xor",
        BinOp::Shl => "shl",
        BinOp::Shr => "shr",
        _ => bail!("operator not supported on big numerics"),
    };
    fe.push(format!("{temp} = call ptr @{prefix}_{suffix}(ptr {l}, ptr {r})"));
    Ok((temp, LlvmType::Ptr))
}

fn lower_scalar_binary(
    fe: &mut FuncEmitter<'_, '_>,
    op: BinOp,
    l: &str,
    r: &str,
    llvm: LlvmType,
    kind: NumericKind,
) -> Result<(String, LlvmType)> {
    let ty = llvm.text();
    let temp = fe.fresh_temp_pub();
    if llvm == LlvmType::I1 {
        let opname = match op {
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Eq => "icmp eq",
            BinOp::Ne => "icmp ne",
            _ => bail!("operator {op:?} requires i1 both sides for logical ops"),
        };
        fe.push(format!("{temp} = {opname} i1 {l}, {r}"));
        return Ok((temp, LlvmType::I1));
    }
    match kind {
        NumericKind::Int | NumericKind::Uint => {
            let signed = kind == NumericKind::Int;
            let instr = match op {
                BinOp::Add => "add".to_string(),
                BinOp::Sub => "sub".to_string(),
                BinOp::Mul => "mul".to_string(),
                BinOp::Div => if signed { "sdiv".into() } else { "udiv".into() },
                BinOp::Rem => if signed { "srem".into() } else { "urem".into() },
                BinOp::BitAnd => "and".to_string(),
                BinOp::BitOr => "or".to_string(),
                BinOp::BitXor => "xor".to_string(),
                BinOp::Shl => "shl".to_string(),
                BinOp::Shr => if signed { "ashr".into() } else { "lshr".into() },
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                    let icmp = match (op, signed) {
                        (BinOp::Eq, _) => "eq",
                        (BinOp::Ne, _) => "ne",
                        (BinOp::Lt, true) => "slt",
                        (BinOp::Lt, false) => "ult",
                        (BinOp::Le, true) => "sle",
                        (BinOp::Le, false) => "ule",
                        (BinOp::Gt, true) => "sgt",
                        (BinOp::Gt, false) => "ugt",
                        (BinOp::Ge, true) => "sge",
                        (BinOp::Ge, false) => "uge",
                        _ => unreachable!(),
                    };
                    fe.push(format!("{temp} = icmp {icmp} {ty} {l}, {r}"));
                    return Ok((temp, LlvmType::I1));
                }
                BinOp::And | BinOp::Or => bail!("logical {op:?} requires i1 operands"),
            };
            fe.push(format!("{temp} = {instr} {ty} {l}, {r}"));
            Ok((temp, llvm))
        }
        NumericKind::Float => {
            let instr = match op {
                BinOp::Add => "fadd",
                BinOp::Sub => "fsub",
                BinOp::Mul => "fmul",
                BinOp::Div => "fdiv",
                BinOp::Rem | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
                    bail!("{op:?} is not defined on floats")
                }
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                    let fcmp = match op {
                        BinOp::Eq => "oeq",
                        BinOp::Ne => "one",
                        BinOp::Lt => "olt",
                        BinOp::Le => "ole",
                        BinOp::Gt => "ogt",
                        BinOp::Ge => "oge",
                        _ => unreachable!(),
                    };
                    fe.push(format!("{temp} = fcmp {fcmp} {ty} {l}, {r}"));
                    return Ok((temp, LlvmType::I1));
                }
                BinOp::And | BinOp::Or => bail!("logical {op:?} requires i1 operands"),
            };
            fe.push(format!("{temp} = {instr} {ty} {l}, {r}"));
            Ok((temp, llvm))
        }
        NumericKind::None => {
            // Pointer operands only support eq/ne.
            match op {
                BinOp::Eq => {
                    fe.push(format!("{temp} = icmp eq {ty} {l}, {r}"));
                    Ok((temp, LlvmType::I1))
                }
                BinOp::Ne => {
                    fe.push(format!("{temp} = icmp ne {ty} {l}, {r}"));
                    Ok((temp, LlvmType::I1))
                }
                _ => bail!("pointer operands only support eq/ne comparisons"),
            }
        }
    }
}

/// String binary operators: `+` concatenates, `==`/`!=` compare by
/// value, `*` repeats. Grouped alongside numeric binary lowering even
/// though the operand kind is string rather than numeric.
pub fn lower_string_binary(fe: &mut FuncEmitter<'_, '_>, op: BinOp, l: &str, r: &str) -> Result<(String, LlvmType)> {
    match op {
        BinOp::Add => {
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = call ptr @rt_string_concat(ptr {l}, ptr {r})"));
            Ok((temp, LlvmType::Ptr))
        }
        BinOp::Eq => {
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = call i1 @rt_string_eq(ptr {l}, ptr {r})"));
            Ok((temp, LlvmType::I1))
        }
        BinOp::Ne => {
            let eq = fe.fresh_temp_pub();
            fe.push(format!("{eq} = call i1 @rt_string_eq(ptr {l}, ptr {r})"));
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = xor i1 {eq}, true"));
            Ok((temp, LlvmType::I1))
        }
        _ => bail!("operator {op:?} is not defined on strings"),
    }
}

/// `s * n`: `n` is range-checked (must not be negative; an `i64` source
/// can never exceed `i64::MAX` so only the sign is checked) before being
/// passed to `rt_string_repeat`.
pub fn lower_string_repeat(fe: &mut FuncEmitter<'_, '_>, s: &str, n: &str, n_llvm: LlvmType) -> Result<String> {
    let n64 = if n_llvm == LlvmType::I64 {
        n.to_string()
    } else {
        let temp = fe.fresh_temp_pub();
        fe.push(format!("{temp} = sext {} {n} to i64", n_llvm.text()));
        temp
    };
    let neg = fe.fresh_temp_pub();
    fe.push(format!("{neg} = icmp slt i64 {n64}, 0"));
    let ok_label = fe.fresh_inline_label(Some("repeat_ok"));
    let panic_label = fe.fresh_inline_label(Some("repeat_panic"));
    fe.push(format!("br i1 {neg}, label %{panic_label}, label %{ok_label}"));
    fe.open_label(&panic_label);
    let msg_id = fe.pool.intern("repeat count must not be negative");
    let msg_label = fe.pool.label_for(msg_id);
    let msg_len = fe.pool.get(msg_id).len();
    fe.push(format!("call void @rt_panic_numeric(ptr {msg_label}, i64 {msg_len})"));
    fe.push("unreachable".to_string());
    fe.open_label(&ok_label);
    let temp = fe.fresh_temp_pub();
    fe.push(format!("{temp} = call ptr @rt_string_repeat(ptr {s}, i64 {n64})"));
    Ok(temp)
}

pub fn lower_unary(fe: &mut FuncEmitter<'_, '_>, op: UnOp, operand: NumericOperand) -> Result<(String, LlvmType)> {
    match operand {
        NumericOperand::Big { ptr, kind } => {
            let temp = fe.fresh_temp_pub();
            match op {
                UnOp::Neg => {
                    fe.push(format!("{temp} = call ptr @{}_neg(ptr {ptr})", kind.prefix()));
                    Ok((temp, LlvmType::Ptr))
                }
                UnOp::Not => bail!("logical not is not defined on big numerics"),
            }
        }
        NumericOperand::Scalar { value, llvm, kind, .. } => {
            let temp = fe.fresh_temp_pub();
            match (op, kind) {
                (UnOp::Neg, NumericKind::Int) => {
                    fe.push(format!("{temp} = sub {} 0, {value}", llvm.text()));
                    Ok((temp, llvm))
                }
                (UnOp::Neg, NumericKind::Float) => {
                    fe.push(format!("{temp} = fneg {} {value}", llvm.text()));
                    Ok((temp, llvm))
                }
                (UnOp::Neg, NumericKind::Uint) => {
                    bail!("unary minus on an unsigned operand is unsupported")
                }
                (UnOp::Neg, NumericKind::None) => bail!("unary minus requires a numeric operand"),
                (UnOp::Not, _) if llvm == LlvmType::I1 => {
                    fe.push(format!("{temp} = xor i1 {value}, true"));
                    Ok((temp, LlvmType::I1))
                }
                (UnOp::Not, _) => bail!("logical not requires an i1 operand"),
            }
        }
    }
}

/// Fixed-width-to-fixed-width scalar casts. Any cast touching a big
/// numeric is routed to `emit_big_numeric_cast` instead (called
/// separately by `rvalue`/`call`).
pub fn emit_numeric_cast(
    fe: &mut FuncEmitter<'_, '_>,
    value: &str,
    from_kind: NumericKind,
    from: LlvmType,
    to_kind: NumericKind,
    to: LlvmType,
) -> Result<String> {
    if from == to {
        return Ok(value.to_string());
    }
    let temp = fe.fresh_temp_pub();
    let op = match (from_kind, to_kind) {
        (NumericKind::Float, NumericKind::Int) => "fptosi",
        (NumericKind::Float, NumericKind::Uint) => "fptoui",
        (NumericKind::Int, NumericKind::Float) => "sitofp",
        (NumericKind::Uint, NumericKind::Float) => "uitofp",
        (NumericKind::Float, NumericKind::Float) => {
            if bit_width(to) > bit_width(from) { "fpext" } else { "fptrunc" }
        }
        (NumericKind::Int, NumericKind::Int) | (NumericKind::Uint, NumericKind::Uint) => {
            if bit_width(to) > bit_width(from) {
                if from_kind == NumericKind::Int { "sext" } else { "zext" }
            } else {
                "trunc"
            }
        }
        (NumericKind::Int, NumericKind::Uint) | (NumericKind::Uint, NumericKind::Int) => {
            if bit_width(to) > bit_width(from) {
                "zext"
            } else if bit_width(to) < bit_width(from) {
                "trunc"
            } else {
                "bitcast"
            }
        }
        _ => bail!("unsupported numeric cast from {from_kind:?} to {to_kind:?}"),
    };
    fe.push(format!("{temp} = {op} {} {value} to {}", from.text(), to.text()));
    Ok(temp)
}

fn bit_width(ty: LlvmType) -> u32 {
    match ty {
        LlvmType::I8 => 8,
        LlvmType::I16 | LlvmType::Half => 16,
        LlvmType::I32 | LlvmType::Float => 32,
        LlvmType::I64 | LlvmType::Double => 64,
        _ => 0,
    }
}

/// Signed/unsigned range bounds (as decimal text) for every fixed integer
/// width `emit_big_numeric_cast` narrows into, used by the `icmp`
/// range-check pair below.
fn int_bounds(llvm: LlvmType, signed: bool) -> (&'static str, &'static str) {
    match (llvm, signed) {
        (LlvmType::I8, true) => ("-128", "127"),
        (LlvmType::I8, false) => ("0", "255"),
        (LlvmType::I16, true) => ("-32768", "32767"),
        (LlvmType::I16, false) => ("0", "65535"),
        (LlvmType::I32, true) => ("-2147483648", "2147483647"),
        (LlvmType::I32, false) => ("0", "4294967295"),
        (LlvmType::I64, true) => ("-9223372036854775808", "9223372036854775807"),
        (LlvmType::I64, false) => ("0", "-1" /* u64::MAX has no i64 literal; unused at i64 width */),
        _ => unreachable!("int_bounds is only called with fixed-width integer LLVM types"),
    }
}

fn panic_numeric(fe: &mut FuncEmitter<'_, '_>, message: &'static str) {
    let id = fe.pool.intern(message);
    let label = fe.pool.label_for(id);
    let len = fe.pool.get(id).len();
    fe.push(format!("call void @rt_panic_numeric(ptr {label}, i64 {len})"));
    fe.push("unreachable".to_string());
}

/// Narrows an already-converted `i64`/`double` scalar down to `to_llvm`
/// with an explicit range check, panicking via `rt_panic_numeric` on
/// failure.
fn narrow_checked_i64(
    fe: &mut FuncEmitter<'_, '_>,
    value: &str,
    to_llvm: LlvmType,
    signed: bool,
    message: &'static str,
) -> Result<String> {
    if to_llvm == LlvmType::I64 {
        return Ok(value.to_string());
    }
    let (lo, hi) = int_bounds(to_llvm, signed);
    let lt_lo = fe.fresh_temp_pub();
    fe.push(format!("{lt_lo} = icmp slt i64 {value}, {lo}"));
    let gt_hi = fe.fresh_temp_pub();
    fe.push(format!("{gt_hi} = icmp sgt i64 {value}, {hi}"));
    let bad = fe.fresh_temp_pub();
    fe.push(format!("{bad} = or i1 {lt_lo}, {gt_hi}"));
    let panic_label = fe.fresh_inline_label(Some("range_panic"));
    let ok_label = fe.fresh_inline_label(Some("range_ok"));
    fe.push(format!("br i1 {bad}, label %{panic_label}, label %{ok_label}"));
    fe.open_label(&panic_label);
    panic_numeric(fe, message);
    fe.open_label(&ok_label);
    let temp = fe.fresh_temp_pub();
    fe.push(format!("{temp} = trunc i64 {value} to {}", to_llvm.text()));
    Ok(temp)
}

/// Converts a big-numeric handle down to a fixed-width scalar, with a
/// two-stage panic sequence: the runtime conversion call itself can
/// fail (value does not fit in the intermediate `i64`/`double`), and
/// even a successful conversion may still be out of range for the
/// requested narrower width.
fn big_to_scalar(fe: &mut FuncEmitter<'_, '_>, value: &str, from: BigKind, to_llvm: LlvmType) -> Result<String> {
    match from {
        BigKind::Float => {
            let f = fe.fresh_temp_pub();
            fe.push(format!("{f} = call double @rt_bigfloat_to_f64(ptr {value})"));
            if to_llvm == LlvmType::Double {
                return Ok(f);
            }
            let temp = fe.fresh_temp_pub();
            let op = if to_llvm == LlvmType::Float { "fptrunc" } else { "fpext" };
            fe.push(format!("{temp} = {op} double {f} to {}", to_llvm.text()));
            Ok(temp)
        }
        BigKind::Int | BigKind::Uint => {
            let (conv_fn, signed, message) = match from {
                BigKind::Int => ("rt_bigint_to_i64", true, "integer overflow"),
                BigKind::Uint => ("rt_biguint_to_i64", false, "unsigned overflow"),
                BigKind::Float => unreachable!(),
            };
            let ok = fe.fresh_temp_pub();
            let bits = fe.fresh_temp_pub();
            fe.push(format!("{bits} = alloca i64"));
            fe.push(format!("{ok} = call i1 @{conv_fn}(ptr {value}, ptr {bits})"));
            let panic_label = fe.fresh_inline_label(Some("conv_panic"));
            let ok_label = fe.fresh_inline_label(Some("conv_ok"));
            fe.push(format!("br i1 {ok}, label %{ok_label}, label %{panic_label}"));
            fe.open_label(&panic_label);
            panic_numeric(fe, message);
            fe.open_label(&ok_label);
            let loaded = fe.fresh_temp_pub();
            fe.push(format!("{loaded} = load i64, ptr {bits}"));
            narrow_checked_i64(fe, &loaded, to_llvm, signed, message)
        }
    }
}

fn numeric_kind_for_big(big: BigKind) -> NumericKind {
    match big {
        BigKind::Int => NumericKind::Int,
        BigKind::Uint => NumericKind::Uint,
        BigKind::Float => NumericKind::Float,
    }
}

fn big_to_big(fe: &mut FuncEmitter<'_, '_>, value: &str, from: BigKind, to: BigKind) -> Result<String> {
    if from == to {
        return Ok(value.to_string());
    }
    let temp = fe.fresh_temp_pub();
    match (from, to) {
        (BigKind::Int, BigKind::Uint) => fe.push(format!("{temp} = call ptr @rt_bigint_to_biguint(ptr {value})")),
        (BigKind::Int, BigKind::Float) => fe.push(format!("{temp} = call ptr @rt_bigint_to_bigfloat(ptr {value})")),
        (BigKind::Uint, BigKind::Int) => bail!("no runtime conversion from biguint to bigint is specified"),
        (BigKind::Uint, BigKind::Float) => fe.push(format!("{temp} = call ptr @rt_biguint_to_bigfloat(ptr {value})")),
        (BigKind::Float, _) => bail!("narrowing a bigfloat to an integral big type is not specified"),
        (BigKind::Int, BigKind::Int) | (BigKind::Uint, BigKind::Uint) => unreachable!("from == to handled above"),
    }
    Ok(temp)
}

/// Any numeric cast where at least one side is a big numeric. Matches
/// `emit_numeric_cast`'s calling convention but additionally performs
/// explicit range checks on narrowing conversions.
pub fn emit_big_numeric_cast(
    fe: &mut FuncEmitter<'_, '_>,
    value: &str,
    from_big: Option<BigKind>,
    from_llvm: LlvmType,
    to_big: Option<BigKind>,
    to_llvm: LlvmType,
) -> Result<String> {
    match (from_big, to_big) {
        (Some(from), None) => big_to_scalar(fe, value, from, to_llvm),
        (None, Some(to)) => Ok(scalar_to_big(fe, value, from_llvm, numeric_kind_for_big(to), to)),
        (Some(from), Some(to)) => big_to_big(fe, value, from, to),
        (None, None) => bail!("emit_big_numeric_cast called with neither side big"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_widths_are_ordered() {
        assert!(bit_width(LlvmType::I64) > bit_width(LlvmType::I32));
        assert!(bit_width(LlvmType::Double) > bit_width(LlvmType::Float));
    }

    #[test]
    fn matches_big_kind_pairs_same_family_only() {
        assert!(matches_big_kind(NumericKind::Int, BigKind::Int));
        assert!(!matches_big_kind(NumericKind::Int, BigKind::Float));
    }
}
