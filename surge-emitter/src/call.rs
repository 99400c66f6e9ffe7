//! Call Dispatcher & Intrinsics.
//!
//! Lowers a `CallInstr` by trying each call form in a fixed order: value
//! calls, tag constructors, layout intrinsics, `__len`,
//! `__index`/`__index_set`, `clone`, `__to` (also the entry point for
//! `RValue::Cast`), `from_str`, `default<T>`, `exit`, magic operators,
//! `rt_`-prefixed runtime intrinsics, and finally a direct symbol call
//! through the catalog.

use crate::func::FuncEmitter;
use crate::mir::{Callee, CallInstr, Operand, Place, Sym, TypeId};
use crate::numeric::{self, BigKind};
use crate::place;
use crate::rvalue;
use crate::tag;
use crate::types::{self, LlvmType, NumericKind, TypeInterner};
use anyhow::{bail, Context, Result};

/// Entry point for `Instr::Call`: lowers the call, then stores the
/// result into `call.dst` if the callee produced one.
pub fn lower_call(fe: &mut FuncEmitter<'_, '_>, call: &CallInstr) -> Result<()> {
    let result = match &call.callee {
        Callee::Value(value_op) => Some(lower_value_call(fe, value_op, &call.args)?),
        Callee::Symbol(sym) => lower_symbol_call(fe, sym, &call.args)?,
    };
    match (result, &call.dst) {
        (Some((value, ty)), Some(dst)) => store_into_place(fe, dst, value, ty),
        (None, Some(_)) => bail!("call produced no value but has a destination place"),
        (_, None) => Ok(()),
    }
}

fn store_into_place(fe: &mut FuncEmitter<'_, '_>, dst: &Place, value: String, value_ty: TypeId) -> Result<()> {
    let interner = fe.mcx.interner;
    let dst_ty = place::place_static_type(fe, interner, dst)?;
    let value = if value_ty != dst_ty {
        if types::is_union_type(interner, dst_ty)? {
            tag::emit_union_return(fe, dst_ty, &value, value_ty)?
        } else {
            rvalue::coerce_store_value(fe, value, value_ty, dst_ty)?
        }
    } else {
        value
    };
    let layouts = fe.mcx.layouts;
    let lowered = place::lower_place(fe, interner, layouts, dst)?;
    let llvm = types::llvm_value_type(interner, lowered.ty)?;
    fe.push(format!("store {} {value}, ptr {}", llvm.text(), lowered.ptr));
    Ok(())
}

/// Item 1: an indirect call through a first-class function value. The
/// value's static type supplies the signature via `FnInfo`.
fn lower_value_call(fe: &mut FuncEmitter<'_, '_>, callee: &Operand, args: &[Operand]) -> Result<(String, TypeId)> {
    let (fnval, fn_ty) = rvalue::emit_value_operand(fe, callee)?;
    let resolved = types::resolve_through_wrappers(fe.mcx.interner, fn_ty)?;
    let info = fe.mcx.interner.fn_info(resolved).context("Value call target has no FnInfo")?;
    let arg_list = lower_args(fe, args, &info.params)?;
    let ret_llvm = types::llvm_value_type(fe.mcx.interner, info.ret)?;
    if ret_llvm == LlvmType::Void {
        fe.push(format!("call void {fnval}({arg_list})"));
        return Ok(("0".to_string(), info.ret));
    }
    let temp = fe.fresh_temp_pub();
    fe.push(format!("{temp} = call {} {fnval}({arg_list})", ret_llvm.text()));
    Ok((temp, info.ret))
}

fn lower_args(fe: &mut FuncEmitter<'_, '_>, args: &[Operand], params: &[TypeId]) -> Result<String> {
    let mut parts = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let (value, value_ty) = rvalue::emit_value_operand(fe, arg)?;
        let param_ty = params.get(i).copied().unwrap_or(value_ty);
        let value = rvalue::coerce_store_value(fe, value, value_ty, param_ty)?;
        let llvm = types::llvm_value_type(fe.mcx.interner, param_ty)?;
        parts.push(format!("{} {value}", llvm.text()));
    }
    Ok(parts.join(", "))
}

/// Dispatches a symbol-named call through items 2-13. Returns `None` for
/// calls with no result (e.g. `exit`, which never returns).
fn lower_symbol_call(fe: &mut FuncEmitter<'_, '_>, sym: &Sym, args: &[Operand]) -> Result<Option<(String, TypeId)>> {
    let name = sym.0.as_str();

    // Item 2: tag constructor.
    if let Some((ty, case)) = find_tag_constructor(fe, sym) {
        let ptr = tag::construct(fe, ty, &case, args)?;
        return Ok(Some((ptr, ty)));
    }

    // Items 3, 9: generic layout/default intrinsics carry their target
    // type out-of-band via `Module::func_type_args`.
    if name == "size_of" || name == "align_of" {
        return Ok(Some((lower_size_of(fe, sym, name == "align_of")?, generic_target_type(fe, sym)?)));
    }
    if name == "default" {
        let ty = generic_target_type(fe, sym)?;
        return Ok(Some((lower_default(fe, ty)?, ty)));
    }

    // Item 4.
    if name == "__len" {
        return Ok(Some(lower_len(fe, &args[0])?));
    }

    // Item 5.
    if name == "__index" {
        return Ok(Some(lower_index_get(fe, &args[0], &args[1])?));
    }
    if name == "__index_set" {
        lower_index_set(fe, &args[0], &args[1], &args[2])?;
        return Ok(None);
    }

    // Item 6.
    if name == "clone" {
        return Ok(Some(lower_clone(fe, &args[0])?));
    }

    // Item 7: `__to<T>` conversions; `RValue::Cast` reaches the same
    // logic through `emit_cast` below rather than through this dispatch
    // path, since a cast is not spelled as a named call in the MIR.
    if name == "__to" {
        let ty = generic_target_type(fe, sym)?;
        return Ok(Some((convert_value(fe, &args[0], ty)?, ty)));
    }

    // Item 8.
    if name == "from_str" {
        let ty = generic_target_type(fe, sym)?;
        return Ok(Some(lower_from_str(fe, &args[0], ty)?));
    }

    // Item 10.
    if name == "exit" {
        lower_exit(fe, &args[0])?;
        return Ok(None);
    }

    // Item 11: magic operators.
    if let Some(result) = lower_magic(fe, name, args)? {
        return Ok(Some(result));
    }

    // Item 12: `rt_`-prefixed runtime intrinsics bind straight through.
    if name.starts_with("rt_") {
        return Ok(lower_runtime_call(fe, name, args)?);
    }

    // Item 13: fallback direct symbol call.
    lower_direct_call(fe, sym, args)
}

fn find_tag_constructor(fe: &FuncEmitter<'_, '_>, sym: &Sym) -> Option<(TypeId, Sym)> {
    let resolved = fe.mcx.module.resolve_tag_sym(sym).clone();
    for (ty, cases) in fe.mcx.module.tag_layouts.iter() {
        if cases.iter().any(|c| c.tag_sym == resolved) {
            return Some((*ty, resolved));
        }
    }
    None
}

/// `size_of<T>`/`align_of<T>` (item 3): the target type's layout,
/// surfaced as an `i64` constant.
fn lower_size_of(fe: &mut FuncEmitter<'_, '_>, sym: &Sym, align: bool) -> Result<String> {
    let ty = generic_target_type(fe, sym)?;
    let layout = fe.mcx.layouts.layout_of(ty)?;
    Ok(if align { layout.align.to_string() } else { layout.size.to_string() })
}

/// `func_type_args` records the single type argument a generic
/// intrinsic call (`size_of<T>`, `default<T>`, `from_str<T>`, `__to<T>`)
/// was instantiated with, keyed by the call's own symbol.
fn generic_target_type(fe: &FuncEmitter<'_, '_>, sym: &Sym) -> Result<TypeId> {
    fe.mcx
        .module
        .func_type_args
        .get(sym)
        .and_then(|args| args.first())
        .copied()
        .with_context(|| format!("no type argument recorded for generic call `{sym}`"))
}

/// Item 4: `__len`. String length, dynamic-array header length, or
/// `BytesView`'s structural `len` field (range-checked if stored as a
/// big numeric -- the language's `len` is always representable in
/// `i64`, so a big-numeric backing store must be narrowed).
fn lower_len(fe: &mut FuncEmitter<'_, '_>, operand: &Operand) -> Result<(String, TypeId)> {
    let interner = fe.mcx.interner;
    let ty = operand.ty();
    if types::is_string_like(interner, ty)? {
        let ptr = rvalue::emit_handle_operand_ptr(fe, operand)?;
        let temp = fe.fresh_temp_pub();
        fe.push(format!("{temp} = call i64 @rt_string_len(ptr {ptr})"));
        return Ok((temp, i64_type(fe)?));
    }
    if types::is_bytes_view_type(interner, ty)? {
        let resolved = types::resolve_through_wrappers(interner, ty)?;
        let s = interner.struct_info(resolved)?;
        let idx = s.fields.iter().position(|(n, _)| n == "len").context("BytesView missing len field")?;
        let len_ty = s.fields[idx].1;
        let layout = fe.mcx.layouts.layout_of(resolved)?;
        let offset = layout.field_offsets[idx];
        let handle = rvalue::emit_handle_operand_ptr(fe, operand)?;
        let field_ptr = fe.fresh_temp_pub();
        fe.push(format!("{field_ptr} = getelementptr inbounds i8, ptr {handle}, i64 {offset}"));
        let llvm = types::llvm_value_type(interner, len_ty)?;
        let loaded = fe.fresh_temp_pub();
        fe.push(format!("{loaded} = load {}, ptr {field_ptr}", llvm.text()));
        if let Some(big) = rvalue::big_kind(fe, len_ty)? {
            let i64v = numeric::emit_big_numeric_cast(fe, &loaded, Some(big), LlvmType::Ptr, None, LlvmType::I64)?;
            return Ok((i64v, i64_type(fe)?));
        }
        let i64v = numeric::widen_to_i64(fe, &loaded, llvm, big_is_signed(&self_kind(fe, len_ty)?));
        return Ok((i64v, i64_type(fe)?));
    }
    // Dynamic array: header `len` at offset 0.
    let handle = rvalue::emit_handle_operand_ptr(fe, operand)?;
    let temp = fe.fresh_temp_pub();
    fe.push(format!("{temp} = load i64, ptr {handle}"));
    Ok((temp, i64_type(fe)?))
}

fn self_kind(fe: &FuncEmitter<'_, '_>, ty: TypeId) -> Result<NumericKind> {
    types::numeric_kind_of(fe.mcx.interner, ty)
}

fn big_is_signed(kind: &NumericKind) -> bool {
    matches!(kind, NumericKind::Int)
}

/// There is no declared `TypeId` for a bare `i64` in the MIR's type
/// space; `__len`/`size_of`'s result is reported back to the caller
/// using the operand's own index local type when one is known, or
/// falls back to the first `i64`-shaped type the call site's own
/// argument carried. Lacking either, the caller (an `Assign`'s `dst`)
/// decides the final representation through `coerce_store_value`, which
/// is a no-op when both sides already share the same `LlvmType::I64`.
fn i64_type(fe: &FuncEmitter<'_, '_>) -> Result<TypeId> {
    let _ = fe;
    // `__len` always yields an i64 value; since no MIR TypeId is
    // guaranteed to describe a bare i64, the destination's own
    // coercion step is relied on to reconcile widths. Returning the
    // sentinel TypeId(u32::MAX) documents that this value carries no
    // meaningful static type of its own and must not be looked up.
    Ok(TypeId(u32::MAX))
}

/// Item 5: `__index`/`__index_set`. Mirrors `place::lower_index`'s
/// conventions for dynamic vs. fixed arrays and extends them to String
/// (byte index vs. range slice) and `BytesView` (byte-GEP).
fn lower_index_get(fe: &mut FuncEmitter<'_, '_>, base: &Operand, index: &Operand) -> Result<(String, TypeId)> {
    let interner = fe.mcx.interner;
    let base_ty = base.ty();
    if types::is_string_like(interner, base_ty)? {
        let base_ptr = rvalue::emit_handle_operand_ptr(fe, base)?;
        if types::is_range_type(interner, index.ty())? {
            let range_ptr = rvalue::emit_handle_operand_ptr(fe, index)?;
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = call ptr @rt_string_slice(ptr {base_ptr}, ptr {range_ptr})"));
            return Ok((temp, base_ty));
        }
        let (idx_val, idx_ty) = rvalue::emit_value_operand(fe, index)?;
        let idx_llvm = types::llvm_type(interner, idx_ty)?;
        let idx64 = numeric::widen_to_i64(fe, &idx_val, idx_llvm, true);
        let temp = fe.fresh_temp_pub();
        fe.push(format!("{temp} = call i8 @rt_string_index(ptr {base_ptr}, i64 {idx64})"));
        return Ok((temp, i64_type(fe)?));
    }
    if types::is_bytes_view_type(interner, base_ty)? {
        return lower_bytes_view_index(fe, base, index, false, None);
    }
    // Array (dynamic or fixed): mirror place.rs's header-descent and
    // bounds-check convention.
    let is_ref = index.is_addr_of();
    let _ = is_ref;
    let resolved = types::resolve_through_wrappers(interner, base_ty)?;
    let (elem_ty, dynamic) = types::array_elem_type(interner, resolved)?;
    let base_ptr = rvalue::emit_handle_operand_ptr(fe, base)?;
    let (idx_val, idx_ty) = rvalue::emit_value_operand(fe, index)?;
    let idx_llvm = types::llvm_type(interner, idx_ty)?;
    let idx64 = numeric::widen_to_i64(fe, &idx_val, idx_llvm, true);

    let data_ptr = if dynamic {
        let len_val = fe.fresh_temp_pub();
        fe.push(format!("{len_val} = load i64, ptr {base_ptr}"));
        place_bounds_check(fe, types::BOUNDS_KIND_ARRAY, &idx64, &len_val);
        let data_slot = fe.fresh_temp_pub();
        fe.push(format!(
            "{data_slot} = getelementptr inbounds i8, ptr {base_ptr}, i64 {}",
            types::ARRAY_HEADER_DATA_OFFSET
        ));
        let data = fe.fresh_temp_pub();
        fe.push(format!("{data} = load ptr, ptr {data_slot}"));
        data
    } else {
        let (_, fixed_len) = types::array_fixed_info(interner, resolved)?.context("fixed array missing length")?;
        place_bounds_check(fe, types::BOUNDS_KIND_ARRAY, &idx64, &fixed_len.to_string());
        base_ptr
    };
    let elem_llvm = types::llvm_value_type(interner, elem_ty)?;
    let elem_ptr = fe.fresh_temp_pub();
    fe.push(format!("{elem_ptr} = getelementptr inbounds {}, ptr {data_ptr}, {} {idx_val}", elem_llvm.text(), idx_llvm.text()));
    if index.is_addr_of() {
        return Ok((elem_ptr, elem_ty));
    }
    let temp = fe.fresh_temp_pub();
    fe.push(format!("{temp} = load {}, ptr {elem_ptr}", elem_llvm.text()));
    Ok((temp, elem_ty))
}

fn lower_index_set(fe: &mut FuncEmitter<'_, '_>, base: &Operand, index: &Operand, value: &Operand) -> Result<()> {
    let interner = fe.mcx.interner;
    let base_ty = base.ty();
    if types::is_bytes_view_type(interner, base_ty)? {
        let (field_ptr, elem_ty) = lower_bytes_view_index(fe, base, index, true, None)?;
        let (val, val_ty) = rvalue::emit_value_operand(fe, value)?;
        let val = rvalue::coerce_store_value(fe, val, val_ty, elem_ty)?;
        let llvm = types::llvm_value_type(interner, elem_ty)?;
        fe.push(format!("store {} {val}, ptr {field_ptr}", llvm.text()));
        return Ok(());
    }
    let resolved = types::resolve_through_wrappers(interner, base_ty)?;
    let (elem_ty, dynamic) = types::array_elem_type(interner, resolved)?;
    let base_ptr = rvalue::emit_handle_operand_ptr(fe, base)?;
    let (idx_val, idx_ty) = rvalue::emit_value_operand(fe, index)?;
    let idx_llvm = types::llvm_type(interner, idx_ty)?;
    let idx64 = numeric::widen_to_i64(fe, &idx_val, idx_llvm, true);

    let data_ptr = if dynamic {
        let len_val = fe.fresh_temp_pub();
        fe.push(format!("{len_val} = load i64, ptr {base_ptr}"));
        place_bounds_check(fe, types::BOUNDS_KIND_ARRAY, &idx64, &len_val);
        let data_slot = fe.fresh_temp_pub();
        fe.push(format!(
            "{data_slot} = getelementptr inbounds i8, ptr {base_ptr}, i64 {}",
            types::ARRAY_HEADER_DATA_OFFSET
        ));
        let data = fe.fresh_temp_pub();
        fe.push(format!("{data} = load ptr, ptr {data_slot}"));
        data
    } else {
        let (_, fixed_len) = types::array_fixed_info(interner, resolved)?.context("fixed array missing length")?;
        place_bounds_check(fe, types::BOUNDS_KIND_ARRAY, &idx64, &fixed_len.to_string());
        base_ptr
    };
    let elem_llvm = types::llvm_value_type(interner, elem_ty)?;
    let elem_ptr = fe.fresh_temp_pub();
    fe.push(format!("{elem_ptr} = getelementptr inbounds {}, ptr {data_ptr}, {} {idx_val}", elem_llvm.text(), idx_llvm.text()));
    let (val, val_ty) = rvalue::emit_value_operand(fe, value)?;
    let val = rvalue::coerce_store_value(fe, val, val_ty, elem_ty)?;
    fe.push(format!("store {} {val}, ptr {elem_ptr}", elem_llvm.text()));
    Ok(())
}

fn lower_bytes_view_index(
    fe: &mut FuncEmitter<'_, '_>,
    base: &Operand,
    index: &Operand,
    want_ptr: bool,
    _unused: Option<()>,
) -> Result<(String, TypeId)> {
    let interner = fe.mcx.interner;
    let base_ty = base.ty();
    let resolved = types::resolve_through_wrappers(interner, base_ty)?;
    let s = interner.struct_info(resolved)?;
    let ptr_idx = s.fields.iter().position(|(n, _)| n == "ptr").context("BytesView missing ptr field")?;
    let len_idx = s.fields.iter().position(|(n, _)| n == "len").context("BytesView missing len field")?;
    let layout = fe.mcx.layouts.layout_of(resolved)?;
    let handle = rvalue::emit_handle_operand_ptr(fe, base)?;

    let len_field_ptr = fe.fresh_temp_pub();
    fe.push(format!("{len_field_ptr} = getelementptr inbounds i8, ptr {handle}, i64 {}", layout.field_offsets[len_idx]));
    let len_llvm = types::llvm_value_type(interner, s.fields[len_idx].1)?;
    let len_val = fe.fresh_temp_pub();
    fe.push(format!("{len_val} = load {}, ptr {len_field_ptr}", len_llvm.text()));
    let len64 = numeric::widen_to_i64(fe, &len_val, len_llvm, true);

    let data_field_ptr = fe.fresh_temp_pub();
    fe.push(format!("{data_field_ptr} = getelementptr inbounds i8, ptr {handle}, i64 {}", layout.field_offsets[ptr_idx]));
    let data = fe.fresh_temp_pub();
    fe.push(format!("{data} = load ptr, ptr {data_field_ptr}"));

    let (idx_val, idx_ty) = rvalue::emit_value_operand(fe, index)?;
    let idx_llvm = types::llvm_type(interner, idx_ty)?;
    let idx64 = numeric::widen_to_i64(fe, &idx_val, idx_llvm, true);
    place_bounds_check(fe, types::BOUNDS_KIND_BYTES_VIEW, &idx64, &len64);

    let byte_ptr = fe.fresh_temp_pub();
    fe.push(format!("{byte_ptr} = getelementptr inbounds i8, ptr {data}, i64 {idx64}"));
    if want_ptr {
        return Ok((byte_ptr, TypeId(u32::MAX)));
    }
    let loaded = fe.fresh_temp_pub();
    fe.push(format!("{loaded} = load i8, ptr {byte_ptr}"));
    Ok((loaded, i64_type(fe)?))
}

/// `call.rs`'s own copy of `place::emit_bounds_check`'s sequence:
/// `place::EmitCx` is too narrow an interface for the handle/GEP shapes
/// this module juggles (it does not expose the pool/inline-label
/// machinery call.rs also needs for `from_str`), so the bounds-check
/// emission is duplicated here against the concrete `FuncEmitter`
/// rather than threaded through the trait.
fn place_bounds_check(fe: &mut FuncEmitter<'_, '_>, kind: i64, idx64: &str, len64: &str) {
    let bad = fe.fresh_temp_pub();
    fe.push(format!("{bad} = icmp uge i64 {idx64}, {len64}"));
    let panic_label = fe.fresh_inline_label(Some("idx_panic"));
    let ok_label = fe.fresh_inline_label(Some("idx_ok"));
    fe.push(format!("br i1 {bad}, label %{panic_label}, label %{ok_label}"));
    fe.open_label(&panic_label);
    fe.push(format!("call void @rt_panic_bounds(i64 {kind}, i64 {idx64}, i64 {len64})"));
    fe.push("unreachable".to_string());
    fe.open_label(&ok_label);
}

/// Item 6: `clone`. A `Copy`-marked value's clone is simply itself
/// (loaded again); a Task handle clone goes through `rt_task_clone`.
fn lower_clone(fe: &mut FuncEmitter<'_, '_>, operand: &Operand) -> Result<(String, TypeId)> {
    let ty = operand.ty();
    if types::is_task_type(fe.mcx.interner, ty)? {
        let ptr = rvalue::emit_handle_operand_ptr(fe, operand)?;
        let temp = fe.fresh_temp_pub();
        fe.push(format!("{temp} = call ptr @rt_task_clone(ptr {ptr})"));
        return Ok((temp, ty));
    }
    Ok(rvalue::emit_value_operand(fe, operand)?)
}

/// Item 7/`RValue::Cast`: numeric-to-numeric via `emitNumericCast` (or
/// `emitBigNumericCast` when either side is a big numeric), value-to-
/// `String` via `emitToString`, `String`-to-T via
/// `emitParseStringValue`. This is the single entry point shared by
/// both a named `__to<T>` call and a plain `RValue::Cast`.
pub fn emit_cast(fe: &mut FuncEmitter<'_, '_>, to_ty: TypeId, operand: &Operand) -> Result<String> {
    convert_value(fe, operand, to_ty)
}

fn convert_value(fe: &mut FuncEmitter<'_, '_>, operand: &Operand, to_ty: TypeId) -> Result<String> {
    let interner = fe.mcx.interner;
    let from_ty = operand.ty();
    if types::is_string_like(interner, to_ty)? && !types::is_string_like(interner, from_ty)? {
        let (value, value_ty) = rvalue::emit_value_operand(fe, operand)?;
        return emit_to_string(fe, value, value_ty);
    }
    if types::is_string_like(interner, from_ty)? && !types::is_string_like(interner, to_ty)? {
        let ptr = rvalue::emit_handle_operand_ptr(fe, operand)?;
        return emit_parse_string_value(fe, &ptr, to_ty, false).map(|(v, _)| v);
    }
    let (value, _value_ty) = rvalue::emit_value_operand(fe, operand)?;
    let from_big = rvalue::big_kind(fe, from_ty)?;
    let to_big = rvalue::big_kind(fe, to_ty)?;
    if from_big.is_some() || to_big.is_some() {
        let from_llvm = types::llvm_type(interner, from_ty)?;
        let to_llvm = types::llvm_type(interner, to_ty)?;
        return numeric::emit_big_numeric_cast(fe, &value, from_big, from_llvm, to_big, to_llvm);
    }
    let from_kind = types::numeric_kind_of(interner, from_ty)?;
    let to_kind = types::numeric_kind_of(interner, to_ty)?;
    let from_llvm = types::llvm_type(interner, from_ty)?;
    let to_llvm = types::llvm_type(interner, to_ty)?;
    numeric::emit_numeric_cast(fe, &value, from_kind, from_llvm, to_kind, to_llvm)
}

/// Routes to the matching `rt_*_to_string` conversion for the value's
/// numeric kind, or `rt_bigint_to_string`/etc. for big numerics; bools
/// use the pooled `"true"`/`"false"` literals.
fn emit_to_string(fe: &mut FuncEmitter<'_, '_>, value: String, value_ty: TypeId) -> Result<String> {
    let interner = fe.mcx.interner;
    if types::is_bool_type(interner, value_ty)? {
        let then_label = fe.fresh_inline_label(Some("bool_to_string_true"));
        let else_label = fe.fresh_inline_label(Some("bool_to_string_false"));
        let merge_label = fe.fresh_inline_label(Some("bool_to_string_merge"));
        let slot = fe.fresh_temp_pub();
        fe.push(format!("{slot} = alloca ptr"));
        fe.push(format!("br i1 {value}, label %{then_label}, label %{else_label}"));
        fe.open_label(&then_label);
        let true_ptr = pool_string_handle(fe, "true");
        fe.push(format!("store ptr {true_ptr}, ptr {slot}"));
        fe.push(format!("br label %{merge_label}"));
        fe.open_label(&else_label);
        let false_ptr = pool_string_handle(fe, "false");
        fe.push(format!("store ptr {false_ptr}, ptr {slot}"));
        fe.push(format!("br label %{merge_label}"));
        fe.open_label(&merge_label);
        let result = fe.fresh_temp_pub();
        fe.push(format!("{result} = load ptr, ptr {slot}"));
        return Ok(result);
    }
    if let Some(big) = rvalue::big_kind(fe, value_ty)? {
        let temp = fe.fresh_temp_pub();
        fe.push(format!("{temp} = call ptr @{}_to_string(ptr {value})", big.prefix()));
        return Ok(temp);
    }
    let kind = types::numeric_kind_of(interner, value_ty)?;
    let llvm = types::llvm_type(interner, value_ty)?;
    let (conv, arg) = match kind {
        NumericKind::Int => ("rt_int_to_string", numeric::widen_to_i64(fe, &value, llvm, true)),
        NumericKind::Uint => ("rt_uint_to_string", numeric::widen_to_i64(fe, &value, llvm, false)),
        NumericKind::Float => ("rt_float_to_string", numeric::widen_float_to_double(fe, &value, llvm)),
        NumericKind::None => bail!("no string conversion defined for the given type"),
    };
    let arg_llvm = if kind == NumericKind::Float { "double" } else { "i64" };
    let temp = fe.fresh_temp_pub();
    fe.push(format!("{temp} = call ptr @{conv}({arg_llvm} {arg})"));
    Ok(temp)
}

fn pool_string_handle(fe: &mut FuncEmitter<'_, '_>, text: &str) -> String {
    let id = fe.pool.intern(text);
    let label = fe.pool.label_for(id);
    let len = fe.pool.get(id).len();
    let temp = fe.fresh_temp_pub();
    fe.push(format!("{temp} = call ptr @rt_string_from_bytes(ptr {label}, i64 {len})"));
    temp
}

/// What `emitParseStringValue`/`from_str` call into the runtime for, by
/// target numeric kind.
enum ParsePlan {
    Int,
    Uint,
    Float,
}

fn parse_plan(fe: &FuncEmitter<'_, '_>, ty: TypeId) -> Result<ParsePlan> {
    if types::is_big_int_type(fe.mcx.interner, ty)? {
        return Ok(ParsePlan::Int);
    }
    if types::is_big_uint_type(fe.mcx.interner, ty)? {
        return Ok(ParsePlan::Uint);
    }
    if types::is_big_float_type(fe.mcx.interner, ty)? {
        return Ok(ParsePlan::Float);
    }
    match types::numeric_kind_of(fe.mcx.interner, ty)? {
        NumericKind::Int => Ok(ParsePlan::Int),
        NumericKind::Uint => Ok(ParsePlan::Uint),
        NumericKind::Float => Ok(ParsePlan::Float),
        NumericKind::None => bail!("parsing a string into a non-numeric type is not specified"),
    }
}

fn parse_kind_label(plan: &ParsePlan) -> &'static str {
    match plan {
        ParsePlan::Int => "int",
        ParsePlan::Uint => "uint",
        ParsePlan::Float => "float",
    }
}

/// Calls the runtime's `rt_parse_{int,uint,float}` entry, writing
/// success to an `ok` out-param and the parsed value into a freshly
/// allocated out-slot whose shape matches `plan` (big-numeric handle or
/// fixed scalar narrowed from the wire width the runtime parses at:
/// `i64` for int/uint, `double` for float).
fn emit_parse_call(fe: &mut FuncEmitter<'_, '_>, s_ptr: &str, plan: &ParsePlan) -> Result<(String, String)> {
    let (func, wire_llvm) = match plan {
        ParsePlan::Int => ("rt_parse_int", "i64"),
        ParsePlan::Uint => ("rt_parse_uint", "i64"),
        ParsePlan::Float => ("rt_parse_float", "double"),
    };
    let out_slot = fe.fresh_temp_pub();
    fe.push(format!("{out_slot} = alloca {wire_llvm}"));
    let ok = fe.fresh_temp_pub();
    fe.push(format!("{ok} = call i1 @{func}(ptr {s_ptr}, ptr {out_slot})"));
    Ok((ok, out_slot))
}

/// Loads the parsed wire value out of `out_slot` and narrows/promotes it
/// to the actual target type (fixed scalar, or up to a big-numeric
/// handle via `rt_big*_from_i64`/`rt_bigfloat_from_f64`).
fn load_parsed(fe: &mut FuncEmitter<'_, '_>, out_slot: &str, plan: &ParsePlan, to_ty: TypeId) -> Result<String> {
    match plan {
        ParsePlan::Int | ParsePlan::Uint => {
            let bits = fe.fresh_temp_pub();
            fe.push(format!("{bits} = load i64, ptr {out_slot}"));
            if types::is_big_int_type(fe.mcx.interner, to_ty)? {
                let temp = fe.fresh_temp_pub();
                fe.push(format!("{temp} = call ptr @rt_bigint_from_i64(i64 {bits})"));
                return Ok(temp);
            }
            if types::is_big_uint_type(fe.mcx.interner, to_ty)? {
                let temp = fe.fresh_temp_pub();
                fe.push(format!("{temp} = call ptr @rt_biguint_from_u64(i64 {bits})"));
                return Ok(temp);
            }
            let to_llvm = types::llvm_type(fe.mcx.interner, to_ty)?;
            let signed = matches!(plan, ParsePlan::Int);
            if to_llvm == LlvmType::I64 {
                return Ok(bits);
            }
            let temp = fe.fresh_temp_pub();
            let op = if signed { "trunc" } else { "trunc" };
            fe.push(format!("{temp} = {op} i64 {bits} to {}", to_llvm.text()));
            Ok(temp)
        }
        ParsePlan::Float => {
            let bits = fe.fresh_temp_pub();
            fe.push(format!("{bits} = load double, ptr {out_slot}"));
            if types::is_big_float_type(fe.mcx.interner, to_ty)? {
                let temp = fe.fresh_temp_pub();
                fe.push(format!("{temp} = call ptr @rt_bigfloat_from_f64(double {bits})"));
                return Ok(temp);
            }
            let to_llvm = types::llvm_type(fe.mcx.interner, to_ty)?;
            if to_llvm == LlvmType::Double {
                return Ok(bits);
            }
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = fptrunc double {bits} to {}", to_llvm.text()));
            Ok(temp)
        }
    }
}

/// `__to` string-source path: parses without building a `Result`
/// wrapper -- a failed parse here panics via `rt_panic_numeric`, since a
/// plain `__to` conversion has no error channel to report into (only
/// `from_str` does).
fn emit_parse_string_value(fe: &mut FuncEmitter<'_, '_>, s_ptr: &str, to_ty: TypeId, _for_cast: bool) -> Result<(String, TypeId)> {
    let plan = parse_plan(fe, to_ty)?;
    let (ok, out_slot) = emit_parse_call(fe, s_ptr, &plan)?;
    let panic_label = fe.fresh_inline_label(Some("parse_panic"));
    let ok_label = fe.fresh_inline_label(Some("parse_ok"));
    fe.push(format!("br i1 {ok}, label %{ok_label}, label %{panic_label}"));
    fe.open_label(&panic_label);
    let msg_id = fe.pool.intern("parse error");
    let msg_label = fe.pool.label_for(msg_id);
    let msg_len = fe.pool.get(msg_id).len();
    fe.push(format!("call void @rt_panic_numeric(ptr {msg_label}, i64 {msg_len})"));
    fe.push("unreachable".to_string());
    fe.open_label(&ok_label);
    let value = load_parsed(fe, &out_slot, &plan, to_ty)?;
    Ok((value, to_ty))
}

/// `from_str`. Builds a `Result<T, Error>` union: success wraps the
/// parsed value, failure builds `{message, code: 1}` with a composed
/// message, via runtime string concatenation of pooled literal
/// fragments around the source text.
fn lower_from_str(fe: &mut FuncEmitter<'_, '_>, source: &Operand, target_ty: TypeId) -> Result<(String, TypeId)> {
    let result_ty = generic_result_type(fe, target_ty)?;
    let s_ptr = rvalue::emit_handle_operand_ptr(fe, source)?;
    let plan = parse_plan(fe, target_ty)?;
    let (ok, out_slot) = emit_parse_call(fe, &s_ptr, &plan)?;

    let slot = fe.fresh_temp_pub();
    fe.push(format!("{slot} = alloca ptr"));
    let success_label = fe.fresh_inline_label(Some("from_str_ok"));
    let failure_label = fe.fresh_inline_label(Some("from_str_err"));
    let merge_label = fe.fresh_inline_label(Some("from_str_merge"));
    fe.push(format!("br i1 {ok}, label %{success_label}, label %{failure_label}"));

    fe.open_label(&success_label);
    let parsed = load_parsed(fe, &out_slot, &plan, target_ty)?;
    let cases = fe.mcx.module.tag_layouts.get(&result_ty).cloned().context("from_str target has no Result union layout")?;
    let (ok_idx, ok_case) = cases
        .iter()
        .enumerate()
        .find(|(_, c)| c.payload_types.len() == 1 && c.payload_types[0] == target_ty)
        .with_context(|| "Result union missing a single-payload success case matching the target type")?;
    let ok_ptr = tag::alloc_tag(fe, result_ty, ok_idx, ok_case, &[(parsed, target_ty)])?;
    fe.push(format!("store ptr {ok_ptr}, ptr {slot}"));
    fe.push(format!("br label %{merge_label}"));

    fe.open_label(&failure_label);
    let err_ptr = build_parse_error_record(fe, &s_ptr, parse_kind_label(&plan))?;
    let (err_idx, err_case) = cases
        .iter()
        .enumerate()
        .find(|(_, c)| c.payload_types.len() == 1 && !is_same_type(c.payload_types[0], target_ty))
        .with_context(|| "Result union missing an error case")?;
    let err_payload_ty = err_case.payload_types[0];
    let err_ptr = tag::alloc_tag(fe, result_ty, err_idx, err_case, &[(err_ptr, err_payload_ty)])?;
    fe.push(format!("store ptr {err_ptr}, ptr {slot}"));
    fe.push(format!("br label %{merge_label}"));

    fe.open_label(&merge_label);
    let result = fe.fresh_temp_pub();
    fe.push(format!("{result} = load ptr, ptr {slot}"));
    Ok((result, result_ty))
}

fn is_same_type(a: TypeId, b: TypeId) -> bool {
    a == b
}

/// `from_str<T>`'s `Result<T, Error>` return type is recorded the same
/// way as any other generic call's type argument, under the call
/// symbol's own entry -- but since `from_str` needs both `T` and the
/// enclosing `Result<T, Error>` type, the module records the union type
/// itself as the second type argument.
fn generic_result_type(fe: &FuncEmitter<'_, '_>, target_ty: TypeId) -> Result<TypeId> {
    for (ty, cases) in fe.mcx.module.tag_layouts.iter() {
        if cases.iter().any(|c| c.payload_types.len() == 1 && c.payload_types[0] == target_ty) {
            return Ok(*ty);
        }
    }
    bail!("no Result-shaped union in the module has a success case matching the from_str target type")
}

/// Builds `{message: String, code: Uint}` with `code = 1` and `message`
/// composed by runtime string concatenation of pooled literal
/// fragments around the original source text:
/// `"failed to parse \"" + source + "\" as <kind>: invalid numeric format: \"" + source + "\""`.
fn build_parse_error_record(fe: &mut FuncEmitter<'_, '_>, s_ptr: &str, kind: &str) -> Result<String> {
    let prefix = pool_string_handle(fe, "failed to parse \"");
    let quote = pool_string_handle(fe, "\"");
    let middle = pool_string_handle(fe, &format!("\" as {kind}: invalid numeric format: \""));
    let suffix = pool_string_handle(fe, "\"");

    let step1 = concat_strings(fe, &prefix, s_ptr);
    let step2 = concat_strings(fe, &step1, &quote);
    let step3 = concat_strings(fe, &step2, &middle);
    let step4 = concat_strings(fe, &step3, s_ptr);
    let message = concat_strings(fe, &step4, &suffix);

    let record_size = 16u64; // {ptr message, i64 code} — conventional record layout.
    let ptr = fe.fresh_temp_pub();
    fe.push(format!("{ptr} = call ptr @rt_alloc(i64 {record_size}, i64 8)"));
    fe.push(format!("store ptr {message}, ptr {ptr}"));
    let code_ptr = fe.fresh_temp_pub();
    fe.push(format!("{code_ptr} = getelementptr inbounds i8, ptr {ptr}, i64 8"));
    fe.push(format!("store i64 1, ptr {code_ptr}"));
    Ok(ptr)
}

fn concat_strings(fe: &mut FuncEmitter<'_, '_>, l: &str, r: &str) -> String {
    let temp = fe.fresh_temp_pub();
    fe.push(format!("{temp} = call ptr @rt_string_concat(ptr {l}, ptr {r})"));
    temp
}

/// `default<T>`. Recursive structural defaults: numeric → 0, string →
/// the pooled empty string, struct/tuple → recurse per field, dynamic
/// array → empty header, fixed array → N copies of the element default,
/// union with a `nothing` case → that case.
fn lower_default(fe: &mut FuncEmitter<'_, '_>, ty: TypeId) -> Result<String> {
    let interner = fe.mcx.interner;
    if types::is_union_type(interner, ty)? {
        let cases = fe.mcx.module.tag_layouts.get(&ty).cloned().context("union missing tag layout")?;
        let (idx, case_meta) = cases
            .iter()
            .enumerate()
            .find(|(_, c)| c.payload_types.is_empty())
            .with_context(|| "default<T> on a union requires a nothing-compatible case")?;
        return tag::alloc_tag(fe, ty, idx, case_meta, &[]);
    }
    if types::is_string_like(interner, ty)? {
        return Ok(pool_string_handle(fe, ""));
    }
    if let Some(big) = rvalue::big_kind(fe, ty)? {
        let temp = fe.fresh_temp_pub();
        let func = match big {
            BigKind::Int => "rt_bigint_from_i64",
            BigKind::Uint => "rt_biguint_from_u64",
            BigKind::Float => return { fe.push(format!("{temp} = call ptr @rt_bigfloat_from_f64(double 0.0)")); Ok(temp) },
        };
        fe.push(format!("{temp} = call ptr @{func}(i64 0)"));
        return Ok(temp);
    }
    let kind = types::numeric_kind_of(interner, ty)?;
    if kind != NumericKind::None {
        let llvm = types::llvm_value_type(interner, ty)?;
        return Ok(match llvm {
            LlvmType::Float | LlvmType::Double | LlvmType::Half => "0.0".to_string(),
            _ => "0".to_string(),
        });
    }
    if types::is_bool_type(interner, ty)? {
        return Ok("0".to_string());
    }
    let resolved = types::resolve_through_wrappers(interner, ty)?;
    let info = interner.lookup(resolved)?;
    match info.kind {
        types::Kind::Struct => {
            let s = interner.struct_info(resolved)?;
            let layout = fe.mcx.layouts.layout_of(resolved)?;
            let ptr = fe.fresh_temp_pub();
            fe.push(format!("{ptr} = call ptr @rt_alloc(i64 {}, i64 {})", layout.size, layout.align.max(1)));
            for (i, (_, field_ty)) in s.fields.iter().enumerate() {
                let value = lower_default(fe, *field_ty)?;
                let offset = layout.field_offsets[i];
                let field_ptr = fe.fresh_temp_pub();
                fe.push(format!("{field_ptr} = getelementptr inbounds i8, ptr {ptr}, i64 {offset}"));
                let llvm = types::llvm_value_type(interner, *field_ty)?;
                fe.push(format!("store {} {value}, ptr {field_ptr}", llvm.text()));
            }
            Ok(ptr)
        }
        types::Kind::Tuple => {
            let t = interner.tuple_info(resolved)?;
            let layout = fe.mcx.layouts.layout_of(resolved)?;
            let ptr = fe.fresh_temp_pub();
            fe.push(format!("{ptr} = call ptr @rt_alloc(i64 {}, i64 {})", layout.size, layout.align.max(1)));
            for (i, elem_ty) in t.elems.iter().enumerate() {
                let value = lower_default(fe, *elem_ty)?;
                let offset = layout.field_offsets[i];
                let field_ptr = fe.fresh_temp_pub();
                fe.push(format!("{field_ptr} = getelementptr inbounds i8, ptr {ptr}, i64 {offset}"));
                let llvm = types::llvm_value_type(interner, *elem_ty)?;
                fe.push(format!("store {} {value}, ptr {field_ptr}", llvm.text()));
            }
            Ok(ptr)
        }
        types::Kind::Array => {
            let array_info = interner.array_info(resolved)?;
            if array_info.dynamic {
                let header = fe.fresh_temp_pub();
                fe.push(format!("{header} = call ptr @rt_alloc(i64 {}, i64 {})", types::ARRAY_HEADER_SIZE, types::ARRAY_HEADER_ALIGN));
                fe.push(format!("store i64 0, ptr {header}"));
                let cap_ptr = fe.fresh_temp_pub();
                fe.push(format!("{cap_ptr} = getelementptr inbounds i8, ptr {header}, i64 {}", types::ARRAY_HEADER_CAP_OFFSET));
                fe.push(format!("store i64 0, ptr {cap_ptr}"));
                let data_slot = fe.fresh_temp_pub();
                fe.push(format!("{data_slot} = getelementptr inbounds i8, ptr {header}, i64 {}", types::ARRAY_HEADER_DATA_OFFSET));
                fe.push(format!("store ptr null, ptr {data_slot}"));
                return Ok(header);
            }
            let n = array_info.fixed_len.context("fixed array missing its known length")?;
            let elem_layout = fe.mcx.layouts.layout_of(array_info.elem)?;
            let stride = types::round_up(elem_layout.size, elem_layout.align.max(1));
            let data = fe.fresh_temp_pub();
            fe.push(format!("{data} = call ptr @rt_alloc(i64 {}, i64 {})", stride * n, elem_layout.align.max(1)));
            let elem_llvm = types::llvm_value_type(interner, array_info.elem)?;
            for i in 0..n {
                let value = lower_default(fe, array_info.elem)?;
                let elem_ptr = fe.fresh_temp_pub();
                fe.push(format!("{elem_ptr} = getelementptr inbounds i8, ptr {data}, i64 {}", stride * i));
                fe.push(format!("store {} {value}, ptr {elem_ptr}", elem_llvm.text()));
            }
            Ok(data)
        }
        _ => bail!("default<T> is not specified for this type kind"),
    }
}

/// Item 10: `exit(e)`. Extracts `{message, code}`, range-checks the
/// code into `i64`, auto-appends a trailing newline if the message
/// lacks one, writes to stderr, then `rt_exit(code)`.
fn lower_exit(fe: &mut FuncEmitter<'_, '_>, error: &Operand) -> Result<()> {
    let interner = fe.mcx.interner;
    let ty = error.ty();
    let resolved = types::resolve_through_wrappers(interner, ty)?;
    let s = interner.struct_info(resolved).context("exit(e) requires a struct-shaped {message, code} payload")?;
    let msg_idx = s.fields.iter().position(|(n, _)| n == "message").context("exit payload missing message field")?;
    let code_idx = s.fields.iter().position(|(n, _)| n == "code").context("exit payload missing code field")?;
    let code_ty = s.fields[code_idx].1;
    let layout = fe.mcx.layouts.layout_of(resolved)?;
    let handle = rvalue::emit_handle_operand_ptr(fe, error)?;

    let msg_field_ptr = fe.fresh_temp_pub();
    fe.push(format!("{msg_field_ptr} = getelementptr inbounds i8, ptr {handle}, i64 {}", layout.field_offsets[msg_idx]));
    let message = fe.fresh_temp_pub();
    fe.push(format!("{message} = load ptr, ptr {msg_field_ptr}"));

    let code_field_ptr = fe.fresh_temp_pub();
    fe.push(format!("{code_field_ptr} = getelementptr inbounds i8, ptr {handle}, i64 {}", layout.field_offsets[code_idx]));
    let code_llvm = types::llvm_value_type(interner, code_ty)?;
    let code_val = fe.fresh_temp_pub();
    fe.push(format!("{code_val} = load {}, ptr {code_field_ptr}", code_llvm.text()));
    let code64 = if let Some(big) = rvalue::big_kind(fe, code_ty)? {
        numeric::emit_big_numeric_cast(fe, &code_val, Some(big), LlvmType::Ptr, None, LlvmType::I64)?
    } else {
        let signed = types::numeric_kind_of(interner, code_ty)? == NumericKind::Int;
        numeric::widen_to_i64(fe, &code_val, code_llvm, signed)
    };

    let len = fe.fresh_temp_pub();
    fe.push(format!("{len} = call i64 @rt_string_len_bytes(ptr {message})"));
    let last_idx = fe.fresh_temp_pub();
    fe.push(format!("{last_idx} = sub i64 {len}, 1"));
    let last = fe.fresh_temp_pub();
    fe.push(format!("{last} = call i8 @rt_string_index(ptr {message}, i64 {last_idx})")); // out-of-range index (empty message: last_idx = -1) reads as 0 by convention.
    let nl = pool_string_handle(fe, "\n");
    let has_nl = fe.fresh_temp_pub();
    fe.push(format!("{has_nl} = icmp eq i8 {last}, 10"));
    let append_label = fe.fresh_inline_label(Some("exit_append_nl"));
    let write_label = fe.fresh_inline_label(Some("exit_write"));
    fe.push(format!("br i1 {has_nl}, label %{write_label}, label %{append_label}"));

    let final_slot = fe.fresh_temp_pub();
    fe.push(format!("{final_slot} = alloca ptr"));
    fe.push(format!("store ptr {message}, ptr {final_slot}"));

    fe.open_label(&append_label);
    let with_nl = concat_strings(fe, &message, &nl);
    fe.push(format!("store ptr {with_nl}, ptr {final_slot}"));
    fe.push(format!("br label %{write_label}"));

    fe.open_label(&write_label);
    let final_msg = fe.fresh_temp_pub();
    fe.push(format!("{final_msg} = load ptr, ptr {final_slot}"));
    let final_len = fe.fresh_temp_pub();
    fe.push(format!("{final_len} = call i64 @rt_string_len_bytes(ptr {final_msg})"));
    fe.push(format!("call i64 @rt_write_stderr(ptr {final_msg}, i64 {final_len})"));
    fe.push(format!("call void @rt_exit(i64 {code64})"));
    fe.push("unreachable".to_string());
    Ok(())
}

/// Item 11: magic operators. Selected only when the operand types are
/// actually string/string, int/int, float/float, big/big, or
/// string\*int for repeat -- otherwise this returns `Ok(None)` so the
/// dispatcher falls through to the runtime-intrinsic/direct-call items.
fn lower_magic(fe: &mut FuncEmitter<'_, '_>, name: &str, args: &[Operand]) -> Result<Option<(String, TypeId)>> {
    let Some(op) = magic_op_binop(name) else {
        if let Some(op) = magic_op_unop(name) {
            if args.len() == 1 {
                return Ok(Some(lower_magic_unary(fe, op, &args[0])?));
            }
        }
        return Ok(None);
    };
    if args.len() != 2 {
        return Ok(None);
    }
    lower_magic_binary(fe, op, &args[0], &args[1])
}

fn magic_op_binop(name: &str) -> Option<crate::mir::BinOp> {
    use crate::mir::BinOp;
    Some(match name {
        "__add" => BinOp::Add,
        "__sub" => BinOp::Sub,
        "__mul" => BinOp::Mul,
        "__div" => BinOp::Div,
        "__rem" => BinOp::Rem,
        "__bitand" => BinOp::BitAnd,
        "__bitor" => BinOp::BitOr,
        "__bitxor" => BinOp::BitXor,
        "__shl" => BinOp::Shl,
        "__shr" => BinOp::Shr,
        "__and" => BinOp::And,
        "__or" => BinOp::Or,
        "__eq" => BinOp::Eq,
        "__ne" => BinOp::Ne,
        "__lt" => BinOp::Lt,
        "__le" => BinOp::Le,
        "__gt" => BinOp::Gt,
        "__ge" => BinOp::Ge,
        _ => return None,
    })
}

fn magic_op_unop(name: &str) -> Option<crate::mir::UnOp> {
    use crate::mir::UnOp;
    Some(match name {
        "__neg" => UnOp::Neg,
        "__not" => UnOp::Not,
        _ => return None,
    })
}

fn lower_magic_binary(
    fe: &mut FuncEmitter<'_, '_>,
    op: crate::mir::BinOp,
    lhs: &Operand,
    rhs: &Operand,
) -> Result<Option<(String, TypeId)>> {
    let interner = fe.mcx.interner;
    let (lv, lty) = rvalue::emit_value_operand(fe, lhs)?;
    let (rv, rty) = rvalue::emit_value_operand(fe, rhs)?;
    if types::is_string_like(interner, lty)? {
        if op == crate::mir::BinOp::Mul && types::numeric_kind_of(interner, rty)? != NumericKind::None {
            let rllvm = types::llvm_type(interner, rty)?;
            let result = numeric::lower_string_repeat(fe, &lv, &rv, rllvm)?;
            return Ok(Some((result, lty)));
        }
        if types::is_string_like(interner, rty)? {
            let (result, _llvm) = numeric::lower_string_binary(fe, op, &lv, &rv)?;
            return Ok(Some((result, lty)));
        }
        return Ok(None);
    }
    let l_kind = types::numeric_kind_of(interner, lty)?;
    let r_kind = types::numeric_kind_of(interner, rty)?;
    let l_big = rvalue::big_kind(fe, lty)?;
    let r_big = rvalue::big_kind(fe, rty)?;
    if l_kind == NumericKind::None && l_big.is_none() {
        return Ok(None);
    }
    if r_kind == NumericKind::None && r_big.is_none() {
        return Ok(None);
    }
    let l = numeric::classify(fe, lv, lty)?;
    let r = numeric::classify(fe, rv, rty)?;
    let (l, r) = numeric::coerce_pair(fe, l, r);
    let (result, _llvm) = numeric::lower_binary(fe, op, l, r)?;
    Ok(Some((result, lty)))
}

fn lower_magic_unary(fe: &mut FuncEmitter<'_, '_>, op: crate::mir::UnOp, operand: &Operand) -> Result<(String, TypeId)> {
    let (v, ty) = rvalue::emit_value_operand(fe, operand)?;
    let classified = numeric::classify(fe, v, ty)?;
    let (result, _llvm) = numeric::lower_unary(fe, op, classified)?;
    Ok((result, ty))
}

/// `rt_`-prefixed runtime intrinsics bind straight through to the
/// declared runtime ABI. This module has no declared parameter-type
/// table for `rt_*` functions, so it passes every argument using its
/// own natural LLVM type and lets the runtime's variadic-by-convention
/// i64 ABI absorb pointer/scalar arguments uniformly -- composite/
/// Option-style decoding on the consuming side is the runtime's
/// responsibility.
fn lower_runtime_call(fe: &mut FuncEmitter<'_, '_>, name: &str, args: &[Operand]) -> Result<Option<(String, TypeId)>> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        let (value, ty) = rvalue::emit_value_operand(fe, arg)?;
        let llvm = types::llvm_value_type(fe.mcx.interner, ty)?;
        parts.push(format!("{} {value}", llvm.text()));
    }
    let arg_list = parts.join(", ");
    // Runtime intrinsics without a caller-visible destination (pure
    // side-effecting I/O, e.g. `rt_write_stdout`) are called as void;
    // anything else is assumed to return `ptr` (the ABI's universal
    // handle representation), since this dispatcher has no per-name
    // return-type table.
    if matches!(name, "rt_write_stdout" | "rt_write_stderr" | "rt_free" | "rt_memcpy" | "rt_memmove" | "rt_sleep") {
        fe.push(format!("call void @{name}({arg_list})"));
        return Ok(None);
    }
    let temp = fe.fresh_temp_pub();
    fe.push(format!("{temp} = call ptr @{name}({arg_list})"));
    Ok(Some((temp, TypeId(u32::MAX))))
}

/// Item 13: fallback direct symbol call, resolved through the catalog.
fn lower_direct_call(fe: &mut FuncEmitter<'_, '_>, sym: &Sym, args: &[Operand]) -> Result<Option<(String, TypeId)>> {
    let id = *fe.mcx.module.func_by_sym.get(sym).with_context(|| format!("unknown function symbol `{sym}`"))?;
    let entry = fe.mcx.catalog.entry(id).with_context(|| format!("symbol `{sym}` resolved to an unreachable function"))?;
    let arg_list = lower_args(fe, args, &entry.signature.params)?;
    let link_name = entry.link_name.clone();
    match entry.signature.ret {
        None => {
            fe.push(format!("call void @{link_name}({arg_list})"));
            Ok(None)
        }
        Some(ret_ty) => {
            let ret_llvm = types::llvm_value_type(fe.mcx.interner, ret_ty)?;
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = call {} @{link_name}({arg_list})", ret_llvm.text()));
            Ok(Some((temp, ret_ty)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::build_catalog;
    use crate::func::ModuleCx;
    use crate::mir::{Block, BlockId, Func, FuncId, LocalDecl, LocalId, Module, Terminator};
    use crate::strings::{FnRefs, StringPool};
    use crate::types::mock::MockInterner;
    use crate::types::{Kind, Layout, TypeInfo, Width};

    fn prim(kind: Kind, width: Option<Width>) -> TypeInfo {
        TypeInfo { kind, width, float_width: None, elem: None, count: None, name: None }
    }

    fn empty_func() -> Func {
        Func { id: FuncId(0), name: "f".into(), sym: None, result: None, locals: vec![], blocks: vec![Block {
            id: BlockId(0),
            instrs: vec![],
            term: Terminator::Unreachable,
        }], entry: BlockId(0) }
    }

    #[test]
    fn size_of_emits_layout_constant() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Struct, None));
        interner.layouts.insert(TypeId(0), Layout { size: 16, align: 8, ..Default::default() });
        let mut module = Module::default();
        module.func_type_args.insert(Sym::new("size_of"), vec![TypeId(0)]);
        let func = empty_func();
        module.funcs.push(func.clone());
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        let v = lower_size_of(&mut fe, &Sym::new("size_of"), false).unwrap();
        assert_eq!(v, "16");
    }

    #[test]
    fn array_len_loads_header_field() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Array, None));
        interner.arrays.insert(TypeId(0), crate::types::ArrayInfo { elem: TypeId(1), dynamic: true, fixed_len: None });
        interner.infos.insert(TypeId(1), prim(Kind::Int, Some(Width::W32)));
        let local = LocalDecl { id: LocalId(0), ty: TypeId(0), sym: None };
        let mut func = empty_func();
        func.locals.push(local);
        let module = Module::default();
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        fe.emit_prologue(0).unwrap();
        let operand = Operand::Copy { place: Place::local(LocalId(0)), ty: TypeId(0) };
        let (v, _) = lower_len(&mut fe, &operand).unwrap();
        let lines = fe.finish();
        assert!(lines.iter().any(|l| l.contains("load i64, ptr")));
        assert!(v.starts_with('%'));
    }

    #[test]
    fn clone_of_non_task_reloads_value() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Int, Some(Width::W32)));
        let local = LocalDecl { id: LocalId(0), ty: TypeId(0), sym: None };
        let mut func = empty_func();
        func.locals.push(local);
        let module = Module::default();
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        fe.emit_prologue(0).unwrap();
        let operand = Operand::Copy { place: Place::local(LocalId(0)), ty: TypeId(0) };
        let (v, ty) = lower_clone(&mut fe, &operand).unwrap();
        assert_eq!(ty, TypeId(0));
        assert!(v.starts_with('%'));
    }

    #[test]
    fn magic_add_on_ints_dispatches_to_numeric_binary() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Int, Some(Width::W32)));
        let l = LocalDecl { id: LocalId(0), ty: TypeId(0), sym: None };
        let r = LocalDecl { id: LocalId(1), ty: TypeId(0), sym: None };
        let mut func = empty_func();
        func.locals.push(l);
        func.locals.push(r);
        let module = Module::default();
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        fe.emit_prologue(0).unwrap();
        let lhs = Operand::Copy { place: Place::local(LocalId(0)), ty: TypeId(0) };
        let rhs = Operand::Copy { place: Place::local(LocalId(1)), ty: TypeId(0) };
        let result = lower_magic(&mut fe, "__add", &[lhs, rhs]).unwrap();
        assert!(result.is_some());
        let lines = fe.finish();
        assert!(lines.iter().any(|l| l.contains("add i32")));
    }

    #[test]
    fn unknown_magic_name_returns_none() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Int, Some(Width::W32)));
        let l = LocalDecl { id: LocalId(0), ty: TypeId(0), sym: None };
        let mut func = empty_func();
        func.locals.push(l);
        let module = Module::default();
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        fe.emit_prologue(0).unwrap();
        let operand = Operand::Copy { place: Place::local(LocalId(0)), ty: TypeId(0) };
        let result = lower_magic(&mut fe, "__frobnicate", &[operand]).unwrap();
        assert!(result.is_none());
    }
}
