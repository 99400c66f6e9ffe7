//! Async/Task Lowering.
//!
//! Lowers `Spawn`/`Await`/`Poll`/`JoinAll`/`ChanSend`/`ChanRecv` against
//! the runtime's task/scope/channel ABI, and builds the module-wide
//! poll-dispatch function `@__surge_poll_call` that the runtime calls
//! back into by FuncId.
//!
//! `Poll`/`JoinAll`/`ChanSend`/`ChanRecv` each branch to one of two MIR
//! blocks on their own account rather than falling through to the
//! block's own terminator (`control::lower_block` stops early for
//! these); `Spawn`/`Await` do not branch and leave the block's own
//! terminator to run afterward.

use crate::func::FuncEmitter;
use crate::mir::{BlockId, FuncId, Module, Operand, Place, TypeId};
use crate::numeric;
use crate::place;
use crate::rvalue;
use crate::tag;
use crate::types::{self, LlvmType};
use anyhow::{bail, Context, Result};

/// Encodes an already-materialized value as the `i64` bit pattern the
/// runtime's task/channel ABI moves results through: pointers via
/// `ptrtoint`, floats/halves via `bitcast`+`zext`, narrower integers via
/// `zext`, `i64` passed through unchanged.
pub fn value_to_i64_bits(fe: &mut FuncEmitter<'_, '_>, value: &str, llvm: LlvmType) -> String {
    match llvm {
        LlvmType::I64 => value.to_string(),
        LlvmType::Ptr => {
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = ptrtoint ptr {value} to i64"));
            temp
        }
        LlvmType::Double => {
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = bitcast double {value} to i64"));
            temp
        }
        LlvmType::Float => {
            let widened = fe.fresh_temp_pub();
            fe.push(format!("{widened} = fpext float {value} to double"));
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = bitcast double {widened} to i64"));
            temp
        }
        LlvmType::Half => {
            let widened = fe.fresh_temp_pub();
            fe.push(format!("{widened} = fpext half {value} to double"));
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = bitcast double {widened} to i64"));
            temp
        }
        LlvmType::Void => "0".to_string(),
        LlvmType::I1 | LlvmType::I8 | LlvmType::I16 | LlvmType::I32 => {
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = zext {} {value} to i64", llvm.text()));
            temp
        }
    }
}

/// The reverse of `value_to_i64_bits`: decodes an `i64` bit pattern back
/// into `ty`'s native LLVM representation.
fn bits_to_value(fe: &mut FuncEmitter<'_, '_>, bits: &str, ty: TypeId) -> Result<String> {
    let interner = fe.mcx.interner;
    let llvm = types::llvm_value_type(interner, ty)?;
    Ok(match llvm {
        LlvmType::I64 => bits.to_string(),
        LlvmType::Ptr => {
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = inttoptr i64 {bits} to ptr"));
            temp
        }
        LlvmType::Double => {
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = bitcast i64 {bits} to double"));
            temp
        }
        LlvmType::Float => {
            let wide = fe.fresh_temp_pub();
            fe.push(format!("{wide} = bitcast i64 {bits} to double"));
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = fptrunc double {wide} to float"));
            temp
        }
        LlvmType::Half => {
            let wide = fe.fresh_temp_pub();
            fe.push(format!("{wide} = bitcast i64 {bits} to double"));
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = fptrunc double {wide} to half"));
            temp
        }
        LlvmType::Void => "0".to_string(),
        LlvmType::I1 | LlvmType::I8 | LlvmType::I16 | LlvmType::I32 => {
            let temp = fe.fresh_temp_pub();
            fe.push(format!("{temp} = trunc i64 {bits} to {}", llvm.text()));
            temp
        }
    })
}

fn store_result(fe: &mut FuncEmitter<'_, '_>, dst: &Place, value: String, value_ty: TypeId) -> Result<()> {
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

/// `rt_task_wake(task_ptr)` then stores the task pointer into `dst`.
pub fn lower_spawn(fe: &mut FuncEmitter<'_, '_>, dst: &Place, task: &Operand) -> Result<()> {
    let ptr = rvalue::emit_handle_operand_ptr(fe, task)?;
    fe.push(format!("call void @rt_task_wake(ptr {ptr})"));
    store_result(fe, dst, ptr, task.ty())
}

/// Finds the union type's `Success`/`Cancelled`-shaped `TaskResult`
/// cases so `Await`/`Poll` can build the right tag value: the
/// single-payload case (whatever it is named) holds `Success`, the
/// zero-payload case holds `Cancelled`.
fn task_result_cases<'m>(
    module: &'m Module,
    result_ty: TypeId,
) -> Result<(usize, crate::mir::TagCaseMeta, usize, crate::mir::TagCaseMeta)> {
    let cases = module.tag_layouts.get(&result_ty).context("await/poll destination has no TaskResult union layout")?;
    let (success_idx, success) = cases
        .iter()
        .enumerate()
        .find(|(_, c)| c.payload_types.len() == 1)
        .context("TaskResult union missing a Success case")?;
    let (cancelled_idx, cancelled) = cases
        .iter()
        .enumerate()
        .find(|(_, c)| c.payload_types.is_empty())
        .context("TaskResult union missing a Cancelled case")?;
    Ok((success_idx, success.clone(), cancelled_idx, cancelled.clone()))
}

/// `rt_task_await(task, &kind:i8, &bits:i64)`, then branches on
/// `kind == 1` to build `Success(payload)`, else `Cancelled`.
pub fn lower_await(fe: &mut FuncEmitter<'_, '_>, dst: &Place, task: &Operand, result_ty: TypeId) -> Result<()> {
    let task_ptr = rvalue::emit_handle_operand_ptr(fe, task)?;
    let kind_slot = fe.fresh_temp_pub();
    fe.push(format!("{kind_slot} = alloca i8"));
    let bits_slot = fe.fresh_temp_pub();
    fe.push(format!("{bits_slot} = alloca i64"));
    fe.push(format!("call void @rt_task_await(ptr {task_ptr}, ptr {kind_slot}, ptr {bits_slot})"));
    let kind = fe.fresh_temp_pub();
    fe.push(format!("{kind} = load i8, ptr {kind_slot}"));

    let (success_idx, success_case, cancelled_idx, cancelled_case) = task_result_cases(fe.mcx.module, result_ty)?;
    let is_success = fe.fresh_temp_pub();
    fe.push(format!("{is_success} = icmp eq i8 {kind}, 1"));
    let success_label = fe.fresh_inline_label(Some("await_success"));
    let cancelled_label = fe.fresh_inline_label(Some("await_cancelled"));
    let merge_label = fe.fresh_inline_label(Some("await_merge"));
    let slot = fe.fresh_temp_pub();
    fe.push(format!("{slot} = alloca ptr"));
    fe.push(format!("br i1 {is_success}, label %{success_label}, label %{cancelled_label}"));

    fe.open_label(&success_label);
    let bits = fe.fresh_temp_pub();
    fe.push(format!("{bits} = load i64, ptr {bits_slot}"));
    let payload_ty = success_case.payload_types[0];
    let payload = bits_to_value(fe, &bits, payload_ty)?;
    let success_ptr = tag::alloc_tag(fe, result_ty, success_idx, &success_case, &[(payload, payload_ty)])?;
    fe.push(format!("store ptr {success_ptr}, ptr {slot}"));
    fe.push(format!("br label %{merge_label}"));

    fe.open_label(&cancelled_label);
    let cancelled_ptr = tag::alloc_tag(fe, result_ty, cancelled_idx, &cancelled_case, &[])?;
    fe.push(format!("store ptr {cancelled_ptr}, ptr {slot}"));
    fe.push(format!("br label %{merge_label}"));

    fe.open_label(&merge_label);
    let result = fe.fresh_temp_pub();
    fe.push(format!("{result} = load ptr, ptr {slot}"));
    store_result(fe, dst, result, result_ty)
}

/// `rt_task_await`-style poll probe, branching directly to the MIR
/// `pending`/`ready` blocks instead of merging into a local value: on
/// `kind == 0` the task is still pending and the MIR pending block
/// runs; otherwise the result is stored and the MIR ready block runs.
pub fn lower_poll(
    fe: &mut FuncEmitter<'_, '_>,
    dst: &Place,
    task: &Operand,
    result_ty: TypeId,
    pending: BlockId,
    ready: BlockId,
) -> Result<()> {
    let task_ptr = rvalue::emit_handle_operand_ptr(fe, task)?;
    let kind_slot = fe.fresh_temp_pub();
    fe.push(format!("{kind_slot} = alloca i8"));
    let bits_slot = fe.fresh_temp_pub();
    fe.push(format!("{bits_slot} = alloca i64"));
    fe.push(format!("call void @rt_task_await(ptr {task_ptr}, ptr {kind_slot}, ptr {bits_slot})"));
    let kind = fe.fresh_temp_pub();
    fe.push(format!("{kind} = load i8, ptr {kind_slot}"));
    let is_pending = fe.fresh_temp_pub();
    fe.push(format!("{is_pending} = icmp eq i8 {kind}, 0"));

    let ready_label = fe.fresh_inline_label(Some("poll_ready"));
    fe.push(format!("br i1 {is_pending}, label %bb{}, label %{ready_label}", pending.inner()));

    fe.open_label(&ready_label);
    let (success_idx, success_case, cancelled_idx, cancelled_case) = task_result_cases(fe.mcx.module, result_ty)?;
    let is_success = fe.fresh_temp_pub();
    fe.push(format!("{is_success} = icmp eq i8 {kind}, 1"));
    let success_label = fe.fresh_inline_label(Some("poll_success"));
    let cancelled_label = fe.fresh_inline_label(Some("poll_cancelled"));
    let merge_label = fe.fresh_inline_label(Some("poll_merge"));
    let slot = fe.fresh_temp_pub();
    fe.push(format!("{slot} = alloca ptr"));
    fe.push(format!("br i1 {is_success}, label %{success_label}, label %{cancelled_label}"));

    fe.open_label(&success_label);
    let bits = fe.fresh_temp_pub();
    fe.push(format!("{bits} = load i64, ptr {bits_slot}"));
    let payload_ty = success_case.payload_types[0];
    let payload = bits_to_value(fe, &bits, payload_ty)?;
    let success_ptr = tag::alloc_tag(fe, result_ty, success_idx, &success_case, &[(payload, payload_ty)])?;
    fe.push(format!("store ptr {success_ptr}, ptr {slot}"));
    fe.push(format!("br label %{merge_label}"));

    fe.open_label(&cancelled_label);
    let cancelled_ptr = tag::alloc_tag(fe, result_ty, cancelled_idx, &cancelled_case, &[])?;
    fe.push(format!("store ptr {cancelled_ptr}, ptr {slot}"));
    fe.push(format!("br label %{merge_label}"));

    fe.open_label(&merge_label);
    let result = fe.fresh_temp_pub();
    fe.push(format!("{result} = load ptr, ptr {slot}"));
    store_result(fe, dst, result, result_ty)?;
    fe.push(format!("br label %bb{}", ready.inner()));
    Ok(())
}

/// `rt_scope_join_all(scope, &pending:i64, &failfast:i1)`; "done" stores
/// the failfast bit into `dst` and runs the MIR ready block, otherwise
/// the MIR pending block runs. `pending` here is an out-param distinct
/// from the `pending` `BlockId`; the runtime reports "not done" through
/// that out-param, read back as the branch condition.
pub fn lower_join_all(
    fe: &mut FuncEmitter<'_, '_>,
    dst: &Place,
    scope: &Operand,
    pending: BlockId,
    ready: BlockId,
) -> Result<()> {
    let scope_ptr = rvalue::emit_handle_operand_ptr(fe, scope)?;
    let pending_slot = fe.fresh_temp_pub();
    fe.push(format!("{pending_slot} = alloca i64"));
    let failfast_slot = fe.fresh_temp_pub();
    fe.push(format!("{failfast_slot} = alloca i1"));
    fe.push(format!("call void @rt_scope_join_all(ptr {scope_ptr}, ptr {pending_slot}, ptr {failfast_slot})"));
    let still_pending_bits = fe.fresh_temp_pub();
    fe.push(format!("{still_pending_bits} = load i64, ptr {pending_slot}"));
    let still_pending = fe.fresh_temp_pub();
    fe.push(format!("{still_pending} = icmp ne i64 {still_pending_bits}, 0"));
    let done_label = fe.fresh_inline_label(Some("join_all_done"));
    fe.push(format!("br i1 {still_pending}, label %bb{}, label %{done_label}", pending.inner()));

    fe.open_label(&done_label);
    let failfast = fe.fresh_temp_pub();
    fe.push(format!("{failfast} = load i1, ptr {failfast_slot}"));
    store_result(fe, dst, failfast, dst_bool_ty(fe, dst)?)?;
    fe.push(format!("br label %bb{}", ready.inner()));
    Ok(())
}

fn dst_bool_ty(fe: &mut FuncEmitter<'_, '_>, dst: &Place) -> Result<TypeId> {
    place::place_static_type(fe, fe.mcx.interner, dst)
}

/// `rt_channel_send(ch, bits) -> i1`; `true` branches to the MIR
/// `ready` block, `false` to `pending`.
pub fn lower_chan_send(
    fe: &mut FuncEmitter<'_, '_>,
    chan: &Operand,
    value: &Operand,
    ready: BlockId,
    pending: BlockId,
) -> Result<()> {
    let chan_ptr = rvalue::emit_handle_operand_ptr(fe, chan)?;
    let (value_val, value_ty) = rvalue::emit_value_operand(fe, value)?;
    let llvm = types::llvm_value_type(fe.mcx.interner, value_ty)?;
    let bits = value_to_i64_bits(fe, &value_val, llvm);
    let sent = fe.fresh_temp_pub();
    fe.push(format!("{sent} = call i1 @rt_channel_send(ptr {chan_ptr}, i64 {bits})"));
    fe.push(format!("br i1 {sent}, label %bb{}, label %bb{}", ready.inner(), pending.inner()));
    Ok(())
}

/// `rt_channel_recv(ch, &bits) -> i8` (0 = Pending, 1 = Value, 2 =
/// Closed); branches to `pending`/`value_block`/`closed_block`
/// accordingly, constructing an `Option`-shaped `Some(v)`/`nothing`
/// union for the value/closed cases.
pub fn lower_chan_recv(
    fe: &mut FuncEmitter<'_, '_>,
    dst: &Place,
    chan: &Operand,
    elem_ty: TypeId,
    pending: BlockId,
    value_block: BlockId,
    closed_block: BlockId,
) -> Result<()> {
    let chan_ptr = rvalue::emit_handle_operand_ptr(fe, chan)?;
    let bits_slot = fe.fresh_temp_pub();
    fe.push(format!("{bits_slot} = alloca i64"));
    let kind = fe.fresh_temp_pub();
    fe.push(format!("{kind} = call i8 @rt_channel_recv(ptr {chan_ptr}, ptr {bits_slot})"));

    let pending_label = fe.fresh_inline_label(Some("chan_recv_pending"));
    let not_pending_label = fe.fresh_inline_label(Some("chan_recv_not_pending"));
    let is_pending = fe.fresh_temp_pub();
    fe.push(format!("{is_pending} = icmp eq i8 {kind}, 0"));
    fe.push(format!("br i1 {is_pending}, label %{pending_label}, label %{not_pending_label}"));
    fe.open_label(&pending_label);
    fe.push(format!("br label %bb{}", pending.inner()));

    fe.open_label(&not_pending_label);
    let is_closed = fe.fresh_temp_pub();
    fe.push(format!("{is_closed} = icmp eq i8 {kind}, 2"));
    let closed_label = fe.fresh_inline_label(Some("chan_recv_closed"));
    let value_label = fe.fresh_inline_label(Some("chan_recv_value"));
    fe.push(format!("br i1 {is_closed}, label %{closed_label}, label %{value_label}"));

    fe.open_label(&closed_label);
    fe.push(format!("br label %bb{}", closed_block.inner()));

    fe.open_label(&value_label);
    let bits = fe.fresh_temp_pub();
    fe.push(format!("{bits} = load i64, ptr {bits_slot}"));
    let value = bits_to_value(fe, &bits, elem_ty)?;
    let dst_ty = place::place_static_type(fe, fe.mcx.interner, dst)?;
    let cases = fe.mcx.module.tag_layouts.get(&dst_ty).context("chan recv destination has no Option-shaped union layout")?.clone();
    let (some_idx, some_case) = cases
        .iter()
        .enumerate()
        .find(|(_, c)| c.payload_types.len() == 1)
        .context("chan recv destination union missing a Some(value) case")?;
    let ptr = tag::alloc_tag(fe, dst_ty, some_idx, some_case, &[(value, elem_ty)])?;
    store_result(fe, dst, ptr, dst_ty)?;
    fe.push(format!("br label %bb{}", value_block.inner()));
    Ok(())
}

/// Builds `@__surge_poll_call(i64 %id)`: a `switch` over every `$poll`
/// function's stable FuncId, each arm calling the
/// poll body with no parameters and a void return; the default arm
/// panics with the well-known message `"missing poll function"`.
pub fn emit_poll_dispatch_table(
    module: &Module,
    catalog: &crate::catalog::Catalog,
    pool: &mut crate::strings::StringPool,
) -> Result<String> {
    let mut poll_ids: Vec<FuncId> = module.funcs.iter().filter(|f| f.is_poll()).map(|f| f.id).collect();
    poll_ids.sort_by_key(|id| id.inner());

    let mut arms = Vec::with_capacity(poll_ids.len());
    let mut bodies = String::new();
    for id in &poll_ids {
        let entry = catalog.entry(*id).with_context(|| format!("poll function {id} missing from the catalog"))?;
        let label = format!("bb.poll.{}", id.inner());
        arms.push(format!("i64 {}, label %{label}", id.inner()));
        bodies.push_str(&format!("{label}:\n  call void @{}()\n  ret void\n", entry.link_name));
    }

    let msg_id = pool.intern("missing poll function");
    let msg_label = pool.label_for(msg_id);
    let msg_len = pool.get(msg_id).len();

    let mut out = String::new();
    out.push_str("define void @__surge_poll_call(i64 %id) {\n");
    out.push_str(&format!("  switch i64 %id, label %bb.poll.default [ {} ]\n", arms.join(" ")));
    out.push_str("bb.poll.default:\n");
    out.push_str(&format!("  call void @rt_panic(ptr {msg_label}, i64 {msg_len})\n"));
    out.push_str("  unreachable\n");
    for line in bodies.lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("}\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::build_catalog;
    use crate::func::ModuleCx;
    use crate::mir::{Block, Func, LocalDecl, LocalId, Sym, Terminator};
    use crate::strings::FnRefs;
    use crate::types::mock::MockInterner;
    use crate::types::{Kind, TypeInfo, Width};

    fn prim(kind: Kind, width: Option<Width>) -> TypeInfo {
        TypeInfo { kind, width, float_width: None, elem: None, count: None, name: None }
    }

    fn poll_func(id: u32, name: &str) -> Func {
        Func {
            id: FuncId(id),
            name: name.into(),
            sym: Some(Sym::new(name)),
            result: None,
            locals: vec![],
            blocks: vec![Block { id: BlockId(0), instrs: vec![], term: Terminator::Unreachable }],
            entry: BlockId(0),
        }
    }

    #[test]
    fn value_to_i64_bits_zexts_narrow_ints() {
        let interner = MockInterner::default();
        let module = Module::default();
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = crate::strings::StringPool::new();
        let mut fn_refs = FnRefs::new();
        let func = poll_func(0, "f");
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        let bits = value_to_i64_bits(&mut fe, "%v", LlvmType::I32);
        let lines = fe.finish();
        assert!(lines.iter().any(|l| l.contains("zext i32")));
        assert!(bits.starts_with('%'));
    }

    #[test]
    fn poll_dispatch_table_has_one_arm_per_poll_func() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Unit, None));
        let mut module = Module::default();
        module.funcs.push(poll_func(0, "a$poll"));
        module.funcs.push(poll_func(1, "b$poll"));
        module.funcs.push(poll_func(2, "plain"));
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mut pool = crate::strings::StringPool::new();
        let text = emit_poll_dispatch_table(&module, &catalog, &mut pool).unwrap();
        assert!(text.contains("i64 0, label %bb.poll.0"));
        assert!(text.contains("i64 1, label %bb.poll.1"));
        assert!(!text.contains("i64 2, label %bb.poll.2"));
        assert!(text.contains("missing poll function"));
        let _ = &interner;
    }
}
