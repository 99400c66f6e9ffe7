//! Control Flow & Terminators.
//!
//! Lowers a single MIR `Block` -- its instruction list, then its
//! terminator -- into LLVM IR text. Blocks are emitted entry-first, the
//! entry block sharing the function's implicit first basic block (no
//! label, allocas already pushed by `FuncEmitter::emit_prologue`); every
//! other block opens its own `bb<ID>:` label.
//!
//! `Spawn`/`Await`/`Poll`/`JoinAll`/`ChanSend`/`ChanRecv` are dispatched to
//! `async_lower`: the latter four branch on their own account, so this
//! module stops lowering the current block the moment one of them is
//! reached rather than also emitting the block's nominal terminator
//! (which is `Unreachable` by construction in that case).

use crate::func::FuncEmitter;
use crate::mir::{Block, Instr, Place, RValue, Terminator};
use crate::place;
use crate::rvalue;
use crate::tag;
use crate::types;
use anyhow::Result;

pub fn lower_block(fe: &mut FuncEmitter<'_, '_>, block: &Block, is_entry: bool) -> Result<()> {
    if !is_entry {
        fe.open_label(&format!("bb{}", block.id.inner()));
    }
    for instr in &block.instrs {
        match instr {
            Instr::Assign { dst, src } => lower_assign(fe, dst, src)?,
            Instr::Call(call) => crate::call::lower_call(fe, call)?,
            Instr::Drop(_) | Instr::EndBorrow(_) | Instr::Nop => {}
            Instr::Spawn { dst, task } => crate::async_lower::lower_spawn(fe, dst, task)?,
            Instr::Await { dst, task, result_ty } => {
                crate::async_lower::lower_await(fe, dst, task, *result_ty)?
            }
            Instr::Poll { dst, task, result_ty, pending, ready } => {
                crate::async_lower::lower_poll(fe, dst, task, *result_ty, *pending, *ready)?;
                return Ok(());
            }
            Instr::JoinAll { dst, scope, pending, ready } => {
                crate::async_lower::lower_join_all(fe, dst, scope, *pending, *ready)?;
                return Ok(());
            }
            Instr::ChanSend { chan, value, ready, pending } => {
                crate::async_lower::lower_chan_send(fe, chan, value, *ready, *pending)?;
                return Ok(());
            }
            Instr::ChanRecv { dst, chan, elem_ty, pending, value_block, closed_block } => {
                crate::async_lower::lower_chan_recv(fe, dst, chan, *elem_ty, *pending, *value_block, *closed_block)?;
                return Ok(());
            }
        }
    }
    lower_terminator(fe, &block.term)
}

/// `dst`'s static type is resolved before the source rvalue is lowered:
/// a mismatch against a union destination routes through the union
/// promotion/widen-or-narrow logic rather than plain numeric coercion.
fn lower_assign(fe: &mut FuncEmitter<'_, '_>, dst: &Place, src: &RValue) -> Result<()> {
    let interner = fe.mcx.interner;
    let dst_ty = place::place_static_type(fe, interner, dst)?;
    let (value, value_ty) = rvalue::lower_rvalue(fe, src)?;
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

fn lower_terminator(fe: &mut FuncEmitter<'_, '_>, term: &Terminator) -> Result<()> {
    match term {
        Terminator::Return { value } => lower_return(fe, value.as_ref()),
        Terminator::Goto(target) => {
            fe.push(format!("br label %bb{}", target.inner()));
            Ok(())
        }
        Terminator::If { cond, then_blk, else_blk } => {
            let (condv, _) = rvalue::emit_value_operand(fe, cond)?;
            fe.push(format!("br i1 {condv}, label %bb{}, label %bb{}", then_blk.inner(), else_blk.inner()));
            Ok(())
        }
        Terminator::SwitchTag { value, ty, cases, default } => {
            let ptr = rvalue::emit_handle_operand_ptr(fe, value)?;
            let disc = fe.fresh_temp_pub();
            fe.push(format!("{disc} = load i32, ptr {ptr}"));
            let mut arms = Vec::with_capacity(cases.len());
            for (case, blk) in cases {
                let idx = tag::case_index(fe, *ty, case)?;
                arms.push(format!("i32 {idx}, label %bb{}", blk.inner()));
            }
            fe.push(format!("switch i32 {disc}, label %bb{} [ {} ]", default.inner(), arms.join(" ")));
            Ok(())
        }
        Terminator::Unreachable => {
            fe.push("unreachable".to_string());
            Ok(())
        }
        Terminator::AsyncYield { state } => {
            let ptr = rvalue::emit_handle_operand_ptr(fe, state)?;
            fe.push(format!("call void @rt_async_yield(ptr {ptr})"));
            fe.push("unreachable".to_string());
            Ok(())
        }
        Terminator::AsyncReturn { state, value } => {
            let state_ptr = rvalue::emit_handle_operand_ptr(fe, state)?;
            let bits = match value {
                Some(op) => {
                    let (v, ty) = rvalue::emit_value_operand(fe, op)?;
                    let llvm = types::llvm_value_type(fe.mcx.interner, ty)?;
                    crate::async_lower::value_to_i64_bits(fe, &v, llvm)
                }
                None => "0".to_string(),
            };
            fe.push(format!("call void @rt_async_return(ptr {state_ptr}, i64 {bits})"));
            fe.push("unreachable".to_string());
            Ok(())
        }
        Terminator::AsyncReturnCancelled { state } => {
            let ptr = rvalue::emit_handle_operand_ptr(fe, state)?;
            fe.push(format!("call void @rt_async_return_cancelled(ptr {ptr})"));
            fe.push("unreachable".to_string());
            Ok(())
        }
    }
}

/// A declared union return type is always targeted through the union
/// promotion path, even when the returned value already has that exact
/// type, since a same-type union return can still need its cases
/// renumbered against a distinct but structurally compatible
/// instantiation (alias/own resolution can land two nominally different
/// union types on the same case set).
fn lower_return(fe: &mut FuncEmitter<'_, '_>, value: Option<&crate::mir::Operand>) -> Result<()> {
    let ret_ty = fe.mcx.catalog.entry(fe.func().id).and_then(|e| e.signature.ret);
    match (value, ret_ty) {
        (None, _) => {
            fe.push("ret void".to_string());
            Ok(())
        }
        (Some(op), None) => {
            // A declared-void function whose MIR still carries a return
            // operand (e.g. a discarded expression result); lower for any
            // side effects and discard the value.
            let _ = rvalue::emit_value_operand(fe, op)?;
            fe.push("ret void".to_string());
            Ok(())
        }
        (Some(op), Some(rty)) => {
            let (val, val_ty) = rvalue::emit_value_operand(fe, op)?;
            let promoted = if types::is_union_type(fe.mcx.interner, rty)? {
                tag::emit_union_return(fe, rty, &val, val_ty)?
            } else {
                rvalue::coerce_store_value(fe, val, val_ty, rty)?
            };
            let llvm = types::llvm_value_type(fe.mcx.interner, rty)?;
            fe.push(format!("ret {} {promoted}", llvm.text()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::build_catalog;
    use crate::func::ModuleCx;
    use crate::mir::{BlockId, Const, FuncId, LocalDecl, LocalId, Module, Operand, PlaceBase};
    use crate::strings::{FnRefs, StringPool};
    use crate::types::mock::MockInterner;
    use crate::types::{Kind, TypeId, TypeInfo, Width};

    fn prim(kind: Kind, width: Option<Width>) -> TypeInfo {
        TypeInfo { kind, width, float_width: None, elem: None, count: None, name: None }
    }

    fn func_with_entry(id: u32, blocks: Vec<Block>, locals: Vec<LocalDecl>) -> crate::mir::Func {
        crate::mir::Func {
            id: FuncId(id),
            name: "f".into(),
            sym: None,
            result: None,
            locals,
            blocks,
            entry: BlockId(0),
        }
    }

    #[test]
    fn goto_emits_branch() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Int, Some(Width::W32)));
        let block = Block { id: BlockId(0), instrs: vec![], term: Terminator::Goto(BlockId(3)) };
        let func = func_with_entry(0, vec![block.clone()], vec![]);
        let mut module = Module::default();
        module.funcs.push(func.clone());
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        lower_block(&mut fe, &block, true).unwrap();
        let lines = fe.finish();
        assert!(lines.iter().any(|l| l.contains("br label %bb3")));
    }

    #[test]
    fn non_entry_block_opens_its_own_label() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Int, Some(Width::W32)));
        let block = Block { id: BlockId(2), instrs: vec![], term: Terminator::Unreachable };
        let func = func_with_entry(0, vec![block.clone()], vec![]);
        let mut module = Module::default();
        module.funcs.push(func.clone());
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        lower_block(&mut fe, &block, false).unwrap();
        let lines = fe.finish();
        assert_eq!(lines[0], "bb2:");
    }

    #[test]
    fn return_with_no_value_is_void() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Int, Some(Width::W32)));
        let block = Block { id: BlockId(0), instrs: vec![], term: Terminator::Return { value: None } };
        let func = func_with_entry(0, vec![block.clone()], vec![]);
        let mut module = Module::default();
        module.funcs.push(func.clone());
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        lower_block(&mut fe, &block, true).unwrap();
        let lines = fe.finish();
        assert!(lines.iter().any(|l| l == "ret void"));
    }

    #[test]
    fn return_with_scalar_value() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Int, Some(Width::W32)));
        let local = LocalDecl { id: LocalId(0), ty: TypeId(0), sym: None };
        let op = Operand::Const { ty: TypeId(0), value: Const::Int { value: 7, text: None, ty: TypeId(0) } };
        let block = Block { id: BlockId(0), instrs: vec![], term: Terminator::Return { value: Some(op) } };
        let func = func_with_entry(0, vec![block.clone()], vec![local]);
        let mut module = Module::default();
        module.funcs.push(func.clone());
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        fe.emit_prologue(0).unwrap();
        lower_block(&mut fe, &block, true).unwrap();
        let lines = fe.finish();
        assert!(lines.iter().any(|l| l.contains("ret i32 7")));
    }

    #[test]
    fn assign_stores_into_local_slot() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), prim(Kind::Int, Some(Width::W32)));
        let local = LocalDecl { id: LocalId(0), ty: TypeId(0), sym: None };
        let dst = crate::mir::Place { base: PlaceBase::Local(LocalId(0)), proj: Default::default() };
        let src = RValue::Use(Operand::Const { ty: TypeId(0), value: Const::Int { value: 9, text: None, ty: TypeId(0) } });
        let block = Block {
            id: BlockId(0),
            instrs: vec![Instr::Assign { dst, src }],
            term: Terminator::Return { value: None },
        };
        let func = func_with_entry(0, vec![block.clone()], vec![local]);
        let mut module = Module::default();
        module.funcs.push(func.clone());
        let catalog = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        fe.emit_prologue(0).unwrap();
        lower_block(&mut fe, &block, true).unwrap();
        let lines = fe.finish();
        assert!(lines.iter().any(|l| l.contains("store i32 9, ptr %slot.0")));
    }
}
