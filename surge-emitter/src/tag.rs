//! Tag & Union Machinery.
//!
//! Tagged-union construction, discriminant tests, payload projection, and
//! structural union-to-union casts. The discriminant is always an `i32`
//! at offset 0; payloads begin at `PayloadOffset` and pack in declaration
//! order with per-payload alignment.

use crate::func::FuncEmitter;
use crate::mir::{Operand, Sym, TagCaseMeta, TypeId};
use crate::types::{self, LlvmType};
use anyhow::{bail, Context, Result};

fn case_table<'m>(fe: &FuncEmitter<'m, '_>, ty: TypeId) -> Result<&'m [TagCaseMeta]> {
    fe.mcx
        .module
        .tag_layouts
        .get(&ty)
        .map(|v| v.as_slice())
        .with_context(|| format!("no tag layout registered for type {ty}"))
}

/// Resolves a tag case by `TagSym` (preferred, honouring `TagAliases`)
/// else `TagName`.
fn find_case(
    fe: &FuncEmitter<'_, '_>,
    cases: &[TagCaseMeta],
    case: &Sym,
) -> Result<(usize, TagCaseMeta)> {
    let resolved = fe.mcx.module.resolve_tag_sym(case);
    if let Some((idx, found)) = cases.iter().enumerate().find(|(_, c)| &c.tag_sym == resolved) {
        return Ok((idx, found.clone()));
    }
    cases
        .iter()
        .enumerate()
        .find(|(_, c)| c.tag_name.as_str() == case.0.as_str())
        .map(|(idx, c)| (idx, c.clone()))
        .with_context(|| format!("no tag case `{case}` on type"))
}

/// Resolve a case symbol to its discriminant index, for callers (e.g.
/// `control::lower_terminator`'s `SwitchTag`) that only need the index, not
/// a full construct/test/payload operation.
pub fn case_index(fe: &FuncEmitter<'_, '_>, ty: TypeId, case: &Sym) -> Result<usize> {
    let cases = case_table(fe, ty)?.to_vec();
    let (idx, _) = find_case(fe, &cases, case)?;
    Ok(idx)
}

/// Resolve a case symbol to its full `(index, TagCaseMeta)`, for callers
/// (e.g. `call::lower_symbol_call`'s tag-constructor detection and
/// `from_str`/`default`'s generic case construction) that need the
/// payload shape, not just the discriminant.
pub fn case_meta(fe: &FuncEmitter<'_, '_>, ty: TypeId, case: &Sym) -> Result<(usize, TagCaseMeta)> {
    let cases = case_table(fe, ty)?.to_vec();
    find_case(fe, &cases, case)
}

/// Construct a tagged value: `rt_alloc(size, align)`, store the `i32`
/// discriminant, then store each payload operand at its aligned offset,
/// coercing numeric mismatches along the way.
pub fn construct(
    fe: &mut FuncEmitter<'_, '_>,
    ty: TypeId,
    case: &Sym,
    payloads: &[Operand],
) -> Result<String> {
    let cases = case_table(fe, ty)?.to_vec();
    let (idx, case_meta) = find_case(fe, &cases, case)?;
    if payloads.len() != case_meta.payload_types.len() {
        bail!(
            "tag case `{case}` expects {} payload(s), got {}",
            case_meta.payload_types.len(),
            payloads.len()
        );
    }
    let layout = fe.mcx.layouts.layout_of(ty)?;
    let offsets =
        types::tag_case_payload_offsets(fe.mcx.interner, fe.mcx.layouts, &case_meta.payload_types)?;

    let ptr = fe.fresh_temp_pub();
    fe.push(format!("{ptr} = call ptr @rt_alloc(i64 {}, i64 {})", layout.size, layout.align.max(1)));
    fe.push(format!("store i32 {idx}, ptr {ptr}"));

    for (i, (operand, payload_ty)) in payloads.iter().zip(case_meta.payload_types.iter()).enumerate() {
        let (value, value_ty) = crate::rvalue::emit_value_operand(fe, operand)?;
        let value = crate::rvalue::coerce_store_value(fe, value, value_ty, *payload_ty)?;
        let offset = offsets[i];
        let field_ptr = fe.fresh_temp_pub();
        fe.push(format!("{field_ptr} = getelementptr inbounds i8, ptr {ptr}, i64 {}", layout.payload_offset + offset));
        let llvm = types::llvm_value_type(fe.mcx.interner, *payload_ty)?;
        fe.push(format!("store {} {value}, ptr {field_ptr}", llvm.text()));
    }
    Ok(ptr)
}

/// Compare the discriminant stored at `operand`'s address to the given
/// case's index.
pub fn test(fe: &mut FuncEmitter<'_, '_>, ty: TypeId, case: &Sym, operand_ptr: &str) -> Result<String> {
    let cases = case_table(fe, ty)?.to_vec();
    let (idx, _) = find_case(fe, &cases, case)?;
    let disc = fe.fresh_temp_pub();
    fe.push(format!("{disc} = load i32, ptr {operand_ptr}"));
    let result = fe.fresh_temp_pub();
    fe.push(format!("{result} = icmp eq i32 {disc}, {idx}"));
    Ok(result)
}

/// GEP to the payload offset and load. If `is_ref` (the source operand
/// is a reference to the tag but the payload is a value type) the
/// address is returned without loading -- the language's borrow
/// reborrow expressed as an output-shape variant.
pub fn payload(
    fe: &mut FuncEmitter<'_, '_>,
    ty: TypeId,
    case: &Sym,
    idx: usize,
    operand_ptr: &str,
    payload_ty: TypeId,
    is_ref: bool,
) -> Result<String> {
    let cases = case_table(fe, ty)?.to_vec();
    let (_, case_meta) = find_case(fe, &cases, case)?;
    let offsets =
        types::tag_case_payload_offsets(fe.mcx.interner, fe.mcx.layouts, &case_meta.payload_types)?;
    let offset = *offsets
        .get(idx)
        .with_context(|| format!("payload index {idx} out of range for case `{case}`"))?;
    let layout = fe.mcx.layouts.layout_of(ty)?;
    let field_ptr = fe.fresh_temp_pub();
    fe.push(format!(
        "{field_ptr} = getelementptr inbounds i8, ptr {operand_ptr}, i64 {}",
        layout.payload_offset + offset
    ));
    if is_ref {
        return Ok(field_ptr);
    }
    let llvm = types::llvm_value_type(fe.mcx.interner, payload_ty)?;
    let value = fe.fresh_temp_pub();
    fe.push(format!("{value} = load {}, ptr {field_ptr}", llvm.text()));
    Ok(value)
}

/// A per-source-case switch over the discriminant, copying payload(s)
/// into a freshly allocated destination tag value. Each source case must
/// have a matching destination case by `TagSym` (preferred) or
/// `TagName`, with pairwise-compatible payload LLVM types.
/// Mismatched/missing cases branch to `unreachable` -- the type checker
/// upstream is assumed to have pruned impossible casts.
pub fn union_cast(fe: &mut FuncEmitter<'_, '_>, dst_ty: TypeId, src_ty: TypeId, src_ptr: &str) -> Result<String> {
    let src_cases = case_table(fe, src_ty)?.to_vec();
    let dst_cases = case_table(fe, dst_ty)?.to_vec();
    let dst_layout = fe.mcx.layouts.layout_of(dst_ty)?;

    let result_slot = fe.fresh_temp_pub();
    fe.push(format!("{result_slot} = alloca ptr"));

    let disc = fe.fresh_temp_pub();
    fe.push(format!("{disc} = load i32, ptr {src_ptr}"));

    let merge = fe.fresh_inline_label(Some("union_cast_merge"));
    let default_label = fe.fresh_inline_label(Some("union_cast_default"));

    let mut switch_arms = Vec::new();
    let mut case_bodies = Vec::new();
    for (src_idx, src_case) in src_cases.iter().enumerate() {
        let dst_match = dst_cases
            .iter()
            .enumerate()
            .find(|(_, d)| d.tag_sym == src_case.tag_sym)
            .or_else(|| dst_cases.iter().enumerate().find(|(_, d)| d.tag_name == src_case.tag_name));
        let Some((dst_idx, dst_case)) = dst_match else {
            continue;
        };
        if dst_case.payload_types.len() != src_case.payload_types.len() {
            continue;
        }
        let label = fe.fresh_inline_label(Some("union_cast_case"));
        switch_arms.push(format!("i32 {src_idx}, label %{label}"));
        case_bodies.push((label, src_case.clone(), src_idx, dst_idx, dst_case.clone()));
    }

    fe.push(format!(
        "switch i32 {disc}, label %{default_label} [ {} ]",
        switch_arms.join(" ")
    ));

    let src_layout_of_case = |fe: &FuncEmitter<'_, '_>, payloads: &[TypeId]| -> Result<_> {
        types::tag_case_payload_offsets(fe.mcx.interner, fe.mcx.layouts, payloads)
    };

    let src_layout = fe.mcx.layouts.layout_of(src_ty)?;
    for (label, src_case, src_idx, dst_idx, dst_case) in case_bodies {
        fe.open_label(&label);
        let new_ptr = fe.fresh_temp_pub();
        fe.push(format!(
            "{new_ptr} = call ptr @rt_alloc(i64 {}, i64 {})",
            dst_layout.size,
            dst_layout.align.max(1)
        ));
        fe.push(format!("store i32 {dst_idx}, ptr {new_ptr}"));
        let src_offsets = src_layout_of_case(fe, &src_case.payload_types)?;
        let dst_offsets = types::tag_case_payload_offsets(fe.mcx.interner, fe.mcx.layouts, &dst_case.payload_types)?;
        for (i, payload_ty) in src_case.payload_types.iter().enumerate() {
            let src_llvm = types::llvm_value_type(fe.mcx.interner, *payload_ty)?;
            let dst_llvm = types::llvm_value_type(fe.mcx.interner, dst_case.payload_types[i])?;
            if src_llvm != dst_llvm {
                bail!(
                    "union cast case {src_idx}->{dst_idx} payload {i} LLVM type mismatch: {:?} vs {:?}",
                    src_llvm,
                    dst_llvm
                );
            }
            let src_field = fe.fresh_temp_pub();
            fe.push(format!(
                "{src_field} = getelementptr inbounds i8, ptr {src_ptr}, i64 {}",
                src_layout.payload_offset + src_offsets[i]
            ));
            let loaded_or_nested = if matches!(src_llvm, LlvmType::Ptr) && is_union(fe, *payload_ty)? {
                nested_union_cast(fe, dst_case.payload_types[i], *payload_ty, &src_field)?
            } else {
                let v = fe.fresh_temp_pub();
                fe.push(format!("{v} = load {}, ptr {src_field}", src_llvm.text()));
                v
            };
            let dst_field = fe.fresh_temp_pub();
            fe.push(format!(
                "{dst_field} = getelementptr inbounds i8, ptr {new_ptr}, i64 {}",
                dst_layout.payload_offset + dst_offsets[i]
            ));
            fe.push(format!("store {} {loaded_or_nested}, ptr {dst_field}", dst_llvm.text()));
        }
        fe.push(format!("store ptr {new_ptr}, ptr {result_slot}"));
        fe.push(format!("br label %{merge}"));
    }

    fe.open_label(&default_label);
    fe.push("unreachable".to_string());

    fe.open_label(&merge);
    let result = fe.fresh_temp_pub();
    fe.push(format!("{result} = load ptr, ptr {result_slot}"));
    Ok(result)
}

fn is_union(fe: &FuncEmitter<'_, '_>, ty: TypeId) -> Result<bool> {
    types::is_union_type(fe.mcx.interner, ty)
}

fn nested_union_cast(fe: &mut FuncEmitter<'_, '_>, dst_ty: TypeId, src_ty: TypeId, src_field_ptr: &str) -> Result<String> {
    let loaded = fe.fresh_temp_pub();
    fe.push(format!("{loaded} = load ptr, ptr {src_field_ptr}"));
    union_cast(fe, dst_ty, src_ty, &loaded)
}

/// Promote a narrower return value into the function's declared union
/// return type, or widen a broader union to a narrower one via
/// `union_cast`.
pub fn emit_union_return(
    fe: &mut FuncEmitter<'_, '_>,
    ret_ty: TypeId,
    value_ptr_or_scalar: &str,
    value_ty: TypeId,
) -> Result<String> {
    if types::is_union_type(fe.mcx.interner, value_ty)? {
        return union_cast(fe, ret_ty, value_ty, value_ptr_or_scalar);
    }
    let cases = case_table(fe, ret_ty)?.to_vec();
    if types::is_nothing_type(fe.mcx.interner, value_ty)? {
        let (idx, case_meta) = cases
            .iter()
            .enumerate()
            .find(|(_, c)| c.payload_types.is_empty())
            .with_context(|| "union return has no nothing-compatible case")?;
        return alloc_tag(fe, ret_ty, idx, case_meta, &[]);
    }
    let (idx, case_meta) = cases
        .iter()
        .enumerate()
        .find(|(_, c)| c.payload_types.len() == 1 && c.payload_types[0] == value_ty)
        .with_context(|| format!("no union case on return type matches value type {value_ty}"))?;
    alloc_tag(fe, ret_ty, idx, case_meta, &[(value_ptr_or_scalar.to_string(), value_ty)])
}

pub(crate) fn alloc_tag(
    fe: &mut FuncEmitter<'_, '_>,
    ty: TypeId,
    idx: usize,
    case_meta: &TagCaseMeta,
    payload_values: &[(String, TypeId)],
) -> Result<String> {
    let layout = fe.mcx.layouts.layout_of(ty)?;
    let offsets = types::tag_case_payload_offsets(fe.mcx.interner, fe.mcx.layouts, &case_meta.payload_types)?;
    let ptr = fe.fresh_temp_pub();
    fe.push(format!("{ptr} = call ptr @rt_alloc(i64 {}, i64 {})", layout.size, layout.align.max(1)));
    fe.push(format!("store i32 {idx}, ptr {ptr}"));
    for (i, (value, ty)) in payload_values.iter().enumerate() {
        let llvm = types::llvm_value_type(fe.mcx.interner, *ty)?;
        let field_ptr = fe.fresh_temp_pub();
        fe.push(format!(
            "{field_ptr} = getelementptr inbounds i8, ptr {ptr}, i64 {}",
            layout.payload_offset + offsets[i]
        ));
        fe.push(format!("store {} {value}, ptr {field_ptr}", llvm.text()));
    }
    Ok(ptr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::func::{FuncEmitter, ModuleCx};
    use crate::mir::{Block, BlockId, Func, FuncId, Module, Terminator};
    use crate::strings::{FnRefs, StringPool};
    use crate::types::mock::MockInterner;
    use crate::types::{Kind, Layout, TypeInfo};

    fn empty_func() -> Func {
        Func {
            id: FuncId(0),
            name: "f".into(),
            sym: None,
            result: None,
            locals: vec![],
            blocks: vec![Block { id: BlockId(0), instrs: vec![], term: Terminator::Unreachable }],
            entry: BlockId(0),
        }
    }

    #[test]
    fn tag_test_emits_discriminant_compare() {
        let mut interner = MockInterner::default();
        interner.infos.insert(TypeId(0), TypeInfo {
            kind: Kind::Union,
            width: None,
            float_width: None,
            elem: None,
            count: None,
            name: None,
        });
        interner.layouts.insert(TypeId(0), Layout { size: 4, align: 4, payload_offset: 4, ..Default::default() });

        let mut module = Module::default();
        module.tag_layouts.insert(
            TypeId(0),
            vec![
                TagCaseMeta { tag_sym: Sym::new("A"), tag_name: "A".into(), payload_types: smallvec::smallvec![] },
                TagCaseMeta { tag_sym: Sym::new("B"), tag_name: "B".into(), payload_types: smallvec::smallvec![] },
            ],
        );

        let func = empty_func();
        let catalog = Catalog::default();
        let mcx = ModuleCx { interner: &interner, layouts: &interner, module: &module, catalog: &catalog };
        let mut pool = StringPool::new();
        let mut fn_refs = FnRefs::new();
        let mut fe = FuncEmitter::new(&mcx, &mut pool, &mut fn_refs, &func);
        let result = test(&mut fe, TypeId(0), &Sym::new("B"), "%p").unwrap();
        let lines = fe.finish();
        assert!(lines.iter().any(|l| l.contains("icmp eq i32") && l.contains(", 1")));
        assert!(result.starts_with('%'));
    }
}
