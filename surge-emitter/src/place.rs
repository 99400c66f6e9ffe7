//! Place & Projection Lowering.
//!
//! Lowers a MIR `Place` (a base local/global plus a chain of `Deref`/
//! `Field`/`Index` projections) into a pointer-valued LLVM instruction
//! sequence and the static type of the resulting location.

use crate::mir::{FieldKey, LocalId, Place, Proj, PlaceBase, TypeId};
use crate::types::{self, LayoutEngine, TypeInterner};
use anyhow::{bail, Context, Result};

/// The slice of `FuncEmitter` this module needs: fresh temp names, a place
/// for appending emitted lines, and lookup from `LocalId`/`GlobalId` to
/// the alloca/global pointer that already holds it. Kept as a trait so
/// this module can be unit tested without the full emitter.
pub trait EmitCx {
    fn fresh_temp(&mut self) -> String;
    fn emit_line(&mut self, line: String);
    fn local_ptr(&self, id: LocalId) -> Result<String>;
    fn global_ptr(&self, id: crate::mir::GlobalId) -> Result<String>;
    fn local_type(&self, id: LocalId) -> Result<TypeId>;
    fn global_type(&self, id: crate::mir::GlobalId) -> Result<TypeId>;
}

/// Result of lowering a place: the pointer SSA value holding its address
/// and the static type of the pointed-to location.
#[derive(Debug, Clone)]
pub struct LoweredPlace {
    pub ptr: String,
    pub ty: TypeId,
}

/// Lower `place` step by step, starting from its base and threading the
/// running pointer/type pair through each projection in order.
pub fn lower_place(
    cx: &mut dyn EmitCx,
    interner: &dyn TypeInterner,
    layouts: &dyn LayoutEngine,
    place: &Place,
) -> Result<LoweredPlace> {
    let (mut ptr, mut ty) = match place.base {
        PlaceBase::Local(id) => (cx.local_ptr(id)?, cx.local_type(id)?),
        PlaceBase::Global(id) => (cx.global_ptr(id)?, cx.global_type(id)?),
    };
    for proj in &place.proj {
        let (next_ptr, next_ty) = lower_projection(cx, interner, layouts, &ptr, ty, proj)?;
        ptr = next_ptr;
        ty = next_ty;
    }
    Ok(LoweredPlace { ptr, ty })
}

fn lower_projection(
    cx: &mut dyn EmitCx,
    interner: &dyn TypeInterner,
    layouts: &dyn LayoutEngine,
    base_ptr: &str,
    base_ty: TypeId,
    proj: &Proj,
) -> Result<(String, TypeId)> {
    match proj {
        Proj::Deref => lower_deref(cx, interner, base_ptr, base_ty),
        Proj::Field(key) => lower_field(cx, interner, layouts, base_ptr, base_ty, key),
        Proj::Index(idx_local) => lower_index(cx, interner, base_ptr, base_ty, *idx_local),
    }
}

/// A reference type's pointee is loaded, not offset: `Deref` loads the
/// pointer stored at the reference's location.
fn lower_deref(
    cx: &mut dyn EmitCx,
    interner: &dyn TypeInterner,
    base_ptr: &str,
    base_ty: TypeId,
) -> Result<(String, TypeId)> {
    if !types::is_ref_type(interner, base_ty)? {
        bail!("Deref projection applied to non-reference type {base_ty}");
    }
    let info = interner.lookup(base_ty)?;
    let pointee = info.elem.context("reference type missing pointee element")?;
    let temp = cx.fresh_temp();
    cx.emit_line(format!("{temp} = load ptr, ptr {base_ptr}"));
    Ok((temp, pointee))
}

/// `Field` resolves by index when the MIR builder supplied one, falling
/// back to name lookup against the struct's field list otherwise.
/// Composite-typed slots only ever hold a heap handle (`ptr`), so
/// the current pointer is loaded through one indirection before the
/// byte-GEP — `base_ptr` is the address *of* the handle, not the handle
/// itself.
fn lower_field(
    cx: &mut dyn EmitCx,
    interner: &dyn TypeInterner,
    layouts: &dyn LayoutEngine,
    base_ptr: &str,
    base_ty: TypeId,
    key: &FieldKey,
) -> Result<(String, TypeId)> {
    let resolved = types::resolve_through_wrappers(interner, base_ty)?;
    let s = interner.struct_info(resolved).context("Field projection on non-struct type")?;
    let idx = match key {
        FieldKey::Idx(i) => *i as usize,
        FieldKey::Name(name) => s
            .fields
            .iter()
            .position(|(n, _)| n == name.0.as_str())
            .with_context(|| format!("no field named `{name}` on struct type {resolved}"))?,
    };
    let (_, field_ty) =
        s.fields.get(idx).with_context(|| format!("field index {idx} out of range"))?;
    let layout = layouts.layout_of(resolved)?;
    let offset =
        *layout.field_offsets.get(idx).with_context(|| "layout missing offset for field")?;
    let handle = cx.fresh_temp();
    cx.emit_line(format!("{handle} = load ptr, ptr {base_ptr}"));
    let temp = cx.fresh_temp();
    cx.emit_line(format!(
        "{temp} = getelementptr inbounds i8, ptr {handle}, i64 {offset}"
    ));
    Ok((temp, *field_ty))
}

/// `Index` requires a local holding the index. If the array is dynamic,
/// the handle is loaded through one indirection (same heap-handle rule as
/// `Field`), then the header is descended into — `len @0`, `data @16` —
/// and the index bounds-checked against the loaded length. If fixed, the
/// handle itself is the data pointer and the pre-known element count is
/// used for the bounds check instead of a header read: both array
/// shapes are bounds-checked, only the source of the length differs.
fn lower_index(
    cx: &mut dyn EmitCx,
    interner: &dyn TypeInterner,
    base_ptr: &str,
    base_ty: TypeId,
    idx_local: LocalId,
) -> Result<(String, TypeId)> {
    let resolved = types::resolve_through_wrappers(interner, base_ty)?;
    let (elem_ty, dynamic) = types::array_elem_type(interner, resolved)?;
    let idx_ptr = cx.local_ptr(idx_local)?;
    let idx_ty = cx.local_type(idx_local)?;
    let idx_llvm = types::llvm_type(interner, idx_ty)?;
    let idx_val = cx.fresh_temp();
    cx.emit_line(format!("{idx_val} = load {}, ptr {idx_ptr}", idx_llvm.text()));
    let idx64 = widen_index_to_i64(cx, &idx_val, idx_llvm);

    let handle = cx.fresh_temp();
    cx.emit_line(format!("{handle} = load ptr, ptr {base_ptr}"));

    let data_ptr = if dynamic {
        let len_val = cx.fresh_temp();
        cx.emit_line(format!(
            "{len_val} = load i64, ptr {handle}" // len sits at offset 0
        ));
        emit_bounds_check(cx, types::BOUNDS_KIND_ARRAY, &idx64, &len_val);
        let data_slot = cx.fresh_temp();
        cx.emit_line(format!(
            "{data_slot} = getelementptr inbounds i8, ptr {handle}, i64 {}",
            types::ARRAY_HEADER_DATA_OFFSET
        ));
        let data = cx.fresh_temp();
        cx.emit_line(format!("{data} = load ptr, ptr {data_slot}"));
        data
    } else {
        let (_, fixed_len) = types::array_fixed_info(interner, resolved)?
            .context("fixed array missing its known length")?;
        emit_bounds_check(cx, types::BOUNDS_KIND_ARRAY, &idx64, &fixed_len.to_string());
        handle
    };

    let elem_llvm = types::llvm_value_type(interner, elem_ty)?;
    let temp = cx.fresh_temp();
    cx.emit_line(format!(
        "{temp} = getelementptr inbounds {}, ptr {data_ptr}, {} {idx_val}",
        elem_llvm.text(),
        idx_llvm.text()
    ));
    Ok((temp, elem_ty))
}

/// Sign-extends an index value up to `i64` for the bounds comparison,
/// leaving it unchanged if it already is one. Shared with `call.rs`'s
/// `__index`/`__index_set` dispatch, which performs the same header-descent
/// bounds check outside of a `Place` projection.
pub(crate) fn widen_index_to_i64(cx: &mut dyn EmitCx, value: &str, llvm: types::LlvmType) -> String {
    if llvm == types::LlvmType::I64 {
        return value.to_string();
    }
    let temp = cx.fresh_temp();
    cx.emit_line(format!("{temp} = sext {} {value} to i64", llvm.text()));
    temp
}

/// Emits `idx < 0 || idx >= len` as a single unsigned comparison (a
/// negative index reinterpreted as unsigned is always `>= len`), branches
/// to `rt_panic_bounds` on failure, and continues in a fresh `ok` block
/// otherwise.
pub(crate) fn emit_bounds_check(cx: &mut dyn EmitCx, kind: i64, idx64: &str, len64: &str) {
    let bad = cx.fresh_temp();
    cx.emit_line(format!("{bad} = icmp uge i64 {idx64}, {len64}"));
    let suffix = label_suffix(cx);
    let panic_label = format!("bb.inline.idx_panic{suffix}");
    let ok_label = format!("bb.inline.idx_ok{suffix}");
    cx.emit_line(format!("br i1 {bad}, label %{panic_label}, label %{ok_label}"));
    cx.emit_line(format!("{panic_label}:"));
    cx.emit_line(format!(
        "call void @rt_panic_bounds(i64 {kind}, i64 {idx64}, i64 {len64})"
    ));
    cx.emit_line("unreachable".to_string());
    cx.emit_line(format!("{ok_label}:"));
}

fn label_suffix(cx: &mut dyn EmitCx) -> String {
    cx.fresh_temp().trim_start_matches('%').trim_start_matches('t').to_string()
}

/// The static type of a place without emitting anything -- `control.rs`
/// needs this ahead of time to decide whether an `Assign`'s source value
/// requires union-return-style promotion, without paying for the pointer
/// arithmetic a full `lower_place` would emit.
pub fn place_static_type(cx: &dyn EmitCx, interner: &dyn TypeInterner, place: &Place) -> Result<TypeId> {
    let mut ty = match place.base {
        PlaceBase::Local(id) => cx.local_type(id)?,
        PlaceBase::Global(id) => cx.global_type(id)?,
    };
    for proj in &place.proj {
        ty = match proj {
            Proj::Deref => {
                if !types::is_ref_type(interner, ty)? {
                    bail!("Deref projection applied to non-reference type {ty}");
                }
                interner.lookup(ty)?.elem.context("reference type missing pointee element")?
            }
            Proj::Field(key) => {
                let resolved = types::resolve_through_wrappers(interner, ty)?;
                let s = interner.struct_info(resolved).context("Field projection on non-struct type")?;
                let idx = match key {
                    FieldKey::Idx(i) => *i as usize,
                    FieldKey::Name(name) => s
                        .fields
                        .iter()
                        .position(|(n, _)| n == name.0.as_str())
                        .with_context(|| format!("no field named `{name}` on struct type {resolved}"))?,
                };
                s.fields.get(idx).with_context(|| format!("field index {idx} out of range"))?.1
            }
            Proj::Index(_) => {
                let resolved = types::resolve_through_wrappers(interner, ty)?;
                types::array_elem_type(interner, resolved)?.0
            }
        };
    }
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::GlobalId;
    use crate::types::mock::MockInterner;
    use crate::types::{ArrayInfo, Kind, Layout, StructInfo, TypeInfo, Width};
    use std::cell::RefCell;

    struct FakeCx {
        lines: RefCell<Vec<String>>,
        counter: RefCell<u32>,
        locals: fxhash::FxHashMap<LocalId, (String, TypeId)>,
        globals: fxhash::FxHashMap<GlobalId, (String, TypeId)>,
    }

    impl EmitCx for FakeCx {
        fn fresh_temp(&mut self) -> String {
            let mut c = self.counter.borrow_mut();
            *c += 1;
            format!("%t{c}")
        }
        fn emit_line(&mut self, line: String) {
            self.lines.borrow_mut().push(line);
        }
        fn local_ptr(&self, id: LocalId) -> Result<String> {
            Ok(self.locals.get(&id).unwrap().0.clone())
        }
        fn global_ptr(&self, id: GlobalId) -> Result<String> {
            Ok(self.globals.get(&id).unwrap().0.clone())
        }
        fn local_type(&self, id: LocalId) -> Result<TypeId> {
            Ok(self.locals.get(&id).unwrap().1)
        }
        fn global_type(&self, id: GlobalId) -> Result<TypeId> {
            Ok(self.globals.get(&id).unwrap().1)
        }
    }

    fn prim(kind: Kind, width: Option<Width>) -> TypeInfo {
        TypeInfo { kind, width, float_width: None, elem: None, count: None, name: None }
    }

    #[test]
    fn field_projection_uses_layout_offset() {
        let mut m = MockInterner::default();
        m.infos.insert(TypeId(0), TypeInfo {
            kind: Kind::Struct,
            width: None,
            float_width: None,
            elem: None,
            count: None,
            name: Some("Point".into()),
        });
        m.structs.insert(
            TypeId(0),
            StructInfo { fields: vec![("x".into(), TypeId(1)), ("y".into(), TypeId(1))] },
        );
        m.infos.insert(TypeId(1), prim(Kind::Int, Some(Width::W32)));
        m.layouts.insert(TypeId(0), Layout { size: 8, align: 4, field_offsets: [0, 4].into(), ..Default::default() });

        let mut cx = FakeCx {
            lines: RefCell::new(vec![]),
            counter: RefCell::new(0),
            locals: Default::default(),
            globals: Default::default(),
        };
        let place = Place::local(LocalId(0)).with_proj(Proj::Field(FieldKey::Name(crate::mir::Sym::new("y"))));
        cx.locals.insert(LocalId(0), ("%p".into(), TypeId(0)));
        let lowered = lower_place(&mut cx, &m, &m, &place).unwrap();
        assert_eq!(lowered.ty, TypeId(1));
        let lines = cx.lines.borrow();
        assert!(lines[0].contains("load ptr, ptr %p"));
        assert!(lines[1].contains("i64 4"));
    }

    #[test]
    fn dynamic_index_descends_header_and_bounds_checks() {
        let mut m = MockInterner::default();
        m.infos.insert(TypeId(0), prim(Kind::Array, None));
        m.arrays.insert(TypeId(0), ArrayInfo { elem: TypeId(1), dynamic: true, fixed_len: None });
        m.infos.insert(TypeId(1), prim(Kind::Int, Some(Width::W32)));
        m.infos.insert(TypeId(2), prim(Kind::Int, Some(Width::W64)));

        let mut cx = FakeCx {
            lines: RefCell::new(vec![]),
            counter: RefCell::new(0),
            locals: Default::default(),
            globals: Default::default(),
        };
        cx.locals.insert(LocalId(0), ("%arr".into(), TypeId(0)));
        cx.locals.insert(LocalId(1), ("%i".into(), TypeId(2)));
        let place = Place::local(LocalId(0)).with_proj(Proj::Index(LocalId(1)));
        let lowered = lower_place(&mut cx, &m, &m, &place).unwrap();
        assert_eq!(lowered.ty, TypeId(1));
        let lines = cx.lines.borrow();
        let text = lines.join("\n");
        assert!(text.contains("load ptr, ptr %arr"));
        assert!(text.contains("icmp uge i64"));
        assert!(text.contains("call void @rt_panic_bounds"));
        assert!(text.contains("unreachable"));
        assert!(text.contains(&format!("i64 {}", types::ARRAY_HEADER_DATA_OFFSET)));
        assert!(text.contains("getelementptr"));
    }

    #[test]
    fn fixed_index_bounds_checks_against_known_length() {
        let mut m = MockInterner::default();
        m.infos.insert(TypeId(0), prim(Kind::Array, None));
        m.arrays.insert(TypeId(0), ArrayInfo { elem: TypeId(1), dynamic: false, fixed_len: Some(4) });
        m.infos.insert(TypeId(1), prim(Kind::Int, Some(Width::W32)));
        m.infos.insert(TypeId(2), prim(Kind::Int, Some(Width::W64)));

        let mut cx = FakeCx {
            lines: RefCell::new(vec![]),
            counter: RefCell::new(0),
            locals: Default::default(),
            globals: Default::default(),
        };
        cx.locals.insert(LocalId(0), ("%arr".into(), TypeId(0)));
        cx.locals.insert(LocalId(1), ("%i".into(), TypeId(2)));
        let place = Place::local(LocalId(0)).with_proj(Proj::Index(LocalId(1)));
        let lowered = lower_place(&mut cx, &m, &m, &place).unwrap();
        assert_eq!(lowered.ty, TypeId(1));
        let text = cx.lines.borrow().join("\n");
        assert!(text.contains("icmp uge i64"));
        assert!(text.contains("i64 4"));
        assert!(text.contains("call void @rt_panic_bounds"));
    }

    #[test]
    fn deref_rejects_non_reference_type() {
        let mut m = MockInterner::default();
        m.infos.insert(TypeId(0), prim(Kind::Int, Some(Width::W32)));
        let mut cx = FakeCx {
            lines: RefCell::new(vec![]),
            counter: RefCell::new(0),
            locals: Default::default(),
            globals: Default::default(),
        };
        cx.locals.insert(LocalId(0), ("%x".into(), TypeId(0)));
        let place = Place::local(LocalId(0)).with_proj(Proj::Deref);
        assert!(lower_place(&mut cx, &m, &m, &place).is_err());
    }
}
