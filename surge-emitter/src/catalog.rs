//! Function Catalog & Reachability.
//!
//! Assigns each function a stable LLVM link name, derives its signature
//! (declared or inferred), and computes the reachable subset of the
//! module so dead functions never reach codegen. Built with a plain
//! `FxHashMap` rather than a persistent map, since the catalog is built
//! once, never forked, and never shared across threads.

use crate::mir::{FuncId, Instr, Module, Sym, TypeId};
use crate::types::TypeInterner;
use anyhow::{bail, Result};
use fxhash::{FxHashMap, FxHashSet};

/// The verbatim entry point name: never mangled.
pub const ENTRY_POINT_SYM: &str = "__surge_start";

#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<TypeId>,
    pub ret: Option<TypeId>,
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: FuncId,
    pub link_name: String,
    pub signature: Signature,
}

#[derive(Debug, Default)]
pub struct Catalog {
    entries: FxHashMap<FuncId, CatalogEntry>,
    reachable: FxHashSet<FuncId>,
}

impl Catalog {
    pub fn entry(&self, id: FuncId) -> Option<&CatalogEntry> {
        self.entries.get(&id)
    }

    pub fn is_reachable(&self, id: FuncId) -> bool {
        self.reachable.contains(&id)
    }

    pub fn reachable_ids(&self) -> impl Iterator<Item = FuncId> + '_ {
        self.reachable.iter().copied()
    }
}

/// `fn.<id>` for everything but the entry point.
fn link_name_for(module: &Module, func_id: FuncId) -> String {
    let f = module.func(func_id).expect("func id must resolve");
    if f.sym.as_ref().map(|s| s.0.as_str()) == Some(ENTRY_POINT_SYM) {
        ENTRY_POINT_SYM.to_string()
    } else {
        format!("fn.{}", func_id.inner())
    }
}

/// Observed call-site arities per callee symbol, gathered by scanning
/// every `Call`/`Spawn` instruction in the module.
fn observed_call_arities(module: &Module) -> FxHashMap<Sym, FxHashSet<usize>> {
    let mut arities: FxHashMap<Sym, FxHashSet<usize>> = FxHashMap::default();
    for f in &module.funcs {
        for b in &f.blocks {
            for instr in &b.instrs {
                if let Instr::Call(call) = instr {
                    if let crate::mir::Callee::Symbol(sym) = &call.callee {
                        arities.entry(sym.clone()).or_default().insert(call.args.len());
                    }
                }
            }
        }
    }
    arities
}

/// Signature derivation order: declared signature from the
/// MIR function's own locals/result if present, else the unique observed
/// call-site arity. A symbol called with two different argument counts is
/// a hard error -- the MIR builder guarantees a consistent arity per
/// symbol and a conflict here means upstream invariants were violated.
fn derive_signature(
    interner: &dyn TypeInterner,
    f: &crate::mir::Func,
    observed: &FxHashMap<Sym, FxHashSet<usize>>,
) -> Result<Signature> {
    let declared_arity = f.locals.len();
    if let Some(sym) = &f.sym {
        if let Some(arities) = observed.get(sym) {
            if arities.len() > 1 {
                bail!(
                    "function `{}` called with conflicting arities: {:?}",
                    sym,
                    arities
                );
            }
            if let Some(&observed_arity) = arities.iter().next() {
                if observed_arity > declared_arity {
                    bail!(
                        "function `{}` called with {} args but declares only {} locals",
                        sym,
                        observed_arity,
                        declared_arity
                    );
                }
            }
        }
    }
    let params: Vec<TypeId> = f.param_locals(f.locals.len()).map(|l| l.ty).collect();
    let ret = infer_return_type(interner, f)?;
    Ok(Signature { params, ret })
}

/// Scan every `Return` terminator reachable from the entry block and take
/// the declared `result` field if present, else the type of the first
/// `Return` operand found.
fn infer_return_type(_interner: &dyn TypeInterner, f: &crate::mir::Func) -> Result<Option<TypeId>> {
    if f.result.is_some() {
        return Ok(f.result);
    }
    for b in &f.blocks {
        if let crate::mir::Terminator::Return { value: Some(op) } = &b.term {
            return Ok(Some(op.ty()));
        }
    }
    Ok(None)
}

/// Build the catalog and run BFS reachability from the roots: the entry
/// point, every `$poll` function, and everything named by `FnRefs`.
pub fn build_catalog(
    interner: &dyn TypeInterner,
    module: &Module,
    fn_refs: &crate::strings::FnRefs,
) -> Result<Catalog> {
    let observed = observed_call_arities(module);
    let mut entries = FxHashMap::default();
    for f in &module.funcs {
        let link_name = link_name_for(module, f.id);
        let signature = derive_signature(interner, f, &observed)?;
        entries.insert(f.id, CatalogEntry { id: f.id, link_name, signature });
    }

    let mut roots: Vec<FuncId> = Vec::new();
    for f in &module.funcs {
        let is_entry = f.sym.as_ref().map(|s| s.0.as_str()) == Some(ENTRY_POINT_SYM);
        if is_entry || f.is_poll() {
            roots.push(f.id);
        }
    }
    for sym in fn_refs.iter() {
        if let Some(&id) = module.func_by_sym.get(&Sym(arcstr::ArcStr::from(sym.as_str()))) {
            roots.push(id);
        }
    }

    let reachable = bfs_reachable(module, &roots);
    Ok(Catalog { entries, reachable })
}

fn callees_of(f: &crate::mir::Func) -> impl Iterator<Item = &Sym> + '_ {
    f.blocks.iter().flat_map(|b| b.instrs.iter()).filter_map(|instr| match instr {
        Instr::Call(call) => match &call.callee {
            crate::mir::Callee::Symbol(sym) => Some(sym),
            crate::mir::Callee::Value(_) => None,
        },
        _ => None,
    })
}

fn bfs_reachable(module: &Module, roots: &[FuncId]) -> FxHashSet<FuncId> {
    let mut seen: FxHashSet<FuncId> = FxHashSet::default();
    let mut queue: Vec<FuncId> = Vec::new();
    for &r in roots {
        if seen.insert(r) {
            queue.push(r);
        }
    }
    let mut i = 0;
    while i < queue.len() {
        let id = queue[i];
        i += 1;
        let Some(f) = module.func(id) else { continue };
        for sym in callees_of(f) {
            if let Some(&callee_id) = module.func_by_sym.get(sym) {
                if seen.insert(callee_id) {
                    queue.push(callee_id);
                }
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{Block, BlockId, Callee, CallInstr, Func, LocalDecl, LocalId, Terminator};
    use crate::strings::FnRefs;
    use crate::types::mock::MockInterner;

    fn leaf_func(id: u32, sym: &str) -> Func {
        Func {
            id: FuncId(id),
            name: sym.into(),
            sym: Some(Sym::new(sym)),
            result: None,
            locals: vec![],
            blocks: vec![Block {
                id: BlockId(0),
                instrs: vec![],
                term: Terminator::Return { value: None },
            }],
            entry: BlockId(0),
        }
    }

    #[test]
    fn entry_point_is_verbatim() {
        let mut module = Module::default();
        let f = leaf_func(0, ENTRY_POINT_SYM);
        module.func_by_sym.insert(f.sym.clone().unwrap(), f.id);
        module.funcs.push(f);
        let interner = MockInterner::default();
        let cat = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        assert_eq!(cat.entry(FuncId(0)).unwrap().link_name, ENTRY_POINT_SYM);
    }

    #[test]
    fn non_entry_uses_numeric_link_name() {
        let mut module = Module::default();
        let f = leaf_func(7, "helper");
        module.func_by_sym.insert(f.sym.clone().unwrap(), f.id);
        module.funcs.push(f);
        let interner = MockInterner::default();
        let cat = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        assert_eq!(cat.entry(FuncId(7)).unwrap().link_name, "fn.7");
    }

    #[test]
    fn unreachable_function_is_excluded() {
        let mut module = Module::default();
        let entry = leaf_func(0, ENTRY_POINT_SYM);
        let dead = leaf_func(1, "dead");
        module.func_by_sym.insert(entry.sym.clone().unwrap(), entry.id);
        module.func_by_sym.insert(dead.sym.clone().unwrap(), dead.id);
        module.funcs.push(entry);
        module.funcs.push(dead);
        let interner = MockInterner::default();
        let cat = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        assert!(cat.is_reachable(FuncId(0)));
        assert!(!cat.is_reachable(FuncId(1)));
    }

    #[test]
    fn reachability_follows_call_edges() {
        let mut module = Module::default();
        let mut entry = leaf_func(0, ENTRY_POINT_SYM);
        entry.locals.push(LocalDecl { id: LocalId(0), ty: TypeId(0), sym: None });
        entry.blocks[0].instrs.push(Instr::Call(CallInstr {
            dst: None,
            callee: Callee::Symbol(Sym::new("helper")),
            args: vec![],
        }));
        let helper = leaf_func(1, "helper");
        module.func_by_sym.insert(entry.sym.clone().unwrap(), entry.id);
        module.func_by_sym.insert(helper.sym.clone().unwrap(), helper.id);
        module.funcs.push(entry);
        module.funcs.push(helper);
        let interner = MockInterner::default();
        let cat = build_catalog(&interner, &module, &FnRefs::new()).unwrap();
        assert!(cat.is_reachable(FuncId(1)));
    }

    #[test]
    fn conflicting_arity_is_an_error() {
        let mut module = Module::default();
        let mut entry = leaf_func(0, ENTRY_POINT_SYM);
        entry.blocks[0].instrs.push(Instr::Call(CallInstr {
            dst: None,
            callee: Callee::Symbol(Sym::new("helper")),
            args: vec![],
        }));
        let mut helper = leaf_func(1, "helper");
        helper.locals.push(LocalDecl { id: LocalId(0), ty: TypeId(0), sym: None });
        module.func_by_sym.insert(entry.sym.clone().unwrap(), entry.id);
        module.func_by_sym.insert(helper.sym.clone().unwrap(), helper.id);
        module.funcs.push(entry);
        module.funcs.push(helper);
        let interner = MockInterner::default();
        // Add a second call site with a different arity to create a conflict.
        let caller2 = {
            let mut f = leaf_func(2, "caller2");
            f.blocks[0].instrs.push(Instr::Call(CallInstr {
                dst: None,
                callee: Callee::Symbol(Sym::new("helper")),
                args: vec![
                    crate::mir::Operand::Const {
                        ty: TypeId(0),
                        value: crate::mir::Const::Bool(true),
                    },
                ],
            }));
            f
        };
        module.funcs.push(caller2);
        let result = build_catalog(&interner, &module, &FnRefs::new());
        assert!(result.is_err());
    }
}
