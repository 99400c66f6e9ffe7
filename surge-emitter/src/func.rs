//! Per-function emission driver: allocates stack slots for every local,
//! lowers each MIR block in entry-first order, and ensures every block is
//! terminated.

use crate::catalog::Catalog;
use crate::mir::{Func, FuncId, GlobalId, LocalId, Module, TypeId};
use crate::place::EmitCx;
use crate::strings::{FnRefs, StringPool};
use crate::types::{self, LayoutEngine, TypeInterner};
use anyhow::{Context, Result};
use fxhash::FxHashMap;

/// Everything a single function's lowering needs that is shared across
/// the whole module emission: the type/layout bridge, the func catalog,
/// the string pool and `FnRefs` set (both mutated as new constants/taken
/// addresses are discovered mid-function), and the poll-id table C10
/// needs to reference `__surge_poll_call`.
pub struct ModuleCx<'m> {
    pub interner: &'m dyn TypeInterner,
    pub layouts: &'m dyn LayoutEngine,
    pub module: &'m Module,
    pub catalog: &'m Catalog,
}

pub struct FuncEmitter<'m, 'p> {
    pub mcx: &'m ModuleCx<'m>,
    pub pool: &'p mut StringPool,
    pub fn_refs: &'p mut FnRefs,
    func: &'m Func,
    temp: u32,
    inline: u32,
    locals: FxHashMap<LocalId, (String, TypeId)>,
    lines: Vec<String>,
}

impl<'m, 'p> FuncEmitter<'m, 'p> {
    pub fn new(mcx: &'m ModuleCx<'m>, pool: &'p mut StringPool, fn_refs: &'p mut FnRefs, func: &'m Func) -> Self {
        FuncEmitter { mcx, pool, fn_refs, func, temp: 0, inline: 0, locals: FxHashMap::default(), lines: Vec::new() }
    }

    pub fn func(&self) -> &'m Func {
        self.func
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Inherent fresh-temp, usable by modules (numeric/rvalue/call/tag/
    /// control/async_lower) that work against the concrete `FuncEmitter`
    /// rather than the narrower `place::EmitCx` trait.
    pub fn fresh_temp_pub(&mut self) -> String {
        self.temp += 1;
        format!("%t{}", self.temp)
    }

    /// A fresh, purpose-tagged inline block label: `bb.inline<counter>` or
    /// a purpose-tagged variant.
    pub fn fresh_inline_label(&mut self, purpose: Option<&str>) -> String {
        self.inline += 1;
        match purpose {
            Some(p) => format!("bb.inline.{p}{}", self.inline),
            None => format!("bb.inline{}", self.inline),
        }
    }

    pub fn open_label(&mut self, label: &str) {
        self.lines.push(format!("{label}:"));
    }

    /// Emits `alloca` for every local in declaration order, then stores
    /// the incoming parameter values into their slots. The entry block's
    /// allocas come before any other instruction.
    pub fn emit_prologue(&mut self, param_count: usize) -> Result<()> {
        for local in &self.func.locals {
            let llvm = types::llvm_value_type(self.mcx.interner, local.ty)?;
            let slot = format!("%slot.{}", local.id.inner());
            self.lines.push(format!("{slot} = alloca {}", llvm.text()));
            self.locals.insert(local.id, (slot, local.ty));
        }
        for (i, local) in self.func.locals.iter().take(param_count).enumerate() {
            let llvm = types::llvm_value_type(self.mcx.interner, local.ty)?;
            let slot = &self.locals[&local.id].0;
            self.lines.push(format!("store {} %arg.{i}, ptr {slot}", llvm.text()));
        }
        Ok(())
    }

    pub fn finish(self) -> Vec<String> {
        self.lines
    }
}

impl<'m, 'p> EmitCx for FuncEmitter<'m, 'p> {
    fn fresh_temp(&mut self) -> String {
        self.temp += 1;
        format!("%t{}", self.temp)
    }

    fn emit_line(&mut self, line: String) {
        self.lines.push(line);
    }

    fn local_ptr(&self, id: LocalId) -> Result<String> {
        self.locals
            .get(&id)
            .map(|(ptr, _)| ptr.clone())
            .with_context(|| format!("unknown local {id}"))
    }

    fn global_ptr(&self, id: GlobalId) -> Result<String> {
        Ok(format!("@g{}", id.inner()))
    }

    fn local_type(&self, id: LocalId) -> Result<TypeId> {
        self.locals.get(&id).map(|(_, ty)| *ty).with_context(|| format!("unknown local {id}"))
    }

    fn global_type(&self, id: GlobalId) -> Result<TypeId> {
        self.mcx
            .module
            .globals
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.ty)
            .with_context(|| format!("unknown global {id}"))
    }
}

/// Lower every reachable function in `FuncId` order, driven by
/// `control::lower_block` / `async_lower` for terminators and
/// `call`/`rvalue`/`tag` for the instruction bodies. Returns the function
/// definitions as one textual chunk per function, already in final order.
pub fn lower_func(
    mcx: &ModuleCx<'_>,
    pool: &mut StringPool,
    fn_refs: &mut FnRefs,
    func: &Func,
) -> Result<String> {
    let entry = mcx.catalog.entry(func.id).with_context(|| format!("no catalog entry for {}", func.id))?;
    let ret_llvm = match entry.signature.ret {
        Some(ty) => types::llvm_value_type(mcx.interner, ty)?.text(),
        None => "void",
    };
    let param_tys: Vec<_> = entry.signature.params.clone();
    let param_list = param_tys
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            let llvm = types::llvm_value_type(mcx.interner, *ty)?;
            Ok(format!("{} %arg.{i}", llvm.text()))
        })
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let mut fe = FuncEmitter::new(mcx, pool, fn_refs, func);
    fe.emit_prologue(param_tys.len())?;

    let entry_block = func
        .block(func.entry)
        .with_context(|| format!("function {} missing entry block {}", func.id, func.entry))?;
    crate::control::lower_block(&mut fe, entry_block, true)?;

    let mut rest: Vec<_> = func.blocks.iter().filter(|b| b.id != func.entry).collect();
    rest.sort_by_key(|b| b.id.inner());
    for block in rest {
        crate::control::lower_block(&mut fe, block, false)?;
    }

    let body = fe.finish();
    let mut out = String::new();
    out.push_str(&format!("define {ret_llvm} @{}({param_list}) {{\n", entry.link_name));
    for line in body {
        if line.ends_with(':') {
            out.push_str(&line);
            out.push('\n');
        } else {
            out.push_str("  ");
            out.push_str(&line);
            out.push('\n');
        }
    }
    out.push_str("}\n");
    Ok(out)
}
