//! The MIR (mid-level IR) input model.
//!
//! Everything in this module is produced upstream by the lexer, parser,
//! resolver, type inferencer and MIR builder. This module only defines the
//! shape of what the emitter consumes; nothing here builds a MIR `Module`
//! from source text.

use arcstr::ArcStr;
use fxhash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;

macro_rules! index_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            pub fn new(v: u32) -> Self {
                $name(v)
            }

            pub fn inner(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

index_id!(TypeId);
index_id!(FuncId);
index_id!(BlockId);
index_id!(LocalId);
index_id!(GlobalId);

/// An already-interned symbol handle. The interner itself is out of scope
/// here; we only ever compare and hash the text it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sym(pub ArcStr);

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sym {
    pub fn new(s: impl Into<ArcStr>) -> Self {
        Sym(s.into())
    }
}

/// A field key used by `Proj::Field` and struct/tuple literals: by index
/// when the MIR builder already resolved the field, by name as a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Idx(u32),
    Name(Sym),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
pub enum Const {
    Int { value: i64, text: Option<ArcStr>, ty: TypeId },
    Uint { value: u64, text: Option<ArcStr>, ty: TypeId },
    Bool(bool),
    Float { value: f64, text: Option<ArcStr>, ty: TypeId },
    String(ArcStr),
    Nothing { ty: TypeId },
    Fn { sym: Sym, ty: TypeId },
}

impl Const {
    pub fn ty(&self) -> Option<TypeId> {
        match self {
            Const::Int { ty, .. }
            | Const::Uint { ty, .. }
            | Const::Float { ty, .. }
            | Const::Nothing { ty, .. }
            | Const::Fn { ty, .. } => Some(*ty),
            Const::Bool(_) | Const::String(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceBase {
    Local(LocalId),
    Global(GlobalId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proj {
    Deref,
    Field(FieldKey),
    Index(LocalId),
}

#[derive(Debug, Clone)]
pub struct Place {
    pub base: PlaceBase,
    pub proj: SmallVec<[Proj; 4]>,
}

impl Place {
    pub fn local(id: LocalId) -> Self {
        Place { base: PlaceBase::Local(id), proj: SmallVec::new() }
    }

    pub fn global(id: GlobalId) -> Self {
        Place { base: PlaceBase::Global(id), proj: SmallVec::new() }
    }

    pub fn with_proj(mut self, p: Proj) -> Self {
        self.proj.push(p);
        self
    }
}

#[derive(Debug, Clone)]
pub enum Operand {
    Const { ty: TypeId, value: Const },
    Copy { place: Place, ty: TypeId },
    Move { place: Place, ty: TypeId },
    AddrOf { place: Place, ty: TypeId },
    AddrOfMut { place: Place, ty: TypeId },
}

impl Operand {
    pub fn ty(&self) -> TypeId {
        match self {
            Operand::Const { ty, .. }
            | Operand::Copy { ty, .. }
            | Operand::Move { ty, .. }
            | Operand::AddrOf { ty, .. }
            | Operand::AddrOfMut { ty, .. } => *ty,
        }
    }

    pub fn place(&self) -> Option<&Place> {
        match self {
            Operand::Const { .. } => None,
            Operand::Copy { place, .. }
            | Operand::Move { place, .. }
            | Operand::AddrOf { place, .. }
            | Operand::AddrOfMut { place, .. } => Some(place),
        }
    }

    pub fn is_addr_of(&self) -> bool {
        matches!(self, Operand::AddrOf { .. } | Operand::AddrOfMut { .. })
    }
}

#[derive(Debug, Clone)]
pub enum RValue {
    Use(Operand),
    StructLit { ty: TypeId, fields: Vec<(FieldKey, Operand)> },
    TupleLit { ty: TypeId, fields: Vec<Operand> },
    ArrayLit { ty: TypeId, elems: Vec<Operand> },
    UnaryOp { op: UnOp, operand: Operand },
    BinaryOp { op: BinOp, lhs: Operand, rhs: Operand },
    Cast { ty: TypeId, operand: Operand },
    Field { base: Place, field: FieldKey, ty: TypeId },
    Index { base: Place, index: LocalId, ty: TypeId },
    TagTest { ty: TypeId, case: Sym, operand: Operand },
    TagPayload { ty: TypeId, case: Sym, idx: usize, operand: Operand, payload_ty: TypeId },
    IterInit { ty: TypeId, operand: Operand },
    IterNext { ty: TypeId, operand: Operand },
    TypeTest { ty: TypeId, operand: Operand },
    HeirTest { ty: TypeId, operand: Operand },
}

#[derive(Debug, Clone)]
pub enum Callee {
    Symbol(Sym),
    Value(Operand),
}

#[derive(Debug, Clone)]
pub struct CallInstr {
    pub dst: Option<Place>,
    pub callee: Callee,
    pub args: Vec<Operand>,
}

/// `Spawn`/`ChanSend`/`ChanRecv`/`Poll`/`JoinAll` are plain `Instr`
/// variants, but each one branches: the MIR builder folds what would
/// otherwise be a terminator into the instruction itself. `FuncEmitter`
/// (func.rs) treats any of these as ending the block early; any
/// instructions after one in the same block are unreachable by MIR
/// construction.
#[derive(Debug, Clone)]
pub enum Instr {
    Assign { dst: Place, src: RValue },
    Call(CallInstr),
    Spawn { dst: Place, task: Operand },
    Await { dst: Place, task: Operand, result_ty: TypeId },
    Poll { dst: Place, task: Operand, result_ty: TypeId, pending: BlockId, ready: BlockId },
    JoinAll { dst: Place, scope: Operand, pending: BlockId, ready: BlockId },
    ChanSend { chan: Operand, value: Operand, ready: BlockId, pending: BlockId },
    ChanRecv {
        dst: Place,
        chan: Operand,
        elem_ty: TypeId,
        pending: BlockId,
        value_block: BlockId,
        closed_block: BlockId,
    },
    Drop(Place),
    EndBorrow(Place),
    Nop,
}

impl Instr {
    /// True for the branching instruction forms documented above.
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            Instr::Poll { .. }
                | Instr::JoinAll { .. }
                | Instr::ChanSend { .. }
                | Instr::ChanRecv { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Return { value: Option<Operand> },
    Goto(BlockId),
    If { cond: Operand, then_blk: BlockId, else_blk: BlockId },
    SwitchTag { value: Operand, ty: TypeId, cases: Vec<(Sym, BlockId)>, default: BlockId },
    Unreachable,
    AsyncYield { state: Operand },
    AsyncReturn { state: Operand, value: Option<Operand> },
    AsyncReturnCancelled { state: Operand },
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    pub term: Terminator,
}

#[derive(Debug, Clone)]
pub struct LocalDecl {
    pub id: LocalId,
    pub ty: TypeId,
    pub sym: Option<Sym>,
}

#[derive(Debug, Clone)]
pub struct Func {
    pub id: FuncId,
    pub name: ArcStr,
    pub sym: Option<Sym>,
    pub result: Option<TypeId>,
    pub locals: Vec<LocalDecl>,
    pub blocks: Vec<Block>,
    pub entry: BlockId,
}

impl Func {
    /// Functions whose name ends with `$poll` are poll bodies.
    pub fn is_poll(&self) -> bool {
        self.name.ends_with("$poll")
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn param_locals(&self, count: usize) -> impl Iterator<Item = &LocalDecl> {
        self.locals.iter().take(count)
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    pub id: GlobalId,
    pub ty: TypeId,
    pub sym: Option<Sym>,
}

#[derive(Debug, Clone)]
pub struct TagCaseMeta {
    pub tag_sym: Sym,
    pub tag_name: ArcStr,
    pub payload_types: SmallVec<[TypeId; 2]>,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub funcs: Vec<Func>,
    pub globals: Vec<Global>,
    pub func_by_sym: FxHashMap<Sym, FuncId>,
    pub tag_layouts: FxHashMap<TypeId, Vec<TagCaseMeta>>,
    pub tag_aliases: FxHashMap<Sym, Sym>,
    pub func_type_args: FxHashMap<Sym, Vec<TypeId>>,
}

impl Module {
    pub fn func(&self, id: FuncId) -> Option<&Func> {
        self.funcs.iter().find(|f| f.id == id)
    }

    pub fn resolve_tag_sym<'a>(&'a self, sym: &'a Sym) -> &'a Sym {
        let mut cur = sym;
        let mut hops = 0;
        while let Some(next) = self.tag_aliases.get(cur) {
            if hops >= 32 || next == cur {
                break;
            }
            cur = next;
            hops += 1;
        }
        cur
    }
}
