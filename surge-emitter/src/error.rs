//! Typed error kinds for the small set of callers that need to match on
//! *why* a lowering failed rather than just display it. Nearly everywhere
//! else in this crate a bare `anyhow::bail!` is used.

use std::fmt;

/// The five error categories failures are grouped into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    /// Unknown local/global, missing signature, missing layout, missing
    /// tag layout, missing struct/tuple info, missing function symbol.
    MissingMetadata(String),
    /// Operand type mismatch, unsupported cast, unsupported `__len`/
    /// `__index` target, tag payload arity/type mismatch, union-cast
    /// mismatch.
    TypeInconsistency(String),
    /// Non-ptr where ptr is expected, incorrect runtime argument count.
    AbiViolation(String),
    /// The same function symbol called with differing argument counts
    /// across call sites.
    ArityInconsistency(String),
    /// An rvalue/instruction/terminator kind not yet implemented.
    Unsupported(String),
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::MissingMetadata(s) => write!(f, "missing metadata: {s}"),
            EmitError::TypeInconsistency(s) => write!(f, "type inconsistency: {s}"),
            EmitError::AbiViolation(s) => write!(f, "ABI violation: {s}"),
            EmitError::ArityInconsistency(s) => write!(f, "arity inconsistency: {s}"),
            EmitError::Unsupported(s) => write!(f, "unsupported construct: {s}"),
        }
    }
}

impl std::error::Error for EmitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let e = EmitError::MissingMetadata("local 3".into());
        assert_eq!(e.to_string(), "missing metadata: local 3");
    }

    #[test]
    fn downcasts_from_anyhow() {
        let err: anyhow::Error = EmitError::Unsupported("IterNext".into()).into();
        let kind = err.downcast_ref::<EmitError>().unwrap();
        assert!(matches!(kind, EmitError::Unsupported(_)));
    }
}
