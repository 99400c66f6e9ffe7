//! String & Constant Pool.
//!
//! Deduplicates every string constant the module references -- literal
//! operands, well-known runtime messages, tag names used in diagnostics --
//! by raw decoded form, and assigns each a stable `.str.K` label ordered by
//! sorted decoded text. Labels must be assigned before any function body
//! is emitted, since call sites may forward-reference a pool entry
//! introduced by a later function.

use arcstr::ArcStr;
use compact_str::CompactString;
use indexmap::IndexSet;

/// Runtime-emitted diagnostic strings that must be pooled even if no MIR
/// constant mentions them literally, since the runtime ABI references
/// them by exact bytes. The capacity/bounds/length-out-of-range messages
/// are this crate's own conventional wording, recorded in DESIGN.md.
pub const WELL_KNOWN_MESSAGES: &[&str] = &[
    "parse error",
    "failed to parse \"",
    "\" as int: invalid numeric format: \"",
    "\" as uint: invalid numeric format: \"",
    "\" as float: invalid numeric format: \"",
    "\"",
    "\n",
    "true",
    "false",
    "",
    "integer overflow",
    "unsigned overflow",
    "float overflow",
    "cannot convert negative int to uint",
    "missing poll function",
    "repeat count must not be negative",
    "repeat count exceeds the maximum array length",
    "capacity exceeds the maximum array length",
];

#[derive(Debug, Default)]
pub struct StringPool {
    /// Insertion-ordered by first sight; `finalize` re-sorts into label
    /// order without disturbing already-handed-out `StrId`s by remapping
    /// through `order`.
    strings: IndexSet<CompactString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrId(pub usize);

impl StringPool {
    pub fn new() -> Self {
        let mut pool = StringPool { strings: IndexSet::new() };
        for msg in WELL_KNOWN_MESSAGES {
            pool.intern(msg);
        }
        pool
    }

    pub fn intern(&mut self, s: &str) -> StrId {
        let (idx, _) = self.strings.insert_full(CompactString::from(s));
        StrId(idx)
    }

    pub fn get(&self, id: StrId) -> &str {
        self.strings.get_index(id.0).expect("StrId out of range").as_str()
    }

    /// Sorted (text, original id) pairs; `.str.K` labels are assigned by
    /// position in this order.
    pub fn sorted_entries(&self) -> Vec<(StrId, &str)> {
        let mut entries: Vec<(StrId, &str)> =
            self.strings.iter().enumerate().map(|(i, s)| (StrId(i), s.as_str())).collect();
        entries.sort_by(|a, b| a.1.cmp(b.1));
        entries
    }

    pub fn label_for(&self, id: StrId) -> String {
        let target = self.get(id);
        let rank = self
            .sorted_entries()
            .iter()
            .position(|(_, s)| *s == target)
            .expect("string must be present in its own pool");
        format!(".str.{rank}")
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Decode a MIR string literal's raw source text: strip surrounding
/// quotes if present, then resolve `\\`, `\"`, `\n`, `\t`, `\r` escapes.
/// Unescaped control characters and unknown escapes pass through
/// verbatim -- the MIR builder is responsible for validating the
/// literal upstream.
pub fn decode_string_literal(raw: &str) -> CompactString {
    let body = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };
    let mut out = CompactString::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Encode a decoded string back into an LLVM `c"..."` constant body,
/// escaping bytes LLVM's textual IR requires escaped: backslash, quote,
/// and any non-printable byte as `\XX`.
pub fn llvm_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for b in s.as_bytes() {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\22"),
            0x20..=0x7e => out.push(*b as char),
            _ => out.push_str(&format!("\\{b:02X}")),
        }
    }
    out
}

/// `Const::Fn` constants reference a function symbol that must be kept
/// alive through reachability analysis even if no direct `Call` site
/// mentions it.
#[derive(Debug, Default)]
pub struct FnRefs {
    syms: IndexSet<ArcStr>,
}

impl FnRefs {
    pub fn new() -> Self {
        FnRefs::default()
    }

    pub fn record(&mut self, sym: &ArcStr) {
        self.syms.insert(sym.clone());
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArcStr> {
        self.syms.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_by_decoded_form() {
        let mut pool = StringPool::new();
        let base = pool.len();
        let a = pool.intern("hello");
        let b = pool.intern("hello");
        assert_eq!(a, b);
        assert_eq!(pool.len(), base + 1);
    }

    #[test]
    fn sorted_entries_are_lexicographic() {
        let mut pool = StringPool::default();
        pool.intern("zebra");
        pool.intern("alpha");
        pool.intern("mango");
        let entries = pool.sorted_entries();
        let texts: Vec<&str> = entries.iter().map(|(_, s)| *s).collect();
        let mut sorted = texts.clone();
        sorted.sort();
        assert_eq!(texts, sorted);
    }

    #[test]
    fn decodes_standard_escapes() {
        assert_eq!(decode_string_literal(r#""a\nb\tc\"d\\e""#), "a\nb\tc\"d\\e");
    }

    #[test]
    fn decode_without_surrounding_quotes_is_passthrough_with_escapes() {
        assert_eq!(decode_string_literal(r"line1\nline2"), "line1\nline2");
    }

    #[test]
    fn llvm_escape_handles_quotes_and_control_bytes() {
        let escaped = llvm_escape("a\"b\nc");
        assert_eq!(escaped, "a\\22b\\0Ac");
    }

    #[test]
    fn well_known_messages_are_preinterned() {
        let pool = StringPool::new();
        assert_eq!(pool.len(), WELL_KNOWN_MESSAGES.len());
    }
}
