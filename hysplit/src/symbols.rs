//! Symbol table: one record per function and global variable of the source
//! module, addressed by a stable [`SymbolId`].
//!
//! Records never borrow from the module. They point back into it by index so
//! the table can outlive clones of the module made during materialization.
use std::collections::HashMap;

use hyir::{
    linkage::{Linkage, Visibility},
    module::Module,
    name::{SymbolName, escape_bytes, escape_name},
};

/// Handle into a [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn new(index: usize) -> Self {
        SymbolId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    pub name: SymbolName,

    /// The name itself, or `anon_<seq>` for compiler-generated names.
    pub display_name: String,

    /// Sequence number shared by anonymous functions and globals. Used to
    /// match diagnostics that only mention a number.
    pub seq: Option<u32>,

    pub kind: SymbolKind,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub is_declaration: bool,

    /// Index into `Module::functions` or `Module::globals`, depending on `kind`.
    pub item: usize,
}

impl SymbolRecord {
    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Function
    }

    pub fn is_global(&self) -> bool {
        self.kind == SymbolKind::Global
    }

    pub fn is_definition(&self) -> bool {
        !self.is_declaration
    }

    pub fn is_anonymous(&self) -> bool {
        self.seq.is_some()
    }
}

const RESERVED_PREFIXES: [&str; 4] = [".", "__unnamed", "__anon", "_GLOBAL__"];
const RESERVED_LETTERS: [char; 5] = ['_', '$', '.', 'L', 'l'];

/// Hash-like names such as `h3f2a9c0d1e4b5a6f7` or `_0123456789abcdef`.
fn looks_like_hash(name: &str) -> bool {
    let digits = name
        .strip_prefix('h')
        .or_else(|| name.strip_prefix('_'))
        .unwrap_or(name);
    digits.len() >= 16 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Whether `name` looks compiler-generated rather than written by a person.
pub fn is_anonymous_name(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    if RESERVED_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return true;
    }

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if RESERVED_LETTERS.contains(&c) {
            return true;
        }
    }

    name.chars().all(|c| c.is_ascii_digit()) || name.contains('\u{1}') || looks_like_hash(name)
}

fn is_anonymous(name: &SymbolName) -> bool {
    match name {
        SymbolName::Numbered(_) => true,
        SymbolName::Named(name) => is_anonymous_name(name),
    }
}

/// All symbols of a module, globals first, in module order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    records: Vec<SymbolRecord>,
    by_name: HashMap<SymbolName, SymbolId>,
    anon_by_seq: HashMap<u32, SymbolId>,

    /// Keyed by both the canonical escaped spelling (quotes included) and the
    /// text between the quotes.
    by_escaped: HashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn build(module: &Module) -> Self {
        let mut table = SymbolTable::default();

        for (item, global) in module.globals.iter().enumerate() {
            table.push(
                global.name.clone(),
                SymbolKind::Global,
                global.attributes.linkage,
                global.attributes.visibility,
                global.is_declaration(),
                item,
            );
        }
        for (item, function) in module.functions.iter().enumerate() {
            table.push(
                function.name.clone(),
                SymbolKind::Function,
                function.attributes.linkage,
                function.attributes.visibility,
                function.is_declaration(),
                item,
            );
        }

        if table.is_empty() {
            log::warn!("module has no functions or global variables");
        } else {
            log::debug!(
                "indexed {} symbols ({} anonymous)",
                table.len(),
                table.anon_by_seq.len()
            );
        }
        table
    }

    fn push(
        &mut self,
        name: SymbolName,
        kind: SymbolKind,
        linkage: Linkage,
        visibility: Visibility,
        is_declaration: bool,
        item: usize,
    ) {
        let id = SymbolId::new(self.records.len());

        let (seq, display_name) = if is_anonymous(&name) {
            let seq = self.anon_by_seq.len() as u32;
            self.anon_by_seq.insert(seq, id);
            (Some(seq), format!("anon_{}", seq))
        } else {
            (None, name.raw())
        };

        if self.by_name.contains_key(&name) {
            log::warn!("symbol @{} is defined more than once; keeping the first", name);
        } else {
            self.by_name.insert(name.clone(), id);
            let escaped = name.escaped();
            if let Some(inner) = escaped
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
            {
                self.by_escaped.entry(inner.to_string()).or_insert(id);
            }
            self.by_escaped.entry(escaped).or_insert(id);
        }

        self.records.push(SymbolRecord {
            name,
            display_name,
            seq,
            kind,
            linkage,
            visibility,
            is_declaration,
            item,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: SymbolId) -> &SymbolRecord {
        &self.records[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        (0..self.records.len()).map(SymbolId::new)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &SymbolRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| (SymbolId::new(index), record))
    }

    pub fn functions(&self) -> impl Iterator<Item = (SymbolId, &SymbolRecord)> {
        self.iter().filter(|(_, record)| record.is_function())
    }

    pub fn globals(&self) -> impl Iterator<Item = (SymbolId, &SymbolRecord)> {
        self.iter().filter(|(_, record)| record.is_global())
    }

    pub fn definitions(&self) -> impl Iterator<Item = (SymbolId, &SymbolRecord)> {
        self.iter().filter(|(_, record)| record.is_definition())
    }

    pub fn lookup(&self, name: &SymbolName) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    /// Lookup by plain text name.
    pub fn lookup_str(&self, name: &str) -> Option<SymbolId> {
        self.lookup(&SymbolName::from(name))
    }

    pub fn by_seq(&self, seq: u32) -> Option<SymbolId> {
        self.anon_by_seq.get(&seq).copied()
    }

    /// Lookup by escaped spelling, with or without the surrounding quotes.
    pub fn by_escaped(&self, escaped: &str) -> Option<SymbolId> {
        self.by_escaped.get(escaped).copied()
    }

    /// Function record of a module function, if the table has one.
    pub fn function_id(&self, module: &Module, item: usize) -> Option<SymbolId> {
        let name = &module.functions.get(item)?.name;
        self.lookup(name)
            .filter(|id| self.get(*id).is_function() && self.get(*id).item == item)
    }

    pub fn global_id(&self, module: &Module, item: usize) -> Option<SymbolId> {
        let name = &module.globals.get(item)?.name;
        self.lookup(name)
            .filter(|id| self.get(*id).is_global() && self.get(*id).item == item)
    }
}

/// Every spelling a diagnostic may use for `name`, canonical first.
pub fn spellings(name: &SymbolName) -> Vec<String> {
    let canonical = escape_name(&name.raw());
    let mut out = vec![name.escaped()];
    if let SymbolName::Named(raw) = name {
        for lowercase in [false, true] {
            let quoted = format!("\"{}\"", escape_bytes(raw.as_bytes(), lowercase));
            if !out.contains(&quoted) {
                out.push(quoted);
            }
        }
    }
    if !out.contains(&canonical) {
        out.push(canonical);
    }
    out
}

#[cfg(test)]
mod tests {
    use hyir::parser::parse_module;

    use super::*;

    #[test]
    fn anonymous_names() {
        for name in [
            "",
            ".str",
            ".L.str.3",
            "__unnamed_1",
            "__anon_expr",
            "_GLOBAL__sub_I_main",
            "_",
            "L",
            "$",
            "1234",
            "\u{1}objc_msgSend",
            "h0123456789abcdef",
            "_deadbeefdeadbeef00",
            "0123456789abcdef0123",
        ] {
            assert!(is_anonymous_name(name), "{:?} should be anonymous", name);
        }

        for name in ["main", "_ZN3foo3barEv", "l2", "abc", "hello_world", "hdeadbeef"] {
            assert!(!is_anonymous_name(name), "{:?} should be named", name);
        }
    }

    #[test]
    fn sequence_numbers_are_shared_between_globals_and_functions() {
        let module = parse_module(
            r#"
@0 = private constant i8 1
@named = global i8 2
@.str = private constant i8 3
declare void @"\01f"()
define void @main() {
entry:
  ret void
}
"#,
        )
        .unwrap();
        let table = SymbolTable::build(&module);

        assert_eq!(table.len(), 5);
        let zero = table.lookup(&SymbolName::Numbered(0)).unwrap();
        assert_eq!(table.get(zero).display_name, "anon_0");
        let str_id = table.lookup_str(".str").unwrap();
        assert_eq!(table.get(str_id).seq, Some(1));
        let f = table.lookup_str("\u{1}f").unwrap();
        assert_eq!(table.get(f).display_name, "anon_2");
        assert!(table.get(f).is_declaration);
        assert_eq!(table.by_seq(2), Some(f));

        let main = table.lookup_str("main").unwrap();
        assert_eq!(table.get(main).display_name, "main");
        assert_eq!(table.get(main).seq, None);
        assert_eq!(table.function_id(&module, 1), Some(main));
    }

    #[test]
    fn escaped_lookup_accepts_quoted_and_bare_spellings() {
        let module = parse_module("@\"a b\" = global i8 0\n").unwrap();
        let table = SymbolTable::build(&module);
        let id = table.lookup_str("a b").unwrap();
        assert_eq!(table.by_escaped("\"a b\""), Some(id));
        assert_eq!(table.by_escaped("a b"), Some(id));
    }

    #[test]
    fn spellings_include_lowercase_escapes() {
        let name = SymbolName::from("\u{1}\u{1f}x");
        let all = spellings(&name);
        assert_eq!(all[0], "\"\\01\\1Fx\"");
        assert!(all.contains(&"\"\\01\\1fx\"".to_string()));
    }
}
