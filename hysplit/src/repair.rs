//! Verification of written partitions and the one-shot linkage repair.
//!
//! An artifact is reloaded from disk and verified on its own. Linkage
//! findings are mapped back to partition members through the diagnostic
//! text, the partition is regenerated with those members forced external,
//! and the result replaces the artifact only if it verifies.
use std::{
    collections::BTreeSet,
    fs,
    path::Path,
};

use hyir::{
    module::Module,
    name::{SymbolName, escape_bytes, is_ident_char, unescape_name},
    parser::extend_module_from_path,
    verify::{EXTERNAL_LINKAGE_VIOLATION, verify_module},
};

use crate::{
    config::MaterializeMode,
    error::{SplitError, SplitResult},
    materialize::Materializer,
    planner::Partition,
    symbols::{SymbolId, SymbolTable, spellings},
};

/// Outcome of verifying one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionStatus {
    Verified,
    /// Verified after forcing `symbols` (display names) to external linkage.
    Repaired { symbols: Vec<String> },
    Invalid { reason: String },
}

impl PartitionStatus {
    pub fn is_valid(&self) -> bool {
        !matches!(self, PartitionStatus::Invalid { .. })
    }
}

impl std::fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionStatus::Verified => f.write_str("verified"),
            PartitionStatus::Repaired { symbols } => write!(f, "repaired ({})", symbols.len()),
            PartitionStatus::Invalid { .. } => f.write_str("invalid"),
        }
    }
}

/// Which lookup matched a diagnostic token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The token is the raw name.
    Exact,
    /// A number (or `anon_<n>`) matching a numbered symbol or a sequence
    /// number.
    Sequence,
    /// The token decodes to the raw name.
    Unescaped,
    /// The token is a known escaped spelling.
    EscapedTable,
    /// Some member re-escapes to the token.
    Reescaped,
}

/// Phrases of other findings whose symbols may be fixed by external linkage.
const SUPPLEMENTAL_PHRASES: [&str; 4] = [
    "private linkage",
    "internal linkage",
    "visibility",
    "undefined",
];

/// Maps verifier text back to members of one partition.
pub struct DiagnosticResolver<'a> {
    table: &'a SymbolTable,
    members: &'a BTreeSet<SymbolId>,
}

impl<'a> DiagnosticResolver<'a> {
    pub fn new(table: &'a SymbolTable, members: &'a BTreeSet<SymbolId>) -> Self {
        Self { table, members }
    }

    /// Tokens following each external-linkage violation: the text after `@`
    /// on the indented lines under the message.
    pub fn violation_tokens(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut in_violation = false;
        for line in text.lines() {
            let indented = line.starts_with(char::is_whitespace);
            if !indented {
                in_violation = line.contains(EXTERNAL_LINKAGE_VIOLATION);
                continue;
            }
            if !in_violation {
                continue;
            }
            if let Some((_, token)) = line.split_once('@') {
                let token = token.trim();
                if !token.is_empty() {
                    tokens.push(token.to_string());
                }
            }
        }
        tokens
    }

    fn member(&self, id: Option<SymbolId>) -> Option<SymbolId> {
        id.filter(|id| self.members.contains(id))
    }

    fn by_sequence(&self, token: &str) -> Option<SymbolId> {
        let digits = token.strip_prefix("anon_").unwrap_or(token);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let n: u32 = digits.parse().ok()?;
        if digits.len() == token.len() {
            if let Some(id) = self.member(self.table.lookup(&SymbolName::Numbered(n))) {
                return Some(id);
            }
        }
        self.member(self.table.by_seq(n))
    }

    fn reescaped(&self, token: &str) -> Option<SymbolId> {
        let bare = token
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or(token);
        self.members.iter().copied().find(|id| {
            let raw = self.table.get(*id).name.raw();
            [false, true].into_iter().any(|lowercase| {
                let escaped = escape_bytes(raw.as_bytes(), lowercase);
                escaped == bare || escaped.eq_ignore_ascii_case(bare)
            })
        })
    }

    /// Resolve one token through the fallback chain.
    pub fn resolve(&self, token: &str) -> Option<(SymbolId, Resolution)> {
        if let Some(id) = self.member(self.table.lookup_str(token)) {
            return Some((id, Resolution::Exact));
        }
        if let Some(id) = self.by_sequence(token) {
            return Some((id, Resolution::Sequence));
        }
        if let Some(raw) = unescape_name(token) {
            if let Some(id) = self.member(self.table.lookup_str(&raw)) {
                return Some((id, Resolution::Unescaped));
            }
        }
        if let Some(id) = self.member(self.table.by_escaped(token)) {
            return Some((id, Resolution::EscapedTable));
        }
        self.reescaped(token).map(|id| (id, Resolution::Reescaped))
    }

    /// Members named by other findings that forced linkage may fix.
    fn supplemental(&self, text: &str) -> BTreeSet<SymbolId> {
        let mut found = BTreeSet::new();
        for block in finding_blocks(text) {
            let header = block.lines().next().unwrap_or_default().to_ascii_lowercase();
            if !SUPPLEMENTAL_PHRASES.iter().any(|phrase| header.contains(phrase)) {
                continue;
            }
            for id in self.members {
                let name = &self.table.get(*id).name;
                if spellings(name)
                    .iter()
                    .any(|spelling| mentions(&block, spelling))
                {
                    found.insert(*id);
                }
            }
        }
        found
    }

    /// Every member the diagnostic text asks to be made external. When
    /// violations are reported but none can be traced to a member, every
    /// member is returned.
    pub fn flagged(&self, text: &str) -> BTreeSet<SymbolId> {
        let tokens = Self::violation_tokens(text);
        let mut flagged = BTreeSet::new();
        for token in &tokens {
            match self.resolve(token) {
                Some((id, how)) => {
                    log::trace!("resolved @{} to {} ({:?})", token, id, how);
                    flagged.insert(id);
                }
                None => log::debug!("could not resolve @{} to a partition member", token),
            }
        }

        if !tokens.is_empty() && flagged.is_empty() {
            log::warn!(
                "{} linkage violation(s) matched no member; flagging all {} members",
                tokens.len(),
                self.members.len()
            );
            return self.members.clone();
        }

        flagged.extend(self.supplemental(text));
        flagged
    }
}

/// Split verifier text into a message line plus its indented lines.
fn finding_blocks(text: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    for line in text.lines() {
        let indented = line.starts_with(char::is_whitespace);
        match blocks.last_mut() {
            Some(block) if indented => {
                block.push('\n');
                block.push_str(line);
            }
            _ => blocks.push(line.to_string()),
        }
    }
    blocks
}

/// `@spelling` occurs in `text` and is not the prefix of a longer name.
fn mentions(text: &str, spelling: &str) -> bool {
    let needle = format!("@{}", spelling);
    text.match_indices(&needle).any(|(at, _)| {
        let rest = &text[at + needle.len()..];
        match rest.chars().next() {
            None => true,
            Some(c) => spelling.ends_with('"') || !(is_ident_char(c) || c == '"'),
        }
    })
}

/// Shape checks on a reloaded artifact: the expected symbols and nothing
/// else, and well-formed function signatures. Clone mode counts
/// definitions, signature mode counts every symbol.
pub fn check_structure(
    module: &Module,
    expected: &BTreeSet<SymbolName>,
    mode: MaterializeMode,
) -> Result<(), String> {
    let present: Vec<&SymbolName> = match mode {
        MaterializeMode::Clone => module
            .defined_globals()
            .map(|g| &g.name)
            .chain(module.defined_functions().map(|f| &f.name))
            .collect(),
        MaterializeMode::Signature => module.symbol_names().collect(),
    };

    if present.len() != expected.len() {
        return Err(format!(
            "expected {} symbols, found {}",
            expected.len(),
            present.len()
        ));
    }
    if let Some(stray) = present.iter().find(|name| !expected.contains(*name)) {
        return Err(format!("unexpected symbol @{}", stray));
    }
    for function in &module.functions {
        if !function.ret.is_void() && !function.ret.is_first_class() {
            return Err(format!("@{} has an invalid return type", function.name));
        }
        if function.params.iter().any(|p| !p.ty.is_first_class()) {
            return Err(format!("@{} has an invalid parameter type", function.name));
        }
    }
    Ok(())
}

/// Why an artifact did not verify.
#[derive(Debug)]
pub enum VerifyFailure {
    Load(hyir::utils::Error),
    Linkage(String),
    Structure(String),
}

impl std::fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyFailure::Load(err) => write!(f, "artifact does not load: {}", err),
            VerifyFailure::Linkage(text) => write!(f, "verification failed:\n{}", text),
            VerifyFailure::Structure(reason) => write!(f, "unexpected shape: {}", reason),
        }
    }
}

impl VerifyFailure {
    pub fn into_error(self, partition: usize, artifact: &Path) -> SplitError {
        match self {
            VerifyFailure::Load(source) => SplitError::Load {
                file: artifact.display().to_string(),
                source,
            },
            VerifyFailure::Linkage(diagnostics) => SplitError::Linkage {
                partition,
                diagnostics,
            },
            VerifyFailure::Structure(reason) => SplitError::Structure { partition, reason },
        }
    }
}

/// Reload `path` into a fresh module and verify it.
pub fn verify_artifact(
    path: &Path,
    expected: &BTreeSet<SymbolName>,
    mode: MaterializeMode,
) -> Result<(), VerifyFailure> {
    let mut module = Module::default();
    extend_module_from_path(&mut module, path).map_err(VerifyFailure::Load)?;
    verify_module(&module).map_err(|diagnostics| VerifyFailure::Linkage(diagnostics.to_string()))?;
    check_structure(&module, expected, mode).map_err(VerifyFailure::Structure)
}

/// Verifies partitions and repairs linkage violations.
pub struct Repairer<'a> {
    materializer: &'a Materializer<'a>,
    mode: MaterializeMode,
}

impl<'a> Repairer<'a> {
    pub fn new(materializer: &'a Materializer<'a>, mode: MaterializeMode) -> Self {
        Self { materializer, mode }
    }

    fn expected(&self, partition: &Partition) -> BTreeSet<SymbolName> {
        let table = self.materializer.table();
        partition
            .members
            .iter()
            .map(|id| table.get(*id).name.clone())
            .collect()
    }

    /// Verify the artifact at `artifact`, repairing it at most once through
    /// `side_path`.
    pub fn check(&self, partition: &Partition, artifact: &Path, side_path: &Path) -> PartitionStatus {
        let expected = self.expected(partition);
        let text = match verify_artifact(artifact, &expected, self.mode) {
            Ok(()) => return PartitionStatus::Verified,
            Err(VerifyFailure::Linkage(text)) => text,
            Err(other) => {
                let err = other.into_error(partition.id, artifact);
                log::error!("{}", err);
                return PartitionStatus::Invalid {
                    reason: err.to_string(),
                };
            }
        };

        let table = self.materializer.table();
        let flagged = DiagnosticResolver::new(table, &partition.members).flagged(&text);
        if flagged.is_empty() {
            log::error!(
                "partition {}: no repairable linkage problem in:\n{}",
                partition.id,
                text
            );
            return PartitionStatus::Invalid {
                reason: VerifyFailure::Linkage(text)
                    .into_error(partition.id, artifact)
                    .to_string(),
            };
        }

        log::info!(
            "partition {}: forcing {} symbol(s) to external linkage",
            partition.id,
            flagged.len()
        );
        match self.repair(partition, &flagged, &expected, artifact, side_path) {
            Ok(()) => PartitionStatus::Repaired {
                symbols: flagged
                    .iter()
                    .map(|id| table.get(*id).display_name.clone())
                    .collect(),
            },
            Err(err) => {
                log::error!("partition {}: repair failed: {}", partition.id, err);
                if side_path.exists() {
                    let _ = fs::remove_file(side_path);
                }
                PartitionStatus::Invalid {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn repair(
        &self,
        partition: &Partition,
        flagged: &BTreeSet<SymbolId>,
        expected: &BTreeSet<SymbolName>,
        artifact: &Path,
        side_path: &Path,
    ) -> SplitResult<()> {
        self.materializer
            .materialize(partition, self.mode, flagged, side_path)?;
        verify_artifact(side_path, expected, self.mode)
            .map_err(|failure| failure.into_error(partition.id, side_path))?;
        fs::rename(side_path, artifact).map_err(|e| SplitError::io(artifact, e))
    }
}
