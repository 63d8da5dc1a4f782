//! Structural verifier.
//!
//! Problems are reported as free text: every finding is a message line
//! followed by one indented `ptr @name` line per offending symbol. Consumers
//! that want to act on a finding have to recover the symbols from the text.
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    linkage::{DllStorageClass, Linkage, Visibility},
    module::{Function, GlobalVariable, Module, SymbolAttributes},
    name::SymbolName,
    types::Type,
    value::Value,
};

/// Declaration whose linkage is neither `external` nor `extern_weak`.
pub const EXTERNAL_LINKAGE_VIOLATION: &str =
    "Global is external, but doesn't have external or weak linkage!";

pub const LOCAL_VISIBILITY_VIOLATION: &str =
    "GlobalValue with private or internal linkage must have default visibility";

pub const LOCAL_DLLIMPORT_VIOLATION: &str = "Global is marked as dllimport, but not external";

pub const UNDEFINED_SYMBOL: &str = "Referencing undefined symbol";

/// A single problem and the symbols it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub message: String,
    pub symbols: Vec<SymbolName>,
}

/// Every finding of a verification run, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifierDiagnostics {
    findings: Vec<Finding>,
}

impl VerifierDiagnostics {
    fn push(&mut self, message: impl Into<String>, symbols: Vec<SymbolName>) {
        self.findings.push(Finding {
            message: message.into(),
            symbols,
        });
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }
}

impl std::fmt::Display for VerifierDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for finding in &self.findings {
            writeln!(f, "{}", finding.message)?;
            for symbol in &finding.symbols {
                writeln!(f, "  ptr @{}", symbol)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for VerifierDiagnostics {}

#[derive(Clone, Copy)]
enum SymbolKind<'a> {
    Function(&'a Function),
    Global,
}

struct Verifier<'a> {
    module: &'a Module,
    symbols: HashMap<&'a SymbolName, SymbolKind<'a>>,
    diagnostics: VerifierDiagnostics,
}

impl<'a> Verifier<'a> {
    fn new(module: &'a Module) -> Self {
        Self {
            module,
            symbols: HashMap::with_capacity(module.symbol_count()),
            diagnostics: VerifierDiagnostics::default(),
        }
    }

    fn check_symbol_table(&mut self) {
        let module = self.module;
        let mut duplicates = BTreeSet::new();
        for global in &module.globals {
            if self
                .symbols
                .insert(&global.name, SymbolKind::Global)
                .is_some()
            {
                duplicates.insert(global.name.clone());
            }
        }
        for function in &module.functions {
            if self
                .symbols
                .insert(&function.name, SymbolKind::Function(function))
                .is_some()
            {
                duplicates.insert(function.name.clone());
            }
        }
        for name in duplicates {
            self.diagnostics
                .push("Redefinition of global symbol", vec![name]);
        }
    }

    fn check_attributes(&mut self, name: &SymbolName, attributes: &SymbolAttributes, declaration: bool) {
        if declaration && !attributes.linkage.is_valid_declaration_linkage() {
            self.diagnostics
                .push(EXTERNAL_LINKAGE_VIOLATION, vec![name.clone()]);
        }
        if attributes.linkage.is_local() && attributes.visibility != Visibility::Default {
            self.diagnostics
                .push(LOCAL_VISIBILITY_VIOLATION, vec![name.clone()]);
        }
        if attributes.linkage.is_local() && attributes.dll_storage == DllStorageClass::DllImport {
            self.diagnostics
                .push(LOCAL_DLLIMPORT_VIOLATION, vec![name.clone()]);
        }
    }

    fn check_references(&mut self, user: &SymbolName, value: &Value) {
        let mut missing = Vec::new();
        value.for_each_symbol(|name| {
            if !self.symbols.contains_key(name) {
                missing.push(name.clone());
            }
        });
        for name in missing {
            self.diagnostics.push(
                format!("{} @{}", UNDEFINED_SYMBOL, name),
                vec![user.clone()],
            );
        }
    }

    fn check_blockaddress(&mut self, user: &SymbolName, value: &Value) {
        let mut invalid = false;
        let mut stack = vec![value];
        while let Some(value) = stack.pop() {
            match value {
                Value::BlockAddress { function, block } => {
                    let valid = match self.symbols.get(function) {
                        Some(SymbolKind::Function(f)) => f.block(block).is_some(),
                        _ => false,
                    };
                    invalid |= !valid;
                }
                Value::Aggregate { elements, .. } => {
                    stack.extend(elements.iter().map(|tv| &tv.value));
                }
                Value::Expr(expr) => stack.extend(expr.operands.iter().map(|tv| &tv.value)),
                _ => {}
            }
        }
        if invalid {
            self.diagnostics
                .push("blockaddress does not refer to a basic block of a defined function", vec![user.clone()]);
        }
    }

    fn check_global(&mut self, global: &GlobalVariable) {
        let name = &global.name;
        self.check_attributes(name, &global.attributes, global.is_declaration());

        match global.attributes.linkage {
            Linkage::Appending if !global.ty.is_array() => {
                self.diagnostics
                    .push("Only global arrays can have appending linkage!", vec![name.clone()]);
            }
            Linkage::Common => {
                if !global.initializer.as_ref().is_some_and(Value::is_zero) {
                    self.diagnostics
                        .push("'common' global must have a zero initializer!", vec![name.clone()]);
                }
                if global.constant {
                    self.diagnostics
                        .push("'common' global may not be marked constant!", vec![name.clone()]);
                }
            }
            _ => {}
        }

        if let Some(init) = &global.initializer {
            self.check_references(name, init);
            self.check_blockaddress(name, init);
        }
    }

    fn check_function(&mut self, function: &'a Function) {
        let name = &function.name;
        self.check_attributes(name, &function.attributes, function.is_declaration());

        if matches!(
            function.attributes.linkage,
            Linkage::Common | Linkage::Appending
        ) {
            self.diagnostics.push(
                format!(
                    "Functions may not have {} linkage",
                    function.attributes.linkage
                ),
                vec![name.clone()],
            );
        }
        if function.params.iter().any(|p| !p.ty.is_first_class()) {
            self.diagnostics
                .push("Function takes a non-first-class parameter type!", vec![name.clone()]);
        }
        if matches!(function.ret, Type::Label) {
            self.diagnostics
                .push("Function returns a label type", vec![name.clone()]);
        }
        if let Some(personality) = &function.personality {
            self.check_references(name, &personality.value);
        }
        if function.is_declaration() {
            return;
        }

        self.check_body(function);
    }

    fn check_body(&mut self, function: &'a Function) {
        let name = &function.name;

        let mut labels = HashSet::new();
        for bb in &function.blocks {
            if !labels.insert(bb.label.as_str()) {
                self.diagnostics.push(
                    format!("Duplicate basic block label '%{}'", bb.label),
                    vec![name.clone()],
                );
            }
        }

        let mut locals: HashSet<&str> = function
            .params
            .iter()
            .filter_map(|p| p.name.as_deref())
            .collect();
        for bb in &function.blocks {
            locals.extend(bb.instructions.iter().filter_map(|instr| instr.dest()));
            locals.extend(bb.terminator.dest());
        }

        let mut undefined_locals = BTreeSet::new();
        for value in function.operands() {
            value.for_each_local(|local| {
                if !locals.contains(local) {
                    undefined_locals.insert(local.to_string());
                }
            });
            self.check_references(name, value);
            self.check_blockaddress(name, value);
        }
        for local in undefined_locals {
            self.diagnostics.push(
                format!("Use of undefined value '%{}'", local),
                vec![name.clone()],
            );
        }

        for bb in &function.blocks {
            for target in bb.terminator.successors() {
                if !labels.contains(target) {
                    self.diagnostics.push(
                        format!("Branch to undefined basic block '%{}'", target),
                        vec![name.clone()],
                    );
                }
            }
        }

        for call in function.calls() {
            let Some(callee) = call.callee.direct_symbol() else {
                continue;
            };
            let Some(SymbolKind::Function(target)) = self.symbols.get(callee).copied() else {
                continue;
            };
            let expected = target.params.len();
            let given = call.args.len();
            let arity_ok = if target.vararg {
                given >= expected
            } else {
                given == expected
            };
            if !arity_ok {
                self.diagnostics.push(
                    "Incorrect number of arguments passed to called function!",
                    vec![name.clone(), callee.clone()],
                );
            }
        }
    }
}

/// Check `module` for structural and linkage problems.
pub fn verify_module(module: &Module) -> Result<(), VerifierDiagnostics> {
    let mut verifier = Verifier::new(module);
    verifier.check_symbol_table();
    for global in &module.globals {
        verifier.check_global(global);
    }
    for function in &module.functions {
        verifier.check_function(function);
    }

    if verifier.diagnostics.is_empty() {
        Ok(())
    } else {
        log::debug!(
            "verification found {} problem(s)",
            verifier.diagnostics.len()
        );
        Err(verifier.diagnostics)
    }
}
