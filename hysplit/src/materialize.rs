//! Turning a partition into a standalone module.
//!
//! Two strategies, picked by [`MaterializeMode`]:
//!
//! - **clone**: copy the source module, keep bodies of member functions,
//!   reduce referenced outsiders to declarations and drop the rest. Global
//!   initializers only survive in the globals partition.
//! - **signature**: declare every member in a fresh module, with types
//!   re-derived structurally and the original attributes.
//!
//! Members referenced from other partitions are promoted out of local
//! linkage in clone mode. Callers may force more symbols to external
//! linkage through `overrides`, which is how the repair pass works.
use std::{
    collections::{BTreeSet, HashSet},
    fs,
    io::Write,
    path::Path,
};

use hyir::{
    linkage::{DllStorageClass, Linkage, Visibility},
    module::{Function, GlobalVariable, Module, Param, SymbolAttributes},
    name::SymbolName,
    types::Type,
};

use crate::{
    config::MaterializeMode,
    error::{SplitError, SplitResult},
    graph::ReferenceGraph,
    planner::{Partition, PlannerState},
    symbols::{SymbolId, SymbolTable},
};

/// Simple types are kept, everything else becomes an opaque pointer in the
/// same address space as before (or 0).
pub fn reconstruct_type(ty: &Type) -> Type {
    match ty {
        Type::Void | Type::Float | Type::Double => ty.clone(),
        Type::Int(bits) => Type::Int(*bits),
        Type::Ptr { addrspace } => Type::ptr_in(*addrspace),
        _ => Type::PTR,
    }
}

/// Move a local symbol into the global symbol table.
fn promote(attributes: &mut SymbolAttributes) {
    if attributes.linkage.is_local() {
        attributes.linkage = Linkage::External;
        attributes.visibility = Visibility::Default;
    }
}

fn force_external(attributes: &mut SymbolAttributes) {
    attributes.linkage = Linkage::External;
    attributes.visibility = Visibility::Default;
}

/// Attributes a declaration of a symbol defined elsewhere may carry.
fn declare_external(attributes: &mut SymbolAttributes) {
    if attributes.linkage.is_local() {
        attributes.visibility = Visibility::Default;
    }
    if attributes.linkage != Linkage::ExternalWeak {
        attributes.linkage = Linkage::External;
    }
    if attributes.dll_storage == DllStorageClass::DllExport {
        attributes.dll_storage = DllStorageClass::Default;
    }
}

pub struct Materializer<'a> {
    module: &'a Module,
    table: &'a SymbolTable,
    graph: &'a ReferenceGraph,
    state: &'a PlannerState,
}

impl<'a> Materializer<'a> {
    pub fn new(
        module: &'a Module,
        table: &'a SymbolTable,
        graph: &'a ReferenceGraph,
        state: &'a PlannerState,
    ) -> Self {
        Self {
            module,
            table,
            graph,
            state,
        }
    }

    pub fn table(&self) -> &SymbolTable {
        self.table
    }

    /// Members used from outside the partition, or by unassigned symbols.
    pub fn exported(&self, partition: &Partition) -> BTreeSet<SymbolId> {
        partition
            .members
            .iter()
            .copied()
            .filter(|member| {
                self.graph
                    .referrers(*member)
                    .any(|user| self.state.partition_of(user) != Some(partition.id))
            })
            .collect()
    }

    pub fn render(
        &self,
        partition: &Partition,
        mode: MaterializeMode,
        overrides: &BTreeSet<SymbolId>,
    ) -> Module {
        match mode {
            MaterializeMode::Clone => self.render_clone(partition, overrides),
            MaterializeMode::Signature => self.render_signature(partition, overrides),
        }
    }

    /// Render and write in one step. A failed write leaves no file behind.
    pub fn materialize(
        &self,
        partition: &Partition,
        mode: MaterializeMode,
        overrides: &BTreeSet<SymbolId>,
        path: &Path,
    ) -> SplitResult<()> {
        let module = self.render(partition, mode, overrides);
        write_module(&module, path)?;
        log::debug!(
            "wrote partition {} ({} mode, {} symbols) to {}",
            partition.id,
            mode,
            partition.len(),
            path.display()
        );
        Ok(())
    }

    fn render_signature(&self, partition: &Partition, overrides: &BTreeSet<SymbolId>) -> Module {
        let mut out = Module {
            source_filename: self.module.source_filename.clone(),
            target_triple: self.module.target_triple.clone(),
            data_layout: self.module.data_layout.clone(),
            ..Module::default()
        };

        for id in &partition.members {
            let record = self.table.get(*id);
            if record.is_global() {
                let source = &self.module.globals[record.item];
                let mut attributes = source.attributes.clone();
                if overrides.contains(id) {
                    force_external(&mut attributes);
                }
                out.globals.push(GlobalVariable {
                    name: source.name.clone(),
                    attributes,
                    thread_local: source.thread_local,
                    constant: source.constant,
                    ty: reconstruct_type(&source.ty),
                    initializer: None,
                    align: source.align,
                });
            } else {
                let source = &self.module.functions[record.item];
                let mut attributes = source.attributes.clone();
                if overrides.contains(id) {
                    force_external(&mut attributes);
                }
                out.functions.push(Function {
                    name: source.name.clone(),
                    attributes,
                    cconv: source.cconv,
                    ret: reconstruct_type(&source.ret),
                    params: source
                        .params
                        .iter()
                        .map(|param| Param {
                            ty: reconstruct_type(&param.ty),
                            name: None,
                        })
                        .collect(),
                    vararg: source.vararg,
                    personality: None,
                    blocks: Vec::new(),
                });
            }
        }
        out
    }

    fn render_clone(&self, partition: &Partition, overrides: &BTreeSet<SymbolId>) -> Module {
        let mut out = self.module.clone();
        let exported = self.exported(partition);
        let needs_export =
            |id: SymbolId| exported.contains(&id) || overrides.contains(&id);

        for (item, function) in out.functions.iter_mut().enumerate() {
            let id = self.table.function_id(self.module, item);
            match id.filter(|id| partition.contains(*id)) {
                Some(id) => {
                    if overrides.contains(&id) {
                        force_external(&mut function.attributes);
                    } else if needs_export(id) {
                        promote(&mut function.attributes);
                    }
                }
                None => {
                    function.strip_body();
                    declare_external(&mut function.attributes);
                }
            }
        }

        for (item, global) in out.globals.iter_mut().enumerate() {
            let id = self.table.global_id(self.module, item);
            match id.filter(|id| partition.is_globals() && partition.contains(*id)) {
                Some(id) => {
                    if overrides.contains(&id) {
                        force_external(&mut global.attributes);
                    } else if needs_export(id) {
                        promote(&mut global.attributes);
                    }
                }
                None => {
                    global.initializer = None;
                    declare_external(&mut global.attributes);
                    if global.attributes.linkage == Linkage::Common {
                        global.attributes.linkage = Linkage::External;
                    }
                }
            }
        }

        let referenced = referenced_symbols(&out);
        out.functions
            .retain(|function| !function.is_declaration() || referenced.contains(&function.name));
        out
    }
}

/// Symbols used by any body, personality or initializer of `module`.
fn referenced_symbols(module: &Module) -> HashSet<SymbolName> {
    let mut referenced = HashSet::new();
    for global in &module.globals {
        if let Some(init) = &global.initializer {
            init.for_each_symbol(|name| {
                referenced.insert(name.clone());
            });
        }
    }
    for function in &module.functions {
        for operand in function.operands() {
            operand.for_each_symbol(|name| {
                referenced.insert(name.clone());
            });
        }
        if let Some(personality) = &function.personality {
            personality.value.for_each_symbol(|name| {
                referenced.insert(name.clone());
            });
        }
    }
    referenced
}

fn write_text(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(text.as_bytes())?;
    file.sync_all()
}

/// Print `module` to `path`. On failure any partial file is removed.
pub fn write_module(module: &Module, path: &Path) -> SplitResult<()> {
    let text = module.to_string();
    write_text(path, &text).map_err(|err| {
        log::error!("failed to write {}: {}", path.display(), err);
        if path.exists() {
            if let Err(cleanup) = fs::remove_file(path) {
                log::warn!("could not remove partial {}: {}", path.display(), cleanup);
            }
        }
        SplitError::io(path, err)
    })
}
