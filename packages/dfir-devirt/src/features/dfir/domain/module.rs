//! Module and library DFIR aggregates

use super::function::Function;
use super::node::Dispatch;
use super::symbols::{FunctionId, ModuleId, SymbolArena, TypeId, TypeKind};
use crate::errors::{DevirtError, Result};
use crate::features::program_ir::domain::{ClassId, FieldId, IrFunctionId, PrimitiveKind};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// Program IR declaration a DFIR function is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclRef {
    Function(IrFunctionId),
    /// Synthetic initializer function of a field
    FieldInitializer(FieldId),
}

/// Identities assigned to the declarations of one compilation unit
#[derive(Debug, Clone)]
pub struct ModuleSymbolTable {
    pub module: ModuleId,
    pub class_map: FxHashMap<ClassId, TypeId>,
    pub primitive_map: FxHashMap<PrimitiveKind, TypeId>,
    pub function_map: FxHashMap<DeclRef, FunctionId>,
    /// Reverse of `function_map`
    pub declarations: FxHashMap<FunctionId, DeclRef>,
    /// Declared types of the unit, in mapping order
    pub types: Vec<TypeId>,
    pub entry_point: Option<FunctionId>,
    /// Type of the bottom class; never a real receiver
    pub nothing_type: Option<TypeId>,
}

impl ModuleSymbolTable {
    pub fn new(module: ModuleId) -> Self {
        Self {
            module,
            class_map: FxHashMap::default(),
            primitive_map: FxHashMap::default(),
            function_map: FxHashMap::default(),
            declarations: FxHashMap::default(),
            types: Vec::new(),
            entry_point: None,
            nothing_type: None,
        }
    }

    pub fn declaration(&self, function: FunctionId) -> Option<DeclRef> {
        self.declarations.get(&function).copied()
    }

    pub fn function_of(&self, function: IrFunctionId) -> Option<FunctionId> {
        self.function_map.get(&DeclRef::Function(function)).copied()
    }
}

/// All DFIR functions of the compilation unit
#[derive(Debug, Clone)]
pub struct ModuleDfg {
    pub name: String,
    pub functions: BTreeMap<FunctionId, Function>,
    pub symbol_table: ModuleSymbolTable,
}

/// DFIR of dependency libraries, reconstructed from their serialized form
#[derive(Debug, Clone, Default)]
pub struct ExternalModulesDfg {
    pub all_types: Vec<TypeId>,
    pub public_types: FxHashMap<u64, TypeId>,
    pub public_functions: FxHashMap<u64, FunctionId>,
    pub function_dfgs: BTreeMap<FunctionId, Function>,
}

/// Serialized DFIR of one dependency library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl LibraryBlob {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Read-only view over the module, its dependencies and the symbol arena
///
/// External references are resolved against the public declarations of the
/// loaded libraries.
#[derive(Clone, Copy)]
pub struct DfgProgram<'a> {
    pub module: &'a ModuleDfg,
    pub external: &'a ExternalModulesDfg,
    pub arena: &'a SymbolArena,
}

impl<'a> DfgProgram<'a> {
    pub fn new(module: &'a ModuleDfg, external: &'a ExternalModulesDfg, arena: &'a SymbolArena) -> Self {
        Self {
            module,
            external,
            arena,
        }
    }

    /// Declared type behind `ty`; an external type no library declares becomes `Virtual`
    pub fn resolve_type(&self, ty: TypeId) -> TypeId {
        match self.arena.ty(ty).kind {
            TypeKind::External { hash } => match self.external.public_types.get(&hash) {
                Some(&resolved) => resolved,
                None => {
                    debug!(hash = %format_args!("{:x}", hash), "Unresolved external type, treating as virtual");
                    TypeId::VIRTUAL
                }
            },
            _ => ty,
        }
    }

    /// Public library function behind an external reference, or the reference itself
    pub fn resolve_function(&self, function: FunctionId) -> FunctionId {
        let symbol = self.arena.function(function);
        if symbol.is_external() {
            if let Some(hash) = symbol.hash() {
                if let Some(&resolved) = self.external.public_functions.get(&hash) {
                    return resolved;
                }
            }
        }
        function
    }

    /// Resolved direct supertypes of a declared type
    pub fn super_types_of(&self, ty: TypeId) -> Vec<TypeId> {
        self.arena
            .ty(ty)
            .super_types
            .iter()
            .map(|&s| self.resolve_type(s))
            .collect()
    }

    /// Implementation a virtual call on an instance of `ty` dispatches to
    pub fn dispatch_target(&self, ty: TypeId, dispatch: Dispatch) -> Result<FunctionId> {
        let declared = self.arena.ty(ty);
        let target = match dispatch {
            Dispatch::Vtable { index } => declared.vtable.get(index as usize).copied(),
            Dispatch::Itable { method_hash } => declared.itable.get(&method_hash).copied(),
        };
        target.ok_or_else(|| {
            DevirtError::internal(format!(
                "{} has no implementation for {:?}",
                self.arena.type_display(ty),
                dispatch
            ))
        })
    }

    pub fn function(&self, symbol: FunctionId) -> Option<&'a Function> {
        self.module
            .functions
            .get(&symbol)
            .or_else(|| self.external.function_dfgs.get(&symbol))
    }

    pub fn is_local(&self, symbol: FunctionId) -> bool {
        self.module.functions.contains_key(&symbol)
    }

    /// Module functions first, then library functions
    pub fn all_functions(&self) -> impl Iterator<Item = &'a Function> + 'a {
        self.module
            .functions
            .values()
            .chain(self.external.function_dfgs.values())
    }

    /// Declared types of the module and of every library
    pub fn all_declared_types(&self) -> Vec<TypeId> {
        let arena = self.arena;
        self.module
            .symbol_table
            .types
            .iter()
            .chain(self.external.all_types.iter())
            .copied()
            .filter(|&t| arena.ty(t).is_declared())
            .collect()
    }

    pub fn entry_point(&self) -> Option<FunctionId> {
        self.module.symbol_table.entry_point
    }
}
