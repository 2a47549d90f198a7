//! Types and function symbols of the data-flow IR
//!
//! Every type and function symbol of one compilation lives in a single
//! [`SymbolArena`], module-local and deserialized ones alike, so identity is an
//! index comparison. External and public declarations are interned by their
//! structural hash; private ones get a fresh arena-global index.

use rustc_hash::FxHashMap;
use std::fmt;

/// Index of a type in the [`SymbolArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// The `Virtual` sentinel: opaque type, never devirtualized through
    pub const VIRTUAL: TypeId = TypeId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a function symbol in the [`SymbolArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl FunctionId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a compilation unit in the [`SymbolArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    /// Size of the module's function table (virtually callable functions)
    pub number_of_functions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Virtual,
    /// Declared in a dependency; structure only known after resolution
    External { hash: u64 },
    /// Declared and exported
    Public { hash: u64 },
    /// Declared and local to its compilation unit
    Private { index: u32 },
}

#[derive(Debug, Clone)]
pub struct DfirType {
    pub kind: TypeKind,
    pub is_final: bool,
    pub is_abstract: bool,
    pub super_types: Vec<TypeId>,
    /// One function per virtual slot
    pub vtable: Vec<FunctionId>,
    /// Interface method hash to implementation
    pub itable: FxHashMap<u64, FunctionId>,
    pub name: Option<String>,
}

impl DfirType {
    fn new(kind: TypeKind, is_final: bool, is_abstract: bool, name: Option<String>) -> Self {
        Self {
            kind,
            is_final,
            is_abstract,
            super_types: Vec::new(),
            vtable: Vec::new(),
            itable: FxHashMap::default(),
            name,
        }
    }

    pub fn is_declared(&self) -> bool {
        matches!(self.kind, TypeKind::Public { .. } | TypeKind::Private { .. })
    }

    pub fn is_external(&self) -> bool {
        matches!(self.kind, TypeKind::External { .. })
    }
}

/// Escape/points-to annotation of an external function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalAnnotations {
    /// Bitmask of parameters (and bit N for the return value) that escape
    pub escapes: Option<u32>,
    /// Per parameter, bitmask of parameters it may point to
    pub points_to: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionSymbolKind {
    External {
        hash: u64,
        annotations: ExternalAnnotations,
    },
    Public {
        hash: u64,
        /// Index in the owning module's function table, -1 when not virtually callable
        symbol_table_index: i32,
    },
    Private {
        index: u32,
        symbol_table_index: i32,
    },
}

/// Function symbol attribute flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FunctionAttributes(pub u32);

impl FunctionAttributes {
    pub const IS_GLOBAL_INITIALIZER: u32 = 1;
    pub const RETURNS_UNIT: u32 = 2;
    pub const RETURNS_NOTHING: u32 = 4;

    #[inline]
    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    #[inline]
    pub fn with(self, flag: u32) -> Self {
        FunctionAttributes(self.0 | flag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionParameter {
    pub ty: TypeId,
    pub box_function: Option<FunctionId>,
    pub unbox_function: Option<FunctionId>,
}

impl FunctionParameter {
    pub fn plain(ty: TypeId) -> Self {
        Self {
            ty,
            box_function: None,
            unbox_function: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionSymbol {
    pub kind: FunctionSymbolKind,
    /// Owning module of declared functions
    pub module: Option<ModuleId>,
    pub attributes: FunctionAttributes,
    pub parameters: Vec<FunctionParameter>,
    pub return_parameter: FunctionParameter,
    pub name: Option<String>,
}

impl FunctionSymbol {
    pub fn is_external(&self) -> bool {
        matches!(self.kind, FunctionSymbolKind::External { .. })
    }

    pub fn is_declared(&self) -> bool {
        !self.is_external()
    }

    pub fn is_public(&self) -> bool {
        matches!(self.kind, FunctionSymbolKind::Public { .. })
    }

    pub fn is_global_initializer(&self) -> bool {
        self.attributes
            .contains(FunctionAttributes::IS_GLOBAL_INITIALIZER)
    }

    /// Function-table slot, if the function is declared and virtually callable
    pub fn symbol_table_index(&self) -> Option<i32> {
        match self.kind {
            FunctionSymbolKind::External { .. } => None,
            FunctionSymbolKind::Public {
                symbol_table_index, ..
            }
            | FunctionSymbolKind::Private {
                symbol_table_index, ..
            } => Some(symbol_table_index),
        }
    }

    pub fn hash(&self) -> Option<u64> {
        match self.kind {
            FunctionSymbolKind::External { hash, .. } | FunctionSymbolKind::Public { hash, .. } => {
                Some(hash)
            }
            FunctionSymbolKind::Private { .. } => None,
        }
    }
}

/// Owner of every type and function symbol of one compilation
#[derive(Debug, Clone)]
pub struct SymbolArena {
    types: Vec<DfirType>,
    functions: Vec<FunctionSymbol>,
    modules: Vec<ModuleInfo>,
    external_types: FxHashMap<u64, TypeId>,
    public_types: FxHashMap<u64, TypeId>,
    external_functions: FxHashMap<u64, FunctionId>,
    public_functions: FxHashMap<u64, FunctionId>,
    next_private_type: u32,
    next_private_function: u32,
}

impl Default for SymbolArena {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolArena {
    pub fn new() -> Self {
        // Virtual is abstract and open: it stands for any type
        let virtual_type = DfirType::new(TypeKind::Virtual, false, true, Some("$VIRTUAL".into()));
        Self {
            types: vec![virtual_type],
            functions: Vec::new(),
            modules: Vec::new(),
            external_types: FxHashMap::default(),
            public_types: FxHashMap::default(),
            external_functions: FxHashMap::default(),
            public_functions: FxHashMap::default(),
            next_private_type: 0,
            next_private_function: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Modules
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_module(&mut self, name: impl Into<String>) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleInfo {
            name: name.into(),
            number_of_functions: 0,
        });
        id
    }

    pub fn module(&self, id: ModuleId) -> &ModuleInfo {
        &self.modules[id.0 as usize]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut ModuleInfo {
        &mut self.modules[id.0 as usize]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Types
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn ty(&self, id: TypeId) -> &DfirType {
        &self.types[id.index()]
    }

    #[inline]
    pub fn ty_mut(&mut self, id: TypeId) -> &mut DfirType {
        &mut self.types[id.index()]
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    fn push_type(&mut self, ty: DfirType) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// Reference to a type declared in a dependency
    pub fn intern_external_type(&mut self, hash: u64, name: Option<String>) -> TypeId {
        if let Some(&id) = self.external_types.get(&hash) {
            return id;
        }
        let id = self.push_type(DfirType::new(TypeKind::External { hash }, false, false, name));
        self.external_types.insert(hash, id);
        id
    }

    /// Exported declared type; a second declaration with the same hash returns the first
    pub fn intern_public_type(
        &mut self,
        hash: u64,
        is_final: bool,
        is_abstract: bool,
        name: Option<String>,
    ) -> TypeId {
        if let Some(&id) = self.public_types.get(&hash) {
            return id;
        }
        let id = self.push_type(DfirType::new(TypeKind::Public { hash }, is_final, is_abstract, name));
        self.public_types.insert(hash, id);
        id
    }

    pub fn new_private_type(&mut self, is_final: bool, is_abstract: bool, name: Option<String>) -> TypeId {
        let index = self.next_private_type;
        self.next_private_type += 1;
        self.push_type(DfirType::new(TypeKind::Private { index }, is_final, is_abstract, name))
    }

    pub fn public_type(&self, hash: u64) -> Option<TypeId> {
        self.public_types.get(&hash).copied()
    }

    /// All declared types, in creation order
    pub fn declared_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.types
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_declared())
            .map(|(i, _)| TypeId(i as u32))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Functions
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn function(&self, id: FunctionId) -> &FunctionSymbol {
        &self.functions[id.index()]
    }

    #[inline]
    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionSymbol {
        &mut self.functions[id.index()]
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    fn push_function(&mut self, kind: FunctionSymbolKind, module: Option<ModuleId>, name: Option<String>) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(FunctionSymbol {
            kind,
            module,
            attributes: FunctionAttributes::default(),
            parameters: Vec::new(),
            return_parameter: FunctionParameter::plain(TypeId::VIRTUAL),
            name,
        });
        id
    }

    pub fn intern_external_function(
        &mut self,
        hash: u64,
        annotations: ExternalAnnotations,
        name: Option<String>,
    ) -> FunctionId {
        if let Some(&id) = self.external_functions.get(&hash) {
            return id;
        }
        let id = self.push_function(FunctionSymbolKind::External { hash, annotations }, None, name);
        self.external_functions.insert(hash, id);
        id
    }

    pub fn intern_public_function(
        &mut self,
        hash: u64,
        module: ModuleId,
        symbol_table_index: i32,
        name: Option<String>,
    ) -> FunctionId {
        if let Some(&id) = self.public_functions.get(&hash) {
            return id;
        }
        let kind = FunctionSymbolKind::Public {
            hash,
            symbol_table_index,
        };
        let id = self.push_function(kind, Some(module), name);
        self.public_functions.insert(hash, id);
        id
    }

    pub fn new_private_function(&mut self, module: ModuleId, symbol_table_index: i32, name: Option<String>) -> FunctionId {
        let index = self.next_private_function;
        self.next_private_function += 1;
        let kind = FunctionSymbolKind::Private {
            index,
            symbol_table_index,
        };
        self.push_function(kind, Some(module), name)
    }

    pub fn public_function(&self, hash: u64) -> Option<FunctionId> {
        self.public_functions.get(&hash).copied()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Display
    // ═══════════════════════════════════════════════════════════════════════

    pub fn type_display(&self, id: TypeId) -> TypeDisplay<'_> {
        TypeDisplay { arena: self, id }
    }

    pub fn function_display(&self, id: FunctionId) -> FunctionDisplay<'_> {
        FunctionDisplay { arena: self, id }
    }
}

pub struct TypeDisplay<'a> {
    arena: &'a SymbolArena,
    id: TypeId,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.arena.ty(self.id);
        let name = ty.name.as_deref().unwrap_or("");
        match ty.kind {
            TypeKind::Virtual => write!(f, "VirtualType"),
            TypeKind::External { hash } => write!(f, "ExternalType(hash='{:x}', name='{}')", hash, name),
            TypeKind::Public { hash } => write!(f, "PublicType(hash='{:x}', name='{}')", hash, name),
            TypeKind::Private { index } => write!(f, "PrivateType(index={}, name='{}')", index, name),
        }
    }
}

pub struct FunctionDisplay<'a> {
    arena: &'a SymbolArena,
    id: FunctionId,
}

impl fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let function = self.arena.function(self.id);
        let name = function.name.as_deref().unwrap_or("");
        match &function.kind {
            FunctionSymbolKind::External { hash, .. } => {
                write!(f, "ExternalFunction(hash='{:x}', name='{}')", hash, name)
            }
            FunctionSymbolKind::Public {
                hash,
                symbol_table_index,
            } => write!(
                f,
                "PublicFunction(hash='{:x}', symbolTableIndex={}, name='{}')",
                hash, symbol_table_index, name
            ),
            FunctionSymbolKind::Private {
                index,
                symbol_table_index,
            } => write!(
                f,
                "PrivateFunction(index={}, symbolTableIndex={}, name='{}')",
                index, symbol_table_index, name
            ),
        }
    }
}
