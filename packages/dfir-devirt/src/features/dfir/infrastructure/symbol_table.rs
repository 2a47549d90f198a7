//! Symbol table: stable DFIR identities for program IR declarations
//!
//! Classes map to [`DfirType`](crate::features::dfir::domain::DfirType)s and
//! functions (plus global field initializers) to function symbols. Type
//! layouts (super types, vtable, itable) are filled in a second pass over the
//! classes mapped so far, so mapping never recurses through a class hierarchy.

use crate::features::dfir::domain::{
    DeclRef, ExternalAnnotations, Field, FunctionAttributes, FunctionId, FunctionParameter,
    ModuleId, ModuleSymbolTable, SymbolArena, TypeId,
};
use crate::features::program_ir::domain::{
    ClassId, FieldId, IrFunctionId, IrModule, IrType, Modality, Origin, PrimitiveKind,
};
use crate::features::program_ir::infrastructure::VtableLayouts;
use crate::shared::local_hash;
use rustc_hash::FxHashMap;
use tracing::debug;

pub struct SymbolTable<'a> {
    module: &'a IrModule,
    layouts: &'a VtableLayouts,
    arena: &'a mut SymbolArena,
    table: ModuleSymbolTable,
    take_names: bool,
    /// Classes whose layout is not filled yet
    pending_layouts: Vec<(ClassId, TypeId)>,
    /// First constructor declared by each class
    constructors: FxHashMap<ClassId, IrFunctionId>,
}

impl<'a> SymbolTable<'a> {
    pub fn new(
        module: &'a IrModule,
        layouts: &'a VtableLayouts,
        arena: &'a mut SymbolArena,
        take_names: bool,
    ) -> Self {
        let module_id = arena.add_module(module.name.clone());
        let mut constructors = FxHashMap::default();
        for function in module.function_ids() {
            let declaration = module.function(function);
            if let (true, Some(class)) = (declaration.is_constructor(), declaration.parent) {
                constructors.entry(class).or_insert(function);
            }
        }
        Self {
            module,
            layouts,
            arena,
            table: ModuleSymbolTable::new(module_id),
            take_names,
            pending_layouts: Vec::new(),
            constructors,
        }
    }

    /// Map every class, every function with a body and every global field initializer
    pub fn populate(&mut self) {
        let module = self.module;
        for class in module.class_ids() {
            self.map_class(class);
        }
        for function in module.function_ids() {
            if module.function(function).body.is_some() {
                self.map_function(function);
            }
        }
        for field in module.field_ids() {
            let declaration = module.field(field);
            if declaration.is_global() && declaration.initializer.is_some() {
                self.map_field_initializer(field);
            }
        }
        self.table.entry_point = module.entry_point.map(|f| self.map_function(f));
        self.table.nothing_type = Some(self.map_class(module.builtins.nothing));
        self.complete_layouts();
    }

    pub fn module_id(&self) -> ModuleId {
        self.table.module
    }

    pub fn ir(&self) -> &'a IrModule {
        self.module
    }

    pub fn layouts(&self) -> &'a VtableLayouts {
        self.layouts
    }

    pub fn arena(&self) -> &SymbolArena {
        self.arena
    }

    pub fn table(&self) -> &ModuleSymbolTable {
        &self.table
    }

    /// Fill the remaining layouts and hand the table over
    pub fn finish(mut self) -> ModuleSymbolTable {
        self.complete_layouts();
        self.table
    }

    /// Constructor run when `class` is instantiated as a singleton object
    pub fn object_constructor(&mut self, class: ClassId) -> Option<FunctionId> {
        let function = *self.constructors.get(&class)?;
        Some(self.map_function(function))
    }

    fn name(&self, build: impl FnOnce() -> String) -> Option<String> {
        if self.take_names {
            Some(build())
        } else {
            None
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Types
    // ═══════════════════════════════════════════════════════════════════════

    pub fn map_class(&mut self, class: ClassId) -> TypeId {
        if let Some(&ty) = self.table.class_map.get(&class) {
            return ty;
        }
        let module = self.module;
        let declaration = module.class(class);
        // Foreign classes dispatch through mechanisms the analysis cannot see
        if declaration.is_opaque {
            debug!(class = %declaration.name, "Opaque class, treating as virtual");
            self.table.class_map.insert(class, TypeId::VIRTUAL);
            return TypeId::VIRTUAL;
        }

        let hash = local_hash(&declaration.name);
        let name = self.name(|| declaration.name.clone());
        let is_final = declaration.is_final();
        let is_abstract = declaration.is_abstract();
        let ty = match declaration.origin {
            Origin::Library(_) => self.arena.intern_external_type(hash, name),
            Origin::Local if declaration.is_exported() => {
                self.arena.intern_public_type(hash, is_final, is_abstract, name)
            }
            Origin::Local => self.arena.new_private_type(is_final, is_abstract, name),
        };
        self.table.class_map.insert(class, ty);
        if declaration.origin.is_local() {
            self.table.types.push(ty);
            self.pending_layouts.push((class, ty));
        }
        ty
    }

    fn map_primitive(&mut self, kind: PrimitiveKind) -> TypeId {
        if let Some(&ty) = self.table.primitive_map.get(&kind) {
            return ty;
        }
        let name = self.name(|| kind.qualified_name().to_string());
        let ty = self
            .arena
            .intern_public_type(local_hash(kind.qualified_name()), true, false, name);
        self.table.primitive_map.insert(kind, ty);
        self.table.types.push(ty);
        ty
    }

    /// Erased DFIR type of a program IR type
    pub fn map_type(&mut self, ty: &IrType) -> TypeId {
        match ty {
            IrType::Class { class, .. } => self.map_class(*class),
            IrType::Primitive { kind, nullable } => {
                let boxed = if *nullable {
                    self.module.builtins.box_classes.get(kind).copied()
                } else {
                    None
                };
                match boxed {
                    Some(box_class) => self.map_class(box_class),
                    None => self.map_primitive(*kind),
                }
            }
            IrType::TypeParameter { upper_bounds, .. } => {
                let bound = self.erasure(upper_bounds);
                self.map_type(&bound)
            }
        }
    }

    /// Primary bound of a type parameter: the only bound, else the single class bound, else `Any`
    fn erasure(&self, upper_bounds: &[IrType]) -> IrType {
        let module = self.module;
        match upper_bounds {
            [] => IrType::class(module.builtins.any),
            [single] => single.clone(),
            bounds => {
                let mut classes = bounds.iter().filter(|b| match b.class_id() {
                    Some(class) => !module.class(class).is_interface(),
                    None => true,
                });
                match (classes.next(), classes.next()) {
                    (Some(class), None) => class.clone(),
                    _ => IrType::class(module.builtins.any),
                }
            }
        }
    }

    fn complete_layouts(&mut self) {
        while let Some((class, ty)) = self.pending_layouts.pop() {
            let module = self.module;
            let declaration = module.class(class);
            let super_types: Vec<TypeId> = declaration
                .super_types
                .iter()
                .map(|&s| self.map_class(s))
                .collect();
            self.arena.ty_mut(ty).super_types = super_types;

            if declaration.is_abstract() {
                continue;
            }
            let Some(layout) = self.layouts.layout(class) else {
                continue;
            };
            let vtable: Vec<FunctionId> = layout
                .slots
                .iter()
                .map(|slot| self.map_function(slot.implementation))
                .collect();
            let mut itable = rustc_hash::FxHashMap::default();
            for &(interface_method, implementation) in &layout.itable {
                let hash = local_hash(&module.function(interface_method).signature);
                itable.insert(hash, self.map_function(implementation));
            }
            let target = self.arena.ty_mut(ty);
            target.vtable = vtable;
            target.itable = itable;
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Functions
    // ═══════════════════════════════════════════════════════════════════════

    pub fn map_function(&mut self, function: IrFunctionId) -> FunctionId {
        let key = DeclRef::Function(function);
        if let Some(&symbol) = self.table.function_map.get(&key) {
            return symbol;
        }

        let module = self.module;
        let declaration = module.function(function);
        let fq_name = module.function_fq_name(function);
        let name = self.name(|| fq_name.clone());

        let mut attributes = FunctionAttributes::default();
        if declaration.is_constructor() || module.is_unit(&declaration.return_type) {
            attributes = attributes.with(FunctionAttributes::RETURNS_UNIT);
        }
        if module.is_nothing(&declaration.return_type) {
            attributes = attributes.with(FunctionAttributes::RETURNS_NOTHING);
        }

        let symbol = match declaration.origin {
            Origin::Library(_) => {
                let hash = local_hash(&module.function_fq_signature(function));
                self.arena
                    .intern_external_function(hash, ExternalAnnotations::default(), name)
            }
            Origin::Local => {
                let virtually_callable = declaration.parent.is_some()
                    && !declaration.is_constructor()
                    && declaration.modality != Modality::Abstract
                    && (declaration.is_overridable() || !declaration.overridden.is_empty());
                let symbol_table_index = if virtually_callable {
                    let info = self.arena.module_mut(self.table.module);
                    let index = info.number_of_functions as i32;
                    info.number_of_functions += 1;
                    index
                } else {
                    -1
                };
                if declaration.is_exported() {
                    let hash = local_hash(&module.function_fq_signature(function));
                    self.arena
                        .intern_public_function(hash, self.table.module, symbol_table_index, name)
                } else {
                    self.arena
                        .new_private_function(self.table.module, symbol_table_index, name)
                }
            }
        };
        self.table.function_map.insert(key, symbol);
        self.table.declarations.insert(symbol, key);
        self.arena.function_mut(symbol).attributes = attributes;

        let parameters: Vec<FunctionParameter> = declaration
            .all_parameters()
            .into_iter()
            .map(|p| self.map_parameter(&module.value(p).ty))
            .collect();
        let return_parameter = self.map_parameter(&declaration.return_type);
        let target = self.arena.function_mut(symbol);
        target.parameters = parameters;
        target.return_parameter = return_parameter;
        symbol
    }

    fn map_parameter(&mut self, ty: &IrType) -> FunctionParameter {
        let ty_id = self.map_type(ty);
        let adapters = ty
            .class_id()
            .and_then(|class| self.module.class(class).inline_adapters);
        match adapters {
            Some(adapters) => FunctionParameter {
                ty: ty_id,
                box_function: Some(self.map_function(adapters.box_function)),
                unbox_function: Some(self.map_function(adapters.unbox_function)),
            },
            None => FunctionParameter::plain(ty_id),
        }
    }

    /// Synthetic initializer of a global field
    pub fn map_field_initializer(&mut self, field: FieldId) -> FunctionId {
        let key = DeclRef::FieldInitializer(field);
        if let Some(&symbol) = self.table.function_map.get(&key) {
            return symbol;
        }
        let module = self.module;
        let name = self.name(|| format!("{}_init", module.field_fq_name(field)));
        let symbol = self.arena.new_private_function(self.table.module, -1, name);
        self.table.function_map.insert(key, symbol);
        self.table.declarations.insert(symbol, key);

        let unit = self.map_class(module.builtins.unit);
        let target = self.arena.function_mut(symbol);
        target.attributes = FunctionAttributes::default()
            .with(FunctionAttributes::IS_GLOBAL_INITIALIZER)
            .with(FunctionAttributes::RETURNS_UNIT);
        target.parameters = Vec::new();
        target.return_parameter = FunctionParameter::plain(unit);
        symbol
    }

    /// DFIR descriptor of a field; identity is the declaring class plus the name hash
    pub fn map_field(&mut self, field: FieldId) -> Field {
        let module = self.module;
        let declaration = module.field(field);
        let fq_name = module.field_fq_name(field);
        let receiver_type = declaration.parent.map(|c| self.map_class(c));
        Field {
            receiver_type,
            ty: self.map_type(&declaration.ty),
            hash: local_hash(&fq_name),
            name: self.name(|| fq_name.clone()),
        }
    }
}
