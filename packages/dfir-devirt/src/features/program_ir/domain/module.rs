//! Program IR module: arenas of declarations and expressions

use super::declarations::{IrClass, IrField, IrFunction, IrValue};
use super::expression::IrExpression;
use super::types::{IrType, PrimitiveKind};
use rustc_hash::FxHashMap;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Index of a class in [`IrModule::classes`]
    ClassId
);
arena_id!(
    /// Index of a function in [`IrModule::functions`]
    IrFunctionId
);
arena_id!(
    /// Index of a field in [`IrModule::fields`]
    FieldId
);
arena_id!(
    /// Index of an expression in [`IrModule::expressions`]
    ExprId
);
arena_id!(
    /// Index of a parameter or variable in [`IrModule::values`]
    ValueId
);

/// Well-known declarations the analysis needs to recognize
#[derive(Debug, Clone)]
pub struct Builtins {
    pub any: ClassId,
    pub unit: ClassId,
    pub nothing: ClassId,
    pub throwable: Option<ClassId>,
    pub array_get: Option<IrFunctionId>,
    pub array_set: Option<IrFunctionId>,
    /// Box classes of nullable primitives
    pub box_classes: FxHashMap<PrimitiveKind, ClassId>,
}

/// One compilation unit of the program IR, plus the library declarations it references
#[derive(Debug, Clone)]
pub struct IrModule {
    pub name: String,
    pub classes: Vec<IrClass>,
    pub functions: Vec<IrFunction>,
    pub fields: Vec<IrField>,
    pub values: Vec<IrValue>,
    pub expressions: Vec<IrExpression>,
    pub builtins: Builtins,
    pub entry_point: Option<IrFunctionId>,
}

impl IrModule {
    #[inline]
    pub fn class(&self, id: ClassId) -> &IrClass {
        &self.classes[id.index()]
    }

    #[inline]
    pub fn function(&self, id: IrFunctionId) -> &IrFunction {
        &self.functions[id.index()]
    }

    #[inline]
    pub fn field(&self, id: FieldId) -> &IrField {
        &self.fields[id.index()]
    }

    #[inline]
    pub fn value(&self, id: ValueId) -> &IrValue {
        &self.values[id.index()]
    }

    #[inline]
    pub fn expr(&self, id: ExprId) -> &IrExpression {
        &self.expressions[id.index()]
    }

    #[inline]
    pub fn expr_mut(&mut self, id: ExprId) -> &mut IrExpression {
        &mut self.expressions[id.index()]
    }

    pub fn class_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        (0..self.classes.len() as u32).map(ClassId)
    }

    pub fn function_ids(&self) -> impl Iterator<Item = IrFunctionId> + '_ {
        (0..self.functions.len() as u32).map(IrFunctionId)
    }

    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        (0..self.fields.len() as u32).map(FieldId)
    }

    /// Fully qualified name of a function, e.g. `app.Derived.foo`
    pub fn function_fq_name(&self, id: IrFunctionId) -> String {
        let function = self.function(id);
        match function.parent {
            Some(parent) => format!("{}.{}", self.class(parent).name, function.name),
            None => function.name.clone(),
        }
    }

    /// Fully qualified signature, the identity of a public function across modules
    pub fn function_fq_signature(&self, id: IrFunctionId) -> String {
        let function = self.function(id);
        match function.parent {
            Some(parent) => format!("{}.{}", self.class(parent).name, function.signature),
            None => function.signature.clone(),
        }
    }

    pub fn field_fq_name(&self, id: FieldId) -> String {
        let field = self.field(id);
        match field.parent {
            Some(parent) => format!("{}.{}", self.class(parent).name, field.name),
            None => field.name.clone(),
        }
    }

    pub fn is_unit(&self, ty: &IrType) -> bool {
        ty.is_class(self.builtins.unit)
    }

    pub fn is_nothing(&self, ty: &IrType) -> bool {
        ty.is_class(self.builtins.nothing)
    }

    /// True when `function` is `target` or overrides it, possibly transitively
    pub fn overrides(&self, function: IrFunctionId, target: IrFunctionId) -> bool {
        let mut stack = vec![function];
        let mut seen = rustc_hash::FxHashSet::default();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.function(current).overridden.iter().copied());
            }
        }
        false
    }

    /// Superclass (the non-interface super type), if any
    pub fn super_class(&self, class: ClassId) -> Option<ClassId> {
        self.class(class)
            .super_types
            .iter()
            .copied()
            .find(|&s| !self.class(s).is_interface())
    }

    /// The method of `class` overriding `function`, when declared directly in it
    pub fn overriding_in(&self, class: ClassId, function: IrFunctionId) -> Option<IrFunctionId> {
        self.class(class)
            .methods
            .iter()
            .copied()
            .find(|&m| self.overrides(m, function))
    }
}
