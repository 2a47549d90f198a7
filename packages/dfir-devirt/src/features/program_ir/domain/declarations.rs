//! Declarations of the program IR: classes, functions, fields and values

use super::module::{ClassId, ExprId, IrFunctionId, ValueId};
use super::types::IrType;

/// Kind of a class declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    /// Singleton object
    Object,
    EnumClass,
    AnnotationClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Final,
    Open,
    Abstract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Internal,
    Private,
}

/// Where a declaration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Declared in the module being compiled
    Local,
    /// Declared in a dependency library, identified by the library's module name
    Library(String),
}

impl Origin {
    pub fn is_local(&self) -> bool {
        matches!(self, Origin::Local)
    }
}

/// Box/unbox adapters of an inline class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineAdapters {
    pub box_function: IrFunctionId,
    pub unbox_function: IrFunctionId,
}

#[derive(Debug, Clone)]
pub struct IrClass {
    /// Fully qualified name
    pub name: String,
    pub kind: ClassKind,
    pub modality: Modality,
    pub visibility: Visibility,
    pub origin: Origin,
    pub super_types: Vec<ClassId>,
    pub methods: Vec<IrFunctionId>,
    pub constructors: Vec<IrFunctionId>,
    pub fields: Vec<super::module::FieldId>,
    /// Present for inline classes
    pub inline_adapters: Option<InlineAdapters>,
    /// Foreign class whose dispatch cannot be reasoned about
    pub is_opaque: bool,
}

impl IrClass {
    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn is_final(&self) -> bool {
        match self.kind {
            ClassKind::Interface => false,
            ClassKind::Object | ClassKind::AnnotationClass => true,
            ClassKind::Class | ClassKind::EnumClass => self.modality == Modality::Final,
        }
    }

    pub fn is_abstract(&self) -> bool {
        self.kind == ClassKind::Interface || self.modality == Modality::Abstract
    }

    /// Visible outside of its compilation unit
    pub fn is_exported(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Function,
    Constructor,
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    /// Simple name
    pub name: String,
    /// Name plus parameter shape; interface methods are matched by its hash
    pub signature: String,
    pub kind: FunctionKind,
    pub parent: Option<ClassId>,
    pub modality: Modality,
    pub visibility: Visibility,
    pub origin: Origin,
    /// Directly overridden functions
    pub overridden: Vec<IrFunctionId>,
    /// `this` of methods and constructors
    pub dispatch_receiver: Option<ValueId>,
    pub extension_receiver: Option<ValueId>,
    pub value_parameters: Vec<ValueId>,
    pub return_type: IrType,
    pub body: Option<ExprId>,
}

impl IrFunction {
    pub fn is_constructor(&self) -> bool {
        self.kind == FunctionKind::Constructor
    }

    pub fn is_overridable(&self) -> bool {
        self.parent.is_some()
            && self.kind == FunctionKind::Function
            && self.modality != Modality::Final
            && self.visibility != Visibility::Private
    }

    pub fn is_exported(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Dispatch receiver, extension receiver, then value parameters
    pub fn all_parameters(&self) -> Vec<ValueId> {
        self.dispatch_receiver
            .iter()
            .chain(self.extension_receiver.iter())
            .chain(self.value_parameters.iter())
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct IrField {
    pub name: String,
    /// `None` for top-level (global) fields
    pub parent: Option<ClassId>,
    pub ty: IrType,
    pub initializer: Option<ExprId>,
    pub origin: Origin,
}

impl IrField {
    pub fn is_global(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Parameter,
    Variable { mutable: bool },
    CatchParameter,
}

/// A named value: parameter, local variable or catch parameter
#[derive(Debug, Clone)]
pub struct IrValue {
    pub name: String,
    pub ty: IrType,
    pub kind: ValueKind,
}

impl IrValue {
    pub fn is_variable(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Variable { .. } | ValueKind::CatchParameter
        )
    }
}
