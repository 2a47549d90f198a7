//! Program IR domain model

pub mod declarations;
pub mod expression;
pub mod module;
pub mod types;

pub use declarations::{
    ClassKind, FunctionKind, InlineAdapters, IrClass, IrField, IrFunction, IrValue, Modality,
    Origin, ValueKind, Visibility,
};
pub use expression::{
    Branch, CallExpr, Catch, DirectCallTarget, ExprKind, IrExpression, ReturnTarget, TypeOperator,
};
pub use module::{Builtins, ClassId, ExprId, FieldId, IrFunctionId, IrModule, ValueId};
pub use types::{IrType, PrimitiveKind};
