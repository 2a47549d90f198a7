//! Expressions of the program IR
//!
//! Expressions live in the module's expression arena and refer to each other by
//! [`ExprId`]. Statements are expressions whose type is `Unit`.

use super::module::{ClassId, ExprId, FieldId, IrFunctionId, ValueId};
use super::types::IrType;

#[derive(Debug, Clone)]
pub struct IrExpression {
    pub kind: ExprKind,
    pub ty: IrType,
}

/// Type operators; only the cast family narrows values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOperator {
    Cast,
    ImplicitCast,
    SafeCast,
    ImplicitNotNull,
    InstanceOf,
    NotInstanceOf,
    ImplicitCoercionToUnit,
}

impl TypeOperator {
    pub fn is_cast(&self) -> bool {
        matches!(
            self,
            TypeOperator::Cast | TypeOperator::ImplicitCast | TypeOperator::SafeCast
        )
    }
}

/// Where a `return` transfers control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnTarget {
    /// Returns from the enclosing function
    Function,
    /// Returns from an inlined returnable block
    Block(ExprId),
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: ExprId,
    pub result: ExprId,
}

#[derive(Debug, Clone)]
pub struct Catch {
    pub parameter: ValueId,
    pub result: ExprId,
}

/// A call of a function (not a constructor)
#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: IrFunctionId,
    pub dispatch_receiver: Option<ExprId>,
    pub extension_receiver: Option<ExprId>,
    pub arguments: Vec<ExprId>,
    pub type_arguments: Vec<IrType>,
    /// `super.f()` calls are dispatched statically
    pub super_qualifier: Option<ClassId>,
}

impl CallExpr {
    /// Receivers first, then value arguments
    pub fn all_arguments(&self) -> Vec<ExprId> {
        self.dispatch_receiver
            .iter()
            .chain(self.extension_receiver.iter())
            .chain(self.arguments.iter())
            .copied()
            .collect()
    }
}

/// Statically bound target of a devirtualized call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectCallTarget {
    pub function: IrFunctionId,
    /// Module owning the target's function table
    pub module: String,
    /// Index of the target in its module's function table
    pub function_table_index: u32,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Literal of the expression's type
    Const,
    GetValue(ValueId),
    SetValue {
        variable: ValueId,
        value: ExprId,
    },
    /// Variable declaration
    Variable {
        variable: ValueId,
        initializer: Option<ExprId>,
    },
    Block {
        statements: Vec<ExprId>,
    },
    /// Inlined function body; the target of `ReturnTarget::Block`
    ReturnableBlock {
        statements: Vec<ExprId>,
    },
    When {
        branches: Vec<Branch>,
    },
    Loop {
        condition: ExprId,
        body: Option<ExprId>,
    },
    Try {
        result: ExprId,
        catches: Vec<Catch>,
        finally: Option<ExprId>,
    },
    Return {
        target: ReturnTarget,
        value: ExprId,
    },
    Throw {
        value: ExprId,
    },
    Call(CallExpr),
    ConstructorCall {
        constructor: IrFunctionId,
        arguments: Vec<ExprId>,
        type_arguments: Vec<IrType>,
    },
    /// `super(...)` / `this(...)` call from a constructor
    DelegatingConstructorCall {
        constructor: IrFunctionId,
        arguments: Vec<ExprId>,
    },
    /// Call bound statically by devirtualization
    DirectCall {
        call: CallExpr,
        target: DirectCallTarget,
    },
    GetField {
        field: FieldId,
        receiver: Option<ExprId>,
    },
    SetField {
        field: FieldId,
        receiver: Option<ExprId>,
        value: ExprId,
    },
    GetObject(ClassId),
    /// Raw allocation without running a constructor
    AllocInstance(ClassId),
    TypeOperator {
        operator: TypeOperator,
        operand: IrType,
        argument: ExprId,
    },
    Vararg {
        elements: Vec<ExprId>,
    },
    FunctionReference(IrFunctionId),
    /// Coroutine body whose result also flows out of its suspension points
    Suspendable {
        result: ExprId,
    },
    SuspensionPoint {
        result: ExprId,
        resume_result: ExprId,
    },
}

impl ExprKind {
    /// Direct sub-expressions in evaluation order
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            ExprKind::Const
            | ExprKind::GetValue(_)
            | ExprKind::GetObject(_)
            | ExprKind::AllocInstance(_)
            | ExprKind::FunctionReference(_) => Vec::new(),
            ExprKind::SetValue { value, .. } => vec![*value],
            ExprKind::Variable { initializer, .. } => initializer.iter().copied().collect(),
            ExprKind::Block { statements } | ExprKind::ReturnableBlock { statements } => {
                statements.clone()
            }
            ExprKind::When { branches } => branches
                .iter()
                .flat_map(|b| [b.condition, b.result])
                .collect(),
            ExprKind::Loop { condition, body } => {
                let mut children = vec![*condition];
                children.extend(body.iter().copied());
                children
            }
            ExprKind::Try {
                result,
                catches,
                finally,
            } => {
                let mut children = vec![*result];
                children.extend(catches.iter().map(|c| c.result));
                children.extend(finally.iter().copied());
                children
            }
            ExprKind::Return { value, .. } | ExprKind::Throw { value } => vec![*value],
            ExprKind::Call(call) | ExprKind::DirectCall { call, .. } => call.all_arguments(),
            ExprKind::ConstructorCall { arguments, .. }
            | ExprKind::DelegatingConstructorCall { arguments, .. } => arguments.clone(),
            ExprKind::GetField { receiver, .. } => receiver.iter().copied().collect(),
            ExprKind::SetField {
                receiver, value, ..
            } => {
                let mut children: Vec<ExprId> = receiver.iter().copied().collect();
                children.push(*value);
                children
            }
            ExprKind::TypeOperator { argument, .. } => vec![*argument],
            ExprKind::Vararg { elements } => elements.clone(),
            ExprKind::Suspendable { result } => vec![*result],
            ExprKind::SuspensionPoint {
                result,
                resume_result,
            } => vec![*result, *resume_result],
        }
    }

    /// Short name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Const => "Const",
            ExprKind::GetValue(_) => "GetValue",
            ExprKind::SetValue { .. } => "SetValue",
            ExprKind::Variable { .. } => "Variable",
            ExprKind::Block { .. } => "Block",
            ExprKind::ReturnableBlock { .. } => "ReturnableBlock",
            ExprKind::When { .. } => "When",
            ExprKind::Loop { .. } => "Loop",
            ExprKind::Try { .. } => "Try",
            ExprKind::Return { .. } => "Return",
            ExprKind::Throw { .. } => "Throw",
            ExprKind::Call(_) => "Call",
            ExprKind::ConstructorCall { .. } => "ConstructorCall",
            ExprKind::DelegatingConstructorCall { .. } => "DelegatingConstructorCall",
            ExprKind::DirectCall { .. } => "DirectCall",
            ExprKind::GetField { .. } => "GetField",
            ExprKind::SetField { .. } => "SetField",
            ExprKind::GetObject(_) => "GetObject",
            ExprKind::AllocInstance(_) => "AllocInstance",
            ExprKind::TypeOperator { .. } => "TypeOperator",
            ExprKind::Vararg { .. } => "Vararg",
            ExprKind::FunctionReference(_) => "FunctionReference",
            ExprKind::Suspendable { .. } => "Suspendable",
            ExprKind::SuspensionPoint { .. } => "SuspensionPoint",
        }
    }
}
