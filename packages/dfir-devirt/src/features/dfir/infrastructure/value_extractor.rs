//! Expression value extraction
//!
//! Flattens control constructs into the leaf expressions their result can
//! take: a block yields its last statement, a `when` its branch results, a
//! `try` its body and catch results. Casts are pushed down onto the leaves.

use crate::errors::{DevirtError, Result};
use crate::features::program_ir::domain::{ExprId, ExprKind, IrModule, IrType};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leaf {
    Expr(ExprId),
    /// The `Unit` object produced by a statement
    UnitObject,
    /// The `Nothing` value of an expression that never completes
    NothingObject,
}

/// A value-producing leaf, optionally narrowed by an enclosing cast
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Value {
    pub leaf: Leaf,
    /// Operand of the outermost enclosing cast
    pub cast: Option<IrType>,
}

impl Value {
    pub fn plain(expr: ExprId) -> Self {
        Self {
            leaf: Leaf::Expr(expr),
            cast: None,
        }
    }

    fn object(leaf: Leaf) -> Self {
        Self { leaf, cast: None }
    }

    pub fn is_plain(&self, expr: ExprId) -> bool {
        self.cast.is_none() && self.leaf == Leaf::Expr(expr)
    }
}

#[derive(Debug, Default)]
pub struct ExpressionValuesExtractor {
    /// Values returned to each returnable block
    pub returnable_block_values: FxHashMap<ExprId, Vec<ExprId>>,
    /// Suspension points of each suspendable expression
    pub suspendable_values: FxHashMap<ExprId, Vec<ExprId>>,
}

impl ExpressionValuesExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self, module: &IrModule, expr: ExprId) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        self.for_each_value(module, expr, &mut |value| values.push(value))?;
        Ok(values)
    }

    pub fn for_each_value(
        &self,
        module: &IrModule,
        expr: ExprId,
        sink: &mut dyn FnMut(Value),
    ) -> Result<()> {
        let expression = module.expr(expr);
        match &expression.kind {
            ExprKind::ReturnableBlock { .. } => {
                let returned = self.returnable_block_values.get(&expr).ok_or_else(|| {
                    DevirtError::internal(format!("Returnable block #{} was not visited", expr.0))
                })?;
                for &value in returned {
                    self.for_each_value(module, value, sink)?;
                }
            }

            ExprKind::Suspendable { result } => {
                let points = self.suspendable_values.get(&expr).ok_or_else(|| {
                    DevirtError::internal(format!("Suspendable expression #{} was not visited", expr.0))
                })?;
                for &point in points {
                    self.for_each_value(module, point, sink)?;
                }
                self.for_each_value(module, *result, sink)?;
            }

            ExprKind::SuspensionPoint {
                result,
                resume_result,
            } => {
                self.for_each_value(module, *result, sink)?;
                self.for_each_value(module, *resume_result, sink)?;
            }

            ExprKind::Block { statements } => {
                if let Some(&last) = statements.last() {
                    if matches!(module.expr(last).kind, ExprKind::Variable { .. }) {
                        // A trailing declaration evaluates to Unit
                        sink(Value::object(Leaf::UnitObject));
                    } else {
                        self.for_each_value(module, last, sink)?;
                    }
                }
            }

            ExprKind::When { branches } => {
                for branch in branches {
                    self.for_each_value(module, branch.result, sink)?;
                }
            }

            ExprKind::Try {
                result, catches, ..
            } => {
                self.for_each_value(module, *result, sink)?;
                for catch in catches {
                    self.for_each_value(module, catch.result, sink)?;
                }
            }

            ExprKind::Call(_)
            | ExprKind::DirectCall { .. }
            | ExprKind::ConstructorCall { .. }
            | ExprKind::DelegatingConstructorCall { .. }
            | ExprKind::FunctionReference(_)
            | ExprKind::GetValue(_)
            | ExprKind::GetField { .. }
            | ExprKind::SetField { .. }
            | ExprKind::Vararg { .. }
            | ExprKind::Const
            | ExprKind::GetObject(_)
            | ExprKind::AllocInstance(_) => sink(Value::plain(expr)),

            ExprKind::TypeOperator {
                operator,
                operand,
                argument,
            } => {
                if !operator.is_cast() {
                    sink(Value::plain(expr));
                } else {
                    self.for_each_value(module, *argument, &mut |value| {
                        sink(Value {
                            leaf: value.leaf,
                            cast: Some(operand.clone()),
                        })
                    })?;
                }
            }

            _ => {
                if module.is_unit(&expression.ty) {
                    sink(Value::object(Leaf::UnitObject));
                } else if module.is_nothing(&expression.ty) {
                    sink(Value::object(Leaf::NothingObject));
                } else {
                    return Err(DevirtError::unsupported(
                        expr.0,
                        format!("{} has no extractable value", expression.kind.name()),
                    ));
                }
            }
        }
        Ok(())
    }
}
