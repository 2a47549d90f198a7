//! Collects the value-producing expressions of a function body
//!
//! One pre-order walk gathers everything the function builder turns into
//! nodes: calls, field accesses, object accesses and constants, returned and
//! thrown values, catch parameters and every assignment to a local variable.

use super::value_extractor::ExpressionValuesExtractor;
use super::variable_values::VariableValues;
use crate::errors::{DevirtError, Result};
use crate::features::program_ir::domain::{ExprId, ExprKind, IrModule, ReturnTarget, ValueId};

pub struct ElementFinder<'m> {
    module: &'m IrModule,
    pub extractor: ExpressionValuesExtractor,
    pub variable_values: VariableValues,
    /// Expressions that become nodes, in visiting order
    pub expressions: Vec<ExprId>,
    /// Values returned from the function itself
    pub return_values: Vec<ExprId>,
    pub thrown_values: Vec<ExprId>,
    pub catch_parameters: Vec<ValueId>,
    suspendables: Vec<ExprId>,
}

impl<'m> ElementFinder<'m> {
    pub fn new(module: &'m IrModule) -> Self {
        Self {
            module,
            extractor: ExpressionValuesExtractor::new(),
            variable_values: VariableValues::new(),
            expressions: Vec::new(),
            return_values: Vec::new(),
            thrown_values: Vec::new(),
            catch_parameters: Vec::new(),
            suspendables: Vec::new(),
        }
    }

    pub fn visit(&mut self, expr: ExprId) -> Result<()> {
        let module = self.module;
        let kind = &module.expr(expr).kind;

        match kind {
            ExprKind::ReturnableBlock { .. } => {
                self.extractor.returnable_block_values.insert(expr, Vec::new());
            }
            ExprKind::Suspendable { .. } => {
                self.extractor.suspendable_values.insert(expr, Vec::new());
                self.suspendables.push(expr);
            }
            ExprKind::SuspensionPoint { .. } => {
                if let Some(&owner) = self.suspendables.last() {
                    if let Some(points) = self.extractor.suspendable_values.get_mut(&owner) {
                        points.push(expr);
                    }
                }
            }
            ExprKind::Variable { variable, .. } => self.variable_values.add_empty(*variable),
            ExprKind::Try { catches, .. } => {
                for catch in catches {
                    self.catch_parameters.push(catch.parameter);
                    self.variable_values.add_empty(catch.parameter);
                }
            }
            _ => {}
        }

        if produces_node(kind) {
            self.expressions.push(expr);
        }

        for child in kind.children() {
            self.visit(child)?;
        }

        match kind {
            ExprKind::Suspendable { .. } => {
                self.suspendables.pop();
            }
            ExprKind::Variable {
                variable,
                initializer: Some(initializer),
            } => self.assign(*variable, *initializer)?,
            ExprKind::SetValue { variable, value } => self.assign(*variable, *value)?,
            ExprKind::Return {
                target: ReturnTarget::Function,
                value,
            } => self.return_values.push(*value),
            ExprKind::Return {
                target: ReturnTarget::Block(block),
                value,
            } => {
                let values = self
                    .extractor
                    .returnable_block_values
                    .get_mut(block)
                    .ok_or_else(|| {
                        DevirtError::internal(format!(
                            "Return #{} targets block #{} outside of it",
                            expr.0, block.0
                        ))
                    })?;
                values.push(*value);
            }
            ExprKind::Throw { value } => self.thrown_values.push(*value),
            _ => {}
        }
        Ok(())
    }

    fn assign(&mut self, variable: ValueId, value: ExprId) -> Result<()> {
        let values = &mut self.variable_values;
        self.extractor
            .for_each_value(self.module, value, &mut |v| values.add(variable, v))
    }
}

fn produces_node(kind: &ExprKind) -> bool {
    matches!(
        kind,
        ExprKind::Call(_)
            | ExprKind::DirectCall { .. }
            | ExprKind::ConstructorCall { .. }
            | ExprKind::DelegatingConstructorCall { .. }
            | ExprKind::FunctionReference(_)
            | ExprKind::GetField { .. }
            | ExprKind::SetField { .. }
            | ExprKind::GetObject(_)
            | ExprKind::AllocInstance(_)
            | ExprKind::Vararg { .. }
            | ExprKind::Const
            | ExprKind::TypeOperator { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dfir::infrastructure::value_extractor::Value;
    use crate::features::program_ir::infrastructure::IrModuleBuilder;

    #[test]
    fn test_collects_returns_throws_and_assignments() {
        let mut b = IrModuleBuilder::new("m");
        let any = b.any_type();
        let x = b.variable("x", any.clone());
        let c1 = b.constant(any.clone());
        let declare = b.declare(x, Some(c1));
        let c2 = b.constant(any.clone());
        let assign = b.set(x, c2);
        let read = b.get(x);
        let ret = b.ret(read);
        let c3 = b.constant(any.clone());
        let thrown = b.throw(c3);
        let body = b.block(vec![declare, assign, ret, thrown], any);
        let module = b.build();

        let mut finder = ElementFinder::new(&module);
        finder.visit(body).unwrap();

        assert_eq!(finder.expressions, vec![c1, c2, c3]);
        assert_eq!(finder.return_values, vec![read]);
        assert_eq!(finder.thrown_values, vec![c3]);
        assert_eq!(
            finder.variable_values.get(x).unwrap(),
            &[Value::plain(c1), Value::plain(c2)]
        );
    }

    #[test]
    fn test_returnable_block_values() {
        let mut b = IrModuleBuilder::new("m");
        let any = b.any_type();
        let block = b.returnable_block(Vec::new(), any.clone());
        let c = b.constant(any.clone());
        let inner_return = b.ret_from_block(block, c);
        b.push_statement(block, inner_return);
        let x = b.variable("x", any);
        let declare = b.declare(x, Some(block));
        let module = b.build();

        let mut finder = ElementFinder::new(&module);
        finder.visit(declare).unwrap();

        assert_eq!(finder.extractor.returnable_block_values[&block], vec![c]);
        assert_eq!(finder.variable_values.get(x).unwrap(), &[Value::plain(c)]);
    }

    #[test]
    fn test_catch_parameters_declared() {
        let mut b = IrModuleBuilder::new("m");
        let any = b.any_type();
        let e = b.catch_parameter("e", any.clone());
        let body = b.constant(any.clone());
        let handler = b.get(e);
        let try_catch = b.try_catch(body, vec![(e, handler)], any);
        let module = b.build();

        let mut finder = ElementFinder::new(&module);
        finder.visit(try_catch).unwrap();

        assert_eq!(finder.catch_parameters, vec![e]);
        assert!(finder.variable_values.contains(e));
    }
}
