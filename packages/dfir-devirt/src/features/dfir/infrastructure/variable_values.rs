//! Possible values of local variables
//!
//! Every assignment and initializer of a variable records the values it can
//! store. [`VariableValues::compute_closure`] then adds, for each variable, the
//! values of every variable it is assigned from, transitively.

use super::value_extractor::{Leaf, Value};
use crate::features::program_ir::domain::{ExprKind, IrModule, ValueId};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Default)]
pub struct VariableValues {
    element_data: FxHashMap<ValueId, Vec<Value>>,
    /// Variables in declaration order
    order: Vec<ValueId>,
}

impl VariableValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_empty(&mut self, variable: ValueId) {
        if !self.element_data.contains_key(&variable) {
            self.element_data.insert(variable, Vec::new());
            self.order.push(variable);
        }
    }

    /// Record a value; ignored for variables not declared in this function
    pub fn add(&mut self, variable: ValueId, value: Value) {
        if let Some(values) = self.element_data.get_mut(&variable) {
            if !values.contains(&value) {
                values.push(value);
            }
        }
    }

    pub fn get(&self, variable: ValueId) -> Option<&[Value]> {
        self.element_data.get(&variable).map(Vec::as_slice)
    }

    pub fn contains(&self, variable: ValueId) -> bool {
        self.element_data.contains_key(&variable)
    }

    pub fn variables(&self) -> &[ValueId] {
        &self.order
    }

    pub fn compute_closure(&mut self, module: &IrModule) {
        for index in 0..self.order.len() {
            let variable = self.order[index];
            for value in self.value_closure(module, variable) {
                self.add(variable, value);
            }
        }
    }

    /// Values reachable from `variable` through reads of other variables
    fn value_closure(&self, module: &IrModule, variable: ValueId) -> Vec<Value> {
        let mut result = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack = vec![variable];
        seen.insert(variable);

        while let Some(current) = stack.pop() {
            let Some(values) = self.element_data.get(&current) else {
                continue;
            };
            for value in values {
                match read_variable(module, value) {
                    Some(source) => {
                        if module.value(source).is_variable() && seen.insert(source) {
                            stack.push(source);
                        }
                    }
                    None => {
                        if !result.contains(value) {
                            result.push(value.clone());
                        }
                    }
                }
            }
        }
        result
    }
}

/// The value read by an uncast `GetValue` leaf
fn read_variable(module: &IrModule, value: &Value) -> Option<ValueId> {
    match (value.leaf, &value.cast) {
        (Leaf::Expr(expr), None) => match module.expr(expr).kind {
            ExprKind::GetValue(source) => Some(source),
            _ => None,
        },
        _ => None,
    }
}
