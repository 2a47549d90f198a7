//! DFIR construction for one function
//!
//! Every value-producing expression becomes one node; the same expression
//! always yields the same [`NodeId`]. Control flow disappears: expressions
//! with several possible values become temporary variables merging them.

use super::element_finder::ElementFinder;
use super::symbol_table::SymbolTable;
use super::value_extractor::{ExpressionValuesExtractor, Leaf, Value};
use crate::errors::{DevirtError, Result};
use crate::features::dfir::domain::{
    Call, DeclRef, Dispatch, Edge, Function, FunctionBody, Node, NodeId, TypeId,
    VariableKind,
};
use crate::features::program_ir::domain::{
    CallExpr, ExprId, ExprKind, IrModule, IrType, ValueId,
};
use crate::shared::local_hash;
use rustc_hash::FxHashMap;
use tracing::trace;

pub struct FunctionDfgBuilder<'s, 'a> {
    symbols: &'s mut SymbolTable<'a>,
    module: &'a IrModule,
    /// `this` of the function being built
    this: Option<ValueId>,
    extractor: ExpressionValuesExtractor,
    nodes: Vec<Node>,
    expression_nodes: FxHashMap<ExprId, NodeId>,
    parameters: FxHashMap<ValueId, NodeId>,
    variables: FxHashMap<ValueId, NodeId>,
    unit_object: Option<NodeId>,
    nothing_object: Option<NodeId>,
}

impl<'s, 'a> FunctionDfgBuilder<'s, 'a> {
    /// Build the DFIR of a function body or of a global field initializer
    pub fn build(symbols: &'s mut SymbolTable<'a>, declaration: DeclRef) -> Result<Function> {
        let module = symbols.ir();
        let (symbol, root, parameters, this, return_type) = match declaration {
            DeclRef::Function(function) => {
                let ir = module.function(function);
                let body = ir.body.ok_or_else(|| {
                    DevirtError::internal(format!(
                        "{} has no body",
                        module.function_fq_name(function)
                    ))
                })?;
                (
                    symbols.map_function(function),
                    body,
                    ir.all_parameters(),
                    ir.dispatch_receiver,
                    ir.return_type.clone(),
                )
            }
            DeclRef::FieldInitializer(field) => {
                let ir = module.field(field);
                let initializer = ir.initializer.ok_or_else(|| {
                    DevirtError::internal(format!(
                        "{} has no initializer",
                        module.field_fq_name(field)
                    ))
                })?;
                (
                    symbols.map_field_initializer(field),
                    initializer,
                    Vec::new(),
                    None,
                    ir.ty.clone(),
                )
            }
        };

        let mut finder = ElementFinder::new(module);
        finder.visit(root)?;
        finder.variable_values.compute_closure(module);
        let ElementFinder {
            extractor,
            variable_values,
            expressions,
            return_values,
            thrown_values,
            catch_parameters,
            ..
        } = finder;

        let mut builder = FunctionDfgBuilder {
            symbols,
            module,
            this,
            extractor,
            nodes: Vec::new(),
            expression_nodes: FxHashMap::default(),
            parameters: FxHashMap::default(),
            variables: FxHashMap::default(),
            unit_object: None,
            nothing_object: None,
        };

        for (index, &parameter) in parameters.iter().enumerate() {
            let node = builder.push(Node::Parameter {
                index: index as u32,
            });
            builder.parameters.insert(parameter, node);
        }

        // Variables first so that reads inside their own values resolve
        for &variable in variable_values.variables() {
            let ty = builder.symbols.map_type(&module.value(variable).ty);
            let kind = if catch_parameters.contains(&variable) {
                VariableKind::CatchParameter
            } else {
                VariableKind::Ordinary
            };
            let node = builder.push(Node::Variable {
                values: Vec::new(),
                ty,
                kind,
            });
            builder.variables.insert(variable, node);
        }

        for &expr in &expressions {
            builder.node(expr)?;
        }

        if let DeclRef::FieldInitializer(field) = declaration {
            let value = builder.expression_edge(root)?;
            let field = builder.symbols.map_field(field);
            builder.push(Node::FieldWrite {
                receiver: None,
                field,
                value,
            });
        }

        let returns_type = builder.symbols.map_type(&return_type);
        let returns = builder.temporary_of(&return_values, returns_type)?;
        let throws_type = match module.builtins.throwable {
            Some(throwable) => builder.symbols.map_class(throwable),
            None => TypeId::VIRTUAL,
        };
        let throws = builder.temporary_of(&thrown_values, throws_type)?;

        for &variable in variable_values.variables() {
            let mut edges = Vec::new();
            for value in variable_values.get(variable).unwrap_or_default() {
                edges.push(builder.value_edge(value)?);
            }
            let node = builder.variables[&variable];
            if let Node::Variable { values, .. } = &mut builder.nodes[node.index()] {
                *values = edges;
            }
        }

        trace!(
            function = %builder.symbols.arena().function_display(symbol),
            nodes = builder.nodes.len(),
            "Built function DFIR"
        );
        Ok(Function {
            symbol,
            body: FunctionBody {
                nodes: builder.nodes,
                returns,
                throws,
            },
        })
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn temporary(&mut self, values: Vec<Edge>, ty: TypeId) -> NodeId {
        self.push(Node::Variable {
            values,
            ty,
            kind: VariableKind::Temporary,
        })
    }

    fn temporary_of(&mut self, expressions: &[ExprId], ty: TypeId) -> Result<NodeId> {
        let mut edges = Vec::with_capacity(expressions.len());
        for &expr in expressions {
            edges.push(self.expression_edge(expr)?);
        }
        Ok(self.temporary(edges, ty))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Edges
    // ═══════════════════════════════════════════════════════════════════════

    /// A cast becomes a narrowing edge from its argument
    fn expression_edge(&mut self, expr: ExprId) -> Result<Edge> {
        let module = self.module;
        match &module.expr(expr).kind {
            ExprKind::TypeOperator {
                operator,
                operand,
                argument,
            } if operator.is_cast() => {
                let node = self.node(*argument)?;
                Ok(Edge::cast(node, self.symbols.map_type(operand)))
            }
            _ => Ok(Edge::new(self.node(expr)?)),
        }
    }

    fn value_edge(&mut self, value: &Value) -> Result<Edge> {
        let node = match value.leaf {
            Leaf::Expr(expr) if value.cast.is_none() => return self.expression_edge(expr),
            Leaf::Expr(expr) => self.node(expr)?,
            Leaf::UnitObject => self.unit_object(),
            Leaf::NothingObject => self.nothing_object(),
        };
        Ok(match &value.cast {
            Some(ty) => Edge::cast(node, self.symbols.map_type(ty)),
            None => Edge::new(node),
        })
    }

    fn unit_object(&mut self) -> NodeId {
        if let Some(node) = self.unit_object {
            return node;
        }
        let unit = self.module.builtins.unit;
        let constructor = self.symbols.object_constructor(unit);
        let ty = self.symbols.map_class(unit);
        let node = self.push(Node::Singleton { ty, constructor });
        self.unit_object = Some(node);
        node
    }

    fn nothing_object(&mut self) -> NodeId {
        if let Some(node) = self.nothing_object {
            return node;
        }
        let ty = self.symbols.map_class(self.module.builtins.nothing);
        let node = self.push(Node::Singleton {
            ty,
            constructor: None,
        });
        self.nothing_object = Some(node);
        node
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Nodes
    // ═══════════════════════════════════════════════════════════════════════

    fn node(&mut self, expr: ExprId) -> Result<NodeId> {
        let module = self.module;
        if let ExprKind::GetValue(value) = module.expr(expr).kind {
            return self.node_of_value(value);
        }
        if let Some(&node) = self.expression_nodes.get(&expr) {
            return Ok(node);
        }

        let expression = module.expr(expr);
        let values = self.extractor.values(module, expr)?;
        let node = match values.as_slice() {
            [single] if single.is_plain(expr) => self.convert(expr)?,
            [single] => {
                let edge = self.value_edge(single)?;
                match edge.cast_to {
                    None => edge.node,
                    Some(_) => {
                        let ty = self.symbols.map_type(&expression.ty);
                        self.temporary(vec![edge], ty)
                    }
                }
            }
            _ => {
                let mut edges = Vec::with_capacity(values.len());
                for value in &values {
                    edges.push(self.value_edge(value)?);
                }
                let ty = self.symbols.map_type(&expression.ty);
                self.temporary(edges, ty)
            }
        };
        self.expression_nodes.insert(expr, node);
        Ok(node)
    }

    fn edges(&mut self, expressions: &[ExprId]) -> Result<Vec<Edge>> {
        let mut edges = Vec::with_capacity(expressions.len());
        for &expr in expressions {
            edges.push(self.expression_edge(expr)?);
        }
        Ok(edges)
    }

    fn convert(&mut self, expr: ExprId) -> Result<NodeId> {
        let module = self.module;
        let expression = module.expr(expr);
        let node = match &expression.kind {
            ExprKind::Const | ExprKind::Vararg { .. } | ExprKind::FunctionReference(_) => {
                Node::Const {
                    ty: self.symbols.map_type(&expression.ty),
                }
            }

            ExprKind::GetObject(class) => {
                let constructor = if *class == module.builtins.nothing {
                    None
                } else {
                    self.symbols.object_constructor(*class)
                };
                Node::Singleton {
                    ty: self.symbols.map_class(*class),
                    constructor,
                }
            }

            ExprKind::AllocInstance(class) => Node::AllocInstance {
                ty: self.symbols.map_class(*class),
            },

            ExprKind::Call(call) => self.convert_call(expr, call, &expression.ty)?,

            ExprKind::DirectCall { call, target } => {
                let callee = module.function(target.function);
                let receiver_type = callee
                    .dispatch_receiver
                    .map(|this| self.symbols.map_type(&module.value(this).ty));
                let arguments = self.edges(&call.all_arguments())?;
                Node::StaticCall {
                    call: Call {
                        callee: self.symbols.map_function(target.function),
                        arguments,
                        return_type: self.symbols.map_type(&expression.ty),
                        call_site: Some(expr),
                    },
                    receiver_type,
                }
            }

            ExprKind::ConstructorCall {
                constructor,
                arguments,
                ..
            } => {
                let class = module.function(*constructor).parent.ok_or_else(|| {
                    DevirtError::internal(format!(
                        "Constructor {} has no class",
                        module.function_fq_name(*constructor)
                    ))
                })?;
                let constructed_type = self.symbols.map_class(class);
                let arguments = self.edges(arguments)?;
                Node::NewObject {
                    call: Call {
                        callee: self.symbols.map_function(*constructor),
                        arguments,
                        return_type: constructed_type,
                        call_site: Some(expr),
                    },
                    constructed_type,
                }
            }

            ExprKind::DelegatingConstructorCall {
                constructor,
                arguments,
            } => {
                let this = self.this.ok_or_else(|| {
                    DevirtError::unsupported(expr.0, "delegating constructor call outside a constructor")
                })?;
                let this_node = self.node_of_value(this)?;
                let mut edges = vec![Edge::new(this_node)];
                edges.extend(self.edges(arguments)?);
                let receiver_type = self.symbols.map_type(&module.value(this).ty);
                Node::StaticCall {
                    call: Call {
                        callee: self.symbols.map_function(*constructor),
                        arguments: edges,
                        return_type: self.symbols.map_type(&expression.ty),
                        call_site: Some(expr),
                    },
                    receiver_type: Some(receiver_type),
                }
            }

            ExprKind::GetField { field, receiver } => {
                let receiver = match receiver {
                    Some(receiver) => Some(self.expression_edge(*receiver)?),
                    None => None,
                };
                Node::FieldRead {
                    receiver,
                    field: self.symbols.map_field(*field),
                }
            }

            ExprKind::SetField {
                field,
                receiver,
                value,
            } => {
                let receiver = match receiver {
                    Some(receiver) => Some(self.expression_edge(*receiver)?),
                    None => None,
                };
                let value = self.expression_edge(*value)?;
                Node::FieldWrite {
                    receiver,
                    field: self.symbols.map_field(*field),
                    value,
                }
            }

            ExprKind::TypeOperator { argument, .. } => {
                // Materialize the operand, the result itself is a fresh value
                self.expression_edge(*argument)?;
                Node::Const {
                    ty: self.symbols.map_type(&expression.ty),
                }
            }

            other => {
                return Err(DevirtError::unsupported(
                    expr.0,
                    format!("{} does not produce a node", other.name()),
                ))
            }
        };
        Ok(self.push(node))
    }

    fn node_of_value(&self, value: ValueId) -> Result<NodeId> {
        self.parameters
            .get(&value)
            .or_else(|| self.variables.get(&value))
            .copied()
            .ok_or_else(|| {
                DevirtError::internal(format!(
                    "Value '{}' is not declared in this function",
                    self.module.value(value).name
                ))
            })
    }

    fn convert_call(&mut self, expr: ExprId, call: &CallExpr, ty: &IrType) -> Result<Node> {
        let module = self.module;
        let builtins = &module.builtins;

        if builtins.array_get == Some(call.callee) || builtins.array_set == Some(call.callee) {
            return self.convert_array_access(expr, call);
        }

        let callee = module.function(call.callee);
        let arguments = self.edges(&call.all_arguments())?;
        let return_type = self.symbols.map_type(ty);

        if callee.is_overridable() && call.super_qualifier.is_none() {
            let owner = callee.parent.ok_or_else(|| {
                DevirtError::internal(format!(
                    "Overridable {} has no class",
                    module.function_fq_name(call.callee)
                ))
            })?;
            let dispatch = if module.class(owner).is_interface() {
                Dispatch::Itable {
                    method_hash: local_hash(&callee.signature),
                }
            } else {
                let index = self
                    .symbols
                    .layouts()
                    .vtable_index(module, call.callee)
                    .ok_or_else(|| {
                        DevirtError::internal(format!(
                            "{} not found in the vtable of its class",
                            module.function_fq_name(call.callee)
                        ))
                    })?;
                Dispatch::Vtable { index }
            };
            return Ok(Node::VirtualCall {
                call: Call {
                    callee: self.symbols.map_function(call.callee),
                    arguments,
                    return_type,
                    call_site: Some(expr),
                },
                receiver_type: self.symbols.map_class(owner),
                dispatch,
            });
        }

        let actual = call
            .super_qualifier
            .and_then(|qualifier| module.overriding_in(qualifier, call.callee))
            .unwrap_or(call.callee);
        let receiver_type = module
            .function(actual)
            .dispatch_receiver
            .map(|this| self.symbols.map_type(&module.value(this).ty));
        Ok(Node::StaticCall {
            call: Call {
                callee: self.symbols.map_function(actual),
                arguments,
                return_type,
                call_site: Some(expr),
            },
            receiver_type,
        })
    }

    fn convert_array_access(&mut self, expr: ExprId, call: &CallExpr) -> Result<Node> {
        let malformed = || DevirtError::unsupported(expr.0, "array access with missing operands");
        let array = call.dispatch_receiver.ok_or_else(malformed)?;
        let array = self.expression_edge(array)?;
        let index = call.arguments.first().copied().ok_or_else(malformed)?;
        let index = self.expression_edge(index)?;

        if self.module.builtins.array_get == Some(call.callee) {
            return Ok(Node::ArrayRead { array, index });
        }
        let value = call.arguments.get(1).copied().ok_or_else(malformed)?;
        let value = self.expression_edge(value)?;
        Ok(Node::ArrayWrite {
            array,
            index,
            value,
        })
    }
}
