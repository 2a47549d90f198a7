//! Translation of DFIR bodies into the constraint graph
//!
//! Functions are registered on first use (parameter and return nodes only)
//! and their bodies translated from a worklist, so call chains never recurse
//! across functions. Within a body every DFIR node maps to exactly one
//! constraint node; variables are registered before their values so cyclic
//! assignments terminate.

use super::instantiation_search::InstantiatedTypes;
use super::type_hierarchy::TypeHierarchy;
use crate::config::OutputKind;
use crate::errors::{DevirtError, Result};
use crate::features::devirtualization::domain::{
    CgNodeId, ConstraintGraph, FunctionConstraints, TypeBitSet, VirtualCallId, VirtualCallReceiver,
};
use crate::features::dfir::domain::{
    DfgProgram, Edge, Function, FunctionId, Node, NodeId, TypeId, VariableKind,
};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;

/// Identity of a field node; all array elements share one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FieldKey {
    Field(Option<TypeId>, u64),
    ArrayItem,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Unvisited,
    InProgress,
    Done(CgNodeId),
}

/// Per-body translation state
struct BodyContext<'f> {
    symbol: FunctionId,
    function: &'f Function,
    constraints: FunctionConstraints,
    slots: Vec<Slot>,
}

/// The built graph plus everything the result extraction needs
#[derive(Debug)]
pub struct ConstraintSystem {
    pub graph: ConstraintGraph,
    pub functions: FxHashMap<FunctionId, FunctionConstraints>,
    /// Translated functions in translation order
    pub built_functions: Vec<FunctionId>,
    pub receivers: BTreeMap<VirtualCallId, VirtualCallReceiver>,
    pub virtual_node: CgNodeId,
    pub void_node: CgNodeId,
}

pub struct ConstraintGraphBuilder<'a> {
    program: DfgProgram<'a>,
    hierarchy: &'a TypeHierarchy,
    instantiated: &'a InstantiatedTypes,
    output_kind: OutputKind,
    take_names: bool,
    graph: ConstraintGraph,
    void_node: CgNodeId,
    virtual_node: CgNodeId,
    functions: FxHashMap<FunctionId, FunctionConstraints>,
    built_functions: Vec<FunctionId>,
    pending: Vec<FunctionId>,
    concrete_classes: FxHashMap<TypeId, CgNodeId>,
    external_functions: FxHashMap<FunctionId, CgNodeId>,
    fields: FxHashMap<FieldKey, CgNodeId>,
    suitable_types: FxHashMap<TypeId, Rc<TypeBitSet>>,
    receivers: BTreeMap<VirtualCallId, VirtualCallReceiver>,
}

impl<'a> ConstraintGraphBuilder<'a> {
    pub fn new(
        program: DfgProgram<'a>,
        hierarchy: &'a TypeHierarchy,
        instantiated: &'a InstantiatedTypes,
        output_kind: OutputKind,
        take_names: bool,
    ) -> Self {
        let mut graph = ConstraintGraph::new();
        let void_node = graph.add_ordinary(take_names.then(|| "Void".to_string()));
        let virtual_node = graph.add_source(0, take_names.then(|| "Virtual".to_string()));
        Self {
            program,
            hierarchy,
            instantiated,
            output_kind,
            take_names,
            graph,
            void_node,
            virtual_node,
            functions: FxHashMap::default(),
            built_functions: Vec::new(),
            pending: Vec::new(),
            concrete_classes: FxHashMap::default(),
            external_functions: FxHashMap::default(),
            fields: FxHashMap::default(),
            suitable_types: FxHashMap::default(),
            receivers: BTreeMap::new(),
        }
    }

    /// Register `symbol` as reachable and translate everything it reaches
    pub fn build_root(&mut self, symbol: FunctionId) -> Result<FunctionConstraints> {
        let constraints = self.function_constraints(symbol)?.ok_or_else(|| {
            DevirtError::internal(format!(
                "Root {} has no body",
                self.program.arena.function_display(symbol)
            ))
        })?;
        self.drain()?;
        Ok(constraints)
    }

    pub fn finish(self) -> ConstraintSystem {
        ConstraintSystem {
            graph: self.graph,
            functions: self.functions,
            built_functions: self.built_functions,
            receivers: self.receivers,
            virtual_node: self.virtual_node,
            void_node: self.void_node,
        }
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(symbol) = self.pending.pop() {
            self.build_body(symbol)?;
        }
        Ok(())
    }

    fn name(&self, build: impl FnOnce() -> String) -> Option<String> {
        if self.take_names {
            Some(build())
        } else {
            None
        }
    }

    fn function_label(&self, symbol: FunctionId) -> String {
        self.program.arena.function_display(symbol).to_string()
    }

    fn ordinary(&mut self, name: Option<String>) -> CgNodeId {
        self.graph.add_ordinary(name)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Types
    // ═══════════════════════════════════════════════════════════════════════

    /// Solver id of the exact type of an object of class `ty`
    fn concrete_type(&self, ty: TypeId) -> Result<u32> {
        let declared = self.program.arena.ty(ty);
        if declared.is_abstract && declared.is_final {
            return Err(DevirtError::internal(format!(
                "{} is both final and abstract",
                self.program.arena.type_display(ty)
            )));
        }
        if declared.is_abstract {
            return Ok(0);
        }
        self.instantiated.id_of(ty).ok_or_else(|| {
            DevirtError::internal(format!(
                "{} is used but was never found instantiated",
                self.program.arena.type_display(ty)
            ))
        })
    }

    /// Shared source node of a class
    fn class_source(&mut self, ty: TypeId) -> Result<CgNodeId> {
        let resolved = self.program.resolve_type(ty);
        if let Some(&node) = self.concrete_classes.get(&resolved) {
            return Ok(node);
        }
        let type_id = self.concrete_type(resolved)?;
        let name = self.name(|| format!("Class${}", self.program.arena.type_display(resolved)));
        let node = self.graph.add_source(type_id, name);
        self.concrete_classes.insert(resolved, node);
        Ok(node)
    }

    /// Ids a cast to `ty` lets through: `Virtual` and every instantiated inheritor
    ///
    /// A cast to `Virtual` (opaque class, unresolved external) filters nothing.
    fn suitable_types(&mut self, ty: TypeId) -> Rc<TypeBitSet> {
        let resolved = self.program.resolve_type(ty);
        if let Some(cached) = self.suitable_types.get(&resolved) {
            return Rc::clone(cached);
        }
        let set = if resolved == TypeId::VIRTUAL {
            TypeBitSet::full(self.instantiated.id_count())
        } else {
            let mut set = TypeBitSet::with_capacity(self.instantiated.id_count());
            set.insert(0);
            for &inheritor in self.hierarchy.inheritors_of(resolved).iter() {
                if let Some(id) = self.instantiated.id_of(inheritor) {
                    set.insert(id);
                }
            }
            set
        };
        let set = Rc::new(set);
        self.suitable_types.insert(resolved, Rc::clone(&set));
        set
    }

    fn instantiated_inheritors(&self, ty: TypeId) -> Vec<TypeId> {
        self.hierarchy
            .inheritors_of(ty)
            .iter()
            .copied()
            .filter(|&t| self.instantiated.contains(t))
            .collect()
    }

    fn field_node(&mut self, key: FieldKey, label: impl FnOnce() -> String) -> CgNodeId {
        if let Some(&node) = self.fields.get(&key) {
            return node;
        }
        let name = self.name(label);
        let node = self.ordinary(name);
        self.fields.insert(key, node);
        node
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Functions
    // ═══════════════════════════════════════════════════════════════════════

    /// Interface nodes of a function with a body; `None` for external ones
    fn function_constraints(&mut self, symbol: FunctionId) -> Result<Option<FunctionConstraints>> {
        if let Some(constraints) = self.functions.get(&symbol) {
            return Ok(Some(constraints.clone()));
        }
        let program = self.program;
        let arena = program.arena;
        let declaration = arena.function(symbol);
        if declaration.is_external() {
            return Ok(None);
        }
        if program.function(symbol).is_none() {
            debug!(function = %arena.function_display(symbol), "Declared function without body, modeled as external");
            return Ok(None);
        }

        let mut parameters = Vec::with_capacity(declaration.parameters.len());
        for index in 0..declaration.parameters.len() {
            let name = self.name(|| format!("Param#{}${}", index, self.function_label(symbol)));
            parameters.push(self.ordinary(name));
        }

        if self.output_kind == OutputKind::Library && declaration.is_public() && program.is_local(symbol) {
            for (index, parameter) in declaration.parameters.iter().enumerate() {
                let resolved = program.resolve_type(parameter.ty);
                let from = if resolved == TypeId::VIRTUAL || !arena.ty(resolved).is_final {
                    self.virtual_node
                } else {
                    self.class_source(resolved)?
                };
                self.graph.add_edge(from, parameters[index]);
            }
        }

        let name = self.name(|| format!("Returns${}", self.function_label(symbol)));
        let returns = self.ordinary(name);
        let constraints = FunctionConstraints {
            parameters,
            returns,
        };
        self.functions.insert(symbol, constraints.clone());
        self.pending.push(symbol);
        Ok(Some(constraints))
    }

    fn build_body(&mut self, symbol: FunctionId) -> Result<()> {
        let program = self.program;
        let function = program.function(symbol).ok_or_else(|| {
            DevirtError::UnknownFunction(program.arena.function_display(symbol).to_string())
        })?;
        let constraints = self
            .functions
            .get(&symbol)
            .cloned()
            .ok_or_else(|| DevirtError::internal("Body scheduled before its function was registered"))?;

        let mut ctx = BodyContext {
            symbol,
            function,
            constraints,
            slots: vec![Slot::Unvisited; function.body.nodes.len()],
        };
        for id in function.body.node_ids() {
            self.node(&mut ctx, id)?;
        }
        let returned = self.node(&mut ctx, function.body.returns)?;
        self.graph.add_edge(returned, ctx.constraints.returns);
        self.built_functions.push(symbol);
        Ok(())
    }

    /// Fictitious result of a call to a function without a body
    fn external_call(&mut self, callee: FunctionId, return_type: TypeId) -> Result<CgNodeId> {
        if let Some(&node) = self.external_functions.get(&callee) {
            return Ok(node);
        }
        let name = self.name(|| format!("External${}", self.function_label(callee)));
        let node = self.ordinary(name);
        let resolved = self.program.resolve_type(return_type);
        if resolved == TypeId::VIRTUAL {
            self.graph.add_edge(self.virtual_node, node);
        } else {
            for ty in self.instantiated_inheritors(resolved) {
                let source = self.class_source(ty)?;
                self.graph.add_edge(source, node);
            }
        }
        self.external_functions.insert(callee, node);
        Ok(node)
    }

    fn do_call(
        &mut self,
        ctx: &BodyContext,
        callee: FunctionId,
        mut arguments: Vec<CgNodeId>,
        return_type: TypeId,
        receiver_type: Option<TypeId>,
    ) -> Result<CgNodeId> {
        let resolved = self.program.resolve_function(callee);
        let Some(constraints) = self.function_constraints(resolved)? else {
            return self.external_call(resolved, return_type);
        };

        if let Some(receiver_type) = receiver_type {
            let receiver = *arguments.first().ok_or_else(|| {
                DevirtError::internal(format!(
                    "Call to {} with a receiver type but no arguments",
                    self.program.arena.function_display(resolved)
                ))
            })?;
            let name = self.name(|| format!("CastedReceiver${}", self.function_label(ctx.symbol)));
            let casted = self.ordinary(name);
            let suitable = self.suitable_types(receiver_type);
            self.graph.add_cast_edge(receiver, casted, suitable);
            arguments[0] = casted;
        }

        if constraints.parameters.len() != arguments.len() {
            return Err(DevirtError::internal(format!(
                "{} takes {} parameters but {} passes {}",
                self.program.arena.function_display(resolved),
                constraints.parameters.len(),
                self.program.arena.function_display(ctx.symbol),
                arguments.len()
            )));
        }
        for (argument, parameter) in arguments.iter().zip(&constraints.parameters) {
            self.graph.add_edge(*argument, *parameter);
        }
        Ok(constraints.returns)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Nodes
    // ═══════════════════════════════════════════════════════════════════════

    fn edge(&mut self, ctx: &mut BodyContext, edge: Edge) -> Result<CgNodeId> {
        let node = self.node(ctx, edge.node)?;
        let Some(cast_to) = edge.cast_to else {
            return Ok(node);
        };
        if self.program.resolve_type(cast_to) == TypeId::VIRTUAL {
            return Ok(node);
        }
        let name = self.name(|| format!("Cast${}", self.function_label(ctx.symbol)));
        let cast = self.ordinary(name);
        let suitable = self.suitable_types(cast_to);
        self.graph.add_cast_edge(node, cast, suitable);
        Ok(cast)
    }

    fn edges(&mut self, ctx: &mut BodyContext, edges: &[Edge]) -> Result<Vec<CgNodeId>> {
        edges.iter().map(|&e| self.edge(ctx, e)).collect()
    }

    fn node(&mut self, ctx: &mut BodyContext, id: NodeId) -> Result<CgNodeId> {
        let slot = ctx.slots.get(id.index()).copied().ok_or_else(|| {
            DevirtError::internal(format!(
                "Node #{} out of range in {}",
                id.0,
                self.program.arena.function_display(ctx.symbol)
            ))
        })?;
        match slot {
            Slot::Done(node) => return Ok(node),
            Slot::InProgress => {
                return Err(DevirtError::internal(format!(
                    "Node #{} of {} depends on itself without a variable",
                    id.0,
                    self.program.arena.function_display(ctx.symbol)
                )))
            }
            Slot::Unvisited => {}
        }

        let function = ctx.function;
        if let Node::Variable { values, kind, .. } = function.body.node(id) {
            let label = if *kind == VariableKind::Temporary { "TempVar" } else { "Variable" };
            let name = self.name(|| format!("{}${}", label, self.function_label(ctx.symbol)));
            let variable = self.ordinary(name);
            ctx.slots[id.index()] = Slot::Done(variable);
            for &value in values {
                let from = self.edge(ctx, value)?;
                self.graph.add_edge(from, variable);
            }
            if *kind == VariableKind::CatchParameter {
                self.graph.add_edge(self.virtual_node, variable);
            }
            return Ok(variable);
        }

        ctx.slots[id.index()] = Slot::InProgress;
        let node = self.convert(ctx, id)?;
        ctx.slots[id.index()] = Slot::Done(node);
        Ok(node)
    }

    fn convert(&mut self, ctx: &mut BodyContext, id: NodeId) -> Result<CgNodeId> {
        let function = ctx.function;
        match function.body.node(id) {
            Node::Parameter { index } => ctx
                .constraints
                .parameters
                .get(*index as usize)
                .copied()
                .ok_or_else(|| {
                    DevirtError::internal(format!(
                        "Parameter #{} out of range in {}",
                        index,
                        self.program.arena.function_display(ctx.symbol)
                    ))
                }),

            Node::Const { ty } => {
                let resolved = self.program.resolve_type(*ty);
                let type_id = self.concrete_type(resolved)?;
                let name = self.name(|| format!("Const${}", self.function_label(ctx.symbol)));
                Ok(self.graph.add_source(type_id, name))
            }

            Node::StaticCall {
                call,
                receiver_type,
            } => {
                let arguments = self.edges(ctx, &call.arguments)?;
                self.do_call(ctx, call.callee, arguments, call.return_type, *receiver_type)
            }

            Node::NewObject {
                call,
                constructed_type,
            } => {
                let instance = self.class_source(*constructed_type)?;
                let mut arguments = vec![instance];
                arguments.extend(self.edges(ctx, &call.arguments)?);
                self.do_call(ctx, call.callee, arguments, *constructed_type, None)?;
                Ok(instance)
            }

            Node::VirtualCall {
                call,
                receiver_type,
                dispatch,
            } => {
                let receiver_type = self.program.resolve_type(*receiver_type);
                if receiver_type == TypeId::VIRTUAL {
                    return Ok(self.void_node);
                }
                let (first, rest) = call.arguments.split_first().ok_or_else(|| {
                    DevirtError::internal(format!(
                        "Virtual call #{} in {} has no receiver",
                        id.0,
                        self.program.arena.function_display(ctx.symbol)
                    ))
                })?;

                let mut candidates = Vec::new();
                for ty in self.instantiated_inheritors(receiver_type) {
                    let callee = self.program.dispatch_target(ty, *dispatch)?;
                    candidates.push((ty, self.program.resolve_function(callee)));
                }

                let receiver = self.edge(ctx, *first)?;
                let name = self.name(|| format!("CastedReceiver${}", self.function_label(ctx.symbol)));
                let casted = self.ordinary(name);
                let suitable = self.suitable_types(receiver_type);
                self.graph.add_cast_edge(receiver, casted, suitable);
                let mut arguments = vec![casted];
                arguments.extend(self.edges(ctx, rest)?);

                let result = match candidates.as_slice() {
                    [] => {
                        debug!(
                            caller = %self.program.arena.function_display(ctx.symbol),
                            node = id.0,
                            "No instantiated receiver for virtual call"
                        );
                        self.void_node
                    }
                    [(ty, callee)] => self.do_call(ctx, *callee, arguments, call.return_type, Some(*ty))?,
                    _ => {
                        let name = self.name(|| format!("VirtualCallReturns${}", self.function_label(ctx.symbol)));
                        let returns = self.ordinary(name);
                        for &(ty, callee) in &candidates {
                            let returned = self.do_call(ctx, callee, arguments.clone(), call.return_type, Some(ty))?;
                            self.graph.add_edge(returned, returns);
                        }
                        returns
                    }
                };

                self.receivers.insert(
                    VirtualCallId {
                        function: ctx.symbol,
                        node: id,
                    },
                    VirtualCallReceiver {
                        receiver: casted,
                        candidates,
                        caller: ctx.symbol,
                    },
                );
                Ok(result)
            }

            Node::Singleton { ty, constructor } => {
                if let Some(constructor) = constructor {
                    let resolved = self.program.resolve_function(*constructor);
                    self.function_constraints(resolved)?;
                }
                self.class_source(*ty)
            }

            Node::AllocInstance { ty } => self.class_source(*ty),

            Node::FieldRead { field, .. } => {
                let (owner, hash) = field.key();
                Ok(self.field_node(FieldKey::Field(owner, hash), || {
                    format!("Field${}", field.name.as_deref().unwrap_or("?"))
                }))
            }

            Node::FieldWrite { field, value, .. } => {
                let (owner, hash) = field.key();
                let field_node = self.field_node(FieldKey::Field(owner, hash), || {
                    format!("Field${}", field.name.as_deref().unwrap_or("?"))
                });
                let value = self.edge(ctx, *value)?;
                self.graph.add_edge(value, field_node);
                Ok(self.void_node)
            }

            Node::ArrayRead { .. } => Ok(self.field_node(FieldKey::ArrayItem, || "Field$Array$Item".to_string())),

            Node::ArrayWrite { value, .. } => {
                let item = self.field_node(FieldKey::ArrayItem, || "Field$Array$Item".to_string());
                let value = self.edge(ctx, *value)?;
                self.graph.add_edge(value, item);
                Ok(self.void_node)
            }

            Node::Variable { .. } => Err(DevirtError::internal("Variables are translated before conversion")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::devirtualization::infrastructure::{InstantiationSearcher, TypePropagation};
    use crate::features::dfir::domain::Dispatch;
    use crate::shared::fixtures::{call, DfgFixture};

    struct Shapes {
        fx: DfgFixture,
        shape: TypeId,
        circle: TypeId,
        square: TypeId,
        circle_area: FunctionId,
        main: FunctionId,
    }

    /// `main` creates a `Circle` and calls `area()` through `Shape`
    fn shapes() -> Shapes {
        let mut fx = DfgFixture::new("app");
        let shape = fx.class("Shape", false, true, &[]);
        let circle = fx.class("Circle", true, false, &[shape]);
        let square = fx.class("Square", true, false, &[shape]);
        let shape_area = fx.function("Shape.area", &[shape], TypeId::VIRTUAL);
        let circle_area = fx.function("Circle.area", &[circle], TypeId::VIRTUAL);
        let square_area = fx.function("Square.area", &[square], TypeId::VIRTUAL);
        let circle_init = fx.function("Circle.<init>", &[circle], TypeId::VIRTUAL);
        let main = fx.function("main", &[], TypeId::VIRTUAL);
        fx.set_vtable(shape, &[shape_area]);
        fx.set_vtable(circle, &[circle_area]);
        fx.set_vtable(square, &[square_area]);
        fx.define(circle_area, vec![Node::Parameter { index: 0 }], &[]);
        fx.define_empty(square_area);
        fx.define_empty(circle_init);
        fx.define(
            main,
            vec![
                Node::NewObject {
                    call: call(circle_init, &[], circle),
                    constructed_type: circle,
                },
                Node::VirtualCall {
                    call: call(shape_area, &[0], TypeId::VIRTUAL),
                    receiver_type: shape,
                    dispatch: Dispatch::Vtable { index: 0 },
                },
            ],
            &[],
        );
        fx.set_entry_point(main);
        Shapes {
            fx,
            shape,
            circle,
            square,
            circle_area,
            main,
        }
    }

    fn build(
        fx: &DfgFixture,
        output_kind: OutputKind,
        roots: &[FunctionId],
    ) -> Result<(ConstraintSystem, InstantiatedTypes)> {
        let program = fx.program();
        let hierarchy = TypeHierarchy::new(&program);
        let instantiated = InstantiationSearcher::new(program, &hierarchy, output_kind).search()?;
        let mut builder = ConstraintGraphBuilder::new(program, &hierarchy, &instantiated, output_kind, true);
        for &root in roots {
            builder.build_root(root)?;
        }
        let mut system = builder.finish();
        TypePropagation::new().solve(&mut system.graph)?;
        Ok((system, instantiated))
    }

    #[test]
    fn test_single_receiver_flows_to_callee() {
        let s = shapes();
        let (system, instantiated) = build(&s.fx, OutputKind::Program, &[s.main]).unwrap();

        let id = VirtualCallId {
            function: s.main,
            node: NodeId(1),
        };
        let receiver = &system.receivers[&id];
        assert_eq!(receiver.candidates, vec![(s.circle, s.circle_area)]);
        assert_eq!(receiver.caller, s.main);

        let circle_id = instantiated.id_of(s.circle).unwrap();
        let receiver_types: Vec<u32> = system.graph.node(receiver.receiver).types.iter().collect();
        assert_eq!(receiver_types, vec![circle_id]);

        let callee = &system.functions[&s.circle_area];
        assert!(system.graph.node(callee.parameters[0]).types.contains(circle_id));
        assert!(system.built_functions.contains(&s.circle_area));
        // main, Circle.<init> and Circle.area; Square is never created
        assert_eq!(system.functions.len(), 3);
        assert!(!instantiated.contains(s.square));
        assert!(!instantiated.contains(s.shape));
    }

    #[test]
    fn test_virtual_receiver_is_not_recorded() {
        let mut fx = DfgFixture::new("app");
        let run = fx.function("run", &[TypeId::VIRTUAL], TypeId::VIRTUAL);
        let main = fx.function("main", &[], TypeId::VIRTUAL);
        fx.define(
            main,
            vec![
                Node::Const { ty: TypeId::VIRTUAL },
                Node::VirtualCall {
                    call: call(run, &[0], TypeId::VIRTUAL),
                    receiver_type: TypeId::VIRTUAL,
                    dispatch: Dispatch::Vtable { index: 0 },
                },
            ],
            &[1],
        );
        fx.set_entry_point(main);

        let (system, _) = build(&fx, OutputKind::Program, &[main]).unwrap();
        assert!(system.receivers.is_empty());
        assert!(system.graph.node(system.void_node).types.is_empty());
    }

    #[test]
    fn test_parameter_count_mismatch_is_internal() {
        let mut fx = DfgFixture::new("app");
        let callee = fx.function("callee", &[TypeId::VIRTUAL, TypeId::VIRTUAL], TypeId::VIRTUAL);
        let main = fx.function("main", &[], TypeId::VIRTUAL);
        fx.define_empty(callee);
        fx.define(
            main,
            vec![
                Node::Const { ty: TypeId::VIRTUAL },
                Node::StaticCall {
                    call: call(callee, &[0], TypeId::VIRTUAL),
                    receiver_type: None,
                },
            ],
            &[],
        );
        fx.set_entry_point(main);

        let err = build(&fx, OutputKind::Program, &[main]).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_library_parameters_are_seeded() {
        let mut s = shapes();
        let draw = s
            .fx
            .public_function("lib.draw", &[s.square, s.shape], TypeId::VIRTUAL);
        s.fx.define_empty(draw);

        let (system, instantiated) = build(&s.fx, OutputKind::Library, &[draw]).unwrap();
        let draw = &system.functions[&draw];
        let square_id = instantiated.id_of(s.square).unwrap();
        let final_param: Vec<u32> = system.graph.node(draw.parameters[0]).types.iter().collect();
        let open_param: Vec<u32> = system.graph.node(draw.parameters[1]).types.iter().collect();
        assert_eq!(final_param, vec![square_id]);
        assert_eq!(open_param, vec![0]);
    }

    #[test]
    fn test_self_referencing_variable_terminates() {
        let mut fx = DfgFixture::new("app");
        let item = fx.class("Item", true, false, &[]);
        let main = fx.function("main", &[], item);
        fx.define(
            main,
            vec![
                Node::Const { ty: item },
                Node::Variable {
                    values: vec![Edge::new(NodeId(0)), Edge::new(NodeId(1))],
                    ty: item,
                    kind: VariableKind::Ordinary,
                },
            ],
            &[1],
        );
        fx.set_entry_point(main);

        let (system, instantiated) = build(&fx, OutputKind::Program, &[main]).unwrap();
        let returns = system.functions[&main].returns;
        let item_id = instantiated.id_of(item).unwrap();
        assert!(system.graph.node(returns).types.contains(item_id));
    }

    #[test]
    fn test_external_callee_shares_one_node() {
        let mut fx = DfgFixture::new("app");
        let item = fx.class("Item", true, false, &[]);
        let make = fx.function("make", &[], item);
        let external = fx
            .arena
            .intern_external_function(99, Default::default(), Some("ext".into()));
        fx.arena.function_mut(external).return_parameter.ty = item;
        let main = fx.function("main", &[], TypeId::VIRTUAL);
        fx.define(make, vec![Node::Const { ty: item }], &[0]);
        fx.define(
            main,
            vec![
                Node::StaticCall {
                    call: call(make, &[], item),
                    receiver_type: None,
                },
                Node::StaticCall {
                    call: call(external, &[], item),
                    receiver_type: None,
                },
                Node::StaticCall {
                    call: call(external, &[], item),
                    receiver_type: None,
                },
                Node::Variable {
                    values: vec![Edge::new(NodeId(1)), Edge::new(NodeId(2))],
                    ty: item,
                    kind: VariableKind::Ordinary,
                },
            ],
            &[3],
        );
        fx.set_entry_point(main);

        let (system, instantiated) = build(&fx, OutputKind::Program, &[main]).unwrap();
        let external_nodes = system
            .graph
            .node_ids()
            .filter(|&id| {
                system
                    .graph
                    .node(id)
                    .name
                    .as_deref()
                    .is_some_and(|n| n.starts_with("External$"))
            })
            .count();
        assert_eq!(external_nodes, 1);
        let returns = system.functions[&main].returns;
        assert!(system
            .graph
            .node(returns)
            .types
            .contains(instantiated.id_of(item).unwrap()));
    }

    #[test]
    fn test_cast_to_virtual_keeps_every_type() {
        let s = shapes();
        let mut fx = s.fx;
        let main = fx.function("main2", &[], TypeId::VIRTUAL);
        let circle_init = fx.function("Circle.<init>2", &[s.circle], TypeId::VIRTUAL);
        let shape_area = fx.function("Shape.area2", &[s.shape], TypeId::VIRTUAL);
        fx.define_empty(circle_init);
        fx.define(
            main,
            vec![
                Node::NewObject {
                    call: call(circle_init, &[], s.circle),
                    constructed_type: s.circle,
                },
                Node::Variable {
                    values: vec![Edge {
                        node: NodeId(0),
                        cast_to: Some(TypeId::VIRTUAL),
                    }],
                    ty: TypeId::VIRTUAL,
                    kind: VariableKind::Temporary,
                },
                Node::VirtualCall {
                    call: call(shape_area, &[1], TypeId::VIRTUAL),
                    receiver_type: s.shape,
                    dispatch: Dispatch::Vtable { index: 0 },
                },
            ],
            &[],
        );
        fx.set_entry_point(main);

        let (system, instantiated) = build(&fx, OutputKind::Program, &[main]).unwrap();
        let receiver = &system.receivers[&VirtualCallId {
            function: main,
            node: NodeId(2),
        }];
        let circle_id = instantiated.id_of(s.circle).unwrap();
        assert!(system.graph.node(receiver.receiver).types.contains(circle_id));
        assert_eq!(receiver.candidates, vec![(s.circle, s.circle_area)]);
    }
}
