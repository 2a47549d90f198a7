//! Rapid type analysis: which classes may ever be instantiated
//!
//! For an executable the search is optimistic: functions are visited from the
//! entry point and the global initializers, and a virtual call only makes the
//! implementations of already instantiated receivers reachable. Call sites are
//! indexed per receiver type so that instantiating a class later wakes up
//! every call site on its supertypes.
//!
//! A library has unknown callers, so every class instantiated anywhere and
//! every final parameter type of an exported function is assumed live.

use super::type_hierarchy::TypeHierarchy;
use crate::features::call_graph::infrastructure::all_global_initializers;
use crate::config::OutputKind;
use crate::errors::{DevirtError, Result};
use crate::features::dfir::domain::{DfgProgram, Dispatch, FunctionId, Node, TypeId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::Instant;
use tracing::{debug, info};

/// Instantiated classes in discovery order
///
/// The solver identifies a class by its position plus one; id 0 is `Virtual`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstantiatedTypes {
    types: Vec<TypeId>,
    ids: FxHashMap<TypeId, u32>,
}

impl InstantiatedTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class; returns true if it was not instantiated yet
    pub fn insert(&mut self, ty: TypeId) -> bool {
        if self.ids.contains_key(&ty) {
            return false;
        }
        self.types.push(ty);
        self.ids.insert(ty, self.types.len() as u32);
        true
    }

    pub fn contains(&self, ty: TypeId) -> bool {
        self.ids.contains_key(&ty)
    }

    /// Solver id of an instantiated class
    pub fn id_of(&self, ty: TypeId) -> Option<u32> {
        self.ids.get(&ty).copied()
    }

    /// Class behind a solver id; id 0 is `Virtual`
    pub fn type_of(&self, id: u32) -> Option<TypeId> {
        match id {
            0 => Some(TypeId::VIRTUAL),
            _ => self.types.get(id as usize - 1).copied(),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Number of solver ids, `Virtual` included
    pub fn id_count(&self) -> usize {
        self.types.len() + 1
    }

    pub fn as_slice(&self) -> &[TypeId] {
        &self.types
    }
}

pub struct InstantiationSearcher<'a> {
    program: DfgProgram<'a>,
    hierarchy: &'a TypeHierarchy,
    output_kind: OutputKind,
    instantiated: InstantiatedTypes,
    visited: FxHashSet<FunctionId>,
    pending: Vec<FunctionId>,
    call_sites: FxHashMap<TypeId, Vec<Dispatch>>,
    seen_call_sites: FxHashSet<(TypeId, Dispatch)>,
}

impl<'a> InstantiationSearcher<'a> {
    pub fn new(program: DfgProgram<'a>, hierarchy: &'a TypeHierarchy, output_kind: OutputKind) -> Self {
        Self {
            program,
            hierarchy,
            output_kind,
            instantiated: InstantiatedTypes::new(),
            visited: FxHashSet::default(),
            pending: Vec::new(),
            call_sites: FxHashMap::default(),
            seen_call_sites: FxHashSet::default(),
        }
    }

    pub fn search(mut self) -> Result<InstantiatedTypes> {
        let start = Instant::now();
        match self.output_kind {
            OutputKind::Program => self.search_program()?,
            OutputKind::Library => self.search_library(),
        }
        info!(
            output_kind = ?self.output_kind,
            instantiated = self.instantiated.len(),
            visited_functions = self.visited.len(),
            virtual_call_sites = self.seen_call_sites.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Instantiation search finished"
        );
        Ok(self.instantiated)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Executable
    // ═══════════════════════════════════════════════════════════════════════

    fn search_program(&mut self) -> Result<()> {
        let program = self.program;
        let entry_point = program
            .entry_point()
            .ok_or_else(|| DevirtError::MissingEntryPoint(program.module.name.clone()))?;
        self.schedule(entry_point);
        for initializer in all_global_initializers(&program) {
            self.schedule(initializer);
        }

        while let Some(function) = self.pending.pop() {
            self.visit(function)?;
        }
        Ok(())
    }

    fn schedule(&mut self, function: FunctionId) {
        let resolved = self.program.resolve_function(function);
        if self.program.arena.function(resolved).is_external() {
            return;
        }
        if self.visited.insert(resolved) {
            self.pending.push(resolved);
        }
    }

    fn visit(&mut self, symbol: FunctionId) -> Result<()> {
        let program = self.program;
        let Some(function) = program.function(symbol) else {
            debug!(function = %program.arena.function_display(symbol), "No body, skipped");
            return Ok(());
        };

        for node in &function.body.nodes {
            match node {
                Node::NewObject {
                    call,
                    constructed_type,
                } => {
                    self.instantiate(*constructed_type)?;
                    self.schedule(call.callee);
                }
                Node::Singleton { ty, constructor } => {
                    self.instantiate(*ty)?;
                    if let Some(constructor) = constructor {
                        self.schedule(*constructor);
                    }
                }
                Node::Const { ty } | Node::AllocInstance { ty } => self.instantiate(*ty)?,
                Node::StaticCall { call, .. } => self.schedule(call.callee),
                Node::VirtualCall {
                    receiver_type,
                    dispatch,
                    ..
                } => {
                    if *receiver_type == TypeId::VIRTUAL {
                        continue;
                    }
                    let receiver = program.resolve_type(*receiver_type);
                    if receiver == TypeId::VIRTUAL {
                        continue;
                    }
                    if self.seen_call_sites.insert((receiver, *dispatch)) {
                        self.call_sites.entry(receiver).or_default().push(*dispatch);
                    }
                    let inheritors = self.hierarchy.inheritors_of(receiver);
                    for &inheritor in inheritors.iter() {
                        if self.instantiated.contains(inheritor) {
                            self.dispatch(inheritor, *dispatch)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn instantiate(&mut self, ty: TypeId) -> Result<()> {
        let resolved = self.program.resolve_type(ty);
        if resolved == TypeId::VIRTUAL || self.program.arena.ty(resolved).is_abstract {
            return Ok(());
        }
        if !self.instantiated.insert(resolved) {
            return Ok(());
        }
        debug!(class = %self.program.arena.type_display(resolved), "Instantiated");
        self.wake_up_call_sites(resolved)
    }

    /// Dispatch every call site registered on a supertype of `inheritor` to it
    fn wake_up_call_sites(&mut self, inheritor: TypeId) -> Result<()> {
        let mut seen: FxHashSet<TypeId> = FxHashSet::default();
        let mut stack = vec![inheritor];
        while let Some(ty) = stack.pop() {
            if !seen.insert(ty) {
                continue;
            }
            if let Some(sites) = self.call_sites.get(&ty) {
                let sites = sites.clone();
                for dispatch in sites {
                    self.dispatch(inheritor, dispatch)?;
                }
            }
            stack.extend(self.program.super_types_of(ty));
        }
        Ok(())
    }

    fn dispatch(&mut self, receiver: TypeId, dispatch: Dispatch) -> Result<()> {
        let callee = self.program.dispatch_target(receiver, dispatch)?;
        self.schedule(callee);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Library
    // ═══════════════════════════════════════════════════════════════════════

    fn search_library(&mut self) {
        let program = self.program;
        let arena = program.arena;
        for function in program.module.functions.values() {
            let symbol = arena.function(function.symbol);
            if !symbol.is_public() {
                continue;
            }
            for parameter in &symbol.parameters {
                let resolved = program.resolve_type(parameter.ty);
                if resolved != TypeId::VIRTUAL && arena.ty(resolved).is_final {
                    self.instantiated.insert(resolved);
                }
            }
        }

        for function in program.all_functions() {
            for node in &function.body.nodes {
                let ty = match node {
                    Node::NewObject {
                        constructed_type, ..
                    } => *constructed_type,
                    Node::Singleton { ty, .. } | Node::Const { ty } | Node::AllocInstance { ty } => *ty,
                    _ => continue,
                };
                let resolved = program.resolve_type(ty);
                if resolved != TypeId::VIRTUAL && !arena.ty(resolved).is_abstract {
                    self.instantiated.insert(resolved);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::fixtures::{call, DfgFixture};

    struct Shapes {
        fx: DfgFixture,
        shape: TypeId,
        circle: TypeId,
        square: TypeId,
        label: TypeId,
    }

    /// `main` calls `make()` and then `area()` on the result; `make` creates a
    /// `Circle` and `Circle.area` touches a `Label` constant
    fn shapes() -> Shapes {
        let mut fx = DfgFixture::new("app");
        let shape = fx.class("Shape", false, true, &[]);
        let circle = fx.class("Circle", true, false, &[shape]);
        let square = fx.class("Square", true, false, &[shape]);
        let label = fx.class("Label", true, false, &[]);
        let shape_area = fx.function("Shape.area", &[shape], TypeId::VIRTUAL);
        let circle_area = fx.function("Circle.area", &[circle], TypeId::VIRTUAL);
        let square_area = fx.function("Square.area", &[square], TypeId::VIRTUAL);
        let circle_init = fx.function("Circle.<init>", &[circle], TypeId::VIRTUAL);
        let make = fx.function("make", &[], shape);
        let main = fx.function("main", &[], TypeId::VIRTUAL);
        fx.set_vtable(shape, &[shape_area]);
        fx.set_vtable(circle, &[circle_area]);
        fx.set_vtable(square, &[square_area]);

        fx.define(circle_area, vec![Node::Const { ty: label }], &[0]);
        fx.define_empty(square_area);
        fx.define_empty(circle_init);
        fx.define(
            make,
            vec![Node::NewObject {
                call: call(circle_init, &[], circle),
                constructed_type: circle,
            }],
            &[0],
        );
        fx.define(
            main,
            vec![
                Node::StaticCall {
                    call: call(make, &[], shape),
                    receiver_type: None,
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
            label,
        }
    }

    fn search(fx: &DfgFixture, output_kind: OutputKind) -> InstantiatedTypes {
        let program = fx.program();
        let hierarchy = TypeHierarchy::new(&program);
        InstantiationSearcher::new(program, &hierarchy, output_kind)
            .search()
            .unwrap()
    }

    #[test]
    fn test_late_instantiation_wakes_up_call_site() {
        let s = shapes();
        let types = search(&s.fx, OutputKind::Program);

        assert!(types.contains(s.circle));
        assert!(types.contains(s.label), "Circle.area must be reached");
        assert!(!types.contains(s.square));
        assert!(!types.contains(s.shape));
        assert_eq!(types.id_of(s.circle), Some(1));
        assert_eq!(types.type_of(0), Some(TypeId::VIRTUAL));
        assert_eq!(types.type_of(1), Some(s.circle));
    }

    #[test]
    fn test_library_mode_is_conservative() {
        let mut s = shapes();
        let exported = s
            .fx
            .public_function("lib.draw", &[s.square, s.shape], TypeId::VIRTUAL);
        s.fx.define_empty(exported);
        let types = search(&s.fx, OutputKind::Library);

        assert!(types.contains(s.circle));
        assert!(types.contains(s.label));
        assert!(types.contains(s.square), "final parameter of an exported function");
        assert!(!types.contains(s.shape));
    }

    #[test]
    fn test_virtual_receiver_is_skipped() {
        let mut fx = DfgFixture::new("app");
        let main = fx.function("main", &[], TypeId::VIRTUAL);
        let callee = fx.function("run", &[TypeId::VIRTUAL], TypeId::VIRTUAL);
        fx.define(
            main,
            vec![
                Node::Const { ty: TypeId::VIRTUAL },
                Node::VirtualCall {
                    call: call(callee, &[0], TypeId::VIRTUAL),
                    receiver_type: TypeId::VIRTUAL,
                    dispatch: Dispatch::Vtable { index: 0 },
                },
            ],
            &[],
        );
        fx.set_entry_point(main);

        let types = search(&fx, OutputKind::Program);
        assert!(types.is_empty());
        assert_eq!(types.id_count(), 1);
    }

    #[test]
    fn test_global_initializers_are_roots() {
        let mut s = shapes();
        let init = s.fx.function("init", &[], TypeId::VIRTUAL);
        s.fx.mark_global_initializer(init);
        s.fx.define(init, vec![Node::AllocInstance { ty: s.square }], &[]);
        let types = search(&s.fx, OutputKind::Program);
        assert!(types.contains(s.square));
    }

    #[test]
    fn test_program_requires_entry_point() {
        let fx = DfgFixture::new("app");
        let program = fx.program();
        let hierarchy = TypeHierarchy::new(&program);
        let err = InstantiationSearcher::new(program, &hierarchy, OutputKind::Program)
            .search()
            .unwrap_err();
        assert!(matches!(err, DevirtError::MissingEntryPoint(_)));
    }
}
