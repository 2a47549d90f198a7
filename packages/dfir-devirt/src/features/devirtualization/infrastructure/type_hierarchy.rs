//! Subtype index over every declared type of the program
//!
//! Built once per analysis from the module's and the libraries' declared
//! types. Supertypes are resolved through the program, so a library class
//! extending an external reference is linked to its real declaration.

use crate::features::dfir::domain::{DfgProgram, TypeId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::rc::Rc;

pub struct TypeHierarchy {
    sub_types: FxHashMap<TypeId, Vec<TypeId>>,
    cache: RefCell<FxHashMap<TypeId, Rc<[TypeId]>>>,
}

impl TypeHierarchy {
    pub fn new(program: &DfgProgram) -> Self {
        Self::from_types(&program.all_declared_types(), |t| program.super_types_of(t))
    }

    /// Build from `types` and a resolver returning the resolved supertypes of a type
    pub fn from_types<F>(types: &[TypeId], super_types: F) -> Self
    where
        F: Fn(TypeId) -> Vec<TypeId>,
    {
        let mut sub_types: FxHashMap<TypeId, Vec<TypeId>> = FxHashMap::default();
        let mut visited: FxHashSet<TypeId> = FxHashSet::default();
        let mut stack: Vec<TypeId> = types.iter().rev().copied().collect();

        while let Some(ty) = stack.pop() {
            if ty == TypeId::VIRTUAL || !visited.insert(ty) {
                continue;
            }
            for super_type in super_types(ty) {
                sub_types.entry(super_type).or_default().push(ty);
                stack.push(super_type);
            }
        }

        Self {
            sub_types,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// `ty` and every type transitively extending it
    pub fn inheritors_of(&self, ty: TypeId) -> Rc<[TypeId]> {
        if let Some(cached) = self.cache.borrow().get(&ty) {
            return Rc::clone(cached);
        }

        let mut result = Vec::new();
        let mut visited: FxHashSet<TypeId> = FxHashSet::default();
        let mut stack = vec![ty];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current);
            if let Some(subs) = self.sub_types.get(&current) {
                stack.extend(subs.iter().rev().copied());
            }
        }

        let result: Rc<[TypeId]> = result.into();
        self.cache.borrow_mut().insert(ty, Rc::clone(&result));
        result
    }

    pub fn direct_sub_types(&self, ty: TypeId) -> &[TypeId] {
        self.sub_types.get(&ty).map(|s| s.as_slice()).unwrap_or(&[])
    }
}
