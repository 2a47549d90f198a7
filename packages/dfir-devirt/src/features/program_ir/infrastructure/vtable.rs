//! Virtual table layout
//!
//! A class's vtable starts with its superclass's slots (implementations
//! replaced by overriding methods) followed by new overridable methods. The
//! itable maps every method of every transitive super-interface to its
//! implementation in the class.

use crate::features::program_ir::domain::{ClassId, IrFunctionId, IrModule, Modality};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VtableSlot {
    /// Function that introduced the slot
    pub declared: IrFunctionId,
    /// Function executed for instances of the class
    pub implementation: IrFunctionId,
}

#[derive(Debug, Clone, Default)]
pub struct VtableLayout {
    pub slots: Vec<VtableSlot>,
    /// (interface method, implementation)
    pub itable: Vec<(IrFunctionId, IrFunctionId)>,
}

impl VtableLayout {
    pub fn implementations(&self) -> impl Iterator<Item = IrFunctionId> + '_ {
        self.slots
            .iter()
            .map(|s| s.implementation)
            .chain(self.itable.iter().map(|&(_, i)| i))
    }
}

/// Layouts of every class of a module, computed once
pub struct VtableLayouts {
    layouts: FxHashMap<ClassId, VtableLayout>,
}

impl VtableLayouts {
    pub fn compute(module: &IrModule) -> Self {
        let mut builder = LayoutBuilder {
            module,
            layouts: FxHashMap::default(),
            in_progress: FxHashSet::default(),
        };
        for class in module.class_ids() {
            builder.layout(class);
        }
        Self {
            layouts: builder.layouts,
        }
    }

    pub fn layout(&self, class: ClassId) -> Option<&VtableLayout> {
        self.layouts.get(&class)
    }

    /// Slot of `function` in the vtable of its owner class
    pub fn vtable_index(&self, module: &IrModule, function: IrFunctionId) -> Option<u32> {
        let owner = module.function(function).parent?;
        let layout = self.layouts.get(&owner)?;
        layout
            .slots
            .iter()
            .position(|slot| module.overrides(function, slot.declared))
            .map(|index| index as u32)
    }
}

struct LayoutBuilder<'a> {
    module: &'a IrModule,
    layouts: FxHashMap<ClassId, VtableLayout>,
    in_progress: FxHashSet<ClassId>,
}

impl<'a> LayoutBuilder<'a> {
    fn layout(&mut self, class: ClassId) -> VtableLayout {
        if let Some(layout) = self.layouts.get(&class) {
            return layout.clone();
        }
        if !self.in_progress.insert(class) {
            // Cyclic super types; give up on this class
            return VtableLayout::default();
        }

        let module = self.module;
        let mut slots = Vec::new();
        if !module.class(class).is_interface() {
            if let Some(super_class) = module.super_class(class) {
                for slot in self.layout(super_class).slots {
                    slots.push(VtableSlot {
                        declared: slot.declared,
                        implementation: self
                            .find_implementation(class, slot.declared)
                            .unwrap_or(slot.implementation),
                    });
                }
            }
            for &method in &module.class(class).methods {
                let function = module.function(method);
                let overrides_slot = slots
                    .iter()
                    .any(|slot| module.overrides(method, slot.declared));
                if !overrides_slot && (function.is_overridable() || !function.overridden.is_empty()) {
                    slots.push(VtableSlot {
                        declared: method,
                        implementation: method,
                    });
                }
            }
        }

        let mut itable = Vec::new();
        if !module.class(class).is_interface() {
            for interface in self.all_super_interfaces(class) {
                for &method in &module.class(interface).methods {
                    if let Some(implementation) = self.find_implementation(class, method) {
                        itable.push((method, implementation));
                    }
                }
            }
        }

        self.in_progress.remove(&class);
        let layout = VtableLayout { slots, itable };
        self.layouts.insert(class, layout.clone());
        layout
    }

    /// Most derived non-abstract method overriding `function`, searching the
    /// superclass chain first and default interface methods after
    fn find_implementation(&self, class: ClassId, function: IrFunctionId) -> Option<IrFunctionId> {
        let module = self.module;
        let is_concrete = |m: IrFunctionId| module.function(m).modality != Modality::Abstract;

        let mut current = Some(class);
        let mut seen = FxHashSet::default();
        while let Some(c) = current {
            if !seen.insert(c) {
                break;
            }
            if let Some(m) = module
                .class(c)
                .methods
                .iter()
                .copied()
                .find(|&m| module.overrides(m, function) && is_concrete(m))
            {
                return Some(m);
            }
            current = module.super_class(c);
        }

        self.all_super_interfaces(class).into_iter().find_map(|interface| {
            module
                .class(interface)
                .methods
                .iter()
                .copied()
                .find(|&m| module.overrides(m, function) && is_concrete(m))
        })
    }

    /// Interfaces implemented by `class` directly or through any super type
    fn all_super_interfaces(&self, class: ClassId) -> Vec<ClassId> {
        let module = self.module;
        let mut result = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack: Vec<ClassId> = module.class(class).super_types.iter().rev().copied().collect();
        while let Some(c) = stack.pop() {
            if !seen.insert(c) {
                continue;
            }
            if module.class(c).is_interface() {
                result.push(c);
            }
            stack.extend(module.class(c).super_types.iter().rev().copied());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::program_ir::domain::ClassKind;
    use crate::features::program_ir::infrastructure::IrModuleBuilder;

    #[test]
    fn test_vtable_inherits_and_overrides() {
        let mut b = IrModuleBuilder::new("m");
        let unit = b.unit_type();
        let base = b.class("m.Base", ClassKind::Class, Modality::Abstract);
        let f = b.method(base, "f", Modality::Abstract, &[], unit.clone());
        let g = b.method(base, "g", Modality::Open, &[], unit.clone());
        let derived = b.class("m.Derived", ClassKind::Class, Modality::Open);
        b.extends(derived, &[base]);
        let df = b.override_method(derived, f, Modality::Open);
        let h = b.method(derived, "h", Modality::Open, &[], unit);
        let module = b.build();

        let layouts = VtableLayouts::compute(&module);
        let layout = layouts.layout(derived).unwrap();
        let implementations: Vec<_> = layout.slots.iter().map(|s| s.implementation).collect();
        assert_eq!(implementations, vec![df, g, h]);
        assert_eq!(layouts.vtable_index(&module, f), Some(0));
        assert_eq!(layouts.vtable_index(&module, df), Some(0));
        assert_eq!(layouts.vtable_index(&module, h), Some(2));
    }

    #[test]
    fn test_itable_through_superclass() {
        let mut b = IrModuleBuilder::new("m");
        let unit = b.unit_type();
        let iface = b.class("m.I", ClassKind::Interface, Modality::Abstract);
        let run = b.method(iface, "run", Modality::Abstract, &[], unit);
        let base = b.class("m.Base", ClassKind::Class, Modality::Open);
        let any = b.builtins().any;
        b.extends(base, &[any, iface]);
        let base_run = b.override_method(base, run, Modality::Open);
        let leaf = b.class("m.Leaf", ClassKind::Class, Modality::Final);
        b.extends(leaf, &[base]);
        let module = b.build();

        let layouts = VtableLayouts::compute(&module);
        assert_eq!(layouts.layout(leaf).unwrap().itable, vec![(run, base_run)]);
        assert!(layouts.layout(iface).unwrap().slots.is_empty());
    }
}
