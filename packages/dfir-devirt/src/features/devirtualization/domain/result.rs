//! Outcome of the devirtualization analysis

use crate::features::dfir::domain::{FunctionId, NodeId, TypeId};
use crate::features::program_ir::domain::ExprId;
use std::collections::BTreeMap;

/// A virtual call node inside its caller's DFIR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualCallId {
    pub function: FunctionId,
    pub node: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevirtualizedCallee {
    pub receiver_type: TypeId,
    pub callee: FunctionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevirtualizedCallSite {
    /// Program IR call expression, absent for library bodies
    pub call_site: Option<ExprId>,
    pub possible_callees: Vec<DevirtualizedCallee>,
}

impl DevirtualizedCallSite {
    /// The only possible callee, if the site is monomorphic
    pub fn single_callee(&self) -> Option<DevirtualizedCallee> {
        match self.possible_callees.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevirtualizationResult {
    /// Instantiated types; the type id used by the solver is position + 1
    pub instantiated_types: Vec<TypeId>,
    /// Virtual calls whose receiver could be bounded; absent calls stay virtual
    pub sites: BTreeMap<VirtualCallId, DevirtualizedCallSite>,
}

impl DevirtualizationResult {
    pub fn get(&self, id: &VirtualCallId) -> Option<&DevirtualizedCallSite> {
        self.sites.get(id)
    }

    pub fn monomorphic_count(&self) -> usize {
        self.sites
            .values()
            .filter(|s| s.possible_callees.len() == 1)
            .count()
    }

    pub fn polymorphic_count(&self) -> usize {
        self.sites
            .values()
            .filter(|s| s.possible_callees.len() > 1)
            .count()
    }

    /// Call sites of one function
    pub fn sites_of(&self, function: FunctionId) -> impl Iterator<Item = (&VirtualCallId, &DevirtualizedCallSite)> {
        let from = VirtualCallId {
            function,
            node: NodeId(0),
        };
        let to = VirtualCallId {
            function,
            node: NodeId(u32::MAX),
        };
        self.sites.range(from..=to)
    }
}
