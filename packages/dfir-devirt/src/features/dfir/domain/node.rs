//! Nodes and edges of a function body

use super::symbols::{FunctionId, TypeId};
use crate::features::program_ir::domain::ExprId;

/// Index of a node in its function body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Use of a node's value, optionally narrowed by a cast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub node: NodeId,
    pub cast_to: Option<TypeId>,
}

impl Edge {
    #[inline]
    pub fn new(node: NodeId) -> Self {
        Self { node, cast_to: None }
    }

    #[inline]
    pub fn cast(node: NodeId, to: TypeId) -> Self {
        Self {
            node,
            cast_to: Some(to),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub callee: FunctionId,
    pub arguments: Vec<Edge>,
    pub return_type: TypeId,
    /// Originating call expression, absent for deserialized bodies
    pub call_site: Option<ExprId>,
}

/// How a virtual call selects its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dispatch {
    Vtable { index: u32 },
    Itable { method_hash: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub receiver_type: Option<TypeId>,
    pub ty: TypeId,
    pub hash: u64,
    pub name: Option<String>,
}

impl Field {
    /// Identity of the field: all reads and writes with the same key share one node
    pub fn key(&self) -> (Option<TypeId>, u64) {
        (self.receiver_type, self.hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Ordinary,
    Temporary,
    CatchParameter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Parameter {
        index: u32,
    },
    Const {
        ty: TypeId,
    },
    StaticCall {
        call: Call,
        receiver_type: Option<TypeId>,
    },
    NewObject {
        call: Call,
        constructed_type: TypeId,
    },
    VirtualCall {
        call: Call,
        receiver_type: TypeId,
        dispatch: Dispatch,
    },
    Singleton {
        ty: TypeId,
        constructor: Option<FunctionId>,
    },
    AllocInstance {
        ty: TypeId,
    },
    FieldRead {
        receiver: Option<Edge>,
        field: Field,
    },
    FieldWrite {
        receiver: Option<Edge>,
        field: Field,
        value: Edge,
    },
    ArrayRead {
        array: Edge,
        index: Edge,
    },
    ArrayWrite {
        array: Edge,
        index: Edge,
        value: Edge,
    },
    /// Merge of values; the only join point of the flow-insensitive model
    Variable {
        values: Vec<Edge>,
        ty: TypeId,
        kind: VariableKind,
    },
}

impl Node {
    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Node::StaticCall { call, .. }
            | Node::NewObject { call, .. }
            | Node::VirtualCall { call, .. } => Some(call),
            _ => None,
        }
    }

    pub fn is_virtual_call(&self) -> bool {
        matches!(self, Node::VirtualCall { .. })
    }

    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            Node::Variable {
                kind: VariableKind::Temporary,
                ..
            }
        )
    }

    /// Every outgoing edge in a fixed order
    pub fn edges(&self) -> Vec<Edge> {
        match self {
            Node::Parameter { .. }
            | Node::Const { .. }
            | Node::Singleton { .. }
            | Node::AllocInstance { .. } => Vec::new(),
            Node::StaticCall { call, .. }
            | Node::NewObject { call, .. }
            | Node::VirtualCall { call, .. } => call.arguments.clone(),
            Node::FieldRead { receiver, .. } => receiver.iter().copied().collect(),
            Node::FieldWrite {
                receiver, value, ..
            } => {
                let mut edges: Vec<Edge> = receiver.iter().copied().collect();
                edges.push(*value);
                edges
            }
            Node::ArrayRead { array, index } => vec![*array, *index],
            Node::ArrayWrite {
                array,
                index,
                value,
            } => vec![*array, *index, *value],
            Node::Variable { values, .. } => values.clone(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Parameter { .. } => "Param",
            Node::Const { .. } => "Const",
            Node::StaticCall { .. } => "StaticCall",
            Node::NewObject { .. } => "NewObject",
            Node::VirtualCall {
                dispatch: Dispatch::Vtable { .. },
                ..
            } => "VtableCall",
            Node::VirtualCall {
                dispatch: Dispatch::Itable { .. },
                ..
            } => "ItableCall",
            Node::Singleton { .. } => "Singleton",
            Node::AllocInstance { .. } => "AllocInstance",
            Node::FieldRead { .. } => "FieldRead",
            Node::FieldWrite { .. } => "FieldWrite",
            Node::ArrayRead { .. } => "ArrayRead",
            Node::ArrayWrite { .. } => "ArrayWrite",
            Node::Variable { .. } => "Variable",
        }
    }
}
