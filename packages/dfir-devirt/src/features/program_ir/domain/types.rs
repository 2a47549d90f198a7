//! Static types of the program IR

use super::module::ClassId;
use serde::{Deserialize, Serialize};

/// Primitive value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Char,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
    ];

    /// Fully qualified name of the primitive
    pub fn qualified_name(&self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "core.Boolean",
            PrimitiveKind::Char => "core.Char",
            PrimitiveKind::Byte => "core.Byte",
            PrimitiveKind::Short => "core.Short",
            PrimitiveKind::Int => "core.Int",
            PrimitiveKind::Long => "core.Long",
            PrimitiveKind::Float => "core.Float",
            PrimitiveKind::Double => "core.Double",
        }
    }
}

/// Static type of an expression, value or declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    /// Reference to a class
    Class { class: ClassId, nullable: bool },

    /// Primitive value; nullable primitives are boxed
    Primitive { kind: PrimitiveKind, nullable: bool },

    /// Generic type parameter, erased to its upper bounds
    TypeParameter {
        name: String,
        upper_bounds: Vec<IrType>,
    },
}

impl IrType {
    pub fn class(class: ClassId) -> Self {
        IrType::Class {
            class,
            nullable: false,
        }
    }

    pub fn nullable_class(class: ClassId) -> Self {
        IrType::Class {
            class,
            nullable: true,
        }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        IrType::Primitive {
            kind,
            nullable: false,
        }
    }

    pub fn type_parameter(name: impl Into<String>, upper_bounds: Vec<IrType>) -> Self {
        IrType::TypeParameter {
            name: name.into(),
            upper_bounds,
        }
    }

    /// Class of a class type, if any
    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            IrType::Class { class, .. } => Some(*class),
            _ => None,
        }
    }

    pub fn is_class(&self, class: ClassId) -> bool {
        self.class_id() == Some(class)
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            IrType::Class { nullable, .. } | IrType::Primitive { nullable, .. } => *nullable,
            IrType::TypeParameter { .. } => true,
        }
    }
}
