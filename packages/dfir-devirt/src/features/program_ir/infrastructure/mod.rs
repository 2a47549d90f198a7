//! Program IR construction and layout

pub mod builder;
pub mod vtable;

pub use builder::IrModuleBuilder;
pub use vtable::{VtableLayout, VtableLayouts, VtableSlot};
