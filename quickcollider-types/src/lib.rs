//! # quickcollider-types
//!
//! Shared type definitions for QuickCollider.
//! This crate contains the value and descriptor types used by quickcollider-osc
//! and the quickcollider application.

mod address;
mod member;
mod value;

pub use address::Address;
pub use member::{AttributeInfo, EventInfo, MemberKind, OperationInfo};
pub use value::{Value, ValueError, ValueType};

/// Generational handle to an application object.
///
/// The index addresses a slot in the object arena; the generation is bumped every
/// time the slot is reused, so a handle that outlived its object never matches
/// the slot's new occupant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
    pub fn index(self) -> u32 {
        self.index
    }
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}
