//! Foundation types shared by the store and the merge engine.

pub mod intern;
pub mod types;
