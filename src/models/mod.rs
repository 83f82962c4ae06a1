//! Domain model module declarations.

pub mod decision;
pub mod host;
pub mod layer;
pub mod node;
pub mod snapshot;
