//! Shapes and the narrow phase collision dispatch.

pub mod collidables;
pub mod collision_detection;
