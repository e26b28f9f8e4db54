use glam::{Quat, Vec3};

use super::collision_shape_type::CollisionShapeType;

/// Defines a type usable as a shape by collidables.
pub trait IShape {
    /// Type tag used to pick collision algorithms for this shape type.
    fn shape_type() -> CollisionShapeType;
}

/// Defines functions available on all convex shapes.
pub trait IConvexShape: IShape {
    /// Computes the bounding box of a shape given an orientation.
    fn compute_bounds(&self, orientation: Quat, min: &mut Vec3, max: &mut Vec3);
}
