use glam::{Quat, Vec3};

use super::collision_shape_type::CollisionShapeType;
use super::shape::{IConvexShape, IShape};

/// Collision shape representing a sphere.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Radius of the sphere.
    pub radius: f32,
}

impl Sphere {
    /// Creates a sphere shape.
    #[inline(always)]
    pub fn new(radius: f32) -> Self {
        debug_assert!(radius >= 0.0, "Sphere radius must not be negative.");
        Self { radius }
    }
}

impl IShape for Sphere {
    #[inline(always)]
    fn shape_type() -> CollisionShapeType {
        CollisionShapeType::Sphere
    }
}

impl IConvexShape for Sphere {
    #[inline(always)]
    fn compute_bounds(&self, _orientation: Quat, min: &mut Vec3, max: &mut Vec3) {
        *min = Vec3::splat(-self.radius);
        *max = Vec3::splat(self.radius);
    }
}
