use glam::Vec3;

use super::contact_manifold::Contact;
use super::narrow_phase_algorithm::{NarrowPhaseAlgorithm, NarrowPhaseAlgorithmType};
use crate::physics::collidables::collision_shape_type::CollisionShapeType;
use crate::physics::collidables::sphere::Sphere;

/// Narrow phase algorithm for sphere vs sphere pairs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SphereVsSphereAlgorithm;

impl SphereVsSphereAlgorithm {
    /// Tests two spheres, `b` sitting at `offset_b` from `a`.
    ///
    /// Returns the contact if the spheres overlap or are closer than `speculative_margin`.
    #[inline(always)]
    pub fn test(&self, a: &Sphere, b: &Sphere, offset_b: Vec3, speculative_margin: f32) -> Option<Contact> {
        let center_distance = offset_b.length();
        // By convention, the normal points from B to A.
        // Arbitrarily choose (0,1,0) if the two spheres are in the same position.
        let normal = if center_distance > 0.0 {
            offset_b * (-1.0 / center_distance)
        } else {
            Vec3::Y
        };
        let depth = a.radius + b.radius - center_distance;
        if depth <= -speculative_margin {
            return None;
        }
        // The contact sits halfway between the two surfaces.
        Some(Contact {
            offset: normal * (depth * 0.5 - a.radius),
            depth,
            normal,
            feature_id: 0,
        })
    }
}

impl NarrowPhaseAlgorithm for SphereVsSphereAlgorithm {
    #[inline(always)]
    fn algorithm_type(&self) -> NarrowPhaseAlgorithmType {
        NarrowPhaseAlgorithmType::SphereVsSphere
    }

    fn supports(&self, type_a: CollisionShapeType, type_b: CollisionShapeType) -> bool {
        type_a == CollisionShapeType::Sphere && type_b == CollisionShapeType::Sphere
    }
}
