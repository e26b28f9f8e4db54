use glam::{Quat, Vec3};

use super::contact_manifold::Contact;
use super::narrow_phase_algorithm::{NarrowPhaseAlgorithm, NarrowPhaseAlgorithmType};
use crate::physics::collidables::collision_shape_type::CollisionShapeType;
use crate::physics::collidables::convex_mesh::ConvexMesh;
use crate::physics::collidables::sphere::Sphere;

/// Narrow phase algorithm for a sphere against any convex shape.
///
/// Only face normals are tested as separating axes, so contacts near edges and vertices are
/// conservative: the reported depth may exceed the true one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SphereVsConvexMeshAlgorithm;

impl SphereVsConvexMeshAlgorithm {
    /// Tests sphere `a` against mesh `b`, which sits at `offset_b` from `a` with `orientation_b`.
    pub fn test(
        &self,
        a: &Sphere,
        b: &ConvexMesh,
        offset_b: Vec3,
        orientation_b: Quat,
        speculative_margin: f32,
    ) -> Option<Contact> {
        let local_center = orientation_b.inverse() * -offset_b;
        let (feature_id, plane) = b
            .face_planes
            .iter()
            .enumerate()
            .max_by(|(_, x), (_, y)| {
                x.signed_distance(local_center)
                    .total_cmp(&y.signed_distance(local_center))
            })?;
        let depth = a.radius - plane.signed_distance(local_center);
        if depth <= -speculative_margin {
            return None;
        }
        let normal = orientation_b * plane.normal;
        Some(Contact {
            offset: normal * (depth * 0.5 - a.radius),
            depth,
            normal,
            feature_id: feature_id as i32,
        })
    }
}

impl NarrowPhaseAlgorithm for SphereVsConvexMeshAlgorithm {
    #[inline(always)]
    fn algorithm_type(&self) -> NarrowPhaseAlgorithmType {
        NarrowPhaseAlgorithmType::SphereVsConvexMesh
    }

    fn supports(&self, type_a: CollisionShapeType, type_b: CollisionShapeType) -> bool {
        type_a == CollisionShapeType::Sphere && type_b.is_convex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_touching_a_face() {
        let contact = SphereVsConvexMeshAlgorithm
            .test(
                &Sphere::new(1.0),
                &ConvexMesh::cuboid(Vec3::ONE),
                Vec3::new(1.5, 0.0, 0.0),
                Quat::IDENTITY,
                0.0,
            )
            .unwrap();
        assert!((contact.depth - 0.5).abs() < 1e-6);
        assert!((contact.normal - Vec3::NEG_X).length() < 1e-6);
        assert!((contact.offset - Vec3::new(0.75, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn mesh_orientation_is_applied() {
        let contact = SphereVsConvexMeshAlgorithm
            .test(
                &Sphere::new(1.0),
                &ConvexMesh::cuboid(Vec3::new(1.0, 2.0, 1.0)),
                Vec3::new(2.5, 0.0, 0.0),
                Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
                0.0,
            )
            .unwrap();
        assert!((contact.depth - 0.5).abs() < 1e-5);
        assert!((contact.normal - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn distant_sphere_has_no_contact() {
        let result = SphereVsConvexMeshAlgorithm.test(
            &Sphere::new(1.0),
            &ConvexMesh::cuboid(Vec3::ONE),
            Vec3::new(0.0, 5.0, 0.0),
            Quat::IDENTITY,
            0.5,
        );
        assert!(result.is_none());
    }
}
