use glam::{Quat, Vec3};

use super::collision_shape_type::CollisionShapeType;
use super::shape::{IConvexShape, IShape};

/// Plane bounding a face of a convex mesh, in the mesh's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacePlane {
    /// Unit length normal pointing out of the mesh.
    pub normal: Vec3,
    /// Distance from the local origin to the plane along the normal.
    pub offset: f32,
}

impl FacePlane {
    #[inline(always)]
    pub fn new(normal: Vec3, offset: f32) -> Self {
        debug_assert!(normal.is_normalized(), "Face normals must be unit length.");
        Self { normal, offset }
    }

    /// Signed distance from the plane to a local point, positive outside the mesh.
    #[inline(always)]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.offset
    }
}

/// Convex polyhedron described by its vertices and the planes of its faces.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexMesh {
    /// Vertices of the hull in local space.
    pub vertices: Vec<Vec3>,
    /// Planes of every face of the hull.
    pub face_planes: Vec<FacePlane>,
}

impl ConvexMesh {
    /// Creates a convex mesh from its vertices and face planes.
    pub fn new(vertices: Vec<Vec3>, face_planes: Vec<FacePlane>) -> Self {
        debug_assert!(!vertices.is_empty() && !face_planes.is_empty());
        debug_assert!(
            vertices
                .iter()
                .all(|&v| face_planes.iter().all(|p| p.signed_distance(v) <= 1e-4)),
            "Every vertex must lie inside every face plane."
        );
        Self { vertices, face_planes }
    }

    /// Creates an axis aligned box centered on the local origin.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let vertices = (0..8)
            .map(|corner| {
                Vec3::new(
                    if corner & 1 == 0 { -half_extents.x } else { half_extents.x },
                    if corner & 2 == 0 { -half_extents.y } else { half_extents.y },
                    if corner & 4 == 0 { -half_extents.z } else { half_extents.z },
                )
            })
            .collect();
        let face_planes = vec![
            FacePlane::new(Vec3::X, half_extents.x),
            FacePlane::new(Vec3::NEG_X, half_extents.x),
            FacePlane::new(Vec3::Y, half_extents.y),
            FacePlane::new(Vec3::NEG_Y, half_extents.y),
            FacePlane::new(Vec3::Z, half_extents.z),
            FacePlane::new(Vec3::NEG_Z, half_extents.z),
        ];
        Self::new(vertices, face_planes)
    }
}

impl IShape for ConvexMesh {
    #[inline(always)]
    fn shape_type() -> CollisionShapeType {
        CollisionShapeType::ConvexMesh
    }
}

impl IConvexShape for ConvexMesh {
    fn compute_bounds(&self, orientation: Quat, min: &mut Vec3, max: &mut Vec3) {
        *min = Vec3::splat(f32::MAX);
        *max = Vec3::splat(f32::MIN);
        for &vertex in &self.vertices {
            let rotated = orientation * vertex;
            *min = min.min(rotated);
            *max = max.max(rotated);
        }
    }
}
