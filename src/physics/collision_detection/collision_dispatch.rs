//! Selection of the narrow phase algorithm handling a pair of shape types.

use super::narrow_phase_algorithm::NarrowPhaseAlgorithm;
use super::sphere_vs_convex_mesh_algorithm::SphereVsConvexMeshAlgorithm;
use super::sphere_vs_sphere_algorithm::SphereVsSphereAlgorithm;
use crate::physics::collidables::collision_shape_type::CollisionShapeType;

/// Errors reported by checked algorithm lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The pair was not presented in ascending ordinal order.
    #[error("shape pair ({first}, {second}) must be ordered by ascending type ordinal")]
    UnorderedPair {
        first: CollisionShapeType,
        second: CollisionShapeType,
    },
}

/// Defines a table choosing the narrow phase algorithm for a pair of shape types.
pub trait CollisionDispatch: Send + Sync {
    /// Selects the algorithm for the pair `(type1, type2)`.
    ///
    /// Only pairs with `type1 <= type2` are looked up; any other order yields `None`, as does
    /// an unsupported pair. Callers order the pair themselves.
    fn select_algorithm(
        &self,
        type1: CollisionShapeType,
        type2: CollisionShapeType,
    ) -> Option<&dyn NarrowPhaseAlgorithm>;
}

/// Dispatch table shipped with the library.
///
/// Sphere pairs use [`SphereVsSphereAlgorithm`], a sphere against any other convex shape uses
/// [`SphereVsConvexMeshAlgorithm`]. Every other pair is unsupported.
#[derive(Debug, Default)]
pub struct DefaultCollisionDispatch {
    sphere_vs_sphere_algorithm: SphereVsSphereAlgorithm,
    sphere_vs_convex_mesh_algorithm: SphereVsConvexMeshAlgorithm,
}

impl DefaultCollisionDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same as [`CollisionDispatch::select_algorithm`], but a pair in descending order is an
    /// error instead of a silent `None`.
    pub fn try_select_algorithm(
        &self,
        type1: CollisionShapeType,
        type2: CollisionShapeType,
    ) -> Result<Option<&dyn NarrowPhaseAlgorithm>, DispatchError> {
        if type1 > type2 {
            return Err(DispatchError::UnorderedPair {
                first: type1,
                second: type2,
            });
        }
        Ok(self.select_algorithm(type1, type2))
    }

    /// Orders the pair before the lookup.
    ///
    /// The returned flag is true if the shapes were swapped, in which case the algorithm treats
    /// the second shape as shape A.
    pub fn select_algorithm_for_pair(
        &self,
        type_a: CollisionShapeType,
        type_b: CollisionShapeType,
    ) -> (Option<&dyn NarrowPhaseAlgorithm>, bool) {
        if type_a > type_b {
            (self.select_algorithm(type_b, type_a), true)
        } else {
            (self.select_algorithm(type_a, type_b), false)
        }
    }
}

impl CollisionDispatch for DefaultCollisionDispatch {
    fn select_algorithm(
        &self,
        type1: CollisionShapeType,
        type2: CollisionShapeType,
    ) -> Option<&dyn NarrowPhaseAlgorithm> {
        if type1 > type2 {
            return None;
        }
        if type1 == CollisionShapeType::Sphere && type2 == CollisionShapeType::Sphere {
            return Some(&self.sphere_vs_sphere_algorithm);
        }
        if type1 == CollisionShapeType::Sphere && type2.is_convex() {
            return Some(&self.sphere_vs_convex_mesh_algorithm);
        }
        None
    }
}
