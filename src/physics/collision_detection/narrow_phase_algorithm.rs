use crate::physics::collidables::collision_shape_type::CollisionShapeType;

/// Identifies a narrow phase algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NarrowPhaseAlgorithmType {
    SphereVsSphere,
    SphereVsConvexMesh,
}

/// Stateless routine computing contacts for one family of shape type pairs.
///
/// Instances are shared by every thread running the narrow phase.
pub trait NarrowPhaseAlgorithm: Send + Sync {
    /// Gets which algorithm this is.
    fn algorithm_type(&self) -> NarrowPhaseAlgorithmType;

    /// Returns true if the algorithm handles the ordered pair `(type_a, type_b)`.
    fn supports(&self, type_a: CollisionShapeType, type_b: CollisionShapeType) -> bool;
}
