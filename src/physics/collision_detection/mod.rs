pub mod collision_dispatch;
pub mod contact_manifold;
pub mod narrow_phase_algorithm;
pub mod sphere_vs_convex_mesh_algorithm;
pub mod sphere_vs_sphere_algorithm;

pub use collision_dispatch::{CollisionDispatch, DefaultCollisionDispatch, DispatchError};
pub use contact_manifold::Contact;
pub use narrow_phase_algorithm::{NarrowPhaseAlgorithm, NarrowPhaseAlgorithmType};
pub use sphere_vs_convex_mesh_algorithm::SphereVsConvexMeshAlgorithm;
pub use sphere_vs_sphere_algorithm::SphereVsSphereAlgorithm;
