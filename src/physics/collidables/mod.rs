pub mod collision_shape_type;
pub mod convex_mesh;
pub mod shape;
pub mod sphere;

pub use collision_shape_type::CollisionShapeType;
pub use convex_mesh::{ConvexMesh, FacePlane};
pub use shape::{IConvexShape, IShape};
pub use sphere::Sphere;
