use std::fmt;

/// Type tag of a collision shape.
///
/// The ordinal of each tag is significant: pair lookups are only defined for pairs presented in
/// ascending ordinal order.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollisionShapeType {
    Triangle = 0,
    Box = 1,
    Sphere = 2,
    Cone = 3,
    Cylinder = 4,
    Capsule = 5,
    ConvexMesh = 6,
    ConcaveMesh = 7,
    HeightField = 8,
}

impl CollisionShapeType {
    /// Number of shape types.
    pub const COUNT: usize = 9;

    /// Every shape type, in ordinal order.
    pub const ALL: [CollisionShapeType; Self::COUNT] = [
        Self::Triangle,
        Self::Box,
        Self::Sphere,
        Self::Cone,
        Self::Cylinder,
        Self::Capsule,
        Self::ConvexMesh,
        Self::ConcaveMesh,
        Self::HeightField,
    ];

    /// Gets the ordinal of the type.
    #[inline(always)]
    pub fn ordinal(self) -> i32 {
        self as i32
    }

    /// Gets the type with the given ordinal, if there is one.
    #[inline(always)]
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    /// Returns true if shapes of this type are convex.
    #[inline(always)]
    pub fn is_convex(self) -> bool {
        !matches!(self, Self::ConcaveMesh | Self::HeightField)
    }
}

impl fmt::Display for CollisionShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
