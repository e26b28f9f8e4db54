use glam::Vec3;

/// Information about a single contact.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Offset from the position of collidable A to the contact position.
    pub offset: Vec3,
    /// Penetration depth between the two collidables at this contact. Negative values represent separation.
    pub depth: f32,
    /// Surface basis of the contact. Points from collidable B to collidable A.
    pub normal: Vec3,
    /// Id of the features involved in the collision that generated this contact.
    pub feature_id: i32,
}

const _: () = {
    assert!(std::mem::size_of::<Contact>() == 32);
    assert!(std::mem::offset_of!(Contact, depth) == 12);
};
