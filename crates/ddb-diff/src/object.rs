use serde::Serialize;

/// A caller-defined entity whose changes are tracked.
///
/// The ID must stay the same for the lifetime of the entity (a primary key,
/// for example). Everything the value serializes is hashed, so two
/// versions differ exactly when their serialized structure differs.
pub trait Object: Serialize {
    /// Stable identifier of this object.
    fn id(&self) -> Vec<u8>;
}

impl<T: Object + ?Sized> Object for &T {
    fn id(&self) -> Vec<u8> {
        (**self).id()
    }
}

impl<T: Object + ?Sized> Object for Box<T> {
    fn id(&self) -> Vec<u8> {
        (**self).id()
    }
}
