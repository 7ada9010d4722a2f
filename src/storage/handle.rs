use std::{
    any::TypeId,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use crate::{
    error::EcsError,
    storage::TypeTag,
    world::{Component, Entity, World},
};

/// A stable, address-independent pointer to a component slot.
///
/// The triple `(type tag, offset, version)` uniquely identifies a live
/// slot; since there is exactly one store per tag, the tag doubles as
/// the storage locator. A handle outlives the slot it refers to and
/// detects staleness through the version check: slots are never reused
/// without a version bump, so a stale handle always observably fails.
///
/// Equality and hashing are value identity over the whole handle. Two
/// handles naming the same live slot compare equal no matter how they
/// were obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UntypedRef {
    pub(crate) tag: TypeTag,
    pub(crate) offset: u32,
    pub(crate) version: u32,
    pub(crate) entity: Entity,
    pub(crate) tid: TypeId,
}

impl UntypedRef {
    /// The entity that owns the referenced component.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// The registration tag of the component's type.
    #[inline]
    pub fn type_tag(&self) -> TypeTag {
        self.tag
    }

    /// The slot offset inside the component store.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// The slot version this handle was issued for.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns `true` if the handle refers to a component of type `T`.
    pub fn is<T: Component>(&self) -> bool {
        self.tid == TypeId::of::<T>()
    }

    /// Returns `true` if the referenced slot still holds the component
    /// this handle was issued for.
    pub fn live(&self, world: &World) -> bool {
        world.is_live(self)
    }

    /// Narrows the untyped handle back to a typed one.
    ///
    /// Fails with [`EcsError::TypeMismatch`] if the handle refers to a
    /// component of a different type. Narrowing does not check
    /// liveness; a cut handle narrows fine and keeps failing on
    /// dereference.
    pub fn narrow<T: Component>(self) -> Result<ComponentRef<T>, EcsError> {
        if self.is::<T>() {
            Ok(ComponentRef::from_raw(self))
        } else {
            Err(EcsError::TypeMismatch)
        }
    }
}

/// A typed component handle.
///
/// Carries the same slot identity as [`UntypedRef`] plus the component
/// type, which makes dereferencing (`read`/`write`) type-safe without a
/// downcast. Direct references obtained through `read`/`write` are
/// short-lived by contract; the handle itself is the persistent
/// identity and must be re-resolved after mutations of the same store.
pub struct ComponentRef<T> {
    raw: UntypedRef,
    marker: PhantomData<fn() -> T>,
}

impl<T: Component> ComponentRef<T> {
    pub(crate) fn from_raw(raw: UntypedRef) -> Self {
        ComponentRef {
            raw,
            marker: PhantomData,
        }
    }

    /// The entity that owns the referenced component.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.raw.entity
    }

    /// The registration tag of `T`.
    #[inline]
    pub fn type_tag(&self) -> TypeTag {
        self.raw.tag
    }

    /// Widens to the untyped handle.
    #[inline]
    pub fn as_untyped(&self) -> UntypedRef {
        self.raw
    }

    /// Returns `true` if the referenced slot still holds the component
    /// this handle was issued for.
    pub fn live(&self, world: &World) -> bool {
        world.is_live(&self.raw)
    }

    /// Borrows the component.
    ///
    /// Fails with [`EcsError::RefCut`] if the slot version has moved
    /// on. The reference is only valid until the next create/destroy on
    /// the same store; re-resolve through the handle afterwards.
    pub fn read<'w>(&self, world: &'w World) -> Result<&'w T, EcsError> {
        world.resolve(&self.raw)
    }

    /// Mutably borrows the component.
    ///
    /// Fails with [`EcsError::RefCut`] if the slot version has moved
    /// on.
    pub fn write<'w>(&self, world: &'w mut World) -> Result<&'w mut T, EcsError> {
        world.resolve_mut(&self.raw)
    }
}

impl<T: Component> From<ComponentRef<T>> for UntypedRef {
    fn from(handle: ComponentRef<T>) -> UntypedRef {
        handle.raw
    }
}

impl<T> Clone for ComponentRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ComponentRef<T> {}

impl<T> PartialEq for ComponentRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for ComponentRef<T> {}

impl<T> Hash for ComponentRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for ComponentRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("tag", &self.raw.tag)
            .field("offset", &self.raw.offset)
            .field("version", &self.raw.version)
            .field("entity", &self.raw.entity)
            .finish()
    }
}
