use std::any::TypeId;

use crate::{
    error::EcsError,
    storage::{AnyStore, ComponentRef, TypeTag, UntypedRef},
    world::{Component, Entity},
};

/// One component slot.
///
/// Versions follow an odd/even scheme: a populated slot carries an odd
/// version, a vacated one an even version. Destroy bumps the version to
/// vacate, reuse bumps it again to repopulate, so a stale handle can
/// never collide with either state of a recycled slot.
#[derive(Debug)]
struct Slot<T> {
    value: T,
    version: u32,
    owner: Entity,
    in_use: bool,
}

/// Dense, append-with-holes storage for all components of one type.
///
/// Vacated offsets are kept on a free-list and reused before the slot
/// vector grows. Slots never move, which is what makes the
/// `(tag, offset, version)` handle stable.
#[derive(Debug)]
pub struct ComponentStore<T> {
    tag: TypeTag,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T: Component> ComponentStore<T> {
    pub(crate) fn new(tag: TypeTag) -> Self {
        ComponentStore {
            tag,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Reserves a slot for `entity`, zero-initializes it and runs the
    /// `on_create` hook. The caller is responsible for checking that
    /// the entity is live and for publishing the change event.
    pub(crate) fn create(&mut self, entity: Entity) -> ComponentRef<T> {
        let offset = match self.free.pop() {
            Some(offset) => {
                let slot = &mut self.slots[offset as usize];
                slot.value = T::default();
                slot.version += 1;
                slot.owner = entity;
                slot.in_use = true;
                offset
            }
            None => {
                let offset = self.slots.len() as u32;
                self.slots.push(Slot {
                    value: T::default(),
                    version: 1,
                    owner: entity,
                    in_use: true,
                });
                offset
            }
        };
        self.live += 1;

        let slot = &mut self.slots[offset as usize];
        slot.value.on_create(entity);

        ComponentRef::from_raw(UntypedRef {
            tag: self.tag,
            offset,
            version: slot.version,
            entity,
            tid: TypeId::of::<T>(),
        })
    }

    fn slot_for(&self, handle: &UntypedRef) -> Result<&Slot<T>, EcsError> {
        match self.slots.get(handle.offset as usize) {
            Some(slot) if slot.in_use && slot.version == handle.version => Ok(slot),
            _ => Err(EcsError::RefCut),
        }
    }

    /// Borrows the component the handle refers to.
    pub fn get(&self, handle: &UntypedRef) -> Result<&T, EcsError> {
        self.slot_for(handle).map(|slot| &slot.value)
    }

    /// Mutably borrows the component the handle refers to.
    pub fn get_mut(&mut self, handle: &UntypedRef) -> Result<&mut T, EcsError> {
        match self.slots.get_mut(handle.offset as usize) {
            Some(slot) if slot.in_use && slot.version == handle.version => Ok(&mut slot.value),
            _ => Err(EcsError::RefCut),
        }
    }

    /// Handles of all live components, in offset order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentRef<T>> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.in_use)
            .map(|(offset, slot)| {
                ComponentRef::from_raw(UntypedRef {
                    tag: self.tag,
                    offset: offset as u32,
                    version: slot.version,
                    entity: slot.owner,
                    tid: TypeId::of::<T>(),
                })
            })
    }
}

impl<T: Component> AnyStore for ComponentStore<T> {
    fn tag(&self) -> TypeTag {
        self.tag
    }

    fn component_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn component_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn slot_version(&self, offset: u32) -> Option<u32> {
        self.slots.get(offset as usize).map(|slot| slot.version)
    }

    fn is_live(&self, offset: u32, version: u32) -> bool {
        matches!(
            self.slots.get(offset as usize),
            Some(slot) if slot.in_use && slot.version == version
        )
    }

    fn owner(&self, offset: u32) -> Option<Entity> {
        match self.slots.get(offset as usize) {
            Some(slot) if slot.in_use => Some(slot.owner),
            _ => None,
        }
    }

    fn create_default(&mut self, entity: Entity) -> UntypedRef {
        self.create(entity).as_untyped()
    }

    fn destroy(&mut self, offset: u32, version: u32) -> Result<Entity, EcsError> {
        let slot = match self.slots.get_mut(offset as usize) {
            Some(slot) if slot.in_use && slot.version == version => slot,
            _ => return Err(EcsError::RefCut),
        };
        let owner = slot.owner;
        slot.value.on_destroy(owner);
        // Drop the payload now rather than when the slot is reused.
        slot.value = T::default();
        slot.version += 1;
        slot.owner = Entity::NULL;
        slot.in_use = false;
        self.free.push(offset);
        self.live -= 1;
        Ok(owner)
    }

    fn live_count(&self) -> usize {
        self.live
    }

    fn handles(&self) -> Vec<UntypedRef> {
        self.iter().map(|handle| handle.as_untyped()).collect()
    }
}
