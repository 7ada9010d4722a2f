//! Reactive entity sets: collectors track which entities satisfy a
//! matcher as the world mutates, and report the deltas between
//! [`Collector::change`] calls.

use std::{
    cell::{Ref, RefCell},
    rc::Rc,
};

use ahash::AHashSet;
use bitflags::bitflags;

use crate::{
    matcher::{CompiledMatcher, EntityMatcher},
    world::Entity,
};

bitflags! {
    /// Behavior flags for a [`Collector`].
    ///
    /// With no flags set (`empty()`), membership updates apply
    /// immediately as events fire. The lazy flags defer the
    /// corresponding membership change until the next
    /// [`Collector::change`] call.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EntityCollectorFlag: u8 {
        /// Entities that start matching are parked in a pending set
        /// until `change()`.
        const LAZY_ADD = 1;
        /// Entities that stop matching stay collected until
        /// `change()`.
        const LAZY_REMOVE = 2;
        /// Both lazy behaviors.
        const LAZY = Self::LAZY_ADD.bits() | Self::LAZY_REMOVE.bits();
    }
}

/// The shared state behind a [`Collector`] handle.
///
/// Owned jointly by the world (which feeds it events) and by however
/// many `Collector` handles the user cloned. Single-threaded by
/// design: `Rc<RefCell<_>>`.
pub(crate) struct CollectorState {
    matcher: EntityMatcher,
    compiled: CompiledMatcher,
    flags: EntityCollectorFlag,
    collected: Vec<Entity>,
    collected_set: AHashSet<Entity>,
    pending_add: Vec<Entity>,
    pending_add_set: AHashSet<Entity>,
    pending_remove: Vec<Entity>,
    pending_remove_set: AHashSet<Entity>,
    matching: Vec<Entity>,
    clashing: Vec<Entity>,
    tombstones: AHashSet<Entity>,
    pub(crate) disposed: bool,
}

impl CollectorState {
    pub(crate) fn new(
        matcher: EntityMatcher,
        compiled: CompiledMatcher,
        flags: EntityCollectorFlag,
    ) -> Self {
        CollectorState {
            matcher,
            compiled,
            flags,
            collected: Vec::new(),
            collected_set: AHashSet::new(),
            pending_add: Vec::new(),
            pending_add_set: AHashSet::new(),
            pending_remove: Vec::new(),
            pending_remove_set: AHashSet::new(),
            matching: Vec::new(),
            clashing: Vec::new(),
            tombstones: AHashSet::new(),
            disposed: false,
        }
    }

    pub(crate) fn compiled(&self) -> &CompiledMatcher {
        &self.compiled
    }

    /// Applies one world event's verdict for `entity`.
    ///
    /// `is_match` is the freshly recomputed predicate; `destroyed`
    /// marks the entity-destroyed event, which always counts as
    /// leaving but additionally tombstones the id under `LAZY_REMOVE`.
    pub(crate) fn apply(&mut self, entity: Entity, is_match: bool, destroyed: bool) {
        let is_in = self.collected_set.contains(&entity);

        if destroyed || !is_match {
            // Whatever happens below, the entity no longer qualifies
            // for a pending admission.
            self.unpend_add(entity);
            if is_in {
                if self.flags.contains(EntityCollectorFlag::LAZY_REMOVE) {
                    if self.pending_remove_set.insert(entity) {
                        self.pending_remove.push(entity);
                    }
                    if destroyed {
                        self.tombstones.insert(entity);
                    }
                } else {
                    self.evict(entity);
                    self.clashing.push(entity);
                }
            }
            return;
        }

        if is_in {
            // Matching again before a lazy removal was applied cancels
            // the removal.
            self.unpend_remove(entity);
            return;
        }
        if self.flags.contains(EntityCollectorFlag::LAZY_ADD) {
            if self.pending_add_set.insert(entity) {
                self.pending_add.push(entity);
            }
        } else {
            self.admit(entity);
            self.matching.push(entity);
        }
    }

    fn admit(&mut self, entity: Entity) {
        if self.collected_set.insert(entity) {
            self.collected.push(entity);
        }
    }

    fn evict(&mut self, entity: Entity) {
        if self.collected_set.remove(&entity) {
            self.collected.retain(|&e| e != entity);
        }
    }

    fn unpend_add(&mut self, entity: Entity) {
        if self.pending_add_set.remove(&entity) {
            self.pending_add.retain(|&e| e != entity);
        }
    }

    fn unpend_remove(&mut self, entity: Entity) {
        if self.pending_remove_set.remove(&entity) {
            self.pending_remove.retain(|&e| e != entity);
        }
    }

    fn change(&mut self) {
        // A change call closes the previous reporting period.
        self.matching.clear();
        self.clashing.clear();

        for i in 0..self.pending_remove.len() {
            let entity = self.pending_remove[i];
            self.collected_set.remove(&entity);
            self.collected.retain(|&e| e != entity);
            self.clashing.push(entity);
        }
        self.pending_remove.clear();
        self.pending_remove_set.clear();
        self.tombstones.clear();

        for i in 0..self.pending_add.len() {
            let entity = self.pending_add[i];
            if self.collected_set.insert(entity) {
                self.collected.push(entity);
                self.matching.push(entity);
            }
        }
        self.pending_add.clear();
        self.pending_add_set.clear();
    }
}

/// A live view of the entities satisfying a matcher.
///
/// Created with
/// [`World::create_collector`](crate::world::World::create_collector).
/// The world keeps the collector current synchronously as mutations
/// happen; [`Collector::change`] turns over the reporting period,
/// applying lazy deltas and exposing what entered (`matching`) and left
/// (`clashing`) since the previous call.
///
/// The accessors return borrowed slices; drop them before mutating the
/// world again or the interior `RefCell` will panic, exactly like any
/// other outstanding borrow.
#[derive(Clone)]
pub struct Collector {
    state: Rc<RefCell<CollectorState>>,
}

impl Collector {
    pub(crate) fn new(state: Rc<RefCell<CollectorState>>) -> Self {
        Collector { state }
    }

    /// The matcher this collector was created with.
    pub fn matcher(&self) -> EntityMatcher {
        self.state.borrow().matcher.clone()
    }

    /// The flags this collector was created with.
    pub fn flags(&self) -> EntityCollectorFlag {
        self.state.borrow().flags
    }

    /// The currently collected entities, in admission order.
    pub fn collected(&self) -> Ref<'_, [Entity]> {
        Ref::map(self.state.borrow(), |s| s.collected.as_slice())
    }

    /// Entities that entered the collected set since the last
    /// [`change`](Self::change), in event order.
    pub fn matching(&self) -> Ref<'_, [Entity]> {
        Ref::map(self.state.borrow(), |s| s.matching.as_slice())
    }

    /// Entities that left the collected set since the last
    /// [`change`](Self::change), in event order.
    pub fn clashing(&self) -> Ref<'_, [Entity]> {
        Ref::map(self.state.borrow(), |s| s.clashing.as_slice())
    }

    /// Returns `true` if `entity` is currently collected.
    pub fn contains(&self, entity: Entity) -> bool {
        self.state.borrow().collected_set.contains(&entity)
    }

    /// Returns `true` if `entity` was destroyed but is retained in the
    /// collected set by `LAZY_REMOVE` until the next `change()`.
    pub fn is_tombstoned(&self, entity: Entity) -> bool {
        self.state.borrow().tombstones.contains(&entity)
    }

    /// Number of collected entities.
    pub fn len(&self) -> usize {
        self.state.borrow().collected.len()
    }

    /// Returns `true` if nothing is collected.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().collected.is_empty()
    }

    /// Turns over the reporting period: clears `matching`/`clashing`,
    /// then applies pending removals and admissions (in that order,
    /// each in event order).
    pub fn change(&self) {
        self.state.borrow_mut().change();
    }

    /// Cancels the subscription. The world stops feeding this
    /// collector at the next event boundary and drops its reader; the
    /// collected state freezes as-is.
    pub fn dispose(&self) {
        self.state.borrow_mut().disposed = true;
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.state.borrow().disposed
    }
}
