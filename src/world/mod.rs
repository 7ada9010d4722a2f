//! The world: entity registry, component stores, collectors, systems,
//! managers and the tick loop, composed behind one owner.
//!
//! All state is owned by the single thread driving the `World`.
//! Re-entrancy is cooperative and explicit: mutations publish change
//! events that are fanned out to collectors before the mutating call
//! returns, and deferred work goes through the modify queue's
//! structural lane, drained between systems.

pub use self::{
    comp::Component,
    entity::{Entity, EntityGraph},
};

use std::{
    any::{type_name, TypeId},
    cell::RefCell,
    fmt,
    rc::Rc,
};

use ahash::AHashMap;
use log::{debug, trace};
use shrev::{EventChannel, ReaderId};

use crate::{
    collector::{Collector, CollectorState, EntityCollectorFlag},
    error::EcsError,
    matcher::EntityMatcher,
    modify::{ModifyQueue, RaiseOptions, Schedule},
    signal::Signal,
    storage::{AnyStore, ComponentRef, ComponentStores, TypeTag, UntypedRef},
    system::{Manager, System},
};

use self::entity::EntityRegistry;

mod comp;
mod entity;

/// The world lifecycle phases.
///
/// `Uninitialized → Started → (Ticking | Started)* → Stopped`. Entity,
/// component and system operations are legal from `Started` on;
/// managers are installed while still `Uninitialized`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorldPhase {
    /// Fresh world; only manager installation is legal.
    Uninitialized,
    /// Started and between ticks.
    Started,
    /// Inside a `begin_tick`/`end_tick` pair.
    Ticking,
    /// Shut down; nothing is legal anymore.
    Stopped,
}

/// A modify-queue key derived from a marker type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueKey {
    tid: TypeId,
    name: &'static str,
}

impl QueueKey {
    /// The key for the marker type `T`.
    pub fn of<T: 'static>() -> Self {
        QueueKey {
            tid: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

impl fmt::Debug for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueKey({})", self.name)
    }
}

/// Change notifications published by world mutations and consumed by
/// collectors.
#[derive(Clone, Copy, Debug)]
pub(crate) enum WorldEvent {
    EntityCreated(Entity),
    EntityDestroyed(Entity),
    ComponentAdded(UntypedRef),
    ComponentRemoved(UntypedRef),
}

/// Lifecycle signals of a world, for observers that only need the
/// boundary notifications (the payload of the tick signals is the tick
/// count).
#[derive(Default)]
pub struct WorldSignals {
    started: Signal<()>,
    tick_begun: Signal<u32>,
    tick_ended: Signal<u32>,
    stopped: Signal<()>,
}

impl WorldSignals {
    /// Raised once from `startup`.
    pub fn started(&self) -> &Signal<()> {
        &self.started
    }

    /// Raised from `begin_tick` after managers were notified.
    pub fn tick_begun(&self) -> &Signal<u32> {
        &self.tick_begun
    }

    /// Raised from `end_tick` after managers were notified.
    pub fn tick_ended(&self) -> &Signal<u32> {
        &self.tick_ended
    }

    /// Raised once from `shutdown`.
    pub fn stopped(&self) -> &Signal<()> {
        &self.stopped
    }
}

struct CollectorEntry {
    state: Rc<RefCell<CollectorState>>,
    reader: ReaderId<WorldEvent>,
}

struct SystemSlot {
    name: &'static str,
    // Taken while the system runs against the world, restored after.
    system: Option<Box<dyn System>>,
}

#[derive(Default)]
struct Managers {
    slots: Vec<Option<Box<dyn Manager>>>,
    by_type: AHashMap<TypeId, usize>,
}

/// The private marker for the world's own structural modification
/// lane.
struct StructuralLane;

/// The composition root of the toolkit.
///
/// See the [crate docs](crate) for an overview and the method docs for
/// the contract of each operation.
pub struct World {
    phase: WorldPhase,
    tick: u32,
    in_tick: bool,
    entities: EntityRegistry,
    stores: ComponentStores,
    events: EventChannel<WorldEvent>,
    collectors: Vec<CollectorEntry>,
    systems: Vec<SystemSlot>,
    managers: Managers,
    modify: Rc<ModifyQueue<QueueKey, World>>,
    signals: WorldSignals,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world in the `Uninitialized` phase.
    pub fn new() -> Self {
        World {
            phase: WorldPhase::Uninitialized,
            tick: 0,
            in_tick: false,
            entities: EntityRegistry::default(),
            stores: ComponentStores::default(),
            events: EventChannel::new(),
            collectors: Vec::new(),
            systems: Vec::new(),
            managers: Managers::default(),
            modify: Rc::new(ModifyQueue::new()),
            signals: WorldSignals::default(),
        }
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> WorldPhase {
        self.phase
    }

    /// Number of completed `begin_tick` calls.
    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    /// The world's lifecycle signals.
    pub fn signals(&self) -> &WorldSignals {
        &self.signals
    }

    fn ensure_live_phase(&self) -> Result<(), EcsError> {
        match self.phase {
            WorldPhase::Started | WorldPhase::Ticking => Ok(()),
            phase => Err(EcsError::LifecyclePhase(phase)),
        }
    }

    fn structural_key() -> QueueKey {
        QueueKey::of::<StructuralLane>()
    }

    // ---- lifecycle ----------------------------------------------------

    /// Transitions `Uninitialized → Started` and notifies managers.
    pub fn startup(&mut self) -> Result<(), EcsError> {
        if self.phase != WorldPhase::Uninitialized {
            return Err(EcsError::LifecyclePhase(self.phase));
        }
        self.phase = WorldPhase::Started;
        debug!("world started");
        self.notify_managers(|manager, world| manager.on_world_started(world));
        self.signals.started.raise(&());
        Ok(())
    }

    /// Tears the world down: systems are destroyed in reverse
    /// registration order, all entities destroyed, collectors disposed
    /// and managers released. Idempotent once stopped.
    pub fn shutdown(&mut self) -> Result<(), EcsError> {
        match self.phase {
            WorldPhase::Started => {}
            WorldPhase::Stopped => return Ok(()),
            phase => return Err(EcsError::LifecyclePhase(phase)),
        }
        debug!("world stopping");

        for i in (0..self.systems.len()).rev() {
            let Some(mut system) = self.systems[i].system.take() else {
                continue;
            };
            debug!("destroying system {}", self.systems[i].name);
            system.on_destroy(self);
        }
        self.systems.clear();

        let mut ids: Vec<Entity> = self.entities.ids().collect();
        ids.sort_unstable();
        for entity in ids {
            self.destroy_entity(entity)?;
        }

        for entry in &self.collectors {
            entry.state.borrow_mut().disposed = true;
        }
        self.collectors.clear();

        self.notify_managers_rev(|manager, world| manager.on_world_stopped(world));
        self.managers.slots.clear();
        self.managers.by_type.clear();

        self.signals.stopped.raise(&());
        self.phase = WorldPhase::Stopped;
        Ok(())
    }

    // ---- managers -----------------------------------------------------

    /// Installs a default-constructed manager. Only legal before
    /// `startup`; installing the same type again replaces the previous
    /// instance.
    pub fn install_manager<M: Manager + Default>(&mut self) -> Result<(), EcsError> {
        self.install_manager_with(M::default())
    }

    /// Installs a manager instance. Only legal before `startup`.
    pub fn install_manager_with<M: Manager>(&mut self, manager: M) -> Result<(), EcsError> {
        if self.phase != WorldPhase::Uninitialized {
            return Err(EcsError::LifecyclePhase(self.phase));
        }
        debug!("installing manager {}", type_name::<M>());
        if let Some(&index) = self.managers.by_type.get(&TypeId::of::<M>()) {
            self.managers.slots[index] = Some(Box::new(manager));
        } else {
            let index = self.managers.slots.len();
            self.managers.slots.push(Some(Box::new(manager)));
            self.managers.by_type.insert(TypeId::of::<M>(), index);
        }
        Ok(())
    }

    /// Looks a manager up by type.
    pub fn manager<M: Manager>(&self) -> Option<&M> {
        let &index = self.managers.by_type.get(&TypeId::of::<M>())?;
        self.managers.slots[index].as_deref()?.downcast_ref::<M>()
    }

    /// Looks a manager up by type, mutably.
    pub fn manager_mut<M: Manager>(&mut self) -> Option<&mut M> {
        let &index = self.managers.by_type.get(&TypeId::of::<M>())?;
        self.managers.slots[index]
            .as_deref_mut()?
            .downcast_mut::<M>()
    }

    fn notify_managers(&mut self, notify: fn(&mut dyn Manager, &mut World)) {
        for i in 0..self.managers.slots.len() {
            let Some(mut manager) = self.managers.slots[i].take() else {
                continue;
            };
            notify(manager.as_mut(), self);
            self.managers.slots[i] = Some(manager);
        }
    }

    fn notify_managers_rev(&mut self, notify: fn(&mut dyn Manager, &mut World)) {
        for i in (0..self.managers.slots.len()).rev() {
            let Some(mut manager) = self.managers.slots[i].take() else {
                continue;
            };
            notify(manager.as_mut(), self);
            self.managers.slots[i] = Some(manager);
        }
    }

    // ---- systems ------------------------------------------------------

    /// Registers a default-constructed system. Registration order is
    /// execution order; a system registered mid-tick first runs on the
    /// next tick.
    pub fn register_system<S: System + Default>(&mut self) -> Result<(), EcsError> {
        self.register_system_with(S::default())
    }

    /// Registers a system instance and runs its `on_create` hook.
    pub fn register_system_with<S: System>(&mut self, mut system: S) -> Result<(), EcsError> {
        self.ensure_live_phase()?;
        debug!("registering system {}", type_name::<S>());
        system.on_create(self);
        self.systems.push(SystemSlot {
            name: type_name::<S>(),
            system: Some(Box::new(system)),
        });
        Ok(())
    }

    /// Looks a registered system up by type. Returns `None` for the
    /// system currently running its `on_tick`.
    pub fn find_system<S: System>(&self) -> Option<&S> {
        self.systems
            .iter()
            .filter_map(|slot| slot.system.as_deref())
            .find_map(|system| system.downcast_ref::<S>())
    }

    // ---- ticking ------------------------------------------------------

    /// Starts a tick: bumps the tick counter and enters the `Ticking`
    /// phase.
    pub fn begin_tick(&mut self) -> Result<(), EcsError> {
        if self.phase != WorldPhase::Started || self.in_tick {
            return Err(EcsError::LifecyclePhase(self.phase));
        }
        self.tick += 1;
        self.phase = WorldPhase::Ticking;
        trace!("tick {} begins", self.tick);
        self.notify_managers(|manager, world| manager.on_begin_tick(world));
        let tick = self.tick;
        self.signals.tick_begun.raise(&tick);
        self.run_structural()
    }

    /// Runs every registered system whose `tick_group()` intersects
    /// `mask` (pass `u64::MAX` for all), in registration order. The
    /// structural modification lane is drained before the first system
    /// and after each one.
    pub fn tick(&mut self, mask: u64) -> Result<(), EcsError> {
        if self.phase != WorldPhase::Ticking || self.in_tick {
            return Err(EcsError::LifecyclePhase(self.phase));
        }
        self.in_tick = true;
        let result = self.tick_systems(mask);
        self.in_tick = false;
        result
    }

    fn tick_systems(&mut self, mask: u64) -> Result<(), EcsError> {
        self.run_structural()?;
        let registered = self.systems.len();
        for i in 0..registered {
            let Some(mut system) = self.systems[i].system.take() else {
                continue;
            };
            if system.tick_group() & mask != 0 {
                system.on_tick(self);
                self.systems[i].system = Some(system);
                self.run_structural()?;
            } else {
                self.systems[i].system = Some(system);
            }
        }
        Ok(())
    }

    /// Ends the tick and returns to the `Started` phase.
    pub fn end_tick(&mut self) -> Result<(), EcsError> {
        if self.phase != WorldPhase::Ticking || self.in_tick {
            return Err(EcsError::LifecyclePhase(self.phase));
        }
        self.run_structural()?;
        self.notify_managers(|manager, world| manager.on_end_tick(world));
        let tick = self.tick;
        self.signals.tick_ended.raise(&tick);
        self.phase = WorldPhase::Started;
        trace!("tick {} ends", self.tick);
        Ok(())
    }

    // ---- deferred modifications ---------------------------------------

    /// The world's modify queue, for scheduling onto user lanes.
    pub fn modify(&self) -> &ModifyQueue<QueueKey, World> {
        &self.modify
    }

    /// Schedules a structural modification onto the world's own lane.
    ///
    /// The lane is drained between systems during `tick`, at the tick
    /// boundaries, and by [`flush`](Self::flush). Unlike a plain queue
    /// `add`, deferring is always legal from inside a running command;
    /// the strict loop-guard semantics remain available through
    /// [`modify`](Self::modify).
    pub fn defer<F>(&self, f: F) -> Result<(), EcsError>
    where
        F: FnOnce(&mut World) -> Result<(), EcsError> + 'static,
    {
        self.ensure_live_phase()?;
        self.modify
            .add_with(Self::structural_key(), f, Schedule::at(0).ignoring_loop())
    }

    /// Drains the structural lane to quiescence outside a tick.
    pub fn flush(&mut self) -> Result<(), EcsError> {
        self.ensure_live_phase()?;
        self.run_structural()
    }

    /// Raises a user lane of the modify queue against this world.
    pub fn raise_modify(&mut self, key: QueueKey) -> Result<(), EcsError> {
        self.raise_modify_with(key, RaiseOptions::default())
    }

    /// Raises a user lane of the modify queue with explicit options.
    pub fn raise_modify_with(
        &mut self,
        key: QueueKey,
        options: RaiseOptions,
    ) -> Result<(), EcsError> {
        self.ensure_live_phase()?;
        let queue = Rc::clone(&self.modify);
        queue.raise_with(key, self, options)
    }

    fn run_structural(&mut self) -> Result<(), EcsError> {
        let queue = Rc::clone(&self.modify);
        // Commands may defer follow-up work; drain until quiescent.
        while queue.has_pending(&Self::structural_key()) {
            queue.raise(Self::structural_key(), self)?;
        }
        Ok(())
    }

    // ---- entities -----------------------------------------------------

    /// Creates an entity with mask 0.
    pub fn create_entity(&mut self) -> Result<Entity, EcsError> {
        self.create_entity_masked(0)
    }

    /// Creates an entity with the given classification mask. The mask
    /// is immutable for the entity's lifetime.
    pub fn create_entity_masked(&mut self, mask: u64) -> Result<Entity, EcsError> {
        self.ensure_live_phase()?;
        let entity = self.entities.create(mask);
        trace!("created entity {:?} (mask {:#x})", entity, mask);
        self.events.single_write(WorldEvent::EntityCreated(entity));
        self.sync_collectors();
        Ok(entity)
    }

    /// Destroys an entity and all of its components, the components in
    /// reverse insertion order. Destroying an id that is not alive is a
    /// no-op.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        self.ensure_live_phase()?;
        let Some(graph) = self.entities.graph_of(entity) else {
            return Ok(());
        };
        let handles: Vec<UntypedRef> = graph.components().iter().rev().copied().collect();
        for handle in handles {
            self.destroy_component_inner(handle)?;
            // Collectors must observe each removal against the graph
            // as it stood right after that detach; an entity can
            // transiently match between two removals.
            self.sync_collectors();
        }
        self.events
            .single_write(WorldEvent::EntityDestroyed(entity));
        self.entities.remove(entity);
        trace!("destroyed entity {:?}", entity);
        self.sync_collectors();
        Ok(())
    }

    /// Returns `true` if the entity is alive in this world.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Ids of all live entities, in unspecified order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.ids()
    }

    /// The component graph of a live entity.
    pub fn graph(&self, entity: Entity) -> Option<&EntityGraph> {
        self.entities.graph_of(entity)
    }

    /// A scoped handle for working with one entity. The handle is
    /// issued regardless of liveness; check
    /// [`is_valid`](EntityHandle::is_valid).
    pub fn entity(&mut self, entity: Entity) -> EntityHandle<'_> {
        EntityHandle {
            world: self,
            entity,
        }
    }

    // ---- components ---------------------------------------------------

    /// Creates a zero-initialized `T` on the entity. Several components
    /// of the same type may coexist on one entity.
    pub fn create_component<T: Component>(
        &mut self,
        entity: Entity,
    ) -> Result<ComponentRef<T>, EcsError> {
        self.ensure_live_phase()?;
        let tag = self.stores.ensure::<T>();
        let raw = self.create_component_raw(entity, tag)?;
        self.sync_collectors();
        Ok(ComponentRef::from_raw(raw))
    }

    /// Untyped creation by `TypeId`. The type must have been registered
    /// before (by a typed operation or a matcher naming it).
    pub fn create_component_by_id(
        &mut self,
        entity: Entity,
        tid: TypeId,
    ) -> Result<UntypedRef, EcsError> {
        self.ensure_live_phase()?;
        let tag = self
            .stores
            .tag_of_id(tid)
            .ok_or(EcsError::UnregisteredType)?;
        let raw = self.create_component_raw(entity, tag)?;
        self.sync_collectors();
        Ok(raw)
    }

    fn create_component_raw(
        &mut self,
        entity: Entity,
        tag: TypeTag,
    ) -> Result<UntypedRef, EcsError> {
        if !self.entities.contains(entity) {
            return Err(EcsError::EntityInvalid(entity));
        }
        let store = self
            .stores
            .dyn_store_mut(tag)
            .ok_or(EcsError::UnregisteredType)?;
        let raw = store.create_default(entity);
        self.entities.graph_mut(entity).unwrap().attach(raw);
        self.events.single_write(WorldEvent::ComponentAdded(raw));
        Ok(raw)
    }

    /// Destroys the component a handle refers to. A stale handle fails
    /// with [`EcsError::RefCut`] and changes nothing.
    pub fn destroy_component(&mut self, handle: impl Into<UntypedRef>) -> Result<(), EcsError> {
        self.ensure_live_phase()?;
        self.destroy_component_inner(handle.into())?;
        self.sync_collectors();
        Ok(())
    }

    fn destroy_component_inner(&mut self, handle: UntypedRef) -> Result<(), EcsError> {
        let store = self
            .stores
            .dyn_store_mut(handle.tag)
            .ok_or(EcsError::RefCut)?;
        let owner = store.destroy(handle.offset, handle.version)?;
        if let Some(graph) = self.entities.graph_mut(owner) {
            graph.detach(&handle);
        }
        self.events.single_write(WorldEvent::ComponentRemoved(handle));
        Ok(())
    }

    /// The first component of type `T` on the entity, in insertion
    /// order.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<ComponentRef<T>> {
        let tag = self.stores.tag_of::<T>()?;
        let raw = self.entities.graph_of(entity)?.first_of(tag)?;
        Some(ComponentRef::from_raw(raw))
    }

    /// All component handles of the entity, in insertion order; empty
    /// for a dead entity.
    pub fn components_of(&self, entity: Entity) -> &[UntypedRef] {
        self.entities
            .graph_of(entity)
            .map(|graph| graph.components())
            .unwrap_or(&[])
    }

    /// Returns `true` if the entity owns at least one `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        match (self.stores.tag_of::<T>(), self.entities.graph_of(entity)) {
            (Some(tag), Some(graph)) => graph.contains_tag(tag),
            _ => false,
        }
    }

    /// Handles of every live `T` in the world, in slot order.
    pub fn components<T: Component>(&self) -> impl Iterator<Item = ComponentRef<T>> + '_ {
        self.stores
            .typed_by_type::<T>()
            .into_iter()
            .flat_map(|store| store.iter())
    }

    /// Number of live `T` components in the world.
    pub fn component_count<T: Component>(&self) -> usize {
        self.stores
            .typed_by_type::<T>()
            .map_or(0, |store| store.live_count())
    }

    /// Version check for an untyped handle.
    pub fn is_live(&self, handle: &UntypedRef) -> bool {
        self.stores
            .dyn_store(handle.tag)
            .map_or(false, |store| store.is_live(handle.offset, handle.version))
    }

    pub(crate) fn resolve<'w, T: Component>(
        &'w self,
        raw: &UntypedRef,
    ) -> Result<&'w T, EcsError> {
        match self.stores.typed::<T>(raw.tag) {
            Some(store) => store.get(raw),
            None => Err(EcsError::RefCut),
        }
    }

    pub(crate) fn resolve_mut<'w, T: Component>(
        &'w mut self,
        raw: &UntypedRef,
    ) -> Result<&'w mut T, EcsError> {
        match self.stores.typed_mut::<T>(raw.tag) {
            Some(store) => store.get_mut(raw),
            None => Err(EcsError::RefCut),
        }
    }

    // ---- matching and collecting --------------------------------------

    /// Evaluates a matcher against one entity. Dead entities never
    /// match.
    pub fn matches(&mut self, matcher: &EntityMatcher, entity: Entity) -> bool {
        let compiled = matcher.compile(&mut self.stores);
        self.entities
            .graph_of(entity)
            .map_or(false, |graph| compiled.matches(graph))
    }

    /// Creates a collector subscribed to this world's change events.
    ///
    /// The collector is seeded with the already-live entities (in
    /// ascending id order, honoring the lazy flags) and updated
    /// synchronously from then on.
    pub fn create_collector(
        &mut self,
        matcher: EntityMatcher,
        flags: EntityCollectorFlag,
    ) -> Result<Collector, EcsError> {
        self.ensure_live_phase()?;
        let compiled = matcher.compile(&mut self.stores);
        let mut state = CollectorState::new(matcher, compiled, flags);

        let mut ids: Vec<Entity> = self.entities.ids().collect();
        ids.sort_unstable();
        for entity in ids {
            let matched = self
                .entities
                .graph_of(entity)
                .map_or(false, |graph| state.compiled().matches(graph));
            if matched {
                state.apply(entity, true, false);
            }
        }

        let state = Rc::new(RefCell::new(state));
        let reader = self.events.register_reader();
        self.collectors.push(CollectorEntry {
            state: Rc::clone(&state),
            reader,
        });
        Ok(Collector::new(state))
    }

    /// Drains pending world events into every live collector, in
    /// registration order, and prunes disposed ones.
    fn sync_collectors(&mut self) {
        if self.collectors.is_empty() {
            return;
        }
        let events = &self.events;
        let entities = &self.entities;
        let mut prune = false;
        for entry in &mut self.collectors {
            let mut state = entry.state.borrow_mut();
            if state.disposed {
                prune = true;
                continue;
            }
            for event in events.read(&mut entry.reader) {
                let (entity, destroyed) = match event {
                    WorldEvent::EntityCreated(e) => (*e, false),
                    WorldEvent::EntityDestroyed(e) => (*e, true),
                    WorldEvent::ComponentAdded(h) | WorldEvent::ComponentRemoved(h) => {
                        (h.entity(), false)
                    }
                };
                let is_match = entities
                    .graph_of(entity)
                    .map_or(false, |graph| state.compiled().matches(graph));
                state.apply(entity, is_match, destroyed);
            }
        }
        if prune {
            self.collectors
                .retain(|entry| !entry.state.borrow().disposed);
        }
    }
}

/// A scoped view of one entity, borrowed from the world.
///
/// Obtained through [`World::entity`]; valid operations mirror the
/// world-level component API, scoped to this entity.
pub struct EntityHandle<'w> {
    world: &'w mut World,
    entity: Entity,
}

impl<'w> EntityHandle<'w> {
    /// The entity this handle refers to.
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// Returns `true` while the entity is alive.
    pub fn is_valid(&self) -> bool {
        self.world.is_alive(self.entity)
    }

    /// The entity's classification mask; [`EcsError::EntityInvalid`]
    /// once the entity is destroyed (including ids a lazy collector
    /// still retains as tombstones).
    pub fn mask(&self) -> Result<u64, EcsError> {
        self.world
            .entities
            .graph_of(self.entity)
            .map(|graph| graph.mask())
            .ok_or(EcsError::EntityInvalid(self.entity))
    }

    /// Creates a zero-initialized `T` on this entity.
    pub fn create_component<T: Component>(&mut self) -> Result<ComponentRef<T>, EcsError> {
        self.world.create_component(self.entity)
    }

    /// Untyped creation by `TypeId`.
    pub fn create_component_by_id(&mut self, tid: TypeId) -> Result<UntypedRef, EcsError> {
        self.world.create_component_by_id(self.entity, tid)
    }

    /// Destroys one of this entity's components. Fails with
    /// [`EcsError::EntityInvalid`] if the handle belongs to another
    /// entity.
    pub fn destroy_component(&mut self, handle: impl Into<UntypedRef>) -> Result<(), EcsError> {
        let handle = handle.into();
        if handle.entity() != self.entity {
            return Err(EcsError::EntityInvalid(handle.entity()));
        }
        self.world.destroy_component(handle)
    }

    /// The first component of type `T`, in insertion order.
    pub fn get_component<T: Component>(&self) -> Option<ComponentRef<T>> {
        self.world.get_component(self.entity)
    }

    /// All component handles, in insertion order.
    pub fn components(&self) -> &[UntypedRef] {
        self.world.components_of(self.entity)
    }

    /// Returns `true` if the entity owns at least one `T`.
    pub fn has_component<T: Component>(&self) -> bool {
        self.world.has_component::<T>(self.entity)
    }

    /// Destroys the entity and all of its components.
    pub fn destroy(self) -> Result<(), EcsError> {
        self.world.destroy_entity(self.entity)
    }
}
