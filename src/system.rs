//! Systems and managers: the per-tick and per-lifecycle extension
//! points of a [`World`](crate::world::World).

use downcast_rs::{impl_downcast, Downcast};

use crate::world::World;

/// A unit of per-tick behavior.
///
/// Systems run in registration order during
/// [`World::tick`](crate::world::World::tick), gated by their tick
/// group: a system runs when `tick_group() & mask != 0`. A system gets
/// exclusive world access while it runs; between systems the world
/// drains its structural modification lane, so entities and components
/// scheduled through [`World::defer`](crate::world::World::defer)
/// exist before the next system observes the world.
pub trait System: Downcast {
    /// Called once when the system is registered.
    fn on_create(&mut self, _world: &mut World) {}

    /// Called every tick the system's group is selected.
    fn on_tick(&mut self, world: &mut World);

    /// Called during world shutdown, in reverse registration order.
    fn on_destroy(&mut self, _world: &mut World) {}

    /// The tick-group bitfield this system belongs to.
    fn tick_group(&self) -> u64 {
        1
    }
}

impl_downcast!(System);

/// A long-lived service installed into the world before startup.
///
/// Managers observe the world lifecycle; they are notified of startup,
/// tick boundaries and shutdown, and are looked up by type through
/// [`World::manager`](crate::world::World::manager).
pub trait Manager: Downcast {
    /// Called from [`World::startup`](crate::world::World::startup).
    fn on_world_started(&mut self, _world: &mut World) {}

    /// Called at the start of every tick.
    fn on_begin_tick(&mut self, _world: &mut World) {}

    /// Called at the end of every tick.
    fn on_end_tick(&mut self, _world: &mut World) {}

    /// Called from [`World::shutdown`](crate::world::World::shutdown),
    /// in reverse installation order.
    fn on_world_stopped(&mut self, _world: &mut World) {}
}

impl_downcast!(Manager);
