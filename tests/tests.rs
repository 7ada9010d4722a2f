//! End-to-end scenarios across the whole toolkit.

use rand::{rngs::StdRng, Rng, SeedableRng};
use tickecs::prelude::*;

#[derive(Default, Debug, PartialEq)]
struct Position {
    x: i32,
    y: i32,
}
impl Component for Position {}

#[derive(Default)]
struct Velocity {
    x: i32,
    y: i32,
}
impl Component for Velocity {}

#[derive(Default)]
struct Health;
impl Component for Health {}

fn started_world() -> World {
    let mut world = World::new();
    world.startup().unwrap();
    world
}

fn run_tick(world: &mut World) {
    world.begin_tick().unwrap();
    world.tick(u64::MAX).unwrap();
    world.end_tick().unwrap();
}

// S1: a movement system driven by a collector adds velocity to
// position every tick.
#[derive(Default)]
struct MovementSystem {
    collector: Option<Collector>,
}

impl System for MovementSystem {
    fn on_create(&mut self, world: &mut World) {
        let collector = world
            .create_collector(
                EntityMatcher::new().of_all::<Position>().of_all::<Velocity>(),
                EntityCollectorFlag::empty(),
            )
            .unwrap();
        self.collector = Some(collector);
    }

    fn on_tick(&mut self, world: &mut World) {
        let collector = self.collector.as_ref().unwrap();
        collector.change();
        let movers: Vec<Entity> = collector.collected().to_vec();
        for entity in movers {
            let (dx, dy) = {
                let vel = world.get_component::<Velocity>(entity).unwrap();
                let vel = vel.read(world).unwrap();
                (vel.x, vel.y)
            };
            let pos = world.get_component::<Position>(entity).unwrap();
            let pos = pos.write(world).unwrap();
            pos.x += dx;
            pos.y += dy;
        }
    }
}

#[test]
fn basic_movement() {
    let mut world = started_world();

    let e1 = world.create_entity().unwrap();
    let pos = world.create_component::<Position>(e1).unwrap();
    *pos.write(&mut world).unwrap() = Position { x: 10, y: 20 };
    let vel = world.create_component::<Velocity>(e1).unwrap();
    {
        let vel = vel.write(&mut world).unwrap();
        vel.x = 1;
        vel.y = 1;
    }

    world.register_system::<MovementSystem>().unwrap();
    for _ in 0..5 {
        run_tick(&mut world);
    }

    assert_eq!(*pos.read(&world).unwrap(), Position { x: 15, y: 25 });

    let collector = world
        .find_system::<MovementSystem>()
        .unwrap()
        .collector
        .clone()
        .unwrap();
    assert_eq!(&*collector.collected(), &[e1]);
    // The system called change() every tick; the admission was
    // reported on the first one only.
    assert_eq!(&*collector.matching(), &[]);
}

// S2: exclusion by of_none, and leaving the set when the excluded
// component appears.
#[test]
fn matcher_exclusion() {
    let mut world = started_world();

    let a = world.create_entity().unwrap();
    world.create_component::<Position>(a).unwrap();
    let b = world.create_entity().unwrap();
    world.create_component::<Position>(b).unwrap();
    world.create_component::<Health>(b).unwrap();
    let c = world.create_entity().unwrap();
    world.create_component::<Velocity>(c).unwrap();

    let collector = world
        .create_collector(
            EntityMatcher::new().of_all::<Position>().of_none::<Health>(),
            EntityCollectorFlag::empty(),
        )
        .unwrap();
    assert_eq!(&*collector.collected(), &[a]);

    world.create_component::<Health>(a).unwrap();
    assert_eq!(&*collector.collected(), &[]);
    assert_eq!(&*collector.clashing(), &[a]);
}

// S3: a fully lazy collector parks admissions until change().
#[test]
fn lazy_collector() {
    let mut world = started_world();
    let collector = world
        .create_collector(
            EntityMatcher::new().of_all::<Position>(),
            EntityCollectorFlag::LAZY,
        )
        .unwrap();

    let mut spawned = Vec::new();
    for _ in 0..3 {
        let e = world.create_entity().unwrap();
        world.create_component::<Position>(e).unwrap();
        spawned.push(e);
    }

    assert!(collector.is_empty());
    collector.change();
    assert_eq!(&*collector.collected(), spawned.as_slice());
    assert_eq!(&*collector.matching(), spawned.as_slice());
}

// S4: stale handles stay stale across slot reuse.
#[test]
fn handle_staleness() {
    let mut world = started_world();

    let e1 = world.create_entity().unwrap();
    let h = world.create_component::<Position>(e1).unwrap();
    assert!(h.live(&world));

    world.destroy_entity(e1).unwrap();
    assert!(!h.live(&world));
    assert_eq!(h.read(&world).unwrap_err(), EcsError::RefCut);

    // Reuse the slot through a fresh entity.
    let e2 = world.create_entity().unwrap();
    let h2 = world.create_component::<Position>(e2).unwrap();
    assert_eq!(h2.as_untyped().offset(), h.as_untyped().offset());
    assert_ne!(h2.as_untyped().version(), h.as_untyped().version());
    assert!(!h.live(&world));
    assert_eq!(h.read(&world).unwrap_err(), EcsError::RefCut);
    assert!(h2.live(&world));
}

// S5: immediate legality inside and outside a raise.
#[test]
fn modify_queue_immediate_legality() {
    struct Lane;

    let mut world = started_world();
    let key = QueueKey::of::<Lane>();

    assert_eq!(
        world
            .modify()
            .add_with(key, |_| Ok(()), Schedule::immediate(0))
            .unwrap_err(),
        EcsError::ImmediateNotPermitted
    );

    // A deferred command schedules an immediate one; the immediate
    // preempts the remaining deferred work.
    world
        .modify()
        .add_with(
            key,
            move |world: &mut World| {
                world.create_entity_masked(1)?;
                world.modify().add_with(
                    key,
                    |world: &mut World| {
                        world.create_entity_masked(2)?;
                        Ok(())
                    },
                    Schedule::immediate(0).ignoring_loop(),
                )?;
                Ok(())
            },
            Schedule::at(0),
        )
        .unwrap();
    world
        .modify()
        .add_with(
            key,
            |world: &mut World| {
                world.create_entity_masked(3)?;
                Ok(())
            },
            Schedule::at(1),
        )
        .unwrap();

    world.raise_modify(key).unwrap();

    // Ids are handed out in creation order, so the masks read back in
    // id order spell out the execution order: deferred(0), immediate,
    // deferred(1).
    let mut spawned: Vec<Entity> = world.entities().collect();
    spawned.sort_unstable();
    let masks: Vec<u64> = spawned
        .into_iter()
        .map(|entity| world.graph(entity).unwrap().mask())
        .collect();
    assert_eq!(masks, vec![1, 2, 3]);
}

// S6: the loop guard blocks scheduling from inside a command unless
// escaped, and escaped commands wait for the next raise.
#[test]
fn modify_queue_loop_guard() {
    struct Lane;

    let mut world = started_world();
    let key = QueueKey::of::<Lane>();

    world
        .modify()
        .add(key, move |world: &mut World| {
            assert_eq!(
                world.modify().add(key, |_| Ok(())).unwrap_err(),
                EcsError::LoopGuard
            );
            assert!(world.modify().executing());
            world.modify().add_with(
                key,
                |world: &mut World| {
                    world.create_entity()?;
                    Ok(())
                },
                Schedule::at(0).ignoring_loop(),
            )?;
            Ok(())
        })
        .unwrap();

    world.raise_modify(key).unwrap();
    assert_eq!(world.entity_count(), 0);
    assert!(world.modify().has_pending(&key));

    world.raise_modify(key).unwrap();
    assert_eq!(world.entity_count(), 1);
}

#[test]
fn destroyed_entities_leave_collectors_by_the_next_change() {
    let mut world = started_world();
    let collector = world
        .create_collector(
            EntityMatcher::new().of_all::<Position>(),
            EntityCollectorFlag::empty(),
        )
        .unwrap();

    let e = world.create_entity().unwrap();
    world.create_component::<Position>(e).unwrap();
    assert!(collector.contains(e));

    world.destroy_entity(e).unwrap();
    assert!(!world.entity(e).is_valid());
    // Eager collector: the id left at the destroy event.
    assert!(!collector.contains(e));
    assert_eq!(&*collector.clashing(), &[e]);
    collector.change();
    assert_eq!(&*collector.clashing(), &[]);
    assert!(!collector.contains(e));
}

#[test]
fn presence_bit_restores_after_component_round_trip() {
    let mut world = started_world();
    let e = world.create_entity().unwrap();

    assert!(!world.has_component::<Position>(e));
    let h = world.create_component::<Position>(e).unwrap();
    assert!(world.has_component::<Position>(e));
    world.destroy_component(h).unwrap();
    assert!(!world.has_component::<Position>(e));

    // With a second instance still attached the bit stays set.
    let h1 = world.create_component::<Position>(e).unwrap();
    let h2 = world.create_component::<Position>(e).unwrap();
    world.destroy_component(h1).unwrap();
    assert!(world.has_component::<Position>(e));
    world.destroy_component(h2).unwrap();
    assert!(!world.has_component::<Position>(e));
}

#[test]
fn untyped_round_trip_preserves_identity() {
    let mut world = started_world();
    let e = world.create_entity().unwrap();
    let typed = world.create_component::<Position>(e).unwrap();

    let raw = typed.as_untyped();
    let back = raw.narrow::<Position>().unwrap();
    assert_eq!(back, typed);
    assert_eq!(back.as_untyped(), raw);
    assert_eq!(raw.narrow::<Velocity>().unwrap_err(), EcsError::TypeMismatch);
}

// Randomized churn: the structural invariants hold across arbitrary
// create/destroy interleavings.
#[test]
fn churn_preserves_structural_invariants() {
    let mut rng = StdRng::seed_from_u64(0x7ec5);
    let mut world = started_world();
    let collector = world
        .create_collector(
            EntityMatcher::new().of_all::<Position>().of_none::<Health>(),
            EntityCollectorFlag::empty(),
        )
        .unwrap();

    let mut live: Vec<Entity> = Vec::new();
    let mut handles: Vec<ComponentRef<Position>> = Vec::new();
    let mut max_id = 0u64;

    for _ in 0..2000 {
        match rng.gen_range(0..6) {
            0 => {
                let e = world.create_entity().unwrap();
                assert!(e.id() > max_id, "ids must be strictly increasing");
                max_id = e.id();
                live.push(e);
            }
            1 if !live.is_empty() => {
                let e = live.swap_remove(rng.gen_range(0..live.len()));
                world.destroy_entity(e).unwrap();
            }
            2 if !live.is_empty() => {
                let e = live[rng.gen_range(0..live.len())];
                handles.push(world.create_component::<Position>(e).unwrap());
            }
            3 if !live.is_empty() => {
                let e = live[rng.gen_range(0..live.len())];
                world.create_component::<Health>(e).unwrap();
            }
            4 if !handles.is_empty() => {
                let h = handles.swap_remove(rng.gen_range(0..handles.len()));
                // May already be gone with its entity.
                let _ = world.destroy_component(h);
            }
            _ => {}
        }

        // Invariant: every issued live handle resolves, and its slot
        // agrees about the owner.
        for h in &handles {
            if h.live(&world) {
                assert!(world.is_alive(h.entity()));
                assert!(h.read(&world).is_ok());
                let graph = world.graph(h.entity()).unwrap();
                assert!(graph.components().contains(&h.as_untyped()));
            }
        }
    }

    // Invariant: handle list and presence bits agree for every live
    // entity.
    for &e in &live {
        let graph = world.graph(e).unwrap();
        assert_eq!(
            world.has_component::<Position>(e),
            graph.components().iter().any(|h| h.is::<Position>())
        );
        assert_eq!(
            world.has_component::<Health>(e),
            graph.components().iter().any(|h| h.is::<Health>())
        );
    }

    // Invariant: at quiescence the collector agrees with a brute-force
    // matcher evaluation.
    let matcher = EntityMatcher::new().of_all::<Position>().of_none::<Health>();
    for &e in &live {
        assert_eq!(world.matches(&matcher, e), collector.contains(e));
    }
    for &e in collector.collected().iter() {
        assert!(live.contains(&e));
    }
}

#[test]
fn change_is_idempotent_without_events() {
    let mut world = started_world();
    let collector = world
        .create_collector(
            EntityMatcher::new().of_all::<Position>(),
            EntityCollectorFlag::empty(),
        )
        .unwrap();

    let e = world.create_entity().unwrap();
    world.create_component::<Position>(e).unwrap();

    collector.change();
    collector.change();
    assert_eq!(&*collector.matching(), &[]);
    assert_eq!(&*collector.clashing(), &[]);
    assert_eq!(&*collector.collected(), &[e]);
}
