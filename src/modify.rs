//! Deferred world-modification commands.
//!
//! A [`ModifyQueue`] holds per-key lanes of commands. Deferred
//! commands run at the next [`raise`](ModifyQueue::raise) of their
//! key, in ascending `timing` order; immediate commands preempt the
//! deferred lane inside an active raise of the same key. Two guards
//! keep cooperative re-entrancy honest: `executing` blocks scheduling
//! from inside a running command unless explicitly overridden, and the
//! raise stack rejects re-raising a key that is already being drained.

use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    hash::Hash,
};

use ahash::AHashMap;
use log::{error, warn};

use crate::error::EcsError;

/// Scheduling options for [`ModifyQueue::add_with`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Execution order within a raise; lower runs first, ties keep
    /// insertion order.
    pub timing: i32,
    /// Put the command on the immediate lane, preempting deferred
    /// commands of the current raise.
    pub immediate: bool,
    /// Skip the check that immediate commands are only legal while
    /// their key is being raised.
    pub ignore_immediate_check: bool,
    /// Allow scheduling while another command is executing.
    pub ignore_loop: bool,
}

impl Schedule {
    /// A deferred command at the given timing.
    pub fn at(timing: i32) -> Self {
        Schedule {
            timing,
            ..Default::default()
        }
    }

    /// An immediate command at the given timing.
    pub fn immediate(timing: i32) -> Self {
        Schedule {
            timing,
            immediate: true,
            ..Default::default()
        }
    }

    /// Allows scheduling from inside a running command.
    pub fn ignoring_loop(mut self) -> Self {
        self.ignore_loop = true;
        self
    }
}

/// Options for [`ModifyQueue::raise_with`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RaiseOptions {
    /// Allow raising a key that is already on the raise stack.
    pub ignore_loop: bool,
    /// Leave the immediate lane untouched for this raise.
    pub skip_immediate: bool,
}

trait Command<Ctx> {
    fn run(self: Box<Self>, ctx: &mut Ctx) -> Result<(), EcsError>;
}

impl<Ctx, F> Command<Ctx> for F
where
    F: FnOnce(&mut Ctx) -> Result<(), EcsError>,
{
    fn run(self: Box<Self>, ctx: &mut Ctx) -> Result<(), EcsError> {
        self(ctx)
    }
}

struct Entry<Ctx> {
    timing: i32,
    cmd: Box<dyn Command<Ctx>>,
}

struct QueueInner<K, Ctx> {
    deferred: AHashMap<K, Vec<Entry<Ctx>>>,
    immediate: AHashMap<K, Vec<Entry<Ctx>>>,
    raise_stack: Vec<K>,
    // Recycled run-queue buffers, so steady-state raises do not
    // allocate.
    spare: Vec<Vec<Entry<Ctx>>>,
}

impl<K, Ctx> Default for QueueInner<K, Ctx> {
    fn default() -> Self {
        QueueInner {
            deferred: AHashMap::new(),
            immediate: AHashMap::new(),
            raise_stack: Vec::new(),
            spare: Vec::new(),
        }
    }
}

/// A per-key ordered queue of deferred commands with an immediate lane
/// and re-entrancy guards.
///
/// Generic over the key (any hashable token; a type-derived
/// [`QueueKey`](crate::world::QueueKey) in the world) and over the
/// execution context handed to commands. All methods take `&self`; the
/// queue uses interior mutability so commands running against the
/// context can still schedule onto it, under the guard rules.
pub struct ModifyQueue<K, Ctx> {
    inner: RefCell<QueueInner<K, Ctx>>,
    executing: Cell<bool>,
}

impl<K, Ctx> Default for ModifyQueue<K, Ctx> {
    fn default() -> Self {
        ModifyQueue {
            inner: RefCell::new(QueueInner::default()),
            executing: Cell::new(false),
        }
    }
}

impl<K, Ctx> ModifyQueue<K, Ctx>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a deferred command at timing 0.
    pub fn add<F>(&self, key: K, cmd: F) -> Result<(), EcsError>
    where
        F: FnOnce(&mut Ctx) -> Result<(), EcsError> + 'static,
    {
        self.add_with(key, cmd, Schedule::default())
    }

    /// Schedules a command.
    ///
    /// Fails with [`EcsError::LoopGuard`] while a command is executing
    /// (unless `ignore_loop`), and with
    /// [`EcsError::ImmediateNotPermitted`] for an immediate command
    /// whose key is not currently being raised (unless
    /// `ignore_immediate_check`).
    pub fn add_with<F>(&self, key: K, cmd: F, schedule: Schedule) -> Result<(), EcsError>
    where
        F: FnOnce(&mut Ctx) -> Result<(), EcsError> + 'static,
    {
        if self.executing.get() && !schedule.ignore_loop {
            return Err(EcsError::LoopGuard);
        }
        let mut inner = self.inner.borrow_mut();
        if schedule.immediate
            && !schedule.ignore_immediate_check
            && !inner.raise_stack.contains(&key)
        {
            return Err(EcsError::ImmediateNotPermitted);
        }
        let entry = Entry {
            timing: schedule.timing,
            cmd: Box::new(cmd),
        };
        let lane = if schedule.immediate {
            &mut inner.immediate
        } else {
            &mut inner.deferred
        };
        lane.entry(key).or_default().push(entry);
        Ok(())
    }

    /// Like [`add`](Self::add), but reports refusal as `false` instead
    /// of an error.
    pub fn try_add<F>(&self, key: K, cmd: F) -> bool
    where
        F: FnOnce(&mut Ctx) -> Result<(), EcsError> + 'static,
    {
        self.try_add_with(key, cmd, Schedule::default())
    }

    /// Like [`add_with`](Self::add_with), but reports refusal as
    /// `false` instead of an error.
    pub fn try_add_with<F>(&self, key: K, cmd: F, schedule: Schedule) -> bool
    where
        F: FnOnce(&mut Ctx) -> Result<(), EcsError> + 'static,
    {
        self.add_with(key, cmd, schedule).is_ok()
    }

    /// Drains and executes the key's queued commands against `ctx`.
    pub fn raise(&self, key: K, ctx: &mut Ctx) -> Result<(), EcsError> {
        self.raise_with(key, ctx, RaiseOptions::default())
    }

    /// Drains and executes the key's queued commands against `ctx`.
    ///
    /// The deferred lane is snapshotted and sorted by `timing` (stable,
    /// so ties keep insertion order). Before each deferred command the
    /// immediate lane is drained, lowest timing first; immediate
    /// commands scheduled during the raise (with `ignore_loop`) join
    /// that drain, while new deferred commands wait for the next
    /// raise. A failing command is logged and the raise continues.
    ///
    /// Fails with [`EcsError::Reentry`] if `key` is already being
    /// raised and `ignore_loop` is not set.
    pub fn raise_with(&self, key: K, ctx: &mut Ctx, options: RaiseOptions) -> Result<(), EcsError> {
        let mut run = {
            let mut inner = self.inner.borrow_mut();
            if !options.ignore_loop && inner.raise_stack.contains(&key) {
                return Err(EcsError::Reentry);
            }
            let mut run = inner.spare.pop().unwrap_or_default();
            if let Some(mut queued) = inner.deferred.remove(&key) {
                run.append(&mut queued);
                inner.spare.push(queued);
            }
            run.sort_by_key(|entry| entry.timing);
            // Executed back-to-front.
            run.reverse();
            inner.raise_stack.push(key.clone());
            run
        };

        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let immediate = if options.skip_immediate {
                    None
                } else {
                    inner.immediate.get_mut(&key).and_then(take_min_timing)
                };
                immediate.or_else(|| run.pop())
            };
            let Some(entry) = next else { break };

            let was_executing = self.executing.replace(true);
            if let Err(err) = entry.cmd.run(ctx) {
                match err {
                    // The target died between scheduling and raising;
                    // routine for deferred work.
                    EcsError::EntityInvalid(_) | EcsError::RefCut => {
                        warn!("modify command for key {:?} skipped: {}", key, err);
                    }
                    _ => error!("modify command for key {:?} failed: {}", key, err),
                }
            }
            self.executing.set(was_executing);
        }

        let mut inner = self.inner.borrow_mut();
        if let Some(pos) = inner.raise_stack.iter().rposition(|k| *k == key) {
            inner.raise_stack.remove(pos);
        }
        run.clear();
        inner.spare.push(run);
        Ok(())
    }

    /// Returns `true` while any key is being raised.
    pub fn raising(&self) -> bool {
        !self.inner.borrow().raise_stack.is_empty()
    }

    /// Returns `true` while a command is executing.
    pub fn executing(&self) -> bool {
        self.executing.get()
    }

    /// Returns `true` if `key` is currently on the raise stack.
    pub fn is_key_raising(&self, key: &K) -> bool {
        self.inner.borrow().raise_stack.contains(key)
    }

    /// Returns `true` if the key has queued commands on either lane.
    pub fn has_pending(&self, key: &K) -> bool {
        self.pending_len(key) != 0
    }

    /// Number of queued commands for the key, both lanes.
    pub fn pending_len(&self, key: &K) -> usize {
        let inner = self.inner.borrow();
        let lane_len = |lane: &AHashMap<K, Vec<Entry<Ctx>>>| {
            lane.get(key).map_or(0, |entries| entries.len())
        };
        lane_len(&inner.deferred) + lane_len(&inner.immediate)
    }
}

/// Removes the lowest-timing entry; the first of equal timings wins, so
/// immediates never reorder among themselves.
fn take_min_timing<Ctx>(entries: &mut Vec<Entry<Ctx>>) -> Option<Entry<Ctx>> {
    if entries.is_empty() {
        return None;
    }
    let mut best = 0;
    for i in 1..entries.len() {
        if entries[i].timing < entries[best].timing {
            best = i;
        }
    }
    Some(entries.remove(best))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    type Queue = ModifyQueue<&'static str, Vec<i32>>;

    fn push(value: i32) -> impl FnOnce(&mut Vec<i32>) -> Result<(), EcsError> + 'static {
        move |log: &mut Vec<i32>| {
            log.push(value);
            Ok(())
        }
    }

    #[test]
    fn deferred_commands_run_in_timing_order() {
        let queue = Queue::new();
        let mut log = Vec::new();

        queue.add_with("k", push(3), Schedule::at(5)).unwrap();
        queue.add_with("k", push(1), Schedule::at(-1)).unwrap();
        queue.add_with("k", push(2), Schedule::at(0)).unwrap();
        queue.raise("k", &mut log).unwrap();

        assert_eq!(log, vec![1, 2, 3]);
        assert!(!queue.has_pending(&"k"));
    }

    #[test]
    fn equal_timings_keep_insertion_order() {
        let queue = Queue::new();
        let mut log = Vec::new();

        for value in 0..5 {
            queue.add("k", push(value)).unwrap();
        }
        queue.raise("k", &mut log).unwrap();
        assert_eq!(log, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn keys_are_independent() {
        let queue = Queue::new();
        let mut log = Vec::new();

        queue.add("a", push(1)).unwrap();
        queue.add("b", push(2)).unwrap();
        queue.raise("a", &mut log).unwrap();

        assert_eq!(log, vec![1]);
        assert!(queue.has_pending(&"b"));
    }

    #[test]
    fn immediate_outside_raise_is_refused() {
        let queue = Queue::new();
        assert_eq!(
            queue.add_with("k", push(1), Schedule::immediate(0)).unwrap_err(),
            EcsError::ImmediateNotPermitted
        );
        assert!(!queue.try_add_with("k", push(1), Schedule::immediate(0)));

        // The explicit escape hatch still works.
        let mut schedule = Schedule::immediate(0);
        schedule.ignore_immediate_check = true;
        assert!(queue.try_add_with("k", push(1), schedule));
    }

    #[test]
    fn immediate_preempts_remaining_deferred() {
        let queue: Rc<Queue> = Rc::new(Queue::new());
        let mut log = Vec::new();

        let q = Rc::clone(&queue);
        queue
            .add("k", move |log: &mut Vec<i32>| {
                log.push(1);
                q.add_with(
                    "k",
                    push(2),
                    Schedule::immediate(0).ignoring_loop(),
                )?;
                Ok(())
            })
            .unwrap();
        queue.add_with("k", push(3), Schedule::at(1)).unwrap();

        queue.raise("k", &mut log).unwrap();
        assert_eq!(log, vec![1, 2, 3]);
    }

    #[test]
    fn loop_guard_blocks_adds_from_commands() {
        let queue: Rc<Queue> = Rc::new(Queue::new());
        let mut log = Vec::new();

        let q = Rc::clone(&queue);
        queue
            .add("k", move |log: &mut Vec<i32>| {
                assert_eq!(q.add("k", push(9)).unwrap_err(), EcsError::LoopGuard);
                assert!(!q.try_add("k", push(9)));
                assert!(q.executing());
                q.add_with("k", push(7), Schedule::at(0).ignoring_loop())?;
                log.push(1);
                Ok(())
            })
            .unwrap();

        queue.raise("k", &mut log).unwrap();
        // The escaped command waits for the next raise.
        assert_eq!(log, vec![1]);
        assert!(queue.has_pending(&"k"));

        queue.raise("k", &mut log).unwrap();
        assert_eq!(log, vec![1, 7]);
    }

    #[test]
    fn reentry_is_refused() {
        let queue: Rc<Queue> = Rc::new(Queue::new());
        let mut log = Vec::new();

        let q = Rc::clone(&queue);
        queue
            .add("k", move |log: &mut Vec<i32>| {
                assert!(q.is_key_raising(&"k"));
                assert_eq!(q.raise("k", log).unwrap_err(), EcsError::Reentry);
                // A different key may be raised from inside a command.
                q.add_with("other", push(5), Schedule::at(0).ignoring_loop())?;
                q.raise("other", log)?;
                Ok(())
            })
            .unwrap();

        queue.raise("k", &mut log).unwrap();
        assert_eq!(log, vec![5]);
        assert!(!queue.raising());
        assert!(!queue.executing());
    }

    #[test]
    fn failed_commands_do_not_abort_the_raise() {
        let queue = Queue::new();
        let mut log = Vec::new();

        queue
            .add("k", |_: &mut Vec<i32>| Err(EcsError::RefCut))
            .unwrap();
        queue.add("k", push(2)).unwrap();

        queue.raise("k", &mut log).unwrap();
        assert_eq!(log, vec![2]);
    }

    #[test]
    fn skip_immediate_leaves_the_lane_queued() {
        let queue = Queue::new();
        let mut log = Vec::new();

        let mut schedule = Schedule::immediate(0);
        schedule.ignore_immediate_check = true;
        queue.add_with("k", push(1), schedule).unwrap();
        queue.add("k", push(2)).unwrap();

        let options = RaiseOptions {
            skip_immediate: true,
            ..Default::default()
        };
        queue.raise_with("k", &mut log, options).unwrap();
        assert_eq!(log, vec![2]);
        assert!(queue.has_pending(&"k"));

        queue.raise("k", &mut log).unwrap();
        assert_eq!(log, vec![2, 1]);
    }

    #[test]
    fn immediates_drain_lowest_timing_first_without_reordering_ties() {
        let queue: Rc<Queue> = Rc::new(Queue::new());
        let mut log = Vec::new();

        let q = Rc::clone(&queue);
        queue
            .add("k", move |log: &mut Vec<i32>| {
                log.push(0);
                q.add_with("k", push(12), Schedule::immediate(2).ignoring_loop())?;
                q.add_with("k", push(10), Schedule::immediate(1).ignoring_loop())?;
                q.add_with("k", push(11), Schedule::immediate(1).ignoring_loop())?;
                Ok(())
            })
            .unwrap();

        queue.raise("k", &mut log).unwrap();
        assert_eq!(log, vec![0, 10, 11, 12]);
    }
}
