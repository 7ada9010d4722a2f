//! A small synchronous signal dispatcher.
//!
//! Receivers are `Rc` callbacks; pointer identity is what makes a
//! receiver "the same" for duplicate detection and disconnection.
//! Raising a signal calls the receivers in registration order against
//! a snapshot, so receivers may connect or disconnect mid-raise
//! without invalidating the dispatch in flight.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use crate::error::EcsError;

/// The callback type a [`Signal`] dispatches to.
pub type SignalReceiver<A> = Rc<dyn Fn(&A)>;

struct SignalInner<A> {
    receivers: Vec<SignalReceiver<A>>,
    allow_duplication: bool,
}

/// An ordered, synchronous fan-out of `&A` notifications.
pub struct Signal<A> {
    inner: Rc<RefCell<SignalInner<A>>>,
}

impl<A: 'static> Default for Signal<A> {
    fn default() -> Self {
        Signal::new(false)
    }
}

// Cloning shares the receiver list; a signal handle is cheap to pass
// around.
impl<A> Clone for Signal<A> {
    fn clone(&self) -> Self {
        Signal {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: 'static> Signal<A> {
    /// Creates a signal. With `allow_duplication` the same receiver may
    /// be connected more than once and will be called once per
    /// connection.
    pub fn new(allow_duplication: bool) -> Self {
        Signal {
            inner: Rc::new(RefCell::new(SignalInner {
                receivers: Vec::new(),
                allow_duplication,
            })),
        }
    }

    /// Connects a receiver.
    ///
    /// Fails with [`EcsError::DuplicateSubscription`] if the same `Rc`
    /// is already connected and the signal does not allow duplication.
    pub fn connect(&self, receiver: SignalReceiver<A>) -> Result<SignalDisposal<A>, EcsError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.allow_duplication
            && inner.receivers.iter().any(|r| Rc::ptr_eq(r, &receiver))
        {
            return Err(EcsError::DuplicateSubscription);
        }
        let disposal = SignalDisposal {
            signal: Rc::downgrade(&self.inner),
            receiver: Rc::downgrade(&receiver),
        };
        inner.receivers.push(receiver);
        Ok(disposal)
    }

    /// Wraps a closure in a fresh `Rc` and connects it. A fresh `Rc`
    /// can never be a duplicate, so this cannot fail.
    pub fn connect_fn<F>(&self, f: F) -> SignalDisposal<A>
    where
        F: Fn(&A) + 'static,
    {
        let receiver: SignalReceiver<A> = Rc::new(f);
        let disposal = SignalDisposal {
            signal: Rc::downgrade(&self.inner),
            receiver: Rc::downgrade(&receiver),
        };
        self.inner.borrow_mut().receivers.push(receiver);
        disposal
    }

    /// Disconnects the first connection of `receiver`. Returns whether
    /// anything was removed.
    pub fn disconnect(&self, receiver: &SignalReceiver<A>) -> bool {
        let mut inner = self.inner.borrow_mut();
        match inner.receivers.iter().position(|r| Rc::ptr_eq(r, receiver)) {
            Some(pos) => {
                inner.receivers.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Calls every receiver with `arg`, in registration order.
    pub fn raise(&self, arg: &A) {
        // Snapshot so receivers can connect/disconnect while we
        // dispatch.
        let snapshot: Vec<SignalReceiver<A>> = self.inner.borrow().receivers.clone();
        for receiver in snapshot {
            receiver(arg);
        }
    }

    /// Number of connected receivers.
    pub fn receiver_count(&self) -> usize {
        self.inner.borrow().receivers.len()
    }
}

/// A disposable token for one signal connection.
///
/// Holds weak references only: if the signal or the receiver is
/// already gone by the time `dispose` runs, disposal is a no-op.
#[derive(Debug)]
pub struct SignalDisposal<A> {
    signal: Weak<RefCell<SignalInner<A>>>,
    receiver: Weak<dyn Fn(&A)>,
}

impl<A> SignalDisposal<A> {
    /// Severs the connection this token was issued for.
    pub fn dispose(self) {
        let (Some(signal), Some(receiver)) = (self.signal.upgrade(), self.receiver.upgrade())
        else {
            return;
        };
        let mut inner = signal.borrow_mut();
        if let Some(pos) = inner.receivers.iter().position(|r| Rc::ptr_eq(r, &receiver)) {
            inner.receivers.remove(pos);
        }
    }
}
