//! Reactive signal dispatch.
//!
//! Listeners run synchronously on the caller's stack. A listener may change
//! another signal and schedule more callbacks while it is still running, so
//! the pending queue mirrors the active propagation chain. Scheduling a
//! `(signal, listener)` pair that is already pending means the chain feeds
//! back into itself; that is reported instead of recursing forever.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::iter;

use crate::core::error::ScriptError;
use crate::core::types::ListenerId;
use crate::script::provider::SignalCallback;

pub struct SignalDispatcher {
    pending: RefCell<VecDeque<SignalCallback>>,
    limit: usize,
    /// Invoked listeners that returned an error, cycles excluded
    listener_failures: Cell<u64>,
    /// The current chain is unwinding from a detected cycle
    circular: Cell<bool>,
}

impl SignalDispatcher {
    pub fn new(limit: usize) -> Self {
        Self {
            pending: RefCell::new(VecDeque::new()),
            limit,
            listener_failures: Cell::new(0),
            circular: Cell::new(false),
        }
    }

    /// Number of listener failures seen so far.
    ///
    /// A caller that triggered callbacks compares this before and after to
    /// tell an error raised by a downstream listener from its own. Errors
    /// caused by a cycle are not counted: every listener on the loop owns them.
    pub fn listener_failures(&self) -> u64 {
        self.listener_failures.get()
    }

    /// Queue a callback and run it.
    ///
    /// On success the callback is removed from the pending queue. If the
    /// listener fails, the whole pending queue is discarded: a broken link
    /// aborts the entire propagation chain for this tick.
    pub fn schedule(&self, callback: SignalCallback) -> Result<(), ScriptError> {
        {
            let mut pending = self.pending.borrow_mut();
            if pending.is_empty() {
                self.circular.set(false);
            }
            if pending.contains(&callback) {
                let chain = pending
                    .iter()
                    .map(|c| c.signal_name.as_str())
                    .chain(iter::once(callback.signal_name.as_str()))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                tracing::warn!(signal = %callback.signal_name, %chain, "circular signal execution");
                self.circular.set(true);
                return Err(ScriptError::runtime(format!(
                    "Circular execution of signal '{}': {}",
                    callback.signal_name, chain
                )));
            }
            if pending.len() >= self.limit {
                return Err(ScriptError::runtime(format!(
                    "Signal callback queue exceeded {} entries at '{}'",
                    self.limit, callback.signal_name
                )));
            }
            pending.push_back(callback.clone());
        }

        tracing::debug!(signal = %callback.signal_name, listener = %callback.listener.listener_id(), "dispatching signal callback");
        match callback.invoke() {
            Ok(()) => {
                let mut pending = self.pending.borrow_mut();
                if let Some(pos) = pending.iter().rposition(|c| *c == callback) {
                    pending.remove(pos);
                }
                Ok(())
            }
            Err(err) => {
                if !self.circular.get() {
                    self.listener_failures.set(self.listener_failures.get() + 1);
                }
                let dropped = {
                    let mut pending = self.pending.borrow_mut();
                    let dropped = pending.len();
                    pending.clear();
                    dropped
                };
                if dropped > 0 {
                    tracing::warn!(
                        signal = %callback.signal_name,
                        dropped,
                        error = %err,
                        "signal callback failed, discarding pending chain"
                    );
                }
                Err(err)
            }
        }
    }

    /// Pending `(signal, listener)` pairs, oldest first
    pub fn pending(&self) -> Vec<(String, ListenerId)> {
        self.pending
            .borrow()
            .iter()
            .map(|c| (c.signal_name.clone(), c.listener.listener_id()))
            .collect()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::provider::SignalListener;
    use std::cell::Cell;
    use std::rc::{Rc, Weak};

    /// Listener that records the pending queue it saw and optionally chains
    struct Recorder {
        id: ListenerId,
        dispatcher: Weak<SignalDispatcher>,
        next: RefCell<Option<(String, Rc<dyn SignalListener>)>>,
        fail: bool,
        runs: Cell<u32>,
        seen: RefCell<Vec<Vec<(String, ListenerId)>>>,
    }

    impl Recorder {
        fn new(dispatcher: &Rc<SignalDispatcher>, fail: bool) -> Rc<Self> {
            Rc::new(Self {
                id: ListenerId::next(),
                dispatcher: Rc::downgrade(dispatcher),
                next: RefCell::new(None),
                fail,
                runs: Cell::new(0),
                seen: RefCell::new(Vec::new()),
            })
        }

        fn chain_to(&self, signal: &str, listener: Rc<dyn SignalListener>) {
            *self.next.borrow_mut() = Some((signal.to_string(), listener));
        }
    }

    impl SignalListener for Recorder {
        fn listener_id(&self) -> ListenerId {
            self.id
        }

        fn on_signal_changed(&self, _signal_name: &str) -> Result<(), ScriptError> {
            self.runs.set(self.runs.get() + 1);
            let dispatcher = self.dispatcher.upgrade().unwrap();
            self.seen.borrow_mut().push(dispatcher.pending());
            if self.fail {
                return Err(ScriptError::runtime("listener failed"));
            }
            let next = self.next.borrow_mut().take();
            if let Some((signal, listener)) = next {
                dispatcher.schedule(SignalCallback::new(signal, listener))?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_single_callback_runs_and_clears() {
        let dispatcher = Rc::new(SignalDispatcher::new(16));
        let recorder = Recorder::new(&dispatcher, false);

        dispatcher
            .schedule(SignalCallback::new("A.X", recorder.clone()))
            .unwrap();

        assert_eq!(recorder.runs.get(), 1);
        assert_eq!(recorder.seen.borrow()[0], vec![("A.X".to_string(), recorder.id)]);
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn test_chained_callbacks_queue_in_order() {
        let dispatcher = Rc::new(SignalDispatcher::new(16));
        let first = Recorder::new(&dispatcher, false);
        let second = Recorder::new(&dispatcher, false);
        first.chain_to("A.Y", second.clone());

        dispatcher
            .schedule(SignalCallback::new("A.X", first.clone()))
            .unwrap();

        assert_eq!(
            second.seen.borrow()[0],
            vec![("A.X".to_string(), first.id), ("A.Y".to_string(), second.id)]
        );
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn test_cycle_is_detected() {
        let dispatcher = Rc::new(SignalDispatcher::new(16));
        let first = Recorder::new(&dispatcher, false);
        let second = Recorder::new(&dispatcher, false);
        first.chain_to("A.Y", second.clone());
        second.chain_to("A.X", first.clone());

        let err = dispatcher
            .schedule(SignalCallback::new("A.X", first.clone()))
            .unwrap_err();

        assert!(err.is_runtime());
        assert!(err.to_string().contains("A.X -> A.Y -> A.X"));
        assert_eq!(first.runs.get(), 1);
        assert_eq!(second.runs.get(), 1);
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn test_same_listener_on_other_signal_is_not_a_cycle() {
        let dispatcher = Rc::new(SignalDispatcher::new(16));
        let recorder = Recorder::new(&dispatcher, false);
        let other = Recorder::new(&dispatcher, false);
        recorder.chain_to("A.Other", other.clone());
        other.chain_to("A.Third", recorder.clone());

        dispatcher
            .schedule(SignalCallback::new("A.X", recorder.clone()))
            .unwrap();
        assert_eq!(recorder.runs.get(), 2);
    }

    #[test]
    fn test_failure_discards_rest_of_chain() {
        let dispatcher = Rc::new(SignalDispatcher::new(16));
        let first = Recorder::new(&dispatcher, false);
        let second = Recorder::new(&dispatcher, true);
        let third = Recorder::new(&dispatcher, false);
        first.chain_to("A.Y", second.clone());
        second.chain_to("A.Z", third.clone());

        let err = dispatcher
            .schedule(SignalCallback::new("A.X", first.clone()))
            .unwrap_err();

        assert_eq!(err, ScriptError::runtime("listener failed"));
        assert_eq!(second.runs.get(), 1);
        assert_eq!(third.runs.get(), 0);
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn test_failures_are_counted_except_cycles() {
        let dispatcher = Rc::new(SignalDispatcher::new(16));
        let first = Recorder::new(&dispatcher, false);
        let second = Recorder::new(&dispatcher, true);
        first.chain_to("A.Y", second.clone());
        dispatcher
            .schedule(SignalCallback::new("A.X", first.clone()))
            .unwrap_err();
        // the failing listener and the one that scheduled it
        assert_eq!(dispatcher.listener_failures(), 2);

        let a = Recorder::new(&dispatcher, false);
        let b = Recorder::new(&dispatcher, false);
        a.chain_to("A.B", b.clone());
        b.chain_to("A.A", a.clone());
        dispatcher
            .schedule(SignalCallback::new("A.A", a.clone()))
            .unwrap_err();
        assert_eq!(dispatcher.listener_failures(), 2);

        // a fresh chain counts again
        let c = Recorder::new(&dispatcher, true);
        dispatcher
            .schedule(SignalCallback::new("A.C", c.clone()))
            .unwrap_err();
        assert_eq!(dispatcher.listener_failures(), 3);
    }

    #[test]
    fn test_queue_limit() {
        let dispatcher = Rc::new(SignalDispatcher::new(2));
        let a = Recorder::new(&dispatcher, false);
        let b = Recorder::new(&dispatcher, false);
        let c = Recorder::new(&dispatcher, false);
        a.chain_to("A.B", b.clone());
        b.chain_to("A.C", c.clone());

        let err = dispatcher
            .schedule(SignalCallback::new("A.A", a.clone()))
            .unwrap_err();
        assert!(err.to_string().contains("exceeded 2"));
        assert_eq!(c.runs.get(), 0);
        assert!(dispatcher.is_idle());
    }
}
