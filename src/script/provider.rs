//! Contract between the engine and the systems that expose signals/actions.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::core::error::ScriptError;
use crate::core::types::{HostId, ListenerId};
use crate::script::defs::{ActionDef, SignalDef};
use crate::script::dispatcher::SignalDispatcher;
use crate::script::expr::{ActionExecutor, SignalSource};

/// Something that wants to know when a signal on a host changes
pub trait SignalListener {
    fn listener_id(&self) -> ListenerId;

    /// Called synchronously by the dispatcher. May schedule further callbacks.
    fn on_signal_changed(&self, signal_name: &str) -> Result<(), ScriptError>;
}

/// One outstanding reactive notification
#[derive(Clone)]
pub struct SignalCallback {
    pub signal_name: String,
    pub listener: Rc<dyn SignalListener>,
}

impl SignalCallback {
    pub fn new(signal_name: impl Into<String>, listener: Rc<dyn SignalListener>) -> Self {
        Self {
            signal_name: signal_name.into(),
            listener,
        }
    }

    pub fn invoke(&self) -> Result<(), ScriptError> {
        self.listener.on_signal_changed(&self.signal_name)
    }
}

impl PartialEq for SignalCallback {
    fn eq(&self, other: &Self) -> bool {
        self.signal_name == other.signal_name
            && self.listener.listener_id() == other.listener.listener_id()
    }
}

impl fmt::Debug for SignalCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.signal_name, self.listener.listener_id())
    }
}

/// A named family of signals and actions.
///
/// Names passed in are full dotted names (`Provider.Local`). Every lookup
/// fails with [`ScriptError::Parsing`] when the name is unknown to the
/// provider, or [`ScriptError::BadState`] when the host cannot support it
/// right now.
pub trait ScriptableProvider {
    /// Registration key; the prefix of every signal and action name
    fn name(&self) -> &str;

    fn signal_names(&self, host: HostId) -> Vec<String>;

    fn signal_source(&self, name: &str, host: HostId) -> Result<SignalSource, ScriptError>;

    fn signal_definition(&self, name: &str, host: HostId) -> Result<Rc<SignalDef>, ScriptError>;

    fn action_names(&self, host: HostId) -> Vec<String>;

    fn action_executor(&self, name: &str, host: HostId) -> Result<ActionExecutor, ScriptError>;

    fn action_definition(&self, name: &str, host: HostId) -> Result<Rc<ActionDef>, ScriptError>;

    /// Subscribe to value changes. The provider must only notify on actual changes.
    fn register_signal_change_callback(
        &self,
        name: &str,
        host: HostId,
        listener: Rc<dyn SignalListener>,
    ) -> Result<(), ScriptError>;

    fn unregister_signal_change_callback(&self, name: &str, host: HostId, listener: ListenerId);

    /// Attach whatever per-host state the action needs
    fn install_action(&self, _name: &str, _host: HostId) -> Result<(), ScriptError> {
        Ok(())
    }

    fn uninstall_action(&self, _name: &str, _host: HostId) {}
}

struct Subscription {
    signal: String,
    host: HostId,
    listeners: Vec<Rc<dyn SignalListener>>,
}

/// Listener bookkeeping shared by provider implementations.
///
/// Entries stay in subscription order, so notifications are deterministic.
#[derive(Default)]
pub struct SignalSubscriptions {
    entries: RefCell<Vec<Subscription>>,
}

impl SignalSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &str, host: HostId, listener: Rc<dyn SignalListener>) {
        let mut entries = self.entries.borrow_mut();
        match entries
            .iter_mut()
            .find(|entry| entry.host == host && entry.signal == name)
        {
            Some(entry) => {
                if !entry
                    .listeners
                    .iter()
                    .any(|l| l.listener_id() == listener.listener_id())
                {
                    entry.listeners.push(listener);
                }
            }
            None => entries.push(Subscription {
                signal: name.to_string(),
                host,
                listeners: vec![listener],
            }),
        }
    }

    pub fn remove(&self, name: &str, host: HostId, listener: ListenerId) {
        let mut entries = self.entries.borrow_mut();
        for entry in entries
            .iter_mut()
            .filter(|entry| entry.host == host && entry.signal == name)
        {
            entry.listeners.retain(|l| l.listener_id() != listener);
        }
        entries.retain(|entry| !entry.listeners.is_empty());
    }

    /// Snapshot, so listeners may unsubscribe while being notified
    pub fn listeners(&self, name: &str, host: HostId) -> Vec<Rc<dyn SignalListener>> {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.host == host && entry.signal == name)
            .map(|entry| entry.listeners.clone())
            .unwrap_or_default()
    }

    /// Hosts with at least one listener on `name`, in subscription order
    pub fn hosts_for(&self, name: &str) -> Vec<HostId> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.signal == name)
            .map(|entry| entry.host)
            .collect()
    }

    pub fn count(&self, name: &str, host: HostId) -> usize {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.host == host && entry.signal == name)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Schedule a callback for every listener of `name` on `host`.
    ///
    /// Stops at the first failure; the dispatcher has already dropped the
    /// rest of the pending chain by then.
    pub fn notify(
        &self,
        dispatcher: &SignalDispatcher,
        name: &str,
        host: HostId,
    ) -> Result<(), ScriptError> {
        for listener in self.listeners(name, host) {
            dispatcher.schedule(SignalCallback::new(name, listener))?;
        }
        Ok(())
    }
}
