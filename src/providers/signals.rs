//! Player-defined global signals.
//!
//! `Signals.<Name>` reads a number that rules write with
//! `(act Signals.Set 'Name' value)`. Values are shared by every host, while
//! subscriptions are kept per host like any other provider.

use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::core::error::ScriptError;
use crate::core::types::{HostId, ListenerId};
use crate::script::defs::{ActionDef, SignalDef, ValueDef};
use crate::script::dispatcher::SignalDispatcher;
use crate::script::expr::{ActionExecutor, Eval, Expr, SignalSource};
use crate::script::provider::{ScriptableProvider, SignalListener, SignalSubscriptions};
use crate::script::value::ScriptValue;

const PROVIDER_NAME: &str = "Signals";
const SET_ACTION: &str = "Signals.Set";

struct SignalStore {
    values: RefCell<AHashMap<String, ScriptValue>>,
    subscriptions: SignalSubscriptions,
    dispatcher: Rc<SignalDispatcher>,
}

impl SignalStore {
    fn get(&self, local: &str) -> Option<ScriptValue> {
        self.values.borrow().get(local).cloned()
    }

    fn set(&self, local: &str, value: ScriptValue) -> Result<(), ScriptError> {
        let previous = self.values.borrow_mut().insert(local.to_string(), value.clone());
        if previous.as_ref() == Some(&value) {
            return Ok(());
        }
        let full_name = format!("{}.{}", PROVIDER_NAME, local);
        tracing::debug!(signal = %full_name, value = %value.to_literal(), "global signal changed");
        for host in self.subscriptions.hosts_for(&full_name) {
            self.subscriptions.notify(&self.dispatcher, &full_name, host)?;
        }
        Ok(())
    }
}

fn is_signal_name(local: &str) -> bool {
    let mut chars = local.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Local part of `Signals.<Name>`
fn local_name(name: &str) -> Result<&str, ScriptError> {
    name.strip_prefix(PROVIDER_NAME)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|local| is_signal_name(local))
        .ok_or_else(|| ScriptError::parsing(format!("Invalid global signal name '{}'", name)))
}

pub struct SignalsProvider {
    store: Rc<SignalStore>,
    set_def: Rc<ActionDef>,
}

impl SignalsProvider {
    pub fn new(dispatcher: Rc<SignalDispatcher>) -> Self {
        let name_arg = ValueDef::string().with_arg_validator(|expr| match expr {
            Expr::Constant(ScriptValue::String(name)) if !is_signal_name(name) => Err(
                ScriptError::parsing(format!("'{}' is not a valid signal name", name)),
            ),
            _ => Ok(()),
        });
        Self {
            store: Rc::new(SignalStore {
                values: RefCell::new(AHashMap::new()),
                subscriptions: SignalSubscriptions::new(),
                dispatcher,
            }),
            set_def: Rc::new(ActionDef::new(
                SET_ACTION,
                "Set global signal",
                vec![name_arg, ValueDef::number()],
            )),
        }
    }

    /// Current value of `Signals.<local>`
    pub fn get(&self, local: &str) -> Option<ScriptValue> {
        self.store.get(local)
    }

    /// Write a value, notifying listeners if it changed
    pub fn set(&self, local: &str, value: ScriptValue) -> Result<(), ScriptError> {
        if !is_signal_name(local) {
            return Err(ScriptError::runtime(format!(
                "'{}' is not a valid signal name",
                local
            )));
        }
        value.as_number()?;
        self.store.set(local, value)
    }
}

impl ScriptableProvider for SignalsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn signal_names(&self, _host: HostId) -> Vec<String> {
        self.store
            .values
            .borrow()
            .keys()
            .map(|local| format!("{}.{}", PROVIDER_NAME, local))
            .collect()
    }

    fn signal_source(&self, name: &str, _host: HostId) -> Result<SignalSource, ScriptError> {
        let local = local_name(name)?.to_string();
        let store = Rc::clone(&self.store);
        Ok(Rc::new(move || match store.get(&local) {
            Some(value) => Ok(Eval::Ready(value)),
            None => Ok(Eval::Interrupted(format!(
                "Global signal '{}' has not been set",
                local
            ))),
        }))
    }

    fn signal_definition(&self, name: &str, _host: HostId) -> Result<Rc<SignalDef>, ScriptError> {
        let local = local_name(name)?;
        Ok(Rc::new(SignalDef::new(name, local, ValueDef::number())))
    }

    fn action_names(&self, _host: HostId) -> Vec<String> {
        vec![SET_ACTION.to_string()]
    }

    fn action_executor(&self, name: &str, _host: HostId) -> Result<ActionExecutor, ScriptError> {
        if name != SET_ACTION {
            return Err(ScriptError::parsing(format!("Unknown action '{}'", name)));
        }
        let store = Rc::clone(&self.store);
        Ok(Rc::new(move |args: &[ScriptValue]| {
            let [local, value] = args else {
                return Err(ScriptError::runtime("Signals.Set expects 2 arguments"));
            };
            store.set(local.as_string()?, value.clone())?;
            Ok(Eval::Ready(()))
        }))
    }

    fn action_definition(&self, name: &str, _host: HostId) -> Result<Rc<ActionDef>, ScriptError> {
        if name != SET_ACTION {
            return Err(ScriptError::parsing(format!("Unknown action '{}'", name)));
        }
        Ok(Rc::clone(&self.set_def))
    }

    fn register_signal_change_callback(
        &self,
        name: &str,
        host: HostId,
        listener: Rc<dyn SignalListener>,
    ) -> Result<(), ScriptError> {
        local_name(name)?;
        self.store.subscriptions.add(name, host, listener);
        Ok(())
    }

    fn unregister_signal_change_callback(&self, name: &str, host: HostId, listener: ListenerId) {
        self.store.subscriptions.remove(name, host, listener);
    }
}
