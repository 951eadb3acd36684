//! Diagnostics for rule authors: a log action and a tick counter signal.

use std::cell::Cell;
use std::rc::Rc;

use crate::core::error::ScriptError;
use crate::core::types::{HostId, ListenerId};
use crate::script::defs::{ActionDef, SignalDef, ValueDef};
use crate::script::dispatcher::SignalDispatcher;
use crate::script::expr::{ActionExecutor, Eval, SignalSource};
use crate::script::provider::{ScriptableProvider, SignalListener, SignalSubscriptions};
use crate::script::value::ScriptValue;

const PROVIDER_NAME: &str = "Debug";
const TICKER_SIGNAL: &str = "Debug.Ticker";
const LOG_ACTION: &str = "Debug.Log";

struct Ticker {
    tick: Cell<i32>,
    subscriptions: SignalSubscriptions,
    dispatcher: Rc<SignalDispatcher>,
}

pub struct DebugProvider {
    ticker: Rc<Ticker>,
    ticker_def: Rc<SignalDef>,
    log_def: Rc<ActionDef>,
}

impl DebugProvider {
    pub fn new(dispatcher: Rc<SignalDispatcher>) -> Self {
        Self {
            ticker: Rc::new(Ticker {
                tick: Cell::new(0),
                subscriptions: SignalSubscriptions::new(),
                dispatcher,
            }),
            ticker_def: Rc::new(SignalDef::new(
                TICKER_SIGNAL,
                "Debug ticker",
                ValueDef::number().with_formatter(|v| format!("tick {}", v.as_int().unwrap_or(0))),
            )),
            log_def: Rc::new(ActionDef::new(LOG_ACTION, "Log", vec![ValueDef::string()])),
        }
    }

    pub fn tick(&self) -> i32 {
        self.ticker.tick.get()
    }

    /// Advance the ticker and notify every host listening to it
    pub fn advance_tick(&self) -> Result<(), ScriptError> {
        let tick = self.ticker.tick.get().saturating_add(1);
        self.ticker.tick.set(tick);
        for host in self.ticker.subscriptions.hosts_for(TICKER_SIGNAL) {
            self.ticker
                .subscriptions
                .notify(&self.ticker.dispatcher, TICKER_SIGNAL, host)?;
        }
        Ok(())
    }

    fn check_signal(name: &str) -> Result<(), ScriptError> {
        if name == TICKER_SIGNAL {
            Ok(())
        } else {
            Err(ScriptError::parsing(format!("Unknown signal '{}'", name)))
        }
    }

    fn check_action(name: &str) -> Result<(), ScriptError> {
        if name == LOG_ACTION {
            Ok(())
        } else {
            Err(ScriptError::parsing(format!("Unknown action '{}'", name)))
        }
    }
}

impl ScriptableProvider for DebugProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn signal_names(&self, _host: HostId) -> Vec<String> {
        vec![TICKER_SIGNAL.to_string()]
    }

    fn signal_source(&self, name: &str, _host: HostId) -> Result<SignalSource, ScriptError> {
        Self::check_signal(name)?;
        let ticker = Rc::clone(&self.ticker);
        Ok(Rc::new(move || Ok(Eval::Ready(ScriptValue::from_int(ticker.tick.get())))))
    }

    fn signal_definition(&self, name: &str, _host: HostId) -> Result<Rc<SignalDef>, ScriptError> {
        Self::check_signal(name)?;
        Ok(Rc::clone(&self.ticker_def))
    }

    fn action_names(&self, _host: HostId) -> Vec<String> {
        vec![LOG_ACTION.to_string()]
    }

    fn action_executor(&self, name: &str, host: HostId) -> Result<ActionExecutor, ScriptError> {
        Self::check_action(name)?;
        Ok(Rc::new(move |args: &[ScriptValue]| {
            let message = args
                .first()
                .ok_or_else(|| ScriptError::runtime("Debug.Log expects a message"))?
                .as_string()?;
            tracing::info!(%host, "{}", message);
            Ok(Eval::Ready(()))
        }))
    }

    fn action_definition(&self, name: &str, _host: HostId) -> Result<Rc<ActionDef>, ScriptError> {
        Self::check_action(name)?;
        Ok(Rc::clone(&self.log_def))
    }

    fn register_signal_change_callback(
        &self,
        name: &str,
        host: HostId,
        listener: Rc<dyn SignalListener>,
    ) -> Result<(), ScriptError> {
        Self::check_signal(name)?;
        self.ticker.subscriptions.add(name, host, listener);
        Ok(())
    }

    fn unregister_signal_change_callback(&self, name: &str, host: HostId, listener: ListenerId) {
        self.ticker.subscriptions.remove(name, host, listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_advances() {
        let provider = DebugProvider::new(Rc::new(SignalDispatcher::new(4)));
        let source = provider.signal_source(TICKER_SIGNAL, HostId::new()).unwrap();
        assert_eq!(source().unwrap(), Eval::Ready(ScriptValue::from_int(0)));

        provider.advance_tick().unwrap();
        provider.advance_tick().unwrap();
        assert_eq!(provider.tick(), 2);
        assert_eq!(source().unwrap(), Eval::Ready(ScriptValue::from_int(2)));
        assert_eq!(
            provider.ticker_def.result.format(&ScriptValue::from_int(2)),
            "tick 2"
        );
    }

    #[test]
    fn test_log_action() {
        let provider = DebugProvider::new(Rc::new(SignalDispatcher::new(4)));
        let log = provider.action_executor(LOG_ACTION, HostId::new()).unwrap();
        assert!(log(&[ScriptValue::of_string("hello")]).unwrap().is_ready());
        assert!(log(&[]).unwrap_err().is_runtime());
        assert!(provider.action_executor("Debug.Crash", HostId::new()).is_err());
    }
}
