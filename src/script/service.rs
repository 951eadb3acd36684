//! Provider registry and reactive dispatch entry point.
//!
//! Names are `Provider.Local`; the part before the first dot selects the
//! provider, which receives the full name.

use ahash::AHashMap;
use std::rc::Rc;

use crate::core::config::EngineConfig;
use crate::core::error::ScriptError;
use crate::core::types::{HostId, ListenerId};
use crate::script::defs::{ActionDef, SignalDef};
use crate::script::dispatcher::SignalDispatcher;
use crate::script::expr::{ActionExecutor, SignalSource};
use crate::script::parser::ExpressionParser;
use crate::script::provider::{ScriptableProvider, SignalCallback, SignalListener};

/// Registry of scripting providers
pub struct ScriptingService {
    /// Providers indexed by name
    providers: AHashMap<String, Rc<dyn ScriptableProvider>>,
    /// Shared with providers that push signal changes
    dispatcher: Rc<SignalDispatcher>,
    config: EngineConfig,
}

impl ScriptingService {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            providers: AHashMap::new(),
            dispatcher: Rc::new(SignalDispatcher::new(config.callback_queue_limit)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Dispatcher handle for providers created outside the service
    pub fn dispatcher(&self) -> Rc<SignalDispatcher> {
        Rc::clone(&self.dispatcher)
    }

    /// Register a provider under its own name.
    ///
    /// # Panics
    ///
    /// Registering two providers with the same name is a wiring bug in the
    /// embedding application and panics.
    pub fn register_provider(&mut self, provider: Rc<dyn ScriptableProvider>) {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            panic!("Scripting provider '{}' is already registered", name);
        }
        tracing::info!(provider = %name, "registered scripting provider");
        self.providers.insert(name, provider);
    }

    /// Registered provider names, sorted
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    fn provider_for(&self, name: &str) -> Result<&Rc<dyn ScriptableProvider>, ScriptError> {
        let (prefix, _) = name.split_once('.').ok_or_else(|| {
            ScriptError::parsing(format!("Name '{}' has no provider prefix", name))
        })?;
        self.providers
            .get(prefix)
            .ok_or_else(|| ScriptError::parsing(format!("Unknown provider '{}' in '{}'", prefix, name)))
    }

    pub fn get_signal_source(&self, name: &str, host: HostId) -> Result<SignalSource, ScriptError> {
        self.provider_for(name)?.signal_source(name, host)
    }

    pub fn get_signal_definition(&self, name: &str, host: HostId) -> Result<Rc<SignalDef>, ScriptError> {
        self.provider_for(name)?.signal_definition(name, host)
    }

    pub fn get_action_executor(&self, name: &str, host: HostId) -> Result<ActionExecutor, ScriptError> {
        self.provider_for(name)?.action_executor(name, host)
    }

    pub fn get_action_definition(&self, name: &str, host: HostId) -> Result<Rc<ActionDef>, ScriptError> {
        self.provider_for(name)?.action_definition(name, host)
    }

    /// Every signal any provider offers for `host`, sorted
    pub fn signal_names_for_host(&self, host: HostId) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .values()
            .flat_map(|p| p.signal_names(host))
            .collect();
        names.sort();
        names
    }

    /// Every action any provider offers for `host`, sorted
    pub fn action_names_for_host(&self, host: HostId) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .values()
            .flat_map(|p| p.action_names(host))
            .collect();
        names.sort();
        names
    }

    pub fn register_signal_change_callback(
        &self,
        name: &str,
        host: HostId,
        listener: Rc<dyn SignalListener>,
    ) -> Result<(), ScriptError> {
        self.provider_for(name)?
            .register_signal_change_callback(name, host, listener)
    }

    pub fn unregister_signal_change_callback(&self, name: &str, host: HostId, listener: ListenerId) {
        match self.provider_for(name) {
            Ok(provider) => provider.unregister_signal_change_callback(name, host, listener),
            Err(err) => tracing::warn!(signal = name, error = %err, "cannot unregister callback"),
        }
    }

    /// Queue and run one callback; see [`SignalDispatcher::schedule`]
    pub fn schedule_signal_callback(&self, callback: SignalCallback) -> Result<(), ScriptError> {
        self.dispatcher.schedule(callback)
    }

    pub fn install_action(&self, name: &str, host: HostId) -> Result<(), ScriptError> {
        self.provider_for(name)?.install_action(name, host)
    }

    pub fn uninstall_action(&self, name: &str, host: HostId) {
        match self.provider_for(name) {
            Ok(provider) => provider.uninstall_action(name, host),
            Err(err) => tracing::warn!(action = name, error = %err, "cannot uninstall action"),
        }
    }

    /// Parser that binds expressions to `host`
    pub fn parser(&self, host: HostId) -> ExpressionParser<'_> {
        ExpressionParser::new(self, host)
    }
}
