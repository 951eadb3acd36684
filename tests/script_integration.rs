//! Scripting engine integration tests
//!
//! A small power grid and inventory stand in for game systems, so parsing,
//! evaluation and reactive dispatch run through real provider plumbing.

use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;

use signal_automation::automation::{RuleBook, RuleState, ScriptedRule};
use signal_automation::core::{logging, EngineConfig, HostId, ListenerId, ScriptError};
use signal_automation::providers::SignalsProvider;
use signal_automation::script::*;
use signal_automation::templating::RuleRecord;

struct GridState {
    supply: RefCell<AHashMap<HostId, i32>>,
    batteries: RefCell<Vec<HostId>>,
    subscriptions: SignalSubscriptions,
    dispatcher: Rc<SignalDispatcher>,
}

/// `Power.Supply` per host, `Power.Battery` only on hosts with a battery
struct PowerGrid {
    state: Rc<GridState>,
    supply_def: Rc<SignalDef>,
    battery_def: Rc<SignalDef>,
}

impl PowerGrid {
    fn new(dispatcher: Rc<SignalDispatcher>) -> Self {
        Self {
            state: Rc::new(GridState {
                supply: RefCell::new(AHashMap::new()),
                batteries: RefCell::new(Vec::new()),
                subscriptions: SignalSubscriptions::new(),
                dispatcher,
            }),
            supply_def: Rc::new(SignalDef::new(
                "Power.Supply",
                "Supply",
                ValueDef::number().with_formatter(|v| format!("{} kW", format_fixed(v.as_number().unwrap_or(0)))),
            )),
            battery_def: Rc::new(SignalDef::new("Power.Battery", "Battery", ValueDef::number())),
        }
    }

    fn set_supply(&self, host: HostId, fixed: i32) -> Result<(), ScriptError> {
        let previous = self.state.supply.borrow_mut().insert(host, fixed);
        if previous == Some(fixed) {
            return Ok(());
        }
        self.state
            .subscriptions
            .notify(&self.state.dispatcher, "Power.Supply", host)
    }

    fn add_battery(&self, host: HostId) {
        self.state.batteries.borrow_mut().push(host);
    }

    fn listeners(&self, host: HostId) -> usize {
        self.state.subscriptions.count("Power.Supply", host)
    }
}

impl ScriptableProvider for PowerGrid {
    fn name(&self) -> &str {
        "Power"
    }

    fn signal_names(&self, host: HostId) -> Vec<String> {
        let mut names = vec!["Power.Supply".to_string()];
        if self.state.batteries.borrow().contains(&host) {
            names.push("Power.Battery".to_string());
        }
        names
    }

    fn signal_source(&self, name: &str, host: HostId) -> Result<SignalSource, ScriptError> {
        self.signal_definition(name, host)?;
        if name == "Power.Battery" {
            return Ok(Rc::new(|| Ok(Eval::Ready(ScriptValue::from_int(1)))));
        }
        let state = Rc::clone(&self.state);
        Ok(Rc::new(move || {
            let supply = state.supply.borrow().get(&host).copied().unwrap_or(0);
            Ok(Eval::Ready(ScriptValue::of_number(supply)))
        }))
    }

    fn signal_definition(&self, name: &str, host: HostId) -> Result<Rc<SignalDef>, ScriptError> {
        match name {
            "Power.Supply" => Ok(Rc::clone(&self.supply_def)),
            "Power.Battery" if self.state.batteries.borrow().contains(&host) => {
                Ok(Rc::clone(&self.battery_def))
            }
            "Power.Battery" => Err(ScriptError::bad_state("Building has no battery")),
            _ => Err(ScriptError::parsing(format!("Unknown signal '{}'", name))),
        }
    }

    fn action_names(&self, _host: HostId) -> Vec<String> {
        Vec::new()
    }

    fn action_executor(&self, name: &str, _host: HostId) -> Result<ActionExecutor, ScriptError> {
        Err(ScriptError::parsing(format!("Unknown action '{}'", name)))
    }

    fn action_definition(&self, name: &str, _host: HostId) -> Result<Rc<ActionDef>, ScriptError> {
        Err(ScriptError::parsing(format!("Unknown action '{}'", name)))
    }

    fn register_signal_change_callback(
        &self,
        name: &str,
        host: HostId,
        listener: Rc<dyn SignalListener>,
    ) -> Result<(), ScriptError> {
        self.signal_definition(name, host)?;
        self.state.subscriptions.add(name, host, listener);
        Ok(())
    }

    fn unregister_signal_change_callback(&self, name: &str, host: HostId, listener: ListenerId) {
        self.state.subscriptions.remove(name, host, listener);
    }
}

/// `Inventory.Take(good, amount)` with an enumerated, renamed good type
struct Inventory {
    taken: Rc<RefCell<Vec<(String, i32)>>>,
    installed: RefCell<Vec<HostId>>,
    take_def: Rc<ActionDef>,
    selected_def: Rc<SignalDef>,
}

fn good_def() -> ValueDef {
    ValueDef::string()
        .with_options(&[("Log", "Logs"), ("Plank", "Planks")])
        .with_compatibility(&[("Logs", "Log")])
}

impl Inventory {
    fn new() -> Self {
        Self {
            taken: Rc::new(RefCell::new(Vec::new())),
            installed: RefCell::new(Vec::new()),
            take_def: Rc::new(ActionDef::new(
                "Inventory.Take",
                "Take",
                vec![good_def(), ValueDef::number().with_range(0, 10000)],
            )),
            selected_def: Rc::new(SignalDef::new("Inventory.Selected", "Selected good", good_def())),
        }
    }
}

impl ScriptableProvider for Inventory {
    fn name(&self) -> &str {
        "Inventory"
    }

    fn signal_names(&self, _host: HostId) -> Vec<String> {
        vec!["Inventory.Selected".to_string()]
    }

    fn signal_source(&self, name: &str, host: HostId) -> Result<SignalSource, ScriptError> {
        self.signal_definition(name, host)?;
        Ok(Rc::new(|| Ok(Eval::Ready(ScriptValue::of_string("Log")))))
    }

    fn signal_definition(&self, name: &str, _host: HostId) -> Result<Rc<SignalDef>, ScriptError> {
        match name {
            "Inventory.Selected" => Ok(Rc::clone(&self.selected_def)),
            _ => Err(ScriptError::parsing(format!("Unknown signal '{}'", name))),
        }
    }

    fn action_names(&self, _host: HostId) -> Vec<String> {
        vec!["Inventory.Take".to_string()]
    }

    fn action_executor(&self, name: &str, host: HostId) -> Result<ActionExecutor, ScriptError> {
        self.action_definition(name, host)?;
        let taken = Rc::clone(&self.taken);
        Ok(Rc::new(move |args: &[ScriptValue]| {
            taken
                .borrow_mut()
                .push((args[0].as_string()?.to_string(), args[1].as_number()?));
            Ok(Eval::Ready(()))
        }))
    }

    fn action_definition(&self, name: &str, _host: HostId) -> Result<Rc<ActionDef>, ScriptError> {
        match name {
            "Inventory.Take" => Ok(Rc::clone(&self.take_def)),
            _ => Err(ScriptError::parsing(format!("Unknown action '{}'", name))),
        }
    }

    fn register_signal_change_callback(
        &self,
        name: &str,
        host: HostId,
        _listener: Rc<dyn SignalListener>,
    ) -> Result<(), ScriptError> {
        self.signal_definition(name, host).map(|_| ())
    }

    fn unregister_signal_change_callback(&self, _name: &str, _host: HostId, _listener: ListenerId) {}

    fn install_action(&self, name: &str, host: HostId) -> Result<(), ScriptError> {
        self.action_definition(name, host)?;
        self.installed.borrow_mut().push(host);
        Ok(())
    }

    fn uninstall_action(&self, _name: &str, host: HostId) {
        self.installed.borrow_mut().retain(|h| *h != host);
    }
}

struct World {
    service: ScriptingService,
    grid: Rc<PowerGrid>,
    inventory: Rc<Inventory>,
    signals: Rc<SignalsProvider>,
}

fn world() -> World {
    logging::init_for_tests();
    let mut service = ScriptingService::new(EngineConfig::default());
    let grid = Rc::new(PowerGrid::new(service.dispatcher()));
    let inventory = Rc::new(Inventory::new());
    let signals = Rc::new(SignalsProvider::new(service.dispatcher()));
    service.register_provider(grid.clone());
    service.register_provider(inventory.clone());
    service.register_provider(signals.clone());
    World {
        service,
        grid,
        inventory,
        signals,
    }
}

#[test]
fn test_supply_threshold_example() {
    let w = world();
    let host = HostId::new();
    w.grid.set_supply(host, 450).unwrap();

    let expr = w.service.parser(host).parse("(gt (sig Power.Supply) 500)").unwrap();
    assert_eq!(expr.evaluate().unwrap(), Eval::Ready(ScriptValue::from_bool(false)));

    w.grid.set_supply(host, 501).unwrap();
    assert_eq!(expr.evaluate().unwrap(), Eval::Ready(ScriptValue::from_bool(true)));
    assert_eq!(expr.describe(), "Supply > 5 kW");
}

#[test]
fn test_unknown_signal_fails_before_evaluation() {
    let w = world();
    let err = w
        .service
        .parser(HostId::new())
        .parse("(act Signals.Set 'Foo' (sig Bar))")
        .unwrap_err();
    assert!(matches!(err, ScriptError::Parsing(_)));
    assert_eq!(w.signals.get("Foo"), None);
}

#[test]
fn test_inapplicable_signal_is_bad_state() {
    let w = world();
    let with_battery = HostId::new();
    w.grid.add_battery(with_battery);

    let err = w
        .service
        .parser(HostId::new())
        .parse("(gt (sig Power.Battery) 0)")
        .unwrap_err();
    assert!(matches!(err, ScriptError::BadState(_)));
    assert!(w
        .service
        .parser(with_battery)
        .parse("(gt (sig Power.Battery) 0)")
        .is_ok());
    assert_eq!(
        w.service.signal_names_for_host(with_battery),
        vec!["Inventory.Selected", "Power.Battery", "Power.Supply"]
    );
}

#[test]
fn test_argument_constraints() {
    let w = world();
    let parser = w.service.parser(HostId::new());

    let action = parser.parse_action("(act Inventory.Take 'Logs' 500)").unwrap();
    assert_eq!(action.serialize(), "(act Inventory.Take 'Log' 500)");
    assert_eq!(action.describe(), "Take(Logs, 5)");

    assert!(parser.parse("(act Inventory.Take 'Berries' 500)").unwrap_err().is_parsing());
    let err = parser.parse("(act Inventory.Take 'Log' 20000)").unwrap_err();
    assert!(matches!(err, ScriptError::ValueOutOfRange(_)));

    let expr = parser.parse("(eq (sig Inventory.Selected) 'Logs')").unwrap();
    assert_eq!(expr.serialize(), "(eq (sig Inventory.Selected) 'Log')");
    assert_eq!(expr.evaluate().unwrap(), Eval::Ready(ScriptValue::from_bool(true)));
    assert!(parser.parse("(eq (sig Inventory.Selected) 'Berries')").is_err());
}

#[test]
fn test_runtime_range_check() {
    let w = world();
    let host = HostId::new();
    let action = w
        .service
        .parser(host)
        .parse_action("(act Inventory.Take 'Plank' (sig Power.Supply))")
        .unwrap();

    w.grid.set_supply(host, 300).unwrap();
    assert!(action.execute().unwrap().is_ready());
    w.grid.set_supply(host, 20000).unwrap();
    let err = action.execute().unwrap_err();
    assert!(err.is_runtime());
    assert_eq!(*w.inventory.taken.borrow(), vec![("Plank".to_string(), 300)]);
}

#[test]
fn test_rule_reacts_to_provider_changes() {
    let w = world();
    let host = HostId::new();
    let mut book = RuleBook::new(host);
    let rule = book
        .add_rule(
            &w.service,
            &RuleRecord::new("(ge (sig Power.Supply) 1000)", "(act Inventory.Take 'Log' 100)"),
        )
        .unwrap();
    assert_eq!(w.grid.listeners(host), 1);
    assert_eq!(*w.inventory.installed.borrow(), vec![host]);

    w.grid.set_supply(host, 999).unwrap();
    w.grid.set_supply(host, 1000).unwrap();
    w.grid.set_supply(host, 2000).unwrap();
    assert_eq!(w.inventory.taken.borrow().len(), 1);

    // other hosts do not wake the rule
    w.grid.set_supply(HostId::new(), 0).unwrap();
    assert_eq!(rule.state(), RuleState::Active);

    book.clear(&w.service);
    assert_eq!(w.grid.listeners(host), 0);
    assert!(w.inventory.installed.borrow().is_empty());
}

#[test]
fn test_feedback_loop_is_reported() {
    let w = world();
    let host = HostId::new();
    let mut book = RuleBook::new(host);
    book.add_rule(
        &w.service,
        &RuleRecord::new("(sig Signals.A)", "(act Signals.Set 'B' (sig Signals.A))"),
    )
    .unwrap();
    book.add_rule(
        &w.service,
        &RuleRecord::new("(sig Signals.B)", "(act Signals.Set 'A' (add (sig Signals.B) 100))"),
    )
    .unwrap();

    let err = w.signals.set("A", ScriptValue::from_int(1)).unwrap_err();
    assert!(err.is_runtime());
    assert!(
        err.to_string().contains("Signals.A -> Signals.B -> Signals.A"),
        "{}",
        err
    );
    assert!(w.service.dispatcher().is_idle());
    assert!(book.rules().iter().all(|r| r.state() == RuleState::Failed));
}

#[test]
fn test_clone_definition_to_another_host() {
    let w = world();
    let (first, second) = (HostId::new(), HostId::new());
    w.grid.set_supply(first, 100).unwrap();
    w.grid.set_supply(second, 900).unwrap();

    let condition = w.service.parser(first).parse("(gt (sig Power.Supply) 500)").unwrap();
    let cloned = w.service.parser(second).clone_definition(&condition).unwrap();

    assert_eq!(condition.evaluate().unwrap(), Eval::Ready(ScriptValue::from_bool(false)));
    assert_eq!(cloned.evaluate().unwrap(), Eval::Ready(ScriptValue::from_bool(true)));

    let action = w.service.parser(second).parse_action("(act Inventory.Take 'Log' 1)").unwrap();
    let rule = ScriptedRule::new(second, cloned, action).unwrap();
    assert_eq!(rule.host(), second);
}
