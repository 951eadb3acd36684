//! Benchmarks for parsing and evaluating rule expressions

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::rc::Rc;

use signal_automation::core::{EngineConfig, HostId};
use signal_automation::providers::SignalsProvider;
use signal_automation::script::{ScriptValue, ScriptingService};

const CONDITION: &str = "(and (gt (sig Signals.Supply) 500) \
    (le (div (mul (sig Signals.Demand) 150) (sub (sig Signals.Supply) 25)) 9000) \
    (not (eq (sig Signals.Alarm) 100)))";

fn service() -> (ScriptingService, Rc<SignalsProvider>) {
    let mut service = ScriptingService::new(EngineConfig::default());
    let signals = Rc::new(SignalsProvider::new(service.dispatcher()));
    service.register_provider(signals.clone());
    (service, signals)
}

fn bench_parse(c: &mut Criterion) {
    let (service, _) = service();
    let parser = service.parser(HostId::new());

    let mut group = c.benchmark_group("parse");
    group.bench_function("condition", |b| {
        b.iter(|| parser.parse_condition(black_box(CONDITION)))
    });
    group.bench_function("action", |b| {
        b.iter(|| parser.parse_action(black_box("(act Signals.Set 'Alarm' (sig Signals.Supply))")))
    });
    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let (service, signals) = service();
    let parser = service.parser(HostId::new());
    let condition = parser.parse_condition(CONDITION).unwrap();
    let serialized = condition.serialize();

    // unset signals interrupt evaluation before the arithmetic runs
    let mut group = c.benchmark_group("evaluate");
    group.bench_function("interrupted", |b| b.iter(|| black_box(&condition).evaluate()));

    signals.set("Supply", ScriptValue::from_int(8)).unwrap();
    signals.set("Demand", ScriptValue::from_int(3)).unwrap();
    signals.set("Alarm", ScriptValue::from_int(0)).unwrap();
    group.bench_function("ready", |b| b.iter(|| black_box(&condition).evaluate()));
    group.bench_function("serialize", |b| b.iter(|| black_box(&condition).serialize()));
    group.bench_function("reparse", |b| {
        b.iter(|| parser.parse(black_box(&serialized)))
    });
    group.finish();
}

criterion_group!(benches, bench_parse, bench_evaluate);
criterion_main!(benches);
