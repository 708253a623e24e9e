//! Stream requests, from a probe and from programs.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use weft_actor::{ActorRef, ActorSource, ActorSystem, Probe};
use weft_kernel::instr::build::{
    apply, bind, binary, id, if_else, lit, local, proc_def, rec, select_apply, seq, throw, tuple,
    var,
};
use weft_kernel::{ActorCfg, BinaryOp, Closure, Instr, Value, Var};

use crate::common::{constructor_body, failed, handler, handler_cfg, system, TIMEOUT};

/// `b = batch(values...)`
fn batch(target: &str, values: Vec<weft_kernel::Operand>) -> Instr {
    Instr::CreateTuple {
        label: Some(lit("batch")),
        values,
        target: id(target),
    }
}

/// Answers `stream(n)` with `batch(n, 2)`, then `99`.
fn numbers(system: &ActorSystem) -> ActorRef {
    let cfg = handler_cfg(
        system,
        vec![handler(
            "stream",
            &["msg", "r"],
            local(
                &["b"],
                seq(vec![
                    batch("b", vec![var("msg"), lit(2_i64)]),
                    apply("publish", vec![var("b")]),
                    bind("r", 99_i64),
                ]),
            ),
        )],
    );
    system.spawn("numbers", ActorSource::Config(cfg)).unwrap()
}

/// The first request yields `1` and pauses; the resent one yields `2`.
fn pausing(system: &ActorSystem) -> ActorRef {
    let body = constructor_body(vec![handler(
        "stream",
        &["msg", "r"],
        local(
            &["seen"],
            seq(vec![
                apply("is_det", vec![var("resumed"), var("seen")]),
                if_else(
                    var("seen"),
                    bind("r", 2_i64),
                    seq(vec![
                        apply("publish", vec![lit(1_i64)]),
                        bind("resumed", true),
                        rec("r", Some("eof"), vec![("more", lit(true))]),
                    ]),
                ),
            ]),
        ),
    )]);
    let env = system.root_env().extend(vec![(id("resumed"), Var::new())]);
    let cfg = Arc::new(ActorCfg {
        cfgtr: Closure::new(proc_def(&["handlers"], body), env),
        args: Vec::new(),
    });
    system.spawn("pausing", ActorSource::Config(cfg)).unwrap()
}

/// Run `body` with `src` bound to `source` and return the value of `out`.
fn consume(system: &ActorSystem, source: &ActorRef, body: Instr) -> Option<Value> {
    let probe = Probe::new("probe");
    let out = Var::new();
    let id = system
        .run(
            "consumer",
            body.into(),
            vec![
                (id("src"), Var::bound(source.to_value())),
                (id("out"), out.clone()),
            ],
            out,
            probe.actor_ref(),
        )
        .unwrap();
    probe.response(id, TIMEOUT)
}

fn next_all(names: &[&str]) -> Vec<Instr> {
    names
        .iter()
        .map(|name| select_apply("it", "next", vec![var(name)]))
        .collect()
}

#[test]
fn probe_collects_published_batches() {
    let system = system();
    let numbers = numbers(&system);
    let probe = Probe::new("probe");

    let items = probe.collect_stream(&numbers, Value::Int(1), TIMEOUT).unwrap();

    assert_eq!(items, vec![Value::Int(1), Value::Int(2), Value::Int(99)]);
}

#[test]
fn ask_handler_answers_stream_request() {
    let system = system();
    let cfg = handler_cfg(
        &system,
        vec![handler(
            "ask",
            &["msg", "r"],
            binary(BinaryOp::Mul, var("msg"), lit(10_i64), "r"),
        )],
    );
    let b = system.spawn("b", ActorSource::Config(cfg)).unwrap();
    let probe = Probe::new("probe");

    let items = probe.collect_stream(&b, Value::Int(2), TIMEOUT).unwrap();

    assert_eq!(items, vec![Value::Int(20)]);
}

#[test]
fn program_iterates_until_eof() {
    let system = system();
    let numbers = numbers(&system);
    let mut steps = vec![apply("stream", vec![var("src"), lit(1_i64), var("it")])];
    steps.extend(next_all(&["x1", "x2", "x3", "x4"]));
    steps.push(tuple("out", vec![var("x1"), var("x2"), var("x3"), var("x4")]));
    let body = local(&["it", "x1", "x2", "x3", "x4"], seq(steps));

    let expected = Value::tuple(vec![
        Value::Int(1),
        Value::Int(2),
        Value::Int(99),
        Value::Eof,
    ]);
    assert_eq!(consume(&system, &numbers, body), Some(expected));
}

#[test]
fn paused_stream_is_resent_for_programs() {
    let system = system();
    let pausing = pausing(&system);
    let mut steps = vec![select_apply("src", "stream", vec![lit(0_i64), var("it")])];
    steps.extend(next_all(&["x1", "x2", "x3"]));
    steps.push(tuple("out", vec![var("x1"), var("x2"), var("x3")]));
    let body = local(&["it", "x1", "x2", "x3"], seq(steps));

    let expected = Value::tuple(vec![Value::Int(1), Value::Int(2), Value::Eof]);
    assert_eq!(consume(&system, &pausing, body), Some(expected));
}

#[test]
fn paused_stream_is_resent_for_probes() {
    let system = system();
    let pausing = pausing(&system);
    let probe = Probe::new("probe");

    let items = probe.collect_stream(&pausing, Value::Int(0), TIMEOUT).unwrap();

    assert_eq!(items, vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn producer_failure_ends_stream() {
    let system = system();
    let cfg = handler_cfg(
        &system,
        vec![handler(
            "stream",
            &["msg", "r"],
            seq(vec![apply("publish", vec![lit(5_i64)]), throw(lit("dry"))]),
        )],
    );
    let b = system.spawn("b", ActorSource::Config(cfg)).unwrap();
    let probe = Probe::new("probe");

    let items = probe.collect_stream(&b, Value::Null, TIMEOUT).unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Value::Int(5));
    assert_eq!(failed(&items[1]).error, Value::str("dry"));
}
