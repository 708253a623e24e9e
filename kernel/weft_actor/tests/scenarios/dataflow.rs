//! `act` children, free-variable sync and scheduling.

use pretty_assertions::assert_eq;
use weft_actor::{ActorSource, ActorState, Probe, SchedulerMode, SystemConfig};
use weft_kernel::instr::build::{
    act, apply, bind, binary, create_proc, id, if_else, lit, local, select, seq, throw, tuple,
    var,
};
use weft_kernel::{bind as bind_cell, BinaryOp, Feature, Instr, Rec, Value, Var};

use crate::common::{failed, handler, handler_cfg, system, system_with, wait_for_state, QUIET, TIMEOUT};

fn record(fields: Vec<(&str, Value)>) -> Value {
    let fields = fields
        .into_iter()
        .map(|(name, value)| (Feature::str(name), value))
        .collect();
    Value::Rec(Rec::new(None, fields).unwrap())
}

#[test]
fn act_copies_complete_free_variables() {
    let system = system();
    let probe = Probe::new("probe");
    let out = Var::new();
    let body = local(
        &["x"],
        seq(vec![
            act("x", binary(BinaryOp::Mul, var("n"), lit(2_i64), "x")),
            binary(BinaryOp::Add, var("x"), lit(1_i64), "out"),
        ]),
    );

    let id = system
        .run(
            "a",
            body.into(),
            vec![(id("n"), Var::bound(Value::Int(20))), (id("out"), out.clone())],
            out,
            probe.actor_ref(),
        )
        .unwrap();

    assert_eq!(probe.response(id, TIMEOUT), Some(Value::Int(41)));
}

#[test]
fn partial_record_syncs_only_when_complete() {
    let system = system();
    let probe = Probe::new("probe");
    let b = Var::new();
    let p = Var::bound(record(vec![
        ("a", Value::Int(1)),
        ("b", Value::Var(b.clone())),
    ]));
    let r = Var::new();
    // The child reports whether `p.b` was already bound when it looked.
    let child = local(
        &["bv", "d"],
        seq(vec![
            select("bv", "p", "b"),
            apply("is_det", vec![var("bv"), var("d")]),
            tuple("r", vec![var("d"), var("p")]),
        ]),
    );

    let id = system
        .run(
            "parent",
            act("r", child).into(),
            vec![(id("p"), p), (id("r"), r.clone())],
            r,
            probe.actor_ref(),
        )
        .unwrap();

    assert!(wait_for_state(&system, "parent", ActorState::Waiting));
    assert_eq!(probe.response(id, QUIET), None);
    bind_cell(&b, &Value::Int(2)).unwrap();

    let expected = Value::tuple(vec![
        Value::Bool(true),
        record(vec![("a", Value::Int(1)), ("b", Value::Int(2))]),
    ]);
    assert_eq!(probe.response(id, TIMEOUT), Some(expected));
}

#[test]
fn chained_partial_bindings_sync_once() {
    let system = system();
    let probe = Probe::new("probe");
    let inner = Var::new();
    let leaf = Var::new();
    let p = Var::bound(record(vec![("a", Value::Var(inner.clone()))]));
    let r = Var::new();
    let child = local(
        &["a1", "b1", "d"],
        seq(vec![
            select("a1", "p", "a"),
            select("b1", "a1", "b"),
            apply("is_det", vec![var("b1"), var("d")]),
            tuple("r", vec![var("d"), var("b1")]),
        ]),
    );

    let id = system
        .run(
            "parent",
            act("r", child).into(),
            vec![(id("p"), p), (id("r"), r.clone())],
            r,
            probe.actor_ref(),
        )
        .unwrap();

    assert!(wait_for_state(&system, "parent", ActorState::Waiting));
    bind_cell(&inner, &record(vec![("b", Value::Var(leaf.clone()))])).unwrap();
    assert_eq!(probe.response(id, QUIET), None);
    bind_cell(&leaf, &Value::Int(7)).unwrap();

    let expected = Value::tuple(vec![Value::Bool(true), Value::Int(7)]);
    assert_eq!(probe.response(id, TIMEOUT), Some(expected));
}

#[test]
fn unanswered_child_leaves_parent_suspended() {
    let system = system();
    let probe = Probe::new("probe");
    let out = Var::new();
    let body = local(
        &["x"],
        seq(vec![
            act(
                "x",
                local(&["never"], binary(BinaryOp::Add, var("never"), lit(1_i64), "x")),
            ),
            binary(BinaryOp::Add, var("x"), lit(1_i64), "out"),
        ]),
    );

    let id = system
        .run("a", body.into(), vec![(id("out"), out.clone())], out, probe.actor_ref())
        .unwrap();

    assert!(wait_for_state(&system, "a", ActorState::Waiting));
    assert_eq!(probe.response(id, QUIET), None);

    system.stop(&weft_actor::Address::new("a")).unwrap();
    let failure = failed(&probe.response(id, TIMEOUT).unwrap());
    assert_eq!(failure.error, Value::str("stopped"));
}

#[test]
fn failing_child_is_rethrown_with_cause() {
    let system = system();
    let probe = Probe::new("probe");
    let out = Var::new();
    let body = local(
        &["x"],
        seq(vec![
            act("x", throw(lit("boom"))),
            binary(BinaryOp::Add, var("x"), lit(1_i64), "out"),
        ]),
    );

    let id = system
        .run("a", body.into(), vec![(id("out"), out.clone())], out, probe.actor_ref())
        .unwrap();
    let failure = failed(&probe.response(id, TIMEOUT).unwrap());

    assert_eq!(failure.address, "a");
    assert_eq!(failure.error, Value::str("boom"));
    let cause = failure.cause.as_deref().unwrap();
    assert!(cause.address.starts_with("a/act-"), "cause at {}", cause.address);
    assert_eq!(cause.error, Value::str("boom"));
    assert!(wait_for_state(&system, "a", ActorState::Failed));
}

/// `count(n, r)`: recurse down to zero, then bind `r` to `"done"`.
fn countdown(n: i64) -> Instr {
    local(
        &["count"],
        seq(vec![
            create_proc(
                "count",
                &["n", "r"],
                local(
                    &["z", "m"],
                    seq(vec![
                        binary(BinaryOp::Eq, var("n"), lit(0_i64), "z"),
                        if_else(
                            var("z"),
                            bind("r", "done"),
                            seq(vec![
                                binary(BinaryOp::Sub, var("n"), lit(1_i64), "m"),
                                apply("count", vec![var("m"), var("r")]),
                            ]),
                        ),
                    ]),
                ),
            ),
            apply("count", vec![lit(n), var("out")]),
        ]),
    )
}

#[test]
fn preempted_program_completes() {
    let system = system_with(SystemConfig::default().with_workers(1).with_step_budget(7));
    let probe = Probe::new("probe");
    let out = Var::new();

    let id = system
        .run("a", countdown(500).into(), vec![(id("out"), out.clone())], out, probe.actor_ref())
        .unwrap();

    assert_eq!(probe.response(id, TIMEOUT), Some(Value::str("done")));
    assert!(wait_for_state(&system, "a", ActorState::Successful));
}

#[test]
fn pinned_scheduler_serves_every_actor() {
    let system = system_with(
        SystemConfig::default()
            .with_workers(3)
            .with_scheduler(SchedulerMode::Pinned)
            .with_step_budget(5),
    );
    let probe = Probe::new("probe");
    let actors: Vec<_> = (0..4)
        .map(|n| {
            let cfg = handler_cfg(
                &system,
                vec![handler(
                    "ask",
                    &["msg", "r"],
                    binary(BinaryOp::Add, var("msg"), lit(100_i64), "r"),
                )],
            );
            system.spawn(format!("pinned-{n}"), ActorSource::Config(cfg)).unwrap()
        })
        .collect();

    let ids: Vec<_> = actors
        .iter()
        .zip(0_i64..)
        .map(|(actor, n)| probe.ask(actor, Value::Int(n)).unwrap())
        .collect();

    for (id, n) in ids.into_iter().zip(0_i64..) {
        assert_eq!(probe.response(id, TIMEOUT), Some(Value::Int(100 + n)));
    }
}
