//! Stopping, failing and terminating actors.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use weft_actor::{ActorSource, ActorState, Address, Probe, SendError};
use weft_kernel::instr::build::{bind, binary, id, lit, local, proc_def, seq, throw, var};
use weft_kernel::{bind as bind_cell, ActorCfg, BinaryOp, Closure, Value, Var};

use crate::common::{
    constructor_body, failed, handler, handler_cfg, system, wait_for_state, QUIET, TIMEOUT,
};

#[test]
fn stop_mid_computation_answers_everyone() {
    let system = system();
    let cfg = handler_cfg(
        &system,
        vec![handler(
            "ask",
            &["msg", "r"],
            local(&["never"], binary(BinaryOp::Add, var("never"), lit(1_i64), "r")),
        )],
    );
    let b = system.spawn("b", ActorSource::Config(cfg)).unwrap();
    let probe = Probe::new("probe");

    let in_flight = probe.ask(&b, Value::Int(1)).unwrap();
    let pending = probe.ask(&b, Value::Int(2)).unwrap();
    assert_eq!(probe.response(in_flight, QUIET), None);

    let ack = probe.stop(&b).unwrap();

    for id in [in_flight, pending] {
        let failure = failed(&probe.response(id, TIMEOUT).unwrap());
        assert_eq!(failure.address, "b");
        assert_eq!(failure.error, Value::str("stopped"));
    }
    assert_eq!(probe.response(ack, TIMEOUT), Some(Value::str("stopped")));
    assert_eq!(system.state(&Address::new("b")), Some(ActorState::Successful));
}

#[test]
fn sends_to_stopped_actor_are_rejected() {
    let system = system();
    let cfg = handler_cfg(&system, vec![handler("ask", &["msg", "r"], bind("r", 1_i64))]);
    let b = system.spawn("b", ActorSource::Config(cfg)).unwrap();
    let probe = Probe::new("probe");

    let ack = probe.stop(&b).unwrap();
    assert_eq!(probe.response(ack, TIMEOUT), Some(Value::str("stopped")));

    let terminated = Err(SendError::Terminated(Address::new("b")));
    assert_eq!(probe.tell(&b, Value::Null).map(|_| ()), terminated);
    assert_eq!(probe.ask(&b, Value::Null).map(|_| ()), terminated);
    assert_eq!(probe.stop(&b).map(|_| ()), terminated);
}

#[test]
fn finished_program_rejects_requests() {
    let system = system();
    let probe = Probe::new("probe");
    let out = Var::new();

    let id = system
        .run(
            "once",
            bind("out", 5_i64).into(),
            vec![(id("out"), out.clone())],
            out,
            probe.actor_ref(),
        )
        .unwrap();
    assert_eq!(probe.response(id, TIMEOUT), Some(Value::Int(5)));
    assert!(wait_for_state(&system, "once", ActorState::Successful));

    let once = system.lookup(&Address::new("once")).unwrap();
    assert_eq!(
        probe.ask(&once, Value::Null).map(|_| ()),
        Err(SendError::Terminated(Address::new("once")))
    );
}

#[test]
fn halted_handler_fails_pending_requests() {
    let system = system();
    let gate = Var::new();
    let body = constructor_body(vec![handler(
        "ask",
        &["msg", "r"],
        local(
            &["g"],
            seq(vec![
                binary(BinaryOp::Add, var("gate"), lit(0_i64), "g"),
                throw(lit("bad")),
            ]),
        ),
    )]);
    // The handlers see `gate`, a cell the test binds.
    let env = system.root_env().extend(vec![(id("gate"), gate.clone())]);
    let cfg = Arc::new(ActorCfg {
        cfgtr: Closure::new(proc_def(&["handlers"], body), env),
        args: Vec::new(),
    });
    let b = system.spawn("b", ActorSource::Config(cfg)).unwrap();
    let probe = Probe::new("probe");

    let in_flight = probe.ask(&b, Value::Int(0)).unwrap();
    let pending = probe.ask(&b, Value::Int(1)).unwrap();
    assert_eq!(probe.response(in_flight, QUIET), None);
    bind_cell(&gate, &Value::Int(0)).unwrap();

    let first = failed(&probe.response(in_flight, TIMEOUT).unwrap());
    let second = failed(&probe.response(pending, TIMEOUT).unwrap());
    assert_eq!(first.address, "b");
    assert_eq!(first.error, Value::str("bad"));
    assert_eq!(second.error, Value::str("bad"));
    assert!(!first.stack.is_empty());
    assert!(wait_for_state(&system, "b", ActorState::Failed));
}

#[test]
fn shutdown_after_serving() {
    let system = system();
    let cfg = handler_cfg(&system, vec![handler("ask", &["msg", "r"], bind("r", 1_i64))]);
    let b = system.spawn("b", ActorSource::Config(cfg)).unwrap();
    let probe = Probe::new("probe");
    let id = probe.ask(&b, Value::Null).unwrap();
    assert_eq!(probe.response(id, TIMEOUT), Some(Value::Int(1)));

    system.shutdown();
}
