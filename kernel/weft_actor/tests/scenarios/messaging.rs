//! Requests, notifies, the directory and images.

use pretty_assertions::assert_eq;
use weft_actor::{ActorSource, Address, Body, Envelope, ImageError, Probe, SendError, SpawnError};
use weft_kernel::instr::build::{
    bind, bind_idents, binary, id, lit, local, select_apply, throw, var,
};
use weft_kernel::{BinaryOp, Instr, Value, Var};

use crate::common::{
    cfg_from_body, constructor_body, failed, handler, handler_cfg, system, QUIET, TIMEOUT,
};

fn doubler() -> Vec<crate::common::Handler> {
    vec![handler(
        "ask",
        &["msg", "r"],
        binary(BinaryOp::Mul, var("msg"), lit(2_i64), "r"),
    )]
}

#[test]
fn response_carries_request_id() {
    let system = system();
    let b = system
        .spawn("b", ActorSource::Config(handler_cfg(&system, doubler())))
        .unwrap();
    let probe = Probe::new("probe");

    let id = probe.ask(&b, Value::Int(5)).unwrap();
    let envelope = probe.recv_timeout(TIMEOUT).unwrap();

    assert!(matches!(envelope.body, Body::Response(_)));
    assert_eq!(envelope.request_id, Some(id));
    assert_eq!(envelope.payload(), Some(&Value::Int(10)));
}

#[test]
fn actor_asks_actor() {
    let system = system();
    let b = system
        .spawn("b", ActorSource::Config(handler_cfg(&system, doubler())))
        .unwrap();
    let probe = Probe::new("probe");
    let out = Var::new();

    let id = system
        .run(
            "a",
            select_apply("b", "ask", vec![lit(21_i64), var("out")]).into(),
            vec![(id("b"), Var::bound(b.to_value())), (id("out"), out.clone())],
            out,
            probe.actor_ref(),
        )
        .unwrap();

    assert_eq!(probe.response(id, TIMEOUT), Some(Value::Int(42)));
}

#[test]
fn requests_are_answered_in_order() {
    let system = system();
    let b = system
        .spawn("b", ActorSource::Config(handler_cfg(&system, doubler())))
        .unwrap();
    let probe = Probe::new("probe");

    let ids: Vec<_> = (1..=5_i64)
        .map(|n| probe.ask(&b, Value::Int(n)).unwrap())
        .collect();
    let answers: Vec<_> = ids
        .iter()
        .map(|id| probe.response(*id, TIMEOUT).unwrap())
        .collect();

    let expected: Vec<_> = (1..=5_i64).map(|n| Value::Int(n * 2)).collect();
    assert_eq!(answers, expected);
}

#[test]
fn tell_handler_runs_without_reply() {
    let system = system();
    let probe = Probe::new("sink");
    let body = constructor_body(vec![handler(
        "tell",
        &["msg"],
        select_apply("sink", "tell", vec![var("msg")]),
    )]);
    let cfg = cfg_from_body(&system, &["sink"], body, vec![probe.actor_ref().to_value()]);
    let relay = system.spawn("relay", ActorSource::Config(cfg)).unwrap();

    probe.tell(&relay, Value::str("hello")).unwrap();
    let envelope = probe.recv_timeout(TIMEOUT).unwrap();

    assert!(matches!(envelope.body, Body::Notify(_)));
    assert_eq!(envelope.request_id, None);
    assert_eq!(envelope.payload(), Some(&Value::str("hello")));
    assert!(probe.recv_timeout(QUIET).is_none());
}

#[test]
fn missing_handler_answers_with_failure() {
    let system = system();
    let body = constructor_body(vec![handler("tell", &["msg"], Instr::Skip)]);
    let cfg = cfg_from_body(&system, &[], body, Vec::new());
    let b = system.spawn("b", ActorSource::Config(cfg)).unwrap();
    let probe = Probe::new("probe");

    let id = probe.ask(&b, Value::Int(1)).unwrap();
    let failure = failed(&probe.response(id, TIMEOUT).unwrap());

    assert_eq!(failure.address, "b");
    // The actor keeps serving.
    let again = probe.ask(&b, Value::Int(2)).unwrap();
    assert!(probe.response(again, TIMEOUT).is_some());
}

#[test]
fn duplicate_address_is_rejected() {
    let system = system();
    system
        .spawn("b", ActorSource::Config(handler_cfg(&system, doubler())))
        .unwrap();

    let err = system
        .spawn("b", ActorSource::Config(handler_cfg(&system, doubler())))
        .unwrap_err();

    assert!(matches!(err, SpawnError::DuplicateAddress(address) if address.as_str() == "b"));
}

#[test]
fn directory_lookup_and_send() {
    let system = system();
    let b = system
        .spawn("b", ActorSource::Config(handler_cfg(&system, doubler())))
        .unwrap();
    let probe = Probe::new("probe");

    let found = system.lookup(&Address::new("b")).unwrap();
    assert!(found.ptr_eq(&b));
    assert!(system.lookup(&Address::new("nobody")).is_none());

    let (envelope, id) = Envelope::request(Value::Int(4), probe.actor_ref());
    system.send(&Address::new("b"), envelope).unwrap();
    assert_eq!(probe.response(id, TIMEOUT), Some(Value::Int(8)));

    let missing = system.send(&Address::new("nobody"), Envelope::notify(Value::Null));
    assert_eq!(missing, Err(SendError::UnknownAddress(Address::new("nobody"))));
}

#[test]
fn image_instances_share_handlers() {
    let system = system();
    let body = constructor_body(vec![handler(
        "ask",
        &["msg", "r"],
        binary(BinaryOp::Mul, var("msg"), var("factor"), "r"),
    )]);
    let cfg = cfg_from_body(&system, &["factor"], body, vec![Value::Int(3)]);
    let image = system.build_image(&cfg).unwrap();
    let probe = Probe::new("probe");

    let first = system.spawn("first", ActorSource::Image(image.clone())).unwrap();
    let second = system.spawn("second", ActorSource::Image(image)).unwrap();
    let a = probe.ask(&first, Value::Int(5)).unwrap();
    let b = probe.ask(&second, Value::Int(7)).unwrap();

    assert_eq!(probe.response(a, TIMEOUT), Some(Value::Int(15)));
    assert_eq!(probe.response(b, TIMEOUT), Some(Value::Int(21)));
}

#[test]
fn image_of_suspending_constructor_fails() {
    let system = system();
    let body = local(
        &["x"],
        binary(BinaryOp::Add, var("x"), lit(1_i64), "handlers"),
    );
    let cfg = cfg_from_body(&system, &[], body, Vec::new());

    assert!(matches!(system.build_image(&cfg), Err(ImageError::Suspended(_))));
}

#[test]
fn image_of_throwing_constructor_fails() {
    let system = system();
    let cfg = cfg_from_body(&system, &[], throw(lit("bad")), Vec::new());

    match system.build_image(&cfg) {
        Err(ImageError::Constructor(failure)) => {
            assert_eq!(failure.error, Value::str("bad"));
        }
        other => panic!("expected a constructor failure, got {other:?}"),
    }
}

/// Handlers closing over `state`, a cell local to the actor: `tell`
/// binds it and `ask` answers `state + msg`.
fn stateful(system: &weft_actor::ActorSystem) -> weft_actor::ActorRef {
    let body = local(
        &["state"],
        constructor_body(vec![
            handler("tell", &["msg"], bind_idents("state", "msg")),
            handler(
                "ask",
                &["msg", "r"],
                binary(BinaryOp::Add, var("state"), var("msg"), "r"),
            ),
        ]),
    );
    let cfg = cfg_from_body(system, &[], body, Vec::new());
    system.spawn("stateful", ActorSource::Config(cfg)).unwrap()
}

#[test]
fn handlers_may_close_over_unbound_cells() {
    let system = system();
    let body = local(
        &["state"],
        constructor_body(vec![
            handler("ask", &["msg", "r"], bind("r", 7_i64)),
            handler("tell", &["msg"], bind_idents("state", "msg")),
        ]),
    );
    let cfg = cfg_from_body(&system, &[], body, Vec::new());
    let b = system.spawn("b", ActorSource::Config(cfg)).unwrap();
    let probe = Probe::new("probe");

    let id = probe.ask(&b, Value::Null).unwrap();

    assert_eq!(probe.response(id, TIMEOUT), Some(Value::Int(7)));
}

#[test]
fn handler_binds_actor_local_state() {
    let system = system();
    let b = stateful(&system);
    let probe = Probe::new("probe");

    probe.tell(&b, Value::Int(40)).unwrap();
    let first = probe.ask(&b, Value::Int(2)).unwrap();
    let second = probe.ask(&b, Value::Int(-40)).unwrap();

    assert_eq!(probe.response(first, TIMEOUT), Some(Value::Int(42)));
    assert_eq!(probe.response(second, TIMEOUT), Some(Value::Int(0)));
}
