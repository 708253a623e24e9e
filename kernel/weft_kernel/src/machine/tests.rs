//! Tests for the compute loop: sequencing, suspension, preemption,
//! exceptions, jumps, natives and the debug hook.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use super::*;
use crate::instr::build::*;
use crate::instr::{BinaryOp, Pat};
use crate::ident::Ident;
use crate::registry::Registry;
use crate::value::{bind as bind_cell, Feature, NativeProc};
use crate::errors::NativeFault;

/// An environment holding the kernel natives plus fresh cells for `names`.
fn scope(names: &[&str]) -> (Env, Vec<Var>) {
    let vars: Vec<Var> = names.iter().map(|_| Var::new()).collect();
    let env = Registry::with_kernel_natives()
        .root_env()
        .extend(names.iter().zip(&vars).map(|(name, var)| (Ident::new(name), var.clone())));
    (env, vars)
}

fn machine_with(instr: Instr, env: Env) -> Machine {
    let mut machine = Machine::new("test");
    machine.push(Arc::new(instr), env);
    machine
}

/// Run to a non-preempted outcome in slices of `budget`.
fn run(machine: &mut Machine, budget: usize) -> ComputeResult {
    loop {
        match machine.compute(budget, &mut NoAmbient) {
            ComputeResult::Preempted => continue,
            other => return other,
        }
    }
}

fn halted(result: ComputeResult) -> Halt {
    match result {
        ComputeResult::Halted(halt) => halt,
        other => panic!("expected halt, got {other:?}"),
    }
}

fn error_name(value: &Value) -> Option<String> {
    let rec = value.as_rec()?;
    rec.field("name")?.as_str().map(str::to_string)
}

/// `acc_0 = 0; acc_{i+1} = acc_i * 3 + i` for `n` steps; the result is
/// order-sensitive so any reordering shows up.
fn accumulate(n: usize) -> (Instr, Vec<String>) {
    let names: Vec<String> = (0..=n).map(|i| format!("acc{i}")).collect();
    let mut items = vec![bind(&names[0], 0_i64)];
    for i in 0..n {
        let tmp = format!("tmp{i}");
        items.push(local(
            &[tmp.as_str()],
            seq(vec![
                binary(BinaryOp::Mul, var(&names[i]), lit(3_i64), &tmp),
                binary(
                    BinaryOp::Add,
                    var(&tmp),
                    lit(i64::try_from(i).unwrap()),
                    &names[i + 1],
                ),
            ]),
        ));
    }
    (seq(items), names)
}

mod sequencing {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_seq_finishes() {
        let mut machine = machine_with(seq(vec![]), Env::empty());
        assert!(matches!(run(&mut machine, 10), ComputeResult::Finished));
        assert!(machine.is_idle());
    }

    #[test]
    fn budget_exhaustion_preempts_with_stack_intact() {
        let (program, names) = accumulate(5);
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (env, vars) = scope(&refs);
        let mut machine = machine_with(program, env);
        assert!(matches!(machine.compute(2, &mut NoAmbient), ComputeResult::Preempted));
        assert!(!machine.is_idle());
        assert!(matches!(run(&mut machine, 2), ComputeResult::Finished));
        // 0 -> 0 -> 1 -> 5 -> 18 -> 58
        assert_eq!(vars[5].resolve().unwrap(), Value::Int(58));
    }

    #[test]
    fn steps_are_counted() {
        let (env, _) = scope(&["x"]);
        let mut machine = machine_with(seq(vec![bind("x", 1_i64), Instr::Skip]), env);
        run(&mut machine, 100);
        assert_eq!(machine.steps_executed(), 3);
    }

    proptest! {
        #[test]
        fn preemption_is_transparent(b1 in 1_usize..8, b2 in 8_usize..64, n in 1_usize..12) {
            let (program, names) = accumulate(n);
            let program = Arc::new(program);
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();

            let mut finals = Vec::new();
            for budget in [b1, b2] {
                let (env, vars) = scope(&refs);
                let mut machine = Machine::new("prop");
                machine.push(Arc::clone(&program), env);
                prop_assert!(matches!(run(&mut machine, budget), ComputeResult::Finished));
                finals.push(vars.iter().map(|v| v.resolve().ok()).collect::<Vec<_>>());
            }
            prop_assert_eq!(&finals[0], &finals[1]);
        }
    }
}

mod suspension {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn suspends_on_exact_cell_and_resumes() {
        let (env, vars) = scope(&["x", "y"]);
        let mut machine = machine_with(
            binary(BinaryOp::Add, var("x"), lit(1_i64), "y"),
            env,
        );
        match machine.compute(10, &mut NoAmbient) {
            ComputeResult::Suspended(barrier) => assert!(barrier.ptr_eq(&vars[0])),
            other => panic!("expected suspend, got {other:?}"),
        }
        // Retrying without binding suspends again, never halts.
        assert!(matches!(machine.compute(10, &mut NoAmbient), ComputeResult::Suspended(_)));

        bind_cell(&vars[0], &Value::Int(41)).unwrap();
        assert!(matches!(run(&mut machine, 10), ComputeResult::Finished));
        assert_eq!(vars[1].resolve().unwrap(), Value::Int(42));
    }

    #[test]
    fn suspended_record_field_awaited() {
        // r = {name: c}; n = r.name + "!"
        let (env, vars) = scope(&["c", "r", "n"]);
        let program = seq(vec![
            rec("r", None, vec![("name", var("c"))]),
            local(
                &["tmp"],
                seq(vec![
                    select("tmp", "r", "name"),
                    binary(BinaryOp::Add, var("tmp"), lit("!"), "n"),
                ]),
            ),
        ]);
        let mut machine = machine_with(program, env);
        match run(&mut machine, 100) {
            ComputeResult::Suspended(barrier) => assert!(barrier.ptr_eq(&vars[0])),
            other => panic!("expected suspend, got {other:?}"),
        }
        bind_cell(&vars[0], &Value::str("weft")).unwrap();
        assert!(matches!(run(&mut machine, 100), ComputeResult::Finished));
        assert_eq!(vars[2].resolve().unwrap(), Value::str("weft!"));
    }

    #[test]
    fn suspension_names_root_after_alias() {
        let (env, vars) = scope(&["a", "b", "out"]);
        let program = seq(vec![
            bind_idents("b", "a"),
            Instr::Not {
                arg: var("b"),
                target: id("out"),
            },
        ]);
        let mut machine = machine_with(program, env);
        match run(&mut machine, 10) {
            ComputeResult::Suspended(barrier) => assert!(barrier.same_class(&vars[0])),
            other => panic!("expected suspend, got {other:?}"),
        }
    }
}

mod control {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn if_else_picks_branch() {
        let (env, vars) = scope(&["c", "out"]);
        let program = seq(vec![
            bind("c", false),
            if_else(var("c"), bind("out", 1_i64), bind("out", 2_i64)),
        ]);
        let mut machine = machine_with(program, env);
        run(&mut machine, 10);
        assert_eq!(vars[1].resolve().unwrap(), Value::Int(2));
    }

    #[test]
    fn non_boolean_condition_halts() {
        let (env, _) = scope(&["out"]);
        let mut machine = machine_with(
            Instr::If {
                cond: lit(3_i64),
                then: Arc::new(bind("out", 1_i64)),
            },
            env,
        );
        let halt = halted(run(&mut machine, 10));
        assert_eq!(error_name(&halt.error).as_deref(), Some("NotBoolean"));
    }

    #[test]
    fn closure_application_binds_parameters() {
        // inc = proc (x, r) r = x + step end; inc(4, out)
        let (env, vars) = scope(&["step", "inc", "out"]);
        let program = seq(vec![
            bind("step", 10_i64),
            create_proc(
                "inc",
                &["x", "r"],
                binary(BinaryOp::Add, var("x"), var("step"), "r"),
            ),
            apply("inc", vec![lit(4_i64), var("out")]),
        ]);
        let mut machine = machine_with(program, env);
        assert!(matches!(run(&mut machine, 50), ComputeResult::Finished));
        assert_eq!(vars[2].resolve().unwrap(), Value::Int(14));
    }

    #[test]
    fn wrong_argument_count() {
        let (env, _) = scope(&["f"]);
        let program = seq(vec![
            create_proc("f", &["x"], Instr::Skip),
            apply("f", vec![lit(1_i64), lit(2_i64)]),
        ]);
        let halt = halted(run(&mut machine_with(program, env), 10));
        assert_eq!(error_name(&halt.error).as_deref(), Some("WrongArgCount"));
    }

    #[test]
    fn applying_a_non_procedure() {
        let (env, _) = scope(&["f"]);
        let program = seq(vec![bind("f", 3_i64), apply("f", vec![])]);
        let halt = halted(run(&mut machine_with(program, env), 10));
        assert_eq!(error_name(&halt.error).as_deref(), Some("NotProcedure"));
    }

    #[test]
    fn unknown_identifier() {
        let (env, _) = scope(&[]);
        let halt = halted(run(&mut machine_with(bind("ghost", 1_i64), env), 10));
        assert_eq!(error_name(&halt.error).as_deref(), Some("IdentNotFound"));
    }
}

mod matching {
    use super::*;
    use pretty_assertions::assert_eq;

    fn point_case(otherwise: Option<Instr>) -> Instr {
        case(
            var("p"),
            rec_pat(
                Some("point"),
                vec![("x", Pat::Ident(id("px"))), ("y", Pat::Literal(Value::Int(0)))],
                false,
            ),
            bind_idents("out", "px"),
            otherwise,
        )
    }

    #[test]
    fn record_pattern_binds_fields() {
        let (env, vars) = scope(&["p", "out"]);
        let point = Value::labeled(
            "point",
            vec![(Feature::str("x"), Value::Int(3)), (Feature::str("y"), Value::Int(0))],
        )
        .unwrap();
        bind_cell(&vars[0], &point).unwrap();
        let mut machine = machine_with(point_case(Some(bind("out", -1_i64))), env);
        assert!(matches!(run(&mut machine, 10), ComputeResult::Finished));
        assert_eq!(vars[1].resolve().unwrap(), Value::Int(3));
    }

    #[test]
    fn mismatch_runs_else() {
        let (env, vars) = scope(&["p", "out"]);
        bind_cell(&vars[0], &Value::Int(7)).unwrap();
        let mut machine = machine_with(point_case(Some(bind("out", -1_i64))), env);
        run(&mut machine, 10);
        assert_eq!(vars[1].resolve().unwrap(), Value::Int(-1));
    }

    #[test]
    fn mismatch_without_else_is_a_no_op() {
        let (env, vars) = scope(&["p", "out"]);
        bind_cell(&vars[0], &Value::Int(7)).unwrap();
        let mut machine = machine_with(point_case(None), env);
        assert!(matches!(run(&mut machine, 10), ComputeResult::Finished));
        assert!(!vars[1].is_bound());
    }

    #[test]
    fn match_suspends_on_inspected_field() {
        let (env, vars) = scope(&["p", "out"]);
        let y = Var::new();
        let point = Value::labeled(
            "point",
            vec![(Feature::str("x"), Value::Int(3)), (Feature::str("y"), Value::Var(y.clone()))],
        )
        .unwrap();
        bind_cell(&vars[0], &point).unwrap();
        let mut machine = machine_with(point_case(None), env);
        match run(&mut machine, 10) {
            ComputeResult::Suspended(barrier) => assert!(barrier.ptr_eq(&y)),
            other => panic!("expected suspend, got {other:?}"),
        }
    }

    #[test]
    fn open_pattern_and_escaped_identifier() {
        let (env, vars) = scope(&["p", "want", "out"]);
        let rec = Value::labeled(
            "msg",
            vec![
                (Feature::str("kind"), Value::str("ping")),
                (Feature::str("id"), Value::Int(9)),
            ],
        )
        .unwrap();
        bind_cell(&vars[0], &rec).unwrap();
        bind_cell(&vars[1], &Value::str("ping")).unwrap();
        let program = case(
            var("p"),
            rec_pat(Some("msg"), vec![("kind", Pat::Escaped(id("want")))], true),
            bind("out", true),
            Some(bind("out", false)),
        );
        let mut machine = machine_with(program, env);
        run(&mut machine, 10);
        assert_eq!(vars[2].resolve().unwrap(), Value::Bool(true));
    }
}

mod exceptions {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kernel_error_is_catchable() {
        let (env, vars) = scope(&["x", "name"]);
        let program = seq(vec![
            bind("x", 1_i64),
            try_catch(
                bind("x", 2_i64),
                "e",
                select("name", "e", "name"),
            ),
        ]);
        let mut machine = machine_with(program, env);
        assert!(matches!(run(&mut machine, 10), ComputeResult::Finished));
        assert_eq!(vars[1].resolve().unwrap(), Value::str("UnificationError"));
        assert_eq!(vars[0].resolve().unwrap(), Value::Int(1));
    }

    #[test]
    fn uncaught_throw_halts_with_value() {
        let (env, _) = scope(&[]);
        let mut machine = machine_with(throw(lit("boom")), env);
        let halt = halted(run(&mut machine, 10));
        assert_eq!(halt.error, Value::str("boom"));
        assert!(!halt.fatal);
        assert_eq!(halt.frame, "throw 'boom'");
    }

    #[test]
    fn try_body_completion_discards_catch() {
        let (env, vars) = scope(&["out"]);
        let program = seq(vec![
            try_catch(Instr::Skip, "e", bind("out", 1_i64)),
            bind("out", 2_i64),
        ]);
        let mut machine = machine_with(program, env);
        assert!(matches!(run(&mut machine, 10), ComputeResult::Finished));
        assert_eq!(vars[0].resolve().unwrap(), Value::Int(2));
    }

    #[test]
    fn throwing_unbound_identifier_is_an_error() {
        let (env, vars) = scope(&["v", "name"]);
        let program = try_catch(throw(var("v")), "e", select("name", "e", "name"));
        let mut machine = machine_with(program, env);
        run(&mut machine, 10);
        assert_eq!(vars[1].resolve().unwrap(), Value::str("UnboundThrow"));
    }

    #[test]
    fn jump_unwinds_to_matching_label() {
        let (env, vars) = scope(&["out"]);
        let program = seq(vec![
            Instr::JumpCatch {
                id: 1,
                body: Arc::new(seq(vec![Instr::JumpThrow(1), bind("out", 1_i64)])),
            },
            bind("out", 2_i64),
        ]);
        let mut machine = machine_with(program, env);
        assert!(matches!(run(&mut machine, 10), ComputeResult::Finished));
        assert_eq!(vars[0].resolve().unwrap(), Value::Int(2));
    }

    #[test]
    fn unmatched_jump_is_fatal_despite_catch() {
        let (env, vars) = scope(&["out"]);
        let program = try_catch(Instr::JumpThrow(7), "e", bind("out", 1_i64));
        let halt = halted(run(&mut machine_with(program, env), 10));
        assert!(halt.fatal);
        assert_eq!(error_name(&halt.error).as_deref(), Some("UnmatchedJump"));
        assert!(!vars[0].is_bound());
    }

    #[test]
    fn native_panic_becomes_catchable_failed_value() {
        let (env, vars) = scope(&["boom", "kind"]);
        bind_cell(
            &vars[0],
            &Value::Proc(NativeProc::new("boom", 0, |_, _| panic!("native exploded"))),
        )
        .unwrap();
        let program = try_catch(
            apply("boom", vec![]),
            "e",
            local(
                &["cause"],
                seq(vec![
                    select("cause", "e", "native_cause"),
                    select("kind", "cause", "kind"),
                ]),
            ),
        );
        let mut machine = machine_with(program, env);
        assert!(matches!(run(&mut machine, 20), ComputeResult::Finished));
        assert_eq!(vars[1].resolve().unwrap(), Value::str("panic"));
    }

    #[test]
    fn uncaught_native_fault_halts_with_failed_value() {
        let (env, vars) = scope(&["fail"]);
        bind_cell(
            &vars[0],
            &Value::Proc(NativeProc::new("fail", 0, |_, _| {
                Err(NativeFault::new("io", "disk gone").into())
            })),
        )
        .unwrap();
        let halt = halted(run(&mut machine_with(apply("fail", vec![]), env), 10));
        let failed = halt.to_failed_value("test");
        assert_eq!(failed.address, "test");
        assert_eq!(
            failed.native_cause.map(|cause| cause.kind),
            Some("io".to_string())
        );
    }

    #[test]
    fn halt_from_foreign_failure_wraps_cause() {
        let child = crate::failure::FailedValue::new("child", Value::str("bad"));
        let halt = Halt {
            error: child.to_value(),
            frame: "apply f".to_string(),
            stack: vec![],
            fatal: false,
        };
        let failed = halt.to_failed_value("parent");
        assert_eq!(failed.address, "parent");
        assert_eq!(failed.cause.map(|cause| cause.address), Some("child".to_string()));
    }
}

mod natives {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kernel_natives() {
        let (env, vars) = scope(&["r", "det", "size", "text", "tok"]);
        let program = seq(vec![
            tuple("r", vec![lit(1_i64), lit(2_i64), lit(3_i64)]),
            apply("is_det", vec![var("r"), var("det")]),
            apply("rec_size", vec![var("r"), var("size")]),
            apply("to_str", vec![var("size"), var("text")]),
            apply("make_token", vec![var("tok")]),
        ]);
        let mut machine = machine_with(program, env);
        assert!(matches!(run(&mut machine, 20), ComputeResult::Finished));
        assert_eq!(vars[1].resolve().unwrap(), Value::Bool(true));
        assert_eq!(vars[2].resolve().unwrap(), Value::Int(3));
        assert_eq!(vars[3].resolve().unwrap(), Value::str("3"));
        assert!(matches!(vars[4].resolve(), Ok(Value::Token(_))));
    }

    #[test]
    fn is_det_never_suspends() {
        let (env, vars) = scope(&["x", "det"]);
        let mut machine = machine_with(apply("is_det", vec![var("x"), var("det")]), env);
        assert!(matches!(run(&mut machine, 5), ComputeResult::Finished));
        assert_eq!(vars[1].resolve().unwrap(), Value::Bool(false));
    }

    #[test]
    fn act_outside_an_actor_halts() {
        let (env, _) = scope(&["r"]);
        let halt = halted(run(&mut machine_with(act("r", bind("r", 1_i64)), env), 5));
        assert_eq!(error_name(&halt.error).as_deref(), Some("NoAmbient"));
    }

    #[test]
    fn actor_constructor_application_requires_complete_arguments() {
        let (env, vars) = scope(&["Counter", "init", "cfg"]);
        let program = seq(vec![
            create_actor("Counter", &["start", "handlers"], Instr::Skip),
            apply("Counter", vec![var("init"), var("cfg")]),
        ]);
        let mut machine = machine_with(program, env);
        match run(&mut machine, 10) {
            ComputeResult::Suspended(barrier) => assert!(barrier.ptr_eq(&vars[1])),
            other => panic!("expected suspend, got {other:?}"),
        }
        bind_cell(&vars[1], &Value::Int(5)).unwrap();
        assert!(matches!(run(&mut machine, 10), ComputeResult::Finished));
        match vars[2].resolve().unwrap() {
            Value::ActorCfg(cfg) => assert_eq!(cfg.args, vec![Value::Int(5)]),
            other => panic!("expected actor configuration, got {other:?}"),
        }
    }
}

mod debugging {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Debugger for Recorder {
        fn before_instr(&mut self, instr: &Instr, _env: &Env, _machine: &Machine) {
            self.events.lock().unwrap().push(instr.summary());
        }

        fn at_boundary(&mut self, boundary: &Boundary, _machine: &Machine) {
            self.events.lock().unwrap().push(format!("{boundary:?}"));
        }
    }

    #[test]
    fn hook_observes_instructions_and_boundaries() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (env, vars) = scope(&["x"]);
        let mut machine = machine_with(seq(vec![bind("x", 1_i64)]), env);
        machine.set_debugger(Some(Box::new(Recorder {
            events: Arc::clone(&events),
        })));
        assert!(matches!(run(&mut machine, 10), ComputeResult::Finished));
        assert_eq!(vars[0].resolve().unwrap(), Value::Int(1));
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "Resume".to_string(),
                "seq/1".to_string(),
                "x = 1".to_string(),
                "Finish".to_string(),
            ]
        );
    }
}
