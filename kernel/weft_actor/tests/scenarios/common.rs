//! Shared fixtures for the scenario tests.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use weft_actor::{ActorState, ActorSystem, Address, SystemConfig};
use weft_kernel::instr::build::{create_proc, local, proc_def, rec, seq, var};
use weft_kernel::{ActorCfg, Closure, FailedValue, Instr, Value};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Long enough for a wrongly delivered message to show up.
pub const QUIET: Duration = Duration::from_millis(200);

pub fn system() -> ActorSystem {
    system_with(SystemConfig::default().with_workers(2))
}

pub fn system_with(config: SystemConfig) -> ActorSystem {
    weft_actor::init_tracing();
    ActorSystem::new(config).unwrap()
}

/// One handler procedure: its feature name, parameters and body.
pub struct Handler {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub body: Instr,
}

pub fn handler(name: &'static str, params: &'static [&'static str], body: Instr) -> Handler {
    Handler { name, params, body }
}

/// The body of a constructor that binds `handlers` to a record of the
/// given procedures.
pub fn constructor_body(handlers: Vec<Handler>) -> Instr {
    let names: Vec<String> = handlers.iter().map(|h| format!("{}_handler", h.name)).collect();
    let mut steps = Vec::with_capacity(handlers.len() + 1);
    let mut fields = Vec::with_capacity(handlers.len());
    for (handler, local_name) in handlers.into_iter().zip(&names) {
        steps.push(create_proc(local_name, handler.params, handler.body));
        fields.push((handler.name, var(local_name)));
    }
    steps.push(rec("handlers", None, fields));
    let locals: Vec<&str> = names.iter().map(String::as_str).collect();
    local(&locals, seq(steps))
}

/// A configuration for a handler actor whose constructor takes no
/// arguments besides the handlers cell.
pub fn handler_cfg(system: &ActorSystem, handlers: Vec<Handler>) -> Arc<ActorCfg> {
    cfg_from_body(system, &[], constructor_body(handlers), Vec::new())
}

/// A configuration whose constructor runs `body` with `params` bound to
/// `args` and a trailing `handlers` parameter.
pub fn cfg_from_body(
    system: &ActorSystem,
    params: &[&str],
    body: Instr,
    args: Vec<Value>,
) -> Arc<ActorCfg> {
    let mut all: Vec<&str> = params.to_vec();
    all.push("handlers");
    let cfgtr = Closure::new(proc_def(&all, body), system.root_env().clone());
    Arc::new(ActorCfg { cfgtr, args })
}

/// Poll until the actor at `address` reaches `state`.
pub fn wait_for_state(system: &ActorSystem, address: &str, state: ActorState) -> bool {
    let address = Address::new(address);
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if system.state(&address) == Some(state) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

pub fn failed(value: &Value) -> FailedValue {
    FailedValue::from_value(value)
        .unwrap_or_else(|| panic!("expected a failed value, got {value}"))
}
