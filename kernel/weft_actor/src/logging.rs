//! Tracing setup for hosts and tests.

use std::sync::Once;

use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Filter variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "WEFT_LOG";

/// Directives applied under whatever the filter variable says, so a bare
/// level such as `WEFT_LOG=debug` does not also enable dependency logs.
const QUIET_DEPENDENCIES: &[&str] = &["crossbeam=warn", "dashmap=warn"];

/// Install a `tracing` subscriber for the actor system.
///
/// The filter comes from `WEFT_LOG`, else `RUST_LOG`; with neither set
/// nothing is installed. Events carry the worker thread name
/// (`weft-worker-N`), since one actor's turns may hop between workers.
/// Safe to call more than once.
///
/// ```bash
/// WEFT_LOG=weft_actor=debug cargo test
/// WEFT_LOG=weft_actor::actor=trace,weft_kernel=trace cargo test
/// ```
pub fn init_tracing() {
    INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*};

        let Some(filter) = filter_from(|key| std::env::var(key).ok()) else {
            return;
        };
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_names(true),
            )
            .with(filter)
            .try_init();
    });
}

fn filter_from(lookup: impl Fn(&str) -> Option<String>) -> Option<EnvFilter> {
    let spec = lookup(LOG_ENV).or_else(|| lookup("RUST_LOG"))?;
    let mut filter = EnvFilter::new(&spec);
    for directive in QUIET_DEPENDENCIES {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }
    Some(filter)
}
