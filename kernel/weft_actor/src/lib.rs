#![allow(
    clippy::result_large_err,
    reason = "Signal carries a KernelError inline; boxing would add an allocation to every suspend"
)]
//! Weft Actor - the scheduler that hosts kernel machines.
//!
//! Each actor owns one `weft_kernel::Machine` and a prioritized mailbox.
//! Workers run actors one turn at a time; a machine that suspends on an
//! unbound cell gives its worker back and is rescheduled by the message
//! that binds the cell.
//!
//! # Modules
//!
//! - `system`: worker pool, run queues, the address directory
//! - `mailbox`: actor states and message priority
//! - `actor`: turns, `act` children and free-variable sync triggers
//! - `stream`: multi-response requests consumed through an iterator
//! - `image`: prebuilt handlers shared by many actors
//! - `probe`: an endpoint for code outside the system
//!
//! # Tracing
//!
//! Call [`init_tracing`] and set `WEFT_LOG` (or `RUST_LOG`):
//!
//! ```bash
//! WEFT_LOG=weft_actor=debug cargo test
//! ```

mod actor;
mod actor_ref;
mod address;
pub mod config;
mod envelope;
mod errors;
mod image;
mod logging;
mod mailbox;
mod natives;
mod probe;
mod stream;
mod system;

pub use actor_ref::{ActorRef, MessageSink};
pub use address::{Address, RequestId};
pub use config::{ConfigError, SchedulerMode, SystemConfig, DEFAULT_STEP_BUDGET};
pub use envelope::{Body, Control, Envelope, EnvelopeKind};
pub use errors::{ImageError, SendError, SpawnError};
pub use image::{ActorImage, IMAGE_STEP_LIMIT};
pub use logging::{init_tracing, LOG_ENV};
pub use mailbox::ActorState;
pub use natives::register as register_natives;
pub use probe::Probe;
pub use stream::{batch, eof, StreamIter, StreamPoll};
pub use system::{ActorSource, ActorSystem};
