//! The actor system: worker pool, run queues and the address directory.
//!
//! Runnable actors travel over crossbeam channels. In [`SchedulerMode::Shared`]
//! every worker drains one queue; in [`SchedulerMode::Pinned`] each worker
//! owns a queue and an actor always lands on the worker chosen when it was
//! created. Workers exit once the shutdown channel disconnects.

use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use weft_kernel::{ActorCfg, Env, Ident, Instr, Registry, Var};

use crate::actor::{Actor, Start};
use crate::actor_ref::ActorRef;
use crate::address::{Address, RequestId};
use crate::config::{SchedulerMode, SystemConfig};
use crate::envelope::{Control, Envelope};
use crate::errors::{ImageError, SendError, SpawnError};
use crate::image::{self, ActorImage};
use crate::mailbox::ActorState;
use crate::natives;

/// What a spawned actor runs.
pub enum ActorSource {
    /// Run the constructor, then answer requests with its handlers.
    Config(Arc<ActorCfg>),
    /// Answer requests with prebuilt handlers.
    Image(ActorImage),
    /// A one-shot body run in the root environment extended with
    /// `bindings`. The actor terminates when the body finishes.
    Program {
        body: Arc<Instr>,
        bindings: Vec<(Ident, Var)>,
    },
}

enum Queues {
    Shared(Sender<Arc<Actor>>),
    Pinned(Vec<Sender<Arc<Actor>>>),
}

/// State reachable from every actor through a weak reference.
pub(crate) struct SystemShared {
    config: SystemConfig,
    root_env: Env,
    directory: DashMap<Address, Arc<Actor>>,
    queues: Queues,
    workers: usize,
    next_worker: AtomicUsize,
    next_child: AtomicU64,
}

impl SystemShared {
    pub(crate) fn root_env(&self) -> &Env {
        &self.root_env
    }

    pub(crate) fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Hand a `Scheduled` actor to a worker.
    pub(crate) fn schedule(&self, actor: Arc<Actor>) {
        let queue = match &self.queues {
            Queues::Shared(queue) => queue,
            Queues::Pinned(queues) => &queues[actor.worker() % queues.len()],
        };
        if let Err(err) = queue.send(actor) {
            tracing::debug!(address = %err.0.address(), "run queue closed; turn dropped");
        }
    }

    /// Create an unregistered child of `parent`. The caller starts it.
    pub(crate) fn launch_child(
        self: &Arc<Self>,
        parent: &Address,
        kind: &str,
        start: Start,
    ) -> Arc<Actor> {
        let n = self.next_child.fetch_add(1, Ordering::Relaxed);
        Actor::new(parent.child(kind, n), self, self.pick_worker(), start)
    }

    fn pick_worker(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers
    }
}

pub struct ActorSystem {
    shared: Arc<SystemShared>,
    /// Dropping this sender stops the workers.
    shutdown: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl ActorSystem {
    /// A system whose actors see the kernel and actor natives.
    pub fn new(config: SystemConfig) -> io::Result<Self> {
        Self::with_registry(config, Registry::with_kernel_natives())
    }

    /// A system whose actors see the natives of `registry` plus the actor
    /// natives.
    pub fn with_registry(config: SystemConfig, mut registry: Registry) -> io::Result<Self> {
        natives::register(&mut registry);
        let worker_count = config.effective_workers();
        let (shutdown, stop) = channel::bounded::<()>(0);

        let (queues, receivers): (Queues, Vec<Receiver<Arc<Actor>>>) = match config.scheduler {
            SchedulerMode::Shared => {
                let (tx, rx) = channel::unbounded();
                (Queues::Shared(tx), vec![rx; worker_count])
            }
            SchedulerMode::Pinned => {
                let (txs, rxs) = (0..worker_count).map(|_| channel::unbounded()).unzip();
                (Queues::Pinned(txs), rxs)
            }
        };

        let shared = Arc::new(SystemShared {
            root_env: registry.root_env(),
            directory: DashMap::new(),
            queues,
            workers: worker_count,
            next_worker: AtomicUsize::new(0),
            next_child: AtomicU64::new(0),
            config,
        });

        let mut workers = Vec::with_capacity(worker_count);
        for (index, queue) in receivers.into_iter().enumerate() {
            let stop = stop.clone();
            let handle = thread::Builder::new()
                .name(format!("weft-worker-{index}"))
                .stack_size(weft_kernel::WORKER_STACK_SIZE)
                .spawn(move || worker_loop(&queue, &stop))?;
            workers.push(handle);
        }
        tracing::debug!(
            workers = worker_count,
            scheduler = ?shared.config.scheduler,
            step_budget = shared.config.step_budget,
            "actor system started"
        );

        Ok(ActorSystem {
            shared,
            shutdown: Some(shutdown),
            workers,
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.shared.config
    }

    /// The environment every actor's computations start from.
    pub fn root_env(&self) -> &Env {
        &self.shared.root_env
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<SystemShared> {
        &self.shared
    }

    /// Create an actor registered under `address` and start it.
    ///
    /// Addresses are never reused, including those of terminated actors.
    pub fn spawn(
        &self,
        address: impl Into<Address>,
        source: ActorSource,
    ) -> Result<ActorRef, SpawnError> {
        let start = match source {
            ActorSource::Config(cfg) => Start::Construct(cfg),
            ActorSource::Image(image) => Start::Handlers(image.handlers().clone()),
            ActorSource::Program { body, bindings } => Start::Program {
                body,
                env: self.shared.root_env.extend(bindings),
                result: Var::new(),
                reply_to: None,
            },
        };
        self.register(address.into(), start)
    }

    /// Run `body` as a one-shot actor at `address`. Once `result` is
    /// complete it is sent to `requester` under the returned request id; an
    /// uncaught error is sent there as a failed value instead.
    pub fn run(
        &self,
        address: impl Into<Address>,
        body: Arc<Instr>,
        bindings: Vec<(Ident, Var)>,
        result: Var,
        requester: ActorRef,
    ) -> Result<RequestId, SpawnError> {
        let id = RequestId::fresh();
        let start = Start::Program {
            body,
            env: self.shared.root_env.extend(bindings),
            result,
            reply_to: Some((requester, id)),
        };
        self.register(address.into(), start)?;
        Ok(id)
    }

    fn register(&self, address: Address, start: Start) -> Result<ActorRef, SpawnError> {
        if self.shutdown.is_none() {
            return Err(SpawnError::SystemDown);
        }
        let actor = match self.shared.directory.entry(address.clone()) {
            Entry::Occupied(_) => return Err(SpawnError::DuplicateAddress(address)),
            Entry::Vacant(slot) => {
                let actor = Actor::new(address, &self.shared, self.shared.pick_worker(), start);
                slot.insert(Arc::clone(&actor));
                actor
            }
        };
        tracing::debug!(address = %actor.address(), worker = actor.worker(), "spawned");
        actor.start();
        Ok(actor.actor_ref())
    }

    pub fn lookup(&self, address: &Address) -> Option<ActorRef> {
        self.shared
            .directory
            .get(address)
            .map(|actor| actor.actor_ref())
    }

    /// Deliver `envelope` to the actor registered at `address`.
    pub fn send(&self, address: &Address, envelope: Envelope) -> Result<(), SendError> {
        let actor = self
            .shared
            .directory
            .get(address)
            .map(|actor| Arc::clone(actor.value()))
            .ok_or_else(|| SendError::UnknownAddress(address.clone()))?;
        actor.deliver(envelope)
    }

    /// Send an unacknowledged stop to `address`.
    pub fn stop(&self, address: &Address) -> Result<(), SendError> {
        self.send(address, Envelope::control(Control::Stop))
    }

    pub fn state(&self, address: &Address) -> Option<ActorState> {
        self.shared.directory.get(address).map(|actor| actor.state())
    }

    /// Run the constructor of `cfg` once on the calling thread.
    pub fn build_image(&self, cfg: &ActorCfg) -> Result<ActorImage, ImageError> {
        image::build(cfg, &self.shared.root_env, self.shared.config.step_budget)
    }

    /// Stop the workers and wait for them. Queued turns are dropped.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.shutdown.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
        self.shared.directory.clear();
        tracing::debug!("actor system shut down");
    }
}

impl Drop for ActorSystem {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(queue: &Receiver<Arc<Actor>>, stop: &Receiver<()>) {
    loop {
        crossbeam::select! {
            recv(queue) -> actor => match actor {
                Ok(actor) => actor.run_turn(),
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }
}
