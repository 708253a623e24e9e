//! Per-actor message queues and the actor state machine.
//!
//! The mailbox is the only actor structure touched by other threads. Every
//! state transition happens under its lock; message processing does not.
//!
//! ```text
//! Waiting ──send──▶ Scheduled ──turn──▶ Active ──┬──▶ Scheduled
//!                                                ├──▶ Waiting
//!                                                ├──▶ Successful
//!                                                └──▶ Failed
//! ```

use std::collections::VecDeque;
use std::fmt;

use crate::envelope::{Envelope, EnvelopeKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorState {
    /// Nothing runnable.
    Waiting,
    /// Queued for a worker.
    Scheduled,
    /// A worker is running a turn.
    Active,
    Successful,
    Failed,
}

impl ActorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActorState::Successful | ActorState::Failed)
    }
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of [`Mailbox::push`].
#[derive(Debug)]
pub(crate) enum Delivery {
    Queued,
    /// The actor moved to `Scheduled` and must be handed to a worker.
    Schedule,
    /// The actor is terminal; the envelope is returned.
    Rejected(Envelope),
}

#[derive(Debug)]
pub(crate) struct Mailbox {
    state: ActorState,
    /// A computation is in flight; requests wait until it ends.
    busy: bool,
    control: VecDeque<Envelope>,
    responses: VecDeque<Envelope>,
    requests: VecDeque<Envelope>,
}

impl Mailbox {
    pub(crate) fn new(busy: bool) -> Self {
        Mailbox {
            state: ActorState::Waiting,
            busy,
            control: VecDeque::new(),
            responses: VecDeque::new(),
            requests: VecDeque::new(),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> ActorState {
        self.state
    }

    pub(crate) fn push(&mut self, envelope: Envelope) -> Delivery {
        if self.state.is_terminal() {
            return Delivery::Rejected(envelope);
        }
        match envelope.kind() {
            EnvelopeKind::Control => self.control.push_back(envelope),
            EnvelopeKind::Response => self.responses.push_back(envelope),
            EnvelopeKind::Request | EnvelopeKind::Notify => self.requests.push_back(envelope),
        }
        if self.state == ActorState::Waiting && self.is_executable() {
            self.state = ActorState::Scheduled;
            Delivery::Schedule
        } else {
            Delivery::Queued
        }
    }

    /// Whether a turn would have something to do.
    fn is_executable(&self) -> bool {
        !self.control.is_empty()
            || !self.responses.is_empty()
            || (!self.busy && !self.requests.is_empty())
    }

    /// Start a turn: move to `Active` and take the next batch.
    ///
    /// One control message, else every pending response, else (when idle)
    /// one request or notify. Returns `None` unless the actor was
    /// `Scheduled`.
    pub(crate) fn begin_turn(&mut self) -> Option<Vec<Envelope>> {
        if self.state != ActorState::Scheduled {
            return None;
        }
        self.state = ActorState::Active;
        Some(self.next_batch())
    }

    fn next_batch(&mut self) -> Vec<Envelope> {
        if let Some(control) = self.control.pop_front() {
            return vec![control];
        }
        if !self.responses.is_empty() {
            return self.responses.drain(..).collect();
        }
        if !self.busy {
            if let Some(request) = self.requests.pop_front() {
                return vec![request];
            }
        }
        Vec::new()
    }

    /// End a turn. `resume` queues a self-addressed resume.
    ///
    /// Returns whether the actor must be rescheduled.
    pub(crate) fn end_turn(&mut self, busy: bool, resume: Option<Envelope>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.busy = busy;
        if let Some(resume) = resume {
            self.control.push_back(resume);
        }
        if self.is_executable() {
            self.state = ActorState::Scheduled;
            true
        } else {
            self.state = ActorState::Waiting;
            false
        }
    }

    /// Move to a terminal state and hand back everything still queued.
    pub(crate) fn terminate(&mut self, state: ActorState) -> Vec<Envelope> {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.busy = false;
        let mut drained: Vec<Envelope> = self.control.drain(..).collect();
        drained.extend(self.responses.drain(..));
        drained.extend(self.requests.drain(..));
        drained
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use super::*;
    use crate::address::RequestId;
    use crate::envelope::Control;
    use crate::envelope::Body;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use weft_kernel::Value;

    fn request(tag: i64) -> Envelope {
        Envelope {
            request_id: Some(RequestId::fresh()),
            sender: None,
            body: Body::Request(Value::Int(tag)),
        }
    }

    fn kinds(batch: &[Envelope]) -> Vec<EnvelopeKind> {
        batch.iter().map(Envelope::kind).collect()
    }

    #[test]
    fn first_send_schedules() {
        let mut mailbox = Mailbox::new(false);
        assert!(matches!(mailbox.push(request(1)), Delivery::Schedule));
        assert!(matches!(mailbox.push(request(2)), Delivery::Queued));
        assert_eq!(mailbox.state(), ActorState::Scheduled);
    }

    #[test]
    fn priority_order() {
        // Requests from A, control from B and a response C, arriving in
        // that order, are taken as B, C, A.
        let mut mailbox = Mailbox::new(false);
        let a = request(1);
        let b = Envelope::control(Control::Resume);
        let c = Envelope::response(RequestId::fresh(), Value::Int(3));
        for envelope in [&a, &b, &c] {
            mailbox.push(envelope.clone());
        }

        let mut order = Vec::new();
        while let Some(batch) = mailbox.begin_turn() {
            order.extend(batch);
            mailbox.end_turn(false, None);
        }
        let tags: Vec<_> = order.iter().map(|e| (e.kind(), e.request_id)).collect();
        let expected: Vec<_> = [b, c, a].iter().map(|e| (e.kind(), e.request_id)).collect();
        assert_eq!(tags, expected);
        assert_eq!(mailbox.state(), ActorState::Waiting);
    }

    #[test]
    fn responses_are_batched() {
        let mut mailbox = Mailbox::new(true);
        mailbox.push(Envelope::response(RequestId::fresh(), Value::Int(1)));
        mailbox.push(Envelope::response(RequestId::fresh(), Value::Int(2)));
        let batch = mailbox.begin_turn().unwrap();
        assert_eq!(kinds(&batch), vec![EnvelopeKind::Response; 2]);
    }

    #[test]
    fn requests_wait_while_busy() {
        let mut mailbox = Mailbox::new(true);
        assert!(matches!(mailbox.push(request(1)), Delivery::Queued));
        assert_eq!(mailbox.state(), ActorState::Waiting);

        // A response wakes the actor, but the request stays queued.
        assert!(matches!(
            mailbox.push(Envelope::response(RequestId::fresh(), Value::Null)),
            Delivery::Schedule
        ));
        let batch = mailbox.begin_turn().unwrap();
        assert_eq!(kinds(&batch), vec![EnvelopeKind::Response]);

        // Once the computation ends the request becomes eligible.
        assert!(mailbox.end_turn(false, None));
        let batch = mailbox.begin_turn().unwrap();
        assert_eq!(kinds(&batch), vec![EnvelopeKind::Request]);
    }

    #[test]
    fn preemption_requeues_resume() {
        let mut mailbox = Mailbox::new(true);
        mailbox.push(Envelope::control(Control::Resume));
        mailbox.begin_turn().unwrap();
        assert!(mailbox.end_turn(true, Some(Envelope::control(Control::Resume))));
        assert_eq!(mailbox.state(), ActorState::Scheduled);
    }

    #[test]
    fn terminal_rejects_and_drains() {
        let mut mailbox = Mailbox::new(true);
        mailbox.push(request(1));
        mailbox.push(request(2));
        let drained = mailbox.terminate(ActorState::Successful);
        assert_eq!(drained.len(), 2);
        assert!(matches!(mailbox.push(request(3)), Delivery::Rejected(_)));
        assert!(!mailbox.end_turn(false, None));
        assert_eq!(mailbox.state(), ActorState::Successful);
    }

    /// An envelope of class `class` (0 control, 1 response, 2 request,
    /// 3 notify) carrying a fresh id to tell it apart.
    fn of_class(class: u8) -> Envelope {
        let id = RequestId::fresh();
        let body = match class {
            0 => Body::Control(Control::Resume),
            1 => Body::Response(Value::Null),
            2 => Body::Request(Value::Null),
            _ => Body::Notify(Value::Null),
        };
        Envelope {
            request_id: Some(id),
            sender: None,
            body,
        }
    }

    fn rank(kind: EnvelopeKind) -> u8 {
        match kind {
            EnvelopeKind::Control => 0,
            EnvelopeKind::Response => 1,
            EnvelopeKind::Request | EnvelopeKind::Notify => 2,
        }
    }

    proptest! {
        #[test]
        fn drains_by_class_then_arrival(classes in prop::collection::vec(0_u8..4, 0..24)) {
            let mut mailbox = Mailbox::new(false);
            let sent: Vec<Envelope> = classes.into_iter().map(of_class).collect();
            for envelope in &sent {
                mailbox.push(envelope.clone());
            }

            let mut taken = Vec::new();
            while let Some(batch) = mailbox.begin_turn() {
                prop_assert!(!batch.is_empty());
                taken.extend(batch);
                mailbox.end_turn(false, None);
            }

            // A stable sort by class keeps arrival order within a class.
            let mut expected = sent;
            expected.sort_by_key(|e| rank(e.kind()));
            let ids = |es: &[Envelope]| es.iter().map(|e| e.request_id).collect::<Vec<_>>();
            prop_assert_eq!(ids(&taken), ids(&expected));
            prop_assert_eq!(mailbox.state(), ActorState::Waiting);
        }
    }
}
