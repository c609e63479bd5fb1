#![forbid(unsafe_code)]

//! Ticketed mutation queue.
//!
//! Submitted mutations receive a monotonically increasing [`Ticket`] and carry
//! their rollback record from submission until they settle. Under
//! [`MutationPolicy::Queued`] at most one request is in flight and the rest
//! wait in FIFO order; under [`MutationPolicy::Concurrent`] every submission
//! may be dispatched immediately and the last response to settle wins.

use std::collections::VecDeque;
use std::fmt;

use canopy_core::{Action, RegistrySnapshot, StandId};
use serde::{Deserialize, Serialize};

use crate::backend::MutationRequest;
use crate::optimistic::Pending;

/// Identifies one submitted mutation until it settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the caller asked for, before scope is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Assign {
        action: Action,
        stand_ids: Vec<StandId>,
    },
    Remove {
        stand_ids: Vec<StandId>,
    },
}

impl Mutation {
    #[must_use]
    pub fn assign(action: impl Into<Action>, stand_ids: impl Into<Vec<StandId>>) -> Self {
        Self::Assign {
            action: action.into(),
            stand_ids: stand_ids.into(),
        }
    }

    #[must_use]
    pub fn remove(stand_ids: impl Into<Vec<StandId>>) -> Self {
        Self::Remove {
            stand_ids: stand_ids.into(),
        }
    }

    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::Remove { .. } => "remove",
        }
    }

    #[must_use]
    pub fn stand_ids(&self) -> &[StandId] {
        match self {
            Self::Assign { stand_ids, .. } | Self::Remove { stand_ids } => stand_ids,
        }
    }
}

/// How overlapping assign/remove calls are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationPolicy {
    /// One request in flight; later submissions wait in FIFO order.
    #[default]
    Queued,
    /// No ordering; whichever response settles last wins.
    Concurrent,
}

/// A request handed out for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub ticket: Ticket,
    pub request: MutationRequest,
}

#[derive(Debug)]
pub(crate) struct Tracked<P> {
    pub(crate) ticket: Ticket,
    pub(crate) request: MutationRequest,
    pub(crate) pending: P,
}

impl<P> Tracked<P> {
    fn dispatch(&self) -> Dispatch {
        Dispatch {
            ticket: self.ticket,
            request: self.request.clone(),
        }
    }
}

/// FIFO of waiting requests plus the table of in-flight ones.
///
/// Generic over the rollback record `P` so tests can use a plain value.
#[derive(Debug)]
pub struct MutationQueue<P = Pending<RegistrySnapshot>> {
    policy: MutationPolicy,
    next_ticket: u64,
    waiting: VecDeque<Tracked<P>>,
    in_flight: Vec<Tracked<P>>,
}

impl<P> MutationQueue<P> {
    #[must_use]
    pub fn new(policy: MutationPolicy) -> Self {
        Self {
            policy,
            next_ticket: 1,
            waiting: VecDeque::new(),
            in_flight: Vec::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> MutationPolicy {
        self.policy
    }

    /// Queue a request with its rollback record and return its ticket.
    pub fn enqueue(&mut self, request: MutationRequest, pending: P) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.waiting.push_back(Tracked {
            ticket,
            request,
            pending,
        });
        ticket
    }

    /// Whether the policy allows another request to start now.
    #[must_use]
    pub fn can_dispatch(&self) -> bool {
        match self.policy {
            MutationPolicy::Queued => self.in_flight.is_empty(),
            MutationPolicy::Concurrent => true,
        }
    }

    /// Move the oldest waiting request in flight, if the policy lets it start.
    pub fn pop_ready(&mut self) -> Option<Dispatch> {
        if !self.can_dispatch() {
            return None;
        }
        let tracked = self.waiting.pop_front()?;
        Some(self.fly(tracked))
    }

    /// Move a specific waiting request in flight regardless of its position.
    pub fn take_waiting(&mut self, ticket: Ticket) -> Option<Dispatch> {
        let index = self.waiting.iter().position(|t| t.ticket == ticket)?;
        let tracked = self.waiting.remove(index)?;
        Some(self.fly(tracked))
    }

    fn fly(&mut self, tracked: Tracked<P>) -> Dispatch {
        let dispatch = tracked.dispatch();
        self.in_flight.push(tracked);
        dispatch
    }

    pub(crate) fn take_in_flight(&mut self, ticket: Ticket) -> Option<Tracked<P>> {
        let index = self.in_flight.iter().position(|f| f.ticket == ticket)?;
        Some(self.in_flight.remove(index))
    }

    /// Requests not yet settled: in-flight ones first, then the waiting FIFO.
    ///
    /// Under [`MutationPolicy::Queued`] this is ticket order.
    pub fn outstanding(&self) -> impl Iterator<Item = &MutationRequest> {
        self.in_flight
            .iter()
            .chain(self.waiting.iter())
            .map(|t| &t.request)
    }

    /// Nothing waiting and nothing in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.waiting.is_empty() && self.in_flight.is_empty()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        !self.in_flight.is_empty()
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.waiting.len()
    }

    /// Drop everything. Ticket numbering continues so late completions
    /// never match a new ticket.
    pub fn clear(&mut self) {
        self.waiting.clear();
        self.in_flight.clear();
    }
}

impl<P> Default for MutationQueue<P> {
    fn default() -> Self {
        Self::new(MutationPolicy::default())
    }
}
