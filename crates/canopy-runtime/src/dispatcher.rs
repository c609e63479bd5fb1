#![forbid(unsafe_code)]

//! Background execution of dispatched mutations.
//!
//! Each [`Dispatch`] runs on its own worker thread; the result comes back as
//! a [`Completion`] over an mpsc channel. Only request and response data
//! cross threads, so the `!Send` stores never leave the owning thread:
//!
//! ```text
//! owning thread                         worker
//! ─────────────                         ──────
//! orchestrator.next_dispatch() ──────▶  backend.execute(request)
//! orchestrator.settle(..)      ◀──────  Completion { ticket, outcome }
//! ```

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, debug_span, warn};
use web_time::Instant;

use crate::backend::TreatmentBackend;
use crate::error::{BackendError, Result};
use crate::mutation::{Dispatch, Ticket};
use crate::orchestrator::{Settlement, TreatmentOrchestrator};

/// Backend answer for one dispatched ticket.
#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub outcome: std::result::Result<(), BackendError>,
    pub elapsed: Duration,
}

/// Sends exactly one completion, even if the worker unwinds.
struct CompletionGuard {
    tx: Sender<Completion>,
    ticket: Ticket,
    started: Instant,
    sent: bool,
}

impl CompletionGuard {
    fn finish(mut self, outcome: std::result::Result<(), BackendError>) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: std::result::Result<(), BackendError>) {
        if self.sent {
            return;
        }
        self.sent = true;
        let _ = self.tx.send(Completion {
            ticket: self.ticket,
            outcome,
            elapsed: self.started.elapsed(),
        });
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.send(Err(BackendError::Disconnected));
    }
}

/// Runs backend mutations off the owning thread.
pub struct MutationDispatcher<B> {
    backend: Arc<B>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    outstanding: usize,
}

impl<B: TreatmentBackend + 'static> MutationDispatcher<B> {
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            tx,
            rx,
            outstanding: 0,
        }
    }

    /// Start executing `dispatch` on a worker thread.
    ///
    /// If the thread cannot be spawned the ticket still completes, with
    /// [`BackendError::Disconnected`], so the optimistic change rolls back.
    pub fn dispatch(&mut self, dispatch: Dispatch) {
        let Dispatch { ticket, request } = dispatch;
        let backend = Arc::clone(&self.backend);
        let guard = CompletionGuard {
            tx: self.tx.clone(),
            ticket,
            started: Instant::now(),
            sent: false,
        };
        self.outstanding += 1;

        let spawned = thread::Builder::new()
            .name(format!("canopy-mutation-{}", ticket.0))
            .spawn(move || {
                let _span = debug_span!("canopy.dispatch.worker", ticket = ticket.0).entered();
                let outcome = backend.execute(&request);
                guard.finish(outcome);
            });

        // On failure the closure, and with it the guard, has been dropped.
        if let Err(err) = spawned {
            warn!(%ticket, error = %err, "mutation worker failed to start");
        }
    }

    /// Completions that have already arrived, without blocking.
    pub fn poll(&mut self) -> Vec<Completion> {
        let completions: Vec<Completion> = self.rx.try_iter().collect();
        self.outstanding = self.outstanding.saturating_sub(completions.len());
        completions
    }

    /// Block up to `timeout` for the next completion.
    pub fn wait(&mut self, timeout: Duration) -> Option<Completion> {
        if self.outstanding == 0 {
            return None;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.outstanding -= 1;
                Some(completion)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Dispatched tickets that have not delivered a completion yet.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Hand every mutation the orchestrator releases to a worker.
    pub fn dispatch_ready(&mut self, orchestrator: &mut TreatmentOrchestrator<B>) -> usize {
        let mut started = 0;
        while let Some(dispatch) = orchestrator.next_dispatch() {
            self.dispatch(dispatch);
            started += 1;
        }
        started
    }

    /// Settle whatever has arrived, then release the next queued mutations.
    pub fn settle_ready(
        &mut self,
        orchestrator: &mut TreatmentOrchestrator<B>,
    ) -> Vec<Result<Settlement>> {
        let settled: Vec<Result<Settlement>> = self
            .poll()
            .into_iter()
            .map(|completion| settle_one(orchestrator, completion))
            .collect();
        self.dispatch_ready(orchestrator);
        settled
    }

    /// Drive the orchestrator until nothing is queued or in flight, or until
    /// `timeout` passes without a completion.
    pub fn run_until_idle(
        &mut self,
        orchestrator: &mut TreatmentOrchestrator<B>,
        timeout: Duration,
    ) -> Vec<Result<Settlement>> {
        let mut settled = Vec::new();
        self.dispatch_ready(orchestrator);
        while let Some(completion) = self.wait(timeout) {
            settled.push(settle_one(orchestrator, completion));
            self.dispatch_ready(orchestrator);
        }
        settled
    }
}

fn settle_one<B: TreatmentBackend>(
    orchestrator: &mut TreatmentOrchestrator<B>,
    completion: Completion,
) -> Result<Settlement> {
    debug!(
        ticket = %completion.ticket,
        elapsed_ms = completion.elapsed.as_millis() as u64,
        "mutation completion received"
    );
    orchestrator.settle(completion.ticket, completion.outcome)
}
