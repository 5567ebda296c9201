//! Query cycles: one search action end to end.
//!
//! `trigger_search` supersedes the running cycle, announces the resets and
//! spawns the hospital and plan pipelines. Progress comes back as
//! [`CycleEvent`]s on one channel; every event names its cycle so a
//! consumer ([`SearchView`]) can drop anything a superseded cycle still
//! manages to send.

use crate::datasets::{Hospital, Measures, Plan, ResultList};
use crate::error::{FinderError, Result};
use crate::finder::Finder;
use crate::location::Identifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub type CycleId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Target {
    Hospitals,
    Plans,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The target's list was cleared for a new cycle.
    Reset(Target),
    HospitalsSorted(ResultList<Hospital>),
    /// Secondary enrichment landed for one provider (empty on failure).
    MeasuresAttached {
        provider_number: String,
        measures: Measures,
    },
    PlansSorted(ResultList<Plan>),
    Failed { target: Target, error: FinderError },
    /// Nothing more will arrive for this target in this cycle.
    Settled(Target),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleEvent {
    pub cycle: CycleId,
    pub kind: EventKind,
}

/// Handed to every task of a cycle; observes cancellation.
#[derive(Clone)]
pub struct CycleToken {
    id: CycleId,
    cancel: watch::Receiver<bool>,
}

impl CycleToken {
    pub fn id(&self) -> CycleId {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Run one suspended step, bounded by `timeout` and by cancellation.
    pub async fn run<T, F>(&self, what: &str, timeout: Duration, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = cancelled(self.cancel.clone()) => Err(FinderError::Cancelled(self.id)),
            outcome = tokio::time::timeout(timeout, step) => match outcome {
                Ok(result) => result,
                Err(_) => Err(FinderError::Timeout { what: what.to_string(), secs: timeout.as_secs() }),
            },
        }
    }
}

async fn cancelled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        // Sender gone means the controller itself went away.
        if rx.changed().await.is_err() {
            return;
        }
    }
}

struct QueryCycle {
    id: CycleId,
    started_at: DateTime<Utc>,
    cancel: watch::Sender<bool>,
}

#[derive(Default)]
struct ControllerState {
    last_id: CycleId,
    current: Option<QueryCycle>,
}

pub struct SearchController {
    finder: Arc<Finder>,
    events: mpsc::UnboundedSender<CycleEvent>,
    state: Mutex<ControllerState>,
    runtime: Handle,
}

impl SearchController {
    pub fn new(finder: Arc<Finder>, runtime: Handle) -> (Self, mpsc::UnboundedReceiver<CycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            finder,
            events: tx,
            state: Mutex::new(ControllerState::default()),
            runtime,
        };
        (controller, rx)
    }

    /// Start a new cycle for `identifier`, cancelling the one in flight.
    pub fn trigger_search(&self, identifier: Identifier) -> CycleId {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let id = state.last_id + 1;
        state.last_id = id;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let previous = state.current.replace(QueryCycle {
            id,
            started_at: Utc::now(),
            cancel: cancel_tx,
        });
        if let Some(prev) = previous {
            let _ = prev.cancel.send(true);
            let ran = Utc::now().signed_duration_since(prev.started_at);
            info!(cycle = prev.id, ran_ms = ran.num_milliseconds(), "superseded query cycle");
        }

        // Resets go out while the lock is held so they stay in cycle order.
        emit(&self.events, id, EventKind::Reset(Target::Hospitals));
        emit(&self.events, id, EventKind::Reset(Target::Plans));
        drop(state);

        info!(cycle = id, fields = identifier.len(), "query cycle started");
        let token = CycleToken { id, cancel: cancel_rx };
        self.runtime.spawn(run_hospitals(
            self.finder.clone(),
            token.clone(),
            identifier.clone(),
            self.events.clone(),
        ));
        self.runtime.spawn(run_plans(
            self.finder.clone(),
            token,
            identifier,
            self.events.clone(),
        ));
        id
    }

    /// Cancel the running cycle, if any.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cycle) = state.current.take() {
            let _ = cycle.cancel.send(true);
            info!(cycle = cycle.id, "query cycle cancelled");
        }
    }

    pub fn current_cycle(&self) -> Option<CycleId> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.current.as_ref().map(|c| c.id)
    }
}

fn emit(events: &mpsc::UnboundedSender<CycleEvent>, cycle: CycleId, kind: EventKind) {
    if events.send(CycleEvent { cycle, kind }).is_err() {
        debug!(cycle, "event receiver dropped");
    }
}

async fn run_hospitals(
    finder: Arc<Finder>,
    token: CycleToken,
    identifier: Identifier,
    events: mpsc::UnboundedSender<CycleEvent>,
) {
    let id = token.id();
    let fetched = token
        .run("hospital list", finder.call_timeout(), finder.hospitals.fetch_hospitals(&identifier))
        .await;

    match fetched {
        Ok(list) => {
            let mut providers: Vec<String> = list.iter().map(|h| h.provider_number().to_string()).collect();
            providers.sort_unstable();
            providers.dedup();
            emit(&events, id, EventKind::HospitalsSorted(list));

            let mut tasks = JoinSet::new();
            for provider in providers {
                let finder = finder.clone();
                let token = token.clone();
                let events = events.clone();
                tasks.spawn(async move {
                    let measures = match token
                        .run("measures", finder.measures_timeout(), finder.hospitals.fetch_measures(&provider))
                        .await
                    {
                        Ok(measures) => measures,
                        Err(FinderError::Cancelled(_)) => return,
                        Err(e) => {
                            warn!(cycle = token.id(), provider = %provider, error = %e, "measures unavailable");
                            Measures::default()
                        }
                    };
                    emit(
                        &events,
                        token.id(),
                        EventKind::MeasuresAttached {
                            provider_number: provider,
                            measures,
                        },
                    );
                });
            }
            while tasks.join_next().await.is_some() {}
        }
        Err(FinderError::Cancelled(_)) => {
            debug!(cycle = id, "hospital pipeline cancelled");
            return;
        }
        Err(error) => {
            warn!(cycle = id, %error, "hospital pipeline failed");
            emit(&events, id, EventKind::Failed { target: Target::Hospitals, error });
        }
    }

    if !token.is_cancelled() {
        emit(&events, id, EventKind::Settled(Target::Hospitals));
    }
}

async fn run_plans(
    finder: Arc<Finder>,
    token: CycleToken,
    identifier: Identifier,
    events: mpsc::UnboundedSender<CycleEvent>,
) {
    let id = token.id();
    let fetched = token
        .run("plan list", finder.call_timeout(), finder.plans.fetch_plans(&identifier))
        .await;

    match fetched {
        Ok(list) => emit(&events, id, EventKind::PlansSorted(list)),
        Err(FinderError::Cancelled(_)) => {
            debug!(cycle = id, "plan pipeline cancelled");
            return;
        }
        Err(error) => {
            warn!(cycle = id, %error, "plan pipeline failed");
            emit(&events, id, EventKind::Failed { target: Target::Plans, error });
        }
    }

    if !token.is_cancelled() {
        emit(&events, id, EventKind::Settled(Target::Plans));
    }
}

/// Consumer-side state of the latest cycle: what a UI would render.
#[derive(Debug, Default)]
pub struct SearchView {
    pub cycle: Option<CycleId>,
    pub hospitals: ResultList<Hospital>,
    pub plans: ResultList<Plan>,
    pub failures: Vec<(Target, FinderError)>,
    hospitals_settled: bool,
    plans_settled: bool,
}

impl SearchView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event in. Returns false if it belonged to a stale cycle.
    pub fn apply(&mut self, event: CycleEvent) -> bool {
        let CycleEvent { cycle, kind } = event;
        if let EventKind::Reset(_) = kind {
            if self.cycle.is_some_and(|current| cycle < current) {
                return false;
            }
            if self.cycle != Some(cycle) {
                self.cycle = Some(cycle);
                self.failures.clear();
                self.hospitals_settled = false;
                self.plans_settled = false;
            }
        } else if self.cycle != Some(cycle) {
            debug!(event_cycle = cycle, current = ?self.cycle, "dropping stale event");
            return false;
        }

        match kind {
            EventKind::Reset(Target::Hospitals) => self.hospitals.reset(),
            EventKind::Reset(Target::Plans) => self.plans.reset(),
            EventKind::HospitalsSorted(list) => self.hospitals.replace(list),
            EventKind::MeasuresAttached { provider_number, measures } => {
                self.hospitals.attach_measures(&provider_number, &measures);
            }
            EventKind::PlansSorted(list) => self.plans.replace(list),
            EventKind::Failed { target, error } => self.failures.push((target, error)),
            EventKind::Settled(Target::Hospitals) => self.hospitals_settled = true,
            EventKind::Settled(Target::Plans) => self.plans_settled = true,
        }
        true
    }

    /// Both pipelines of the current cycle have finished.
    pub fn is_settled(&self) -> bool {
        self.hospitals_settled && self.plans_settled
    }
}
