//! Per-kind setup registry.
//!
//! Workers report each resource kind they see; the first report of a kind
//! runs its manager setup and, when enabled, its webhook setup. The set of
//! started kinds belongs to the [`Orchestrator`] value and is cleared by
//! [`Orchestrator::shutdown`].
//!
//! Setup runs under a per-kind gate, so different kinds set up in parallel
//! and only reports of the same kind wait for each other.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::SetupError;

/// The setup steps run once per kind. Both must tolerate being re-run for a
/// kind whose previous attempt failed.
///
/// A step may call [`Orchestrator::is_started`] or observe other kinds, but
/// observing its own kind from inside its setup deadlocks.
pub trait KindSetup {
    fn setup_manager(&self, kind: &str) -> Result<(), SetupError>;

    fn setup_webhook(&self, kind: &str) -> Result<(), SetupError>;
}

#[derive(Debug)]
pub struct Orchestrator<S> {
    setup: S,
    webhooks: bool,
    started: RwLock<HashSet<String>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: KindSetup> Orchestrator<S> {
    pub fn new(setup: S, webhooks: bool) -> Self {
        Self { setup, webhooks, started: RwLock::default(), in_flight: Mutex::default() }
    }

    pub fn setup(&self) -> &S {
        &self.setup
    }

    /// Ensure `kind` has been set up. Returns `true` when this call did the
    /// setup, `false` when the kind was already started.
    ///
    /// A failed setup leaves the kind unstarted so the next report retries.
    pub fn observe(&self, kind: &str) -> Result<bool, SetupError> {
        if self.is_started(kind) {
            return Ok(false);
        }
        let gate = self.gate(kind);
        let result = {
            let _held = gate.lock().unwrap_or_else(PoisonError::into_inner);
            self.start(kind)
        };
        self.release(kind, &gate);
        result
    }

    fn start(&self, kind: &str) -> Result<bool, SetupError> {
        if self.is_started(kind) {
            return Ok(false);
        }
        self.setup.setup_manager(kind)?;
        if self.webhooks {
            self.setup.setup_webhook(kind)?;
        }
        self.started.write().unwrap_or_else(PoisonError::into_inner).insert(kind.to_string());
        tracing::info!(kind, webhooks = self.webhooks, "kind started");
        Ok(true)
    }

    fn gate(&self, kind: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.entry(kind.to_string()).or_default().clone()
    }

    /// Drop the gate once no other report holds it.
    fn release(&self, kind: &str, gate: &Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // the map and `gate` are the last two owners
        if Arc::strong_count(gate) == 2 {
            in_flight.remove(kind);
        }
    }

    pub fn is_started(&self, kind: &str) -> bool {
        self.started.read().unwrap_or_else(PoisonError::into_inner).contains(kind)
    }

    /// Started kinds, sorted.
    pub fn started_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self
            .started
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }

    pub fn shutdown(&self) {
        let mut started = self.started.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(count = started.len(), "orchestrator shutdown");
        started.clear();
    }
}

// ------------------------------- Tests ------------------------------------ //
