//! Single-flight registry of live runs: job name -> pause/stop signals.
//!
//! A run registers before it starts and holds the returned `Registration` until it
//! has fully wound down; a second registration for the same name is refused. Runs in
//! other processes are kept out by the job's lock file, which the registration holds.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::lock::JobLock;
use crate::worker::JobSignals;

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobSignals>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live run for `name`. `None` if one is already registered.
    pub fn try_register(self: &Arc<Self>, name: &str) -> Option<Registration> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(name) {
            return None;
        }
        let signals = Arc::new(JobSignals::new());
        jobs.insert(name.to_string(), Arc::clone(&signals));
        Some(Registration {
            registry: Arc::clone(self),
            name: name.to_string(),
            signals,
            lock: None,
        })
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn unregister(&self, name: &str) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

/// Proof of a live registration; unregisters on drop.
pub struct Registration {
    registry: Arc<JobRegistry>,
    name: String,
    signals: Arc<JobSignals>,
    lock: Option<JobLock>,
}

impl Registration {
    pub fn signals(&self) -> &Arc<JobSignals> {
        &self.signals
    }

    /// Keep the job's lock file locked until this registration is dropped.
    pub(crate) fn hold(&mut self, lock: JobLock) {
        self.lock = Some(lock);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.name);
    }
}
