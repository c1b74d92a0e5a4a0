//! Per-port concurrency gates
//!
//! Each port gets a counting semaphore sized by its configured limit, created
//! lazily on first use. Ports without a limit are admitted immediately but
//! still tracked for in-flight counts. Waiting suspends the task only.
//!
//! A permit covers one pipeline invocation, not the handler's task. When the
//! timeout middleware abandons a request the permit is released as soon as
//! the 504 is returned, while the handler task may keep running. Under
//! sustained timeouts more than `max_concurrent` handlers can therefore be
//! executing at once; only admitted invocations are bounded.

use crate::common::{RelayError, RelayResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

#[derive(Debug)]
struct Gate {
    semaphore: Option<Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
}

impl Gate {
    fn new(limit: Option<usize>, in_flight: Arc<AtomicUsize>) -> Self {
        Self {
            semaphore: limit.map(|permits| Arc::new(Semaphore::new(permits))),
            in_flight,
        }
    }
}

/// Admission held for the duration of one invocation. Dropping it releases
/// the permit, including on error or panic.
#[derive(Debug)]
pub struct GatePermit {
    _permit: Option<OwnedSemaphorePermit>,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Concurrency gates keyed by port name
#[derive(Debug, Default)]
pub struct ConcurrencyGates {
    limits: Mutex<HashMap<String, usize>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
}

impl ConcurrencyGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gates for `(port, limit)` pairs
    pub fn with_limits<'a, I>(limits: I) -> RelayResult<Self>
    where
        I: IntoIterator<Item = (&'a str, usize)>,
    {
        let gates = Self::new();
        for (port, limit) in limits {
            gates.set_limit(port, limit)?;
        }
        Ok(gates)
    }

    /// Configure `port`'s limit. An existing gate is replaced; permits already
    /// held against the old gate stay valid until released.
    pub fn set_limit(&self, port: &str, limit: usize) -> RelayResult<()> {
        if limit == 0 {
            return Err(RelayError::config(format!(
                "max_concurrent for port '{}' must be at least 1",
                port
            )));
        }
        self.limits.lock().insert(port.to_string(), limit);

        let mut gates = self.gates.lock();
        if let Some(existing) = gates.get(port) {
            let in_flight = Arc::clone(&existing.in_flight);
            gates.insert(port.to_string(), Arc::new(Gate::new(Some(limit), in_flight)));
        }
        info!("Port {} max_concurrent = {}", port, limit);
        Ok(())
    }

    pub fn limit(&self, port: &str) -> Option<usize> {
        self.limits.lock().get(port).copied()
    }

    /// Wait for admission to `port`
    pub async fn acquire(&self, port: &str) -> GatePermit {
        let gate = self.gate(port);
        let permit = match &gate.semaphore {
            Some(semaphore) => {
                if semaphore.available_permits() == 0 {
                    debug!("Port {} at capacity, waiting for a permit", port);
                }
                // The semaphore is never closed, so acquisition only fails
                // if that changes; admit rather than reject in that case.
                Arc::clone(semaphore).acquire_owned().await.ok()
            }
            None => None,
        };
        gate.in_flight.fetch_add(1, Ordering::AcqRel);
        GatePermit {
            _permit: permit,
            in_flight: Arc::clone(&gate.in_flight),
        }
    }

    /// Invocations currently admitted on `port`
    pub fn in_flight(&self, port: &str) -> usize {
        self.gates
            .lock()
            .get(port)
            .map(|gate| gate.in_flight.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Free permits on `port`; `None` when unbounded
    pub fn available_permits(&self, port: &str) -> Option<usize> {
        let gates = self.gates.lock();
        match gates.get(port) {
            Some(gate) => gate
                .semaphore
                .as_ref()
                .map(|semaphore| semaphore.available_permits()),
            None => self.limit(port),
        }
    }

    fn gate(&self, port: &str) -> Arc<Gate> {
        let limit = self.limit(port);
        let mut gates = self.gates.lock();
        let gate = gates.entry(port.to_string()).or_insert_with(|| {
            debug!("Created gate for port {} (limit {:?})", port, limit);
            Arc::new(Gate::new(limit, Arc::new(AtomicUsize::new(0))))
        });
        Arc::clone(gate)
    }
}
