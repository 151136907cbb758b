//! Connection pool (§4.3): bounded global and per-host admission over an
//! otherwise opaque transport.
//!
//! Built on a `tokio::sync::Semaphore` and `try_acquire` to reject
//! immediately rather than queue. This component needs two nested
//! admission checks — a global cap on total sockets and a per-host cap —
//! so it keeps one semaphore for each scope.
//!
//! The orchestrator's pipeline reserves pool capacity (step 5) *before* an
//! endpoint has been chosen (step 6), so acquisition is split into two
//! phases: [`ConnectionPool::acquire_global`] reserves a global slot
//! up front as pure admission control, and [`GlobalSlot::bind_host`] is
//! called once an endpoint is known, to reserve the per-host slot and
//! produce the final RAII [`Handle`]. If the per-host cap is saturated the
//! global slot is released automatically (the `GlobalSlot` is consumed by
//! value either way).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::PoolConfig;
use crate::error::CallError;

struct HostSlot {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
}

/// A reserved global admission slot, not yet bound to a host.
pub struct GlobalSlot {
    permit: OwnedSemaphorePermit,
    total_active: Arc<AtomicUsize>,
}

/// A held connection slot. Releases both the global and per-host permits
/// when dropped.
pub struct Handle {
    _global: OwnedSemaphorePermit,
    _host: OwnedSemaphorePermit,
    host_active: Arc<AtomicUsize>,
    total_active: Arc<AtomicUsize>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.host_active.fetch_sub(1, Ordering::AcqRel);
        self.total_active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Point-in-time pool occupancy, per §4.3's observability requirement:
/// `{active, idle, waiting, totalRequests}`.
///
/// `idle` and `waiting` are always zero here: this pool is a fail-fast
/// admission gate (`try_acquire`, never a queue), so there is never a
/// handle sitting idle between `acquire`/`release` calls, nor a caller
/// parked waiting for one — a rejection is immediate and the caller
/// arbitrates retry through the breaker and selector instead. Both fields
/// are kept on the struct rather than dropped so this shape stays a
/// drop-in match for the spec's counters if a queueing discipline is ever
/// added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub active: usize,
    pub idle: usize,
    pub waiting: usize,
    pub total_requests: usize,
    pub max_sockets: usize,
    pub per_host_max: usize,
}

/// Two-phase semaphore-based admission: a global cap shared by every host,
/// and a per-host cap created lazily on first use.
pub struct ConnectionPool {
    config: PoolConfig,
    global: Arc<Semaphore>,
    total_active: Arc<AtomicUsize>,
    total_requests: AtomicUsize,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        let max_sockets = config.max_sockets;
        Self {
            config,
            global: Arc::new(Semaphore::new(max_sockets)),
            total_active: Arc::new(AtomicUsize::new(0)),
            total_requests: AtomicUsize::new(0),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn host_slot(&self, host: &str) -> (Arc<Semaphore>, Arc<AtomicUsize>) {
        let mut hosts = self.hosts.lock().expect("connection pool host map mutex poisoned");
        let slot = hosts.entry(host.to_string()).or_insert_with(|| HostSlot {
            semaphore: Arc::new(Semaphore::new(self.config.max_sockets_per_host)),
            active: Arc::new(AtomicUsize::new(0)),
        });
        (slot.semaphore.clone(), slot.active.clone())
    }

    /// Phase one: reserve a global slot, independent of which endpoint will
    /// eventually be selected. Never blocks.
    pub fn acquire_global(&self) -> Result<GlobalSlot, CallError> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let active = self.config.max_sockets.saturating_sub(self.global.available_permits());
        let permit = self
            .global
            .clone()
            .try_acquire_owned()
            .map_err(|_| CallError::NoConnection { active, max: self.config.max_sockets })?;
        Ok(GlobalSlot { permit, total_active: self.total_active.clone() })
    }

    /// Phase two: bind a reserved global slot to the chosen host's
    /// per-host cap, producing the final handle. The global slot is
    /// consumed either way; on a per-host rejection it is simply dropped,
    /// releasing the global permit back to the pool.
    pub fn bind_host(&self, slot: GlobalSlot, host: &str) -> Result<Handle, CallError> {
        let (host_semaphore, host_active_counter) = self.host_slot(host);
        let host_active = self.config.max_sockets_per_host.saturating_sub(host_semaphore.available_permits());
        let host_permit = host_semaphore.try_acquire_owned().map_err(|_| CallError::NoConnection {
            active: host_active,
            max: self.config.max_sockets_per_host,
        })?;

        host_active_counter.fetch_add(1, Ordering::AcqRel);
        self.total_active.fetch_add(1, Ordering::AcqRel);

        Ok(Handle {
            _global: slot.permit,
            _host: host_permit,
            host_active: host_active_counter,
            total_active: self.total_active.clone(),
        })
    }

    /// Convenience for call sites that already know the host (tests,
    /// single-endpoint configurations): acquires both phases at once.
    pub fn try_acquire(&self, host: &str) -> Result<Handle, CallError> {
        let slot = self.acquire_global()?;
        self.bind_host(slot, host)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.total_active.load(Ordering::Acquire),
            idle: 0,
            waiting: 0,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            max_sockets: self.config.max_sockets,
            per_host_max: self.config.max_sockets_per_host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max_sockets: usize, max_sockets_per_host: usize) -> ConnectionPool {
        let config = PoolConfig { max_sockets, max_sockets_per_host, ..PoolConfig::default() };
        ConnectionPool::new(config)
    }

    #[test]
    fn admits_calls_within_both_caps() {
        let pool = pool(10, 10);
        let handle = pool.try_acquire("a.example").unwrap();
        assert_eq!(pool.stats().active, 1);
        drop(handle);
        assert_eq!(pool.stats().active, 0);
    }

    #[test]
    fn rejects_once_per_host_cap_is_saturated() {
        let pool = pool(10, 2);
        let _h1 = pool.try_acquire("a.example").unwrap();
        let _h2 = pool.try_acquire("a.example").unwrap();
        let err = pool.try_acquire("a.example").unwrap_err();
        assert!(err.is_no_connection());

        // A different host is unaffected.
        assert!(pool.try_acquire("b.example").is_ok());
    }

    #[test]
    fn rejects_once_global_cap_is_saturated_even_across_hosts() {
        let pool = pool(2, 10);
        let _h1 = pool.try_acquire("a.example").unwrap();
        let _h2 = pool.try_acquire("b.example").unwrap();
        let err = pool.try_acquire("c.example").unwrap_err();
        assert!(err.is_no_connection());
    }

    #[test]
    fn dropping_a_handle_frees_both_permits() {
        let pool = pool(1, 1);
        {
            let _h = pool.try_acquire("a.example").unwrap();
            assert!(pool.try_acquire("a.example").is_err());
        }
        assert!(pool.try_acquire("a.example").is_ok());
    }

    #[test]
    fn per_host_rejection_releases_the_reserved_global_slot() {
        let pool = pool(1, 0);
        let slot = pool.acquire_global().unwrap();
        let err = pool.bind_host(slot, "a.example").unwrap_err();
        assert!(err.is_no_connection());
        // The global permit was released when `GlobalSlot` was dropped on
        // the error path, so a fresh acquisition still succeeds.
        assert!(pool.acquire_global().is_ok());
    }

    #[test]
    fn global_slot_can_be_bound_after_endpoint_selection() {
        let pool = pool(5, 5);
        let slot = pool.acquire_global().unwrap();
        let handle = pool.bind_host(slot, "chosen.example").unwrap();
        assert_eq!(pool.stats().active, 1);
        drop(handle);
    }

    #[test]
    fn total_requests_counts_every_acquisition_attempt_including_rejections() {
        let pool = pool(1, 10);
        let _h1 = pool.try_acquire("a.example").unwrap();
        let _ = pool.try_acquire("a.example"); // rejected: global cap saturated
        let _ = pool.try_acquire("a.example"); // rejected again
        assert_eq!(pool.stats().total_requests, 3);
    }

    #[test]
    fn idle_and_waiting_are_always_zero_for_this_fail_fast_gate() {
        let pool = pool(10, 10);
        let _h = pool.try_acquire("a.example").unwrap();
        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.waiting, 0);
    }
}
