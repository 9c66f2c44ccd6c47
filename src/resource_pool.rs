//! Bounded pool of render resources
//!
//! Hands out at most `capacity` resources at a time. Each allocation is tied to
//! a slot id that is never issued twice while held, and is returned through a
//! [`ResourceLease`].

use crate::{CrawlError, RenderBackend, Shutdown, Viewport};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct PoolSlots {
    free: VecDeque<usize>,
    issued: BTreeSet<usize>,
}

impl PoolSlots {
    fn new(capacity: usize) -> Self {
        Self {
            free: (0..capacity).collect(),
            issued: BTreeSet::new(),
        }
    }

    fn checkout(&mut self) -> Option<usize> {
        let slot = self.free.pop_front()?;
        self.issued.insert(slot);
        Some(slot)
    }

    fn checkin(&mut self, slot: usize) {
        if self.issued.remove(&slot) {
            self.free.push_back(slot);
        } else {
            warn!("Slot {} returned to pool but was not issued", slot);
        }
    }
}

pub struct ResourcePool<B: RenderBackend> {
    backend: Arc<B>,
    // Never held across an await, so checkout and checkin cannot be cancelled half way.
    slots: Arc<Mutex<PoolSlots>>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    shutdown: Shutdown,
    total_allocations: Arc<AtomicUsize>,
}

impl<B: RenderBackend> ResourcePool<B> {
    pub fn new(backend: B, capacity: usize, shutdown: Shutdown) -> Self {
        info!("Resource pool created with capacity {}", capacity);
        Self {
            backend: Arc::new(backend),
            slots: Arc::new(Mutex::new(PoolSlots::new(capacity))),
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            shutdown,
            total_allocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn shutdown_signal(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slots(&self) -> MutexGuard<'_, PoolSlots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a free slot and create a resource for it.
    ///
    /// Blocks until a slot frees up or the shutdown signal fires. On any error,
    /// or if the returned future is dropped before completing, nothing stays
    /// checked out.
    pub async fn allocate(&self, viewport: &Viewport) -> Result<ResourceLease<B>, CrawlError> {
        if self.shutdown.is_triggered() {
            return Err(CrawlError::Cancelled);
        }

        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => permit?,
            _ = self.shutdown.cancelled() => return Err(CrawlError::Cancelled),
        };

        // A resource that finishes together with shutdown is still taken, so it
        // can be released instead of dropped.
        let created = tokio::select! {
            biased;
            created = self.backend.allocate(viewport) => created,
            _ = self.shutdown.cancelled() => Err(CrawlError::Cancelled),
        };

        let resource = match created {
            Ok(resource) => resource,
            Err(e @ (CrawlError::Cancelled | CrawlError::AllocationFailed(_))) => return Err(e),
            Err(other) => return Err(CrawlError::AllocationFailed(other.to_string())),
        };

        // The permit guarantees a free slot; checkout and lease construction
        // happen without an await in between.
        let slot = self.slots().checkout();
        let Some(slot) = slot else {
            self.backend.release(resource).await;
            return Err(CrawlError::AllocationFailed(
                "no free slot despite available permit".to_string(),
            ));
        };

        self.total_allocations.fetch_add(1, Ordering::Relaxed);
        debug!("Allocated render resource in slot {}", slot);
        Ok(ResourceLease {
            resource: Some(resource),
            slot,
            checked_out: true,
            pool: self.clone(),
            permit: Some(permit),
        })
    }

    fn checkin(&self, slot: usize) {
        self.slots().checkin(slot);
        debug!("Released render resource in slot {}", slot);
    }

    pub async fn get_stats(&self) -> PoolStats {
        let slots = self.slots();
        PoolStats {
            capacity: self.capacity,
            outstanding: slots.issued.len(),
            available: slots.free.len(),
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
        }
    }

    /// Trigger the shutdown signal and tear down the backend.
    pub async fn shutdown(&self) {
        info!("Shutting down resource pool...");
        self.shutdown.trigger();
        self.backend.shutdown().await;
        info!("Resource pool shutdown complete");
    }
}

impl<B: RenderBackend> Clone for ResourcePool<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            slots: self.slots.clone(),
            semaphore: self.semaphore.clone(),
            capacity: self.capacity,
            shutdown: self.shutdown.clone(),
            total_allocations: self.total_allocations.clone(),
        }
    }
}

/// Exclusive ownership of one pooled resource.
///
/// Call [`release`](Self::release) when done. A lease dropped without being
/// released is returned by a background task instead.
pub struct ResourceLease<B: RenderBackend> {
    resource: Option<B::Resource>,
    slot: usize,
    checked_out: bool,
    pool: ResourcePool<B>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<B: RenderBackend> ResourceLease<B> {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn resource(&self) -> &B::Resource {
        // Only `release` and `drop` take the resource, and both consume the lease.
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("lease used after release"),
        }
    }

    /// Destroy the resource, then free the slot and the permit.
    ///
    /// If this future is dropped part way, the slot and permit are still
    /// returned when the lease drops.
    pub async fn release(mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.backend.release(resource).await;
        }
        self.return_slot();
    }

    fn return_slot(&mut self) {
        if std::mem::take(&mut self.checked_out) {
            self.pool.checkin(self.slot);
        }
        // The permit goes back only after the slot is free again.
        drop(self.permit.take());
    }
}

impl<B: RenderBackend> Drop for ResourceLease<B> {
    fn drop(&mut self) {
        match self.resource.take() {
            Some(resource) => {
                let pool = self.pool.clone();
                let slot = self.slot;
                let checked_out = std::mem::take(&mut self.checked_out);
                let permit = self.permit.take();

                tokio::spawn(async move {
                    pool.backend.release(resource).await;
                    if checked_out {
                        pool.checkin(slot);
                    }
                    drop(permit);
                });
            }
            None => self.return_slot(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub outstanding: usize,
    pub available: usize,
    pub total_allocations: usize,
}
