//! Poller — registry of per-device polling loops.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use netwarden_snmp::{FetchBudget, ProtocolClient};
use netwarden_state::{Device, DeviceId, InventoryChange, StateStore};

use crate::cycle::{Collector, PollReport, cancelled};
use crate::error::PollError;

/// Per-device loop state.
struct LoopSlot {
    /// Distinguishes a restarted loop from the one it replaced.
    generation: u64,
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

struct Shared {
    collector: Collector,
    /// Active loops: device_id → slot.
    loops: RwLock<HashMap<DeviceId, LoopSlot>>,
    /// Held for the duration of a cycle so polls of one device never overlap.
    cycle_locks: Mutex<HashMap<DeviceId, Arc<tokio::sync::Mutex<()>>>>,
    generations: AtomicU64,
}

impl Shared {
    fn cycle_lock(&self, device_id: DeviceId) -> Arc<tokio::sync::Mutex<()>> {
        match self.cycle_locks.lock() {
            Ok(mut locks) => locks.entry(device_id).or_default().clone(),
            Err(poisoned) => poisoned.into_inner().entry(device_id).or_default().clone(),
        }
    }

    fn forget_cycle_lock(&self, device_id: DeviceId) {
        if let Ok(mut locks) = self.cycle_locks.lock() {
            locks.remove(&device_id);
        }
    }

    /// Run one cycle under the device's cycle lock.
    async fn cycle(
        &self,
        device_id: DeviceId,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<PollReport, PollError> {
        // Unknown ids must not leave a lock entry behind.
        if self.collector.store.get_device(device_id)?.is_none() {
            self.forget_cycle_lock(device_id);
            return Err(PollError::DeviceNotFound(device_id));
        }
        let lock = self.cycle_lock(device_id);
        let _guard = tokio::select! {
            biased;
            _ = cancelled(shutdown) => {
                return Ok(PollReport {
                    device_id,
                    readings: Vec::new(),
                    alerts: Vec::new(),
                    failures: Vec::new(),
                    cancelled: true,
                });
            }
            guard = lock.lock() => guard,
        };
        let result = self.collector.run(device_id, shutdown).await;
        if matches!(result, Err(PollError::DeviceNotFound(_))) {
            self.forget_cycle_lock(device_id);
        }
        result
    }
}

/// Owns one polling loop per device.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct Poller {
    shared: Arc<Shared>,
}

impl Poller {
    pub fn new(store: StateStore, client: Arc<dyn ProtocolClient>, budget: FetchBudget) -> Self {
        Self {
            shared: Arc::new(Shared {
                collector: Collector {
                    store,
                    client,
                    budget,
                },
                loops: RwLock::new(HashMap::new()),
                cycle_locks: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    fn store(&self) -> &StateStore {
        &self.shared.collector.store
    }

    /// Start one loop per stored device. Returns the number started.
    pub async fn start_all(&self) -> Result<usize, PollError> {
        let devices = self.store().list_devices()?;
        for device in &devices {
            self.start(device).await;
        }
        info!(devices = devices.len(), "poller started");
        Ok(devices.len())
    }

    /// Start polling `device`, replacing any loop already running for it.
    ///
    /// The loop keeps the interval it was started with; restart it to
    /// pick up a changed interval.
    pub async fn start(&self, device: &Device) {
        let device_id = device.id;
        let interval = device.interval();
        let generation = self.shared.generations.fetch_add(1, Ordering::Relaxed);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Hold the registry while spawning so the new loop cannot
        // deregister itself before it has been registered.
        let mut loops = self.shared.loops.write().await;
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            run_device_loop(shared, device_id, interval, generation, shutdown_rx).await;
        });
        let previous = loops.insert(
            device_id,
            LoopSlot {
                generation,
                handle,
                shutdown_tx,
            },
        );
        drop(loops);

        if let Some(old) = previous {
            shutdown_slot(device_id, old).await;
        }
        info!(device_id, interval_secs = interval.as_secs(), "poll loop started");
    }

    /// Stop polling a device and wait for its loop to acknowledge.
    ///
    /// Returns false if no loop was running.
    pub async fn stop(&self, device_id: DeviceId) -> bool {
        let slot = self.shared.loops.write().await.remove(&device_id);
        match slot {
            Some(slot) => {
                shutdown_slot(device_id, slot).await;
                info!(device_id, "poll loop stopped");
                true
            }
            None => false,
        }
    }

    /// Re-read the device and start a fresh loop for it, or stop its
    /// loop if the device is gone.
    pub async fn restart(&self, device_id: DeviceId) -> Result<(), PollError> {
        match self.store().get_device(device_id)? {
            Some(device) => self.start(&device).await,
            None => {
                self.stop(device_id).await;
            }
        }
        Ok(())
    }

    /// Stop every loop (graceful shutdown). Returns once all loops
    /// have exited.
    pub async fn stop_all(&self) {
        let slots: Vec<(DeviceId, LoopSlot)> = self.shared.loops.write().await.drain().collect();
        for (_, slot) in &slots {
            let _ = slot.shutdown_tx.send(true);
        }
        let count = slots.len();
        for (device_id, slot) in slots {
            if let Err(e) = slot.handle.await {
                warn!(device_id, error = %e, "poll loop ended abnormally");
            }
        }
        info!(loops = count, "all poll loops stopped");
    }

    /// Bring loop membership in line with one inventory change.
    pub async fn reconcile(&self, change: InventoryChange) -> Result<(), PollError> {
        debug!(?change, "reconciling poll loops");
        match change {
            InventoryChange::DeviceAdded(id) | InventoryChange::DeviceUpdated(id) => {
                self.restart(id).await
            }
            InventoryChange::DeviceRemoved(id) => {
                self.stop(id).await;
                self.shared.forget_cycle_lock(id);
                Ok(())
            }
        }
    }

    /// Poll a device once, right now, independent of its loop.
    ///
    /// Waits for an in-progress cycle of the same device to finish
    /// first.
    pub async fn poll_once(&self, device_id: DeviceId) -> Result<PollReport, PollError> {
        // On-demand polls are not tied to any loop's shutdown signal.
        let (_keep, mut never) = watch::channel(false);
        self.shared.cycle(device_id, &mut never).await
    }

    /// Device ids with a running loop, sorted.
    pub async fn active_loops(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.shared.loops.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn is_polling(&self, device_id: DeviceId) -> bool {
        self.shared.loops.read().await.contains_key(&device_id)
    }
}

async fn shutdown_slot(device_id: DeviceId, slot: LoopSlot) {
    let _ = slot.shutdown_tx.send(true);
    if let Err(e) = slot.handle.await {
        warn!(device_id, error = %e, "poll loop ended abnormally");
    }
}

/// The polling loop for one device.
async fn run_device_loop(
    shared: Arc<Shared>,
    device_id: DeviceId,
    interval: std::time::Duration,
    generation: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(device_id, "poll loop running");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancelled(&mut shutdown) => break,
        }

        let cycle = AssertUnwindSafe(shared.cycle(device_id, &mut shutdown))
            .catch_unwind()
            .await;
        match cycle {
            Ok(Ok(report)) if report.cancelled => break,
            Ok(Ok(_)) => {}
            Ok(Err(PollError::DeviceNotFound(_))) => {
                info!(device_id, "device no longer exists, poll loop exiting");
                deregister(&shared, device_id, generation).await;
                break;
            }
            Ok(Err(e)) => warn!(device_id, error = %e, "poll cycle failed"),
            Err(panic) => {
                error!(device_id, panic = panic_message(panic.as_ref()), "poll cycle panicked");
            }
        }
    }

    debug!(device_id, "poll loop exited");
}

/// Remove this loop's slot unless it has already been replaced.
async fn deregister(shared: &Shared, device_id: DeviceId, generation: u64) {
    let mut loops = shared.loops.write().await;
    if loops.get(&device_id).is_some_and(|slot| slot.generation == generation) {
        loops.remove(&device_id);
    }
    drop(loops);
    shared.forget_cycle_lock(device_id);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
