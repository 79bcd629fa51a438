mod allocation;
mod directory;
mod error;
mod facility;
mod inventory;
mod mutations;
mod queries;

pub use directory::VehicleDirectory;
pub use error::EngineError;
pub use facility::FacilityState;
pub use inventory::SpotInventory;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, error, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

pub type SharedFacilityState = Arc<RwLock<FacilityState>>;

const WAL_CHANNEL_CAPACITY: usize = 4096;

type Ack = oneshot::Sender<io::Result<()>>;

// ── Group-commit WAL writer ──────────────────────────────

pub(crate) enum WalCommand {
    Append { event: Event, response: Ack },
    Compact { events: Vec<Event>, response: Ack },
    AppendsSinceCompact { response: oneshot::Sender<u64> },
}

/// Sole owner of the WAL. Appends already queued when a flush starts are
/// written together and share one fsync. Control commands keep their place
/// in the queue: pending appends are committed before they run.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut pending: Vec<(Event, Ack)> = Vec::new();
    while let Some(first) = rx.recv().await {
        let mut control = match first {
            WalCommand::Append { event, response } => {
                pending.push((event, response));
                None
            }
            other => Some(other),
        };
        while control.is_none() {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => pending.push((event, response)),
                Ok(other) => control = Some(other),
                Err(_) => break,
            }
        }
        if !pending.is_empty() {
            commit_batch(&mut wal, &mut pending);
        }
        if let Some(cmd) = control {
            run_control(&mut wal, cmd);
        }
    }
    debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, Ack)>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    // A failed batch leaves nothing behind on disk, so later batches never
    // sit after a torn frame. Every caller in the batch sees the failure.
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    let result = match appended {
        Ok(()) => wal.flush_sync(),
        Err(e) => {
            wal.discard_staged();
            Err(e)
        }
    };
    if let Err(e) = &result {
        error!("WAL batch of {} events failed: {e}", batch.len());
    }

    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, ack) in batch.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = ack.send(reply);
    }
}

fn run_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = wal.compact(&events);
            if result.is_ok() {
                metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
            }
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            commit_batch(wal, &mut vec![(event, response)]);
        }
    }
}

async fn send_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::WalError(e.to_string()))
}

// ── Engine ───────────────────────────────────────────────

/// A plate held in the index by a park that has not committed. Dropping it
/// uncommitted hands the plate back.
pub(super) struct PlateClaim {
    plates: Arc<DashMap<String, Ulid>>,
    plate: String,
    committed: bool,
}

impl PlateClaim {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PlateClaim {
    fn drop(&mut self) {
        if !self.committed {
            self.plates.remove(&self.plate);
        }
    }
}

/// Every facility, each behind its own lock, plus the engine-wide plate index.
///
/// A facility's write lock is held for the whole snapshot → plan → log →
/// apply sequence of a park or unpark. That lock is what keeps two vehicles
/// off the same spot.
pub struct Engine {
    facilities: DashMap<Ulid, SharedFacilityState>,
    /// License plate → facility the vehicle is parked in.
    plates: Arc<DashMap<String, Ulid>>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Held shared by every mutation and exclusively by compaction, so a
    /// compaction snapshot never misses an in-flight append.
    commit_gate: Arc<RwLock<()>>,
    /// Serializes facility creation and deletion.
    catalog: Mutex<()>,
}

/// Apply a committed vehicle event and keep the plate index in step.
fn apply_event(
    fs: &mut FacilityState,
    event: &Event,
    plates: &DashMap<String, Ulid>,
) -> Result<(), EngineError> {
    match event {
        Event::VehicleParked { license_plate, .. } => {
            fs.apply(event)?;
            plates.insert(license_plate.clone(), fs.id);
        }
        Event::VehicleUnparked { vehicle_id, .. } => {
            let plate = fs.vehicles.get(vehicle_id).map(|v| v.license_plate.clone());
            fs.apply(event)?;
            if let Some(plate) = plate {
                plates.remove(&plate);
            }
        }
        Event::FacilityCreated { .. } | Event::FacilityDeleted { .. } => {}
    }
    metrics::gauge!(observability::SPOTS_OCCUPIED, "facility" => fs.id.to_string())
        .set(fs.count_occupied() as f64);
    Ok(())
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the writer task. Needs a Tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        // Rebuild in plain maps; nothing else can see this state yet.
        let mut facilities: HashMap<Ulid, FacilityState> = HashMap::new();
        let plates = Arc::new(DashMap::new());
        for event in &events {
            match event {
                Event::FacilityCreated {
                    id,
                    name,
                    declared,
                    spots,
                } => {
                    facilities.insert(*id, FacilityState::new(*id, name.clone(), *declared, spots));
                }
                Event::FacilityDeleted { id } => {
                    facilities.remove(id);
                }
                other => {
                    let facility_id = other.facility_id();
                    let Some(fs) = facilities.get_mut(&facility_id) else {
                        warn!("replay: event for unknown facility {facility_id}, skipped");
                        continue;
                    };
                    if let Err(e) = apply_event(fs, other, &plates) {
                        warn!("replay: event for facility {facility_id} rejected: {e}");
                    }
                }
            }
        }
        debug!(
            "replayed {} events into {} facilities",
            events.len(),
            facilities.len()
        );

        let engine = Self {
            facilities: DashMap::new(),
            plates,
            wal_tx,
            commit_gate: Arc::new(RwLock::new(())),
            catalog: Mutex::new(()),
        };
        for (id, fs) in facilities {
            engine.facilities.insert(id, Arc::new(RwLock::new(fs)));
        }
        metrics::gauge!(observability::FACILITIES_ACTIVE).set(engine.facilities.len() as f64);
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        send_append(&self.wal_tx, event).await
    }

    pub fn get_facility(&self, id: &Ulid) -> Option<SharedFacilityState> {
        self.facilities.get(id).map(|e| e.value().clone())
    }

    pub(super) fn facility(&self, id: &Ulid) -> Result<SharedFacilityState, EngineError> {
        self.get_facility(id).ok_or(EngineError::NotFound(*id))
    }

    /// Facility currently holding the vehicle with this plate.
    pub fn facility_for_plate(&self, plate: &str) -> Option<Ulid> {
        self.plates.get(plate).map(|e| *e.value())
    }

    /// WAL-append then apply, on a detached task that owns the facility write
    /// lock. Once started, the commit finishes even if the caller is dropped,
    /// so a durable event is never left unapplied. A plate claim riding along
    /// is settled by the same task.
    pub(super) async fn persist_and_apply(
        &self,
        gate: OwnedRwLockReadGuard<()>,
        mut guard: OwnedRwLockWriteGuard<FacilityState>,
        event: Event,
        claim: Option<PlateClaim>,
    ) -> Result<OwnedRwLockWriteGuard<FacilityState>, EngineError> {
        let wal_tx = self.wal_tx.clone();
        let plates = self.plates.clone();
        let commit = tokio::spawn(async move {
            let _gate = gate;
            send_append(&wal_tx, &event).await?;
            apply_event(&mut guard, &event, &plates)?;
            if let Some(claim) = claim {
                claim.commit();
            }
            Ok::<_, EngineError>(guard)
        });
        commit
            .await
            .map_err(|e| EngineError::WalError(format!("commit task failed: {e}")))?
    }

    /// Reserve a plate in the engine-wide index for a park in progress.
    pub(super) fn claim_plate(
        &self,
        plate: &str,
        facility_id: Ulid,
    ) -> Result<PlateClaim, EngineError> {
        match self.plates.entry(plate.to_string()) {
            Entry::Occupied(_) => Err(EngineError::AlreadyParked(plate.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(facility_id);
                Ok(PlateClaim {
                    plates: self.plates.clone(),
                    plate: plate.to_string(),
                    committed: false,
                })
            }
        }
    }

    /// Lookup plate → facility, acquire that facility's write lock.
    pub(super) async fn resolve_plate_write(
        &self,
        plate: &str,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<FacilityState>), EngineError> {
        let facility_id = self
            .facility_for_plate(plate)
            .ok_or_else(|| EngineError::VehicleNotFound(plate.to_string()))?;
        let guard = self.facility(&facility_id)?.write_owned().await;
        Ok((facility_id, guard))
    }
}
