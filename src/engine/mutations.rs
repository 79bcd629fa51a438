use std::sync::Arc;

use tokio::sync::{oneshot, OwnedRwLockReadGuard, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::allocation::{plan_park, plan_release};
use super::{Engine, EngineError, FacilityState, PlateClaim, SharedFacilityState, WalCommand};

fn validate_layout(layout: &FacilityLayout) -> Result<(), EngineError> {
    if layout.name.trim().is_empty() {
        return Err(EngineError::InvalidArgument("facility name must not be empty"));
    }
    if layout.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("facility name too long"));
    }
    if layout.spots.is_empty() {
        return Err(EngineError::InvalidArgument("facility needs at least one spot"));
    }
    if layout.spots.len() > MAX_SPOTS_PER_FACILITY {
        return Err(EngineError::LimitExceeded("too many spots in facility"));
    }
    Ok(())
}

fn validate_plate(plate: &str) -> Result<(), EngineError> {
    if plate.trim().is_empty() {
        return Err(EngineError::InvalidArgument("license plate must not be empty"));
    }
    if plate.len() > MAX_LICENSE_PLATE_LEN {
        return Err(EngineError::LimitExceeded("license plate too long"));
    }
    Ok(())
}

impl Engine {
    /// Create a facility from an operator layout. Spot ids are minted here and
    /// positions follow the order of `layout.spots`.
    pub async fn create_facility(&self, layout: FacilityLayout) -> Result<FacilityInfo, EngineError> {
        validate_layout(&layout)?;
        let id = layout.id.unwrap_or_else(Ulid::new);
        let declared = layout.declared();

        let _gate = self.commit_gate.read().await;
        let _catalog = self.catalog.lock().await;
        if self.facilities.len() >= MAX_FACILITIES {
            return Err(EngineError::LimitExceeded("too many facilities"));
        }
        if self.facilities.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let spots: Vec<(Ulid, SpotType)> = layout.spots.iter().map(|k| (Ulid::new(), *k)).collect();
        let fs = FacilityState::new(id, layout.name.clone(), declared, &spots);
        let event = Event::FacilityCreated {
            id,
            name: layout.name,
            declared,
            spots,
        };
        self.wal_append(&event).await?;

        let info = fs.info();
        self.facilities.insert(id, Arc::new(RwLock::new(fs)));
        metrics::gauge!(observability::FACILITIES_ACTIVE).set(self.facilities.len() as f64);
        info!("created facility {id} ({}) with {} spots", info.name, info.spots.len());
        Ok(info)
    }

    /// Remove an empty facility. Refused while any vehicle is parked in it.
    pub async fn delete_facility(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let _catalog = self.catalog.lock().await;
        let fs = self.facility(&id)?;
        // Write lock so no park can slip in between the check and the removal.
        let guard = fs.write().await;
        if !guard.vehicles.is_empty() {
            return Err(EngineError::FacilityInUse(id));
        }

        self.wal_append(&Event::FacilityDeleted { id }).await?;
        self.facilities.remove(&id);
        drop(guard);
        metrics::gauge!(observability::FACILITIES_ACTIVE).set(self.facilities.len() as f64);
        info!("deleted facility {id}");
        Ok(())
    }

    /// Park a vehicle in the given facility.
    ///
    /// The plate is claimed engine-wide before the facility lock is taken, so
    /// the same plate cannot be parked twice even across facilities. The claim
    /// is handed back if the park fails or the caller goes away first.
    pub async fn park(
        &self,
        facility_id: Ulid,
        license_plate: String,
        kind: VehicleType,
    ) -> Result<Allocation, EngineError> {
        validate_plate(&license_plate)?;
        let gate = self.commit_gate.clone().read_owned().await;
        let fs = self.facility(&facility_id)?;
        let claim = self.claim_plate(&license_plate, facility_id)?;

        let result = self
            .park_claimed(gate, &fs, claim, facility_id, &license_plate, kind)
            .await;
        match &result {
            Ok(allocation) => {
                metrics::counter!(observability::VEHICLES_PARKED_TOTAL, "type" => kind.as_str())
                    .increment(1);
                info!(
                    "parked {kind} {license_plate} in facility {facility_id} at spot {}{}",
                    allocation.spot.id,
                    if allocation.spots.len() > 1 { " (overflow)" } else { "" }
                );
            }
            Err(EngineError::NoAvailableSpot(_)) => {
                metrics::counter!(observability::PARK_REJECTED_TOTAL, "type" => kind.as_str())
                    .increment(1);
            }
            Err(_) => {}
        }
        result
    }

    async fn park_claimed(
        &self,
        gate: OwnedRwLockReadGuard<()>,
        fs: &SharedFacilityState,
        claim: PlateClaim,
        facility_id: Ulid,
        license_plate: &str,
        kind: VehicleType,
    ) -> Result<Allocation, EngineError> {
        let guard = fs.clone().write_owned().await;
        // The facility may have been deleted while we waited for the lock.
        if !self
            .get_facility(&facility_id)
            .is_some_and(|current| Arc::ptr_eq(&current, fs))
        {
            return Err(EngineError::NotFound(facility_id));
        }
        let reservation = plan_park(&guard.spots.list_available(), kind)?;

        let vehicle_id = Ulid::new();
        let event = Event::VehicleParked {
            facility_id,
            vehicle_id,
            license_plate: license_plate.to_string(),
            kind,
            spots: reservation.spots().to_vec(),
        };
        let guard = self.persist_and_apply(gate, guard, event, Some(claim)).await?;

        let spots = reservation
            .spots()
            .iter()
            .map(|id| guard.spot_info(id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Allocation {
            vehicle_id,
            license_plate: license_plate.to_string(),
            kind,
            spot: spots[0].clone(),
            spots,
        })
    }

    /// Unpark by license plate. Frees every spot the vehicle holds and reports
    /// the spot it was linked to.
    pub async fn unpark(&self, license_plate: &str) -> Result<Release, EngineError> {
        let gate = self.commit_gate.clone().read_owned().await;
        let (facility_id, guard) = self.resolve_plate_write(license_plate).await?;
        let vehicle = guard.vehicles.find_by_license_plate(license_plate)?.clone();
        let freed_ids = plan_release(&vehicle);

        let event = Event::VehicleUnparked {
            facility_id,
            vehicle_id: vehicle.id,
        };
        let guard = self.persist_and_apply(gate, guard, event, None).await?;

        let freed = freed_ids
            .iter()
            .map(|id| guard.spot_info(id))
            .collect::<Result<Vec<_>, _>>()?;
        let spot = guard.spot_info(&vehicle.reservation.linked())?;
        drop(guard);

        metrics::counter!(observability::VEHICLES_UNPARKED_TOTAL, "type" => vehicle.kind.as_str())
            .increment(1);
        info!(
            "unparked {} {license_plate} from facility {facility_id}, freed {} spot(s)",
            vehicle.kind,
            freed.len()
        );
        Ok(Release {
            vehicle_id: vehicle.id,
            license_plate: vehicle.license_plate,
            kind: vehicle.kind,
            spot,
            freed,
        })
    }

    /// Rewrite the WAL as the minimal event set for the current state.
    ///
    /// Holds the commit gate exclusively, so no mutation can append between
    /// the snapshot and the file swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut ids: Vec<Ulid> = self.facilities.iter().map(|e| *e.key()).collect();
        ids.sort();
        let mut events = Vec::new();
        for id in ids {
            let Some(fs) = self.get_facility(&id) else {
                continue;
            };
            events.extend(fs.read().await.snapshot_events());
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
