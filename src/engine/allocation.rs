//! Park/release planning. Pure functions over a facility snapshot; the engine
//! commits whatever they return as one unit of work.

use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Spots a van takes when it overflows into the car rows.
pub const VAN_OVERFLOW_WIDTH: usize = 3;

/// Pick the spots a vehicle of `kind` should occupy.
///
/// `available` is the free-spot snapshot in layout order. The returned group
/// lists the primary spot first.
///
/// - Motorcycle: first free spot of any type.
/// - Car: first free CAR or VAN spot.
/// - Van: first free VAN spot; failing that, the first run of three
///   layout-adjacent free spots whose first spot is a CAR spot.
pub fn plan_park(available: &[&Spot], kind: VehicleType) -> Result<Reservation, EngineError> {
    let planned = match kind {
        VehicleType::Motorcycle => available.first().map(|s| Reservation::single(s.id)),
        VehicleType::Car => available
            .iter()
            .find(|s| matches!(s.kind, SpotType::Car | SpotType::Van))
            .map(|s| Reservation::single(s.id)),
        VehicleType::Van => plan_van(available),
    };
    planned.ok_or(EngineError::NoAvailableSpot(kind))
}

fn plan_van(available: &[&Spot]) -> Option<Reservation> {
    if let Some(spot) = available.iter().find(|s| s.kind == SpotType::Van) {
        return Some(Reservation::single(spot.id));
    }
    available
        .windows(VAN_OVERFLOW_WIDTH)
        .find(|run| {
            run[0].kind == SpotType::Car && run.windows(2).all(|pair| pair[0].precedes(pair[1]))
        })
        .map(|run| Reservation::new(run.iter().map(|s| s.id).collect()))
}

/// Spots to free when `vehicle` leaves.
pub fn plan_release(vehicle: &Vehicle) -> Vec<Ulid> {
    match vehicle.kind {
        VehicleType::Motorcycle | VehicleType::Car => vec![vehicle.reservation.linked()],
        VehicleType::Van => vehicle.reservation.spots().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::SpotType::{Car, Motorcycle as Moto, Van};

    /// Build a layout; `taken[i]` marks spot `i` as already occupied.
    fn layout(kinds: &[SpotType], taken: &[usize]) -> Vec<Spot> {
        kinds
            .iter()
            .enumerate()
            .map(|(pos, kind)| {
                let mut spot = Spot::new(Ulid::new(), pos as u32, *kind);
                if taken.contains(&pos) {
                    spot.attach(Ulid::new());
                }
                spot
            })
            .collect()
    }

    fn free(spots: &[Spot]) -> Vec<&Spot> {
        spots.iter().filter(|s| !s.is_occupied()).collect()
    }

    fn positions(spots: &[Spot], group: &Reservation) -> Vec<u32> {
        group
            .spots()
            .iter()
            .map(|id| spots.iter().find(|s| s.id == *id).unwrap().position)
            .collect()
    }

    #[test]
    fn motorcycle_takes_first_free_spot_of_any_type() {
        let spots = layout(&[Van, Car, Moto], &[]);
        let group = plan_park(&free(&spots), VehicleType::Motorcycle).unwrap();
        assert_eq!(positions(&spots, &group), vec![0]);

        let spots = layout(&[Moto, Car, Van], &[0, 1]);
        let group = plan_park(&free(&spots), VehicleType::Motorcycle).unwrap();
        assert_eq!(positions(&spots, &group), vec![2]);
    }

    #[test]
    fn motorcycle_fails_only_when_nothing_is_free() {
        let spots = layout(&[Moto, Car], &[0, 1]);
        let err = plan_park(&free(&spots), VehicleType::Motorcycle).unwrap_err();
        assert!(matches!(err, EngineError::NoAvailableSpot(VehicleType::Motorcycle)));
    }

    #[test]
    fn car_skips_motorcycle_spots() {
        let spots = layout(&[Moto, Moto, Van, Car], &[]);
        let group = plan_park(&free(&spots), VehicleType::Car).unwrap();
        assert_eq!(positions(&spots, &group), vec![2]);
    }

    #[test]
    fn car_fails_iff_no_car_or_van_spot_is_free() {
        let spots = layout(&[Moto, Car, Moto, Van], &[1, 3]);
        let err = plan_park(&free(&spots), VehicleType::Car).unwrap_err();
        assert!(matches!(err, EngineError::NoAvailableSpot(VehicleType::Car)));

        let spots = layout(&[Moto, Car, Moto, Van], &[1]);
        let group = plan_park(&free(&spots), VehicleType::Car).unwrap();
        assert_eq!(positions(&spots, &group), vec![3]);
    }

    #[test]
    fn van_prefers_a_van_spot() {
        let spots = layout(&[Car, Moto, Van], &[]);
        let group = plan_park(&free(&spots), VehicleType::Van).unwrap();
        assert_eq!(positions(&spots, &group), vec![2]);
        assert!(!group.is_overflow());
    }

    #[test]
    fn van_spot_wins_over_an_earlier_car_run() {
        let spots = layout(&[Car, Car, Car, Car, Van], &[]);
        let group = plan_park(&free(&spots), VehicleType::Van).unwrap();
        assert_eq!(positions(&spots, &group), vec![4]);
    }

    #[test]
    fn van_overflows_into_three_car_spots() {
        let spots = layout(&[Car, Car, Car], &[]);
        let group = plan_park(&free(&spots), VehicleType::Van).unwrap();
        assert_eq!(positions(&spots, &group), vec![0, 1, 2]);
        assert_eq!(group.primary(), spots[0].id);
        assert_eq!(group.linked(), spots[2].id);
    }

    #[test]
    fn van_fails_when_a_car_run_is_broken() {
        let spots = layout(&[Car, Car, Car], &[1]);
        let err = plan_park(&free(&spots), VehicleType::Van).unwrap_err();
        assert!(matches!(err, EngineError::NoAvailableSpot(VehicleType::Van)));
    }

    #[test]
    fn van_overflow_needs_layout_adjacency() {
        // Free spots 0, 2, 3 are consecutive in the snapshot but not on the ground.
        let spots = layout(&[Car, Car, Car, Car], &[1]);
        assert!(plan_park(&free(&spots), VehicleType::Van).is_err());

        let spots = layout(&[Car, Car, Car, Car, Car], &[1]);
        let group = plan_park(&free(&spots), VehicleType::Van).unwrap();
        assert_eq!(positions(&spots, &group), vec![2, 3, 4]);
    }

    #[test]
    fn van_overflow_run_must_start_on_a_car_spot() {
        let spots = layout(&[Moto, Car, Car], &[]);
        assert!(plan_park(&free(&spots), VehicleType::Van).is_err());

        // Only the first spot of the run is type-checked.
        let spots = layout(&[Car, Moto, Moto], &[]);
        let group = plan_park(&free(&spots), VehicleType::Van).unwrap();
        assert_eq!(positions(&spots, &group), vec![0, 1, 2]);
    }

    #[test]
    fn van_fails_with_fewer_than_three_free_spots() {
        let spots = layout(&[Car, Car], &[]);
        assert!(plan_park(&free(&spots), VehicleType::Van).is_err());
        assert!(plan_park(&[], VehicleType::Van).is_err());
    }

    #[test]
    fn release_returns_whole_group_for_overflow_van() {
        let ids: Vec<Ulid> = (0..3).map(|_| Ulid::new()).collect();
        let van = Vehicle {
            id: Ulid::new(),
            license_plate: "VAN-1".into(),
            kind: VehicleType::Van,
            reservation: Reservation::new(ids.clone()),
        };
        assert_eq!(plan_release(&van), ids);

        let car = Vehicle {
            id: Ulid::new(),
            license_plate: "CAR-1".into(),
            kind: VehicleType::Car,
            reservation: Reservation::single(ids[0]),
        };
        assert_eq!(plan_release(&car), vec![ids[0]]);
    }
}
