//! Rack unit bookkeeping: overlap validation and free-slot search.
//!
//! Racks are numbered from unit 1 at the bottom to `total_units` at the top. A device that starts
//! at unit `s` with size `n` occupies `s..=s+n-1`. Everything here is pure and works on the
//! occupancy list loaded from the database, so the handlers only have to hold a lock on the rack
//! row while they call in.

use crate::errors::Error;
use crate::types::DeviceId;
use serde::Serialize;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

/// A device occupying a contiguous block of units in a rack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub device_id: DeviceId,
    pub start_unit: u32,
    pub unit_size: u32,
}

impl Occupant {
    pub fn end_unit(&self) -> u32 {
        self.start_unit + self.unit_size.saturating_sub(1)
    }

    fn overlaps(&self, start: u32, end: u32) -> bool {
        self.start_unit <= end && start <= self.end_unit()
    }
}

/// A maximal run of free units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct FreeRange {
    pub start: u32,
    pub end: u32,
    pub units: u32,
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("Device must occupy at least one unit")]
    ZeroSize,

    #[error("Units are numbered from 1")]
    StartBelowOne,

    #[error("Units {start}-{end} are outside the rack (1-{total_units})")]
    OutOfBounds { start: u32, end: u32, total_units: u32 },

    #[error("Units {start}-{end} overlap device {device_id} at units {occupied_start}-{occupied_end}")]
    Overlap {
        start: u32,
        end: u32,
        device_id: DeviceId,
        occupied_start: u32,
        occupied_end: u32,
    },

    #[error("No free block of {size} units in the rack")]
    NoFreeSlot { size: u32 },
}

impl From<PlacementError> for Error {
    fn from(err: PlacementError) -> Self {
        Error::BadRequest { message: err.to_string() }
    }
}

/// Check that `size` units starting at `start` fit in the rack without touching another device.
///
/// `exclude` skips the device being moved so it does not collide with its own current position.
pub fn validate_placement(
    total_units: u32,
    occupants: &[Occupant],
    start: u32,
    size: u32,
    exclude: Option<DeviceId>,
) -> Result<(), PlacementError> {
    if size == 0 {
        return Err(PlacementError::ZeroSize);
    }
    if start == 0 {
        return Err(PlacementError::StartBelowOne);
    }

    let end = start.saturating_add(size - 1);
    if end > total_units {
        return Err(PlacementError::OutOfBounds { start, end, total_units });
    }

    if let Some(conflict) = occupants
        .iter()
        .filter(|o| Some(o.device_id) != exclude)
        .find(|o| o.overlaps(start, end))
    {
        return Err(PlacementError::Overlap {
            start,
            end,
            device_id: conflict.device_id,
            occupied_start: conflict.start_unit,
            occupied_end: conflict.end_unit(),
        });
    }

    Ok(())
}

/// Per-unit occupancy, index 0 unused so that indices match unit numbers.
fn occupancy(total_units: u32, occupants: &[Occupant], exclude: Option<DeviceId>) -> Vec<bool> {
    let mut taken = vec![false; total_units as usize + 1];
    taken[0] = true;
    for o in occupants.iter().filter(|o| Some(o.device_id) != exclude) {
        let end = o.end_unit().min(total_units);
        for unit in o.start_unit.max(1)..=end {
            taken[unit as usize] = true;
        }
    }
    taken
}

/// Maximal runs of free units, bottom to top.
pub fn free_ranges(total_units: u32, occupants: &[Occupant], exclude: Option<DeviceId>) -> Vec<FreeRange> {
    let taken = occupancy(total_units, occupants, exclude);
    let mut ranges = Vec::new();
    let mut run_start: Option<u32> = None;

    for unit in 1..=total_units {
        match (taken[unit as usize], run_start) {
            (false, None) => run_start = Some(unit),
            (true, Some(start)) => {
                ranges.push(FreeRange {
                    start,
                    end: unit - 1,
                    units: unit - start,
                });
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        ranges.push(FreeRange {
            start,
            end: total_units,
            units: total_units - start + 1,
        });
    }

    ranges
}

/// Lowest start unit of a free block of at least `size` units (first fit).
pub fn find_free_slot(total_units: u32, occupants: &[Occupant], size: u32, exclude: Option<DeviceId>) -> Option<u32> {
    if size == 0 {
        return None;
    }
    free_ranges(total_units, occupants, exclude)
        .into_iter()
        .find(|r| r.units >= size)
        .map(|r| r.start)
}

/// Number of units occupied inside the rack.
pub fn used_units(total_units: u32, occupants: &[Occupant]) -> u32 {
    occupancy(total_units, occupants, None).iter().skip(1).filter(|t| **t).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn occupant(start_unit: u32, unit_size: u32) -> Occupant {
        Occupant {
            device_id: Uuid::new_v4(),
            start_unit,
            unit_size,
        }
    }

    #[test]
    fn test_empty_rack_accepts_any_in_bounds_block() {
        assert!(validate_placement(42, &[], 1, 42, None).is_ok());
        assert!(validate_placement(42, &[], 40, 3, None).is_ok());
    }

    #[test]
    fn test_out_of_bounds() {
        assert_eq!(
            validate_placement(42, &[], 41, 3, None),
            Err(PlacementError::OutOfBounds {
                start: 41,
                end: 43,
                total_units: 42
            })
        );
        assert_eq!(validate_placement(42, &[], 0, 1, None), Err(PlacementError::StartBelowOne));
        assert_eq!(validate_placement(42, &[], 1, 0, None), Err(PlacementError::ZeroSize));
    }

    #[test]
    fn test_overlap_detected_and_names_device() {
        let server = occupant(10, 4); // 10..=13
        let occupants = [server];

        let err = validate_placement(42, &occupants, 12, 2, None).unwrap_err();
        match err {
            PlacementError::Overlap {
                device_id,
                occupied_start,
                occupied_end,
                ..
            } => {
                assert_eq!(device_id, server.device_id);
                assert_eq!((occupied_start, occupied_end), (10, 13));
            }
            other => panic!("expected overlap, got {other:?}"),
        }

        // Touching edges is fine
        assert!(validate_placement(42, &occupants, 14, 2, None).is_ok());
        assert!(validate_placement(42, &occupants, 8, 2, None).is_ok());
        // Enclosing an existing device is not
        assert!(validate_placement(42, &occupants, 9, 6, None).is_err());
    }

    #[test]
    fn test_moving_device_ignores_itself() {
        let server = occupant(10, 4);
        let occupants = [server];

        assert!(validate_placement(42, &occupants, 11, 4, Some(server.device_id)).is_ok());
        assert!(validate_placement(42, &occupants, 11, 4, None).is_err());
    }

    #[test]
    fn test_free_ranges() {
        let occupants = [occupant(1, 2), occupant(5, 1), occupant(10, 3)];
        let ranges = free_ranges(12, &occupants, None);

        assert_eq!(
            ranges,
            vec![
                FreeRange { start: 3, end: 4, units: 2 },
                FreeRange { start: 6, end: 9, units: 4 },
            ]
        );
    }

    #[test]
    fn test_first_fit_picks_lowest_block_that_fits() {
        let occupants = [occupant(1, 2), occupant(5, 1), occupant(10, 3)];

        assert_eq!(find_free_slot(42, &occupants, 1, None), Some(3));
        assert_eq!(find_free_slot(42, &occupants, 3, None), Some(6));
        assert_eq!(find_free_slot(42, &occupants, 5, None), Some(13));
        assert_eq!(find_free_slot(42, &occupants, 31, None), None);
        assert_eq!(find_free_slot(42, &occupants, 0, None), None);
    }

    #[test]
    fn test_full_rack_has_no_slot() {
        let occupants = [occupant(1, 42)];
        assert!(free_ranges(42, &occupants, None).is_empty());
        assert_eq!(find_free_slot(42, &occupants, 1, None), None);
        assert_eq!(used_units(42, &occupants), 42);
    }

    #[test]
    fn test_used_units_clips_to_rack() {
        // A rack shrunk below a device should not count phantom units
        let occupants = [occupant(40, 4)];
        assert_eq!(used_units(41, &occupants), 2);
    }

    #[test]
    fn test_placement_error_is_bad_request() {
        let err: Error = PlacementError::NoFreeSlot { size: 4 }.into();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.user_message(), "No free block of 4 units in the rack");
    }
}
