//! BDI to severity band and team zone.
//!
//! The band is a pure function of this week's BDI. The zone runs a small
//! state machine over successive weeks:
//!
//! - `Stable` -> `Watch` when the band turns yellow, -> `Surge` when red.
//! - `Watch` -> `Surge` when red, -> `Stable` once BDI falls `hysteresis`
//!   points below the green cut point.
//! - `Surge` holds until BDI falls `hysteresis` points below the red cut
//!   point, then moves to `Recovery`.
//! - `Recovery` -> `Surge` when red again, -> `Stable` once clear of green
//!   minus hysteresis, -> `Watch` after `recovery_hold_weeks` in Recovery.

use serde::{Deserialize, Serialize};

use crate::config::ZoneThresholds;
use crate::models::{Band, Zone};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneTrack {
    pub zone: Zone,
    pub band: Band,
    pub weeks_in_zone: u32,
}

pub fn classify_band(bdi: f64, thresholds: &ZoneThresholds) -> Band {
    if bdi <= thresholds.green_max {
        Band::Green
    } else if bdi <= thresholds.yellow_max {
        Band::Yellow
    } else {
        Band::Red
    }
}

/// Stateless mapping used when a team has no zone history.
pub fn classify_zone(bdi: f64, thresholds: &ZoneThresholds) -> (Band, Zone) {
    let band = classify_band(bdi, thresholds);
    let zone = match band {
        Band::Green => Zone::Stable,
        Band::Yellow => Zone::Watch,
        Band::Red => Zone::Surge,
    };
    (band, zone)
}

/// Advance a team's zone by one week.
pub fn next_zone(previous: Option<ZoneTrack>, bdi: f64, thresholds: &ZoneThresholds) -> ZoneTrack {
    let (band, fresh) = classify_zone(bdi, thresholds);
    let Some(previous) = previous else {
        return ZoneTrack {
            zone: fresh,
            band,
            weeks_in_zone: 1,
        };
    };

    let settle_green = bdi <= thresholds.green_max - thresholds.hysteresis;
    let leave_red = bdi <= thresholds.yellow_max - thresholds.hysteresis;

    let zone = match (previous.zone, band) {
        (_, Band::Red) => Zone::Surge,
        (Zone::Stable, Band::Yellow) => Zone::Watch,
        (Zone::Stable, Band::Green) => Zone::Stable,
        (Zone::Watch, _) if settle_green => Zone::Stable,
        (Zone::Watch, _) => Zone::Watch,
        (Zone::Surge, _) if leave_red => Zone::Recovery,
        (Zone::Surge, _) => Zone::Surge,
        (Zone::Recovery, _) if settle_green => Zone::Stable,
        (Zone::Recovery, _) if previous.weeks_in_zone >= thresholds.recovery_hold_weeks => {
            Zone::Watch
        }
        (Zone::Recovery, _) => Zone::Recovery,
    };

    let weeks_in_zone = if zone == previous.zone {
        previous.weeks_in_zone.saturating_add(1)
    } else {
        1
    };

    ZoneTrack {
        zone,
        band,
        weeks_in_zone,
    }
}

/// Fold an oldest-first BDI series into one zone per week.
pub fn resolve_zone_history(
    previous: Option<ZoneTrack>,
    bdis: &[f64],
    thresholds: &ZoneThresholds,
) -> Vec<ZoneTrack> {
    let mut tracks = Vec::with_capacity(bdis.len());
    let mut current = previous;
    for bdi in bdis {
        let track = next_zone(current, *bdi, thresholds);
        tracks.push(track);
        current = Some(track);
    }
    tracks
}
