// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::models::Coordinate;
use ahash::AHashMap;
use itertools::Itertools;
use log::warn;

/// Mean Earth radius used by the whole service, kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Great-circle distance between two points via the haversine formula,
/// kilometers, rounded to 2 decimal places.
pub fn distance_between_coords(a: Coordinate, b: Coordinate) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    round2(EARTH_RADIUS_KM * c)
}

/// Distance between two named stations. A station missing from the
/// coordinate table degrades to 0.0 with a warning rather than failing
/// the caller; timelines keep rendering with one bad row.
pub fn distance_between_stations(
    stations: &AHashMap<String, Coordinate>,
    station_a: &str,
    station_b: &str,
) -> f64 {
    match (stations.get(station_a), stations.get(station_b)) {
        (Some(a), Some(b)) => distance_between_coords(*a, *b),
        _ => {
            warn!("Station not found: {} or {}", station_a, station_b);
            0.0
        }
    }
}

/// Sum of consecutive-pair distances along an ordered route.
pub fn route_distance(coords: &[Coordinate]) -> f64 {
    round2(
        coords
            .iter()
            .tuple_windows()
            .map(|(a, b)| distance_between_coords(*a, *b))
            .sum(),
    )
}

/// Same as [`route_distance`] but over station names, with the same
/// degrade-to-zero policy per missing pair.
pub fn route_distance_by_names(
    stations: &AHashMap<String, Coordinate>,
    names: &[&str],
) -> f64 {
    round2(
        names
            .iter()
            .tuple_windows()
            .map(|(a, b)| distance_between_stations(stations, a, b))
            .sum(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dhaka() -> Coordinate {
        Coordinate {
            longitude: 90.4125,
            latitude: 23.8103,
        }
    }

    fn chattogram() -> Coordinate {
        Coordinate {
            longitude: 91.7832,
            latitude: 22.3569,
        }
    }

    fn sylhet() -> Coordinate {
        Coordinate {
            longitude: 91.8687,
            latitude: 24.8949,
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        assert_eq!(
            distance_between_coords(dhaka(), chattogram()),
            distance_between_coords(chattogram(), dhaka())
        );
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(distance_between_coords(dhaka(), dhaka()), 0.0);
    }

    #[test]
    fn test_dhaka_chattogram_plausible() {
        let d = distance_between_coords(dhaka(), chattogram());
        // straight-line distance is roughly 215 km
        assert!(d > 200.0 && d < 230.0, "got {}", d);
    }

    #[test]
    fn test_route_distance_sums_pairs() {
        let route = [dhaka(), chattogram(), sylhet()];
        let pairwise = distance_between_coords(dhaka(), chattogram())
            + distance_between_coords(chattogram(), sylhet());
        assert!((route_distance(&route) - pairwise).abs() < 0.02);
    }

    #[test]
    fn test_route_distance_degenerate() {
        assert_eq!(route_distance(&[]), 0.0);
        assert_eq!(route_distance(&[dhaka()]), 0.0);
    }

    #[test]
    fn test_missing_station_degrades_to_zero() {
        let mut stations = AHashMap::new();
        stations.insert("Dhaka".to_string(), dhaka());
        assert_eq!(distance_between_stations(&stations, "Dhaka", "Atlantis"), 0.0);

        stations.insert("Chattogram".to_string(), chattogram());
        let with_hole = route_distance_by_names(&stations, &["Dhaka", "Atlantis", "Chattogram"]);
        assert_eq!(with_hole, 0.0);
    }
}
