// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::errors::PositionError;
use crate::geo_math;
use crate::models::Coordinate;
use crate::models::PositionSnapshot;
use crate::models::RouteStop;
use crate::models::TrainData;
use crate::time_parsing::format_iso;
use crate::time_parsing::format_minutes;
use crate::time_parsing::parse_schedule_time;
use ahash::AHashMap;
use chrono::NaiveDateTime;
use chrono::Timelike;
use rand::Rng;

/// Base cruising speed assumed for the synthetic speed estimate, km/h.
const BASE_SPEED_KMH: f64 = 60.0;

/// Which stop the train occupies right now, by the time-of-day scan:
/// the stop before the first departure that is still in the future,
/// or the last stop once every departure has passed.
///
/// Comparisons are clock-only. A train that runs past midnight appears
/// to jump back to its origin when the clock wraps; that artifact is part
/// of the model, do not correct it here.
///
/// Stops whose departure string cannot be read are skipped. If no stop
/// on the route yields a readable departure the position is unavailable.
pub fn find_current_stop_index(
    route: &[RouteStop],
    now: NaiveDateTime,
) -> Result<usize, PositionError> {
    if route.is_empty() {
        return Err(PositionError::Unavailable);
    }

    let mut any_parsed = false;

    for (i, stop) in route.iter().enumerate() {
        if let Some(departure) = parse_schedule_time(stop.departure_time.as_deref(), now) {
            any_parsed = true;
            if departure > now {
                return Ok(i.saturating_sub(1));
            }
        }
    }

    if any_parsed {
        Ok(route.len() - 1)
    } else {
        Err(PositionError::Unavailable)
    }
}

/// Full position snapshot for one train at one instant.
pub fn position_snapshot(
    schedule: &TrainData,
    stations: &AHashMap<String, Coordinate>,
    now: NaiveDateTime,
) -> Result<PositionSnapshot, PositionError> {
    let routes = &schedule.routes;
    let total_stations = routes.len();
    if total_stations < 2 {
        return Err(PositionError::Unavailable);
    }

    let current_station_idx = find_current_stop_index(routes, now)?;

    let progress_percentage =
        current_station_idx as f64 / (total_stations - 1) as f64 * 100.0;

    let covered_names: Vec<&str> = routes[..=current_station_idx]
        .iter()
        .map(|stop| stop.city.as_str())
        .collect();
    let distance_covered = geo_math::route_distance_by_names(stations, &covered_names);

    let distance_to_next = match routes.get(current_station_idx + 1) {
        Some(next) => geo_math::distance_between_stations(
            stations,
            &routes[current_station_idx].city,
            &next.city,
        ),
        None => 0.0,
    };

    Ok(PositionSnapshot {
        current_station_idx,
        current_station: routes[current_station_idx].city.clone(),
        next_station: routes
            .get(current_station_idx + 1)
            .map(|stop| stop.city.clone()),
        progress_percentage: geo_math::round2(progress_percentage),
        distance_covered: geo_math::round2(distance_covered),
        distance_to_next: geo_math::round2(distance_to_next),
        eta_to_next: eta_to_next(routes, current_station_idx, now),
        total_stations,
        current_time: format_iso(now),
    })
}

/// `"Xh Ym"` until the next stop's scheduled arrival, `"Arrived"` once
/// that clock has passed, `None` when there is no readable arrival.
fn eta_to_next(route: &[RouteStop], current_idx: usize, now: NaiveDateTime) -> Option<String> {
    let next = route.get(current_idx + 1)?;
    let arrival = parse_schedule_time(next.arrival_time.as_deref(), now)?;

    let seconds_remaining = (arrival - now).num_seconds();
    if seconds_remaining <= 0 {
        return Some("Arrived".to_string());
    }

    Some(format_minutes(seconds_remaining / 60))
}

/// Synthetic current-speed estimate: base speed scaled by a peak/off-peak
/// multiplier and a small random jitter. Illustrative only, nothing is
/// measured.
pub fn estimate_speed(now: NaiveDateTime, rng: &mut impl Rng) -> f64 {
    let hour = now.hour();

    let multiplier = if (6..=9).contains(&hour) || (17..=20).contains(&hour) {
        0.8
    } else if hour >= 22 || hour <= 5 {
        1.2
    } else {
        1.0
    };

    geo_math::round1(BASE_SPEED_KMH * multiplier * rng.random_range(0.9..1.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule_store::test_support::stop;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn three_stop_route() -> Vec<RouteStop> {
        vec![
            stop("StationA", None, Some("9:00 AM")),
            stop("StationB", Some("10:00 AM"), Some("10:05 AM")),
            stop("StationC", Some("11:00 AM"), None),
        ]
    }

    #[test]
    fn test_index_before_first_departure() {
        assert_eq!(find_current_stop_index(&three_stop_route(), at(8, 0)), Ok(0));
    }

    #[test]
    fn test_index_mid_route() {
        assert_eq!(
            find_current_stop_index(&three_stop_route(), at(10, 30)),
            Ok(1)
        );
    }

    #[test]
    fn test_index_after_all_departures() {
        let route = three_stop_route();
        assert_eq!(
            find_current_stop_index(&route, at(23, 0)),
            Ok(route.len() - 1)
        );
    }

    #[test]
    fn test_index_skips_unparseable_departure() {
        let route = vec![
            stop("StationA", None, Some("not a clock")),
            stop("StationB", Some("10:00 AM"), Some("10:05 AM")),
            stop("StationC", Some("11:00 AM"), None),
        ];
        // StationA's bad clock is skipped; StationB's future departure
        // places the train one stop earlier, clamped to 0
        assert_eq!(find_current_stop_index(&route, at(9, 30)), Ok(0));
    }

    #[test]
    fn test_index_unavailable_when_nothing_parses() {
        let route = vec![
            stop("StationA", None, Some("---")),
            stop("StationB", None, None),
        ];
        assert_eq!(
            find_current_stop_index(&route, at(9, 30)),
            Err(PositionError::Unavailable)
        );
        assert_eq!(
            find_current_stop_index(&[], at(9, 30)),
            Err(PositionError::Unavailable)
        );
    }

    fn stations() -> AHashMap<String, Coordinate> {
        let mut map = AHashMap::new();
        map.insert(
            "StationA".to_string(),
            Coordinate {
                longitude: 90.0,
                latitude: 23.0,
            },
        );
        map.insert(
            "StationB".to_string(),
            Coordinate {
                longitude: 90.5,
                latitude: 23.5,
            },
        );
        map.insert(
            "StationC".to_string(),
            Coordinate {
                longitude: 91.0,
                latitude: 24.0,
            },
        );
        map
    }

    #[test]
    fn test_snapshot_mid_route() {
        let schedule = TrainData {
            train_name: "Test Express".to_string(),
            days: vec![],
            routes: three_stop_route(),
        };
        let snapshot = position_snapshot(&schedule, &stations(), at(10, 30)).unwrap();

        assert_eq!(snapshot.current_station_idx, 1);
        assert_eq!(snapshot.current_station, "StationB");
        assert_eq!(snapshot.next_station.as_deref(), Some("StationC"));
        assert_eq!(snapshot.progress_percentage, 50.0);
        assert_eq!(snapshot.total_stations, 3);
        assert_eq!(snapshot.eta_to_next.as_deref(), Some("30m"));
        assert!(snapshot.distance_covered > 0.0);
        assert!(snapshot.distance_to_next > 0.0);
    }

    #[test]
    fn test_snapshot_at_terminus() {
        let schedule = TrainData {
            train_name: "Test Express".to_string(),
            days: vec![],
            routes: three_stop_route(),
        };
        let snapshot = position_snapshot(&schedule, &stations(), at(23, 0)).unwrap();

        assert_eq!(snapshot.current_station_idx, 2);
        assert_eq!(snapshot.progress_percentage, 100.0);
        assert_eq!(snapshot.next_station, None);
        assert_eq!(snapshot.distance_to_next, 0.0);
        assert_eq!(snapshot.eta_to_next, None);
    }

    #[test]
    fn test_eta_reports_arrived_when_clock_passed() {
        let route = vec![
            stop("StationA", None, Some("9:00 AM")),
            stop("StationB", Some("10:00 AM"), Some("12:00 PM")),
            stop("StationC", Some("1:00 PM"), None),
        ];
        // at 10:30 the train still sits before StationB's 12:00 departure,
        // but its 10:00 arrival is already behind us
        assert_eq!(find_current_stop_index(&route, at(10, 30)), Ok(0));
        assert_eq!(
            eta_to_next(&route, 0, at(10, 30)).as_deref(),
            Some("Arrived")
        );
    }

    #[test]
    fn test_eta_over_an_hour() {
        let route = three_stop_route();
        // from 08:30, StationB arrives at 10:00 -> 1h 30m
        assert_eq!(eta_to_next(&route, 0, at(8, 30)).as_deref(), Some("1h 30m"));
    }

    #[test]
    fn test_estimate_speed_peak_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let speed = estimate_speed(at(8, 0), &mut rng);
            // 60 * 0.8 * [0.9, 1.1)
            assert!((43.0..=53.0).contains(&speed), "got {}", speed);
        }
    }

    #[test]
    fn test_estimate_speed_night_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let speed = estimate_speed(at(23, 0), &mut rng);
            // 60 * 1.2 * [0.9, 1.1)
            assert!((64.0..=80.0).contains(&speed), "got {}", speed);
        }
    }
}
