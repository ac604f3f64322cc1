// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::delay_simulation::DelaySimulator;
use crate::errors::ScheduleError;
use crate::geo_math;
use crate::models::StationCrowd;
use crate::models::StationStatus;
use crate::models::StopStatus;
use crate::models::TrainStatusReport;
use crate::position_logic;
use crate::schedule_store::LoadedData;
use crate::time_parsing::format_iso;
use crate::time_parsing::parse_schedule_time;
use chrono::NaiveDateTime;
use chrono::Timelike;
use rand::Rng;

const MAJOR_STATIONS: &[&str] = &["Dhaka", "Chattogram", "Rajshahi", "Khulna", "Sylhet"];

/// Assemble the full per-station status report for one train.
///
/// The current-stop index is computed exactly once (inside the position
/// snapshot) and feeds both the per-station tags and the summary fields,
/// so the two can never disagree within one report. When the whole route
/// fails the clock scan the report is still produced: every stop tags as
/// upcoming and the summary carries zeros.
pub fn generate_status(
    train_number: &str,
    data: &LoadedData,
    simulator: &DelaySimulator,
    now: NaiveDateTime,
    rng: &mut impl Rng,
) -> Result<TrainStatusReport, ScheduleError> {
    let schedule = data
        .get_schedule(train_number)
        .ok_or(ScheduleError::TrainNotFound)?;

    let routes = &schedule.data.routes;
    if routes.is_empty() {
        return Err(ScheduleError::EmptyRoute);
    }

    let snapshot = position_logic::position_snapshot(&schedule.data, &data.stations, now);
    let current_position = snapshot.as_ref().ok().map(|s| s.current_station_idx);

    let mut station_statuses = Vec::with_capacity(routes.len());

    for (idx, stop) in routes.iter().enumerate() {
        let status = status_tag(idx, current_position);

        let scheduled_arrival = parse_schedule_time(stop.arrival_time.as_deref(), now);
        let scheduled_departure = parse_schedule_time(stop.departure_time.as_deref(), now);

        let weather = simulator.weather_condition(Some(&stop.city), now, rng);

        // arrival and departure are scheduled separately, so each gets
        // its own draw; the stop reports the worse of the two
        let (arrival_delay, actual_arrival) = match scheduled_arrival {
            Some(scheduled) => {
                let info =
                    simulator.simulate_delay(train_number, &stop.city, scheduled, now, weather, rng);
                let actual = if info.delay_minutes > 0 {
                    info.actual_time.clone()
                } else {
                    format_iso(scheduled)
                };
                (info.delay_minutes, Some(actual))
            }
            None => (0, None),
        };

        let (departure_delay, actual_departure) = match scheduled_departure {
            Some(scheduled) => {
                let info =
                    simulator.simulate_delay(train_number, &stop.city, scheduled, now, weather, rng);
                let actual = if info.delay_minutes > 0 {
                    info.actual_time.clone()
                } else {
                    format_iso(scheduled)
                };
                (info.delay_minutes, Some(actual))
            }
            None => (0, None),
        };

        let prefix_names: Vec<&str> = routes[..=idx].iter().map(|s| s.city.as_str()).collect();

        station_statuses.push(StationStatus {
            station_name: stop.city.clone(),
            status,
            scheduled_arrival: scheduled_arrival.map(format_iso),
            scheduled_departure: scheduled_departure.map(format_iso),
            actual_arrival,
            actual_departure,
            delay_minutes: arrival_delay.max(departure_delay),
            halt_duration: stop.halt.clone().unwrap_or_else(|| "---".to_string()),
            duration: stop.duration.clone().unwrap_or_else(|| "---".to_string()),
            distance_from_start: geo_math::route_distance_by_names(&data.stations, &prefix_names),
            weather_condition: weather,
            crowd_level: estimate_crowd_level(&stop.city, scheduled_arrival),
        });
    }

    // a single worst bottleneck dominates the reported delay, not the sum
    let overall_delay = station_statuses
        .iter()
        .map(|s| s.delay_minutes)
        .max()
        .unwrap_or(0);

    let current_speed = match &snapshot {
        Ok(_) => position_logic::estimate_speed(now, rng),
        Err(_) => 0.0,
    };

    let report = match snapshot {
        Ok(snapshot) => TrainStatusReport {
            train_number: train_number.to_string(),
            train_name: schedule.data.train_name.clone(),
            station_statuses,
            current_speed,
            distance_covered: snapshot.distance_covered,
            distance_to_next: snapshot.distance_to_next,
            delay_minutes: overall_delay,
            estimated_arrival: snapshot.eta_to_next,
            progress_percentage: snapshot.progress_percentage,
            current_station: Some(snapshot.current_station),
            next_station: snapshot.next_station,
            weather_condition: simulator.weather_condition(None, now, rng),
            last_updated: format_iso(now),
            crowd_validation: None,
            eta_adjusted_by_crowd: None,
            crowd_eta_confidence: None,
        },
        Err(_) => TrainStatusReport {
            train_number: train_number.to_string(),
            train_name: schedule.data.train_name.clone(),
            station_statuses,
            current_speed,
            distance_covered: 0.0,
            distance_to_next: 0.0,
            delay_minutes: overall_delay,
            estimated_arrival: None,
            progress_percentage: 0.0,
            current_station: None,
            next_station: None,
            weather_condition: simulator.weather_condition(None, now, rng),
            last_updated: format_iso(now),
            crowd_validation: None,
            eta_adjusted_by_crowd: None,
            crowd_eta_confidence: None,
        },
    };

    Ok(report)
}

fn status_tag(idx: usize, current_position: Option<usize>) -> StopStatus {
    match current_position {
        Some(position) if idx < position => StopStatus::Completed,
        Some(position) if idx == position => StopStatus::Current,
        Some(position) if idx == position + 1 => StopStatus::Next,
        _ => StopStatus::Upcoming,
    }
}

/// Platform-crowding heuristic from the scheduled hour and whether the
/// station is one of the major hubs.
fn estimate_crowd_level(station_name: &str, scheduled: Option<NaiveDateTime>) -> StationCrowd {
    let Some(scheduled) = scheduled else {
        return StationCrowd::Normal;
    };

    let hour = scheduled.hour();
    let is_major = MAJOR_STATIONS
        .iter()
        .any(|major| station_name.contains(major));

    if (7..=9).contains(&hour) || (17..=19).contains(&hour) {
        if is_major {
            StationCrowd::High
        } else {
            StationCrowd::Medium
        }
    } else if hour >= 22 || hour <= 5 {
        StationCrowd::Low
    } else if is_major {
        StationCrowd::Medium
    } else {
        StationCrowd::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule_store::test_support::{loaded_data, stop};
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 13)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn sample_data() -> crate::schedule_store::LoadedData {
        loaded_data(
            vec![(
                "701",
                "Test Express",
                vec![
                    stop("StationA", None, Some("9:00 AM")),
                    stop("StationB", Some("10:00 AM"), Some("10:05 AM")),
                    stop("StationC", Some("11:00 AM"), None),
                ],
            )],
            vec![
                ("StationA", 90.0, 23.0),
                ("StationB", 90.5, 23.5),
                ("StationC", 91.0, 24.0),
            ],
        )
    }

    #[test]
    fn test_unknown_train_is_not_found() {
        let data = sample_data();
        let simulator = DelaySimulator::new();
        let mut rng = StdRng::seed_from_u64(0);

        assert!(matches!(
            generate_status("999", &data, &simulator, at(10, 30), &mut rng),
            Err(ScheduleError::TrainNotFound)
        ));
    }

    #[test]
    fn test_mid_route_tagging() {
        let data = sample_data();
        let simulator = DelaySimulator::new();
        let mut rng = StdRng::seed_from_u64(0);

        let report = generate_status("701", &data, &simulator, at(10, 30), &mut rng).unwrap();

        let tags: Vec<StopStatus> = report
            .station_statuses
            .iter()
            .map(|s| s.status)
            .collect();
        assert_eq!(
            tags,
            vec![StopStatus::Completed, StopStatus::Current, StopStatus::Next]
        );

        assert_eq!(report.current_station.as_deref(), Some("StationB"));
        assert_eq!(report.next_station.as_deref(), Some("StationC"));
        assert_eq!(report.progress_percentage, 50.0);
        assert_eq!(report.train_name, "Test Express");
        assert!(report.current_speed > 0.0);
        assert!(report.crowd_validation.is_none());
    }

    #[test]
    fn test_overall_delay_is_worst_station() {
        let data = sample_data();
        let simulator = DelaySimulator::new();
        let mut rng = StdRng::seed_from_u64(9);

        let report = generate_status("701", &data, &simulator, at(10, 30), &mut rng).unwrap();
        let worst = report
            .station_statuses
            .iter()
            .map(|s| s.delay_minutes)
            .max()
            .unwrap();
        assert_eq!(report.delay_minutes, worst);
    }

    #[test]
    fn test_long_tail_is_upcoming() {
        let data = loaded_data(
            vec![(
                "709",
                "Long Express",
                vec![
                    stop("StationA", None, Some("9:00 AM")),
                    stop("StationB", Some("10:00 AM"), Some("10:05 AM")),
                    stop("StationC", Some("11:00 AM"), Some("11:05 AM")),
                    stop("StationD", Some("12:00 PM"), Some("12:05 PM")),
                    stop("StationE", Some("1:00 PM"), None),
                ],
            )],
            vec![],
        );
        let simulator = DelaySimulator::new();
        let mut rng = StdRng::seed_from_u64(2);

        let report = generate_status("709", &data, &simulator, at(9, 30), &mut rng).unwrap();
        let tags: Vec<StopStatus> = report
            .station_statuses
            .iter()
            .map(|s| s.status)
            .collect();
        assert_eq!(
            tags,
            vec![
                StopStatus::Current,
                StopStatus::Next,
                StopStatus::Upcoming,
                StopStatus::Upcoming,
                StopStatus::Upcoming,
            ]
        );
    }

    #[test]
    fn test_unscannable_route_still_produces_report() {
        let data = loaded_data(
            vec![(
                "703",
                "Ghost Express",
                vec![
                    stop("StationA", None, Some("---")),
                    stop("StationB", None, None),
                ],
            )],
            vec![],
        );
        let simulator = DelaySimulator::new();
        let mut rng = StdRng::seed_from_u64(4);

        let report = generate_status("703", &data, &simulator, at(10, 0), &mut rng).unwrap();
        assert_eq!(report.station_statuses.len(), 2);
        assert!(
            report
                .station_statuses
                .iter()
                .all(|s| s.status == StopStatus::Upcoming)
        );
        assert_eq!(report.current_station, None);
        assert_eq!(report.progress_percentage, 0.0);
        assert_eq!(report.current_speed, 0.0);
    }

    #[test]
    fn test_actual_times_only_shift_when_delayed() {
        let data = sample_data();
        let simulator = DelaySimulator::new();
        let mut rng = StdRng::seed_from_u64(21);

        let report = generate_status("701", &data, &simulator, at(10, 30), &mut rng).unwrap();
        for status in &report.station_statuses {
            if status.delay_minutes == 0 {
                assert_eq!(status.actual_arrival, status.scheduled_arrival);
                assert_eq!(status.actual_departure, status.scheduled_departure);
            }
        }
    }

    #[test]
    fn test_crowd_level_heuristic() {
        let peak = Some(at(8, 0));
        assert_eq!(estimate_crowd_level("Dhaka", peak), StationCrowd::High);
        assert_eq!(estimate_crowd_level("Noapara", peak), StationCrowd::Medium);

        let night = Some(at(23, 30));
        assert_eq!(estimate_crowd_level("Dhaka", night), StationCrowd::Low);

        let midday = Some(at(13, 0));
        assert_eq!(estimate_crowd_level("Sylhet", midday), StationCrowd::Medium);
        assert_eq!(estimate_crowd_level("Noapara", midday), StationCrowd::Normal);

        assert_eq!(estimate_crowd_level("Dhaka", None), StationCrowd::Normal);
    }
}
