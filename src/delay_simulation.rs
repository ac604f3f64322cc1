// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::errors::HistoryError;
use crate::models::Confidence;
use crate::models::DelayDistribution;
use crate::models::DelayFactors;
use crate::models::DelayPrediction;
use crate::models::DelayStats;
use crate::models::PredictionFactors;
use crate::models::RouteStop;
use crate::models::SimulatedDelay;
use crate::models::Weather;
use crate::time_parsing::format_iso;
use crate::time_parsing::parse_iso;
use crate::time_parsing::parse_schedule_time;
use chrono::Datelike;
use chrono::NaiveDateTime;
use chrono::Timelike;
use chrono::Weekday;
use dashmap::DashMap;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde_derive::Serialize;
use std::collections::VecDeque;

/// Rolling history per (train, station), oldest evicted first.
pub const HISTORY_CAP: usize = 100;

const BASE_DELAY_PROBABILITY: f64 = 0.3;
const MAX_DELAY_MINUTES: i64 = 120;

/// Hub stations attract more delay; matched as case-insensitive
/// substrings so "Dhaka Cantonment" picks up the Dhaka factor.
const STATION_DELAY_FACTORS: &[(&str, f64)] = &[
    ("dhaka", 1.5),
    ("chattogram", 1.4),
    ("rajshahi", 1.2),
    ("khulna", 1.2),
    ("sylhet", 1.1),
    ("barisal", 1.1),
    ("rangpur", 1.1),
    ("mymensingh", 1.0),
];

pub fn time_of_day_factor(at: NaiveDateTime) -> f64 {
    match at.hour() {
        5..=7 => 0.8,   // early morning
        8..=9 => 1.4,   // morning rush
        10..=11 => 1.0, // mid morning
        12..=16 => 1.1, // afternoon
        17..=19 => 1.6, // evening rush
        20..=21 => 1.2, // late evening
        _ => 0.9,       // night
    }
}

pub fn day_of_week_factor(at: NaiveDateTime) -> f64 {
    match at.weekday() {
        Weekday::Mon => 1.3,
        Weekday::Tue => 1.1,
        Weekday::Wed => 1.0,
        Weekday::Thu => 1.1,
        Weekday::Fri => 1.4,
        Weekday::Sat => 0.9,
        Weekday::Sun => 0.8,
    }
}

pub fn station_factor(station_name: &str) -> f64 {
    let lowered = station_name.to_lowercase();
    STATION_DELAY_FACTORS
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, factor)| *factor)
        .unwrap_or(1.0)
}

#[derive(Clone, Debug)]
pub struct DelayObservation {
    pub delay_minutes: i64,
    pub observed_at: NaiveDateTime,
}

/// A route stop with its simulated delay attached, for whole-route
/// what-if simulation.
#[derive(Clone, Debug, Serialize)]
pub struct SimulatedRouteStop {
    #[serde(flatten)]
    pub stop: RouteStop,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated_delay: Option<SimulatedDelay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather_condition: Option<Weather>,
}

/// Synthetic delay generator. There is no live telemetry anywhere in
/// this service; delays are drawn from a multi-factor model and the
/// draws themselves become the "historical" record that statistics and
/// predictions are computed from.
///
/// The per-bucket append-and-evict goes through a DashMap entry lock,
/// so concurrent requests against the same (train, station) bucket
/// serialize while different buckets proceed in parallel.
pub struct DelaySimulator {
    history: DashMap<(String, String), VecDeque<DelayObservation>>,
}

impl Default for DelaySimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DelaySimulator {
    pub fn new() -> DelaySimulator {
        DelaySimulator {
            history: DashMap::new(),
        }
    }

    /// Draw a delay for one train at one station and record it.
    ///
    /// Base draw: 30% chance of 5-25 minutes, else on time. The base is
    /// scaled by weather, time-of-day, day-of-week and station factors,
    /// jittered by ±20%, truncated to whole minutes and clamped to
    /// [0, 120]. The factors used are reported back for observability.
    pub fn simulate_delay(
        &self,
        train_number: &str,
        station_name: &str,
        scheduled_time: NaiveDateTime,
        now: NaiveDateTime,
        weather: Weather,
        rng: &mut impl Rng,
    ) -> SimulatedDelay {
        let base_delay = if rng.random_bool(BASE_DELAY_PROBABILITY) {
            rng.random_range(5..=25) as f64
        } else {
            0.0
        };

        let factors = DelayFactors {
            weather: weather.delay_factor(),
            time_of_day: time_of_day_factor(now),
            day_of_week: day_of_week_factor(now),
            station: station_factor(station_name),
        };

        let scaled = base_delay
            * factors.weather
            * factors.time_of_day
            * factors.day_of_week
            * factors.station;
        let jittered = scaled * rng.random_range(0.8..1.2);

        let delay_minutes = (jittered as i64).clamp(0, MAX_DELAY_MINUTES);
        let actual_time = scheduled_time + chrono::Duration::minutes(delay_minutes);

        self.record(train_number, station_name, delay_minutes, now);

        SimulatedDelay {
            delay_minutes,
            scheduled_time: format_iso(scheduled_time),
            actual_time: format_iso(actual_time),
            weather_condition: weather,
            factors_applied: factors,
        }
    }

    pub(crate) fn record(
        &self,
        train_number: &str,
        station_name: &str,
        delay_minutes: i64,
        observed_at: NaiveDateTime,
    ) {
        let mut bucket = self
            .history
            .entry((train_number.to_string(), station_name.to_string()))
            .or_default();

        bucket.push_back(DelayObservation {
            delay_minutes,
            observed_at,
        });
        if bucket.len() > HISTORY_CAP {
            bucket.pop_front();
        }
    }

    /// Descriptive statistics over recorded delays, for one station or
    /// across the whole train. Absence of data is an explicit error so
    /// callers can tell "no observations" apart from "always on time".
    pub fn historical_stats(
        &self,
        train_number: &str,
        station_name: Option<&str>,
    ) -> Result<DelayStats, HistoryError> {
        let train_has_data = self
            .history
            .iter()
            .any(|entry| entry.key().0 == train_number && !entry.value().is_empty());
        if !train_has_data {
            return Err(HistoryError::NoData);
        }

        let delays: Vec<i64> = match station_name {
            Some(station) => {
                let key = (train_number.to_string(), station.to_string());
                match self.history.get(&key) {
                    Some(bucket) if !bucket.is_empty() => {
                        bucket.iter().map(|obs| obs.delay_minutes).collect()
                    }
                    _ => return Err(HistoryError::NoStationData),
                }
            }
            None => self
                .history
                .iter()
                .filter(|entry| entry.key().0 == train_number)
                .flat_map(|entry| {
                    entry
                        .value()
                        .iter()
                        .map(|obs| obs.delay_minutes)
                        .collect::<Vec<i64>>()
                })
                .collect(),
        };

        let total = delays.len();
        let mean = delays.iter().sum::<i64>() as f64 / total as f64;

        let mut distribution = DelayDistribution::default();
        for delay in &delays {
            match *delay {
                0..=15 => distribution.zero_to_fifteen += 1,
                16..=30 => distribution.sixteen_to_thirty += 1,
                31..=60 => distribution.thirtyone_to_sixty += 1,
                _ => distribution.over_sixty += 1,
            }
        }

        Ok(DelayStats {
            total_delays: total,
            average_delay: (mean * 10.0).round() / 10.0,
            max_delay: delays.iter().copied().max().unwrap_or(0),
            min_delay: delays.iter().copied().min().unwrap_or(0),
            delay_distribution: distribution,
        })
    }

    /// Probability that this train runs late at this station, from the
    /// recorded history scaled by the scheduled slot's time and day
    /// factors. With no history at all the model falls back to the base
    /// 30% guess at low confidence.
    pub fn predict_probability(
        &self,
        train_number: &str,
        station_name: &str,
        scheduled_time: NaiveDateTime,
    ) -> DelayPrediction {
        let key = (train_number.to_string(), station_name.to_string());
        let observations: Vec<i64> = match self.history.get(&key) {
            Some(bucket) => bucket.iter().map(|obs| obs.delay_minutes).collect(),
            None => Vec::new(),
        };

        if observations.is_empty() {
            return DelayPrediction {
                delay_probability: BASE_DELAY_PROBABILITY,
                confidence: Confidence::Low,
                historical_data_points: 0,
                factors_applied: None,
            };
        }

        let total = observations.len();
        let delayed = observations.iter().filter(|d| **d > 0).count();
        let historical_probability = delayed as f64 / total as f64;

        let time_factor = time_of_day_factor(scheduled_time);
        let day_factor = day_of_week_factor(scheduled_time);

        let adjusted = (historical_probability * time_factor * day_factor).clamp(0.1, 0.9);

        let confidence = if total >= 50 {
            Confidence::High
        } else if total >= 20 {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        DelayPrediction {
            delay_probability: (adjusted * 1000.0).round() / 1000.0,
            confidence,
            historical_data_points: total,
            factors_applied: Some(PredictionFactors {
                time_of_day: time_factor,
                day_of_week: day_factor,
            }),
        }
    }

    /// Simulated weather, sampled from an hour-of-day weighted table.
    /// The location is accepted for interface stability but does not
    /// influence the draw yet; a real weather feed would hook in here.
    pub fn weather_condition(
        &self,
        _location: Option<&str>,
        now: NaiveDateTime,
        rng: &mut impl Rng,
    ) -> Weather {
        let choices: &[(Weather, u32)] = if (6..=18).contains(&now.hour()) {
            &[(Weather::Clear, 6), (Weather::Cloudy, 3), (Weather::Rainy, 1)]
        } else {
            &[(Weather::Clear, 7), (Weather::Cloudy, 2), (Weather::Foggy, 1)]
        };

        choices
            .choose_weighted(rng, |choice| choice.1)
            .map(|choice| choice.0)
            .unwrap_or(Weather::Clear)
    }

    /// Run the delay model over a whole route, chaining each stop's
    /// simulated actual time into the next stop's reference clock.
    /// Stops without a readable departure pass through untouched.
    pub fn simulate_route_delays(
        &self,
        route: &[RouteStop],
        start_time: NaiveDateTime,
        rng: &mut impl Rng,
    ) -> Vec<SimulatedRouteStop> {
        let mut current_time = start_time;
        let mut simulated = Vec::with_capacity(route.len());

        for stop in route {
            let scheduled_departure =
                parse_schedule_time(stop.departure_time.as_deref(), current_time);

            match scheduled_departure {
                Some(departure) => {
                    let weather = self.weather_condition(Some(&stop.city), current_time, rng);
                    let delay_info = self.simulate_delay(
                        "ROUTE_SIMULATION",
                        &stop.city,
                        departure,
                        current_time,
                        weather,
                        rng,
                    );

                    if let Some(actual) = parse_iso(&delay_info.actual_time) {
                        current_time = actual;
                    }

                    simulated.push(SimulatedRouteStop {
                        stop: stop.clone(),
                        simulated_delay: Some(delay_info),
                        weather_condition: Some(weather),
                    });
                }
                None => {
                    simulated.push(SimulatedRouteStop {
                        stop: stop.clone(),
                        simulated_delay: None,
                        weather_condition: None,
                    });
                }
            }
        }

        simulated
    }
}
