// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::models::Coordinate;
use crate::models::ScheduleFile;
use crate::time_parsing::format_iso;
use ahash::AHashMap;
use chrono::NaiveDateTime;
use log::{error, info, warn};
use serde_derive::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

/// One immutable snapshot of every reference-data file. Handlers clone
/// the `Arc`, so a reload never mutates data a request is reading.
pub struct LoadedData {
    pub stations: AHashMap<String, Coordinate>,
    pub segments: AHashMap<String, serde_json::Value>,
    pub schedules: AHashMap<String, ScheduleFile>,
    pub route_mappings: AHashMap<String, serde_json::Value>,
    pub loaded_at: NaiveDateTime,
}

#[derive(Clone, Serialize)]
pub struct TrainSearchResult {
    pub train_key: String,
    pub schedule: ScheduleFile,
}

#[derive(Clone, Serialize)]
pub struct StationCall {
    pub train_number: String,
    pub train_name: String,
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
    pub halt_duration: String,
    pub operating_days: Vec<String>,
}

#[derive(Clone, Serialize)]
pub struct DataStatus {
    pub stations_count: usize,
    pub segments_count: usize,
    pub schedules_count: usize,
    pub route_mappings_count: usize,
    pub last_loaded: Option<String>,
    pub cache_valid: bool,
}

impl LoadedData {
    pub fn get_schedule(&self, train_number: &str) -> Option<&ScheduleFile> {
        self.schedules.get(train_number)
    }

    pub fn get_coordinates(&self, station_name: &str) -> Option<Coordinate> {
        self.stations.get(station_name).copied()
    }

    pub fn all_train_numbers(&self) -> Vec<String> {
        let mut numbers: Vec<String> = self.schedules.keys().cloned().collect();
        numbers.sort();
        numbers
    }

    /// Trains calling at both stations, in that order along the route.
    pub fn search_by_stations(&self, from_station: &str, to_station: &str) -> Vec<TrainSearchResult> {
        let mut results: Vec<TrainSearchResult> = self
            .schedules
            .iter()
            .filter(|(_, schedule)| {
                let cities: Vec<&str> = schedule
                    .data
                    .routes
                    .iter()
                    .map(|stop| stop.city.as_str())
                    .collect();

                match (
                    cities.iter().position(|c| *c == from_station),
                    cities.iter().position(|c| *c == to_station),
                ) {
                    (Some(from_idx), Some(to_idx)) => from_idx < to_idx,
                    _ => false,
                }
            })
            .map(|(train_key, schedule)| TrainSearchResult {
                train_key: train_key.clone(),
                schedule: schedule.clone(),
            })
            .collect();

        results.sort_by(|a, b| a.train_key.cmp(&b.train_key));
        info!(
            "Found {} trains between {} and {}",
            results.len(),
            from_station,
            to_station
        );
        results
    }

    /// Case-insensitive substring match against train key or display name.
    pub fn search_by_number(&self, query: &str) -> Vec<TrainSearchResult> {
        let needle = query.to_lowercase();

        let mut results: Vec<TrainSearchResult> = self
            .schedules
            .iter()
            .filter(|(train_key, schedule)| {
                train_key.to_lowercase().contains(&needle)
                    || schedule.data.train_name.to_lowercase().contains(&needle)
            })
            .map(|(train_key, schedule)| TrainSearchResult {
                train_key: train_key.clone(),
                schedule: schedule.clone(),
            })
            .collect();

        results.sort_by(|a, b| a.train_key.cmp(&b.train_key));
        info!("Found {} trains matching '{}'", results.len(), query);
        results
    }

    pub fn trains_calling_at(&self, station_name: &str) -> Vec<StationCall> {
        let mut calls: Vec<StationCall> = self
            .schedules
            .iter()
            .filter_map(|(train_key, schedule)| {
                let stop = schedule
                    .data
                    .routes
                    .iter()
                    .find(|stop| stop.city == station_name)?;

                Some(StationCall {
                    train_number: train_key.clone(),
                    train_name: schedule.data.train_name.clone(),
                    arrival_time: stop.arrival_time.clone(),
                    departure_time: stop.departure_time.clone(),
                    halt_duration: stop.halt.clone().unwrap_or_else(|| "---".to_string()),
                    operating_days: schedule.data.days.clone(),
                })
            })
            .collect();

        calls.sort_by(|a, b| a.train_number.cmp(&b.train_number));
        calls
    }

    fn status(&self, cache_valid: bool) -> DataStatus {
        DataStatus {
            stations_count: self.stations.len(),
            segments_count: self.segments.len(),
            schedules_count: self.schedules.len(),
            route_mappings_count: self.route_mappings.len(),
            last_loaded: Some(format_iso(self.loaded_at)),
            cache_valid,
        }
    }
}

struct CacheEntry {
    data: Arc<LoadedData>,
    fetched: Instant,
}

/// Loads and caches the static reference files: `stations.json`,
/// `Bangladesh_500m_segments.json`, `schedules/*.json` (train key taken
/// from the filename) and any `*train_route_mapping*.json`.
///
/// Every per-file failure is skipped with a warning; a half-broken data
/// directory still yields a serving snapshot.
pub struct ScheduleStore {
    data_dir: PathBuf,
    cache_duration: Duration,
    cache: RwLock<Option<CacheEntry>>,
}

impl ScheduleStore {
    pub fn new(data_dir: PathBuf, cache_duration: Duration) -> ScheduleStore {
        ScheduleStore {
            data_dir,
            cache_duration,
            cache: RwLock::new(None),
        }
    }

    /// Current snapshot, reloading from disk when the cache has expired.
    pub fn snapshot(&self) -> Arc<LoadedData> {
        if let Some(entry) = self.cache.read().unwrap().as_ref() {
            if entry.fetched.elapsed() < self.cache_duration {
                return Arc::clone(&entry.data);
            }
        }

        self.reload()
    }

    /// Force a reload regardless of cache age.
    pub fn refresh(&self) -> DataStatus {
        self.reload().status(true)
    }

    pub fn status(&self) -> DataStatus {
        let snapshot = self.snapshot();
        snapshot.status(true)
    }

    fn reload(&self) -> Arc<LoadedData> {
        let mut guard = self.cache.write().unwrap();

        // another request may have reloaded while we waited on the lock
        if let Some(entry) = guard.as_ref() {
            if entry.fetched.elapsed() < self.cache_duration {
                return Arc::clone(&entry.data);
            }
        }

        info!("Loading all data files from {}", self.data_dir.display());
        let data = Arc::new(load_from_disk(&self.data_dir));
        *guard = Some(CacheEntry {
            data: Arc::clone(&data),
            fetched: Instant::now(),
        });
        data
    }
}

fn load_from_disk(data_dir: &Path) -> LoadedData {
    let stations = load_stations(data_dir);
    let segments = load_segments(data_dir);
    let schedules = load_schedules(data_dir);
    let route_mappings = load_route_mappings(data_dir);

    info!(
        "Data loaded: {} stations, {} segments, {} schedules, {} route mappings",
        stations.len(),
        segments.len(),
        schedules.len(),
        route_mappings.len()
    );

    LoadedData {
        stations,
        segments,
        schedules,
        route_mappings,
        loaded_at: chrono::Local::now().naive_local(),
    }
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn load_stations(data_dir: &Path) -> AHashMap<String, Coordinate> {
    let path = data_dir.join("stations.json");
    if !path.is_file() {
        warn!("stations.json not found");
        return AHashMap::new();
    }

    match read_json_file::<AHashMap<String, [f64; 2]>>(&path) {
        Ok(raw) => {
            info!("Loaded {} stations", raw.len());
            raw.into_iter()
                .map(|(name, pair)| (name, Coordinate::from(pair)))
                .collect()
        }
        Err(e) => {
            error!("Error loading stations: {}", e);
            AHashMap::new()
        }
    }
}

fn load_segments(data_dir: &Path) -> AHashMap<String, serde_json::Value> {
    let path = data_dir.join("Bangladesh_500m_segments.json");
    if !path.is_file() {
        warn!("Bangladesh_500m_segments.json not found");
        return AHashMap::new();
    }

    match read_json_file::<AHashMap<String, serde_json::Value>>(&path) {
        Ok(segments) => {
            info!("Loaded {} segments", segments.len());
            segments
        }
        Err(e) => {
            error!("Error loading segments: {}", e);
            AHashMap::new()
        }
    }
}

fn load_schedules(data_dir: &Path) -> AHashMap<String, ScheduleFile> {
    let schedules_dir = data_dir.join("schedules");
    if !schedules_dir.is_dir() {
        warn!("schedules/ directory not found");
        return AHashMap::new();
    }

    let entries = match std::fs::read_dir(&schedules_dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Error reading schedules directory: {}", e);
            return AHashMap::new();
        }
    };

    let mut schedules = AHashMap::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        // train key is the filename without extension
        let train_key = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };

        match read_json_file::<ScheduleFile>(&path) {
            Ok(schedule) => {
                schedules.insert(train_key, schedule);
            }
            Err(e) => {
                warn!("Error loading {}: {}", path.display(), e);
            }
        }
    }

    info!("Loaded {} schedules", schedules.len());
    schedules
}

fn load_route_mappings(data_dir: &Path) -> AHashMap<String, serde_json::Value> {
    let entries = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Error reading data directory: {}", e);
            return AHashMap::new();
        }
    };

    let mut route_mappings = AHashMap::new();

    for entry in entries.flatten() {
        let path = entry.path();
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };

        if !file_name.contains("train_route_mapping") || !file_name.ends_with(".json") {
            continue;
        }

        match read_json_file::<AHashMap<String, serde_json::Value>>(&path) {
            Ok(mapping) => {
                route_mappings.extend(mapping);
            }
            Err(e) => {
                warn!("Error loading {}: {}", path.display(), e);
            }
        }
    }

    info!("Loaded {} route mappings", route_mappings.len());
    route_mappings
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::RouteStop;
    use crate::models::TrainData;

    pub fn stop(
        city: &str,
        arrival: Option<&str>,
        departure: Option<&str>,
    ) -> RouteStop {
        RouteStop {
            city: city.to_string(),
            arrival_time: arrival.map(str::to_string),
            departure_time: departure.map(str::to_string),
            halt: Some("5 min".to_string()),
            duration: Some("---".to_string()),
        }
    }

    pub fn loaded_data(
        schedules: Vec<(&str, &str, Vec<RouteStop>)>,
        stations: Vec<(&str, f64, f64)>,
    ) -> LoadedData {
        let mut schedule_map = AHashMap::new();
        for (key, name, routes) in schedules {
            schedule_map.insert(
                key.to_string(),
                ScheduleFile {
                    data: TrainData {
                        train_name: name.to_string(),
                        days: vec!["Monday".to_string(), "Friday".to_string()],
                        routes,
                    },
                },
            );
        }

        let mut station_map = AHashMap::new();
        for (name, lon, lat) in stations {
            station_map.insert(
                name.to_string(),
                Coordinate {
                    longitude: lon,
                    latitude: lat,
                },
            );
        }

        LoadedData {
            stations: station_map,
            segments: AHashMap::new(),
            schedules: schedule_map,
            route_mappings: AHashMap::new(),
            loaded_at: chrono::Local::now().naive_local(),
        }
    }
}
