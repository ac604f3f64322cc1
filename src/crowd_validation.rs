// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::errors::CrowdError;
use crate::models::Confidence;
use crate::models::Confirmation;
use crate::models::ConfirmationReceipt;
use crate::models::Coordinate;
use crate::models::CrowdAttachment;
use crate::models::CrowdData;
use crate::models::CrowdLevel;
use crate::models::CrowdMetrics;
use crate::models::Freshness;
use crate::models::TrainStatusReport;
use crate::models::TrainValidations;
use crate::models::ValidationSummary;
use crate::time_parsing::format_iso;
use crate::time_parsing::parse_iso;
use ahash::AHashMap;
use chrono::NaiveDateTime;
use log::{error, info, warn};
use rand::Rng;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// User "I am on this train" confirmations, persisted as one JSON file.
///
/// "Active" is a live predicate over the confirmation timestamp, not a
/// stored flag: a confirmation counts while it is younger than the
/// active window (2 hours by default). One lock guards the whole table
/// because every mutation also rewrites the backing file.
pub struct CrowdValidationStore {
    path: Option<PathBuf>,
    active_window_secs: i64,
    table: RwLock<AHashMap<String, TrainValidations>>,
}

impl CrowdValidationStore {
    /// Open the store, reading any existing validations file. A missing
    /// or unreadable file degrades to an empty table.
    pub fn open(path: Option<PathBuf>, active_window_secs: i64) -> CrowdValidationStore {
        let table = match &path {
            Some(file) if file.is_file() => match std::fs::read_to_string(file) {
                Ok(raw) => match serde_json::from_str::<AHashMap<String, TrainValidations>>(&raw) {
                    Ok(table) => {
                        info!("Loaded crowd validations for {} trains", table.len());
                        table
                    }
                    Err(e) => {
                        error!("Error loading validations: {}", e);
                        AHashMap::new()
                    }
                },
                Err(e) => {
                    error!("Error loading validations: {}", e);
                    AHashMap::new()
                }
            },
            _ => AHashMap::new(),
        };

        CrowdValidationStore {
            path,
            active_window_secs,
            table: RwLock::new(table),
        }
    }

    fn persist(&self, table: &AHashMap<String, TrainValidations>) {
        let Some(path) = &self.path else {
            return;
        };

        match serde_json::to_string_pretty(table) {
            Ok(serialized) => {
                if let Err(e) = std::fs::write(path, serialized) {
                    error!("Error saving validations: {}", e);
                }
            }
            Err(e) => error!("Error saving validations: {}", e),
        }
    }

    /// Record (or refresh) a user's confirmation. At most one active
    /// confirmation exists per (train, user): repeats update in place.
    pub fn confirm(
        &self,
        train_number: &str,
        user_id: &str,
        station_name: Option<String>,
        coordinates: Option<Coordinate>,
        now: NaiveDateTime,
    ) -> ConfirmationReceipt {
        let timestamp = format_iso(now);

        let message = {
            let mut table = self.table.write().unwrap();
            let bucket = table.entry(train_number.to_string()).or_default();

            let message = match bucket
                .confirmations
                .iter_mut()
                .find(|conf| conf.user_id == user_id)
            {
                Some(existing) => {
                    existing.timestamp = timestamp.clone();
                    existing.station_name = station_name;
                    existing.coordinates = coordinates;
                    "Confirmation updated"
                }
                None => {
                    bucket.confirmations.push(Confirmation {
                        user_id: user_id.to_string(),
                        timestamp: timestamp.clone(),
                        station_name,
                        coordinates,
                    });
                    bucket.total_confirmations += 1;
                    "Confirmation added"
                }
            };

            bucket.last_updated = Some(timestamp.clone());
            self.persist(&table);
            message
        };

        ConfirmationReceipt {
            message,
            train_number: train_number.to_string(),
            user_id: user_id.to_string(),
            timestamp,
            crowd_metrics: self.metrics(train_number, now),
        }
    }

    pub fn remove_confirmation(
        &self,
        train_number: &str,
        user_id: &str,
        now: NaiveDateTime,
    ) -> Result<(), CrowdError> {
        let mut table = self.table.write().unwrap();

        let bucket = table
            .get_mut(train_number)
            .ok_or(CrowdError::TrainNotFound)?;

        let position = bucket
            .confirmations
            .iter()
            .position(|conf| conf.user_id == user_id)
            .ok_or(CrowdError::UserNotFound)?;

        bucket.confirmations.remove(position);
        bucket.total_confirmations = bucket.total_confirmations.saturating_sub(1);
        bucket.last_updated = Some(format_iso(now));

        self.persist(&table);
        Ok(())
    }

    pub fn crowd_data(&self, train_number: &str, now: NaiveDateTime) -> CrowdData {
        let table = self.table.read().unwrap();

        match table.get(train_number) {
            Some(bucket) => {
                let active = self.active_confirmations(&bucket.confirmations, now);
                CrowdData {
                    train_number: train_number.to_string(),
                    total_confirmations: bucket.total_confirmations,
                    active_confirmations: active.len(),
                    crowd_level: crowd_level_for(active.len()),
                    last_updated: bucket.last_updated.clone(),
                    confirmations: active,
                }
            }
            None => CrowdData {
                train_number: train_number.to_string(),
                total_confirmations: 0,
                active_confirmations: 0,
                crowd_level: CrowdLevel::Low,
                last_updated: None,
                confirmations: Vec::new(),
            },
        }
    }

    pub fn metrics(&self, train_number: &str, now: NaiveDateTime) -> CrowdMetrics {
        let crowd_data = self.crowd_data(train_number, now);
        let active_count = crowd_data.active_confirmations;

        let avg_minutes_ago = if crowd_data.confirmations.is_empty() {
            0
        } else {
            let total_secs: i64 = crowd_data
                .confirmations
                .iter()
                .filter_map(|conf| parse_iso(&conf.timestamp))
                .map(|ts| (now - ts).num_seconds())
                .sum();
            total_secs / crowd_data.confirmations.len() as i64 / 60
        };

        let data_freshness = if avg_minutes_ago < 30 {
            Freshness::High
        } else if avg_minutes_ago < 60 {
            Freshness::Medium
        } else {
            Freshness::Low
        };

        CrowdMetrics {
            crowd_level: crowd_data.crowd_level,
            confidence: confidence_for(active_count),
            active_users: active_count,
            average_time_since_confirmation: format!("{} minutes ago", avg_minutes_ago),
            data_freshness,
        }
    }

    pub fn all_validations(&self, now: NaiveDateTime) -> BTreeMap<String, ValidationSummary> {
        let table = self.table.read().unwrap();

        table
            .iter()
            .map(|(train_number, bucket)| {
                let active = self.active_confirmations(&bucket.confirmations, now);
                (
                    train_number.clone(),
                    ValidationSummary {
                        total_confirmations: bucket.total_confirmations,
                        active_confirmations: active.len(),
                        crowd_level: crowd_level_for(active.len()),
                        last_updated: bucket.last_updated.clone(),
                    },
                )
            })
            .collect()
    }

    /// Drop confirmations older than `max_age_hours` and delete trains
    /// left with none. Returns how many trains were removed.
    pub fn cleanup(&self, max_age_hours: i64, now: NaiveDateTime) -> usize {
        let cutoff = now - chrono::Duration::hours(max_age_hours);
        let mut table = self.table.write().unwrap();

        let mut removed = 0;
        table.retain(|_, bucket| {
            bucket.confirmations.retain(|conf| {
                parse_iso(&conf.timestamp)
                    .map(|ts| ts > cutoff)
                    .unwrap_or(false)
            });
            bucket.total_confirmations = bucket.confirmations.len();

            if bucket.confirmations.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.persist(&table);
            info!("Cleaned up {} trains with old validations", removed);
        }

        removed
    }

    /// Fold crowd signal into a generated report. Only medium or high
    /// confidence moves the delay figure, and the nudge is randomized:
    /// this is a cosmetic refinement, not a measurement.
    pub fn adjust_report(
        &self,
        train_number: &str,
        mut report: TrainStatusReport,
        now: NaiveDateTime,
        rng: &mut impl Rng,
    ) -> TrainStatusReport {
        let crowd_data = self.crowd_data(train_number, now);
        let confidence = confidence_for(crowd_data.active_confirmations);

        if !matches!(confidence, Confidence::Medium | Confidence::High) {
            return report;
        }

        let adjustment = delay_adjustment(
            crowd_data.crowd_level,
            crowd_data.active_confirmations,
            rng,
        );
        report.delay_minutes = (report.delay_minutes + adjustment).max(0);

        report.crowd_validation = Some(CrowdAttachment {
            confidence,
            active_users: crowd_data.active_confirmations,
            crowd_level: crowd_data.crowd_level,
            last_updated: crowd_data.last_updated.clone(),
        });

        if confidence == Confidence::High && crowd_data.active_confirmations > 5 {
            report.eta_adjusted_by_crowd = Some(true);
            report.crowd_eta_confidence = Some(Confidence::High);
        }

        report
    }

    fn active_confirmations(
        &self,
        confirmations: &[Confirmation],
        now: NaiveDateTime,
    ) -> Vec<Confirmation> {
        let cutoff = now - chrono::Duration::seconds(self.active_window_secs);

        confirmations
            .iter()
            .filter(|conf| match parse_iso(&conf.timestamp) {
                Some(ts) => ts > cutoff,
                None => {
                    warn!("Unreadable confirmation timestamp: {}", conf.timestamp);
                    false
                }
            })
            .cloned()
            .collect()
    }
}

fn crowd_level_for(active_count: usize) -> CrowdLevel {
    if active_count == 0 {
        CrowdLevel::Low
    } else if active_count <= 5 {
        CrowdLevel::Medium
    } else if active_count <= 15 {
        CrowdLevel::High
    } else {
        CrowdLevel::VeryHigh
    }
}

fn confidence_for(active_count: usize) -> Confidence {
    if active_count == 0 {
        Confidence::None
    } else if active_count <= 3 {
        Confidence::Low
    } else if active_count <= 10 {
        Confidence::Medium
    } else {
        Confidence::High
    }
}

/// Signed delay nudge, larger for busier trains and scaled up once
/// enough users corroborate. More users means a stronger signal, not a
/// more precise one.
fn delay_adjustment(crowd_level: CrowdLevel, active_users: usize, rng: &mut impl Rng) -> i64 {
    let base: i64 = match crowd_level {
        CrowdLevel::Low => 0,
        CrowdLevel::Medium => rng.random_range(-2..=2),
        CrowdLevel::High => rng.random_range(-5..=5),
        CrowdLevel::VeryHigh => rng.random_range(-8..=8),
    };

    if active_users > 20 {
        (base as f64 * 2.0) as i64
    } else if active_users > 10 {
        (base as f64 * 1.5) as i64
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StationStatus;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 13)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    fn store() -> CrowdValidationStore {
        CrowdValidationStore::open(None, 7200)
    }

    fn confirm_users(store: &CrowdValidationStore, train: &str, count: usize, at: NaiveDateTime) {
        for i in 0..count {
            store.confirm(train, &format!("user-{}", i), None, None, at);
        }
    }

    fn empty_report(delay: i64) -> TrainStatusReport {
        TrainStatusReport {
            train_number: "701".to_string(),
            train_name: "Test Express".to_string(),
            station_statuses: Vec::<StationStatus>::new(),
            current_speed: 60.0,
            distance_covered: 0.0,
            distance_to_next: 0.0,
            delay_minutes: delay,
            estimated_arrival: None,
            progress_percentage: 0.0,
            current_station: None,
            next_station: None,
            weather_condition: crate::models::Weather::Clear,
            last_updated: format_iso(now()),
            crowd_validation: None,
            eta_adjusted_by_crowd: None,
            crowd_eta_confidence: None,
        }
    }

    #[test]
    fn test_crowd_level_boundaries() {
        assert_eq!(crowd_level_for(0), CrowdLevel::Low);
        assert_eq!(crowd_level_for(1), CrowdLevel::Medium);
        assert_eq!(crowd_level_for(5), CrowdLevel::Medium);
        assert_eq!(crowd_level_for(6), CrowdLevel::High);
        assert_eq!(crowd_level_for(15), CrowdLevel::High);
        assert_eq!(crowd_level_for(16), CrowdLevel::VeryHigh);
    }

    #[test]
    fn test_confidence_boundaries() {
        assert_eq!(confidence_for(0), Confidence::None);
        assert_eq!(confidence_for(3), Confidence::Low);
        assert_eq!(confidence_for(4), Confidence::Medium);
        assert_eq!(confidence_for(10), Confidence::Medium);
        assert_eq!(confidence_for(11), Confidence::High);
    }

    #[test]
    fn test_repeat_confirmation_updates_in_place() {
        let store = store();

        let first = store.confirm("701", "alice", None, None, now());
        assert_eq!(first.message, "Confirmation added");

        let second = store.confirm(
            "701",
            "alice",
            Some("Dhaka".to_string()),
            None,
            now() + chrono::Duration::minutes(10),
        );
        assert_eq!(second.message, "Confirmation updated");

        let data = store.crowd_data("701", now() + chrono::Duration::minutes(10));
        assert_eq!(data.total_confirmations, 1);
        assert_eq!(data.active_confirmations, 1);
        assert_eq!(
            data.confirmations[0].station_name.as_deref(),
            Some("Dhaka")
        );
    }

    #[test]
    fn test_active_window_is_live_predicate() {
        let store = store();
        let reference = now();

        store.confirm(
            "701",
            "fresh",
            None,
            None,
            reference - chrono::Duration::minutes(119),
        );
        store.confirm(
            "701",
            "stale",
            None,
            None,
            reference - chrono::Duration::minutes(121),
        );

        let data = store.crowd_data("701", reference);
        assert_eq!(data.total_confirmations, 2);
        assert_eq!(data.active_confirmations, 1);
        assert_eq!(data.confirmations[0].user_id, "fresh");
    }

    #[test]
    fn test_remove_confirmation() {
        let store = store();
        store.confirm("701", "alice", None, None, now());

        assert_eq!(
            store.remove_confirmation("999", "alice", now()),
            Err(CrowdError::TrainNotFound)
        );
        assert_eq!(
            store.remove_confirmation("701", "bob", now()),
            Err(CrowdError::UserNotFound)
        );
        assert_eq!(store.remove_confirmation("701", "alice", now()), Ok(()));
        assert_eq!(store.crowd_data("701", now()).total_confirmations, 0);
    }

    #[test]
    fn test_no_adjustment_below_medium_confidence() {
        let store = store();
        let mut rng = StdRng::seed_from_u64(1);

        // zero users: confidence none
        let untouched = store.adjust_report("701", empty_report(17), now(), &mut rng);
        assert_eq!(untouched.delay_minutes, 17);
        assert!(untouched.crowd_validation.is_none());

        // three users: confidence low, still untouched
        confirm_users(&store, "701", 3, now());
        let untouched = store.adjust_report("701", empty_report(17), now(), &mut rng);
        assert_eq!(untouched.delay_minutes, 17);
        assert!(untouched.crowd_validation.is_none());
        assert!(untouched.eta_adjusted_by_crowd.is_none());
    }

    #[test]
    fn test_adjustment_bounded_and_attached() {
        let store = store();
        confirm_users(&store, "701", 6, now());
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..100 {
            let adjusted = store.adjust_report("701", empty_report(20), now(), &mut rng);
            // six active users: level high, nudge within +-5
            assert!((15..=25).contains(&adjusted.delay_minutes));
            let attachment = adjusted.crowd_validation.expect("attachment missing");
            assert_eq!(attachment.active_users, 6);
            assert_eq!(attachment.crowd_level, CrowdLevel::High);
            assert_eq!(attachment.confidence, Confidence::Medium);
        }
    }

    #[test]
    fn test_adjustment_never_negative_delay() {
        let store = store();
        confirm_users(&store, "701", 25, now());
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..100 {
            let adjusted = store.adjust_report("701", empty_report(1), now(), &mut rng);
            assert!(adjusted.delay_minutes >= 0);
            // 25 users: high confidence and plenty of corroboration
            assert_eq!(adjusted.eta_adjusted_by_crowd, Some(true));
            assert_eq!(adjusted.crowd_eta_confidence, Some(Confidence::High));
        }
    }

    #[test]
    fn test_cleanup_drops_stale_trains() {
        let store = store();
        let reference = now();

        store.confirm(
            "701",
            "old-rider",
            None,
            None,
            reference - chrono::Duration::hours(30),
        );
        store.confirm("702", "current-rider", None, None, reference);

        let removed = store.cleanup(24, reference);
        assert_eq!(removed, 1);

        let summary = store.all_validations(reference);
        assert!(!summary.contains_key("701"));
        assert_eq!(summary.get("702").unwrap().active_confirmations, 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "trainjatri_crowd_test_{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        {
            let store = CrowdValidationStore::open(Some(path.clone()), 7200);
            store.confirm("701", "alice", Some("Dhaka".to_string()), None, now());
            store.confirm("701", "bob", None, None, now());
        }

        let reopened = CrowdValidationStore::open(Some(path.clone()), 7200);
        let data = reopened.crowd_data("701", now());
        assert_eq!(data.total_confirmations, 2);
        assert_eq!(data.active_confirmations, 2);

        let _ = std::fs::remove_file(&path);
    }
}
