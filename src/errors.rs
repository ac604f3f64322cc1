// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use thiserror::Error;

/// Lookup failures surfaced as 404-equivalents by the HTTP layer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Train schedule not found")]
    TrainNotFound,
    #[error("No routes found in schedule")]
    EmptyRoute,
}

/// Statistics queries distinguish "no data" from a zero-valued answer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    #[error("No historical data available")]
    NoData,
    #[error("No data for this station")]
    NoStationData,
}

/// Crowd-validation mutations that had nothing to act on.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrowdError {
    #[error("No validations found for this train")]
    TrainNotFound,
    #[error("User confirmation not found")]
    UserNotFound,
}

/// The clock scan could not place the train anywhere on its route.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionError {
    #[error("Unable to determine current position")]
    Unavailable,
}
