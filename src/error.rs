use thiserror::Error;

/// A schedule or live time value that could not be turned into an instant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("Malformed time {0:?}, expected HH:MM")]
    Malformed(String),
    #[error("Time {0:?} is out of range")]
    OutOfRange(String),
    #[error("Local time {0:?} does not exist in the transit timezone")]
    Nonexistent(String),
}

/// Failure to obtain a live ETA payload. Always recovered by the caller.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid live ETA url: {0}")]
    Url(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Live ETA endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("Live ETA body is not JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum TimetableError {
    #[error("Timetable blob is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Timetable blob has unexpected type {0}")]
    UnexpectedType(&'static str),
}

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Failed to read feature file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Feature file is not valid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Expected a FeatureCollection, found {0:?}")]
    NotACollection(String),
}
