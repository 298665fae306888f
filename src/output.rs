//! Output formatting and persistence for departure boards.
//!
//! Supports pretty-printing, JSON serialization, and CSV append.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Instant;
use crate::stop::Stop;
use crate::types::{DepartureSource, Resolution, ResolutionSource};
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One CSV row: a departure flattened together with the stop and the
/// resolution it came from. A resolution with no departures still
/// produces a single row so gaps in coverage stay visible.
#[derive(Debug, Serialize)]
pub struct DepartureRecord {
    pub computed_at: Instant,
    pub stop_id: String,
    pub stop_name: String,
    pub resolution_source: ResolutionSource,
    pub route: Option<String>,
    pub time: Option<Instant>,
    pub minutes_until: Option<i64>,
    pub countdown: Option<String>,
    pub departure_source: Option<DepartureSource>,
    pub destination: Option<String>,
    pub vehicle_id: Option<String>,
    pub agency_name: Option<String>,
    pub headway_minutes: Option<u32>,
    pub is_ac: Option<bool>,
    pub is_real_time: Option<bool>,
    pub delay_minutes: Option<i64>,
}

impl DepartureRecord {
    pub fn from_resolution(stop: &Stop, resolution: &Resolution) -> Vec<Self> {
        let now = &resolution.computed_at;
        let base = || DepartureRecord {
            computed_at: *now,
            stop_id: stop.id.clone(),
            stop_name: stop.name.clone(),
            resolution_source: resolution.source,
            route: None,
            time: None,
            minutes_until: None,
            countdown: None,
            departure_source: None,
            destination: None,
            vehicle_id: None,
            agency_name: None,
            headway_minutes: None,
            is_ac: None,
            is_real_time: None,
            delay_minutes: None,
        };

        if resolution.departures.is_empty() {
            return vec![base()];
        }

        resolution
            .departures
            .iter()
            .map(|d| DepartureRecord {
                route: Some(d.route.clone()),
                time: Some(d.time),
                minutes_until: Some(d.minutes_until(now)),
                countdown: Some(d.countdown_label(now)),
                departure_source: Some(d.source),
                destination: d.destination.clone(),
                vehicle_id: d.vehicle_id.clone(),
                agency_name: d.agency_name.clone(),
                headway_minutes: d.headway_minutes,
                is_ac: d.is_ac,
                is_real_time: Some(d.is_real_time),
                delay_minutes: d.delay_minutes,
                ..base()
            })
            .collect()
    }
}

/// Logs a board as one line per departure.
pub fn print_pretty(stop: &Stop, resolution: &Resolution) {
    let now = &resolution.computed_at;
    info!(
        stop_id = %stop.id,
        stop_name = %stop.name,
        source = %resolution.source,
        count = resolution.departures.len(),
        "Departure board"
    );
    for d in &resolution.departures {
        info!(
            route = %d.route,
            time = %d.time.format("%H:%M"),
            countdown = %d.countdown_label(now),
            destination = d.destination.as_deref().unwrap_or("-"),
            vehicle = d.vehicle_id.as_deref().unwrap_or("-"),
            "Departure"
        );
    }
    debug!("{:#?}", resolution);
}

/// Logs a resolution as pretty-printed JSON.
pub fn print_json(resolution: &Resolution) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(resolution)?);
    Ok(())
}

/// Appends the board's rows to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_departures(path: &str, stop: &Stop, resolution: &Resolution) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for record in DepartureRecord::from_resolution(stop, resolution) {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}
