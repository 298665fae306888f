//! Departure resolution for one selected stop.
//!
//! Tiers are tried strictly in order: live arrivals, today's timetable,
//! tomorrow's timetable. The first tier that yields anything answers;
//! nothing is retried within a tier.

use tracing::{debug, info};

use crate::clock::{Instant, TimeWindow};
use crate::live::{LiveQuery, LiveSource};
use crate::stop::Stop;
use crate::timetable::DayOffset;
use crate::types::{Departure, Resolution, ResolutionSource};

pub struct DepartureResolver<L> {
    live: L,
    window: TimeWindow,
}

impl<L: LiveSource> DepartureResolver<L> {
    pub fn new(live: L) -> Self {
        Self {
            live,
            window: TimeWindow::default(),
        }
    }

    /// Window applied to today's timetable entries.
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    #[tracing::instrument(skip(self, stop, now), fields(stop_id = %stop.id))]
    pub async fn resolve(&self, stop: &Stop, now: &Instant) -> Resolution {
        let (source, departures) = self.resolve_tiers(stop, now).await;
        info!(source = source.as_str(), count = departures.len(), "Departures resolved");
        Resolution {
            stop_id: stop.id.clone(),
            source,
            computed_at: *now,
            departures,
        }
    }

    async fn resolve_tiers(&self, stop: &Stop, now: &Instant) -> (ResolutionSource, Vec<Departure>) {
        if let Some(live_id) = &stop.live_id {
            let query = LiveQuery::stop(live_id.clone()).with_routes(stop.route_ids());
            let arrivals = self.live.fetch_live_arrivals(&query, now).await;
            if !arrivals.is_empty() {
                return (
                    ResolutionSource::Live,
                    arrivals.into_iter().map(Departure::from).collect(),
                );
            }
            debug!("No live arrivals, trying timetable");
        }

        let Some(timetable) = &stop.timetable else {
            return (ResolutionSource::NoData, Vec::new());
        };

        let today = timetable.expand(now, DayOffset::Today, &self.window);
        if !today.is_empty() {
            return (ResolutionSource::Scheduled, today);
        }

        let tomorrow = timetable.expand(now, DayOffset::Tomorrow, &self.window);
        if !tomorrow.is_empty() {
            return (ResolutionSource::Tomorrow, tomorrow);
        }

        (ResolutionSource::NoData, Vec::new())
    }
}
