//! Periodic departure refresh for the selected stop.
//!
//! The selected stop is an immutable [`Selection`] value that is replaced
//! wholesale on every new selection. A single background task resolves
//! the current selection on a fixed tick, on demand, and whenever the
//! selection changes. An in-flight resolution is abandoned as soon as the
//! selection changes, so a hung fetch for an old stop never delays the
//! board of a new one. Each selection carries a generation number and a
//! result is only emitted if its generation is still current.

use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::live::LiveSource;
use crate::resolver::DepartureResolver;
use crate::stop::Stop;
use crate::types::Resolution;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Selection {
    pub generation: u64,
    pub stop: Arc<Stop>,
}

/// A resolution tagged with the selection it was computed for.
#[derive(Debug, Clone)]
pub struct Board {
    pub generation: u64,
    pub stop: Arc<Stop>,
    pub resolution: Resolution,
}

/// Owner-side control of a running refresh task. Dropping the handle
/// stops the task at its next wake-up; [`RefreshHandle::shutdown`] stops
/// it immediately.
pub struct RefreshHandle {
    selection: watch::Sender<Option<Selection>>,
    generation: AtomicU64,
    refresh: Arc<Notify>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Replaces the selection and returns its generation.
    pub fn select(&self, stop: Stop) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(stop_id = %stop.id, generation, "Stop selected");
        self.selection.send_replace(Some(Selection {
            generation,
            stop: Arc::new(stop),
        }));
        generation
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.selection.send_replace(None);
    }

    /// Resolves the current selection without waiting for the next tick.
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    pub fn current(&self) -> Option<Selection> {
        self.selection.borrow().clone()
    }

    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Spawns the refresh loop. Boards are delivered on `boards`; the loop
/// ends when the receiver is dropped.
pub fn spawn_refresh<L>(
    resolver: Arc<DepartureResolver<L>>,
    tz: Tz,
    period: Duration,
    boards: mpsc::Sender<Board>,
) -> RefreshHandle
where
    L: LiveSource + 'static,
{
    let (selection_tx, selection_rx) = watch::channel(None);
    let refresh = Arc::new(Notify::new());

    let task = tokio::spawn(run_refresh(resolver, tz, period, selection_rx, refresh.clone(), boards));

    RefreshHandle {
        selection: selection_tx,
        generation: AtomicU64::new(0),
        refresh,
        task,
    }
}

async fn run_refresh<L: LiveSource>(
    resolver: Arc<DepartureResolver<L>>,
    tz: Tz,
    period: Duration,
    mut selection: watch::Receiver<Option<Selection>>,
    refresh: Arc<Notify>,
    boards: mpsc::Sender<Board>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let current = selection.borrow_and_update().clone();

        if let Some(sel) = current {
            let now = Utc::now().with_timezone(&tz);
            let resolved = tokio::select! {
                resolution = resolver.resolve(&sel.stop, &now) => Some(resolution),
                changed = selection.changed() => {
                    if changed.is_err() {
                        debug!("Selection handle dropped, stopping refresh");
                        return;
                    }
                    None
                }
            };
            let Some(resolution) = resolved else {
                debug!(generation = sel.generation, "Selection changed mid-resolution, abandoning it");
                continue;
            };

            let latest = selection.borrow().as_ref().map(|s| s.generation);
            if latest == Some(sel.generation) {
                let board = Board {
                    generation: sel.generation,
                    stop: sel.stop,
                    resolution,
                };
                if boards.send(board).await.is_err() {
                    debug!("Board receiver dropped, stopping refresh");
                    return;
                }
            } else {
                debug!(generation = sel.generation, ?latest, "Discarding stale resolution");
            }
        }

        ticker.reset();
        tokio::select! {
            _ = ticker.tick() => {}
            _ = refresh.notified() => debug!("Manual refresh"),
            changed = selection.changed() => {
                if changed.is_err() {
                    debug!("Selection handle dropped, stopping refresh");
                    return;
                }
            }
        }
    }
}
