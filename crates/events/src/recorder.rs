//! Writes bus traffic to the `events` table.
//!
//! The recorder waits for one event, then drains whatever else is already
//! buffered (up to [`EventRecorder::MAX_BATCH`]) and stores the lot with a
//! single `INSERT ... SELECT FROM UNNEST`. A failed batch is retried row by
//! row so one bad event does not take its neighbours down with it.

use muse_db::models::event::NewEvent;
use muse_db::repositories::EventRepo;
use muse_db::DbPool;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::bus::PlatformEvent;

/// Running totals, logged when the recorder stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecorderStats {
    pub stored: u64,
    pub failed: u64,
    /// Events the broadcast channel overwrote before we could read them.
    pub missed: u64,
}

pub struct EventRecorder {
    pool: DbPool,
    stats: RecorderStats,
}

impl EventRecorder {
    pub const MAX_BATCH: usize = 64;

    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            stats: RecorderStats::default(),
        }
    }

    /// Consume the receiver until every sender is gone.
    pub async fn run(mut self, mut receiver: broadcast::Receiver<PlatformEvent>) -> RecorderStats {
        let mut batch: Vec<PlatformEvent> = Vec::with_capacity(Self::MAX_BATCH);
        let mut closed = false;

        while !closed {
            match receiver.recv().await {
                Ok(event) => batch.push(event),
                Err(RecvError::Lagged(n)) => self.note_missed(n),
                Err(RecvError::Closed) => closed = true,
            }

            while batch.len() < Self::MAX_BATCH && !closed {
                match receiver.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(TryRecvError::Lagged(n)) => self.note_missed(n),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Closed) => closed = true,
                }
            }

            self.flush(&mut batch).await;
        }

        tracing::info!(
            stored = self.stats.stored,
            failed = self.stats.failed,
            missed = self.stats.missed,
            "Event bus closed, recorder stopped"
        );
        self.stats
    }

    /// Store and clear `batch`.
    pub async fn flush(&mut self, batch: &mut Vec<PlatformEvent>) {
        if batch.is_empty() {
            return;
        }
        let rows: Vec<NewEvent<'_>> = batch.iter().map(as_row).collect();

        match EventRepo::insert_batch(&self.pool, &rows).await {
            Ok(n) => self.stats.stored += n,
            Err(e) => {
                tracing::warn!(error = %e, size = rows.len(), "Event batch rejected, storing one by one");
                for row in &rows {
                    match EventRepo::insert(&self.pool, row).await {
                        Ok(_) => self.stats.stored += 1,
                        Err(e) => {
                            self.stats.failed += 1;
                            tracing::error!(error = %e, event_type = row.event_type, "Failed to store event");
                        }
                    }
                }
            }
        }
        batch.clear();
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    fn note_missed(&mut self, n: u64) {
        self.stats.missed += n;
        tracing::warn!(missed = n, "Event recorder fell behind the bus");
    }
}

fn as_row(event: &PlatformEvent) -> NewEvent<'_> {
    NewEvent {
        event_type: &event.event_type,
        source_entity_type: event.source_entity_type.as_deref(),
        source_entity_id: event.source_entity_id,
        actor_user_id: event.actor_user_id,
        payload: &event.payload,
        occurred_at: event.timestamp,
    }
}
