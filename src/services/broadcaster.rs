use crate::models::UploadRecord;
use crate::services::registry::RecordRegistry;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Drives the simulated processing of each record and fans every
/// resulting snapshot out to all current subscribers.
///
/// Each record gets one tick task. Ticks for a record are strictly
/// ordered; tasks for different records interleave freely. A task retires
/// itself right after publishing the terminal `safe` snapshot.
pub struct ProgressBroadcaster {
    registry: RecordRegistry,
    sender: broadcast::Sender<UploadRecord>,
    tasks: Arc<DashMap<String, JoinHandle<()>>>,
    period: Duration,
    step: u8,
}

impl ProgressBroadcaster {
    pub fn new(registry: RecordRegistry, period: Duration, step: u8, buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            registry,
            sender,
            tasks: Arc::new(DashMap::new()),
            period,
            step: step.clamp(1, 100),
        }
    }

    /// New subscribers only see snapshots published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadRecord> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Number of records still ticking.
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Starts ticking `record_id`. A second call for an id that is already
    /// ticking does nothing.
    pub fn start(&self, record_id: &str) {
        let Entry::Vacant(slot) = self.tasks.entry(record_id.to_string()) else {
            tracing::debug!("Progress task for {} already running", record_id);
            return;
        };

        let handle = tokio::spawn(run_ticks(
            self.registry.clone(),
            self.sender.clone(),
            self.tasks.clone(),
            record_id.to_string(),
            self.period,
            self.step,
        ));
        slot.insert(handle);
    }

    /// Aborts every task still running. Used on process shutdown.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.tasks.iter().map(|t| t.key().clone()).collect();
        for id in ids {
            if let Some((_, handle)) = self.tasks.remove(&id) {
                handle.abort();
            }
        }
    }
}

async fn run_ticks(
    registry: RecordRegistry,
    sender: broadcast::Sender<UploadRecord>,
    tasks: Arc<DashMap<String, JoinHandle<()>>>,
    record_id: String,
    period: Duration,
    step: u8,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(snapshot) = registry.advance(&record_id, step) else {
            break;
        };
        let terminal = snapshot.is_terminal();

        tracing::debug!(
            record_id = %record_id,
            progress = snapshot.progress,
            "progress tick"
        );

        // No subscribers is fine; the record itself is already updated.
        let _ = sender.send(snapshot);

        if terminal {
            tracing::info!("✅ Record {} marked safe", record_id);
            break;
        }
    }

    tasks.remove(&record_id);
}
