use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::identity::CompactId;
use super::ingest::EventQueue;
use super::maintainer::BatchOutcome;
use super::query::{ChannelMemberListRequest, ChannelMemberListWindow, MemberListRequest, MemberListWindow};
use super::view::MemberView;

/// The shared membership engine.
///
/// Notification handlers only enqueue. The tick task is the single writer of
/// the view, applying a whole batch under one write lock, so readers always
/// observe the state at the end of a completed tick.
pub struct MemberListEngine {
    view: RwLock<MemberView>,
    queue: EventQueue,
    ready: watch::Sender<bool>,
    last_tick: Mutex<Option<DateTime<Utc>>>,
}

impl Default for MemberListEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberListEngine {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            view: RwLock::new(MemberView::default()),
            queue: EventQueue::new(),
            ready,
            last_tick: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Decode and queue one raw notification payload.
    pub fn enqueue_raw(&self, payload: &str) -> bool {
        self.queue.ingest_raw(payload)
    }

    /// Replace the view with a freshly bootstrapped one and open the ready gate.
    pub fn install(&self, view: MemberView) {
        *self.view.write() = view;
        self.ready.send_replace(true);
        info!(pending = self.queue.len(), "member view installed, serving queries");
    }

    /// Load the view from the source store and install it.
    pub async fn bootstrap(&self, pool: &SqlitePool) -> Result<(), String> {
        let view = MemberView::bootstrap_from_db(pool).await?;
        self.install(view);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolve once the view has been installed.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as the engine, so this only fails on shutdown.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        *self.last_tick.lock()
    }

    /// Drain the queue and apply it as one batch. Events stay queued until
    /// the view is installed.
    pub fn tick(&self) -> BatchOutcome {
        if !self.is_ready() {
            return BatchOutcome::default();
        }
        let started = Instant::now();
        let batch = self.queue.drain();
        let outcome = if batch.is_empty() {
            BatchOutcome::default()
        } else {
            self.view.write().apply_batch(batch)
        };
        *self.last_tick.lock() = Some(Utc::now());

        if outcome.events > 0 {
            info!(
                events = outcome.events,
                communities = outcome.communities_rebuilt,
                channels = outcome.channels_rebuilt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "applied change batch"
            );
        } else {
            debug!("tick with no pending events");
        }
        outcome
    }

    /// Run ticks on a fixed interval until cancelled.
    pub async fn run_ticks(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis() as u64, "view maintainer started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("view maintainer shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }

    /// Run `f` against the current settled view.
    pub fn read<R>(&self, f: impl FnOnce(&MemberView) -> R) -> R {
        f(&*self.view.read())
    }

    pub fn member_list_window(&self, request: &MemberListRequest) -> Option<MemberListWindow> {
        self.view.read().member_list_window(request)
    }

    pub fn channel_member_list_window(
        &self,
        request: &ChannelMemberListRequest,
    ) -> Option<ChannelMemberListWindow> {
        self.view.read().channel_member_list_window(request)
    }

    pub fn user_community_role_ids(&self, user_id: CompactId, community_id: CompactId) -> Vec<CompactId> {
        self.view.read().user_community_role_ids(user_id, community_id)
    }
}
