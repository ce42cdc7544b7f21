use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::SnoozedItem;

/// Sent on the wake channel when the scheduled wake fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake;

/// When the next wake should fire: the earliest wake time among `items`,
/// floored at `now` and capped at `now + fallback_secs`. The cap doubles as
/// the re-check interval for an empty set, so changes made on other devices
/// are eventually noticed even without a local mutation.
pub fn next_wake(items: &[SnoozedItem], now: i64, fallback_secs: i64) -> i64 {
    let horizon = now + fallback_secs;
    items
        .iter()
        .map(|item| item.until_timestamp)
        .min()
        .map(|until| until.clamp(now, horizon))
        .unwrap_or(horizon)
}

struct PendingWake {
    at: i64,
    task: JoinHandle<()>,
}

/// Owns at most one pending wake. Reprogramming aborts the pending sleep
/// task and replaces it; wakes are delivered on the mpsc channel handed in
/// at construction.
pub struct WakeScheduler {
    tx: mpsc::Sender<Wake>,
    fallback_secs: i64,
    pending: Option<PendingWake>,
}

impl WakeScheduler {
    pub fn new(tx: mpsc::Sender<Wake>, fallback_secs: i64) -> Self {
        Self {
            tx,
            fallback_secs,
            pending: None,
        }
    }

    pub fn scheduled_at(&self) -> Option<i64> {
        self.pending.as_ref().map(|pending| pending.at)
    }

    pub fn schedule_at(&mut self, at: i64, now: i64) {
        let at = at.max(now);
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }

        let delay = Duration::from_secs((at - now) as u64);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Wake).await;
        });

        tracing::debug!(at, "next wake scheduled");
        self.pending = Some(PendingWake { at, task });
    }

    /// Recompute and reprogram from the current snooze set.
    pub fn schedule_for(&mut self, items: &[SnoozedItem], now: i64) {
        self.schedule_at(next_wake(items, now, self.fallback_secs), now);
    }

    pub fn clear(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
    }
}

impl Drop for WakeScheduler {
    fn drop(&mut self) {
        self.clear();
    }
}
