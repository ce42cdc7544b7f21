use chrono::Utc;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::messages::{Command, Outcome};
use crate::models::SnoozedItem;
use crate::services::auth;
use crate::services::pocket::{
    unsnooze_actions, ModifyAction, PocketClient, RetrieveQuery, SNOOZED_TAG, UNSNOOZED_TAG,
};
use crate::snooze::{reconcile, Wake, WakeScheduler};
use crate::store::Store;

const SYNC_INTERVAL: i64 = 3600; // 1h

pub struct App {
    store: Store,
    pocket: PocketClient,
    scheduler: WakeScheduler,
    retry_secs: i64,
    startup_grace_secs: i64,
}

impl App {
    pub async fn new(config: &Config, wake_tx: mpsc::Sender<Wake>) -> Result<Self> {
        let store = Store::open(&config.db_path).await?;
        let consumer_key = config.consumer_key.clone().ok_or_else(|| {
            AppError::Config("consumer_key is not set; add it to config.toml".to_string())
        })?;
        let pocket = PocketClient::new(consumer_key, store.clone());
        let scheduler = WakeScheduler::new(wake_tx, config.fallback_recheck_secs());

        Ok(Self::with_parts(
            store,
            pocket,
            scheduler,
            config.retry_secs(),
            config.startup_grace_secs(),
        ))
    }

    pub fn with_parts(
        store: Store,
        pocket: PocketClient,
        scheduler: WakeScheduler,
        retry_secs: i64,
        startup_grace_secs: i64,
    ) -> Self {
        Self {
            store,
            pocket,
            scheduler,
            retry_secs,
            startup_grace_secs,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn scheduled_wake(&self) -> Option<i64> {
        self.scheduler.scheduled_at()
    }

    /// Schedules the catch-up check for items that came due while no
    /// process was running. Delayed by a grace window so cross-device
    /// sync can land first: an item re-snoozed on another device moments
    /// ago should not be woken here.
    pub fn schedule_startup_check(&mut self) {
        let now = Utc::now().timestamp();
        self.scheduler.schedule_at(now + self.startup_grace_secs, now);
    }

    /// Message-contract entry point. Never returns a raw error; failures
    /// become a `Failed` outcome so they survive the boundary.
    pub async fn handle_command(&mut self, command: Command) -> Outcome {
        tracing::debug!(?command, "handling command");
        let result = match command {
            Command::StartAuthentication => auth::start_authentication(&self.pocket)
                .await
                .map(|pending| Outcome::AuthorizationPending {
                    url: pending.url,
                    code: pending.code,
                }),
            Command::FinishAuthentication { code } => {
                auth::finish_authentication(&self.pocket, &self.store, &code)
                    .await
                    .map(|_| Outcome::Done)
            }
            Command::IsAuthenticated => auth::is_authenticated(&self.store)
                .await
                .map(|authenticated| Outcome::Authenticated { authenticated }),
            Command::Sync { force } => self.sync(force).await.map(|_| Outcome::Done),
            Command::Snooze { url, until_timestamp } => {
                self.snooze(&url, until_timestamp).await.map(|_| Outcome::Done)
            }
            Command::Unsnooze { item_id } => {
                self.unsnooze(&item_id).await.map(|_| Outcome::Done)
            }
            Command::Archive { item_id } => {
                self.archive(&item_id).await.map(|_| Outcome::Done)
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!("{error}");
                Outcome::failed(&error)
            }
        }
    }

    /// Snoozes a webpage: adds it to Pocket tagged as snoozed, archives
    /// it, records it locally and reprograms the wake schedule.
    pub async fn snooze(&mut self, url: &str, until_timestamp: i64) -> Result<()> {
        tracing::debug!(url, until_timestamp, "snooze");
        let added = self.pocket.add(url, SNOOZED_TAG).await?;
        self.pocket
            .modify(&[ModifyAction::archive(&added.item.item_id)])
            .await?;

        let item = SnoozedItem::from_remote(&added.item, until_timestamp);
        tracing::info!(item_id = %item.item_id, until_timestamp, "snoozed");
        self.store.upsert_snoozed(item).await?;
        self.reschedule().await?;
        self.sync(true).await?;
        Ok(())
    }

    /// Manually wakes an item up: remote readd + tag swap first, local
    /// removal only after that succeeds. A second call for the same item
    /// is a no-op.
    pub async fn unsnooze(&mut self, item_id: &str) -> Result<()> {
        tracing::debug!(item_id, "unsnooze");
        if self.store.get_snoozed(item_id).await?.is_none() {
            tracing::warn!(item_id, "item is not snoozed locally, nothing to do");
            return Ok(());
        }

        self.pocket.modify(&unsnooze_actions(item_id)).await?;
        self.store.remove_snoozed(vec![item_id.to_string()]).await?;
        self.reschedule().await?;
        Ok(())
    }

    /// Dismisses a snoozed item without resurfacing it: the tags are
    /// swapped but the item stays archived.
    pub async fn archive(&mut self, item_id: &str) -> Result<()> {
        tracing::debug!(item_id, "archive");
        if self.store.get_snoozed(item_id).await?.is_none() {
            tracing::warn!(item_id, "item is not snoozed locally, nothing to do");
            return Ok(());
        }

        self.pocket
            .modify(&[
                ModifyAction::tags_add(item_id, UNSNOOZED_TAG),
                ModifyAction::tags_remove(item_id, SNOOZED_TAG),
            ])
            .await?;
        self.store.remove_snoozed(vec![item_id.to_string()]).await?;
        self.reschedule().await?;
        Ok(())
    }

    /// Refreshes url/title of locally known snoozed items from Pocket,
    /// rate limited unless forced. Local wake times are kept; the remote
    /// side cannot know them. Never a wake check.
    pub async fn sync(&mut self, force: bool) -> Result<()> {
        tracing::debug!(force, "sync");
        let now = Utc::now().timestamp();
        let last_synced = self.store.last_synced().await?;
        if !force && now < last_synced + SYNC_INTERVAL {
            tracing::debug!("synced recently, skipping");
            return Ok(());
        }

        let remote = self
            .pocket
            .retrieve(RetrieveQuery::snoozed().changed_since(last_synced))
            .await?;

        for item in self.store.snoozed_items().await? {
            if let Some(remote_item) = remote.list.get(&item.item_id) {
                self.store
                    .upsert_snoozed(SnoozedItem::from_remote(remote_item, item.until_timestamp))
                    .await?;
            }
        }

        // Advance even when nothing changed, to bound the next query
        // window.
        self.store.set_last_synced(now).await?;
        Ok(())
    }

    /// Runs one wake cycle: reconcile due items, refresh metadata for
    /// observers, reprogram the next wake. Failures are logged, never
    /// surfaced; there is no interactive caller on this path.
    pub async fn handle_wake(&mut self) {
        let now = Utc::now().timestamp();
        match reconcile(&self.store, &self.pocket, now).await {
            Ok(report) => {
                if report.changed() {
                    tracing::info!(
                        woken = report.woken.len(),
                        dropped = report.dropped.len(),
                        "wake cycle complete"
                    );
                }
                if let Err(error) = self.sync(true).await {
                    tracing::warn!("post-wake sync failed: {error}");
                }
                self.scheduler.schedule_for(&report.remaining, now);
            }
            Err(error) => {
                tracing::warn!("reconciliation failed, will retry: {error}");
                self.scheduler.schedule_at(now + self.retry_secs, now);
            }
        }
    }

    async fn reschedule(&mut self) -> Result<()> {
        let items = self.store.snoozed_items().await?;
        let now = Utc::now().timestamp();
        self.scheduler.schedule_for(&items, now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ErrorKind;
    use mockito::Matcher;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::mpsc::Receiver;

    const FALLBACK_SECS: i64 = 21600;

    async fn fixture(dir: &TempDir, server: &mockito::Server) -> (App, Receiver<Wake>) {
        let path = dir.path().join("test.db");
        let store = Store::open(path.to_str().unwrap()).await.unwrap();
        let pocket =
            PocketClient::with_base_url("ckey".to_string(), store.clone(), server.url());
        let (tx, rx) = mpsc::channel(4);
        let scheduler = WakeScheduler::new(tx, FALLBACK_SECS);
        (App::with_parts(store, pocket, scheduler, 900, 300), rx)
    }

    fn item(id: &str, until: i64) -> SnoozedItem {
        SnoozedItem {
            item_id: id.to_string(),
            url: format!("https://example.com/{id}"),
            title: format!("Item {id}"),
            until_timestamp: until,
        }
    }

    #[tokio::test]
    async fn snooze_adds_archives_records_and_schedules() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (mut app, _rx) = fixture(&dir, &server).await;

        let add = server
            .mock("POST", "/add")
            .match_body(Matcher::PartialJson(json!({
                "url": "https://example.com/article",
                "tags": "snoozed",
            })))
            .with_body(
                r#"{"item": {"item_id": "301", "resolved_url": "https://example.com/article", "resolved_title": "An Article"}}"#,
            )
            .create_async()
            .await;
        let archive = server
            .mock("POST", "/send")
            .match_body(Matcher::PartialJson(json!({
                "actions": [{"action": "archive", "item_id": "301"}]
            })))
            .with_body(r#"{"status": 1}"#)
            .create_async()
            .await;
        // The forced post-snooze sync.
        let retrieve = server
            .mock("POST", "/get")
            .with_body(r#"{"list": []}"#)
            .expect(1)
            .create_async()
            .await;

        let until = Utc::now().timestamp() + 1000;
        app.snooze("https://example.com/article", until).await.unwrap();

        let stored = app.store().get_snoozed("301").await.unwrap().unwrap();
        assert_eq!(stored.url, "https://example.com/article");
        assert_eq!(stored.title, "An Article");
        assert_eq!(stored.until_timestamp, until);

        // Wake reprogrammed to the new earliest time.
        assert_eq!(app.scheduled_wake(), Some(until));

        add.assert_async().await;
        archive.assert_async().await;
        retrieve.assert_async().await;
    }

    #[tokio::test]
    async fn sync_within_the_rate_limit_window_does_nothing() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (mut app, _rx) = fixture(&dir, &server).await;

        let retrieve = server
            .mock("POST", "/get")
            .with_body(r#"{"list": []}"#)
            .expect(1)
            .create_async()
            .await;

        app.sync(true).await.unwrap();
        let last_synced = app.store().last_synced().await.unwrap();

        // Second, unforced sync right after: no request, marker untouched.
        app.sync(false).await.unwrap();
        assert_eq!(app.store().last_synced().await.unwrap(), last_synced);
        retrieve.assert_async().await;
    }

    #[tokio::test]
    async fn sync_refreshes_metadata_but_keeps_the_wake_time() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (mut app, _rx) = fixture(&dir, &server).await;

        app.store().upsert_snoozed(item("101", 4200)).await.unwrap();

        server
            .mock("POST", "/get")
            .with_body(
                r#"{"list": {"101": {"item_id": "101", "resolved_url": "https://example.com/moved", "resolved_title": "Fresh Title"}}}"#,
            )
            .create_async()
            .await;

        app.sync(true).await.unwrap();

        let stored = app.store().get_snoozed("101").await.unwrap().unwrap();
        assert_eq!(stored.url, "https://example.com/moved");
        assert_eq!(stored.title, "Fresh Title");
        assert_eq!(stored.until_timestamp, 4200);
    }

    #[tokio::test]
    async fn unsnooze_is_a_no_op_the_second_time() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (mut app, _rx) = fixture(&dir, &server).await;

        app.store().upsert_snoozed(item("101", 100)).await.unwrap();

        let modify = server
            .mock("POST", "/send")
            .with_body(r#"{"status": 1}"#)
            .expect(1)
            .create_async()
            .await;

        app.unsnooze("101").await.unwrap();
        assert!(app.store().get_snoozed("101").await.unwrap().is_none());

        // Gone already: no remote call, no error.
        app.unsnooze("101").await.unwrap();
        modify.assert_async().await;
    }

    #[tokio::test]
    async fn unsnooze_keeps_the_local_record_when_the_remote_call_fails() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (mut app, _rx) = fixture(&dir, &server).await;

        app.store().upsert_snoozed(item("101", 100)).await.unwrap();

        server
            .mock("POST", "/send")
            .with_status(503)
            .create_async()
            .await;

        assert!(app.unsnooze("101").await.is_err());
        assert!(app.store().get_snoozed("101").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn archive_swaps_tags_without_a_readd() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (mut app, _rx) = fixture(&dir, &server).await;

        app.store().upsert_snoozed(item("101", 100)).await.unwrap();

        let modify = server
            .mock("POST", "/send")
            .match_body(Matcher::PartialJson(json!({
                "actions": [
                    {"action": "tags_add", "item_id": "101", "tags": "unsnoozed"},
                    {"action": "tags_remove", "item_id": "101", "tags": "snoozed"},
                ]
            })))
            .with_body(r#"{"status": 1}"#)
            .create_async()
            .await;

        app.archive("101").await.unwrap();
        assert!(app.store().get_snoozed("101").await.unwrap().is_none());
        modify.assert_async().await;
    }

    #[tokio::test]
    async fn wake_cycle_wakes_due_items_and_reschedules_for_the_rest() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (mut app, _rx) = fixture(&dir, &server).await;

        let now = Utc::now().timestamp();
        let later = now + 500;
        app.store().upsert_snoozed(item("101", now - 50)).await.unwrap();
        app.store().upsert_snoozed(item("202", later)).await.unwrap();

        // Reconciliation due-check.
        server
            .mock("POST", "/get")
            .match_body(Matcher::PartialJson(json!({"state": "archive"})))
            .with_body(r#"{"list": {"101": {"item_id": "101"}}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/send")
            .with_body(r#"{"status": 1}"#)
            .create_async()
            .await;
        // Post-wake sync refresh.
        server
            .mock("POST", "/get")
            .match_body(Matcher::PartialJson(json!({"since": 0})))
            .with_body(r#"{"list": []}"#)
            .create_async()
            .await;

        app.handle_wake().await;

        let left = app.store().snoozed_items().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].item_id, "202");
        assert_eq!(app.scheduled_wake(), Some(later));
    }

    #[tokio::test]
    async fn failed_wake_cycle_schedules_a_retry() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (mut app, _rx) = fixture(&dir, &server).await;

        let now = Utc::now().timestamp();
        app.store().upsert_snoozed(item("101", now - 50)).await.unwrap();

        server
            .mock("POST", "/get")
            .with_status(500)
            .create_async()
            .await;

        app.handle_wake().await;

        // Record intact, retry pending roughly retry_secs out.
        assert!(app.store().get_snoozed("101").await.unwrap().is_some());
        let at = app.scheduled_wake().unwrap();
        assert!(at >= now + 900 && at <= now + 902);
    }

    #[tokio::test]
    async fn command_failures_cross_the_boundary_as_wire_errors() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (mut app, _rx) = fixture(&dir, &server).await;

        app.store()
            .set_credentials("stale", "reader")
            .await
            .unwrap();
        server
            .mock("POST", "/get")
            .with_status(401)
            .with_header("X-Error", "Invalid token")
            .create_async()
            .await;

        let outcome = app.handle_command(Command::Sync { force: true }).await;
        match outcome {
            Outcome::Failed { error } => {
                assert_eq!(error.kind, ErrorKind::Authentication);
                assert_eq!(error.remote_error.as_deref(), Some("Invalid token"));
            }
            other => panic!("expected a failed outcome, got {other:?}"),
        }

        // Token evicted: subsequent is_authenticated is false.
        let outcome = app.handle_command(Command::IsAuthenticated).await;
        assert!(matches!(
            outcome,
            Outcome::Authenticated { authenticated: false }
        ));
    }
}
