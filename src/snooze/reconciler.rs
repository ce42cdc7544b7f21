use std::collections::HashSet;

use crate::error::Result;
use crate::models::SnoozedItem;
use crate::services::pocket::{unsnooze_actions, PocketClient, RetrieveQuery};
use crate::store::Store;

/// What one wake cycle did.
#[derive(Debug, Default)]
pub struct WakeReport {
    /// Items woken remotely this cycle and removed locally.
    pub woken: Vec<String>,
    /// Items another device had already woken; removed locally only.
    pub dropped: Vec<String>,
    /// Items whose wake time is still in the future.
    pub remaining: Vec<SnoozedItem>,
}

impl WakeReport {
    pub fn changed(&self) -> bool {
        !self.woken.is_empty() || !self.dropped.is_empty()
    }
}

/// Resolves due items against the remote service. Local records are
/// removed only after the remote calls succeed, so a failed cycle leaves
/// the snooze set intact for the next wake to retry.
pub async fn reconcile(store: &Store, pocket: &PocketClient, now: i64) -> Result<WakeReport> {
    let items = store.snoozed_items().await?;
    let (due, remaining): (Vec<_>, Vec<_>) =
        items.into_iter().partition(|item| item.is_due(now));

    if due.is_empty() {
        tracing::debug!("no items due");
        return Ok(WakeReport {
            remaining,
            ..WakeReport::default()
        });
    }

    // A different device instance that hasn't synced in a while may have
    // unsnoozed some of these already. The remote archive+tag state is
    // authoritative, so re-check it before mutating anything.
    let remote = pocket.retrieve(RetrieveQuery::archived_snoozed()).await?;
    let still_snoozed: HashSet<&str> = remote.list.keys().map(String::as_str).collect();

    let (confirmed, already_woken): (Vec<_>, Vec<_>) = due
        .into_iter()
        .partition(|item| still_snoozed.contains(item.item_id.as_str()));

    if confirmed.is_empty() {
        tracing::warn!("no due items left to unsnooze in Pocket");
    } else {
        let actions: Vec<_> = confirmed
            .iter()
            .flat_map(|item| unsnooze_actions(&item.item_id))
            .collect();
        tracing::info!(count = confirmed.len(), "unsnoozing items in Pocket");
        pocket.modify(&actions).await?;
    }

    if !already_woken.is_empty() {
        let ids: Vec<&str> = already_woken.iter().map(|i| i.item_id.as_str()).collect();
        tracing::warn!(
            ?ids,
            "items already unsnoozed remotely, dropping local records"
        );
    }

    let removed: Vec<String> = confirmed
        .iter()
        .chain(already_woken.iter())
        .map(|item| item.item_id.clone())
        .collect();
    store.remove_snoozed(removed).await?;

    Ok(WakeReport {
        woken: confirmed.into_iter().map(|item| item.item_id).collect(),
        dropped: already_woken.into_iter().map(|item| item.item_id).collect(),
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use tempfile::TempDir;

    async fn fixture(dir: &TempDir, server: &mockito::Server) -> (Store, PocketClient) {
        let path = dir.path().join("test.db");
        let store = Store::open(path.to_str().unwrap()).await.unwrap();
        let pocket =
            PocketClient::with_base_url("ckey".to_string(), store.clone(), server.url());
        (store, pocket)
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
    async fn confirmed_due_item_is_woken_remotely_then_removed() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (store, pocket) = fixture(&dir, &server).await;

        store.upsert_snoozed(item("101", 100)).await.unwrap();
        store.upsert_snoozed(item("202", 200)).await.unwrap();

        let retrieve = server
            .mock("POST", "/get")
            .match_body(Matcher::PartialJson(json!({
                "state": "archive",
                "tag": "snoozed",
            })))
            .with_body(r#"{"list": {"101": {"item_id": "101"}}}"#)
            .create_async()
            .await;
        let modify = server
            .mock("POST", "/send")
            .match_body(Matcher::PartialJson(json!({
                "actions": [
                    {"action": "readd", "item_id": "101"},
                    {"action": "tags_add", "item_id": "101", "tags": "unsnoozed"},
                    {"action": "tags_remove", "item_id": "101", "tags": "snoozed"},
                ]
            })))
            .with_body(r#"{"status": 1}"#)
            .create_async()
            .await;

        let report = reconcile(&store, &pocket, 150).await.unwrap();

        assert_eq!(report.woken, vec!["101"]);
        assert!(report.dropped.is_empty());
        assert_eq!(report.remaining.len(), 1);
        assert_eq!(report.remaining[0].item_id, "202");

        let left = store.snoozed_items().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].item_id, "202");

        retrieve.assert_async().await;
        modify.assert_async().await;
    }

    #[tokio::test]
    async fn unconfirmed_due_item_is_dropped_without_an_unsnooze_request() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (store, pocket) = fixture(&dir, &server).await;

        store.upsert_snoozed(item("101", 100)).await.unwrap();

        server
            .mock("POST", "/get")
            .with_body(r#"{"list": []}"#)
            .create_async()
            .await;
        let modify = server
            .mock("POST", "/send")
            .expect(0)
            .create_async()
            .await;

        let report = reconcile(&store, &pocket, 150).await.unwrap();

        assert!(report.woken.is_empty());
        assert_eq!(report.dropped, vec!["101"]);
        assert!(store.snoozed_items().await.unwrap().is_empty());
        modify.assert_async().await;
    }

    #[tokio::test]
    async fn nothing_due_means_no_remote_calls() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (store, pocket) = fixture(&dir, &server).await;

        store.upsert_snoozed(item("101", 500)).await.unwrap();

        let retrieve = server.mock("POST", "/get").expect(0).create_async().await;

        let report = reconcile(&store, &pocket, 150).await.unwrap();

        assert!(!report.changed());
        assert_eq!(report.remaining.len(), 1);
        assert_eq!(store.snoozed_items().await.unwrap().len(), 1);
        retrieve.assert_async().await;
    }

    #[tokio::test]
    async fn failed_unsnooze_call_leaves_local_records_alone() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (store, pocket) = fixture(&dir, &server).await;

        store.upsert_snoozed(item("101", 100)).await.unwrap();

        server
            .mock("POST", "/get")
            .with_body(r#"{"list": {"101": {"item_id": "101"}}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/send")
            .with_status(503)
            .create_async()
            .await;

        let result = reconcile(&store, &pocket, 150).await;

        assert!(result.is_err());
        assert_eq!(store.snoozed_items().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_remote_check_aborts_before_touching_local_state() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let (store, pocket) = fixture(&dir, &server).await;

        store.upsert_snoozed(item("101", 100)).await.unwrap();

        server
            .mock("POST", "/get")
            .with_status(500)
            .create_async()
            .await;

        let result = reconcile(&store, &pocket, 150).await;

        assert!(result.is_err());
        assert_eq!(store.snoozed_items().await.unwrap().len(), 1);
    }
}
