use serde::{Deserialize, Serialize};

use crate::services::pocket::RemoteItem;

/// Local projection of a remote Pocket item that is currently snoozed.
/// `until_timestamp` exists only on this side of the wire; the remote
/// service has no field for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozedItem {
    pub item_id: String,
    pub url: String,
    pub title: String,
    pub until_timestamp: i64,
}

impl SnoozedItem {
    pub fn from_remote(item: &RemoteItem, until_timestamp: i64) -> Self {
        Self {
            item_id: item.item_id.clone(),
            url: item.best_url().to_string(),
            title: item.best_title().to_string(),
            until_timestamp,
        }
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.until_timestamp <= now
    }
}
