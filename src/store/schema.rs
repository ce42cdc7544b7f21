pub const SCHEMA: &str = r#"
-- snoozed items partition: one row per snoozed page, keyed by the remote
-- item identifier
CREATE TABLE IF NOT EXISTS snoozed_items (
    item_id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    until_timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snoozed_items_until ON snoozed_items(until_timestamp);

-- scalar settings partition: named keys only (access_token, username,
-- last_synced, time-of-day preference fields)
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
