use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::store::Store;

const POCKET_API_URL: &str = "https://getpocket.com/v3";

/// Tag marking an archived item as snoozed on the remote side.
pub const SNOOZED_TAG: &str = "snoozed";
/// Tag left behind on items this extension has woken up.
pub const UNSNOOZED_TAG: &str = "unsnoozed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPath {
    OAuthRequest,
    OAuthAuthorize,
    Add,
    Modify,
    Retrieve,
}

impl RequestPath {
    fn as_str(self) -> &'static str {
        match self {
            RequestPath::OAuthRequest => "/oauth/request",
            RequestPath::OAuthAuthorize => "/oauth/authorize",
            RequestPath::Add => "/add",
            RequestPath::Modify => "/send",
            RequestPath::Retrieve => "/get",
        }
    }
}

/// Authoritative record held by Pocket. Fields are optional because the
/// API omits whichever of the given/resolved pair it does not know yet.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteItem {
    pub item_id: String,
    #[serde(default)]
    pub resolved_url: Option<String>,
    #[serde(default)]
    pub resolved_title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub given_url: Option<String>,
    #[serde(default)]
    pub given_title: Option<String>,
}

impl RemoteItem {
    pub fn best_url(&self) -> &str {
        self.resolved_url
            .as_deref()
            .or(self.url.as_deref())
            .or(self.given_url.as_deref())
            .unwrap_or_default()
    }

    pub fn best_title(&self) -> &str {
        self.resolved_title
            .as_deref()
            .or(self.title.as_deref())
            .or(self.given_title.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct RequestCodeResponse {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeResponse {
    pub access_token: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct AddResponse {
    pub item: RemoteItem,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrieveResponse {
    #[serde(default, deserialize_with = "map_or_empty_array")]
    pub list: HashMap<String, RemoteItem>,
}

// The API encodes an empty result set as a JSON array instead of an
// empty object.
fn map_or_empty_array<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, RemoteItem>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListRepr {
        Items(HashMap<String, RemoteItem>),
        Empty(Vec<Value>),
    }

    Ok(match ListRepr::deserialize(deserializer)? {
        ListRepr::Items(items) => items,
        ListRepr::Empty(_) => HashMap::new(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub tag: String,
    #[serde(rename = "detailsType")]
    pub details_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
}

impl RetrieveQuery {
    /// Items tagged as snoozed, any state.
    pub fn snoozed() -> Self {
        Self {
            state: None,
            tag: SNOOZED_TAG.to_string(),
            details_type: "simple".to_string(),
            since: None,
        }
    }

    /// Items that are both archived and tagged as snoozed, i.e. still
    /// snoozed as far as the remote service is concerned.
    pub fn archived_snoozed() -> Self {
        Self {
            state: Some("archive".to_string()),
            ..Self::snoozed()
        }
    }

    pub fn changed_since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ModifyAction {
    Archive { item_id: String },
    Readd { item_id: String },
    TagsAdd { item_id: String, tags: String },
    TagsRemove { item_id: String, tags: String },
}

impl ModifyAction {
    pub fn archive(item_id: &str) -> Self {
        ModifyAction::Archive { item_id: item_id.to_string() }
    }

    pub fn readd(item_id: &str) -> Self {
        ModifyAction::Readd { item_id: item_id.to_string() }
    }

    pub fn tags_add(item_id: &str, tags: &str) -> Self {
        ModifyAction::TagsAdd { item_id: item_id.to_string(), tags: tags.to_string() }
    }

    pub fn tags_remove(item_id: &str, tags: &str) -> Self {
        ModifyAction::TagsRemove { item_id: item_id.to_string(), tags: tags.to_string() }
    }
}

/// The readd + tag-swap trio that wakes one item up remotely.
pub fn unsnooze_actions(item_id: &str) -> Vec<ModifyAction> {
    vec![
        ModifyAction::readd(item_id),
        ModifyAction::tags_add(item_id, UNSNOOZED_TAG),
        ModifyAction::tags_remove(item_id, SNOOZED_TAG),
    ]
}

pub struct PocketClient {
    client: Client,
    base_url: String,
    consumer_key: String,
    store: Store,
}

impl PocketClient {
    pub fn new(consumer_key: String, store: Store) -> Self {
        Self::with_base_url(consumer_key, store, POCKET_API_URL.to_string())
    }

    pub fn with_base_url(consumer_key: String, store: Store, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url,
            consumer_key,
            store,
        }
    }

    /// Sends one authenticated request. The access token is read from the
    /// store on every call; an unauthorized response while a token was
    /// attached evicts that token before the error is returned.
    async fn request<T: DeserializeOwned>(&self, path: RequestPath, params: Value) -> Result<T> {
        tracing::debug!(path = path.as_str(), "pocket request");

        let access_token = self.store.access_token().await?;
        let mut body = match params {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        body.insert("consumer_key".to_string(), Value::String(self.consumer_key.clone()));
        if let Some(token) = &access_token {
            body.insert("access_token".to_string(), Value::String(token.clone()));
        }

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path.as_str()))
            .header("X-Accept", "application/json")
            .json(&Value::Object(body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let remote_error = response
                .headers()
                .get("X-Error")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("<unknown>")
                .to_string();

            let error = if access_token.is_some() && status == StatusCode::UNAUTHORIZED {
                self.store.clear_access_token().await?;
                AppError::Authentication { status: status.as_u16(), remote_error }
            } else {
                AppError::Request { status: status.as_u16(), remote_error }
            };
            tracing::error!("{error}");
            return Err(error);
        }

        Ok(response.json().await?)
    }

    pub async fn request_code(&self, redirect_uri: &str) -> Result<RequestCodeResponse> {
        self.request(RequestPath::OAuthRequest, json!({ "redirect_uri": redirect_uri }))
            .await
    }

    pub async fn authorize(&self, code: &str) -> Result<AuthorizeResponse> {
        self.request(RequestPath::OAuthAuthorize, json!({ "code": code }))
            .await
    }

    pub async fn add(&self, url: &str, tags: &str) -> Result<AddResponse> {
        self.request(RequestPath::Add, json!({ "url": url, "tags": tags }))
            .await
    }

    pub async fn modify(&self, actions: &[ModifyAction]) -> Result<()> {
        self.request::<Value>(RequestPath::Modify, json!({ "actions": actions }))
            .await?;
        Ok(())
    }

    pub async fn retrieve(&self, query: RetrieveQuery) -> Result<RetrieveResponse> {
        self.request(RequestPath::Retrieve, serde_json::to_value(&query)?)
            .await
    }
}
