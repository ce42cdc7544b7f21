use crate::error::Result;
use crate::services::pocket::PocketClient;
use crate::store::Store;

const REDIRECT_URI: &str = "https://getpocket.com/auth/verify";
const AUTHORIZE_URL: &str = "https://getpocket.com/auth/authorize";

/// A started but not yet approved login. The user visits `url` in a
/// browser; the same `code` then finishes the handshake.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub code: String,
    pub url: String,
}

/// (Naively) whether the user is already authenticated: a stored token
/// may still be rejected remotely, which evicts it (see the gateway).
pub async fn is_authenticated(store: &Store) -> Result<bool> {
    Ok(store.access_token().await?.is_some())
}

pub async fn start_authentication(pocket: &PocketClient) -> Result<PendingAuthorization> {
    let response = pocket.request_code(REDIRECT_URI).await?;
    let code = response.code;
    tracing::debug!("received authentication code");

    let url = format!(
        "{AUTHORIZE_URL}?request_token={}&redirect_uri={}",
        urlencoding::encode(&code),
        urlencoding::encode(&format!("{REDIRECT_URI}/{code}")),
    );
    Ok(PendingAuthorization { code, url })
}

/// Exchanges an approved request code for a permanent access token and
/// stores the credentials.
pub async fn finish_authentication(
    pocket: &PocketClient,
    store: &Store,
    code: &str,
) -> Result<String> {
    let response = pocket.authorize(code).await?;
    tracing::info!(username = %response.username, "authenticated with Pocket");
    store
        .set_credentials(&response.access_token, &response.username)
        .await?;
    Ok(response.username)
}
