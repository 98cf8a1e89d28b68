use std::sync::Arc;

use accteng_core::{OAuthClientMeta, OAuthStore};

use crate::error::{OAuthError, OAuthResult};

/// How long a resolved client metadata document is trusted before it is
/// re-fetched (§4.5 ambient note).
const CLIENT_CACHE_TTL_SECS: i64 = 3600;

#[derive(serde::Deserialize)]
struct ClientMetadataDocument {
    client_id: Option<String>,
    client_name: Option<String>,
    redirect_uris: Vec<String>,
    logo_uri: Option<String>,
    client_uri: Option<String>,
}

/// Resolve OAuth client metadata by fetching and caching the document at
/// `client_id` (a URL, per the AT Protocol OAuth `client_id_metadata_document`
/// profile). Returns the cached copy if it is still fresh.
pub async fn resolve_client(
    store: &Arc<dyn OAuthStore>,
    http: &reqwest::Client,
    client_id: &str,
) -> OAuthResult<OAuthClientMeta> {
    if let Some(cached) = store.get_client(client_id).await? {
        let age = chrono::Utc::now() - cached.cached_at;
        if age < chrono::Duration::seconds(CLIENT_CACHE_TTL_SECS) {
            return Ok(cached);
        }
    }

    let url = url::Url::parse(client_id)
        .map_err(|_| OAuthError::InvalidClient("client_id must be a valid URL".into()))?;
    if url.scheme() != "https" {
        return Err(OAuthError::InvalidClient(
            "client_id metadata document must be served over https".into(),
        ));
    }

    let doc: ClientMetadataDocument = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| OAuthError::InvalidClient(format!("failed to fetch client metadata: {e}")))?
        .json()
        .await
        .map_err(|e| OAuthError::InvalidClient(format!("malformed client metadata: {e}")))?;

    if doc.client_id.as_deref().is_some_and(|id| id != client_id) {
        return Err(OAuthError::InvalidClient(
            "client metadata document's client_id does not match the requested URL".into(),
        ));
    }
    if doc.redirect_uris.is_empty() {
        return Err(OAuthError::InvalidClient(
            "client metadata document lists no redirect_uris".into(),
        ));
    }

    let meta = OAuthClientMeta {
        client_id: client_id.to_string(),
        client_name: doc.client_name,
        redirect_uris: doc.redirect_uris,
        logo_uri: doc.logo_uri,
        client_uri: doc.client_uri,
        cached_at: chrono::Utc::now(),
    };
    store.put_client(&meta).await?;
    Ok(meta)
}
