//! `reqwest` client that replays actions against the app's REST API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::RemoteConfig;
use crate::error::{DispatchError, SyncqError};
use crate::queue::{ActionType, DispatchTable, RemoteOperation};

/// Path under the API base URL that accepts an action type.
#[must_use]
pub const fn endpoint(action_type: &ActionType) -> Option<&'static str> {
    match action_type {
        ActionType::EmergencyAlert => Some("alerts/emergency"),
        ActionType::CheckIn => Some("checkins"),
        ActionType::CreateSpot => Some("spots"),
        ActionType::SubmitRating => Some("ratings"),
        ActionType::SubmitComment => Some("comments"),
        ActionType::SendMessage => Some("messages"),
        ActionType::UpdateProfile => Some("profile"),
        ActionType::ToggleFavorite => Some("favorites/toggle"),
        ActionType::SubmitReport => Some("reports"),
        ActionType::Other(_) => None,
    }
}

/// Map an HTTP status to a dispatch outcome.
///
/// Request timeouts, rate limiting and server errors are worth retrying;
/// any other rejection is final.
pub fn classify_status(status: StatusCode) -> Result<(), DispatchError> {
    if status.is_success() {
        return Ok(());
    }
    let reason = format!("HTTP {}", status.as_u16());
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        Err(DispatchError::Retryable(reason))
    } else {
        Err(DispatchError::Terminal(reason))
    }
}

/// POSTs an action's payload as JSON to one endpoint.
#[derive(Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpRemote {
    /// Build a remote for a single URL.
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            auth_token,
        }
    }

    /// Remote for an action type under the configured base URL.
    pub fn for_action(
        client: reqwest::Client,
        config: &RemoteConfig,
        action_type: &ActionType,
    ) -> Option<Self> {
        let path = endpoint(action_type)?;
        let url = format!("{}/{path}", config.base_url.trim_end_matches('/'));
        Some(Self::new(client, url, config.auth_token.clone()))
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteOperation for HttpRemote {
    async fn call(&self, payload: &serde_json::Value) -> Result<(), DispatchError> {
        let mut req = self.client.post(&self.url).json(payload);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            let reason = format!("request to {} failed: {e}", self.url);
            if e.is_builder() {
                DispatchError::Terminal(reason)
            } else {
                DispatchError::Retryable(reason)
            }
        })?;

        let status = resp.status();
        tracing::debug!(url = %self.url, status = status.as_u16(), "remote responded");
        classify_status(status)
    }
}

impl DispatchTable {
    /// Register an [`HttpRemote`] for every known action type.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn http(config: &RemoteConfig) -> Result<Self, SyncqError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SyncqError::Remote(format!("failed to build HTTP client: {e}")))?;

        let mut table = Self::new();
        for action_type in ActionType::KNOWN {
            if let Some(remote) = HttpRemote::for_action(client.clone(), config, &action_type) {
                table.register(action_type, Arc::new(remote));
            }
        }
        Ok(table)
    }
}
