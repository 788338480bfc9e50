use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::member::{ClubEvent, Member};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const PAGE_SIZE: &str = "1000";
const TOKEN_HEADER: &str = "X-ApiAccessToken";

/// Read-only client for the MyClubhouse REST API.
///
/// Every call is a single bulk GET with a page size large enough for the
/// whole club; there is no cursor following.
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("clubsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::DirectoryUnavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.directory_url.clone(), config.directory_token()?)
    }

    /// Everyone whose membership is current.
    pub async fn fetch_active_members(&self) -> Result<Vec<Member>> {
        let members: Vec<Member> = self
            .fetch_collection("users", "IsCurrentMember=true", "Users")
            .await?;
        tracing::info!(count = members.len(), "fetched active members");
        Ok(members)
    }

    /// Published (non-draft) events.
    pub async fn fetch_events(&self) -> Result<Vec<ClubEvent>> {
        let events: Vec<ClubEvent> = self
            .fetch_collection("events", "IsDraft=false", "Events")
            .await?;
        tracing::info!(count = events.len(), "fetched events");
        Ok(events)
    }

    async fn fetch_collection<T: DeserializeOwned>(
        &self,
        resource: &str,
        filter: &str,
        key: &str,
    ) -> Result<Vec<T>> {
        let url = format!("{}/{resource}", self.base_url);
        tracing::debug!(%url, filter, "directory request");

        let response = self
            .http
            .get(&url)
            .query(&[("filter", filter), ("pageSize", PAGE_SIZE)])
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| SyncError::DirectoryUnavailable(format!("GET {resource}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::DirectoryUnavailable(format!(
                "GET {resource} returned {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SyncError::DirectorySchema(format!("{resource}: invalid JSON: {e}")))?;

        let items = match body.get(key) {
            Some(Value::Null) => return Ok(Vec::new()),
            Some(items) => items.clone(),
            None => {
                return Err(SyncError::DirectorySchema(format!(
                    "{resource}: response has no '{key}' field"
                )))
            }
        };
        serde_json::from_value(items)
            .map_err(|e| SyncError::DirectorySchema(format!("{resource}: {key}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
