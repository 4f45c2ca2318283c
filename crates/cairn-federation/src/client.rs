//! Talking to peers.

use crate::error::{FederationError, Result};
use crate::model::FederationModel;
use crate::request::FederationRequest;
use async_trait::async_trait;
use cairn_types::RepositoryModel;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

/// Requests this instance makes of a registered peer.
#[async_trait]
pub trait FederationClient: Send + Sync {
    /// Repositories the peer offers under the registration's token, by
    /// clone URL.
    async fn pull_repositories(
        &self,
        registration: &FederationModel,
    ) -> Result<BTreeMap<String, RepositoryModel>>;

    /// Reports the outcome of pulling `registration` back to the peer.
    async fn acknowledge_status(
        &self,
        identification: &str,
        registration: &FederationModel,
    ) -> Result<()>;
}

/// [`FederationClient`] speaking JSON over HTTP.
pub struct HttpFederationClient {
    client: Client,
}

impl HttpFederationClient {
    /// Creates a client with a 30 second timeout.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("cairn-federation")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FederationError::Remote(e.to_string()))?;
        Ok(Self { client })
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    if status == reqwest::StatusCode::FORBIDDEN {
        return Err(FederationError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FederationError::Remote(format!(
        "request failed with status {status}: {body}"
    )))
}

#[async_trait]
impl FederationClient for HttpFederationClient {
    async fn pull_repositories(
        &self,
        registration: &FederationModel,
    ) -> Result<BTreeMap<String, RepositoryModel>> {
        let url = FederationRequest::PullRepositories.link(&registration.url, &registration.token);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FederationError::Remote(e.to_string()))?;
        check(response)
            .await?
            .json()
            .await
            .map_err(|e| FederationError::Remote(e.to_string()))
    }

    async fn acknowledge_status(
        &self,
        identification: &str,
        registration: &FederationModel,
    ) -> Result<()> {
        let url = FederationRequest::Status.link(&registration.url, &registration.token);
        let response = self
            .client
            .post(&url)
            .query(&[("url", identification)])
            .json(registration)
            .send()
            .await
            .map_err(|e| FederationError::Remote(e.to_string()))?;
        check(response).await?;
        Ok(())
    }
}
