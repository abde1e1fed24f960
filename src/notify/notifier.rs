//! Retrying HTTP notifier (C6): one destination pair, GET requests, bounded
//! retry with a fixed interval, cancellation-aware.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use url::Url;

use crate::metrics::MetricsSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyType {
    Service,
    Node,
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("cancelled")]
    Cancelled,
    #[error("could not parse URL {0:?}: {1}")]
    Configuration(String, #[source] url::ParseError),
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

/// Owns one `createURL`/`removeURL` pair for a single destination host.
pub struct Notifier {
    create_url: Option<String>,
    remove_url: Option<String>,
    notify_type: NotifyType,
    retries: u32,
    interval: Duration,
    client: reqwest::Client,
}

impl Notifier {
    /// Fails (the "Configuration" error kind, §7) if either URL does not
    /// parse; the caller omits the endpoint in that case.
    pub fn new(
        create_url: Option<String>,
        remove_url: Option<String>,
        notify_type: NotifyType,
        retries: u32,
        interval: Duration,
    ) -> Result<Self, NotifierError> {
        for url in create_url.iter().chain(remove_url.iter()) {
            Url::parse(url).map_err(|e| NotifierError::Configuration(url.clone(), e))?;
        }
        Ok(Self {
            create_url,
            remove_url,
            notify_type,
            retries,
            interval,
            client: reqwest::Client::new(),
        })
    }

    pub fn notify_type(&self) -> NotifyType {
        self.notify_type
    }

    pub fn has_create(&self) -> bool {
        self.create_url.is_some()
    }

    pub fn has_remove(&self) -> bool {
        self.remove_url.is_some()
    }

    pub async fn create(
        &self,
        token: &CancellationToken,
        params: &str,
        metrics: &dyn MetricsSink,
    ) -> Result<(), NotifierError> {
        let Some(url) = &self.create_url else {
            return Ok(());
        };
        self.send(token, url, params, true, metrics).await
    }

    pub async fn remove(
        &self,
        token: &CancellationToken,
        params: &str,
        metrics: &dyn MetricsSink,
    ) -> Result<(), NotifierError> {
        let Some(url) = &self.remove_url else {
            return Ok(());
        };
        self.send(token, url, params, false, metrics).await
    }

    async fn send(
        &self,
        token: &CancellationToken,
        base_url: &str,
        params: &str,
        is_create: bool,
        metrics: &dyn MetricsSink,
    ) -> Result<(), NotifierError> {
        let mut url = Url::parse(base_url).map_err(|e| NotifierError::Configuration(base_url.to_string(), e))?;
        url.set_query(Some(params));

        let mut last_error: Option<anyhow::Error> = None;
        let mut attempts = 0;

        for attempt in 1..=self.retries.max(1) {
            attempts = attempt;
            if token.is_cancelled() {
                info!(url = %url, "notifier cancelled before attempt");
                return Err(NotifierError::Cancelled);
            }

            match self.client.get(url.clone()).send().await {
                Ok(response) if Self::is_success(response.status(), is_create) => {
                    return Ok(());
                }
                Ok(response) => {
                    error!(url = %url, status = %response.status(), "notifier received non-success status");
                    metrics.record_error("notifier_status");
                    last_error = Some(anyhow::anyhow!("unexpected status {}", response.status()));
                }
                Err(e) => {
                    error!(url = %url, error = %e, "notifier transport error");
                    metrics.record_error("notifier_transport");
                    last_error = Some(anyhow::anyhow!(e));
                }
            }

            if attempt < self.retries {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(NotifierError::Cancelled),
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        metrics.record_error("notifier_retries_exhausted");
        Err(NotifierError::Exhausted {
            url: url.to_string(),
            attempts,
            source: last_error.unwrap_or_else(|| anyhow::anyhow!("no attempts made")),
        })
    }

    fn is_success(status: StatusCode, is_create: bool) -> bool {
        status == StatusCode::OK || (is_create && status == StatusCode::CONFLICT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;

    #[tokio::test]
    async fn create_succeeds_on_200() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let notifier = Notifier::new(
            Some(format!("{}/create", server.url())),
            None,
            NotifyType::Service,
            3,
            Duration::from_millis(1),
        )
        .unwrap();

        let token = CancellationToken::new();
        notifier
            .create(&token, "serviceName=S1", &NoopMetrics)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_succeeds_on_409() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(409)
            .create_async()
            .await;

        let notifier = Notifier::new(
            Some(format!("{}/create", server.url())),
            None,
            NotifyType::Service,
            3,
            Duration::from_millis(1),
        )
        .unwrap();

        let token = CancellationToken::new();
        notifier
            .create(&token, "serviceName=S1", &NoopMetrics)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remove_fails_on_404() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .expect(2)
            .create_async()
            .await;

        let notifier = Notifier::new(
            None,
            Some(format!("{}/remove", server.url())),
            NotifyType::Service,
            2,
            Duration::from_millis(1),
        )
        .unwrap();

        let token = CancellationToken::new();
        let result = notifier.remove(&token, "serviceName=S1", &NoopMetrics).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn scenario_d_retry_then_409_succeeds_on_third_attempt() {
        let mut server = mockito::Server::new_async().await;
        // mockito tries the most-recently-created matching mock first, so the
        // fallback (409) is registered before the higher-priority one (500)
        // that must absorb the first two attempts.
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(409)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let notifier = Notifier::new(
            Some(format!("{}/create", server.url())),
            None,
            NotifyType::Service,
            3,
            Duration::from_millis(0),
        )
        .unwrap();

        let token = CancellationToken::new();
        notifier
            .create(&token, "serviceName=S1", &NoopMetrics)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn law_create_with_cancelled_token_returns_cancelled_without_network_request() {
        let server = mockito::Server::new_async().await;
        let notifier = Notifier::new(
            Some(format!("{}/create", server.url())),
            None,
            NotifyType::Service,
            3,
            Duration::from_millis(1),
        )
        .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let result = notifier.create(&token, "serviceName=S1", &NoopMetrics).await;
        assert!(matches!(result, Err(NotifierError::Cancelled)));
    }

    #[test]
    fn constructor_rejects_unparseable_url() {
        let result = Notifier::new(
            Some("not a url".to_string()),
            None,
            NotifyType::Service,
            1,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(NotifierError::Configuration(_, _))));
    }
}
