use super::{ProbeError, ProbeReport};
use crate::config::ConnectivityConfig;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

/// Reachability check used by the connectivity loop.
#[async_trait::async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Run one check. On success the payload is the time to response headers.
    async fn check(&self) -> ProbeReport<Duration>;
}

/// HTTP GET against a fixed URL; only a 200 counts as connected.
pub struct HttpProbe {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(config: &ConnectivityConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.target_url.clone(),
            timeout: config.timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, err: reqwest::Error) -> ProbeError {
        if err.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else if err.is_connect() {
            ProbeError::Connect(err.to_string())
        } else {
            ProbeError::Request(err.to_string())
        }
    }
}

#[async_trait::async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn check(&self) -> ProbeReport<Duration> {
        let started_at = Utc::now();
        let start = Instant::now();

        let outcome = match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => Ok(start.elapsed()),
            Ok(resp) => Err(ProbeError::UnexpectedStatus(resp.status().as_u16())),
            Err(e) => Err(self.classify(e)),
        };

        ProbeReport::new(started_at, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probe_for(url: String, timeout: Duration) -> HttpProbe {
        HttpProbe::new(&ConnectivityConfig {
            target_url: url,
            timeout,
            interval: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_ok_response_is_connected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let probe = probe_for(server.uri(), Duration::from_secs(1));
        let before = Utc::now();
        let report = probe.check().await;

        assert!(report.is_success());
        assert!(report.started_at >= before);
        assert!(report.started_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_non_200_is_not_connected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let report = probe_for(server.uri(), Duration::from_secs(1)).check().await;
        assert!(matches!(report.outcome, Err(ProbeError::UnexpectedStatus(404))));
    }

    #[tokio::test]
    async fn test_other_2xx_is_not_connected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let report = probe_for(server.uri(), Duration::from_secs(1)).check().await;
        assert!(matches!(report.outcome, Err(ProbeError::UnexpectedStatus(204))));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
            .mount(&server)
            .await;

        let report = probe_for(server.uri(), Duration::from_millis(100))
            .check()
            .await;
        assert!(matches!(report.outcome, Err(ProbeError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_is_not_connected() {
        // Bind then drop a listener to get a port nobody is serving.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let report = probe_for(format!("http://{addr}"), Duration::from_secs(1))
            .check()
            .await;
        assert!(!report.is_success());
    }
}
