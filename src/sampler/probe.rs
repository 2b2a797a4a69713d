use crate::common::model::sample::{STATUS_CONNECTION_FAILED, STATUS_TIMEOUT, Sample};
use crate::errors::{RequestError, Result};
use log::{debug, error, warn};
use metrics::{counter, histogram};
use regex::{Regex, RegexBuilder};
use reqwest::Client;
use std::time::{Duration, Instant};

/// One HTTP GET against a target, turned into a [`Sample`].
///
/// Network failures never surface as errors: a timeout is recorded as status 504 and
/// any other failure (DNS, refused, TLS) as 503, both with response time -1.
#[derive(Clone)]
pub struct Probe {
    client: Client,
    pattern: Option<Regex>,
}

impl Probe {
    pub fn new(timeout: Duration, pattern: Option<&str>) -> Result<Self> {
        let pattern = pattern
            .map(|p| RegexBuilder::new(p).multi_line(true).build())
            .transpose()
            .map_err(|e| RequestError::InvalidPattern(e.into()))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pulsewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RequestError::BuildFailed(e.into()))?;
        Ok(Self { client, pattern })
    }

    pub async fn probe(&self, url: &str) -> Sample {
        let mut sample = Sample::pending(url);
        let start = Instant::now();

        match self.client.get(url).send().await {
            Ok(response) => {
                // measured up to the response head, the body read is not included
                let elapsed = start.elapsed().as_secs_f64();
                sample.http_status = response.status().as_u16();
                sample.response_time_seconds = elapsed;
                if let Some(pattern) = &self.pattern {
                    match response.text().await {
                        Ok(body) => sample.pattern_match = Some(pattern.is_match(&body)),
                        Err(e) if e.is_timeout() => {
                            warn!("Timed out reading body of {}: {}", url, e);
                            sample.http_status = STATUS_TIMEOUT;
                            sample.response_time_seconds = -1.0;
                        }
                        Err(e) => warn!("Cannot read body of {}: {}", url, e),
                    }
                }
                histogram!("probe_response_seconds").record(elapsed);
                debug!(
                    "Probed {}: status {} in {:.3}s, match {:?}",
                    url, sample.http_status, elapsed, sample.pattern_match
                );
            }
            Err(e) if e.is_timeout() => {
                warn!("Request to {} timed out: {}", url, e);
                sample.http_status = STATUS_TIMEOUT;
            }
            Err(e) => {
                error!("Request to {} failed: {}", url, e);
                sample.http_status = STATUS_CONNECTION_FAILED;
            }
        }

        counter!("probes_total", "status" => sample.http_status.to_string()).increment(1);
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::model::sample::NO_RESPONSE_TIME;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with(route: &str, response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(response)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_probe_records_status_latency_and_match() {
        let server = server_with(
            "/health",
            ResponseTemplate::new(200).set_body_string("<html>\n<title>All good</title>\n</html>"),
        )
        .await;
        let probe = Probe::new(Duration::from_secs(15), Some("^<title>.*</title>$")).unwrap();

        let url = format!("{}/health", server.uri());
        let sample = probe.probe(&url).await;
        assert_eq!(sample.url, url);
        assert_eq!(sample.http_status, 200);
        assert!(sample.response_time_seconds >= 0.0);
        // multi-line: ^ and $ match at line boundaries
        assert_eq!(sample.pattern_match, Some(true));
    }

    #[tokio::test]
    async fn test_probe_pattern_miss_and_error_status() {
        let server = server_with("/down", ResponseTemplate::new(500).set_body_string("oops")).await;
        let probe = Probe::new(Duration::from_secs(15), Some("healthy")).unwrap();

        let sample = probe.probe(&format!("{}/down", server.uri())).await;
        assert_eq!(sample.http_status, 500);
        assert_eq!(sample.pattern_match, Some(false));
    }

    #[tokio::test]
    async fn test_probe_without_pattern_leaves_match_unset() {
        let server = server_with("/", ResponseTemplate::new(204)).await;
        let probe = Probe::new(Duration::from_secs(15), None).unwrap();

        let sample = probe.probe(&format!("{}/", server.uri())).await;
        assert_eq!(sample.http_status, 204);
        assert_eq!(sample.pattern_match, None);
    }

    #[tokio::test]
    async fn test_probe_timeout_yields_504() {
        let server = server_with(
            "/slow",
            ResponseTemplate::new(200).set_delay(Duration::from_secs(5)),
        )
        .await;
        let probe = Probe::new(Duration::from_millis(200), None).unwrap();

        let sample = probe.probe(&format!("{}/slow", server.uri())).await;
        assert_eq!(sample.http_status, STATUS_TIMEOUT);
        assert_eq!(sample.response_time_seconds, NO_RESPONSE_TIME);
        assert!(sample.is_timeout());
    }

    #[tokio::test]
    async fn test_probe_connection_failure_yields_503() {
        // bind then drop a listener so the port is known to be closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = Probe::new(Duration::from_secs(5), None).unwrap();
        let sample = probe.probe(&format!("http://{addr}/")).await;
        assert_eq!(sample.http_status, STATUS_CONNECTION_FAILED);
        assert_eq!(sample.response_time_seconds, NO_RESPONSE_TIME);
        assert!(!sample.responded());
    }

    #[test]
    fn test_invalid_pattern_is_request_error() {
        let err = Probe::new(Duration::from_secs(15), Some("(unclosed")).err().unwrap();
        assert!(err.is_request());
    }
}
