use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use reqwest::{Client, Response, StatusCode};
use tracing::{info, warn};

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const USER_AGENT: &str = concat!("tc_scraper/", env!("CARGO_PKG_VERSION"));

pub fn client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

/// Fetch a page's markup. Rate limits and server errors are retried with
/// backoff; any other failure, or a final non-success status, is an error.
pub async fn fetch_page(client: &Client, url: &str) -> Result<String> {
    fetch_with_backoff(client, url, Duration::from_millis(BASE_BACKOFF_MS)).await
}

async fn fetch_with_backoff(client: &Client, url: &str, base_backoff: Duration) -> Result<String> {
    for attempt in 0..MAX_RETRIES {
        let response = client.get(url).send().await;

        let Some(reason) = retry_reason(&response) else {
            return read_body(url, response).await;
        };

        let backoff = base_backoff * 2u32.pow(attempt);
        warn!(
            "{} on {} (attempt {}/{}), backing off {:.1}s",
            reason,
            url,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
    }

    read_body(url, client.get(url).send().await).await
}

async fn read_body(url: &str, response: reqwest::Result<Response>) -> Result<String> {
    let start = Instant::now();
    let response = response.with_context(|| format!("Failed to fetch {}", url))?;
    let status = response.status();
    if !status.is_success() {
        bail!("Fetching {} returned {}", url, status);
    }
    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read body of {}", url))?;
    info!(
        "Fetched {} ({} bytes, body read in {}ms)",
        url,
        body.len(),
        start.elapsed().as_millis()
    );
    Ok(body)
}

fn retry_reason(response: &reqwest::Result<Response>) -> Option<String> {
    match response {
        Ok(r) if should_retry(r.status()) => Some(format!("HTTP {}", r.status())),
        Err(e) if e.is_timeout() || e.is_connect() => Some(e.to_string()),
        _ => None,
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/Episode_Guide"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let url = format!("{}/wiki/Episode_Guide", server.uri());
        let body = fetch_page(&client().unwrap(), &url).await.unwrap();
        assert_eq!(body, "<html></html>");
    }

    #[tokio::test]
    async fn not_found_is_fatal_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetch_page(&client().unwrap(), &server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn recovers_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
            .expect(1)
            .mount(&server)
            .await;

        let body = fetch_with_backoff(&client().unwrap(), &server.uri(), Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(body, "<table></table>");
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(u64::from(MAX_RETRIES) + 1)
            .mount(&server)
            .await;

        let err = fetch_with_backoff(&client().unwrap(), &server.uri(), Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn retries_only_transient_statuses() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::NOT_FOUND));
        assert!(!should_retry(StatusCode::OK));
    }
}
