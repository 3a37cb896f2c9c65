use std::time::Duration;

use super::FetchError;

/// Upper bound on a single fetch, connection and body included.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of raw exposition payloads.
pub trait Fetcher {
    /// Fetches one complete payload.
    fn fetch(&self) -> impl std::future::Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Pulls `/metrics` from a cAdvisor instance over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    /// Creates a fetcher for `http://{host}/metrics`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(host: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: format!("http://{host}/metrics"),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Fetcher for HttpFetcher {
    /// Issues a `GET` and reads the whole body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Request`] on transport failures (including the timeout),
    /// [`FetchError::Status`] for any status other than `200 OK`, and [`FetchError::Body`]
    /// if the body cannot be read.
    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        let response =
            self.client
                .get(&self.url)
                .send()
                .await
                .map_err(|source| FetchError::Request {
                    url: self.url.clone(),
                    source,
                })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Body {
                url: self.url.clone(),
                source,
            })?;
        log::trace!("fetched {} bytes from {}", body.len(), self.url);

        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::http::StatusCode;
    use axum::routing::get;

    use super::*;

    async fn serve(router: axum::Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        addr
    }

    #[test]
    fn test_url_points_at_metrics_path() {
        let fetcher = HttpFetcher::new("localhost:8080").unwrap();
        assert_eq!(fetcher.url(), "http://localhost:8080/metrics");
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let router = axum::Router::new().route("/metrics", get(|| async { "up 1\n" }));
        let addr = serve(router).await;

        let fetcher = HttpFetcher::new(&addr.to_string()).unwrap();
        let body = fetcher.fetch().await.unwrap();
        assert_eq!(body, b"up 1\n");
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_ok_status() {
        let router = axum::Router::new().route(
            "/metrics",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let addr = serve(router).await;

        let fetcher = HttpFetcher::new(&addr.to_string()).unwrap();
        match fetcher.fetch().await.unwrap_err() {
            FetchError::Status { status, url } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(url, format!("http://{addr}/metrics"));
            }
            other => panic!("Expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_rejects_other_success_codes() {
        let router =
            axum::Router::new().route("/metrics", get(|| async { StatusCode::NO_CONTENT }));
        let addr = serve(router).await;

        let fetcher = HttpFetcher::new(&addr.to_string()).unwrap();
        assert!(matches!(
            fetcher.fetch().await,
            Err(FetchError::Status { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_reports_connection_failure() {
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let fetcher = HttpFetcher::new(&addr.to_string()).unwrap();
        assert!(matches!(
            fetcher.fetch().await,
            Err(FetchError::Request { .. })
        ));
    }
}
