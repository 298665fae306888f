//! Live arrival lookup against the external ETA endpoint.
//!
//! [`LiveSource`] is the seam the resolver depends on. [`LiveClient`] is
//! the HTTP implementation: it never surfaces an error to the resolver,
//! since an empty answer is what moves resolution on to the timetable.

pub mod normalize;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, Url};
use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::Instant;
use crate::error::FetchError;
use crate::fetch::{HttpClient, fetch_json};
use crate::types::LiveArrival;

pub use normalize::{NormalizeOptions, ResponseShape, normalize};

/// What to ask the live endpoint about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveQuery {
    pub stop_id: String,
    /// Routes known to serve the stop; when present the keyed
    /// `stopId:routeId` lookup is used.
    pub route_ids: Vec<String>,
}

impl LiveQuery {
    pub fn stop(stop_id: impl Into<String>) -> Self {
        Self {
            stop_id: stop_id.into(),
            route_ids: Vec::new(),
        }
    }

    pub fn with_routes(mut self, route_ids: Vec<String>) -> Self {
        self.route_ids = route_ids;
        self
    }

    pub fn stop_route_keys(&self) -> Vec<String> {
        self.route_ids
            .iter()
            .map(|r| format!("{}:{}", self.stop_id, r))
            .collect()
    }
}

/// Source of live arrivals for a stop. Implementations return an empty
/// list on any failure.
#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn fetch_live_arrivals(&self, query: &LiveQuery, now: &Instant) -> Vec<LiveArrival>;
}

/// `None` means no live endpoint is configured: always empty.
#[async_trait]
impl<T: LiveSource> LiveSource for Option<T> {
    async fn fetch_live_arrivals(&self, query: &LiveQuery, now: &Instant) -> Vec<LiveArrival> {
        match self {
            Some(live) => live.fetch_live_arrivals(query, now).await,
            None => Vec::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StopRouteRequest {
    stop_route_ids: Vec<String>,
}

/// HTTP client for the live ETA provider.
pub struct LiveClient<C> {
    client: C,
    base_url: String,
    options: NormalizeOptions,
}

impl<C: HttpClient> LiveClient<C> {
    pub fn new(client: C, base_url: impl Into<String>, options: NormalizeOptions) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            options,
        }
    }

    /// `GET {base}/stops/{stop}/etas` without route context,
    /// `POST {base}/stop-route-etas` with it.
    pub fn build_request(&self, query: &LiveQuery) -> Result<Request, FetchError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| FetchError::Url(e.to_string()))?;

        if query.route_ids.is_empty() {
            url.path_segments_mut()
                .map_err(|_| FetchError::Url(format!("{} cannot be a base", self.base_url)))?
                .pop_if_empty()
                .extend(["stops", query.stop_id.as_str(), "etas"]);
            return Ok(Request::new(Method::GET, url));
        }

        url.path_segments_mut()
            .map_err(|_| FetchError::Url(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push("stop-route-etas");

        let body = serde_json::to_vec(&StopRouteRequest {
            stop_route_ids: query.stop_route_keys(),
        })?;
        let mut req = Request::new(Method::POST, url);
        req.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *req.body_mut() = Some(body.into());
        Ok(req)
    }

    /// Fetches and normalizes, surfacing transport and decoding failures.
    pub async fn try_fetch_live_arrivals(
        &self,
        query: &LiveQuery,
        now: &Instant,
    ) -> Result<Vec<LiveArrival>, FetchError> {
        let req = self.build_request(query)?;
        let body = fetch_json(&self.client, req).await?;
        Ok(normalize(&body, now, &self.options))
    }
}

#[async_trait]
impl<C: HttpClient> LiveSource for LiveClient<C> {
    #[tracing::instrument(skip(self, query, now), fields(stop_id = %query.stop_id, routes = query.route_ids.len()))]
    async fn fetch_live_arrivals(&self, query: &LiveQuery, now: &Instant) -> Vec<LiveArrival> {
        match self.try_fetch_live_arrivals(query, now).await {
            Ok(arrivals) => {
                debug!(count = arrivals.len(), "Live arrivals normalized");
                arrivals
            }
            Err(e) => {
                warn!(error = %e, "Live ETA fetch failed, falling back");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fake::FakeClient;
    use crate::fetch::{BasicClient, auth::ApiKey};
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;

    fn now() -> Instant {
        Kolkata.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_get_request_for_bare_stop() {
        let live = LiveClient::new(BasicClient::new(), "https://eta.example.com/api/", NormalizeOptions::default());
        let req = live.build_request(&LiveQuery::stop("S 1")).unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.url().as_str(), "https://eta.example.com/api/stops/S%201/etas");
    }

    #[test]
    fn test_post_request_with_route_context() {
        let live = LiveClient::new(BasicClient::new(), "https://eta.example.com/api", NormalizeOptions::default());
        let query = LiveQuery::stop("S1").with_routes(vec!["12".into(), "14".into()]);
        let req = live.build_request(&query).unwrap();
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.url().as_str(), "https://eta.example.com/api/stop-route-etas");
        let body: serde_json::Value =
            serde_json::from_slice(req.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({"stopRouteIds": ["S1:12", "S1:14"]}));
    }

    #[test]
    fn test_invalid_base_url() {
        let live = LiveClient::new(BasicClient::new(), "not a url", NormalizeOptions::default());
        assert!(matches!(live.build_request(&LiveQuery::stop("S1")), Err(FetchError::Url(_))));
    }

    #[tokio::test]
    async fn test_fetch_normalizes_success_body() {
        let fake = FakeClient::new().reply(200, r#"{"eta": [{"eta": 0, "rN": "12", "ag": "kadamba"}]}"#);
        let live = LiveClient::new(fake, "https://eta.example.com", NormalizeOptions::default());
        let arrivals = live.fetch_live_arrivals(&LiveQuery::stop("S1"), &now()).await;
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].time, now());
        assert_eq!(arrivals[0].agency_name.as_deref(), Some("KADAMBA"));
    }

    #[tokio::test]
    async fn test_malformed_or_empty_body_is_empty_not_error() {
        for body in ["", "<html>oops</html>", "{}", "[]", "null"] {
            let live = LiveClient::new(
                FakeClient::new().reply(200, body),
                "https://eta.example.com",
                NormalizeOptions::default(),
            );
            assert!(live.fetch_live_arrivals(&LiveQuery::stop("S1"), &now()).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_non_success_status_is_typed_and_recovered() {
        let live = LiveClient::new(
            FakeClient::new().reply(503, r#"{"eta": [{"eta": 0, "rN": "12"}]}"#),
            "https://eta.example.com",
            NormalizeOptions::default(),
        );
        let err = live
            .try_fetch_live_arrivals(&LiveQuery::stop("S1"), &now())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(s) if s.as_u16() == 503));
        assert!(live.fetch_live_arrivals(&LiveQuery::stop("S1"), &now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_is_empty() {
        let client = BasicClient::with_timeouts(
            std::time::Duration::from_secs(2),
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let live = LiveClient::new(client, "http://127.0.0.1:1", NormalizeOptions::default());
        assert!(live.fetch_live_arrivals(&LiveQuery::stop("S1"), &now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_token_is_sent_as_header() {
        let fake = FakeClient::new().reply(200, "[]");
        let recorded = fake.requests();
        let client = ApiKey::bearer(fake, "secret-token").unwrap();
        let live = LiveClient::new(client, "https://eta.example.com", NormalizeOptions::default());
        live.fetch_live_arrivals(&LiveQuery::stop("S1"), &now()).await;

        let requests = recorded.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].headers.get("authorization").unwrap(),
            "Bearer secret-token"
        );
    }
}
