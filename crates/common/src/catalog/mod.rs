//! Imagery catalog API client
//!
//! Authenticated, paginated search against the catalog's quick-search endpoint.
//! Pages are fetched lazily: the continuation link of a page is followed only once
//! every feature of that page has been consumed. HTTP 429 responses are retried
//! with capped exponential backoff; any other status >= 300 fails immediately.

use crate::config::{CatalogConfig, CATALOG_API_KEY_ENV};
use crate::errors::{AppError, Result};
use crate::features::RawFeature;
use crate::metrics::{self, CatalogRequestTimer};
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::NaiveDate;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const ITEM_TYPES_ENDPOINT: &str = "item-types";
const SEARCH_ENDPOINT: &str = "quick-search";

/// Retry schedule for rate-limited requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per request, first try included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Delays slept between consecutive attempts
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        (1..self.max_attempts)
            .filter_map(|_| backoff.next_backoff())
            .collect()
    }
}

/// Search parameters for one logical query
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Upper bound on cloud cover, fraction in [0, 1]
    pub cloud_cover_max: f64,
    pub aoi: geojson::Geometry,
    /// Empty means every item type the catalog offers
    pub item_types: Vec<String>,
}

impl SearchRequest {
    fn payload(&self, item_types: Vec<String>) -> SearchPayload {
        SearchPayload {
            item_types,
            filter: Filter::AndFilter {
                config: vec![
                    Filter::DateRangeFilter {
                        field_name: "acquired",
                        config: DateRange {
                            gte: day_start(self.start_date),
                            lte: day_start(self.end_date),
                        },
                    },
                    Filter::RangeFilter {
                        field_name: "cloud_cover",
                        config: Range {
                            lte: self.cloud_cover_max,
                        },
                    },
                    Filter::GeometryFilter {
                        field_name: "geometry",
                        config: self.aoi.clone(),
                    },
                ],
            },
        }
    }
}

fn day_start(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}

#[derive(Debug, Serialize)]
struct SearchPayload {
    item_types: Vec<String>,
    filter: Filter,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum Filter {
    AndFilter {
        config: Vec<Filter>,
    },
    DateRangeFilter {
        field_name: &'static str,
        config: DateRange,
    },
    RangeFilter {
        field_name: &'static str,
        config: Range,
    },
    GeometryFilter {
        field_name: &'static str,
        config: geojson::Geometry,
    },
}

#[derive(Debug, Serialize)]
struct DateRange {
    gte: String,
    lte: String,
}

#[derive(Debug, Serialize)]
struct Range {
    lte: f64,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    features: Vec<RawFeature>,
    #[serde(default, rename = "_links")]
    links: PageLinks,
}

#[derive(Debug, Default, Deserialize)]
struct PageLinks {
    #[serde(rename = "_next")]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemTypeList {
    item_types: Vec<ItemTypeEntry>,
}

#[derive(Debug, Deserialize)]
struct ItemTypeEntry {
    id: String,
}

enum Cursor {
    Start(Box<SearchRequest>),
    Next(String),
    Done,
}

/// Catalog API client
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    page_size: u32,
}

impl CatalogClient {
    /// Create a client. A missing credential fails here, not on first use.
    pub fn new(config: &CatalogConfig, api_key: Option<String>) -> Result<Self> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::config(format!(
                    "no catalog API key: pass --api-key or set {CATALOG_API_KEY_ENV}"
                ))
            })?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::from_config(config),
            page_size: config.page_size,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// Ids of every item type the catalog offers
    #[instrument(skip_all)]
    pub async fn list_item_types(&self) -> Result<Vec<String>> {
        let url = self.url(ITEM_TYPES_ENDPOINT);
        let response = self
            .send(ITEM_TYPES_ENDPOINT, || self.http.get(&url))
            .await?;
        let list: ItemTypeList = response.json().await?;
        let ids: Vec<String> = list.item_types.into_iter().map(|entry| entry.id).collect();
        debug!(count = ids.len(), "Listed item types");
        Ok(ids)
    }

    /// Lazy stream of every feature matching the request, across all pages.
    ///
    /// Single forward pass; calling again re-issues the whole query.
    pub fn search_features(&self, request: SearchRequest) -> BoxStream<'_, Result<RawFeature>> {
        stream::try_unfold(Cursor::Start(Box::new(request)), move |cursor| {
            self.fetch_page(cursor)
        })
        .map_ok(|features| stream::iter(features.into_iter().map(Ok::<_, AppError>)))
        .try_flatten()
        .boxed()
    }

    async fn fetch_page(&self, cursor: Cursor) -> Result<Option<(Vec<RawFeature>, Cursor)>> {
        let page: SearchPage = match cursor {
            Cursor::Done => return Ok(None),
            Cursor::Start(request) => {
                let item_types = if request.item_types.is_empty() {
                    self.list_item_types().await?
                } else {
                    request.item_types.clone()
                };
                info!(
                    start = %request.start_date,
                    end = %request.end_date,
                    cloud_cover_max = request.cloud_cover_max,
                    item_types = ?item_types,
                    "Searching catalog"
                );

                let payload = request.payload(item_types);
                let url = self.url(SEARCH_ENDPOINT);
                let page_size = self.page_size;
                self.send(SEARCH_ENDPOINT, || {
                    let builder = self.http.post(&url).json(&payload);
                    if page_size > 0 {
                        builder.query(&[("_page_size", page_size)])
                    } else {
                        builder
                    }
                })
                .await?
                .json()
                .await?
            }
            Cursor::Next(url) => {
                info!(url = %url, "Paging results");
                self.send(SEARCH_ENDPOINT, || self.http.get(&url))
                    .await?
                    .json()
                    .await?
            }
        };

        metrics::record_page(page.features.len());
        let next = match page.links.next {
            Some(url) if !url.is_empty() => Cursor::Next(url),
            _ => Cursor::Done,
        };
        Ok(Some((page.features, next)))
    }

    /// Send a request, retrying the same request on HTTP 429
    async fn send<F>(&self, endpoint: &'static str, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut backoff = self.retry.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let timer = CatalogRequestTimer::start(endpoint);
            let response = build()
                .basic_auth(&self.api_key, Some(""))
                .send()
                .await?;
            let status = response.status();
            timer.finish(status.as_u16());

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.retry.max_attempts {
                    warn!(endpoint, attempts = attempt, "Rate limit retries exhausted");
                    return Err(AppError::RateLimitExceeded { attempts: attempt });
                }
                let delay = backoff.next_backoff().unwrap_or(self.retry.max_delay);
                warn!(
                    endpoint,
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                metrics::record_retry(endpoint);
                tokio::time::sleep(delay).await;
                continue;
            }

            if status.as_u16() >= 300 {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Upstream {
                    status: status.as_u16(),
                    body,
                });
            }

            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    async fn serve<F>(build: F) -> String
    where
        F: FnOnce(String) -> Router,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let router = build(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        base
    }

    fn client(base_url: &str, max_attempts: u32) -> CatalogClient {
        let config = CatalogConfig {
            base_url: base_url.to_string(),
            max_attempts,
            base_delay_ms: 20,
            max_delay_ms: 1_000,
            ..CatalogConfig::default()
        };
        CatalogClient::new(&config, Some("test-key".into())).unwrap()
    }

    fn request(item_types: &[&str]) -> SearchRequest {
        SearchRequest {
            start_date: NaiveDate::from_ymd_opt(2022, 9, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2022, 9, 2).unwrap(),
            cloud_cover_max: 0.1,
            aoi: geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
                vec![13.3, 52.4],
                vec![13.5, 52.4],
                vec![13.5, 52.6],
                vec![13.3, 52.4],
            ]])),
            item_types: item_types.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn feature(id: &str) -> Value {
        json!({ "id": id, "type": "Feature" })
    }

    async fn collect_ids(client: &CatalogClient, request: SearchRequest) -> Result<Vec<String>> {
        let features: Vec<RawFeature> = client.search_features(request).try_collect().await?;
        Ok(features
            .iter()
            .map(|f| f.id().unwrap_or_default().to_string())
            .collect())
    }

    #[test]
    fn test_payload_shape() {
        let payload = serde_json::to_value(request(&["PSScene"]).payload(vec!["PSScene".into()]))
            .unwrap();

        assert_eq!(payload["item_types"], json!(["PSScene"]));
        assert_eq!(payload["filter"]["type"], "AndFilter");

        let filters = payload["filter"]["config"].as_array().unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0]["type"], "DateRangeFilter");
        assert_eq!(filters[0]["field_name"], "acquired");
        assert_eq!(filters[0]["config"]["gte"], "2022-09-01T00:00:00.000Z");
        assert_eq!(filters[0]["config"]["lte"], "2022-09-02T00:00:00.000Z");
        assert_eq!(filters[1]["type"], "RangeFilter");
        assert_eq!(filters[1]["field_name"], "cloud_cover");
        assert_eq!(filters[1]["config"]["lte"], 0.1);
        assert_eq!(filters[2]["type"], "GeometryFilter");
        assert_eq!(filters[2]["config"]["type"], "Polygon");
    }

    #[test]
    fn test_retry_delays_double_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(1_000),
        };
        let delays = policy.delays();
        assert_eq!(delays.len(), 5);
        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(delays[0] >= Duration::from_millis(200) && delays[0] < Duration::from_millis(201));
        assert!(delays[1] >= Duration::from_millis(400) && delays[1] < Duration::from_millis(401));
        assert!(delays[4] <= Duration::from_millis(1_001));
    }

    #[test]
    fn test_missing_credential_is_configuration_error() {
        let config = CatalogConfig::default();
        let err = CatalogClient::new(&config, None).err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
        let err = CatalogClient::new(&config, Some("   ".into())).err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_follows_pages_until_link_absent() {
        let searches = Arc::new(AtomicUsize::new(0));
        let counter = searches.clone();

        let base = serve(move |base| {
            let first_next = format!("{base}/pages/2");
            let page_base = base.clone();
            Router::new()
                .route(
                    "/quick-search",
                    post(move |Json(_body): Json<Value>| {
                        let next = first_next.clone();
                        let counter = counter.clone();
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Json(json!({
                                "features": [feature("a"), feature("b")],
                                "_links": { "_next": next }
                            }))
                        }
                    }),
                )
                .route(
                    "/pages/{n}",
                    get(move |Path(n): Path<u32>| {
                        let base = page_base.clone();
                        async move {
                            match n {
                                2 => Json(json!({
                                    "features": [feature("c")],
                                    "_links": { "_next": format!("{base}/pages/3") }
                                })),
                                _ => Json(json!({
                                    "features": [feature("d")],
                                    "_links": {}
                                })),
                            }
                        }
                    }),
                )
        })
        .await;

        let client = client(&base, 5);
        let ids = collect_ids(&client, request(&["PSScene"])).await.unwrap();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_item_types_queries_all() {
        let seen = Arc::new(Mutex::new(None::<Value>));
        let captured = seen.clone();

        let base = serve(move |_| {
            Router::new()
                .route(
                    "/item-types",
                    get(|| async {
                        Json(json!({ "item_types": [{ "id": "PSScene" }, { "id": "SkySatScene" }] }))
                    }),
                )
                .route(
                    "/quick-search",
                    post(move |headers: HeaderMap, Json(body): Json<Value>| {
                        let captured = captured.clone();
                        async move {
                            assert!(headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .is_some_and(|v| v.starts_with("Basic ")));
                            *captured.lock().unwrap() = Some(body);
                            Json(json!({ "features": [], "_links": {} }))
                        }
                    }),
                )
        })
        .await;

        let client = client(&base, 5);
        assert_eq!(
            client.list_item_types().await.unwrap(),
            vec!["PSScene", "SkySatScene"]
        );
        let ids = collect_ids(&client, request(&[])).await.unwrap();
        assert!(ids.is_empty());

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["item_types"], json!(["PSScene", "SkySatScene"]));
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_attempts() {
        let hits = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let recorded = hits.clone();

        let base = serve(move |_| {
            Router::new().route(
                "/quick-search",
                post(move || {
                    let recorded = recorded.clone();
                    async move {
                        recorded.lock().unwrap().push(Instant::now());
                        (HttpStatus::TOO_MANY_REQUESTS, "slow down").into_response()
                    }
                }),
            )
        })
        .await;

        let client = client(&base, 4);
        let err = collect_ids(&client, request(&["PSScene"])).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimitExceeded { attempts: 4 }));

        let hits = hits.lock().unwrap().clone();
        assert_eq!(hits.len(), 4);
        let planned = client.retry_policy().delays();
        for (gap, delay) in hits.windows(2).map(|w| w[1] - w[0]).zip(planned) {
            assert!(gap >= delay, "gap {gap:?} shorter than backoff {delay:?}");
        }
    }

    #[tokio::test]
    async fn test_rate_limit_recovers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let base = serve(move |_| {
            Router::new().route(
                "/quick-search",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                            HttpStatus::TOO_MANY_REQUESTS.into_response()
                        } else {
                            Json(json!({ "features": [feature("a")], "_links": {} })).into_response()
                        }
                    }
                }),
            )
        })
        .await;

        let client = client(&base, 5);
        let ids = collect_ids(&client, request(&["PSScene"])).await.unwrap();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upstream_error_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let base = serve(move |_| {
            Router::new().route(
                "/quick-search",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        (HttpStatus::INTERNAL_SERVER_ERROR, "boom").into_response()
                    }
                }),
            )
        })
        .await;

        let client = client(&base, 5);
        let err = collect_ids(&client, request(&["PSScene"])).await.unwrap_err();
        match err {
            AppError::Upstream { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
