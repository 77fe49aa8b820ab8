use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error("invalid API base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { status: u16, url: String },

    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CatalogApp {
    #[serde(deserialize_with = "string_or_number")]
    pub(crate) id: String,
    #[serde(alias = "title")]
    pub(crate) name: String,
    #[serde(default, alias = "artist", alias = "publisher")]
    pub(crate) developer: Option<String>,
    #[serde(default, alias = "store")]
    pub(crate) platform: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Review {
    #[serde(deserialize_with = "string_or_number")]
    pub(crate) id: String,
    #[serde(default, alias = "user_name", alias = "username")]
    pub(crate) author: String,
    #[serde(deserialize_with = "clamped_rating", alias = "score", alias = "stars")]
    pub(crate) rating: u8,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default, alias = "body", alias = "text")]
    pub(crate) content: String,
    #[serde(default, alias = "app_version")]
    pub(crate) version: Option<String>,
    #[serde(alias = "date", alias = "updated", alias = "created_at")]
    pub(crate) submitted_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AppsPayload {
    List(Vec<CatalogApp>),
    Wrapped { apps: Vec<CatalogApp> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReviewsPayload {
    List(Vec<Review>),
    Wrapped { reviews: Vec<Review> },
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) if !value.trim().is_empty() => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(de::Error::custom(format!("invalid id: {other}"))),
    }
}

fn clamped_rating<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Number(value) => value
            .as_f64()
            .ok_or_else(|| de::Error::custom("rating is not a number"))?,
        Value::String(value) => value
            .trim()
            .parse::<f64>()
            .map_err(|err| de::Error::custom(format!("invalid rating {value:?}: {err}")))?,
        other => return Err(de::Error::custom(format!("invalid rating: {other}"))),
    };
    if !raw.is_finite() {
        return Err(de::Error::custom(format!("rating {raw} is not a finite number")));
    }
    Ok(raw.round().clamp(1.0, 5.0) as u8)
}

/// Thin client for the catalog backend.
#[derive(Debug, Clone)]
pub(crate) struct CatalogClient {
    http: reqwest::Client,
    base_url: Url,
}

impl CatalogClient {
    pub(crate) fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reviewdeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ApiError::Request {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self { http, base_url })
    }

    pub(crate) fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) async fn list_apps(&self) -> Result<Vec<CatalogApp>, ApiError> {
        let url = self.endpoint(&["apps"])?;
        let payload: AppsPayload = self.get_json(url).await?;
        Ok(match payload {
            AppsPayload::List(apps) | AppsPayload::Wrapped { apps } => apps,
        })
    }

    pub(crate) async fn list_reviews(&self, app_id: &str) -> Result<Vec<Review>, ApiError> {
        let url = self.endpoint(&["apps", app_id, "reviews"])?;
        let payload: ReviewsPayload = self.get_json(url).await?;
        Ok(match payload {
            ReviewsPayload::List(reviews) | ReviewsPayload::Wrapped { reviews } => reviews,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(%url, "fetching");
        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|source| ApiError::Request {
            url: url.to_string(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, ApiError> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed).map_err(|err| ApiError::InvalidBaseUrl {
        url: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::InvalidBaseUrl {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn spawn_catalog_server(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/api")
    }

    fn client(base: &str) -> CatalogClient {
        CatalogClient::new(base, Duration::from_secs(5)).expect("client")
    }

    #[test]
    fn base_url_gets_a_trailing_slash() {
        let url = normalize_base_url("http://localhost:8080/api?x=1").expect("valid");
        assert_eq!(url.as_str(), "http://localhost:8080/api/");
        let url = normalize_base_url("https://example.com").expect("valid");
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn base_url_rejects_other_schemes() {
        let err = normalize_base_url("ftp://example.com").expect_err("must fail");
        assert!(err.to_string().contains("unsupported scheme"));
        assert!(normalize_base_url("not a url").is_err());
    }

    #[test]
    fn review_endpoint_encodes_app_id_as_one_segment() {
        let client = client("http://localhost:1/api");
        let url = client
            .endpoint(&["apps", "com.example/app 1", "reviews"])
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "http://localhost:1/api/apps/com.example%2Fapp%201/reviews"
        );
    }

    #[test]
    fn review_decoding_accepts_loose_shapes() {
        let review: Review = serde_json::from_value(json!({
            "id": 42,
            "user_name": "ann",
            "score": "4.6",
            "body": "works",
            "date": "2026-10-01T10:00:00Z",
            "extra": true
        }))
        .expect("decode");
        assert_eq!(review.id, "42");
        assert_eq!(review.author, "ann");
        assert_eq!(review.rating, 5);
        assert_eq!(review.content, "works");
        assert!(review.title.is_empty());

        let review: Review = serde_json::from_value(json!({
            "id": "r1",
            "rating": 0,
            "submitted_at": "2026-10-01T10:00:00+02:00"
        }))
        .expect("decode");
        assert_eq!(review.rating, 1);
    }

    #[test]
    fn non_finite_ratings_are_rejected() {
        for raw in ["NaN", "inf", "-infinity"] {
            let err = serde_json::from_value::<Review>(json!({
                "id": "r",
                "rating": raw,
                "submitted_at": "2026-10-01T10:00:00Z"
            }))
            .expect_err("non-finite rating must not decode");
            assert!(err.to_string().contains("not a finite number"), "{raw}: {err}");
        }

        let review: Review = serde_json::from_value(json!({
            "id": "r",
            "rating": "17",
            "submitted_at": "2026-10-01T10:00:00Z"
        }))
        .expect("decode");
        assert_eq!(review.rating, 5);
    }

    #[tokio::test]
    async fn list_apps_accepts_bare_and_wrapped_payloads() {
        let router = Router::new()
            .route(
                "/api/apps",
                get(|| async {
                    Json(json!([
                        { "id": 1, "name": "Notes", "developer": "Acme" },
                        { "id": "b", "name": "Maps" }
                    ]))
                }),
            )
            .route(
                "/wrapped/apps",
                get(|| async { Json(json!({ "apps": [{ "id": "x", "title": "Xylo" }] })) }),
            );
        let base = spawn_catalog_server(router).await;

        let apps = client(&base).list_apps().await.expect("apps");
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].id, "1");
        assert_eq!(apps[0].developer.as_deref(), Some("Acme"));

        let wrapped_base = base.replace("/api", "/wrapped");
        let apps = client(&wrapped_base).list_apps().await.expect("apps");
        assert_eq!(apps[0].name, "Xylo");
    }

    #[tokio::test]
    async fn list_reviews_hits_per_app_endpoint() {
        let router = Router::new().route(
            "/api/apps/:id/reviews",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "reviews": [{
                        "id": format!("{id}-1"),
                        "author": "bob",
                        "rating": 3,
                        "title": "ok",
                        "content": "fine",
                        "submitted_at": "2026-10-02T08:30:00Z"
                    }]
                }))
            }),
        );
        let base = spawn_catalog_server(router).await;

        let reviews = client(&base).list_reviews("notes").await.expect("reviews");
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].id, "notes-1");
        assert_eq!(reviews[0].rating, 3);
    }

    #[tokio::test]
    async fn http_errors_surface_status_and_url() {
        let router = Router::new().route(
            "/api/apps",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let base = spawn_catalog_server(router).await;

        let err = client(&base).list_apps().await.expect_err("must fail");
        assert!(matches!(err, ApiError::Status { status: 503, .. }));
        assert!(err.to_string().contains("HTTP 503"));
        assert!(err.to_string().contains("/api/apps"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let router = Router::new().route("/api/apps", get(|| async { "not json" }));
        let base = spawn_catalog_server(router).await;

        let err = client(&base).list_apps().await.expect_err("must fail");
        assert!(matches!(err, ApiError::Decode { .. }));
    }
}
