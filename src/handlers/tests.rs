use super::*;
use crate::cache::EphemeralCache;
use crate::models::{ErrorBody, HealthResponse};
use crate::rate_limit::{AdmissionLimiter, Limiters};
use crate::upstream::Upstream;
use axum::{Json, extract::Path, http::StatusCode};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Calls {
    categories: AtomicUsize,
    tags: AtomicUsize,
    profiles: AtomicUsize,
}

struct Harness {
    base: String,
    http: reqwest::Client,
    calls: Arc<Calls>,
    state: Arc<AppState>,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str, client_ip: &str) -> reqwest::Response {
        self.http
            .get(self.url(path))
            .header("x-forwarded-for", client_ip)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, client_ip: &str, body: Value) -> reqwest::Response {
        self.http
            .post(self.url(path))
            .header("x-forwarded-for", client_ip)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

fn fake_backend(calls: Arc<Calls>) -> Router {
    let categories = Arc::clone(&calls);
    let tags = Arc::clone(&calls);
    let profiles = Arc::clone(&calls);
    Router::new()
        .route(
            "/categories",
            get(move || async move {
                categories.categories.fetch_add(1, Ordering::SeqCst);
                Json(json!([{ "name": "food" }, { "name": "tech" }]))
            }),
        )
        .route(
            "/tags",
            get(move || async move {
                tags.tags.fetch_add(1, Ordering::SeqCst);
                (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance")
            }),
        )
        .route(
            "/profiles",
            get(move || async move {
                profiles.profiles.fetch_add(1, Ordering::SeqCst);
                Json(json!([{ "id": "p1", "display_name": "Ada" }]))
            }),
        )
        .route(
            "/auth/{action}",
            post(|Path(action): Path<String>, Json(body): Json<Value>| async move {
                if action == "signin" {
                    (StatusCode::OK, Json(json!({ "action": action, "echo": body })))
                } else {
                    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "msg": "unsupported" })))
                }
            }),
        )
        .route(
            "/submissions",
            post(|Json(body): Json<Value>| async move {
                (StatusCode::CREATED, Json(json!({ "id": 1, "url": body["url"] })))
            }),
        )
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

async fn harness() -> Harness {
    let calls = Arc::new(Calls::default());
    let backend = serve(fake_backend(Arc::clone(&calls))).await;

    let state = Arc::new(AppState {
        upstream: Upstream::new(
            reqwest::Client::new(),
            &backend,
            Some("anon-key".to_string()),
            Duration::from_secs(5),
        ),
        cache: EphemeralCache::new(8),
        limiters: Limiters {
            auth: AdmissionLimiter::new(Duration::from_secs(900), 2),
            api: AdmissionLimiter::new(Duration::from_secs(60), 5),
            submission: AdmissionLimiter::new(Duration::from_secs(3600), 1),
        },
    });
    let base = serve(router(Arc::clone(&state))).await;

    Harness {
        base,
        http: reqwest::Client::new(),
        calls,
        state,
    }
}

fn header<'a>(res: &'a reqwest::Response, name: &str) -> &'a str {
    res.headers()[name].to_str().unwrap()
}

#[tokio::test]
async fn categories_are_served_from_cache_after_first_fetch() {
    let h = harness().await;

    let first = h.get("/api/categories", "203.0.113.7").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "x-ratelimit-limit"), "5");
    assert_eq!(header(&first, "x-ratelimit-remaining"), "4");
    let first_body: Value = first.json().await.unwrap();

    let second = h.get("/api/categories", "203.0.113.7").await;
    assert_eq!(header(&second, "x-ratelimit-remaining"), "3");
    let second_body: Value = second.json().await.unwrap();

    assert_eq!(first_body, second_body);
    assert_eq!(first_body[1]["name"], "tech");
    assert_eq!(h.calls.categories.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn api_quota_is_per_client() {
    let h = harness().await;
    for _ in 0..5 {
        let res = h.get("/api/categories", "198.51.100.1").await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let denied = h.get("/api/categories", "198.51.100.1").await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&denied, "x-ratelimit-remaining"), "0");
    let retry_after: u64 = header(&denied, "retry-after").parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
    let body: ErrorBody = denied.json().await.unwrap();
    assert_eq!(body.class, Some(LimitClass::Api));

    let other = h.get("/api/categories", "198.51.100.2").await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn upstream_failure_is_reported_and_not_cached() {
    let h = harness().await;

    let res = h.get("/api/tags", "192.0.2.10").await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: ErrorBody = res.json().await.unwrap();
    assert_eq!(body.upstream_status, Some(503));

    let again = h.get("/api/tags", "192.0.2.10").await;
    assert_eq!(again.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(h.calls.tags.load(Ordering::SeqCst), 2);
    assert!(h.state.cache.is_empty());
}

#[tokio::test]
async fn profile_cache_can_be_invalidated() {
    let h = harness().await;

    for _ in 0..2 {
        let res = h.get("/api/profiles/p1", "192.0.2.20").await;
        assert_eq!(res.status(), StatusCode::OK);
    }
    assert_eq!(h.calls.profiles.load(Ordering::SeqCst), 1);

    let res = h
        .http
        .delete(h.url("/api/profiles/p1/cache"))
        .header("x-forwarded-for", "192.0.2.20")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["invalidated"], true);

    let res = h.get("/api/profiles/p1", "192.0.2.20").await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body[0]["display_name"], "Ada");
    assert_eq!(h.calls.profiles.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn malformed_profile_id_is_rejected() {
    let h = harness().await;
    let res = h.get("/api/profiles/p1%26role=eq.admin", "192.0.2.30").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.calls.profiles.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn auth_relays_upstream_status_and_has_its_own_quota() {
    let h = harness().await;

    let ok = h
        .post("/api/auth/signin", "192.0.2.40", json!({ "email": "a@b.c" }))
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["echo"]["email"], "a@b.c");

    let rejected = h.post("/api/auth/explode", "192.0.2.40", json!({})).await;
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let denied = h.post("/api/auth/signin", "192.0.2.40", json!({})).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: ErrorBody = denied.json().await.unwrap();
    assert_eq!(body.class, Some(LimitClass::Auth));

    // auth exhaustion leaves the api quota alone
    let api = h.get("/api/categories", "192.0.2.40").await;
    assert_eq!(api.status(), StatusCode::OK);
}

#[tokio::test]
async fn submission_clears_cache_and_is_limited() {
    let h = harness().await;
    h.get("/api/categories", "192.0.2.50").await;
    assert!(!h.state.cache.is_empty());

    let created = h
        .post("/api/submissions", "192.0.2.50", json!({ "url": "https://blog.example" }))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    assert!(h.state.cache.is_empty());

    let denied = h
        .post("/api/submissions", "192.0.2.50", json!({ "url": "https://other.example" }))
        .await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(header(&denied, "retry-after").parse::<u64>().unwrap() > 60);
}

#[tokio::test]
async fn health_and_metrics_are_not_limited() {
    let h = harness().await;
    h.get("/api/categories", "192.0.2.60").await;

    let health: HealthResponse = h
        .http
        .get(h.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "healthy");

    let metrics = h
        .http
        .get(h.url("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("blogrolly_requests_total"));
    assert!(metrics.contains("blogrolly_cache_misses_total"));
}

#[test]
fn client_identifier_prefers_forwarded_headers() {
    let peer: SocketAddr = "10.1.2.3:4567".parse().unwrap();
    let mut headers = HeaderMap::new();
    assert_eq!(client_identifier(&headers, peer), "10.1.2.3");

    headers.insert("x-real-ip", HeaderValue::from_static("172.16.0.9"));
    assert_eq!(client_identifier(&headers, peer), "172.16.0.9");

    headers.insert(
        "x-forwarded-for",
        HeaderValue::from_static(" 203.0.113.5 , 10.0.0.1"),
    );
    assert_eq!(client_identifier(&headers, peer), "203.0.113.5");

    headers.insert("x-forwarded-for", HeaderValue::from_static(""));
    assert_eq!(client_identifier(&headers, peer), "172.16.0.9");
}

#[test]
fn segments_must_be_plain_identifiers() {
    assert!(validate_segment("id", "3f2a-b_9").is_ok());
    assert!(validate_segment("id", "").is_err());
    assert!(validate_segment("id", "a&b").is_err());
    assert!(validate_segment("id", "../x").is_err());
}
