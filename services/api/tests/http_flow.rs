//! End-to-end tests driving the API router against the in-memory store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use api_lib::adapters::memory::MemoryAdapter;
use api_lib::config::Config;
use api_lib::web::{
    api_router,
    session::SessionRegistry,
    state::{AppState, Clock},
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;
use weight_tracker_core::domain::{IdentityEntry, WeightRecord};
use weight_tracker_core::ports::{IdentityDirectory, PortError, PortResult, RecordStore};

//=========================================================================================
// Harness
//=========================================================================================

struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

struct Harness {
    app: Router,
    clock: Arc<TestClock>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryAdapter::new());
        Self::with_stores(store.clone(), store)
    }

    fn with_stores(records: Arc<dyn RecordStore>, identities: Arc<dyn IdentityDirectory>) -> Self {
        let config = Config::from_lookup(|key| match key {
            "STORE_BACKEND" => Some("memory".to_string()),
            "USER_IDENTITIES" => Some("alice,bob".to_string()),
            "REFERENCE_UTC_OFFSET" => Some("+09:00".to_string()),
            _ => None,
        })
        .unwrap();

        // 2024-01-31 12:00 in the reference timezone.
        let clock = Arc::new(TestClock(Mutex::new(
            Utc.with_ymd_and_hms(2024, 1, 31, 3, 0, 0).unwrap(),
        )));
        let state = Arc::new(AppState {
            records,
            identities,
            sessions: Arc::new(SessionRegistry::new(config.session_timeout_minutes)),
            clock: clock.clone(),
            config: Arc::new(config),
        });

        Self {
            app: api_router(state),
            clock,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Option<String>, Value) {
        call(self.app.clone(), method, uri, cookie, body).await
    }

    /// Registers `identity` and returns the session cookie of the logged-in session.
    async fn register(&self, identity: &str, password: &str) -> String {
        let (status, cookie, _) = self
            .send(
                "POST",
                "/auth/register",
                None,
                Some(json!({ "identity": identity, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        cookie.expect("a session cookie is issued")
    }
}

/// Sends one request through `app`; returns the status, the minted cookie and the body.
async fn call(
    app: Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, set_cookie, value)
}

/// Holds the first identity lookup until released; later lookups pass straight through.
struct GatedDirectory {
    inner: MemoryAdapter,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedDirectory {
    fn new() -> Self {
        Self {
            inner: MemoryAdapter::new(),
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl IdentityDirectory for GatedDirectory {
    async fn read_all_identities(&self) -> PortResult<BTreeMap<String, IdentityEntry>> {
        self.inner.read_all_identities().await
    }

    async fn find_identity(&self, identity: &str) -> PortResult<Option<IdentityEntry>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.find_identity(identity).await
    }

    async fn create_identity_if_absent(
        &self,
        identity: &str,
        entry: &IdentityEntry,
    ) -> PortResult<bool> {
        self.inner.create_identity_if_absent(identity, entry).await
    }
}

/// A record store whose reads fail for one user key.
struct BrokenFor {
    inner: MemoryAdapter,
    user_key: &'static str,
}

#[async_trait]
impl RecordStore for BrokenFor {
    async fn create(&self, user_key: &str, record: &WeightRecord) -> PortResult<String> {
        self.inner.create(user_key, record).await
    }

    async fn read_all(&self, user_key: &str) -> PortResult<Vec<WeightRecord>> {
        if user_key == self.user_key {
            return Err(PortError::Unexpected("connection reset".to_string()));
        }
        self.inner.read_all(user_key).await
    }

    async fn update(&self, user_key: &str, id: &str, record: &WeightRecord) -> PortResult<()> {
        self.inner.update(user_key, id, record).await
    }

    async fn delete(&self, user_key: &str, id: &str) -> PortResult<()> {
        self.inner.delete(user_key, id).await
    }
}

//=========================================================================================
// Records
//=========================================================================================

#[tokio::test]
async fn create_read_update_marks_record_edited() {
    let h = Harness::new();
    let cookie = h.register("alice", "s3cret").await;

    let (status, _, created) = h
        .send(
            "POST",
            "/records",
            Some(&cookie),
            Some(json!({
                "weight": 70.5,
                "time_after_meal": 1.0,
                "timestamp": "2024-01-30T07:15:00+09:00"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _, listed) = h.send("GET", "/records", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], json!(id));
    assert_eq!(listed[0]["edited"], json!(false));
    assert_eq!(listed[0]["meal_label"], json!("1 h"));
    assert_eq!(listed[0]["timestamp"], json!("2024-01-30T07:15:00+09:00"));

    let (status, _, _) = h
        .send(
            "PUT",
            &format!("/records/{}", id),
            Some(&cookie),
            Some(json!({
                "weight": 71.0,
                "time_after_meal": 1.0,
                "timestamp": "2024-01-30T07:15:00+09:00"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, _, listed) = h.send("GET", "/records", Some(&cookie), None).await;
    assert_eq!(listed[0]["edited"], json!(true));
    assert_eq!(listed[0]["weight"], json!(71.0));
}

#[tokio::test]
async fn invalid_records_are_rejected_without_storing() {
    let h = Harness::new();
    let cookie = h.register("alice", "s3cret").await;

    for body in [
        json!({ "weight": 0.0, "time_after_meal": 1.0 }),
        json!({ "weight": 120.0, "time_after_meal": 1.0 }),
        json!({ "weight": 70.0, "time_after_meal": 5.0 }),
    ] {
        let (status, _, _) = h.send("POST", "/records", Some(&cookie), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (_, _, listed) = h.send("GET", "/records", Some(&cookie), None).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn records_cannot_be_changed_by_the_other_user() {
    let h = Harness::new();
    let alice = h.register("alice", "a").await;
    let bob = h.register("bob", "b").await;

    let (_, _, created) = h
        .send(
            "POST",
            "/records",
            Some(&alice),
            Some(json!({ "weight": 70.0, "time_after_meal": 2.0 })),
        )
        .await;
    let uri = format!("/records/{}", created["id"].as_str().unwrap());

    let (status, _, _) = h.send("DELETE", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = h.send("DELETE", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = h.send("DELETE", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn protected_routes_require_a_logged_in_session() {
    let h = Harness::new();
    let (status, _, _) = h.send("GET", "/dashboard", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = h
        .send("GET", "/records", Some("session=not-a-session"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let cookie = h.register("alice", "pw").await;
    let (status, _, _) = h.send("POST", "/auth/logout", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = h.send("GET", "/records", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

//=========================================================================================
// Registration and Login
//=========================================================================================

#[tokio::test]
async fn registration_is_limited_to_configured_identities_and_happens_once() {
    let h = Harness::new();
    let (status, _, _) = h
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "identity": "mallory", "password": "x" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    h.register("alice", "first").await;
    let (status, _, _) = h
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "identity": "alice", "password": "second" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn three_failures_lock_the_identity_until_expiry() {
    let h = Harness::new();
    h.register("alice", "right").await;

    let wrong = json!({ "identity": "alice", "password": "wrong" });
    let right = json!({ "identity": "alice", "password": "right" });

    let (status, cookie, body) = h.send("POST", "/auth/login", None, Some(wrong.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!("Incorrect password. Attempts remaining: 2"));
    let cookie = cookie.expect("first attempt mints a session");

    let (status, _, _) = h.send("POST", "/auth/login", Some(&cookie), Some(wrong.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = h.send("POST", "/auth/login", Some(&cookie), Some(wrong)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!("Account locked. Please try again in 15 minutes."));

    // The right password is still refused while locked.
    h.clock.advance(Duration::minutes(5));
    let (status, _, body) = h.send("POST", "/auth/login", Some(&cookie), Some(right.clone())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!("Account locked. Please try again in 10 minutes."));

    let (_, _, status_body) = h.send("GET", "/auth/status", Some(&cookie), None).await;
    assert_eq!(status_body["identities"][0]["locked"], json!(true));
    assert_eq!(status_body["identities"][1]["locked"], json!(false));

    h.clock.advance(Duration::minutes(10));
    let (status, _, body) = h.send("POST", "/auth/login", Some(&cookie), Some(right)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identity"], json!("alice"));
}

#[tokio::test]
async fn success_finishing_after_a_parallel_lockout_is_refused() {
    let directory = Arc::new(GatedDirectory::new());
    let h = Harness::with_stores(Arc::new(MemoryAdapter::new()), directory.clone());
    h.register("alice", "right").await;

    let cookie = "session=shared-browser";
    let wrong = json!({ "identity": "alice", "password": "wrong" });

    // The correct password is admitted while alice is open, then held in the lookup.
    let app = h.app.clone();
    let pending = tokio::spawn(async move {
        call(
            app,
            "POST",
            "/auth/login",
            Some(cookie),
            Some(json!({ "identity": "alice", "password": "right" })),
        )
        .await
    });
    directory.entered.notified().await;

    for expected in [
        StatusCode::UNAUTHORIZED,
        StatusCode::UNAUTHORIZED,
        StatusCode::TOO_MANY_REQUESTS,
    ] {
        let (status, _, _) = h.send("POST", "/auth/login", Some(cookie), Some(wrong.clone())).await;
        assert_eq!(status, expected);
    }

    directory.release.notify_one();
    let (status, _, body) = pending.await.unwrap();
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!("Account locked. Please try again in 15 minutes."));

    let (_, _, session) = h.send("GET", "/auth/status", Some(cookie), None).await;
    assert_eq!(session["logged_in"], json!(false));
    assert_eq!(session["identities"][0]["locked"], json!(true));
    let (status, _, _) = h.send("GET", "/records", Some(cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn inactivity_times_the_session_out() {
    let h = Harness::new();
    let cookie = h.register("alice", "pw").await;

    h.clock.advance(Duration::minutes(20));
    let (status, _, _) = h.send("GET", "/dashboard", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);

    h.clock.advance(Duration::minutes(31));
    let (status, _, _) = h.send("GET", "/dashboard", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, _, body) = h.send("GET", "/auth/status", Some(&cookie), None).await;
    assert_eq!(body["logged_in"], json!(false));
    assert_eq!(body["timed_out"], json!(true));
    assert_eq!(body["identities"][0]["registered"], json!(true));
    assert_eq!(body["identities"][1]["registered"], json!(false));

    let (_, _, body) = h.send("GET", "/auth/status", Some(&cookie), None).await;
    assert_eq!(body["timed_out"], json!(false));
}

//=========================================================================================
// Dashboard
//=========================================================================================

#[tokio::test]
async fn dashboard_overlays_both_users_with_forecast() {
    let h = Harness::new();
    let alice = h.register("alice", "a").await;
    let bob = h.register("bob", "b").await;

    for day in 1..=6 {
        let body = json!({
            "weight": 70.0 - 0.2 * f64::from(day),
            "time_after_meal": 1.5,
            "timestamp": format!("2024-01-{:02}T07:30:00+09:00", day + 20)
        });
        let (status, _, _) = h.send("POST", "/records", Some(&alice), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _, _) = h
        .send(
            "POST",
            "/records",
            Some(&bob),
            Some(json!({
                "weight": 60.0,
                "time_after_meal": 3.0,
                "timestamp": "2024-01-29T21:00:00+09:00"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = h
        .send(
            "GET",
            "/dashboard?start=2024-01-01&end=2024-01-31&forecast=true",
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let labels: Vec<&str> = body["chart"]["series"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["alice", "alice (forecast)", "bob"]);

    let forecast = &body["chart"]["series"][1];
    assert_eq!(forecast["style"]["dash"], json!("dash"));
    assert_eq!(forecast["points"].as_array().unwrap().len(), 31);

    // Only bob's own records are editable on his page.
    assert_eq!(body["records"].as_array().unwrap().len(), 1);
    assert_eq!(body["records"][0]["meal_label"], json!("3 h"));
    assert_eq!(body["meal_intervals"].as_array().unwrap().len(), 7);
    assert_eq!(body["window_start"], json!("2024-01-01T00:00:00+09:00"));
}

#[tokio::test]
async fn dashboard_degrades_to_a_notice_when_a_history_cannot_be_loaded() {
    let records = Arc::new(BrokenFor {
        inner: MemoryAdapter::new(),
        user_key: "bob",
    });
    let h = Harness::with_stores(records, Arc::new(MemoryAdapter::new()));
    let cookie = h.register("alice", "pw").await;

    let (status, _, _) = h
        .send(
            "POST",
            "/records",
            Some(&cookie),
            Some(json!({
                "weight": 68.4,
                "time_after_meal": 0.5,
                "timestamp": "2024-01-30T08:00:00+09:00"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = h.send("GET", "/dashboard", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notices"], json!(["Could not load records for bob"]));

    let series = body["chart"]["series"].as_array().unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0]["label"], json!("alice"));
    assert_eq!(series[0]["style"]["color"], json!("blue"));
    assert_eq!(body["records"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn dashboard_rejects_reversed_window() {
    let h = Harness::new();
    let cookie = h.register("alice", "pw").await;
    let (status, _, _) = h
        .send("GET", "/dashboard?start=2024-02-01&end=2024-01-01", Some(&cookie), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
