//! Integration test harness for the EV Charge client.
//!
//! [`MockApi`] is an in-process axum server speaking the charging-station API
//! under `/api`. It issues rotating token pairs, records every request it
//! sees, and exposes switches for the failure modes the client must survive:
//! expired access tokens, rejected refresh tokens, slow refreshes, a failing
//! profile endpoint, and an endpoint that rejects every access token.
//!
//! ```rust,ignore
//! let api = MockApi::start().await;
//! let client = api.client();
//! client.session().login(&email, &password).await?;
//! api.expire_access_tokens();
//! client.reservations().list().await?; // refreshes once, then retries
//! assert_eq!(api.refresh_calls(), 1);
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode, header::AUTHORIZATION};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use evcharge_client::{ClientConfig, EvChargeClient, MemoryTokenStorage, TokenStorage};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;

/// Password accepted for every seeded account.
pub const PASSWORD: &str = "correct-horse";
/// Seeded driver account.
pub const DRIVER_EMAIL: &str = "driver@example.com";
/// Seeded admin account (role `Admin`).
pub const ADMIN_EMAIL: &str = "admin@example.com";
/// Email that registration always reports as taken.
pub const TAKEN_EMAIL: &str = "taken@example.com";

/// A request as the mock server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: Method,
    /// Path without the `/api` prefix, e.g. `/reservations/getall`.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// `Authorization` header value.
    pub authorization: Option<String>,
    /// `Content-Type` header value.
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
struct MockUser {
    id: i64,
    email: String,
    password: String,
    username: String,
    role: String,
}

#[derive(Debug, Clone)]
struct StoredReservation {
    id: i64,
    owner: i64,
    body: Value,
}

#[derive(Default)]
struct Store {
    users: Vec<MockUser>,
    /// access token -> user id
    access: HashMap<String, i64>,
    /// refresh token -> user id
    refresh: HashMap<String, i64>,
    next_token: u64,
    reservations: Vec<StoredReservation>,
    next_reservation: i64,
    stations: Vec<(i64, String)>,
    requests: Vec<RecordedRequest>,
}

impl Store {
    fn issue_tokens(&mut self, user_id: i64) -> (String, String) {
        self.next_token += 1;
        let access = format!("at-{}", self.next_token);
        let refresh = format!("rt-{}", self.next_token);
        self.access.insert(access.clone(), user_id);
        self.refresh.insert(refresh.clone(), user_id);
        (access, refresh)
    }

    fn user(&self, id: i64) -> Option<&MockUser> {
        self.users.iter().find(|u| u.id == id)
    }
}

struct MockState {
    store: Mutex<Store>,
    refresh_calls: AtomicUsize,
    refresh_delay: Mutex<Duration>,
    reject_all_access: AtomicBool,
    fail_profile: AtomicBool,
}

impl MockState {
    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap()
    }
}

/// In-process mock of the charging-station API.
pub struct MockApi {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl MockApi {
    /// Bind to an ephemeral port on localhost and start serving.
    pub async fn start() -> Self {
        let store = Store {
            users: vec![
                MockUser {
                    id: 7,
                    email: DRIVER_EMAIL.to_string(),
                    password: PASSWORD.to_string(),
                    username: "volt".to_string(),
                    role: "user".to_string(),
                },
                MockUser {
                    id: 1,
                    email: ADMIN_EMAIL.to_string(),
                    password: PASSWORD.to_string(),
                    username: "ops".to_string(),
                    role: "Admin".to_string(),
                },
            ],
            stations: vec![(1, "North_Lot".to_string()), (2, "Depot".to_string())],
            next_reservation: 100,
            ..Store::default()
        };

        let state = Arc::new(MockState {
            store: Mutex::new(store),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay: Mutex::new(Duration::ZERO),
            reject_all_access: AtomicBool::new(false),
            fail_profile: AtomicBool::new(false),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Base URL the client should be configured with.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/api", self.addr)).unwrap()
    }

    /// Client configuration pointing at this server.
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.base_url());
        config.http_timeout = Duration::from_secs(5);
        config
    }

    /// A client with fresh in-memory token storage.
    #[must_use]
    pub fn client(&self) -> EvChargeClient {
        self.client_with_storage(Arc::new(MemoryTokenStorage::new()))
    }

    /// A client over the given token storage.
    #[must_use]
    pub fn client_with_storage(&self, storage: Arc<dyn TokenStorage>) -> EvChargeClient {
        EvChargeClient::with_storage(&self.config(), storage).unwrap()
    }

    /// Issue a valid refresh token for a seeded account, as if from an
    /// earlier run.
    #[must_use]
    pub fn issue_refresh_token(&self, email: &str) -> String {
        let mut store = self.state.store();
        let id = store.users.iter().find(|u| u.email == email).unwrap().id;
        store.issue_tokens(id).1
    }

    /// Number of `/auth/refresh` calls received.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.store().requests.clone()
    }

    /// Requests received for one path.
    #[must_use]
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Invalidate every access token; refresh tokens stay valid.
    pub fn expire_access_tokens(&self) {
        self.state.store().access.clear();
    }

    /// Invalidate every refresh token.
    pub fn revoke_refresh_tokens(&self) {
        self.state.store().refresh.clear();
    }

    /// Answer 401 to every authenticated request while set.
    pub fn set_reject_all_access(&self, reject: bool) {
        self.state.reject_all_access.store(reject, Ordering::SeqCst);
    }

    /// Delay every refresh response.
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock().unwrap() = delay;
    }

    /// Answer 500 from the profile endpoint while set.
    pub fn set_fail_profile(&self, fail: bool) {
        self.state.fail_profile.store(fail, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routes
// ─────────────────────────────────────────────────────────────────────────────

type AppState = State<Arc<MockState>>;

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/forgotpass", post(forgot_password))
        .route("/api/users/profile", get(profile))
        .route("/api/users/profile/changeusername", post(change_username))
        .route("/api/users/profile/changepass", post(change_password))
        .route("/api/reservations/book", post(book_reservation))
        .route("/api/reservations/getall", get(list_reservations))
        .route("/api/reservations/cancel/{id}", delete(cancel_reservation))
        .route("/api/stations/free", get(free_stations))
        .route("/api/gas-stations/book", post(book_station))
        .route("/api/admin/stations", get(admin_stations))
        .route("/api/admin/stations/add", post(admin_add_station))
        .route("/api/admin/stations/delete/{name}", delete(admin_delete_station))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

async fn record(State(state): AppState, request: Request, next: Next) -> Response {
    let recorded = {
        let header = |name| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let path = request.uri().path();
        RecordedRequest {
            method: request.method().clone(),
            path: path.strip_prefix("/api").unwrap_or(path).to_string(),
            query: request.uri().query().map(str::to_string),
            authorization: header(AUTHORIZATION.as_str()),
            content_type: header("content-type"),
        }
    };
    state.store().requests.push(recorded);
    next.run(request).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, message.to_string()).into_response()
}

fn auth_body(user: &MockUser, access: &str, refresh: &str) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_at": 1_900_000_000,
        "expires_in": "3600",
        "token_type": "bearer",
        "user": {
            "id": user.id,
            "email": user.email,
            "created_at": "2024-05-01T10:00:00Z"
        }
    })
}

/// Resolve the bearer token to a user, or answer 401.
fn authorize(state: &MockState, headers: &HeaderMap) -> Result<MockUser, Response> {
    let unauthorized = || error(StatusCode::UNAUTHORIZED, "Invalid or expired token");
    if state.reject_all_access.load(Ordering::SeqCst) {
        return Err(unauthorized());
    }

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(unauthorized)?;

    let store = state.store();
    store
        .access
        .get(token)
        .and_then(|id| store.user(*id))
        .cloned()
        .ok_or_else(unauthorized)
}

fn require_admin(state: &MockState, headers: &HeaderMap) -> Result<MockUser, Response> {
    let user = authorize(state, headers)?;
    if user.role.eq_ignore_ascii_case("admin") {
        Ok(user)
    } else {
        Err(error(StatusCode::FORBIDDEN, "Admin role required"))
    }
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(state): AppState, Json(body): Json<LoginBody>) -> Response {
    let mut store = state.store();
    let Some(user) = store
        .users
        .iter()
        .find(|u| u.email == body.email && u.password == body.password)
        .cloned()
    else {
        return error(StatusCode::UNAUTHORIZED, "Invalid login credentials");
    };
    let (access, refresh) = store.issue_tokens(user.id);
    Json(auth_body(&user, &access, &refresh)).into_response()
}

#[derive(Deserialize)]
struct RegisterBody {
    email: String,
    password: String,
    username: String,
}

async fn register(State(state): AppState, Json(body): Json<RegisterBody>) -> Response {
    let mut store = state.store();
    if body.email == TAKEN_EMAIL || store.users.iter().any(|u| u.email == body.email) {
        return error(StatusCode::CONFLICT, "User already registered");
    }

    let user = MockUser {
        id: store.users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
        email: body.email,
        password: body.password,
        username: body.username,
        role: "user".to_string(),
    };
    store.users.push(user.clone());
    let (access, refresh) = store.issue_tokens(user.id);
    Json(auth_body(&user, &access, &refresh)).into_response()
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

async fn refresh(State(state): AppState, Json(body): Json<RefreshBody>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut store = state.store();
    // Refresh tokens are single use
    let Some(user_id) = store.refresh.remove(&body.refresh_token) else {
        return error(StatusCode::UNAUTHORIZED, "Invalid refresh token");
    };
    let Some(user) = store.user(user_id).cloned() else {
        return error(StatusCode::UNAUTHORIZED, "Unknown user");
    };
    let (access, refresh) = store.issue_tokens(user.id);
    Json(auth_body(&user, &access, &refresh)).into_response()
}

#[derive(Deserialize)]
struct ForgotBody {
    email: String,
}

async fn forgot_password(Json(body): Json<ForgotBody>) -> Response {
    Json(json!({ "message": format!("Reset link sent to {}", body.email) })).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileQuery {
    supabase_id: i64,
}

async fn profile(
    State(state): AppState,
    headers: HeaderMap,
    Query(query): Query<ProfileQuery>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    if state.fail_profile.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Profile service unavailable");
    }
    if user.id != query.supabase_id {
        return error(StatusCode::FORBIDDEN, "Not your profile");
    }
    Json(json!({ "username": user.username, "role": user.role })).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeUsernameBody {
    new_username: String,
}

async fn change_username(
    State(state): AppState,
    headers: HeaderMap,
    Json(body): Json<ChangeUsernameBody>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    if body.new_username.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "Username cannot be empty");
    }
    let mut store = state.store();
    if let Some(u) = store.users.iter_mut().find(|u| u.id == user.id) {
        u.username = body.new_username;
    }
    Json(json!({ "data": null, "message": "Username updated" })).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordBody {
    new_password: String,
}

async fn change_password(
    State(state): AppState,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordBody>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let mut store = state.store();
    if let Some(u) = store.users.iter_mut().find(|u| u.id == user.id) {
        u.password = body.new_password;
    }
    // Empty body on success
    StatusCode::OK.into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservationBody {
    seq_num: u32,
    title: String,
    start: i64,
    duration: String,
}

async fn book_reservation(
    State(state): AppState,
    headers: HeaderMap,
    Json(body): Json<ReservationBody>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    if !body.duration.starts_with("PT") {
        return error(StatusCode::BAD_REQUEST, "Duration must be ISO 8601");
    }

    let mut store = state.store();
    store.next_reservation += 1;
    let id = store.next_reservation;
    let stored = json!({
        "id": id,
        "seqNum": body.seq_num,
        "title": body.title,
        "start": body.start,
        "duration": body.duration,
    });
    store.reservations.push(StoredReservation {
        id,
        owner: user.id,
        body: stored.clone(),
    });
    Json(json!({ "data": stored, "message": "Reservation created" })).into_response()
}

async fn list_reservations(State(state): AppState, headers: HeaderMap) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let store = state.store();
    let mine: Vec<Value> = store
        .reservations
        .iter()
        .filter(|r| r.owner == user.id)
        .map(|r| r.body.clone())
        .collect();
    Json(mine).into_response()
}

async fn cancel_reservation(
    State(state): AppState,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let mut store = state.store();
    let before = store.reservations.len();
    store
        .reservations
        .retain(|r| !(r.id == id && r.owner == user.id));
    if store.reservations.len() == before {
        return error(StatusCode::NOT_FOUND, "Reservation not found");
    }
    Json(json!({ "data": null, "message": "Reservation cancelled" })).into_response()
}

#[derive(Deserialize)]
struct FreeQuery {
    timestamp: i64,
}

/// Open to anonymous callers, but a bearer token that is sent must be valid.
async fn free_stations(
    State(state): AppState,
    headers: HeaderMap,
    Query(query): Query<FreeQuery>,
) -> Response {
    if let Some(Err(rejected)) = headers
        .contains_key(AUTHORIZATION)
        .then(|| authorize(&state, &headers))
    {
        return rejected;
    }
    // Odd hours have nothing free
    if (query.timestamp / 3600) % 2 == 1 {
        return Json(json!([])).into_response();
    }
    Json(json!([
        { "id": 1, "title": "North Lot", "latitude": 52.52, "longitude": 13.405, "active": true },
        { "id": 2, "title": "Depot", "latitude": 52.5, "longitude": 13.39, "active": false }
    ]))
    .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookStationQuery {
    start_time: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookStationBody {
    gas_station_id: i64,
}

async fn book_station(
    State(state): AppState,
    headers: HeaderMap,
    Query(query): Query<BookStationQuery>,
    Json(body): Json<BookStationBody>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    Json(json!({
        "data": null,
        "message": format!("Station {} booked from {}", body.gas_station_id, query.start_time)
    }))
    .into_response()
}

async fn admin_stations(State(state): AppState, headers: HeaderMap) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    let store = state.store();
    let stations: Vec<Value> = store
        .stations
        .iter()
        .map(|(id, name)| json!({ "id": id, "stationName": name }))
        .collect();
    Json(stations).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddStationBody {
    title: String,
    connector_count: u32,
    latitude: f64,
    longitude: f64,
}

async fn admin_add_station(
    State(state): AppState,
    headers: HeaderMap,
    Json(body): Json<AddStationBody>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    if body.connector_count == 0
        || !(-90.0..=90.0).contains(&body.latitude)
        || !(-180.0..=180.0).contains(&body.longitude)
    {
        return error(StatusCode::BAD_REQUEST, "Invalid station");
    }

    let mut store = state.store();
    let name = body.title.replace(' ', "_");
    if store.stations.iter().any(|(_, n)| *n == name) {
        return error(StatusCode::CONFLICT, "Station already exists");
    }
    let id = store.stations.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1;
    store.stations.push((id, name));
    Json(json!({ "data": null, "message": "Station added" })).into_response()
}

async fn admin_delete_station(
    State(state): AppState,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    let mut store = state.store();
    let before = store.stations.len();
    store.stations.retain(|(_, n)| *n != name);
    if store.stations.len() == before {
        return error(StatusCode::NOT_FOUND, "Station not found");
    }
    Json(json!({ "data": null, "message": "Station deleted" })).into_response()
}
