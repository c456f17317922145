//! In-process stand-in for the TeleCareZone API, used by the runner tests.
//!
//! Implements just enough of the contract to drive the built-in suite: a
//! fixed admin login, onboarding, approval, appointments and payment orders,
//! with bearer checks on the admin routes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::routing::get;
use axum::routing::post;
use serde_json::Value;
use serde_json::json;

type Reply = (StatusCode, Json<Value>);

#[derive(Default)]
struct Store {
    professionals: Vec<Value>,
    appointments: Vec<Value>,
}

#[derive(Default)]
struct Backend {
    hits: AtomicUsize,
    store: Mutex<Store>,
}

impl Backend {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap()
    }
}

pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<Backend>,
}

impl FakeBackend {
    pub const TOKEN: &'static str = "fake-admin-token";
    pub const SLOW_REPLY: Duration = Duration::from_secs(3);

    pub async fn start() -> Self {
        let state = Arc::new(Backend::default());

        let app = Router::new()
            .route("/api/", get(root))
            .route("/api/admin/create-default", post(create_default_admin))
            .route("/api/admin/login", post(login))
            .route("/api/onboarding/submit", post(submit_onboarding))
            .route("/api/professionals", get(list_professionals))
            .route("/api/professionals/approved", get(approved_professionals))
            .route(
                "/api/professionals/{id}",
                get(get_professional).put(update_professional),
            )
            .route("/api/public/professional/{subdomain}", get(by_subdomain))
            .route("/api/appointments", post(create_appointment))
            .route("/api/appointments/{id}", get(get_appointment))
            .route("/api/payments/create-order", post(create_order))
            .route("/api/admin/analytics/overview", get(platform_analytics))
            .route("/api/admin/analytics/{id}", get(professional_analytics))
            .route("/api/slow", get(slow))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Number of requests that reached a handler.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

fn authorized(headers: &HeaderMap) -> Result<(), Reply> {
    let expected = format!("Bearer {}", FakeBackend::TOKEN);
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Not authenticated"})),
        )),
    }
}

fn not_found(what: &str) -> Reply {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"detail": format!("{what} not found")})),
    )
}

fn find<'a>(items: &'a [Value], key: &str, value: &str) -> Option<&'a Value> {
    items.iter().find(|item| item[key] == value)
}

/// Answers well after any timeout the runner tests configure.
async fn slow(State(s): State<Arc<Backend>>) -> Reply {
    s.hit();
    tokio::time::sleep(FakeBackend::SLOW_REPLY).await;
    (StatusCode::OK, Json(json!({"message": "late"})))
}

async fn root(State(s): State<Arc<Backend>>) -> Reply {
    s.hit();
    (StatusCode::OK, Json(json!({"message": "TeleCareZone API"})))
}

async fn create_default_admin(State(s): State<Arc<Backend>>) -> Reply {
    s.hit();
    (StatusCode::OK, Json(json!({"message": "Default admin ready"})))
}

async fn login(State(s): State<Arc<Backend>>, Json(body): Json<Value>) -> Reply {
    s.hit();
    if body["username"] == "admin" && body["password"] == "admin123" {
        (
            StatusCode::OK,
            Json(json!({"access_token": FakeBackend::TOKEN, "token_type": "bearer"})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid credentials"})),
        )
    }
}

async fn submit_onboarding(State(s): State<Arc<Backend>>, Json(mut body): Json<Value>) -> Reply {
    s.hit();
    let mut store = s.store();
    let id = format!("prof-{}", store.professionals.len() + 1);
    let subdomain = format!(
        "{}{}",
        body["first_name"].as_str().unwrap_or_default(),
        body["last_name"].as_str().unwrap_or_default()
    )
    .to_lowercase();

    body["id"] = json!(id);
    body["subdomain"] = json!(subdomain);
    body["status"] = json!("pending");
    store.professionals.push(body.clone());

    (StatusCode::OK, Json(body))
}

async fn list_professionals(
    State(s): State<Arc<Backend>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Reply {
    s.hit();
    if let Err(reply) = authorized(&headers) {
        return reply;
    }

    let store = s.store();
    let listed: Vec<&Value> = store
        .professionals
        .iter()
        .filter(|p| query.get("status").is_none_or(|status| p["status"] == status.as_str()))
        .collect();

    (StatusCode::OK, Json(json!(listed)))
}

async fn approved_professionals(State(s): State<Arc<Backend>>) -> Reply {
    s.hit();
    let store = s.store();
    let approved: Vec<&Value> = store
        .professionals
        .iter()
        .filter(|p| p["status"] == "approved")
        .collect();

    (StatusCode::OK, Json(json!(approved)))
}

async fn get_professional(
    State(s): State<Arc<Backend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    s.hit();
    if let Err(reply) = authorized(&headers) {
        return reply;
    }

    match find(&s.store().professionals, "id", &id) {
        Some(p) => (StatusCode::OK, Json(p.clone())),
        None => not_found("Professional"),
    }
}

async fn update_professional(
    State(s): State<Arc<Backend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<Value>,
) -> Reply {
    s.hit();
    if let Err(reply) = authorized(&headers) {
        return reply;
    }

    let mut store = s.store();
    let Some(professional) = store.professionals.iter_mut().find(|p| p["id"] == id.as_str())
    else {
        return not_found("Professional");
    };

    if let Some(status) = update.get("status") {
        professional["status"] = status.clone();
    }

    (StatusCode::OK, Json(professional.clone()))
}

async fn by_subdomain(State(s): State<Arc<Backend>>, Path(subdomain): Path<String>) -> Reply {
    s.hit();
    match find(&s.store().professionals, "subdomain", &subdomain) {
        Some(p) => (StatusCode::OK, Json(p.clone())),
        None => not_found("Professional"),
    }
}

async fn create_appointment(State(s): State<Arc<Backend>>, Json(mut body): Json<Value>) -> Reply {
    s.hit();
    let mut store = s.store();
    let professional_id = body["professional_id"].as_str().unwrap_or_default().to_string();
    if find(&store.professionals, "id", &professional_id).is_none() {
        return not_found("Professional");
    }

    let id = format!("appt-{}", store.appointments.len() + 1);
    body["id"] = json!(id);
    body["payment_status"] = json!("pending");
    body["status"] = json!("scheduled");
    store.appointments.push(body.clone());

    (StatusCode::OK, Json(body))
}

async fn get_appointment(State(s): State<Arc<Backend>>, Path(id): Path<String>) -> Reply {
    s.hit();
    match find(&s.store().appointments, "id", &id) {
        Some(a) => (StatusCode::OK, Json(a.clone())),
        None => not_found("Appointment"),
    }
}

async fn create_order(
    State(s): State<Arc<Backend>>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    s.hit();
    let Some(appointment_id) = query.get("appointment_id") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "appointment_id is required"})),
        );
    };

    match find(&s.store().appointments, "id", appointment_id) {
        Some(_) => (
            StatusCode::OK,
            Json(json!({
                "order_id": format!("order_{appointment_id}"),
                "amount": 150000,
                "currency": "INR",
            })),
        ),
        None => not_found("Appointment"),
    }
}

async fn platform_analytics(State(s): State<Arc<Backend>>, headers: HeaderMap) -> Reply {
    s.hit();
    if let Err(reply) = authorized(&headers) {
        return reply;
    }

    let store = s.store();
    (
        StatusCode::OK,
        Json(json!({
            "total_professionals": store.professionals.len(),
            "total_appointments": store.appointments.len(),
        })),
    )
}

async fn professional_analytics(
    State(s): State<Arc<Backend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    s.hit();
    if let Err(reply) = authorized(&headers) {
        return reply;
    }

    let store = s.store();
    let total = store
        .appointments
        .iter()
        .filter(|a| a["professional_id"] == id.as_str())
        .count();

    (
        StatusCode::OK,
        Json(json!({"professional_id": id, "total_appointments": total})),
    )
}
