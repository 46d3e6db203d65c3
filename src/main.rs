use std::{collections::HashMap, time::Duration};

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use chrono::{DateTime, Local};
use fire_limit::{debounce, throttle, Debounced, Limiter, Throttled};
use tokio::net::TcpListener;
use tracing::info;

const ADDR: &str = "0.0.0.0:8080";
const DEBOUNCE_DELAY: Duration = Duration::from_secs(1);
const THROTTLE_THRESHOLD: Duration = Duration::from_secs(1);

type Fired = DateTime<Local>;

#[derive(Clone)]
struct AppState {
    debounced: Debounced<&'static str, String, Fired>,
    throttled: Throttled<&'static str, String, Fired>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let shared_state = AppState {
        debounced: debounce(fire, DEBOUNCE_DELAY, false, Some("debounced"))?,
        throttled: throttle(fire, THROTTLE_THRESHOLD, true, Some("throttled"))?,
    };

    let app = Router::new()
        .route("/debounced", get(debounced))
        .route("/throttled", get(throttled))
        .route("/unlimited", get(unlimited))
        .with_state(shared_state);

    let listener = TcpListener::bind(ADDR).await?;
    info!(addr = ADDR, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn fire(scope: &'static str, id: String) -> Fired {
    let now = Local::now();
    info!(scope, id = %id, at = %now, "callback fired");
    now
}

async fn debounced(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    hit(&state.debounced, params)
}

async fn throttled(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    hit(&state.throttled, params)
}

fn hit<L>(limiter: &L, params: HashMap<String, String>) -> (StatusCode, String)
where
    L: Limiter<&'static str, String, Output = Fired>,
{
    let Some(id) = params.get("id") else {
        return (StatusCode::BAD_REQUEST, "missing id".to_string());
    };

    match limiter.invoke("", id.clone()) {
        Some(at) => (StatusCode::OK, format!("last fired at {}", at.to_rfc3339())),
        None if limiter.is_pending() => (StatusCode::ACCEPTED, "firing scheduled".to_string()),
        None => (StatusCode::OK, "not fired yet".to_string()),
    }
}

async fn unlimited() -> &'static str {
    "Unlimited! Let's Go!"
}
