use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use contracts::{
    ApiError, ErrorCode, MostWantedEntry, RouteQuote, CURSOR_INDEXER, CURSOR_NEWS, CURSOR_QUESTS,
    SCHEMA_VERSION_V1,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use warband_core::indexer::{ChainIndexer, IndexError, JsonlLogSource, LogSource};
use warband_core::news::NewsGenerator;
use warband_core::payment::{self, GateConfig, GateDecision, PaymentError};
use warband_core::quests::QuestEngine;
use warband_core::store::{SqliteLedgerStore, StoreError};
use warband_core::views;

const DEFAULT_LIST_LIMIT: usize = 25;
const MAX_LIST_LIMIT: usize = 100;
const DEFAULT_WINDOW_HOURS: u64 = 24;
const DEFAULT_CLAN_DEPTH: u64 = 3;
const DEFAULT_SQLITE_PATH: &str = "warband_ledger.sqlite";
const DEFAULT_RELAY_PATH: &str = "warband_relay.jsonl";
const PAYMENT_HEADER: &str = "x-payment";

include!("error.rs");
include!("state.rs");
include!("routes/jobs.rs");
include!("routes/views.rs");
include!("routes/paid.rs");
include!("util.rs");

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub sqlite_path: String,
    pub relay_path: String,
    pub trigger_secret: Option<String>,
    pub debug_bypass: bool,
    pub gate: GateConfig,
}

impl ServerConfig {
    pub fn from_env(addr: SocketAddr) -> Self {
        let env_string = |key: &str, fallback: &str| {
            std::env::var(key)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };

        Self {
            addr,
            sqlite_path: env_string("WARBAND_SQLITE_PATH", DEFAULT_SQLITE_PATH),
            relay_path: env_string("WARBAND_RELAY_PATH", DEFAULT_RELAY_PATH),
            trigger_secret: std::env::var("WARBAND_TRIGGER_SECRET")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            debug_bypass: std::env::var("WARBAND_DEBUG_BYPASS")
                .map(|value| value == "1")
                .unwrap_or(false),
            gate: GateConfig {
                receiver: env_string(
                    "WARBAND_PAY_RECEIVER",
                    "0x0000000000000000000000000000000000000000",
                ),
                network: env_string("WARBAND_PAY_NETWORK", "base"),
                routes: vec![
                    RouteQuote {
                        path: "/api/v1/raids/suggest".to_string(),
                        price: 0.002,
                        description: "raid target suggestion".to_string(),
                    },
                    RouteQuote {
                        path: "/api/v1/intel".to_string(),
                        price: 0.001,
                        description: "per-address intel dossier".to_string(),
                    },
                ],
            },
        }
    }
}

pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    let addr = config.addr;
    let state = AppState::new(config)?;
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let paid = Router::new()
        .route("/api/v1/raids/suggest", get(get_raid_suggestion))
        .route("/api/v1/intel/{address}", get(get_intel_dossier))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            payment_gate_middleware,
        ));

    Router::new()
        .route("/api/v1/jobs/index", get(run_index_job))
        .route("/api/v1/jobs/quests", get(run_quests_job))
        .route("/api/v1/jobs/news", get(run_news_job))
        .route("/api/v1/leaderboard", get(get_leaderboard))
        .route("/api/v1/most-wanted", get(get_most_wanted))
        .route("/api/v1/clans/{address}/tree", get(get_clan_tree))
        .route("/api/v1/revenue/summary", get(get_revenue_summary))
        .route("/api/v1/users/{address}/quests", get(get_user_quests))
        .route("/api/v1/news", get(get_news))
        .route("/api/v1/status", get(get_status))
        .merge(paid)
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests;
