fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("3600"),
    );
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

/// Authorization runs before any engine call so an unauthorized trigger has
/// no side effects at all.
fn require_trigger_auth(headers: &HeaderMap, auth: &TriggerAuth) -> Result<(), HttpApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if auth.authorize(header) {
        Ok(())
    } else {
        Err(HttpApiError::unauthorized())
    }
}

fn clamp_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .max(1)
        .min(MAX_LIST_LIMIT)
}

fn require_address(raw: &str) -> Result<(), HttpApiError> {
    let trimmed = raw.trim();
    if trimmed.len() >= 3 && trimmed.starts_with("0x") {
        Ok(())
    } else {
        Err(HttpApiError::invalid_query(
            "expected a 0x-prefixed wallet address",
            Some(format!("address={raw}")),
        ))
    }
}

/// Maps a concrete request path to the quoted route that gates it. The quote
/// path is the claim key, so one payment opens exactly one logical route.
fn gated_route_key(gate: &GateConfig, path: &str) -> Option<String> {
    gate.routes
        .iter()
        .find(|route| path == route.path || path.starts_with(&format!("{}/", route.path)))
        .map(|route| route.path.clone())
}
