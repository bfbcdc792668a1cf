/// Gate in front of the paid sub-router. No proof header quotes the price
/// list with 402 and never invokes the handler; a proof is parsed, verified,
/// and claimed atomically before the handler runs.
async fn payment_gate_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let proof_header = request
        .headers()
        .get(PAYMENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let Some(route_key) = gated_route_key(&state.gate, &path) else {
        // A route reached this middleware without a quote: configuration bug,
        // fail closed with the price list.
        return (
            StatusCode::PAYMENT_REQUIRED,
            Json(state.gate.requirements()),
        )
            .into_response();
    };

    let decision = {
        let inner = state.inner.lock().await;
        payment::evaluate_request(
            &inner.store,
            &state.gate,
            &route_key,
            proof_header.as_deref(),
            now_unix(),
        )
    };

    match decision {
        GateDecision::Quote(requirements) => {
            (StatusCode::PAYMENT_REQUIRED, Json(requirements)).into_response()
        }
        GateDecision::Rejected(err) => {
            tracing::warn!(route = %route_key, error = %err, "payment rejected");
            HttpApiError::from_payment(err).into_response()
        }
        GateDecision::Paid(receipt) => {
            tracing::info!(route = %receipt.route, tx_hash = %receipt.tx_hash, "payment accepted");
            next.run(request).await
        }
    }
}

#[derive(Debug, Deserialize)]
struct RaidSuggestionQuery {
    address: String,
    window_hours: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RaidSuggestionResponse {
    schema_version: String,
    suggestion: contracts::RaidSuggestion,
}

async fn get_raid_suggestion(
    State(state): State<AppState>,
    Query(query): Query<RaidSuggestionQuery>,
) -> Result<Json<RaidSuggestionResponse>, HttpApiError> {
    require_address(&query.address)?;
    let window_hours = query.window_hours.unwrap_or(DEFAULT_WINDOW_HOURS);

    let inner = state.inner.lock().await;
    let suggestion = views::suggest_raid_target(
        &inner.store,
        &query.address,
        window_hours,
        now_unix(),
        &views::FeeWeightedScoring,
    )
    .map_err(HttpApiError::from_store)?;

    let Some(suggestion) = suggestion else {
        return Err(HttpApiError::not_found(
            "no raid target in the requested window",
            Some(format!("window_hours={window_hours}")),
        ));
    };

    Ok(Json(RaidSuggestionResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        suggestion,
    }))
}

#[derive(Debug, Serialize)]
struct IntelDossierResponse {
    schema_version: String,
    wallet_address: String,
    threat: Option<MostWantedEntry>,
    raid_pulse: contracts::RaidPulse,
    quests: Vec<contracts::QuestStatusEntry>,
    reward_points_total: i64,
}

async fn get_intel_dossier(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<IntelDossierResponse>, HttpApiError> {
    require_address(&address)?;
    let wallet_address = address.to_ascii_lowercase();

    let inner = state.inner.lock().await;
    let store = &inner.store;
    let now = now_unix();

    let threat = views::most_wanted(
        store,
        MAX_LIST_LIMIT,
        DEFAULT_WINDOW_HOURS,
        now,
        &views::FeeWeightedScoring,
    )
    .map_err(HttpApiError::from_store)?
    .into_iter()
    .find(|entry| entry.wallet_address == wallet_address);

    let raid_pulse = views::raid_pulse(store, DEFAULT_WINDOW_HOURS, now)
        .map_err(HttpApiError::from_store)?;
    let quests =
        QuestEngine::quest_board_for(store, &wallet_address).map_err(HttpApiError::from_store)?;
    let reward_points_total = store
        .reward_points_total(&wallet_address)
        .map_err(HttpApiError::from_store)?;

    Ok(Json(IntelDossierResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        wallet_address,
        threat,
        raid_pulse,
        quests,
        reward_points_total,
    }))
}
