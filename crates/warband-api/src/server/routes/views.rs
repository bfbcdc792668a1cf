#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LeaderboardResponse {
    schema_version: String,
    entries: Vec<contracts::LeaderboardEntry>,
}

async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<LeaderboardResponse>, HttpApiError> {
    let limit = clamp_limit(query.limit);

    let inner = state.inner.lock().await;
    let entries = views::leaderboard(&inner.store, limit).map_err(HttpApiError::from_store)?;

    Ok(Json(LeaderboardResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        entries,
    }))
}

#[derive(Debug, Deserialize)]
struct MostWantedQuery {
    limit: Option<usize>,
    window_hours: Option<u64>,
}

#[derive(Debug, Serialize)]
struct MostWantedResponse {
    schema_version: String,
    window_hours: u64,
    entries: Vec<MostWantedEntry>,
}

async fn get_most_wanted(
    State(state): State<AppState>,
    Query(query): Query<MostWantedQuery>,
) -> Result<Json<MostWantedResponse>, HttpApiError> {
    let limit = clamp_limit(query.limit);
    let window_hours = views::clamp_window_hours(query.window_hours.unwrap_or(DEFAULT_WINDOW_HOURS));

    let inner = state.inner.lock().await;
    let entries = views::most_wanted(
        &inner.store,
        limit,
        window_hours,
        now_unix(),
        &views::FeeWeightedScoring,
    )
    .map_err(HttpApiError::from_store)?;

    Ok(Json(MostWantedResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        window_hours,
        entries,
    }))
}

#[derive(Debug, Deserialize)]
struct ClanTreeQuery {
    depth: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ClanTreeResponse {
    schema_version: String,
    depth: u64,
    tree: contracts::ClanTreeNode,
}

async fn get_clan_tree(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<ClanTreeQuery>,
) -> Result<Json<ClanTreeResponse>, HttpApiError> {
    require_address(&address)?;
    let depth = query.depth.unwrap_or(DEFAULT_CLAN_DEPTH).min(views::MAX_CLAN_DEPTH);

    let inner = state.inner.lock().await;
    let tree = views::clan_tree(&inner.store, &address, depth).map_err(HttpApiError::from_store)?;

    Ok(Json(ClanTreeResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        depth,
        tree,
    }))
}

#[derive(Debug, Deserialize)]
struct WindowQuery {
    window_hours: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RevenueSummaryResponse {
    schema_version: String,
    summary: contracts::RevenueSummary,
}

async fn get_revenue_summary(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<RevenueSummaryResponse>, HttpApiError> {
    let window_hours = query.window_hours.unwrap_or(DEFAULT_WINDOW_HOURS);

    let inner = state.inner.lock().await;
    let summary = views::revenue_summary(&inner.store, window_hours, now_unix())
        .map_err(HttpApiError::from_store)?;

    Ok(Json(RevenueSummaryResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        summary,
    }))
}

#[derive(Debug, Serialize)]
struct UserQuestsResponse {
    schema_version: String,
    wallet_address: String,
    quests: Vec<contracts::QuestStatusEntry>,
    reward_points_total: i64,
}

async fn get_user_quests(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<UserQuestsResponse>, HttpApiError> {
    require_address(&address)?;

    let inner = state.inner.lock().await;
    let quests =
        QuestEngine::quest_board_for(&inner.store, &address).map_err(HttpApiError::from_store)?;
    let reward_points_total = inner
        .store
        .reward_points_total(&address)
        .map_err(HttpApiError::from_store)?;

    Ok(Json(UserQuestsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        wallet_address: address.to_ascii_lowercase(),
        quests,
        reward_points_total,
    }))
}

#[derive(Debug, Serialize)]
struct NewsResponse {
    schema_version: String,
    items: Vec<contracts::NewsItem>,
}

async fn get_news(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<NewsResponse>, HttpApiError> {
    let limit = clamp_limit(query.limit);

    let inner = state.inner.lock().await;
    let items = inner
        .store
        .recent_news(limit)
        .map_err(HttpApiError::from_store)?;

    Ok(Json(NewsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        items,
    }))
}

#[derive(Debug, Serialize)]
struct CursorStatus {
    indexer: u64,
    quests: u64,
    news: u64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    schema_version: String,
    ledger_head: u64,
    cursors: CursorStatus,
}

async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let store = &inner.store;

    let response = StatusResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        ledger_head: store.latest_seq().map_err(HttpApiError::from_store)?,
        cursors: CursorStatus {
            indexer: store
                .cursor_position(CURSOR_INDEXER)
                .map_err(HttpApiError::from_store)?,
            quests: store
                .cursor_position(CURSOR_QUESTS)
                .map_err(HttpApiError::from_store)?,
            news: store
                .cursor_position(CURSOR_NEWS)
                .map_err(HttpApiError::from_store)?,
        },
    };

    Ok(Json(response))
}
