#[derive(Debug, Serialize)]
struct IndexJobResponse {
    schema_version: String,
    success: bool,
    indexed: u64,
    duplicates: u64,
    skipped: u64,
    cursor: u64,
}

async fn run_index_job(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<IndexJobResponse>, HttpApiError> {
    require_trigger_auth(&headers, &state.auth)?;

    let mut inner = state.inner.lock().await;
    let ServerInner { store, source } = &mut *inner;
    let report =
        ChainIndexer::index_events(store, source.as_ref()).map_err(HttpApiError::from_index)?;

    Ok(Json(IndexJobResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        success: true,
        indexed: report.appended,
        duplicates: report.duplicates,
        skipped: report.skipped,
        cursor: report.cursor,
    }))
}

#[derive(Debug, Serialize)]
struct QuestsJobResponse {
    schema_version: String,
    success: bool,
    consumed: u64,
    progressed: u64,
    completed: u64,
}

async fn run_quests_job(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<QuestsJobResponse>, HttpApiError> {
    require_trigger_auth(&headers, &state.auth)?;

    let inner = state.inner.lock().await;
    let report = QuestEngine::process_pending_events(&inner.store, now_unix())
        .map_err(HttpApiError::from_store)?;

    Ok(Json(QuestsJobResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        success: true,
        consumed: report.consumed,
        progressed: report.progressed,
        completed: report.completed,
    }))
}

#[derive(Debug, Serialize)]
struct NewsJobResponse {
    schema_version: String,
    success: bool,
    consumed: u64,
    generated: u64,
}

async fn run_news_job(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<NewsJobResponse>, HttpApiError> {
    require_trigger_auth(&headers, &state.auth)?;

    let inner = state.inner.lock().await;
    let report =
        NewsGenerator::generate_from_events(&inner.store).map_err(HttpApiError::from_store)?;

    Ok(Json(NewsJobResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        success: true,
        consumed: report.consumed,
        generated: report.generated,
    }))
}
