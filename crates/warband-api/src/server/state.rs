#[derive(Clone)]
struct AppState {
    inner: std::sync::Arc<Mutex<ServerInner>>,
    auth: std::sync::Arc<TriggerAuth>,
    gate: std::sync::Arc<GateConfig>,
}

struct ServerInner {
    store: SqliteLedgerStore,
    source: Box<dyn LogSource + Send>,
}

impl AppState {
    fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let store = SqliteLedgerStore::open(&config.sqlite_path)?;
        let source = Box::new(JsonlLogSource::new(&config.relay_path));
        Ok(Self {
            inner: std::sync::Arc::new(Mutex::new(ServerInner { store, source })),
            auth: std::sync::Arc::new(TriggerAuth {
                secret: config.trigger_secret,
                debug_bypass: config.debug_bypass,
            }),
            gate: std::sync::Arc::new(config.gate),
        })
    }
}

/// Trigger endpoints are for the scheduler, not the public: a bearer secret,
/// or an explicit local-debug bypass. No secret configured means no access.
#[derive(Debug)]
struct TriggerAuth {
    secret: Option<String>,
    debug_bypass: bool,
}

impl TriggerAuth {
    fn authorize(&self, authorization_header: Option<&str>) -> bool {
        if self.debug_bypass {
            return true;
        }
        let Some(secret) = self.secret.as_deref() else {
            return false;
        };
        authorization_header
            .map(|header| header.trim() == format!("Bearer {secret}"))
            .unwrap_or(false)
    }
}
