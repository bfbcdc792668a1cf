#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
    Store(StoreError),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
            Self::Store(err) => write!(f, "server store error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<StoreError> for ServerError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error: ApiError::new(
                ErrorCode::Unauthorized,
                "trigger secret missing or invalid",
                None,
            ),
        }
    }

    fn invalid_query(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidQuery, message, details),
        }
    }

    fn not_found(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(ErrorCode::NotFound, message, details),
        }
    }

    fn internal(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::new(ErrorCode::InternalError, message, details),
        }
    }

    fn from_store(err: StoreError) -> Self {
        Self::internal("ledger operation failed", Some(err.to_string()))
    }

    fn from_index(err: IndexError) -> Self {
        match err {
            // Transient: the next scheduled run retries from the same cursor.
            IndexError::Fetch(fetch) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                error: ApiError::new(
                    ErrorCode::InternalError,
                    "log source unreachable; cursor not advanced",
                    Some(fetch.to_string()),
                ),
            },
            IndexError::Store(store) => Self::from_store(store),
        }
    }

    fn from_payment(err: PaymentError) -> Self {
        match err {
            PaymentError::MalformedProof(detail) => Self {
                status: StatusCode::BAD_REQUEST,
                error: ApiError::new(
                    ErrorCode::MalformedPayment,
                    "payment proof could not be parsed",
                    Some(detail),
                ),
            },
            PaymentError::Store(store) => Self::from_store(store),
            other => Self {
                status: StatusCode::PAYMENT_REQUIRED,
                error: ApiError::new(
                    ErrorCode::PaymentRejected,
                    "payment proof rejected",
                    Some(other.to_string()),
                ),
            },
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
