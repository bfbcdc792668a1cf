use super::*;

fn gate_fixture() -> GateConfig {
    GateConfig {
        receiver: "0x000000000000000000000000000000000000f00d".to_string(),
        network: "base".to_string(),
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
    }
}

#[test]
fn trigger_auth_accepts_bearer_secret_only() {
    let auth = TriggerAuth {
        secret: Some("hushed".to_string()),
        debug_bypass: false,
    };

    assert!(auth.authorize(Some("Bearer hushed")));
    assert!(auth.authorize(Some("  Bearer hushed  ")));
    assert!(!auth.authorize(Some("Bearer wrong")));
    assert!(!auth.authorize(Some("hushed")));
    assert!(!auth.authorize(None));
}

#[test]
fn trigger_auth_without_secret_fails_closed() {
    let auth = TriggerAuth {
        secret: None,
        debug_bypass: false,
    };
    assert!(!auth.authorize(Some("Bearer anything")));
    assert!(!auth.authorize(None));
}

#[test]
fn debug_bypass_opens_triggers() {
    let auth = TriggerAuth {
        secret: None,
        debug_bypass: true,
    };
    assert!(auth.authorize(None));
}

#[test]
fn list_limit_clamps_to_bounds() {
    assert_eq!(clamp_limit(None), DEFAULT_LIST_LIMIT);
    assert_eq!(clamp_limit(Some(0)), 1);
    assert_eq!(clamp_limit(Some(17)), 17);
    assert_eq!(clamp_limit(Some(100_000)), MAX_LIST_LIMIT);
}

#[test]
fn address_validation_requires_hex_prefix() {
    assert!(require_address("0xabc123").is_ok());
    assert!(require_address("  0xabc123  ").is_ok());
    assert!(require_address("abc123").is_err());
    assert!(require_address("0x").is_err());
    assert!(require_address("").is_err());
}

#[test]
fn gated_route_key_matches_exact_and_nested_paths() {
    let gate = gate_fixture();

    assert_eq!(
        gated_route_key(&gate, "/api/v1/raids/suggest").as_deref(),
        Some("/api/v1/raids/suggest")
    );
    assert_eq!(
        gated_route_key(&gate, "/api/v1/intel/0xabc").as_deref(),
        Some("/api/v1/intel")
    );
    assert_eq!(gated_route_key(&gate, "/api/v1/leaderboard"), None);
    // A shared prefix without a path separator is not a match.
    assert_eq!(gated_route_key(&gate, "/api/v1/intelligence"), None);
}

#[test]
fn payment_error_mapping_separates_malformed_from_rejected() {
    let malformed = HttpApiError::from_payment(PaymentError::MalformedProof("bad".to_string()));
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert_eq!(malformed.error.error_code, ErrorCode::MalformedPayment);

    let rejected = HttpApiError::from_payment(PaymentError::InsufficientAmount {
        offered: 0.0001,
        price: 0.001,
    });
    assert_eq!(rejected.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(rejected.error.error_code, ErrorCode::PaymentRejected);

    let replayed = HttpApiError::from_payment(PaymentError::AlreadyConsumed {
        route: "/api/v1/intel".to_string(),
        tx_hash: "0xdead".to_string(),
    });
    assert_eq!(replayed.status, StatusCode::PAYMENT_REQUIRED);
}

#[test]
fn requirements_body_always_quotes_receiver_and_prices() {
    let requirements = gate_fixture().requirements();
    assert!(!requirements.receiver.is_empty());
    assert_eq!(requirements.routes.len(), 2);
    assert!(requirements.routes.iter().all(|route| route.price > 0.0));
}
