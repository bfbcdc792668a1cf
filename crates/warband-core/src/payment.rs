//! Pay-per-call handshake core. The HTTP layer turns these outcomes into 402
//! and 400 responses; everything money-relevant lives here so the replay
//! guard is testable without a server.

use std::fmt;

use contracts::{PaymentProof, PaymentRequirements, RouteQuote, SCHEMA_VERSION_V1};

use crate::indexer::is_tx_hash;
use crate::store::{InsertOutcome, SqliteLedgerStore, StoreError};

/// Static per-deployment gate configuration: who gets paid, on which network,
/// and the menu of gated routes.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub receiver: String,
    pub network: String,
    pub routes: Vec<RouteQuote>,
}

impl GateConfig {
    pub fn quote(&self, path: &str) -> Option<&RouteQuote> {
        self.routes.iter().find(|route| route.path == path)
    }

    pub fn requirements(&self) -> PaymentRequirements {
        PaymentRequirements {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            receiver: self.receiver.clone(),
            network: self.network.clone(),
            routes: self.routes.clone(),
        }
    }
}

/// Request-scoped walk through the handshake. Transitions only move forward;
/// a terminal phase never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentPhase {
    Unpaid,
    Verifying,
    Paid,
    Rejected,
}

#[derive(Debug)]
pub struct PaymentAttempt {
    phase: PaymentPhase,
}

impl PaymentAttempt {
    pub fn new() -> Self {
        Self {
            phase: PaymentPhase::Unpaid,
        }
    }

    pub fn phase(&self) -> PaymentPhase {
        self.phase
    }

    pub fn begin_verification(&mut self) {
        if self.phase == PaymentPhase::Unpaid {
            self.phase = PaymentPhase::Verifying;
        }
    }

    pub fn mark_paid(&mut self) {
        if self.phase == PaymentPhase::Verifying {
            self.phase = PaymentPhase::Paid;
        }
    }

    pub fn mark_rejected(&mut self) {
        if self.phase == PaymentPhase::Verifying {
            self.phase = PaymentPhase::Rejected;
        }
    }
}

impl Default for PaymentAttempt {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub enum PaymentError {
    MalformedProof(String),
    UnknownRoute(String),
    InsufficientAmount { offered: f64, price: f64 },
    ReceiverMismatch { expected: String, got: String },
    AlreadyConsumed { route: String, tx_hash: String },
    Store(StoreError),
}

impl fmt::Display for PaymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedProof(detail) => write!(f, "malformed payment proof: {detail}"),
            Self::UnknownRoute(path) => write!(f, "no payment quote for route: {path}"),
            Self::InsufficientAmount { offered, price } => {
                write!(f, "payment of {offered} is below the price of {price}")
            }
            Self::ReceiverMismatch { expected, got } => {
                write!(f, "payment receiver {got} does not match {expected}")
            }
            Self::AlreadyConsumed { route, tx_hash } => {
                write!(f, "proof {tx_hash} was already consumed for {route}")
            }
            Self::Store(err) => write!(f, "payment claim failed: {err}"),
        }
    }
}

impl std::error::Error for PaymentError {}

impl From<StoreError> for PaymentError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub route: String,
    pub tx_hash: String,
}

/// Outcome of one gated request, as consumed by the HTTP layer.
#[derive(Debug)]
pub enum GateDecision {
    /// No proof supplied: answer 402 with the requirements body. The
    /// underlying handler is never invoked.
    Quote(PaymentRequirements),
    Paid(PaymentReceipt),
    Rejected(PaymentError),
}

pub fn parse_proof(raw: &str) -> Result<PaymentProof, PaymentError> {
    let proof: PaymentProof =
        serde_json::from_str(raw).map_err(|err| PaymentError::MalformedProof(err.to_string()))?;

    if !is_tx_hash(&proof.tx_hash) {
        return Err(PaymentError::MalformedProof(format!(
            "bad tx hash: {}",
            proof.tx_hash
        )));
    }
    if !proof.amount.is_finite() || proof.amount < 0.0 {
        return Err(PaymentError::MalformedProof(format!(
            "bad amount: {}",
            proof.amount
        )));
    }

    Ok(proof)
}

/// Verifies a parsed proof against the route quote and claims it. The claim
/// is an atomic insert on the (route, tx_hash) unique key — under concurrent
/// identical requests exactly one caller observes `Created` and proceeds.
pub fn verify_and_claim(
    store: &SqliteLedgerStore,
    gate: &GateConfig,
    path: &str,
    proof: &PaymentProof,
    now_unix: i64,
) -> Result<PaymentReceipt, PaymentError> {
    let quote = gate
        .quote(path)
        .ok_or_else(|| PaymentError::UnknownRoute(path.to_string()))?;

    if proof.amount < quote.price {
        return Err(PaymentError::InsufficientAmount {
            offered: proof.amount,
            price: quote.price,
        });
    }
    if !proof.receiver.eq_ignore_ascii_case(&gate.receiver) {
        return Err(PaymentError::ReceiverMismatch {
            expected: gate.receiver.clone(),
            got: proof.receiver.clone(),
        });
    }

    let tx_hash = proof.tx_hash.to_ascii_lowercase();
    match store.claim_payment(path, &tx_hash, now_unix)? {
        InsertOutcome::Created => Ok(PaymentReceipt {
            route: path.to_string(),
            tx_hash,
        }),
        InsertOutcome::AlreadyExists => Err(PaymentError::AlreadyConsumed {
            route: path.to_string(),
            tx_hash,
        }),
    }
}

/// Full request evaluation: drives the phase machine from the raw header.
pub fn evaluate_request(
    store: &SqliteLedgerStore,
    gate: &GateConfig,
    path: &str,
    proof_header: Option<&str>,
    now_unix: i64,
) -> GateDecision {
    let mut attempt = PaymentAttempt::new();

    let Some(raw) = proof_header else {
        return GateDecision::Quote(gate.requirements());
    };

    attempt.begin_verification();
    match parse_proof(raw)
        .and_then(|proof| verify_and_claim(store, gate, path, &proof, now_unix))
    {
        Ok(receipt) => {
            attempt.mark_paid();
            GateDecision::Paid(receipt)
        }
        Err(err) => {
            attempt.mark_rejected();
            GateDecision::Rejected(err)
        }
    }
}
