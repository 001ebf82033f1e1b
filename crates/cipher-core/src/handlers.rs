//! The three public operations, implemented as pure functions over
//! already-parsed, already-validated request structs. No JSON, no HTTP
//! status codes, no headers — that's `cipher-server`'s job; these functions
//! only know the domain.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::orchestrator::{OrchestratorError, SolverOrchestrator};

#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("no sig solver available for this player")]
    NoSigSolver,
    #[error("n_param required but not supplied and not present on stream_url")]
    NParamMissing,
    #[error("signatureTimestamp not found in player script")]
    StsNotFound,
    #[error("invalid stream URL: {0}")]
    InvalidStreamUrl(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecryptSignatureRequest {
    pub encrypted_signature: String,
    pub n_param: String,
    pub player_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecryptSignatureResponse {
    pub decrypted_signature: String,
    pub decrypted_n_sig: String,
}

pub async fn decrypt_signature(
    orchestrator: &SolverOrchestrator,
    request: DecryptSignatureRequest,
) -> Result<DecryptSignatureResponse, HandlerError> {
    crate::metrics::player_url_request("decrypt_signature");
    let solvers = orchestrator.get_solvers(&request.player_url).await?;

    let decrypted_signature = solvers
        .as_ref()
        .and_then(|s| s.sig_solver.as_ref())
        .map(|solve| solve(&request.encrypted_signature))
        .unwrap_or_default();

    let decrypted_n_sig = solvers
        .as_ref()
        .and_then(|s| s.n_solver.as_ref())
        .map(|solve| solve(&request.n_param))
        .unwrap_or_default();

    Ok(DecryptSignatureResponse {
        decrypted_signature,
        decrypted_n_sig,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetStsRequest {
    pub player_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetStsResponse {
    pub sts: String,
    #[serde(skip)]
    pub cache_hit: bool,
}

static STS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(signatureTimestamp|sts):(\d+)").unwrap());

pub async fn get_sts(
    orchestrator: &SolverOrchestrator,
    request: GetStsRequest,
) -> Result<GetStsResponse, HandlerError> {
    crate::metrics::player_url_request("get_sts");
    let player_cache = orchestrator.player_cache();
    let filepath = player_cache
        .get_player_file_path(&request.player_url)
        .await
        .map_err(OrchestratorError::from)?;
    let key = filepath.to_string_lossy().into_owned();

    // NOTE: this duplicates orchestrator's private cache-key helper rather
    // than exposing it; both derive the same key from the same filepath.
    let caches = orchestrator_caches(orchestrator);
    if let Some(sts) = caches.sts.get(&key) {
        return Ok(GetStsResponse { sts, cache_hit: true });
    }

    let contents = tokio::fs::read_to_string(&filepath)
        .await
        .map_err(|e| OrchestratorError::PlayerFileRead(e.to_string()))?;

    let sts = STS_PATTERN
        .captures(&contents)
        .map(|c| c[2].to_string())
        .ok_or(HandlerError::StsNotFound)?;

    caches.sts.set(key, sts.clone());
    Ok(GetStsResponse { sts, cache_hit: false })
}

/// `cipher-core`'s caches are private to the orchestrator; this accessor
/// exists solely so `get_sts` can reach the `sts` cache without the
/// orchestrator itself needing to implement `GetSts`-specific logic.
fn orchestrator_caches(orchestrator: &SolverOrchestrator) -> &crate::lru_caches::LruCaches {
    orchestrator.caches()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveUrlRequest {
    pub stream_url: String,
    pub player_url: String,
    pub encrypted_signature: String,
    #[serde(default)]
    pub signature_key: Option<String>,
    #[serde(default)]
    pub n_param: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveUrlResponse {
    pub resolved_url: String,
}

pub async fn resolve_url(
    orchestrator: &SolverOrchestrator,
    request: ResolveUrlRequest,
) -> Result<ResolveUrlResponse, HandlerError> {
    crate::metrics::player_url_request("resolve_url");
    let mut url = url::Url::parse(&request.stream_url)
        .map_err(|e| HandlerError::InvalidStreamUrl(e.to_string()))?;

    let solvers = orchestrator.get_solvers(&request.player_url).await?;

    let signature_key = request.signature_key.clone().unwrap_or_else(|| "sig".to_string());

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if !request.encrypted_signature.is_empty() {
        let sig_solver = solvers
            .as_ref()
            .and_then(|s| s.sig_solver.as_ref())
            .ok_or(HandlerError::NoSigSolver)?;
        let decrypted = sig_solver(&request.encrypted_signature);
        pairs.retain(|(k, _)| k != "s" && k != &signature_key);
        pairs.push((signature_key, decrypted));
    }

    if let Some(n_solver) = solvers.as_ref().and_then(|s| s.n_solver.as_ref()) {
        let n_input = request
            .n_param
            .clone()
            .or_else(|| pairs.iter().find(|(k, _)| k == "n").map(|(_, v)| v.clone()))
            .ok_or(HandlerError::NParamMissing)?;
        let decrypted_n = n_solver(&n_input);
        pairs.retain(|(k, _)| k != "n");
        pairs.push(("n".to_string(), decrypted_n));
    }

    url.query_pairs_mut().clear();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().extend_pairs(pairs.iter());
    }

    Ok(ResolveUrlResponse {
        resolved_url: url.to_string(),
    })
}
