//! Thin wrappers over the `metrics` facade macros, giving every call site a
//! single place that owns the metric name and label shape. `cipher-core`
//! depends only on the facade; `cipher-server` installs the recorder that
//! actually aggregates and exposes these.

use metrics::{counter, gauge};

/// `cache_size{cache_name}` — published on every LRU/player-file-cache
/// mutation.
pub fn cache_size(cache_name: &'static str, size: usize) {
    gauge!("cache_size", "cache_name" => cache_name).set(size as f64);
}

/// `player_script_fetches_total{url,status}` — one increment per fetch
/// attempt, labeled with the HTTP status text (or `"error"`/`"timeout"`).
pub fn player_script_fetch(url: String, status: String) {
    counter!("player_script_fetches_total", "url" => url, "status" => status).increment(1);
}

/// `worker_errors_total{player_id,message}` — incremented when the pool
/// rejects a preprocessing task.
pub fn worker_error(player_id: String, message: String) {
    counter!("worker_errors_total", "player_id" => player_id, "message" => message).increment(1);
}

/// `player_url_requests_total{operation}` — one increment per handler
/// invocation, labeled by operation name (`decrypt_signature`, `get_sts`,
/// `resolve_url`).
pub fn player_url_request(operation: &'static str) {
    counter!("player_url_requests_total", "operation" => operation).increment(1);
}
