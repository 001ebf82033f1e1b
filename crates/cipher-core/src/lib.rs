//! Core library for resolving obfuscated media-stream URLs: a bounded pool
//! of isolated script-evaluation workers, a multi-tier cache pipeline in
//! front of it, and a thin orchestration layer that wires both together for
//! the three public operations (`decrypt_signature`, `get_sts`,
//! `resolve_url`).
//!
//! The HTTP surface lives in the `cipher-server` binary crate; this crate
//! has no knowledge of HTTP, only of the domain operations themselves.

pub mod handlers;
pub mod lru_caches;
pub mod metrics;
pub mod orchestrator;
pub mod player_cache;
pub mod pool;
pub mod queue;
pub mod solvers;
pub mod stub;
pub mod task;
pub mod worker;

pub use handlers::{DecryptSignatureRequest, GetStsRequest, HandlerError, ResolveUrlRequest};
pub use orchestrator::SolverOrchestrator;
pub use player_cache::PlayerCache;
pub use pool::{PoolConfig, PoolError, WorkerPool};
