//! Composes the player file cache, the three LRU caches, and the worker
//! pool into a single `get_solvers(player_url)` operation.

use std::path::Path;
use std::sync::Arc;

use crate::lru_caches::LruCaches;
use crate::player_cache::{CacheError, PlayerCache};
use crate::pool::{PoolError, WorkerPool};
use crate::solvers::{Solvers, SolverFactoryFn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("failed to read player file: {0}")]
    PlayerFileRead(String),
}

pub struct SolverOrchestrator {
    player_cache: Arc<PlayerCache>,
    caches: Arc<LruCaches>,
    pool: WorkerPool,
    solver_factory: SolverFactoryFn,
}

impl SolverOrchestrator {
    pub fn new(
        player_cache: Arc<PlayerCache>,
        caches: Arc<LruCaches>,
        pool: WorkerPool,
        solver_factory: SolverFactoryFn,
    ) -> Self {
        Self {
            player_cache,
            caches,
            pool,
            solver_factory,
        }
    }

    pub fn player_cache(&self) -> &PlayerCache {
        &self.player_cache
    }

    pub fn caches(&self) -> &LruCaches {
        &self.caches
    }

    fn cache_key_for(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// `None` means extraction ran but found neither a `sig` nor an `n`
    /// solver in the prepared script; `Some` always has at least one of the
    /// two present.
    pub async fn get_solvers(&self, player_url: &str) -> Result<Option<Solvers>, OrchestratorError> {
        let filepath = self.player_cache.get_player_file_path(player_url).await?;
        let key = Self::cache_key_for(&filepath);

        if let Some(solvers) = self.caches.solvers.get(&key) {
            return Ok(Some(solvers));
        }

        let prepared = match self.caches.preprocessed.get(&key) {
            Some(prepared) => prepared,
            None => {
                let contents = tokio::fs::read_to_string(&filepath)
                    .await
                    .map_err(|e| OrchestratorError::PlayerFileRead(e.to_string()))?;
                let prepared = match self.pool.submit(contents).await {
                    Ok(prepared) => prepared,
                    Err(err) => {
                        crate::metrics::worker_error(key.clone(), err.to_string());
                        return Err(OrchestratorError::Pool(err));
                    }
                };
                self.caches.preprocessed.set(key.clone(), prepared.clone());
                prepared
            }
        };

        let solvers = (self.solver_factory)(&prepared);
        if solvers.has_n_solver() || solvers.has_sig_solver() {
            self.caches.solvers.set(key, solvers.clone());
            Ok(Some(solvers))
        } else {
            Ok(None)
        }
    }
}
