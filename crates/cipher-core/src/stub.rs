//! Placeholder implementations of the two opaque external collaborators
//! (`PreprocessFn`, `SolverFactoryFn`), labeled explicitly as stand-ins for
//! the real upstream player-script algorithm. These are the literal fixture
//! behaviors used by the seed end-to-end scenarios: `sig(x) = reverse(x)`,
//! `n(x) = x + "!"`. Swapping in the real implementation at the composition
//! root is a one-line change — replace `stub::preprocess()` /
//! `stub::solver_factory()` with the real closures.

use std::sync::Arc;

use crate::solvers::{SolverFn, Solvers};
use crate::worker::PreprocessFn;

/// Passes the raw player source through unchanged. The real preprocessor
/// would deobfuscate/minify/normalize the script before solver extraction;
/// this stub has nothing to normalize, so "prepared" is just "raw".
pub fn preprocess() -> PreprocessFn {
    Arc::new(|source: &str| Ok(source.to_string()))
}

/// Ignores the prepared script's actual content and always returns the
/// fixture solver pair. A real implementation parses `prepared` to locate
/// and extract the two functions it actually defines.
pub fn solver_factory() -> Arc<dyn Fn(&str) -> Solvers + Send + Sync> {
    Arc::new(|_prepared: &str| {
        let sig_solver: SolverFn = Arc::new(|s: &str| s.chars().rev().collect());
        let n_solver: SolverFn = Arc::new(|s: &str| format!("{s}!"));
        Solvers::new(Some(n_solver), Some(sig_solver))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_is_identity() {
        let f = preprocess();
        assert_eq!(f("hello").unwrap(), "hello");
    }

    #[test]
    fn solver_factory_matches_seed_fixtures() {
        let factory = solver_factory();
        let solvers = factory("anything");
        assert_eq!((solvers.sig_solver.unwrap())("ABCDE"), "EDCBA");
        assert_eq!((solvers.n_solver.unwrap())("xyz"), "xyz!");
    }
}
