//! A solver pair extracted from a preprocessed player script: two optional
//! pure string-to-string functions, one for the `sig` parameter and one for
//! the `n` parameter. Modeled as a struct of optional callables rather than
//! a trait, per the "two optional string-to-string functions" guidance —
//! there is no third implementation waiting in the wings that would justify
//! a trait object seam here.

use std::sync::Arc;

/// A pure `String -> String` solver. Extraction may produce zero, one, or
/// both kinds depending on what the preprocessed script actually defines.
pub type SolverFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone, Default)]
pub struct Solvers {
    pub n_solver: Option<SolverFn>,
    pub sig_solver: Option<SolverFn>,
}

impl Solvers {
    pub fn new(n_solver: Option<SolverFn>, sig_solver: Option<SolverFn>) -> Self {
        Self { n_solver, sig_solver }
    }

    pub fn has_n_solver(&self) -> bool {
        self.n_solver.is_some()
    }

    pub fn has_sig_solver(&self) -> bool {
        self.sig_solver.is_some()
    }
}

/// `SolversFromPrepared(prepared) -> Solvers`, the second opaque external
/// collaborator. May run arbitrarily long or panic; the orchestrator does
/// not catch panics here, unlike the worker pool — extraction happens on
/// the orchestrator's own async task, not inside a sandboxed worker,
/// because the contract promises only "pure string functions", not
/// "attacker-controlled bytecode" at this stage.
pub type SolverFactoryFn = Arc<dyn Fn(&str) -> Solvers + Send + Sync>;
