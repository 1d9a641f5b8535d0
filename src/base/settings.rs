use super::{
    DEFAULT_LINE_SEARCH_ALPHA, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_LINE_SEARCH, DEFAULT_PARTITION_TOL,
    DEFAULT_TOL_ABS, DEFAULT_TOL_REL,
};
use crate::StrError;
use serde::{Deserialize, Serialize};

/// Holds settings controlling the nonlinear solve of a material point
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Settings {
    /// Absolute tolerance for the per-component residual check
    pub tol_abs: f64,

    /// Relative tolerance (scaled by the per-equation unit scale)
    pub tol_rel: f64,

    /// Maximum number of Newton-Raphson iterations
    pub max_iterations: usize,

    /// Maximum number of line-search iterations
    pub max_line_search: usize,

    /// Sufficient-decrease coefficient of the line search
    pub line_search_alpha: f64,

    /// Tolerance for the configuration partition invariant (L2 norm)
    pub partition_tol: f64,

    /// Enables the convergence table printed during the iterations
    pub verbose: bool,
}

impl Settings {
    /// Allocates a new instance with default values
    pub fn new() -> Self {
        Settings {
            tol_abs: DEFAULT_TOL_ABS,
            tol_rel: DEFAULT_TOL_REL,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_line_search: DEFAULT_MAX_LINE_SEARCH,
            line_search_alpha: DEFAULT_LINE_SEARCH_ALPHA,
            partition_tol: DEFAULT_PARTITION_TOL,
            verbose: false,
        }
    }

    /// Validates all data
    pub fn validate(&self) -> Result<(), StrError> {
        if self.tol_abs <= 0.0 {
            return Err("tol_abs must be positive");
        }
        if self.tol_rel < 0.0 {
            return Err("tol_rel must not be negative");
        }
        if self.max_iterations < 1 {
            return Err("max_iterations must be at least 1");
        }
        if self.max_line_search < 1 {
            return Err("max_line_search must be at least 1");
        }
        if self.line_search_alpha <= 0.0 || self.line_search_alpha >= 1.0 {
            return Err("line_search_alpha must be in (0, 1)");
        }
        if self.partition_tol <= 0.0 {
            return Err("partition_tol must be positive");
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
