/// Holds the spatial dimension of the problem
pub const NDIM: usize = 3;

/// Holds the number of components of a second-order tensor (row-major layout)
pub const NT: usize = 9;

/// Holds the default absolute tolerance for the residual convergence check
pub const DEFAULT_TOL_ABS: f64 = 1e-9;

/// Holds the default relative tolerance for the residual convergence check
pub const DEFAULT_TOL_REL: f64 = 1e-9;

/// Holds the default maximum number of Newton-Raphson iterations
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Holds the default maximum number of line-search iterations
pub const DEFAULT_MAX_LINE_SEARCH: usize = 5;

/// Holds the default line-search sufficient-decrease coefficient
pub const DEFAULT_LINE_SEARCH_ALPHA: f64 = 1e-4;

/// Holds the default tolerance for the configuration partition invariant
///
/// The product of all stored sub-configurations must equal the total
/// deformation gradient within this tolerance (L2 norm).
pub const DEFAULT_PARTITION_TOL: f64 = 1e-9;

/// Holds the floor below which the equivalent stress is treated as zero
///
/// Protects the deviatoric part of the flow direction from a 0/0 limit.
pub const EQUIVALENT_STRESS_FLOOR: f64 = 1e-12;
