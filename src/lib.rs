//! Fdmat implements finite-deformation constitutive material models composed
//! from independently authored physical sub-models.
//!
//! The total deformation gradient is factorized into an ordered chain of
//! sub-configurations (e.g., elastic · thermal · plastic). Per material point
//! and host increment, a Driver solves a nonlinear system for the Cauchy
//! stress, the sub-configurations, and the solve-coupled state variables, and
//! returns the tangents ∂σ/∂F and ∂σ/∂T required by the host's implicit
//! iteration.

/// Defines a type alias for the error type as a static string
pub type StrError = &'static str;

pub mod adapter;
pub mod base;
pub mod core;
pub mod models;
pub mod tensor;
