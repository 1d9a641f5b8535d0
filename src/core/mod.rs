//! Implements the configuration-chain engine and the nonlinear driver

mod cell;
mod chain;
mod driver;
mod local_state;
mod residual;
mod solver;
pub use crate::core::cell::*;
pub use crate::core::chain::*;
pub use crate::core::driver::*;
pub use crate::core::local_state::*;
pub use crate::core::residual::*;
pub use crate::core::solver::*;
