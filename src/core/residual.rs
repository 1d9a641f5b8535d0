use super::LocalState;
use crate::base::FdError;
use russell_lab::{Matrix, Vector};

/// Defines the contract a physical sub-model implements
///
/// A module advertises a fixed number of residual equations and, on demand,
/// produces its residual block, its dense Jacobian block (wrt the full
/// unknown vector), and its derivatives wrt the deformation gradient and the
/// temperature. The first-declared module is the stress carrier and must
/// also produce the current and previous Cauchy stress.
///
/// Jacobian convention: the first configuration is not an unknown, so every
/// quantity evaluated on F₀ carries an implicit dependence on the unknown
/// configurations and on F. Modules fold this dependence into their own
/// blocks using the chain-provided maps ([ConfigurationChain::df1_df] and
/// [ConfigurationChain::df1_dconfigs]); the solver applies the plain
/// implicit-function formula afterwards.
///
/// [ConfigurationChain::df1_df]: super::ConfigurationChain::df1_df
/// [ConfigurationChain::df1_dconfigs]: super::ConfigurationChain::df1_dconfigs
pub trait ResidualModule {
    /// Returns the name of the module for diagnostic messages
    fn name(&self) -> &'static str;

    /// Returns the number of residual equations
    fn n_equations(&self) -> usize;

    /// Returns the number of solve-coupled state variables owned by this module
    fn n_solve_vars(&self) -> usize {
        0
    }

    /// Returns the number of carried state variables owned by this module
    fn n_carried_vars(&self) -> usize {
        0
    }

    /// Fills the per-equation unit scales used by the convergence check
    fn equation_scales(&self, scales: &mut [f64]);

    /// Clears all cells whose value depends on the current iterate
    fn clear_iteration_data(&mut self) {}

    /// Computes the residual block (length n_equations)
    fn residual(&mut self, state: &LocalState) -> Result<Vector, FdError>;

    /// Computes the Jacobian block (n_equations × |X|)
    fn jacobian(&mut self, state: &LocalState) -> Result<Matrix, FdError>;

    /// Computes the derivative of the residual wrt the deformation gradient (n_equations × 9)
    fn d_residual_d_f(&mut self, state: &LocalState) -> Result<Matrix, FdError>;

    /// Computes the derivative of the residual wrt the temperature (length n_equations)
    fn d_residual_d_temperature(&mut self, state: &LocalState) -> Result<Vector, FdError>;

    /// Computes the current Cauchy stress (stress carrier only)
    fn cauchy_stress(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let _ = state;
        Err(FdError::NotImplemented(
            "the Cauchy stress is only available from the stress-carrier module",
        ))
    }

    /// Computes the previous Cauchy stress (stress carrier only)
    fn previous_cauchy_stress(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let _ = state;
        Err(FdError::NotImplemented(
            "the previous Cauchy stress is only available from the stress-carrier module",
        ))
    }

    /// Computes the updated carried state variables from the converged state
    fn updated_carried_vars(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let _ = state;
        Ok(Vector::new(0))
    }
}
