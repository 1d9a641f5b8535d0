use thiserror::Error;

/// Defines the failure modes of a material point update
///
/// The adapter maps these kinds onto host exit codes: a recoverable failure
/// asks the host to cut the time step whereas a fatal failure aborts the
/// increment without touching the output buffers.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FdError {
    /// Parameter vector inconsistent with the module declarations (fatal)
    #[error("parameter mismatch: {0}")]
    ParameterMismatch(&'static str),

    /// Non-positive configuration determinant or non-invertible sub-product (fatal)
    #[error("invalid kinematics: {0}")]
    InvalidKinematics(&'static str),

    /// Newton-Raphson or line search exhausted its iterations (recoverable)
    #[error("not converged: {0}")]
    NotConverged(&'static str),

    /// Dense LU factorization of the Jacobian failed (fatal)
    #[error("singular Jacobian: {0}")]
    SingularJacobian(&'static str),

    /// A required module method is unimplemented (programmer error)
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

impl FdError {
    /// Indicates whether the host may retry with a smaller time step
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FdError::NotConverged(_))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::FdError;

    #[test]
    fn display_and_recoverable_work() {
        let err = FdError::NotConverged("Newton-Raphson did not converge");
        assert_eq!(format!("{}", err), "not converged: Newton-Raphson did not converge");
        assert!(err.is_recoverable());
        let err = FdError::SingularJacobian("LU factorization failed");
        assert!(!err.is_recoverable());
        assert_eq!(
            format!("{}", FdError::ParameterMismatch("wrong length")),
            "parameter mismatch: wrong length"
        );
        assert_eq!(
            format!("{}", FdError::InvalidKinematics("det(F) is not positive")),
            "invalid kinematics: det(F) is not positive"
        );
        assert_eq!(
            format!("{}", FdError::NotImplemented("cauchy_stress")),
            "not implemented: cauchy_stress"
        );
    }
}
