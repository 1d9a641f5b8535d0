use super::{LocalState, ResidualModule};
use crate::base::{FdError, Settings};
use russell_lab::{mat_inverse, mat_mat_mul, mat_vec_mul, solve_lin_sys, vec_add, vec_copy, vec_norm, Matrix, Norm, Vector};

/// Implements the damped Newton-Raphson solver for the material point system
///
/// Assembles the residual and Jacobian blocks of the composed modules into a
/// single dense system, iterates with a backtracking line search, and, after
/// convergence, computes the tangents ∂σ/∂F and ∂σ/∂T by implicit
/// differentiation of R(X) = 0.
pub struct NonlinearSolver {
    /// Solver settings
    settings: Settings,

    /// Unknown vector X
    xx: Vector,

    /// Residual vector R(X)
    rr: Vector,

    /// Jacobian matrix at the current iterate
    jj: Matrix,

    /// Per-equation convergence tolerances
    tol: Vector,

    /// Number of iterations of the last solve
    iterations: usize,

    /// Total number of line-search halvings of the last solve
    line_search_halvings: usize,
}

impl NonlinearSolver {
    /// Allocates a new instance
    pub fn new(settings: &Settings, dim: usize) -> Self {
        NonlinearSolver {
            settings: *settings,
            xx: Vector::new(dim),
            rr: Vector::new(dim),
            jj: Matrix::new(dim, dim),
            tol: Vector::new(dim),
            iterations: 0,
            line_search_halvings: 0,
        }
    }

    /// Returns the number of iterations of the last solve
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Returns the total number of line-search halvings of the last solve
    pub fn line_search_halvings(&self) -> usize {
        self.line_search_halvings
    }

    /// Returns the current unknown vector
    pub fn unknowns(&self) -> &Vector {
        &self.xx
    }

    /// Returns the Jacobian of the last assembled iterate
    pub fn jacobian(&self) -> &Matrix {
        &self.jj
    }

    /// Solves the nonlinear system for the unknown vector
    ///
    /// On return, `state` holds the converged stress, configurations, and
    /// solve-coupled variables.
    pub fn solve(&mut self, state: &mut LocalState, modules: &mut [Box<dyn ResidualModule>]) -> Result<(), FdError> {
        let dim = state.layout.dim();
        let neq: usize = modules.iter().map(|m| m.n_equations()).sum();
        if neq != dim {
            return Err(FdError::ParameterMismatch(
                "the total number of residual equations does not match the number of unknowns",
            ));
        }

        // per-equation tolerances from the module unit scales
        let mut scales = vec![1.0; dim];
        let mut offset = 0;
        for module in modules.iter() {
            let n = module.n_equations();
            module.equation_scales(&mut scales[offset..offset + n]);
            offset += n;
        }
        for i in 0..dim {
            self.tol[i] = self.settings.tol_abs + self.settings.tol_rel * f64::abs(scales[i]);
        }

        // initial guess from the previous converged values
        for c in 0..9 {
            self.xx[c] = state.previous_stress[c];
        }
        let n_conf = state.layout.n_configurations;
        for k in 1..n_conf {
            let prev = state.chain.previous_configuration(k);
            for c in 0..9 {
                self.xx[9 * k + c] = prev[c];
            }
        }
        let xi_offset = state.layout.solve_vars_offset();
        for k in 0..state.layout.n_solve_vars {
            self.xx[xi_offset + k] = state.previous_solve_vars[k];
        }

        // workspace
        let mut work = Matrix::new(dim, dim);
        let mut mdx = Vector::new(dim);
        let mut x_trial = Vector::new(dim);
        let mut r_trial = Vector::new(dim);
        self.iterations = 0;
        self.line_search_halvings = 0;

        if self.settings.verbose {
            println!("{:>4} {:>4} {:>13} {:>13}", "it", "ls", "norm(R)", "max(R/tol)");
        }

        for iteration in 0..self.settings.max_iterations {
            self.iterations = iteration;

            // evaluate the residual and the Jacobian at the current iterate
            let x_current = self.xx.clone();
            Self::update_state(&x_current, state, modules)?;
            Self::assemble_residual(&mut self.rr, state, modules)?;
            Self::assemble_jacobian(&mut self.jj, state, modules)?;

            // convergence check (per-component, scaled)
            let norm_rr = vec_norm(&self.rr, Norm::Euc);
            if !norm_rr.is_finite() {
                return Err(FdError::NotConverged("found NaN or Inf in the residual vector"));
            }
            let mut max_ratio = 0.0;
            for i in 0..dim {
                max_ratio = f64::max(max_ratio, f64::abs(self.rr[i]) / self.tol[i]);
            }
            if self.settings.verbose {
                println!("{:>4} {:>4} {:>13.6e} {:>13.6e}", iteration, "-", norm_rr, max_ratio);
            }
            if max_ratio <= 1.0 {
                return Ok(());
            }

            // solve J ΔX = -R by dense LU with partial pivoting
            for r in 0..dim {
                mdx[r] = -self.rr[r];
                for c in 0..dim {
                    work.set(r, c, self.jj.get(r, c));
                }
            }
            solve_lin_sys(&mut mdx, &mut work)
                .map_err(|_| FdError::SingularJacobian("cannot factorize the Jacobian matrix"))?;

            // backtracking line search on the residual norm
            let mut lambda = 1.0;
            let mut accepted = false;
            for ls in 0..self.settings.max_line_search {
                vec_add(&mut x_trial, 1.0, &self.xx, lambda, &mdx).unwrap();
                Self::update_state(&x_trial, state, modules)?;
                Self::assemble_residual(&mut r_trial, state, modules)?;
                let norm_trial = vec_norm(&r_trial, Norm::Euc);
                if norm_trial.is_finite()
                    && norm_trial <= (1.0 - self.settings.line_search_alpha * lambda) * norm_rr
                {
                    vec_copy(&mut self.xx, &x_trial).unwrap();
                    accepted = true;
                    if self.settings.verbose && ls > 0 {
                        println!("{:>4} {:>4} {:>13.6e} {:>13}", iteration, ls, norm_trial, "-");
                    }
                    break;
                }
                lambda *= 0.5;
                self.line_search_halvings += 1;
            }
            if !accepted {
                return Err(FdError::NotConverged("line search did not reduce the residual"));
            }
        }
        Err(FdError::NotConverged("Newton-Raphson did not converge"))
    }

    /// Computes the tangents ∂σ/∂F (9×9) and ∂σ/∂T (9) at the converged point
    ///
    /// Applies the implicit function theorem with the Jacobian of the last
    /// assembled (converged) iterate:
    ///
    /// ```text
    /// ∂X/∂F = -J⁻¹ ∂R/∂F,   ∂X/∂T = -J⁻¹ ∂R/∂T
    /// ```
    ///
    /// The first nine rows are the stress tangents.
    pub fn tangents(
        &mut self,
        state: &LocalState,
        modules: &mut [Box<dyn ResidualModule>],
    ) -> Result<(Matrix, Vector), FdError> {
        let dim = state.layout.dim();
        let mut drdf = Matrix::new(dim, 9);
        let mut drdt = Vector::new(dim);
        let mut offset = 0;
        for module in modules.iter_mut() {
            let n = module.n_equations();
            let block_f = module.d_residual_d_f(state)?;
            assert_eq!(block_f.dims(), (n, 9));
            let block_t = module.d_residual_d_temperature(state)?;
            assert_eq!(block_t.dim(), n);
            for r in 0..n {
                drdt[offset + r] = block_t[r];
                for c in 0..9 {
                    drdf.set(offset + r, c, block_f.get(r, c));
                }
            }
            offset += n;
        }

        let mut jinv = Matrix::new(dim, dim);
        mat_inverse(&mut jinv, &self.jj)
            .map_err(|_| FdError::SingularJacobian("cannot invert the converged Jacobian matrix"))?;
        let mut dxdf = Matrix::new(dim, 9);
        mat_mat_mul(&mut dxdf, -1.0, &jinv, &drdf, 0.0).unwrap();
        let mut dxdt = Vector::new(dim);
        mat_vec_mul(&mut dxdt, -1.0, &jinv, &drdt).unwrap();

        let mut dstress_df = Matrix::new(9, 9);
        let mut dstress_dt = Vector::new(9);
        for r in 0..9 {
            dstress_dt[r] = dxdt[r];
            for c in 0..9 {
                dstress_df.set(r, c, dxdf.get(r, c));
            }
        }
        Ok((dstress_df, dstress_dt))
    }

    /// Evaluates the residual vector at an arbitrary unknown vector
    ///
    /// Intended for verification: perturbed evaluations allow checking the
    /// analytic Jacobian against central differences.
    pub fn residual_at(
        &mut self,
        x: &Vector,
        state: &mut LocalState,
        modules: &mut [Box<dyn ResidualModule>],
    ) -> Result<Vector, FdError> {
        let dim = state.layout.dim();
        let mut rr = Vector::new(dim);
        Self::update_state(x, state, modules)?;
        Self::assemble_residual(&mut rr, state, modules)?;
        Ok(rr)
    }

    /// Evaluates the Jacobian matrix at an arbitrary unknown vector
    pub fn jacobian_at(
        &mut self,
        x: &Vector,
        state: &mut LocalState,
        modules: &mut [Box<dyn ResidualModule>],
    ) -> Result<Matrix, FdError> {
        let dim = state.layout.dim();
        let mut jj = Matrix::new(dim, dim);
        Self::update_state(x, state, modules)?;
        Self::assemble_jacobian(&mut jj, state, modules)?;
        Ok(jj)
    }

    /// Clears the iteration data and loads the iterate into the state
    fn update_state(
        x: &Vector,
        state: &mut LocalState,
        modules: &mut [Box<dyn ResidualModule>],
    ) -> Result<(), FdError> {
        for module in modules.iter_mut() {
            module.clear_iteration_data();
        }
        for c in 0..9 {
            state.stress[c] = x[c];
        }
        let n_conf = state.layout.n_configurations;
        state.chain.update_from_unknowns(&x.as_data()[9..9 * n_conf])?;
        let xi_offset = state.layout.solve_vars_offset();
        for k in 0..state.layout.n_solve_vars {
            state.solve_vars[k] = x[xi_offset + k];
        }
        Ok(())
    }

    /// Concatenates the module residual blocks
    fn assemble_residual(
        rr: &mut Vector,
        state: &LocalState,
        modules: &mut [Box<dyn ResidualModule>],
    ) -> Result<(), FdError> {
        let mut offset = 0;
        for module in modules.iter_mut() {
            let n = module.n_equations();
            let block = module.residual(state)?;
            assert_eq!(block.dim(), n);
            for r in 0..n {
                rr[offset + r] = block[r];
            }
            offset += n;
        }
        Ok(())
    }

    /// Concatenates the module Jacobian blocks
    fn assemble_jacobian(
        jj: &mut Matrix,
        state: &LocalState,
        modules: &mut [Box<dyn ResidualModule>],
    ) -> Result<(), FdError> {
        let (_, dim) = jj.dims();
        let mut offset = 0;
        for module in modules.iter_mut() {
            let n = module.n_equations();
            let block = module.jacobian(state)?;
            assert_eq!(block.dims(), (n, dim));
            for r in 0..n {
                for c in 0..dim {
                    jj.set(offset + r, c, block.get(r, c));
                }
            }
            offset += n;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::NonlinearSolver;
    use crate::base::{FdError, Settings};
    use crate::core::{ConfigurationChain, LocalState, ResidualModule, UnknownLayout};
    use crate::tensor::ten_identity;
    use russell_lab::{approx_eq, vec_approx_eq, Matrix, Vector};

    /// A stress carrier with the linear law σ̂ = k (F₀ - I)
    struct MockSpring {
        kk: f64,
    }

    impl ResidualModule for MockSpring {
        fn name(&self) -> &'static str {
            "mock-spring"
        }
        fn n_equations(&self) -> usize {
            9
        }
        fn equation_scales(&self, scales: &mut [f64]) {
            scales.iter_mut().for_each(|s| *s = self.kk);
        }
        fn residual(&mut self, state: &LocalState) -> Result<Vector, FdError> {
            let f0 = state.chain.configuration(0);
            let eye = ten_identity();
            let mut rr = Vector::new(9);
            for c in 0..9 {
                rr[c] = state.stress[c] - self.kk * (f0[c] - eye[c]);
            }
            Ok(rr)
        }
        fn jacobian(&mut self, state: &LocalState) -> Result<Matrix, FdError> {
            let dim = state.layout.dim();
            let mut jj = Matrix::new(9, dim);
            for r in 0..9 {
                jj.set(r, r, 1.0);
            }
            Ok(jj)
        }
        fn d_residual_d_f(&mut self, state: &LocalState) -> Result<Matrix, FdError> {
            let mut block = Matrix::new(9, 9);
            let map = state.chain.df1_df();
            for r in 0..9 {
                for c in 0..9 {
                    block.set(r, c, -self.kk * map.get(r, c));
                }
            }
            Ok(block)
        }
        fn d_residual_d_temperature(&mut self, _state: &LocalState) -> Result<Vector, FdError> {
            Ok(Vector::new(9))
        }
        fn previous_cauchy_stress(&mut self, state: &LocalState) -> Result<Vector, FdError> {
            let f0 = state.chain.previous_configuration(0);
            let eye = ten_identity();
            let mut sig = Vector::new(9);
            for c in 0..9 {
                sig[c] = self.kk * (f0[c] - eye[c]);
            }
            Ok(sig)
        }
    }

    /// A defective module whose Jacobian block is identically zero
    struct MockSingular {}

    impl ResidualModule for MockSingular {
        fn name(&self) -> &'static str {
            "mock-singular"
        }
        fn n_equations(&self) -> usize {
            9
        }
        fn equation_scales(&self, scales: &mut [f64]) {
            scales.iter_mut().for_each(|s| *s = 1.0);
        }
        fn residual(&mut self, _state: &LocalState) -> Result<Vector, FdError> {
            let mut rr = Vector::new(9);
            rr.fill(1.0);
            Ok(rr)
        }
        fn jacobian(&mut self, state: &LocalState) -> Result<Matrix, FdError> {
            Ok(Matrix::new(9, state.layout.dim()))
        }
        fn d_residual_d_f(&mut self, _state: &LocalState) -> Result<Matrix, FdError> {
            Ok(Matrix::new(9, 9))
        }
        fn d_residual_d_temperature(&mut self, _state: &LocalState) -> Result<Vector, FdError> {
            Ok(Vector::new(9))
        }
        fn previous_cauchy_stress(&mut self, _state: &LocalState) -> Result<Vector, FdError> {
            Ok(Vector::new(9))
        }
    }

    fn sample_state(total: &Vector) -> LocalState {
        let chain = ConfigurationChain::new(total, &ten_identity(), &[], 1, 1e-9).unwrap();
        LocalState {
            chain,
            stress: Vector::new(9),
            previous_stress: Vector::new(9),
            solve_vars: Vector::new(0),
            previous_solve_vars: Vector::new(0),
            previous_carried_vars: Vector::new(0),
            temperature: 293.15,
            previous_temperature: 293.15,
            time: 0.0,
            delta_time: 0.1,
            layout: UnknownLayout {
                n_configurations: 1,
                n_solve_vars: 0,
            },
        }
    }

    #[test]
    fn solve_and_tangents_work() {
        let total = Vector::from(&[1.001, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let mut state = sample_state(&total);
        let kk = 1000.0;
        let mut modules: Vec<Box<dyn ResidualModule>> = vec![Box::new(MockSpring { kk })];
        let settings = Settings::new();
        let mut solver = NonlinearSolver::new(&settings, 9);
        solver.solve(&mut state, &mut modules).unwrap();

        // σ = k (F - I)
        let mut expected = Vector::new(9);
        expected[0] = kk * 0.001;
        vec_approx_eq(&state.stress, &expected, 1e-10);

        // ∂σ/∂F = k I₉ and ∂σ/∂T = 0
        let (dstress_df, dstress_dt) = solver.tangents(&state, &mut modules).unwrap();
        for r in 0..9 {
            approx_eq(dstress_dt[r], 0.0, 1e-15);
            for c in 0..9 {
                let expected = if r == c { kk } else { 0.0 };
                approx_eq(dstress_df.get(r, c), expected, 1e-10);
            }
        }
    }

    #[test]
    fn solve_captures_singular_jacobian() {
        let total = ten_identity();
        let mut state = sample_state(&total);
        let mut modules: Vec<Box<dyn ResidualModule>> = vec![Box::new(MockSingular {})];
        let settings = Settings::new();
        let mut solver = NonlinearSolver::new(&settings, 9);
        assert_eq!(
            solver.solve(&mut state, &mut modules).err(),
            Some(FdError::SingularJacobian("cannot factorize the Jacobian matrix"))
        );
    }

    #[test]
    fn solve_captures_equation_count_mismatch() {
        let total = ten_identity();
        let mut state = sample_state(&total);
        state.layout.n_solve_vars = 1; // one more unknown than equations
        state.solve_vars = Vector::new(1);
        let mut modules: Vec<Box<dyn ResidualModule>> = vec![Box::new(MockSpring { kk: 1.0 })];
        let settings = Settings::new();
        let mut solver = NonlinearSolver::new(&settings, 10);
        assert_eq!(
            solver.solve(&mut state, &mut modules).err(),
            Some(FdError::ParameterMismatch(
                "the total number of residual equations does not match the number of unknowns"
            ))
        );
    }
}
