use super::{ConfigurationChain, LocalState, NonlinearSolver, ResidualModule, UnknownLayout};
use crate::base::{FdError, ModelComposition, Settings};
use crate::models::allocate_modules;
use russell_lab::{Matrix, Vector};

/// Holds the input of one material point update
#[derive(Clone, Debug)]
pub struct DriverInput {
    /// Current time
    pub time: f64,

    /// Time increment Δt
    pub delta_time: f64,

    /// Current temperature
    pub temperature: f64,

    /// Previous temperature
    pub previous_temperature: f64,

    /// Current deformation gradient (row-major, 9)
    pub deformation_gradient: [f64; 9],

    /// Previous deformation gradient (row-major, 9)
    pub previous_deformation_gradient: [f64; 9],

    /// Previous history vector with layout `[F₁ … F₍ₙ₋₁₎, Ξs, Ξc]`
    pub history: Vector,
}

/// Holds the output of one converged material point update
#[derive(Clone, Debug)]
pub struct DriverOutput {
    /// Updated Cauchy stress (row-major, 9)
    pub stress: Vector,

    /// Updated history vector, same layout as the input
    pub history: Vector,

    /// Material tangent ∂σ/∂F (9×9)
    pub dstress_df: Matrix,

    /// Temperature sensitivity ∂σ/∂T (9)
    pub dstress_dt: Vector,

    /// Suggested time-step scale factor (1.0 clean, less after heavy line search)
    pub timestep_scale: f64,

    /// Number of Newton-Raphson iterations
    pub iterations: usize,
}

/// Drives one material point update from instantiation to the tangents
///
/// A driver is built per quadrature point and host increment, runs the
/// nonlinear solve once, emits the outputs, and is dropped. It exclusively
/// owns its modules and state; no data is shared across driver instances.
pub struct Driver {
    /// Material point state (chain, iterates, previous-step data)
    state: LocalState,

    /// Physical sub-models in declared order (first is the stress carrier)
    modules: Vec<Box<dyn ResidualModule>>,

    /// Nonlinear solver workspace
    solver: NonlinearSolver,
}

impl Driver {
    /// Allocates a new instance
    pub fn new(input: &DriverInput, model: &ModelComposition, settings: &Settings) -> Result<Self, FdError> {
        settings
            .validate()
            .map_err(|_| FdError::ParameterMismatch("the solver settings are invalid"))?;
        if input.delta_time < 0.0 {
            return Err(FdError::ParameterMismatch("the time increment must not be negative"));
        }
        let n_conf = model.n_configurations();
        let n_solve = model.n_solve_variables();
        let n_carried = model.n_carried_variables();
        if input.history.dim() != 9 * (n_conf - 1) + n_solve + n_carried {
            return Err(FdError::ParameterMismatch(
                "the history vector length does not match the model composition",
            ));
        }

        let mut modules = allocate_modules(model)?;

        // decompose the history vector: [F₁…F₍ₙ₋₁₎, Ξs, Ξc]
        let hist = input.history.as_data();
        let n_packed = 9 * (n_conf - 1);
        let mut previous_solve_vars = Vector::new(n_solve);
        for k in 0..n_solve {
            previous_solve_vars[k] = hist[n_packed + k];
        }
        let mut previous_carried_vars = Vector::new(n_carried);
        for k in 0..n_carried {
            previous_carried_vars[k] = hist[n_packed + n_solve + k];
        }

        let total = Vector::from(&input.deformation_gradient);
        let total_prev = Vector::from(&input.previous_deformation_gradient);
        let chain = ConfigurationChain::new(&total, &total_prev, &hist[..n_packed], n_conf, settings.partition_tol)?;

        let layout = UnknownLayout {
            n_configurations: n_conf,
            n_solve_vars: n_solve,
        };
        let mut state = LocalState {
            chain,
            stress: Vector::new(9),
            previous_stress: Vector::new(9),
            solve_vars: previous_solve_vars.clone(),
            previous_solve_vars,
            previous_carried_vars,
            temperature: input.temperature,
            previous_temperature: input.previous_temperature,
            time: input.time,
            delta_time: input.delta_time,
            layout,
        };

        // bootstrap the previous stress from the stress carrier
        let previous_stress = modules[0].previous_cauchy_stress(&state)?;
        state.previous_stress = previous_stress;

        let solver = NonlinearSolver::new(settings, layout.dim());
        Ok(Driver {
            state,
            modules,
            solver,
        })
    }

    /// Returns the history vector of a pristine material point
    ///
    /// All configurations seed to the identity; all state variables to zero.
    pub fn initial_history(model: &ModelComposition) -> Vector {
        let n_conf = model.n_configurations();
        let mut history = Vector::new(model.history_len());
        for k in 0..n_conf - 1 {
            history[9 * k] = 1.0;
            history[9 * k + 4] = 1.0;
            history[9 * k + 8] = 1.0;
        }
        history
    }

    /// Runs the nonlinear solve and assembles the outputs
    pub fn run(&mut self) -> Result<DriverOutput, FdError> {
        self.solver.solve(&mut self.state, &mut self.modules)?;
        let (dstress_df, dstress_dt) = self.solver.tangents(&self.state, &mut self.modules)?;

        // updated history: converged configurations, Ξs, and the carried variables
        let n_conf = self.state.layout.n_configurations;
        let n_solve = self.state.layout.n_solve_vars;
        let n_packed = 9 * (n_conf - 1);
        let mut n_carried = 0;
        for module in &self.modules {
            n_carried += module.n_carried_vars();
        }
        let mut history = Vector::new(n_packed + n_solve + n_carried);
        self.state.chain.pack_configurations(&mut history.as_mut_data()[..n_packed]);
        for k in 0..n_solve {
            history[n_packed + k] = self.state.solve_vars[k];
        }
        let mut offset = n_packed + n_solve;
        for module in self.modules.iter_mut() {
            let n = module.n_carried_vars();
            if n > 0 {
                let updated = module.updated_carried_vars(&self.state)?;
                assert_eq!(updated.dim(), n);
                for k in 0..n {
                    history[offset + k] = updated[k];
                }
                offset += n;
            }
        }

        let timestep_scale = if self.solver.line_search_halvings() >= 3 { 0.75 } else { 1.0 };
        Ok(DriverOutput {
            stress: self.state.stress.clone(),
            history,
            dstress_df,
            dstress_dt,
            timestep_scale,
            iterations: self.solver.iterations(),
        })
    }

    /// Returns the current unknown vector (σ, configurations, Ξs)
    pub fn unknowns(&self) -> &Vector {
        self.solver.unknowns()
    }

    /// Evaluates the residual at an arbitrary unknown vector (verification)
    ///
    /// Moves the internal state to the given iterate; intended for
    /// finite-difference checks of the Jacobian after [Driver::run].
    pub fn residual_at(&mut self, x: &Vector) -> Result<Vector, FdError> {
        self.solver.residual_at(x, &mut self.state, &mut self.modules)
    }

    /// Evaluates the Jacobian at an arbitrary unknown vector (verification)
    pub fn jacobian_at(&mut self, x: &Vector) -> Result<Matrix, FdError> {
        self.solver.jacobian_at(x, &mut self.state, &mut self.modules)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{Driver, DriverInput};
    use crate::base::{FdError, SampleParams, Settings};
    use russell_lab::Vector;

    #[test]
    fn initial_history_works() {
        let model = SampleParams::thermo_viscoplastic();
        let history = Driver::initial_history(&model);
        assert_eq!(history.dim(), 19);
        // two identity tensors followed by a zero hardening variable
        for k in 0..2 {
            assert_eq!(history[9 * k], 1.0);
            assert_eq!(history[9 * k + 4], 1.0);
            assert_eq!(history[9 * k + 8], 1.0);
            assert_eq!(history[9 * k + 1], 0.0);
        }
        assert_eq!(history[18], 0.0);
    }

    #[test]
    fn new_captures_errors() {
        let model = SampleParams::linear_elastic();
        let eye = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut input = DriverInput {
            time: 0.0,
            delta_time: 0.1,
            temperature: 293.15,
            previous_temperature: 293.15,
            deformation_gradient: eye,
            previous_deformation_gradient: eye,
            history: Vector::new(3), // wrong length
        };
        let settings = Settings::new();
        assert_eq!(
            Driver::new(&input, &model, &settings).err(),
            Some(FdError::ParameterMismatch(
                "the history vector length does not match the model composition"
            ))
        );
        input.history = Vector::new(0);
        input.delta_time = -1.0;
        assert_eq!(
            Driver::new(&input, &model, &settings).err(),
            Some(FdError::ParameterMismatch("the time increment must not be negative"))
        );
        input.delta_time = 0.1;
        let mut wrong_settings = settings;
        wrong_settings.tol_abs = -1.0;
        assert_eq!(
            Driver::new(&input, &model, &wrong_settings).err(),
            Some(FdError::ParameterMismatch("the solver settings are invalid"))
        );
    }
}
