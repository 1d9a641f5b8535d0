use super::{wlf_shift, wlf_shift_derivative};
use crate::base::{FdError, ParamViscoplastic, EQUIVALENT_STRESS_FLOOR};
use crate::core::{DataCell, LocalState, ResidualModule};
use crate::tensor::{
    deriv_pull_back, grad_postmul, ten_deviator, ten_exp_with_gradient, ten_inverse, ten_norm, ten_pull_back,
    ten_trace,
};
use russell_lab::{mat_mat_mul, mat_vec_mul, Matrix, Vector};

/// Holds the plastic flow quantities of the current iterate
struct FlowData {
    /// Flow direction n̂ = ∂g/∂σ̃
    flow_direction: Vector,

    /// Plastic multiplier γ̇
    gamma: f64,

    /// Hardening function h(ξ)
    hardening: f64,

    /// exp(Ω) with Ω = Δt ((1-β) L_prev + β L)
    exp_update: Vector,

    /// ∂exp(Ω)/∂Ω (9×9)
    exp_gradient: Matrix,

    /// ∂L/∂σ (9×9)
    dl_dstress: Matrix,

    /// ∂L/∂(F₁…F₍ₙ₋₁₎) (9×9(n-1))
    dl_dconfigs: Matrix,

    /// ∂L/∂F (9×9)
    dl_df: Matrix,

    /// ∂L/∂ξ (9)
    dl_dxi: Vector,

    /// ∂L/∂T (9)
    dl_dt: Vector,

    /// ∂γ̇/∂σ (9)
    dgamma_dstress: Vector,

    /// ∂γ̇/∂(F₁…F₍ₙ₋₁₎) (9(n-1))
    dgamma_dconfigs: Vector,

    /// ∂γ̇/∂F (9)
    dgamma_df: Vector,

    /// ∂γ̇/∂ξ
    dgamma_dxi: f64,

    /// ∂γ̇/∂T
    dgamma_dt: f64,
}

/// Holds the plastic flow quantities of the previous step
struct PreviousFlow {
    /// Previous velocity gradient L_prev = γ̇_prev n̂_prev
    velocity_gradient: Vector,

    /// Previous γ̇_prev h(ξ_prev)
    gamma_hardening: f64,
}

/// Implements the combined kinematic and state-variable plasticity residual
///
/// The driving stress is the Cauchy stress pulled back to the current local
/// configuration of the plastic slot. A Drucker-Prager surface with linear
/// isotropic hardening and a Perzyna overstress law govern the flow:
///
/// ```text
/// f = σeq + A tr(σ̃) - Y,   q = q0 + q1 ξ,   γ̇ = aT(T) ⟨f/q⟩ⁿ
/// n̂ = ∂g/∂σ̃ = (3/2) dev(σ̃)/σeq + B I,   L = γ̇ n̂
/// ```
///
/// The plastic configuration evolves by the exponential map with the
/// generalized trapezoidal weighting of the previous and current rates
/// (β = 1 fully implicit),
///
/// ```text
/// F_p = exp( Δt ((1-β) L_prev + β L) ) · F_p_prev
/// ξ   = ξ_prev + Δt ((1-β) γ̇_prev h_prev + β γ̇ h)
/// ```
///
/// contributing nine kinematic equations plus one hardening equation.
pub struct Viscoplasticity {
    /// Chain slot of the plastic configuration
    slot: usize,

    /// Index of the hardening variable within the solve-coupled partition
    var_index: usize,

    /// Model parameters
    param: ParamViscoplastic,

    /// Flow quantities at the current iterate
    flow: DataCell<FlowData>,

    /// Flow quantities of the previous step
    previous_flow: DataCell<PreviousFlow>,
}

impl Viscoplasticity {
    /// Allocates a new instance
    pub fn new(param: &ParamViscoplastic, slot: usize, var_index: usize) -> Result<Self, FdError> {
        if slot == 0 {
            return Err(FdError::ParameterMismatch(
                "the plastic configuration cannot occupy the stress-carrier slot",
            ));
        }
        if param.exponent <= 0.0 {
            return Err(FdError::ParameterMismatch("the Perzyna exponent must be positive"));
        }
        if param.drag0 <= 0.0 {
            return Err(FdError::ParameterMismatch("the initial drag stress must be positive"));
        }
        if param.drag1 < 0.0 {
            return Err(FdError::ParameterMismatch("the drag modulus must not be negative"));
        }
        if param.yield_tensile <= 0.0 {
            return Err(FdError::ParameterMismatch("the tensile strength must be positive"));
        }
        if param.beta < 0.0 || param.beta > 1.0 {
            return Err(FdError::ParameterMismatch(
                "beta parameter for the viscoplasticity model must be in [0, 1]",
            ));
        }
        Ok(Viscoplasticity {
            slot,
            var_index,
            param: *param,
            flow: DataCell::new(),
            previous_flow: DataCell::new(),
        })
    }

    /// Evaluates the previous-step and current flow cells if needed
    fn ensure_flow(&mut self, state: &LocalState) -> Result<(), FdError> {
        let param = self.param;
        let (slot, var_index) = (self.slot, self.var_index);
        if !self.previous_flow.is_evaluated() {
            let prev = compute_previous_flow(&param, slot, var_index, state)?;
            self.previous_flow.set(prev);
        }
        if !self.flow.is_evaluated() {
            let prev = self.previous_flow.get().unwrap();
            let flow = compute_flow(&param, slot, var_index, state, prev)?;
            self.flow.set(flow);
        }
        Ok(())
    }
}

/// Computes the value and gradient of a Drucker-Prager surface
///
/// ```text
/// value = σeq + coefficient tr(σ̃),   gradient = (3/2) dev(σ̃)/σeq + coefficient I
/// ```
///
/// The deviatoric part of the gradient is dropped below the equivalent-stress floor.
fn surface_value_and_gradient(sig: &Vector, coefficient: f64) -> (f64, Vector) {
    let mut dev = Vector::new(9);
    ten_deviator(&mut dev, sig);
    let mut sum = 0.0;
    for c in 0..9 {
        sum += dev[c] * dev[c];
    }
    let eq = f64::sqrt(1.5 * sum);
    let tr = ten_trace(sig);
    let mut grad = Vector::new(9);
    if eq > EQUIVALENT_STRESS_FLOOR * (1.0 + ten_norm(sig)) {
        for c in 0..9 {
            grad[c] = 1.5 * dev[c] / eq;
        }
    }
    grad[0] += coefficient;
    grad[4] += coefficient;
    grad[8] += coefficient;
    (eq + coefficient * tr, grad)
}

/// Computes the gradient of the deviatoric flow direction wrt the driving stress
///
/// ```text
/// ∂[(3/2) dev(σ̃)/σeq]_ij/∂σ̃_kl
///   = (3/2) (δ_ik δ_jl - δ_ij δ_kl/3)/σeq - (9/4) dev_ij dev_kl/σeq³
/// ```
fn flow_direction_gradient(sig: &Vector) -> Matrix {
    let mut d = Matrix::new(9, 9);
    let mut dev = Vector::new(9);
    ten_deviator(&mut dev, sig);
    let mut sum = 0.0;
    for c in 0..9 {
        sum += dev[c] * dev[c];
    }
    let eq = f64::sqrt(1.5 * sum);
    if eq <= EQUIVALENT_STRESS_FLOOR * (1.0 + ten_norm(sig)) {
        return d;
    }
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                for l in 0..3 {
                    let mut val = -2.25 * dev[3 * i + j] * dev[3 * k + l] / (eq * eq * eq);
                    if i == k && j == l {
                        val += 1.5 / eq;
                    }
                    if i == j && k == l {
                        val -= 0.5 / eq;
                    }
                    d.set(3 * i + j, 3 * k + l, val);
                }
            }
        }
    }
    d
}

/// Computes the previous velocity gradient and hardening rate (step-scoped)
fn compute_previous_flow(
    param: &ParamViscoplastic,
    slot: usize,
    var_index: usize,
    state: &LocalState,
) -> Result<PreviousFlow, FdError> {
    let preceding = state.chain.previous_preceding(slot);
    let mut drive = Vector::new(9);
    ten_pull_back(&mut drive, &state.previous_stress, &preceding)
        .map_err(|_| FdError::InvalidKinematics("the previous preceding sub-product is not invertible"))?;
    let (value, _) = surface_value_and_gradient(&drive, param.yield_pressure);
    let yield_function = value - param.yield_tensile;
    let (_, flow_direction) = surface_value_and_gradient(&drive, param.flow_pressure);
    let xi = state.previous_solve_vars[var_index];
    let drag = param.drag0 + param.drag1 * xi;
    if drag <= 0.0 {
        return Err(FdError::InvalidKinematics("the previous drag stress is not positive"));
    }
    let shift = wlf_shift(state.previous_temperature, &param.wlf)?;
    let gamma = if yield_function > 0.0 {
        shift * f64::powf(yield_function / drag, param.exponent)
    } else {
        0.0
    };
    let mut velocity_gradient = Vector::new(9);
    for c in 0..9 {
        velocity_gradient[c] = gamma * flow_direction[c];
    }
    Ok(PreviousFlow {
        velocity_gradient,
        gamma_hardening: gamma * (param.hard0 + param.hard1 * xi),
    })
}

/// Computes the flow quantities and their exact derivative maps
fn compute_flow(
    param: &ParamViscoplastic,
    slot: usize,
    var_index: usize,
    state: &LocalState,
    prev: &PreviousFlow,
) -> Result<FlowData, FdError> {
    let n_conf = state.layout.n_configurations;
    let ncfg = 9 * (n_conf - 1);

    // driving stress: pull-back of the Cauchy stress through the preceding product
    let preceding = state.chain.preceding(slot);
    let (dp_df, dp_dconfigs) = state.chain.preceding_gradients(slot);
    let mut pi = Vector::new(9);
    let jp = ten_inverse(&mut pi, &preceding)
        .map_err(|_| FdError::InvalidKinematics("the preceding sub-product is not invertible"))?;
    let mut drive = Vector::new(9);
    ten_pull_back(&mut drive, &state.stress, &preceding)
        .map_err(|_| FdError::InvalidKinematics("the preceding sub-product is not invertible"))?;

    // ∂σ̃/∂σ = det(P) P⁻¹_ik P⁻¹_jl
    let mut ddrive_dstress = Matrix::new(9, 9);
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                for l in 0..3 {
                    ddrive_dstress.set(3 * i + j, 3 * k + l, jp * pi[3 * i + k] * pi[3 * j + l]);
                }
            }
        }
    }

    // ∂σ̃/∂P chained into the configuration and deformation-gradient maps
    let mut ddrive_dp = Matrix::new(9, 9);
    deriv_pull_back(&mut ddrive_dp, &drive, &pi);
    let mut ddrive_dconfigs = Matrix::new(9, ncfg);
    if ncfg > 0 {
        mat_mat_mul(&mut ddrive_dconfigs, 1.0, &ddrive_dp, &dp_dconfigs, 0.0).unwrap();
    }
    let mut ddrive_df = Matrix::new(9, 9);
    mat_mat_mul(&mut ddrive_df, 1.0, &ddrive_dp, &dp_df, 0.0).unwrap();

    // yield function, flow direction, drag stress, thermal shift
    let (value, dyield_ddrive) = surface_value_and_gradient(&drive, param.yield_pressure);
    let yield_function = value - param.yield_tensile;
    let (_, flow_direction) = surface_value_and_gradient(&drive, param.flow_pressure);
    let dflow_ddrive = flow_direction_gradient(&drive);
    let xi = state.solve_vars[var_index];
    let drag = param.drag0 + param.drag1 * xi;
    if drag <= 0.0 {
        return Err(FdError::InvalidKinematics("the drag stress is not positive"));
    }
    let shift = wlf_shift(state.temperature, &param.wlf)?;
    let dshift = wlf_shift_derivative(state.temperature, &param.wlf)?;

    // Perzyna multiplier γ̇ = aT ⟨f/q⟩ⁿ and its partials
    let (gamma, dgamma_dyield, dgamma_ddrag, dgamma_dt) = if yield_function > 0.0 {
        let ratio = yield_function / drag;
        let pow = f64::powf(ratio, param.exponent);
        let pow_m1 = f64::powf(ratio, param.exponent - 1.0);
        (
            shift * pow,
            shift * param.exponent * pow_m1 / drag,
            -shift * param.exponent * pow / drag,
            dshift * pow,
        )
    } else {
        (0.0, 0.0, 0.0, 0.0)
    };

    // chain γ̇ through the driving stress
    let mut dgamma_dstress = Vector::new(9);
    let mut dgamma_dconfigs = Vector::new(ncfg);
    let mut dgamma_df = Vector::new(9);
    for c in 0..9 {
        let mut sum_s = 0.0;
        let mut sum_f = 0.0;
        for r in 0..9 {
            sum_s += dyield_ddrive[r] * ddrive_dstress.get(r, c);
            sum_f += dyield_ddrive[r] * ddrive_df.get(r, c);
        }
        dgamma_dstress[c] = dgamma_dyield * sum_s;
        dgamma_df[c] = dgamma_dyield * sum_f;
    }
    for c in 0..ncfg {
        let mut sum = 0.0;
        for r in 0..9 {
            sum += dyield_ddrive[r] * ddrive_dconfigs.get(r, c);
        }
        dgamma_dconfigs[c] = dgamma_dyield * sum;
    }
    let dgamma_dxi = dgamma_ddrag * param.drag1;

    // velocity gradient L = γ̇ n̂ and its maps
    let mut dn_dstress = Matrix::new(9, 9);
    mat_mat_mul(&mut dn_dstress, 1.0, &dflow_ddrive, &ddrive_dstress, 0.0).unwrap();
    let mut dn_dconfigs = Matrix::new(9, ncfg);
    if ncfg > 0 {
        mat_mat_mul(&mut dn_dconfigs, 1.0, &dflow_ddrive, &ddrive_dconfigs, 0.0).unwrap();
    }
    let mut dn_df = Matrix::new(9, 9);
    mat_mat_mul(&mut dn_df, 1.0, &dflow_ddrive, &ddrive_df, 0.0).unwrap();

    let mut velocity_gradient = Vector::new(9);
    for c in 0..9 {
        velocity_gradient[c] = gamma * flow_direction[c];
    }
    let mut dl_dstress = Matrix::new(9, 9);
    let mut dl_dconfigs = Matrix::new(9, ncfg);
    let mut dl_df = Matrix::new(9, 9);
    let mut dl_dxi = Vector::new(9);
    let mut dl_dt = Vector::new(9);
    for r in 0..9 {
        for c in 0..9 {
            dl_dstress.set(r, c, flow_direction[r] * dgamma_dstress[c] + gamma * dn_dstress.get(r, c));
            dl_df.set(r, c, flow_direction[r] * dgamma_df[c] + gamma * dn_df.get(r, c));
        }
        for c in 0..ncfg {
            dl_dconfigs.set(r, c, flow_direction[r] * dgamma_dconfigs[c] + gamma * dn_dconfigs.get(r, c));
        }
        dl_dxi[r] = flow_direction[r] * dgamma_dxi;
        dl_dt[r] = flow_direction[r] * dgamma_dt;
    }

    // exponential map of the weighted velocity-gradient increment
    let weight = param.beta * state.delta_time;
    let mut omega = Vector::new(9);
    for c in 0..9 {
        omega[c] = state.delta_time * (1.0 - param.beta) * prev.velocity_gradient[c] + weight * velocity_gradient[c];
    }
    let mut exp_update = Vector::new(9);
    let mut exp_gradient = Matrix::new(9, 9);
    ten_exp_with_gradient(&mut exp_update, &mut exp_gradient, &omega);

    Ok(FlowData {
        flow_direction,
        gamma,
        hardening: param.hard0 + param.hard1 * xi,
        exp_update,
        exp_gradient,
        dl_dstress,
        dl_dconfigs,
        dl_df,
        dl_dxi,
        dl_dt,
        dgamma_dstress,
        dgamma_dconfigs,
        dgamma_df,
        dgamma_dxi,
        dgamma_dt,
    })
}

impl ResidualModule for Viscoplasticity {
    fn name(&self) -> &'static str {
        "perzyna-viscoplasticity"
    }

    fn n_equations(&self) -> usize {
        10
    }

    fn n_solve_vars(&self) -> usize {
        1
    }

    /// Scales the kinematic and hardening equations with unity (dimensionless)
    fn equation_scales(&self, scales: &mut [f64]) {
        scales.iter_mut().for_each(|s| *s = 1.0);
    }

    fn clear_iteration_data(&mut self) {
        self.flow.clear();
    }

    fn residual(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        self.ensure_flow(state)?;
        let flow = self.flow.get().unwrap();
        let prev = self.previous_flow.get().unwrap();
        let f_p = state.chain.configuration(self.slot);
        let f_p_prev = state.chain.previous_configuration(self.slot);
        let mut rr = Vector::new(10);
        for i in 0..3 {
            for j in 0..3 {
                let mut update = 0.0;
                for a in 0..3 {
                    update += flow.exp_update[3 * i + a] * f_p_prev[3 * a + j];
                }
                rr[3 * i + j] = f_p[3 * i + j] - update;
            }
        }
        let xi = state.solve_vars[self.var_index];
        let xi_prev = state.previous_solve_vars[self.var_index];
        let beta = self.param.beta;
        rr[9] = xi
            - xi_prev
            - state.delta_time * ((1.0 - beta) * prev.gamma_hardening + beta * flow.gamma * flow.hardening);
        Ok(rr)
    }

    fn jacobian(&mut self, state: &LocalState) -> Result<Matrix, FdError> {
        self.ensure_flow(state)?;
        let flow = self.flow.get().unwrap();
        let f_p_prev = state.chain.previous_configuration(self.slot);
        let n_conf = state.layout.n_configurations;
        let ncfg = 9 * (n_conf - 1);
        let dim = state.layout.dim();
        let weight = self.param.beta * state.delta_time;
        let xi_col = state.layout.solve_vars_offset() + self.var_index;
        let mut jj = Matrix::new(10, dim);

        // kinematic rows: -∂(exp(Ω)·F_p_prev)/∂x through Ω = βΔt L (+ identity at F_p)
        let mut domega = Matrix::new(9, 9);
        let mut dexp = Matrix::new(9, 9);
        let mut dupdate = Matrix::new(9, 9);
        for r in 0..9 {
            for c in 0..9 {
                domega.set(r, c, weight * flow.dl_dstress.get(r, c));
            }
        }
        mat_mat_mul(&mut dexp, 1.0, &flow.exp_gradient, &domega, 0.0).unwrap();
        grad_postmul(&mut dupdate, &dexp, f_p_prev);
        for r in 0..9 {
            for c in 0..9 {
                jj.set(r, c, -dupdate.get(r, c));
            }
        }
        if ncfg > 0 {
            let mut domega = Matrix::new(9, ncfg);
            let mut dexp = Matrix::new(9, ncfg);
            let mut dupdate = Matrix::new(9, ncfg);
            for r in 0..9 {
                for c in 0..ncfg {
                    domega.set(r, c, weight * flow.dl_dconfigs.get(r, c));
                }
            }
            mat_mat_mul(&mut dexp, 1.0, &flow.exp_gradient, &domega, 0.0).unwrap();
            grad_postmul(&mut dupdate, &dexp, f_p_prev);
            for r in 0..9 {
                for c in 0..ncfg {
                    jj.set(r, 9 + c, -dupdate.get(r, c));
                }
            }
        }
        let offset = state.layout.configuration_offset(self.slot);
        for r in 0..9 {
            let cur = jj.get(r, offset + r);
            jj.set(r, offset + r, cur + 1.0);
        }
        let mut domega_xi = Vector::new(9);
        for c in 0..9 {
            domega_xi[c] = weight * flow.dl_dxi[c];
        }
        let mut dexp_xi = Vector::new(9);
        mat_vec_mul(&mut dexp_xi, 1.0, &flow.exp_gradient, &domega_xi).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let mut sum = 0.0;
                for a in 0..3 {
                    sum += dexp_xi[3 * i + a] * f_p_prev[3 * a + j];
                }
                jj.set(3 * i + j, xi_col, -sum);
            }
        }

        // hardening row: ∂/∂x of ξ - ξ_prev - Δt ((1-β)(γ̇h)_prev + β γ̇ h)
        let factor = weight * flow.hardening;
        for c in 0..9 {
            jj.set(9, c, -factor * flow.dgamma_dstress[c]);
        }
        for c in 0..ncfg {
            jj.set(9, 9 + c, -factor * flow.dgamma_dconfigs[c]);
        }
        jj.set(
            9,
            xi_col,
            1.0 - weight * (flow.dgamma_dxi * flow.hardening + flow.gamma * self.param.hard1),
        );
        Ok(jj)
    }

    fn d_residual_d_f(&mut self, state: &LocalState) -> Result<Matrix, FdError> {
        self.ensure_flow(state)?;
        let flow = self.flow.get().unwrap();
        let f_p_prev = state.chain.previous_configuration(self.slot);
        let weight = self.param.beta * state.delta_time;
        let mut block = Matrix::new(10, 9);
        let mut domega = Matrix::new(9, 9);
        let mut dexp = Matrix::new(9, 9);
        let mut dupdate = Matrix::new(9, 9);
        for r in 0..9 {
            for c in 0..9 {
                domega.set(r, c, weight * flow.dl_df.get(r, c));
            }
        }
        mat_mat_mul(&mut dexp, 1.0, &flow.exp_gradient, &domega, 0.0).unwrap();
        grad_postmul(&mut dupdate, &dexp, f_p_prev);
        for r in 0..9 {
            for c in 0..9 {
                block.set(r, c, -dupdate.get(r, c));
            }
        }
        let factor = weight * flow.hardening;
        for c in 0..9 {
            block.set(9, c, -factor * flow.dgamma_df[c]);
        }
        Ok(block)
    }

    fn d_residual_d_temperature(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        self.ensure_flow(state)?;
        let flow = self.flow.get().unwrap();
        let f_p_prev = state.chain.previous_configuration(self.slot);
        let weight = self.param.beta * state.delta_time;
        let mut block = Vector::new(10);
        let mut domega = Vector::new(9);
        for c in 0..9 {
            domega[c] = weight * flow.dl_dt[c];
        }
        let mut dexp = Vector::new(9);
        mat_vec_mul(&mut dexp, 1.0, &flow.exp_gradient, &domega).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let mut sum = 0.0;
                for a in 0..3 {
                    sum += dexp[3 * i + a] * f_p_prev[3 * a + j];
                }
                block[3 * i + j] = -sum;
            }
        }
        block[9] = -weight * flow.hardening * flow.dgamma_dt;
        Ok(block)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
