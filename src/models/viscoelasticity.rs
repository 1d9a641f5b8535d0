use super::{wlf_shift, wlf_shift_derivative};
use crate::base::{FdError, ParamViscoelastic};
use crate::core::{DataCell, LocalState, ResidualModule};
use crate::tensor::{ten_det, ten_green_lagrange, ten_inverse, ten_push_forward};
use russell_lab::{mat_mat_mul, Matrix, Vector};

/// Holds the constitutive response evaluated at one iterate
struct Response {
    /// Cauchy stress σ̂
    stress: Vector,

    /// ∂σ̂/∂F₀ (9×9)
    stress_gradient: Matrix,

    /// ∂σ̂/∂T (9)
    stress_rate: Vector,

    /// Updated branch state variables [ξ_vol, Ξ_iso]
    branch_vars: Vector,
}

/// Implements the stress carrier with Prony-series linear viscoelasticity
///
/// The elastic configuration splits into volumetric and isochoric parts,
///
/// ```text
/// Je = det(F₀),   F̂ = Je^(-1/3) F₀,   ev = Je - 1,   Ê = GL(F̂)
/// ```
///
/// and the reference stress combines the long-term response with Maxwell
/// branches integrated by the generalized midpoint rule (α = 0 implicit,
/// α = 1 explicit), with WLF temperature shifts of the relaxation times:
///
/// ```text
/// PK2 = 2 [G∞ Ê + Σ Gⱼ (Ê - Ξⱼ)] + [K∞ ev + Σ Kᵢ (ev - ξᵢ)] I
/// ```
///
/// Contributes the nine stress equations σ - σ̂ = 0 and owns the branch
/// variables as carried state (updated after convergence).
pub struct Viscoelasticity {
    /// Model parameters
    param: ParamViscoelastic,

    /// Offset of the branch variables within the carried partition
    carried_offset: usize,

    /// Constitutive response at the current iterate
    response: DataCell<Response>,

    /// Constitutive stress of the previous step
    previous_stress: DataCell<Vector>,
}

impl Viscoelasticity {
    /// Allocates a new instance
    pub fn new(param: &ParamViscoelastic, carried_offset: usize) -> Result<Self, FdError> {
        if param.kk_taus.len() != param.kk_moduli.len() {
            return Err(FdError::ParameterMismatch(
                "the volumetric moduli and relaxation times have different counts",
            ));
        }
        if param.gg_taus.len() != param.gg_moduli.len() {
            return Err(FdError::ParameterMismatch(
                "the isochoric moduli and relaxation times have different counts",
            ));
        }
        if param.kk_taus.iter().any(|tau| *tau <= 0.0) || param.gg_taus.iter().any(|tau| *tau <= 0.0) {
            return Err(FdError::ParameterMismatch("a relaxation time is not positive"));
        }
        if param.kk_inf < 0.0
            || param.gg_inf < 0.0
            || param.kk_moduli.iter().any(|kk| *kk < 0.0)
            || param.gg_moduli.iter().any(|gg| *gg < 0.0)
        {
            return Err(FdError::ParameterMismatch("a branch modulus is negative"));
        }
        let total: f64 = param.kk_inf
            + param.gg_inf
            + param.kk_moduli.iter().sum::<f64>()
            + param.gg_moduli.iter().sum::<f64>();
        if total <= 0.0 {
            return Err(FdError::ParameterMismatch(
                "the viscoelastic model needs a positive modulus",
            ));
        }
        if param.alpha < 0.0 || param.alpha > 1.0 {
            return Err(FdError::ParameterMismatch(
                "alpha parameter for the viscoelastic model must be in [0, 1]",
            ));
        }
        Ok(Viscoelasticity {
            param: param.clone(),
            carried_offset,
            response: DataCell::new(),
            previous_stress: DataCell::new(),
        })
    }
}

/// Computes the full constitutive response at the current iterate
fn compute_response(
    param: &ParamViscoelastic,
    f0: &Vector,
    f0_prev: &Vector,
    previous_vars: &[f64],
    temperature: f64,
    previous_temperature: f64,
    delta_time: f64,
) -> Result<Response, FdError> {
    let je = ten_det(f0);
    if je <= 0.0 {
        return Err(FdError::InvalidKinematics("the elastic volume change is not positive"));
    }
    let je_prev = ten_det(f0_prev);
    if je_prev <= 0.0 {
        return Err(FdError::InvalidKinematics(
            "the previous elastic volume change is not positive",
        ));
    }
    let mut fi = Vector::new(9);
    ten_inverse(&mut fi, f0).map_err(|_| FdError::InvalidKinematics("the elastic configuration is not invertible"))?;

    // volumetric/isochoric split of both snapshots
    let scale = f64::powf(je, -1.0 / 3.0);
    let scale_prev = f64::powf(je_prev, -1.0 / 3.0);
    let mut fhat = Vector::new(9);
    let mut fhat_prev = Vector::new(9);
    for c in 0..9 {
        fhat[c] = scale * f0[c];
        fhat_prev[c] = scale_prev * f0_prev[c];
    }
    let ev = je - 1.0;
    let ev_prev = je_prev - 1.0;
    let mut ehat = Vector::new(9);
    let mut ehat_prev = Vector::new(9);
    ten_green_lagrange(&mut ehat, &fhat);
    ten_green_lagrange(&mut ehat_prev, &fhat_prev);

    // WLF rate multipliers (the shifted branch rate is r/τ)
    let r_vol = wlf_shift(temperature, &param.volumetric_wlf)?;
    let r_vol_prev = wlf_shift(previous_temperature, &param.volumetric_wlf)?;
    let dr_vol = wlf_shift_derivative(temperature, &param.volumetric_wlf)?;
    let r_iso = wlf_shift(temperature, &param.isochoric_wlf)?;
    let r_iso_prev = wlf_shift(previous_temperature, &param.isochoric_wlf)?;
    let dr_iso = wlf_shift_derivative(temperature, &param.isochoric_wlf)?;

    let n_vol = param.n_volumetric();
    let n_iso = param.n_isochoric();
    let alpha = param.alpha;
    let mut branch_vars = Vector::new(param.n_branch_variables());

    // volumetric branches: mean stress, algorithmic bulk modulus, T-sensitivity
    let mut p_mean = param.kk_inf * ev;
    let mut kk_alg = param.kk_inf;
    let mut dp_dt = 0.0;
    for i in 0..n_vol {
        let tau = param.kk_taus[i];
        let a_c = (1.0 - alpha) * delta_time * r_vol / tau;
        let a_p = alpha * delta_time * r_vol_prev / tau;
        let xi_prev = previous_vars[i];
        let xi = (xi_prev + a_p * (ev_prev - xi_prev) + a_c * ev) / (1.0 + a_c);
        let da_c = (1.0 - alpha) * delta_time * dr_vol / tau;
        let dxi_dt = (ev - xi) / (1.0 + a_c) * da_c;
        p_mean += param.kk_moduli[i] * (ev - xi);
        kk_alg += param.kk_moduli[i] / (1.0 + a_c);
        dp_dt -= param.kk_moduli[i] * dxi_dt;
        branch_vars[i] = xi;
    }

    // isochoric branches (component-wise linear evolution)
    let mut s_iso = Vector::new(9);
    let mut ds_iso_dt = Vector::new(9);
    for c in 0..9 {
        s_iso[c] = 2.0 * param.gg_inf * ehat[c];
    }
    let mut gg_alg = param.gg_inf;
    for j in 0..n_iso {
        let tau = param.gg_taus[j];
        let a_c = (1.0 - alpha) * delta_time * r_iso / tau;
        let a_p = alpha * delta_time * r_iso_prev / tau;
        let da_c = (1.0 - alpha) * delta_time * dr_iso / tau;
        for c in 0..9 {
            let xi_prev = previous_vars[n_vol + 9 * j + c];
            let xi = (xi_prev + a_p * (ehat_prev[c] - xi_prev) + a_c * ehat[c]) / (1.0 + a_c);
            let dxi_dt = (ehat[c] - xi) / (1.0 + a_c) * da_c;
            s_iso[c] += 2.0 * param.gg_moduli[j] * (ehat[c] - xi);
            ds_iso_dt[c] -= 2.0 * param.gg_moduli[j] * dxi_dt;
            branch_vars[n_vol + 9 * j + c] = xi;
        }
        gg_alg += param.gg_moduli[j] / (1.0 + a_c);
    }

    // reference stress and push-forward
    let mut pk2 = s_iso.clone();
    pk2[0] += p_mean;
    pk2[4] += p_mean;
    pk2[8] += p_mean;
    let mut stress = Vector::new(9);
    ten_push_forward(&mut stress, &pk2, f0)
        .map_err(|_| FdError::InvalidKinematics("the elastic configuration is not invertible"))?;

    // temperature sensitivity: σ̇ = F (dS/dT) Fᵀ / Je
    let mut ds_dt = ds_iso_dt.clone();
    ds_dt[0] += dp_dt;
    ds_dt[4] += dp_dt;
    ds_dt[8] += dp_dt;
    let mut stress_rate = Vector::new(9);
    ten_push_forward(&mut stress_rate, &ds_dt, f0)
        .map_err(|_| FdError::InvalidKinematics("the elastic configuration is not invertible"))?;

    // ∂σ̂/∂F₀ with the algorithmic moduli
    //
    // ∂S_ab/∂F_kl = K_alg Je F⁻¹_lk δ_ab + 2 G_alg ∂Ê_ab/∂F_kl
    // ∂Ê_ab/∂F_kl = Je^(-1/3) (δ_bl F̂_ka + δ_al F̂_kb)/2 - F⁻¹_lk (2Ê + I)_ab / 3
    let mut chat = Vector::new(9); // 2Ê + I
    for c in 0..9 {
        chat[c] = 2.0 * ehat[c];
    }
    chat[0] += 1.0;
    chat[4] += 1.0;
    chat[8] += 1.0;
    let mut s_ft = Vector::new(9);
    let mut f_s = Vector::new(9);
    for i in 0..3 {
        for j in 0..3 {
            let mut sum_sft = 0.0;
            let mut sum_fs = 0.0;
            for a in 0..3 {
                sum_sft += pk2[3 * i + a] * f0[3 * j + a];
                sum_fs += f0[3 * i + a] * pk2[3 * a + j];
            }
            s_ft[3 * i + j] = sum_sft;
            f_s[3 * i + j] = sum_fs;
        }
    }
    let mut stress_gradient = Matrix::new(9, 9);
    let mut ds = Vector::new(9);
    for k in 0..3 {
        for l in 0..3 {
            // dS for this (k,l) direction
            for a in 0..3 {
                for b in 0..3 {
                    let mut de = -fi[3 * l + k] * chat[3 * a + b] / 3.0;
                    if b == l {
                        de += scale * fhat[3 * k + a] / 2.0;
                    }
                    if a == l {
                        de += scale * fhat[3 * k + b] / 2.0;
                    }
                    let mut val = 2.0 * gg_alg * de;
                    if a == b {
                        val += kk_alg * je * fi[3 * l + k];
                    }
                    ds[3 * a + b] = val;
                }
            }
            // assemble ∂σ_ij/∂F_kl
            for i in 0..3 {
                for j in 0..3 {
                    let mut val = -stress[3 * i + j] * fi[3 * l + k];
                    let mut inner = 0.0;
                    if i == k {
                        inner += s_ft[3 * l + j];
                    }
                    if j == k {
                        inner += f_s[3 * i + l];
                    }
                    for a in 0..3 {
                        for b in 0..3 {
                            inner += f0[3 * i + a] * ds[3 * a + b] * f0[3 * j + b];
                        }
                    }
                    val += inner / je;
                    stress_gradient.set(3 * i + j, 3 * k + l, val);
                }
            }
        }
    }

    Ok(Response {
        stress,
        stress_gradient,
        stress_rate,
        branch_vars,
    })
}

/// Computes the previous stress from the previous snapshot (no integration)
fn compute_previous_stress(
    param: &ParamViscoelastic,
    f0_prev: &Vector,
    previous_vars: &[f64],
) -> Result<Vector, FdError> {
    let je = ten_det(f0_prev);
    if je <= 0.0 {
        return Err(FdError::InvalidKinematics(
            "the previous elastic volume change is not positive",
        ));
    }
    let scale = f64::powf(je, -1.0 / 3.0);
    let mut fhat = Vector::new(9);
    for c in 0..9 {
        fhat[c] = scale * f0_prev[c];
    }
    let ev = je - 1.0;
    let mut ehat = Vector::new(9);
    ten_green_lagrange(&mut ehat, &fhat);
    let n_vol = param.n_volumetric();
    let mut p_mean = param.kk_inf * ev;
    for i in 0..n_vol {
        p_mean += param.kk_moduli[i] * (ev - previous_vars[i]);
    }
    let mut pk2 = Vector::new(9);
    for c in 0..9 {
        pk2[c] = 2.0 * param.gg_inf * ehat[c];
    }
    for j in 0..param.n_isochoric() {
        for c in 0..9 {
            pk2[c] += 2.0 * param.gg_moduli[j] * (ehat[c] - previous_vars[n_vol + 9 * j + c]);
        }
    }
    pk2[0] += p_mean;
    pk2[4] += p_mean;
    pk2[8] += p_mean;
    let mut stress = Vector::new(9);
    ten_push_forward(&mut stress, &pk2, f0_prev)
        .map_err(|_| FdError::InvalidKinematics("the previous elastic configuration is not invertible"))?;
    Ok(stress)
}

impl Viscoelasticity {
    /// Evaluates (or returns the cached) response at the current iterate
    fn response(&mut self, state: &LocalState) -> Result<&Response, FdError> {
        let param = &self.param;
        let offset = self.carried_offset;
        self.response.get_or_try_init(|| {
            compute_response(
                param,
                state.chain.configuration(0),
                state.chain.previous_configuration(0),
                &state.previous_carried_vars.as_data()[offset..offset + param.n_branch_variables()],
                state.temperature,
                state.previous_temperature,
                state.delta_time,
            )
        })
    }
}

impl ResidualModule for Viscoelasticity {
    fn name(&self) -> &'static str {
        "prony-viscoelasticity"
    }

    fn n_equations(&self) -> usize {
        9
    }

    fn n_carried_vars(&self) -> usize {
        self.param.n_branch_variables()
    }

    /// Scales the stress equations with the instantaneous moduli
    fn equation_scales(&self, scales: &mut [f64]) {
        let scale = self.param.kk_inf
            + self.param.kk_moduli.iter().sum::<f64>()
            + 2.0 * (self.param.gg_inf + self.param.gg_moduli.iter().sum::<f64>());
        scales.iter_mut().for_each(|s| *s = scale);
    }

    fn clear_iteration_data(&mut self) {
        self.response.clear();
    }

    fn residual(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let response = self.response(state)?;
        let mut rr = Vector::new(9);
        for c in 0..9 {
            rr[c] = state.stress[c] - response.stress[c];
        }
        Ok(rr)
    }

    fn jacobian(&mut self, state: &LocalState) -> Result<Matrix, FdError> {
        let n_conf = state.layout.n_configurations;
        let dim = state.layout.dim();
        let df1_dconfigs = state.chain.df1_dconfigs().clone();
        let response = self.response(state)?;
        let mut jj = Matrix::new(9, dim);
        for r in 0..9 {
            jj.set(r, r, 1.0);
        }
        if n_conf > 1 {
            let mut coupling = Matrix::new(9, 9 * (n_conf - 1));
            mat_mat_mul(&mut coupling, -1.0, &response.stress_gradient, &df1_dconfigs, 0.0).unwrap();
            for r in 0..9 {
                for c in 0..9 * (n_conf - 1) {
                    jj.set(r, 9 + c, coupling.get(r, c));
                }
            }
        }
        Ok(jj)
    }

    fn d_residual_d_f(&mut self, state: &LocalState) -> Result<Matrix, FdError> {
        let df1_df = state.chain.df1_df().clone();
        let response = self.response(state)?;
        let mut block = Matrix::new(9, 9);
        mat_mat_mul(&mut block, -1.0, &response.stress_gradient, &df1_df, 0.0).unwrap();
        Ok(block)
    }

    fn d_residual_d_temperature(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let response = self.response(state)?;
        let mut block = Vector::new(9);
        for c in 0..9 {
            block[c] = -response.stress_rate[c];
        }
        Ok(block)
    }

    fn cauchy_stress(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let response = self.response(state)?;
        Ok(response.stress.clone())
    }

    fn previous_cauchy_stress(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let param = &self.param;
        let offset = self.carried_offset;
        let stress = self.previous_stress.get_or_try_init(|| {
            compute_previous_stress(
                param,
                state.chain.previous_configuration(0),
                &state.previous_carried_vars.as_data()[offset..offset + param.n_branch_variables()],
            )
        })?;
        Ok(stress.clone())
    }

    fn updated_carried_vars(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let response = self.response(state)?;
        Ok(response.branch_vars.clone())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
