use crate::base::{FdError, ParamThermalExpansion};
use crate::core::{DataCell, LocalState, ResidualModule};
use crate::tensor::{sylvester_sqrt, ten_sqrt_spd};
use russell_lab::{Matrix, Vector};

/// Implements the kinematic residual of quadratic thermal expansion
///
/// The thermal Green-Lagrange strain follows the temperature quadratically,
///
/// ```text
/// Eθ = A ΔT + B ΔT²,   ΔT = T - Tref
/// ```
///
/// and the thermal configuration is the unique symmetric positive-definite
/// tensor with FθᵀFθ = 2Eθ + I. Contributes the nine equations
/// F_k - F̂θ(T) = 0 on its chain slot and owns no state variables.
///
/// The cached cells are evaluated at the first requested temperature; the
/// driver temperature is fixed over a driver lifetime.
pub struct ThermalExpansion {
    /// Chain slot of the thermal configuration
    slot: usize,

    /// Reference temperature
    t_ref: f64,

    /// Linear expansion tensor A
    linear: Vector,

    /// Quadratic expansion tensor B
    quadratic: Vector,

    /// Thermal Green-Lagrange strain at the driver temperature
    strain: DataCell<Vector>,

    /// Thermal deformation gradient at the driver temperature
    deformation: DataCell<Vector>,

    /// Temperature derivative of the thermal deformation gradient
    deformation_rate: DataCell<Vector>,
}

impl ThermalExpansion {
    /// Allocates a new instance
    pub fn new(param: &ParamThermalExpansion, slot: usize) -> Result<Self, FdError> {
        for i in 0..3 {
            for j in (i + 1)..3 {
                if f64::abs(param.linear[3 * i + j] - param.linear[3 * j + i]) > 1e-14
                    || f64::abs(param.quadratic[3 * i + j] - param.quadratic[3 * j + i]) > 1e-14
                {
                    return Err(FdError::ParameterMismatch(
                        "the thermal expansion tensors must be symmetric",
                    ));
                }
            }
        }
        if slot == 0 {
            return Err(FdError::ParameterMismatch(
                "the thermal configuration cannot occupy the stress-carrier slot",
            ));
        }
        Ok(ThermalExpansion {
            slot,
            t_ref: param.t_ref,
            linear: Vector::from(&param.linear),
            quadratic: Vector::from(&param.quadratic),
            strain: DataCell::new(),
            deformation: DataCell::new(),
            deformation_rate: DataCell::new(),
        })
    }

    /// Computes the thermal Green-Lagrange strain at a given temperature
    pub fn thermal_strain(&mut self, temperature: f64) -> Result<&Vector, FdError> {
        let (t_ref, linear, quadratic) = (self.t_ref, &self.linear, &self.quadratic);
        self.strain
            .get_or_try_init(|| Ok(strain_at(t_ref, linear, quadratic, temperature)))
    }

    /// Computes the thermal deformation gradient at a given temperature
    pub fn thermal_deformation_gradient(&mut self, temperature: f64) -> Result<&Vector, FdError> {
        let (t_ref, linear, quadratic) = (self.t_ref, &self.linear, &self.quadratic);
        self.deformation
            .get_or_try_init(|| deformation_at(t_ref, linear, quadratic, temperature))
    }

    /// Computes the temperature derivative of the thermal deformation gradient
    pub fn thermal_deformation_rate(&mut self, temperature: f64) -> Result<&Vector, FdError> {
        let (t_ref, linear, quadratic) = (self.t_ref, &self.linear, &self.quadratic);
        self.deformation_rate
            .get_or_try_init(|| deformation_rate_at(t_ref, linear, quadratic, temperature))
    }
}

/// Computes Eθ = A ΔT + B ΔT²
fn strain_at(t_ref: f64, linear: &Vector, quadratic: &Vector, temperature: f64) -> Vector {
    let dt = temperature - t_ref;
    let mut e = Vector::new(9);
    for c in 0..9 {
        e[c] = linear[c] * dt + quadratic[c] * dt * dt;
    }
    e
}

/// Computes Fθ as the SPD root of 2Eθ + I
fn deformation_at(t_ref: f64, linear: &Vector, quadratic: &Vector, temperature: f64) -> Result<Vector, FdError> {
    let e = strain_at(t_ref, linear, quadratic, temperature);
    let mut c = Vector::new(9);
    for com in 0..9 {
        c[com] = 2.0 * e[com];
    }
    c[0] += 1.0;
    c[4] += 1.0;
    c[8] += 1.0;
    let mut f = Vector::new(9);
    ten_sqrt_spd(&mut f, &c)
        .map_err(|_| FdError::InvalidKinematics("the thermal stretch tensor is not positive-definite"))?;
    Ok(f)
}

/// Computes dFθ/dT by differentiating Fθ·Fθ = 2Eθ + I
fn deformation_rate_at(t_ref: f64, linear: &Vector, quadratic: &Vector, temperature: f64) -> Result<Vector, FdError> {
    let f = deformation_at(t_ref, linear, quadratic, temperature)?;
    let dt = temperature - t_ref;
    let mut dc_dt = Vector::new(9);
    for c in 0..9 {
        dc_dt[c] = 2.0 * (linear[c] + 2.0 * quadratic[c] * dt);
    }
    let mut rate = Vector::new(9);
    sylvester_sqrt(&mut rate, &f, &dc_dt)
        .map_err(|_| FdError::InvalidKinematics("cannot differentiate the thermal stretch tensor"))?;
    Ok(rate)
}

impl ResidualModule for ThermalExpansion {
    fn name(&self) -> &'static str {
        "thermal-expansion"
    }

    fn n_equations(&self) -> usize {
        9
    }

    /// Scales the configuration equations with unity (dimensionless)
    fn equation_scales(&self, scales: &mut [f64]) {
        scales.iter_mut().for_each(|s| *s = 1.0);
    }

    // the cells depend only on the driver temperature, which is fixed over
    // the iterations, so there is nothing to clear per iteration

    fn residual(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let slot = self.slot;
        let f_theta = self.thermal_deformation_gradient(state.temperature)?;
        let f_slot = state.chain.configuration(slot);
        let mut rr = Vector::new(9);
        for c in 0..9 {
            rr[c] = f_slot[c] - f_theta[c];
        }
        Ok(rr)
    }

    fn jacobian(&mut self, state: &LocalState) -> Result<Matrix, FdError> {
        let dim = state.layout.dim();
        let mut jj = Matrix::new(9, dim);
        let offset = state.layout.configuration_offset(self.slot);
        for r in 0..9 {
            jj.set(r, offset + r, 1.0);
        }
        Ok(jj)
    }

    fn d_residual_d_f(&mut self, _state: &LocalState) -> Result<Matrix, FdError> {
        Ok(Matrix::new(9, 9))
    }

    fn d_residual_d_temperature(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let rate = self.thermal_deformation_rate(state.temperature)?;
        let mut block = Vector::new(9);
        for c in 0..9 {
            block[c] = -rate[c];
        }
        Ok(block)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::ThermalExpansion;
    use crate::base::{FdError, SampleParams};
    use russell_lab::{approx_eq, deriv1_central5, Vector};

    #[test]
    fn new_captures_errors() {
        let mut param = SampleParams::param_thermal_expansion();
        param.linear[1] = 1e-6; // breaks symmetry
        assert_eq!(
            ThermalExpansion::new(&param, 1).err(),
            Some(FdError::ParameterMismatch("the thermal expansion tensors must be symmetric"))
        );
        let param = SampleParams::param_thermal_expansion();
        assert_eq!(
            ThermalExpansion::new(&param, 0).err(),
            Some(FdError::ParameterMismatch(
                "the thermal configuration cannot occupy the stress-carrier slot"
            ))
        );
    }

    #[test]
    fn deformation_matches_the_isotropic_closed_form() {
        // with A = aI and B = bI: Fθ = sqrt(1 + 2(a ΔT + b ΔT²)) I
        let param = SampleParams::param_thermal_expansion();
        let mut module = ThermalExpansion::new(&param, 1).unwrap();
        let temperature = param.t_ref + 50.0;
        let dt = 50.0;
        let (a, b) = (param.linear[0], param.quadratic[0]);
        let expected = f64::sqrt(1.0 + 2.0 * (a * dt + b * dt * dt));
        let f = module.thermal_deformation_gradient(temperature).unwrap();
        approx_eq(f[0], expected, 1e-14);
        approx_eq(f[4], expected, 1e-14);
        approx_eq(f[8], expected, 1e-14);
        approx_eq(f[1], 0.0, 1e-14);
    }

    #[test]
    fn deformation_is_first_order_in_the_linear_tensor() {
        // Fθ ≈ I + A ΔT for small ΔT
        let param = SampleParams::param_thermal_expansion();
        let mut module = ThermalExpansion::new(&param, 1).unwrap();
        let dt = 1.0;
        let f = module.thermal_deformation_gradient(param.t_ref + dt).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let eye = if i == j { 1.0 } else { 0.0 };
                approx_eq(f[3 * i + j], eye + param.linear[3 * i + j] * dt, 1e-7);
            }
        }
    }

    #[test]
    fn deformation_rate_works() {
        // full (anisotropic) expansion tensors
        let mut param = SampleParams::param_thermal_expansion();
        param.linear = [2e-5, 3e-6, 0.0, 3e-6, 1e-5, 1e-6, 0.0, 1e-6, 1.5e-5];
        param.quadratic = [1e-8, 0.0, 2e-9, 0.0, 2e-8, 0.0, 2e-9, 0.0, 1e-8];
        let temperature = param.t_ref + 80.0;
        let mut module = ThermalExpansion::new(&param, 1).unwrap();
        let ana = module.thermal_deformation_rate(temperature).unwrap().clone();
        struct Args {
            param: crate::base::ParamThermalExpansion,
        }
        let mut args = Args { param };
        for r in 0..9 {
            let num = deriv1_central5(temperature, &mut args, |t, a| {
                let mut module = ThermalExpansion::new(&a.param, 1).unwrap();
                let f: &Vector = module.thermal_deformation_gradient(t).unwrap();
                Ok(f[r])
            })
            .unwrap();
            approx_eq(ana[r], num, 1e-10);
        }
    }
}
