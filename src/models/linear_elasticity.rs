use crate::base::FdError;
use crate::core::{DataCell, LocalState, ResidualModule};
use crate::tensor::{ten_green_lagrange, ten_inverse, ten_push_forward, ten_trace};
use russell_lab::{mat_mat_mul, Matrix, Vector};

/// Implements the stress-carrier residual with a Saint Venant-Kirchhoff law
///
/// The reference stress follows from the Green-Lagrange strain of the first
/// configuration and is pushed forward to the current frame:
///
/// ```text
/// E = (F₀ᵀF₀ - I)/2,   S = λ tr(E) I + 2μ E,   σ̂ = F₀ S F₀ᵀ / det(F₀)
/// ```
///
/// Contributes the nine equations σ - σ̂(F₀) = 0.
pub struct LinearElasticity {
    /// Lamé parameter λ
    lambda: f64,

    /// Shear modulus μ
    mu: f64,

    /// Constitutive stress σ̂ at the current iterate
    stress: DataCell<Vector>,

    /// ∂σ̂/∂F₀ at the current iterate
    stress_gradient: DataCell<Matrix>,

    /// Constitutive stress of the previous step
    previous_stress: DataCell<Vector>,
}

impl LinearElasticity {
    /// Allocates a new instance
    pub fn new(lambda: f64, mu: f64) -> Result<Self, FdError> {
        if lambda < 0.0 {
            return Err(FdError::ParameterMismatch(
                "lambda parameter for the linear elasticity model is invalid",
            ));
        }
        if mu <= 0.0 {
            return Err(FdError::ParameterMismatch(
                "mu parameter for the linear elasticity model must be positive",
            ));
        }
        Ok(LinearElasticity {
            lambda,
            mu,
            stress: DataCell::new(),
            stress_gradient: DataCell::new(),
            previous_stress: DataCell::new(),
        })
    }
}

/// Computes σ̂ = push-forward of λ tr(E) I + 2μ E through f
fn constitutive_stress(lambda: f64, mu: f64, f: &Vector) -> Result<Vector, FdError> {
    let mut e = Vector::new(9);
    ten_green_lagrange(&mut e, f);
    let tr = ten_trace(&e);
    let mut s = Vector::new(9);
    for c in 0..9 {
        s[c] = 2.0 * mu * e[c];
    }
    s[0] += lambda * tr;
    s[4] += lambda * tr;
    s[8] += lambda * tr;
    let mut sig = Vector::new(9);
    ten_push_forward(&mut sig, &s, f)
        .map_err(|_| FdError::InvalidKinematics("the elastic configuration is not invertible"))?;
    Ok(sig)
}

/// Computes the 9×9 map ∂σ̂/∂F₀
///
/// With J = det(F), B = F·Fᵀ, and S the reference stress:
///
/// ```text
/// ∂σ_ij/∂F_kl = -σ_ij F⁻¹_lk
///             + [ δ_ik (S Fᵀ)_lj + δ_jk (F S)_il
///               + λ F_kl B_ij + μ (B_ik F_jl + F_il B_jk) ] / J
/// ```
fn constitutive_stress_gradient(lambda: f64, mu: f64, f: &Vector) -> Result<Matrix, FdError> {
    let mut fi = Vector::new(9);
    let det = ten_inverse(&mut fi, f)
        .map_err(|_| FdError::InvalidKinematics("the elastic configuration is not invertible"))?;
    let mut e = Vector::new(9);
    ten_green_lagrange(&mut e, f);
    let tr = ten_trace(&e);
    let mut s = Vector::new(9);
    for c in 0..9 {
        s[c] = 2.0 * mu * e[c];
    }
    s[0] += lambda * tr;
    s[4] += lambda * tr;
    s[8] += lambda * tr;

    // helpers: σ, S·Fᵀ, F·S, B = F·Fᵀ
    let sig = constitutive_stress(lambda, mu, f)?;
    let mut s_ft = Vector::new(9);
    let mut f_s = Vector::new(9);
    let mut b = Vector::new(9);
    for i in 0..3 {
        for j in 0..3 {
            let mut sum_sft = 0.0;
            let mut sum_fs = 0.0;
            let mut sum_b = 0.0;
            for a in 0..3 {
                sum_sft += s[3 * i + a] * f[3 * j + a];
                sum_fs += f[3 * i + a] * s[3 * a + j];
                sum_b += f[3 * i + a] * f[3 * j + a];
            }
            s_ft[3 * i + j] = sum_sft;
            f_s[3 * i + j] = sum_fs;
            b[3 * i + j] = sum_b;
        }
    }

    let mut d = Matrix::new(9, 9);
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                for l in 0..3 {
                    let mut val = -sig[3 * i + j] * fi[3 * l + k];
                    let mut inner = lambda * f[3 * k + l] * b[3 * i + j]
                        + mu * (b[3 * i + k] * f[3 * j + l] + f[3 * i + l] * b[3 * j + k]);
                    if i == k {
                        inner += s_ft[3 * l + j];
                    }
                    if j == k {
                        inner += f_s[3 * i + l];
                    }
                    val += inner / det;
                    d.set(3 * i + j, 3 * k + l, val);
                }
            }
        }
    }
    Ok(d)
}

impl ResidualModule for LinearElasticity {
    fn name(&self) -> &'static str {
        "linear-elasticity"
    }

    fn n_equations(&self) -> usize {
        9
    }

    /// Scales the stress equations by the uniaxial-strain modulus
    fn equation_scales(&self, scales: &mut [f64]) {
        let scale = self.lambda + 2.0 * self.mu;
        scales.iter_mut().for_each(|s| *s = scale);
    }

    fn clear_iteration_data(&mut self) {
        self.stress.clear();
        self.stress_gradient.clear();
    }

    fn residual(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let (lambda, mu) = (self.lambda, self.mu);
        let sig = self
            .stress
            .get_or_try_init(|| constitutive_stress(lambda, mu, state.chain.configuration(0)))?;
        let mut rr = Vector::new(9);
        for c in 0..9 {
            rr[c] = state.stress[c] - sig[c];
        }
        Ok(rr)
    }

    fn jacobian(&mut self, state: &LocalState) -> Result<Matrix, FdError> {
        let (lambda, mu) = (self.lambda, self.mu);
        let d1 = self
            .stress_gradient
            .get_or_try_init(|| constitutive_stress_gradient(lambda, mu, state.chain.configuration(0)))?;
        let dim = state.layout.dim();
        let mut jj = Matrix::new(9, dim);
        for r in 0..9 {
            jj.set(r, r, 1.0);
        }
        let n_conf = state.layout.n_configurations;
        if n_conf > 1 {
            let mut coupling = Matrix::new(9, 9 * (n_conf - 1));
            mat_mat_mul(&mut coupling, -1.0, d1, state.chain.df1_dconfigs(), 0.0).unwrap();
            for r in 0..9 {
                for c in 0..9 * (n_conf - 1) {
                    jj.set(r, 9 + c, coupling.get(r, c));
                }
            }
        }
        Ok(jj)
    }

    fn d_residual_d_f(&mut self, state: &LocalState) -> Result<Matrix, FdError> {
        let (lambda, mu) = (self.lambda, self.mu);
        let d1 = self
            .stress_gradient
            .get_or_try_init(|| constitutive_stress_gradient(lambda, mu, state.chain.configuration(0)))?;
        let mut block = Matrix::new(9, 9);
        mat_mat_mul(&mut block, -1.0, d1, state.chain.df1_df(), 0.0).unwrap();
        Ok(block)
    }

    fn d_residual_d_temperature(&mut self, _state: &LocalState) -> Result<Vector, FdError> {
        Ok(Vector::new(9))
    }

    fn cauchy_stress(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let (lambda, mu) = (self.lambda, self.mu);
        let sig = self
            .stress
            .get_or_try_init(|| constitutive_stress(lambda, mu, state.chain.configuration(0)))?;
        Ok(sig.clone())
    }

    fn previous_cauchy_stress(&mut self, state: &LocalState) -> Result<Vector, FdError> {
        let (lambda, mu) = (self.lambda, self.mu);
        let sig = self
            .previous_stress
            .get_or_try_init(|| constitutive_stress(lambda, mu, state.chain.previous_configuration(0)))?;
        Ok(sig.clone())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{constitutive_stress, constitutive_stress_gradient, LinearElasticity};
    use crate::base::FdError;
    use russell_lab::{approx_eq, deriv1_central5, Vector};

    #[test]
    fn new_captures_errors() {
        assert_eq!(
            LinearElasticity::new(-1.0, 1.0).err(),
            Some(FdError::ParameterMismatch(
                "lambda parameter for the linear elasticity model is invalid"
            ))
        );
        assert_eq!(
            LinearElasticity::new(0.0, 0.0).err(),
            Some(FdError::ParameterMismatch(
                "mu parameter for the linear elasticity model must be positive"
            ))
        );
    }

    #[test]
    fn stress_vanishes_at_identity() {
        let eye = Vector::from(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let sig = constitutive_stress(600.0, 400.0, &eye).unwrap();
        for c in 0..9 {
            approx_eq(sig[c], 0.0, 1e-15);
        }
    }

    #[test]
    fn small_strain_limit_is_isotropic_elasticity() {
        // uniaxial strain ε: σ11 ≈ (λ+2μ)ε and σ22 = σ33 ≈ λε
        let (lambda, mu) = (600.0, 400.0);
        let eps = 1e-8;
        let f = Vector::from(&[1.0 + eps, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let sig = constitutive_stress(lambda, mu, &f).unwrap();
        approx_eq(sig[0], (lambda + 2.0 * mu) * eps, 1e-12);
        approx_eq(sig[4], lambda * eps, 1e-12);
        approx_eq(sig[8], lambda * eps, 1e-12);
    }

    #[test]
    fn stress_gradient_works() {
        let (lambda, mu) = (600.0, 400.0);
        let f = Vector::from(&[1.05, 0.02, -0.01, 0.01, 0.97, 0.03, 0.0, 0.01, 1.02]);
        let ana = constitutive_stress_gradient(lambda, mu, &f).unwrap();
        struct Args {
            f: Vector,
        }
        let mut args = Args { f: f.clone() };
        for r in 0..9 {
            for c in 0..9 {
                let num = deriv1_central5(f[c], &mut args, |x, args| {
                    let original = args.f[c];
                    args.f[c] = x;
                    let sig = constitutive_stress(600.0, 400.0, &args.f).unwrap();
                    args.f[c] = original;
                    Ok(sig[r])
                })
                .unwrap();
                approx_eq(ana.get(r, c), num, 1e-5);
            }
        }
    }

    #[test]
    fn gradient_at_identity_is_the_small_strain_tangent() {
        let (lambda, mu) = (600.0, 400.0);
        let eye = Vector::from(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let d = constitutive_stress_gradient(lambda, mu, &eye).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    for l in 0..3 {
                        let mut expected = 0.0;
                        if i == j && k == l {
                            expected += lambda;
                        }
                        if i == k && j == l {
                            expected += mu;
                        }
                        if i == l && j == k {
                            expected += mu;
                        }
                        approx_eq(d.get(3 * i + j, 3 * k + l), expected, 1e-13);
                    }
                }
            }
        }
    }
}
