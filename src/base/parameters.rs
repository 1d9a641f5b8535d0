use serde::{Deserialize, Serialize};

/// Holds parameters for the Williams-Landel-Ferry temperature shift
///
/// ```text
/// log10(a) = -C1 (T - Tref) / (C2 + T - Tref)
/// ```
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ParamWlf {
    /// C1 coefficient
    pub c1: f64,

    /// C2 coefficient (same unit as temperature)
    pub c2: f64,

    /// Reference temperature
    pub t_ref: f64,
}

/// Holds parameters for the stress-carrier constitutive law (first chain slot)
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum ParamStressCarrier {
    /// Saint Venant-Kirchhoff elasticity pushed forward through the elastic configuration
    ///
    /// ```text
    /// S = λ tr(E) I + 2μ E,   σ = F₁ S F₁ᵀ / det(F₁)
    /// ```
    LinearElastic {
        /// Lamé parameter λ
        lambda: f64,

        /// Shear modulus μ
        mu: f64,
    },

    /// Prony-series linear viscoelasticity with volumetric/isochoric split
    Viscoelastic(ParamViscoelastic),
}

/// Holds parameters for the Prony-series linear viscoelasticity model
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ParamViscoelastic {
    /// Long-term (fully relaxed) bulk modulus
    pub kk_inf: f64,

    /// Long-term (fully relaxed) shear modulus
    pub gg_inf: f64,

    /// Bulk moduli of the volumetric Maxwell branches
    pub kk_moduli: Vec<f64>,

    /// Relaxation times of the volumetric Maxwell branches
    pub kk_taus: Vec<f64>,

    /// Shear moduli of the isochoric Maxwell branches
    pub gg_moduli: Vec<f64>,

    /// Relaxation times of the isochoric Maxwell branches
    pub gg_taus: Vec<f64>,

    /// Temperature shift of the volumetric relaxation times
    pub volumetric_wlf: ParamWlf,

    /// Temperature shift of the isochoric relaxation times
    pub isochoric_wlf: ParamWlf,

    /// Generalized-midpoint integration parameter (0 implicit, 1 explicit)
    pub alpha: f64,
}

impl ParamViscoelastic {
    /// Returns the number of volumetric Maxwell branches
    pub fn n_volumetric(&self) -> usize {
        self.kk_moduli.len()
    }

    /// Returns the number of isochoric Maxwell branches
    pub fn n_isochoric(&self) -> usize {
        self.gg_moduli.len()
    }

    /// Returns the number of carried branch state variables
    ///
    /// One scalar per volumetric branch and one full tensor per isochoric branch.
    pub fn n_branch_variables(&self) -> usize {
        self.n_volumetric() + 9 * self.n_isochoric()
    }
}

/// Holds parameters for the quadratic thermal expansion model
///
/// The thermal Green-Lagrange strain is
///
/// ```text
/// Eθ = A (T - Tref) + B (T - Tref)²
/// ```
///
/// with A and B symmetric second-order tensors in the row-major layout.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ParamThermalExpansion {
    /// Reference (stress-free) temperature
    pub t_ref: f64,

    /// Linear expansion tensor A (row-major, symmetric)
    pub linear: [f64; 9],

    /// Quadratic expansion tensor B (row-major, symmetric)
    pub quadratic: [f64; 9],
}

/// Holds parameters for the Perzyna viscoplasticity model
///
/// Drucker-Prager yield and flow surfaces with linear isotropic hardening:
///
/// ```text
/// f = σeq + A tr(σ̃) - Y
/// g = σeq + B tr(σ̃)
/// γ̇ = aT(T) ⟨f/q⟩ⁿ,   q = q0 + q1 ξ,   ξ̇ = γ̇ (h0 + h1 ξ)
/// ```
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ParamViscoplastic {
    /// Perzyna rate-sensitivity exponent n
    pub exponent: f64,

    /// Initial drag stress q0
    pub drag0: f64,

    /// Drag modulus q1
    pub drag1: f64,

    /// Temperature shift of the plastic rate
    pub wlf: ParamWlf,

    /// Tensile strength Y of the yield surface
    pub yield_tensile: f64,

    /// Pressure coefficient A of the yield surface
    pub yield_pressure: f64,

    /// Pressure coefficient B of the flow potential
    pub flow_pressure: f64,

    /// Hardening offset h0
    pub hard0: f64,

    /// Hardening modulus h1
    pub hard1: f64,

    /// Weight of the current rates in the update (1 fully implicit; 0.5 midpoint)
    pub beta: f64,
}

/// Holds the composition of a material model as an ordered configuration chain
///
/// The stress carrier always occupies the first slot. The optional thermal
/// and plastic modules occupy the following slots in this order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelComposition {
    /// Stress-carrier constitutive law (first configuration)
    pub stress_carrier: ParamStressCarrier,

    /// Optional thermal expansion (own configuration slot)
    pub thermal: Option<ParamThermalExpansion>,

    /// Optional viscoplasticity (own configuration slot plus hardening variable)
    pub plastic: Option<ParamViscoplastic>,
}

impl ModelComposition {
    /// Returns the number of configurations in the chain
    pub fn n_configurations(&self) -> usize {
        1 + (self.thermal.is_some() as usize) + (self.plastic.is_some() as usize)
    }

    /// Returns the chain slot of the thermal configuration (if present)
    pub fn thermal_slot(&self) -> Option<usize> {
        self.thermal.as_ref().map(|_| 1)
    }

    /// Returns the chain slot of the plastic configuration (if present)
    pub fn plastic_slot(&self) -> Option<usize> {
        self.plastic
            .as_ref()
            .map(|_| 1 + (self.thermal.is_some() as usize))
    }

    /// Returns the number of solve-coupled state variables
    pub fn n_solve_variables(&self) -> usize {
        if self.plastic.is_some() {
            1
        } else {
            0
        }
    }

    /// Returns the number of carried state variables
    pub fn n_carried_variables(&self) -> usize {
        match &self.stress_carrier {
            ParamStressCarrier::LinearElastic { .. } => 0,
            ParamStressCarrier::Viscoelastic(param) => param.n_branch_variables(),
        }
    }

    /// Returns the length of the history vector
    ///
    /// The layout is `[F₂ … F_n (9 each), Ξs, Ξc]` and is part of the
    /// external contract.
    pub fn history_len(&self) -> usize {
        9 * (self.n_configurations() - 1) + self.n_solve_variables() + self.n_carried_variables()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
