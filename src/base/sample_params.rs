use super::{
    ModelComposition, ParamStressCarrier, ParamThermalExpansion, ParamViscoelastic, ParamViscoplastic, ParamWlf,
};

/// Holds samples of material model parameters
pub struct SampleParams {}

impl SampleParams {
    /// Returns a linear-elastic model (single configuration)
    pub fn linear_elastic() -> ModelComposition {
        ModelComposition {
            stress_carrier: ParamStressCarrier::LinearElastic {
                lambda: 600.0, // kPa
                mu: 400.0,     // kPa
            },
            thermal: None,
            plastic: None,
        }
    }

    /// Returns sample quadratic thermal expansion parameters
    pub fn param_thermal_expansion() -> ParamThermalExpansion {
        let a = 1e-5; // 1/K
        let b = 1e-8; // 1/K²
        ParamThermalExpansion {
            t_ref: 293.15, // K
            linear: [a, 0.0, 0.0, 0.0, a, 0.0, 0.0, 0.0, a],
            quadratic: [b, 0.0, 0.0, 0.0, b, 0.0, 0.0, 0.0, b],
        }
    }

    /// Returns a linear-elastic model with thermal expansion (two configurations)
    pub fn thermo_elastic() -> ModelComposition {
        let mut model = SampleParams::linear_elastic();
        model.thermal = Some(SampleParams::param_thermal_expansion());
        model
    }

    /// Returns sample Perzyna viscoplasticity parameters
    ///
    /// Calibrated for loading paths reaching stresses of order one so that
    /// the yield surface is crossed partway through the history.
    pub fn param_viscoplastic() -> ParamViscoplastic {
        ParamViscoplastic {
            exponent: 1.0,
            drag0: 0.5, // kPa
            drag1: 0.0,
            wlf: ParamWlf {
                c1: 0.0, // isothermal shift aT = 1
                c2: 100.0,
                t_ref: 293.15,
            },
            yield_tensile: 0.3, // kPa
            yield_pressure: 0.1,
            flow_pressure: 0.1,
            hard0: 1.0,
            hard1: 0.0,
            beta: 0.5,
        }
    }

    /// Returns a linear-elastic model with Perzyna viscoplasticity
    pub fn elastic_viscoplastic() -> ModelComposition {
        let mut model = SampleParams::linear_elastic();
        model.plastic = Some(SampleParams::param_viscoplastic());
        model
    }

    /// Returns the full chain: elasticity, thermal expansion, viscoplasticity
    pub fn thermo_viscoplastic() -> ModelComposition {
        let mut model = SampleParams::linear_elastic();
        model.thermal = Some(SampleParams::param_thermal_expansion());
        model.plastic = Some(SampleParams::param_viscoplastic());
        model
    }

    /// Returns a two-branch volumetric Prony model with one isochoric branch
    pub fn viscoelastic_relaxation() -> ModelComposition {
        ModelComposition {
            stress_carrier: ParamStressCarrier::Viscoelastic(ParamViscoelastic {
                kk_inf: 200.0, // kPa
                gg_inf: 150.0, // kPa
                kk_moduli: vec![300.0, 100.0],
                kk_taus: vec![0.5, 5.0], // s
                gg_moduli: vec![80.0],
                gg_taus: vec![1.0],
                volumetric_wlf: ParamWlf {
                    c1: 0.0,
                    c2: 100.0,
                    t_ref: 293.15,
                },
                isochoric_wlf: ParamWlf {
                    c1: 0.0,
                    c2: 100.0,
                    t_ref: 293.15,
                },
                alpha: 0.5,
            }),
            thermal: None,
            plastic: None,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
