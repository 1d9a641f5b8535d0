//! Implements the physical sub-models (residual modules)

mod linear_elasticity;
mod thermal_expansion;
mod viscoelasticity;
mod viscoplasticity;
pub use crate::models::linear_elasticity::*;
pub use crate::models::thermal_expansion::*;
pub use crate::models::viscoelasticity::*;
pub use crate::models::viscoplasticity::*;

use crate::base::{FdError, ModelComposition, ParamStressCarrier, ParamWlf};
use crate::core::ResidualModule;

/// Computes the Williams-Landel-Ferry shift factor
///
/// ```text
/// a(T) = 10^( -C1 (T - Tref) / (C2 + T - Tref) )
/// ```
pub fn wlf_shift(temperature: f64, param: &ParamWlf) -> Result<f64, FdError> {
    let dt = temperature - param.t_ref;
    let denom = param.c2 + dt;
    if f64::abs(denom) < 1e-10 {
        return Err(FdError::InvalidKinematics("the WLF denominator vanished"));
    }
    Ok(f64::powf(10.0, -param.c1 * dt / denom))
}

/// Computes the temperature derivative of the WLF shift factor
pub fn wlf_shift_derivative(temperature: f64, param: &ParamWlf) -> Result<f64, FdError> {
    let shift = wlf_shift(temperature, param)?;
    let dt = temperature - param.t_ref;
    let denom = param.c2 + dt;
    let du_dt = -param.c1 * param.c2 / (denom * denom);
    Ok(shift * f64::ln(10.0) * du_dt)
}

/// Allocates the residual modules of a model composition in declared order
///
/// The stress carrier comes first, followed by the thermal expansion and the
/// viscoplasticity modules (each owning one configuration slot).
pub fn allocate_modules(model: &ModelComposition) -> Result<Vec<Box<dyn ResidualModule>>, FdError> {
    let mut modules: Vec<Box<dyn ResidualModule>> = Vec::new();
    match &model.stress_carrier {
        ParamStressCarrier::LinearElastic { lambda, mu } => {
            modules.push(Box::new(LinearElasticity::new(*lambda, *mu)?));
        }
        ParamStressCarrier::Viscoelastic(param) => {
            modules.push(Box::new(Viscoelasticity::new(param, 0)?));
        }
    }
    if let Some(param) = &model.thermal {
        let slot = model.thermal_slot().unwrap();
        modules.push(Box::new(ThermalExpansion::new(param, slot)?));
    }
    if let Some(param) = &model.plastic {
        let slot = model.plastic_slot().unwrap();
        modules.push(Box::new(Viscoplasticity::new(param, slot, 0)?));
    }
    Ok(modules)
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{allocate_modules, wlf_shift, wlf_shift_derivative};
    use crate::base::{FdError, ParamWlf, SampleParams};
    use russell_lab::{approx_eq, deriv1_central5};

    #[test]
    fn wlf_shift_works() {
        let param = ParamWlf {
            c1: 17.44,
            c2: 51.6,
            t_ref: 300.0,
        };
        // at the reference temperature the shift is one
        approx_eq(wlf_shift(300.0, &param).unwrap(), 1.0, 1e-15);
        // hand-computed value at T = Tref + 10
        let expected = f64::powf(10.0, -17.44 * 10.0 / (51.6 + 10.0));
        approx_eq(wlf_shift(310.0, &param).unwrap(), expected, 1e-15);
        // vanishing denominator
        assert_eq!(
            wlf_shift(300.0 - 51.6, &param).err(),
            Some(FdError::InvalidKinematics("the WLF denominator vanished"))
        );
    }

    #[test]
    fn wlf_shift_derivative_works() {
        let param = ParamWlf {
            c1: 17.44,
            c2: 51.6,
            t_ref: 300.0,
        };
        let ana = wlf_shift_derivative(310.0, &param).unwrap();
        struct Args {
            param: ParamWlf,
        }
        let mut args = Args { param };
        let num = deriv1_central5(310.0, &mut args, |t, a| Ok(wlf_shift(t, &a.param).unwrap())).unwrap();
        approx_eq(ana, num, 1e-9);
    }

    #[test]
    fn allocate_modules_works() {
        let modules = allocate_modules(&SampleParams::thermo_viscoplastic()).unwrap();
        assert_eq!(modules.len(), 3);
        assert_eq!(modules[0].name(), "linear-elasticity");
        assert_eq!(modules[1].name(), "thermal-expansion");
        assert_eq!(modules[2].name(), "perzyna-viscoplasticity");
        let neq: usize = modules.iter().map(|m| m.n_equations()).sum();
        assert_eq!(neq, 9 + 9 + 10);

        let modules = allocate_modules(&SampleParams::viscoelastic_relaxation()).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name(), "prony-viscoelasticity");
        assert_eq!(modules[0].n_carried_vars(), 11);
    }
}
