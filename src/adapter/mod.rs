//! Implements the host-code adapter (UMAT-shaped entry point)
//!
//! Translates column-major 3×3 arrays from the host into the framework's
//! row-major tensors, decodes the flat parameter vector into a model
//! composition, runs one [Driver] per call, and maps failures onto exit
//! codes. On any non-zero exit the stress, history, and tangent buffers are
//! left untouched.
//!
//! # Parameter vector layouts
//!
//! The first slot selects the material model; the following slots are
//! positional:
//!
//! ```text
//! 1  linear elastic          [1, λ, μ]
//! 2  thermo-elastic          [2, λ, μ, Tref, A (9), B (9)]
//! 3  viscoelastic            [3, nvol, niso, α, K∞, G∞,
//!                             K₁…K_nvol, τK₁…τK_nvol, G₁…G_niso, τG₁…τG_niso,
//!                             C1v, C2v, Trefv, C1i, C2i, Trefi]
//! 4  thermo-viscoplastic     [4, λ, μ, Tref, A (9), B (9),
//!                             n, q0, q1, C1, C2, Trefw, Y, Ay, Bf, h0, h1, β]
//! 5  elastic-viscoplastic    [5, λ, μ, n, q0, q1, C1, C2, Trefw, Y, Ay, Bf, h0, h1, β]
//! ```
//!
//! The expansion tensors A and B are row-major and symmetric. The history
//! vector layout is `[F₁ … F₍ₙ₋₁₎ (row-major, 9 each), Ξs, Ξc]`; a history
//! buffer that is entirely zero denotes a pristine point and seeds every
//! configuration to the identity.
//!
//! [Driver]: crate::core::Driver

use crate::base::{
    FdError, ModelComposition, ParamStressCarrier, ParamThermalExpansion, ParamViscoelastic, ParamViscoplastic,
    ParamWlf, Settings,
};
use crate::core::{Driver, DriverInput};
use russell_lab::Vector;

/// Exit code: success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code: recoverable non-convergence (the host should cut the time step)
pub const EXIT_NOT_CONVERGED: i32 = 1;

/// Exit code: fatal error (invalid input, parameter mismatch, singular system)
pub const EXIT_FATAL: i32 = 2;

/// Decodes the flat parameter vector into a model composition
pub fn decompose_parameter_vector(props: &[f64]) -> Result<ModelComposition, FdError> {
    if props.is_empty() {
        return Err(FdError::ParameterMismatch("the parameter vector is empty"));
    }
    let code = props[0].round() as i64;
    match code {
        1 => {
            if props.len() != 3 {
                return Err(FdError::ParameterMismatch(
                    "the parameter vector length does not match the model code",
                ));
            }
            Ok(ModelComposition {
                stress_carrier: ParamStressCarrier::LinearElastic {
                    lambda: props[1],
                    mu: props[2],
                },
                thermal: None,
                plastic: None,
            })
        }
        2 => {
            if props.len() != 22 {
                return Err(FdError::ParameterMismatch(
                    "the parameter vector length does not match the model code",
                ));
            }
            Ok(ModelComposition {
                stress_carrier: ParamStressCarrier::LinearElastic {
                    lambda: props[1],
                    mu: props[2],
                },
                thermal: Some(parse_thermal(&props[3..22])),
                plastic: None,
            })
        }
        3 => {
            if props.len() < 3 {
                return Err(FdError::ParameterMismatch(
                    "the parameter vector length does not match the model code",
                ));
            }
            let n_vol = props[1].round() as usize;
            let n_iso = props[2].round() as usize;
            let expected = 12 + 2 * (n_vol + n_iso);
            if props.len() != expected {
                return Err(FdError::ParameterMismatch(
                    "the parameter vector length does not match the declared branch counts",
                ));
            }
            let mut at = 6;
            let kk_moduli = props[at..at + n_vol].to_vec();
            at += n_vol;
            let kk_taus = props[at..at + n_vol].to_vec();
            at += n_vol;
            let gg_moduli = props[at..at + n_iso].to_vec();
            at += n_iso;
            let gg_taus = props[at..at + n_iso].to_vec();
            at += n_iso;
            let volumetric_wlf = ParamWlf {
                c1: props[at],
                c2: props[at + 1],
                t_ref: props[at + 2],
            };
            let isochoric_wlf = ParamWlf {
                c1: props[at + 3],
                c2: props[at + 4],
                t_ref: props[at + 5],
            };
            Ok(ModelComposition {
                stress_carrier: ParamStressCarrier::Viscoelastic(ParamViscoelastic {
                    kk_inf: props[4],
                    gg_inf: props[5],
                    kk_moduli,
                    kk_taus,
                    gg_moduli,
                    gg_taus,
                    volumetric_wlf,
                    isochoric_wlf,
                    alpha: props[3],
                }),
                thermal: None,
                plastic: None,
            })
        }
        4 => {
            if props.len() != 34 {
                return Err(FdError::ParameterMismatch(
                    "the parameter vector length does not match the model code",
                ));
            }
            Ok(ModelComposition {
                stress_carrier: ParamStressCarrier::LinearElastic {
                    lambda: props[1],
                    mu: props[2],
                },
                thermal: Some(parse_thermal(&props[3..22])),
                plastic: Some(parse_viscoplastic(&props[22..34])),
            })
        }
        5 => {
            if props.len() != 15 {
                return Err(FdError::ParameterMismatch(
                    "the parameter vector length does not match the model code",
                ));
            }
            Ok(ModelComposition {
                stress_carrier: ParamStressCarrier::LinearElastic {
                    lambda: props[1],
                    mu: props[2],
                },
                thermal: None,
                plastic: Some(parse_viscoplastic(&props[3..15])),
            })
        }
        _ => Err(FdError::ParameterMismatch("unknown material model code")),
    }
}

/// Parses the 19 thermal-expansion slots [Tref, A (9), B (9)]
fn parse_thermal(slice: &[f64]) -> ParamThermalExpansion {
    let mut linear = [0.0; 9];
    let mut quadratic = [0.0; 9];
    linear.copy_from_slice(&slice[1..10]);
    quadratic.copy_from_slice(&slice[10..19]);
    ParamThermalExpansion {
        t_ref: slice[0],
        linear,
        quadratic,
    }
}

/// Parses the 12 viscoplasticity slots [n, q0, q1, C1, C2, Tref, Y, A, B, h0, h1, β]
fn parse_viscoplastic(slice: &[f64]) -> ParamViscoplastic {
    ParamViscoplastic {
        exponent: slice[0],
        drag0: slice[1],
        drag1: slice[2],
        wlf: ParamWlf {
            c1: slice[3],
            c2: slice[4],
            t_ref: slice[5],
        },
        yield_tensile: slice[6],
        yield_pressure: slice[7],
        flow_pressure: slice[8],
        hard0: slice[9],
        hard1: slice[10],
        beta: slice[11],
    }
}

/// Updates one material point from host arrays (UMAT-shaped)
///
/// # Input
///
/// * `stress` -- in/out Cauchy stress (column-major 3×3, 9 values)
/// * `history` -- in/out history vector (framework layout)
/// * `dstress_df` -- out ∂σ/∂F, 81 values indexed `[9a + b]` with
///   `a = i + 3j` (host component of σ) and `b = k + 3l` (host component of F)
/// * `dstress_dt` -- out ∂σ/∂T (host component order)
/// * `pnewdt` -- out suggested time-step scale
/// * `dfgrd0`, `dfgrd1` -- previous and current deformation gradients
///   (column-major 3×3)
/// * `temp`, `dtemp` -- temperature at the start of the increment and its increment
/// * `time`, `dtime` -- current time and time increment
/// * `props` -- flat parameter vector (see the module documentation)
/// * `celent`, `noel`, `npt` -- advisory (characteristic length, element, point)
///
/// # Output
///
/// Returns 0 on success, 1 on recoverable non-convergence, and 2 on fatal
/// errors. The output buffers are written on success only.
#[allow(clippy::too_many_arguments)]
pub fn update_material_point(
    stress: &mut [f64],
    history: &mut [f64],
    dstress_df: &mut [f64],
    dstress_dt: &mut [f64],
    pnewdt: &mut f64,
    dfgrd0: &[f64],
    dfgrd1: &[f64],
    temp: f64,
    dtemp: f64,
    time: f64,
    dtime: f64,
    props: &[f64],
    _celent: f64,
    _noel: i32,
    _npt: i32,
) -> i32 {
    if stress.len() != 9 || dstress_df.len() != 81 || dstress_dt.len() != 9 || dfgrd0.len() != 9 || dfgrd1.len() != 9
    {
        *pnewdt = 0.0;
        return EXIT_FATAL;
    }
    let model = match decompose_parameter_vector(props) {
        Ok(model) => model,
        Err(_) => {
            *pnewdt = 0.0;
            return EXIT_FATAL;
        }
    };

    // transpose the host tensors into the row-major layout
    let mut current = [0.0; 9];
    let mut previous = [0.0; 9];
    for i in 0..3 {
        for j in 0..3 {
            current[3 * i + j] = dfgrd1[i + 3 * j];
            previous[3 * i + j] = dfgrd0[i + 3 * j];
        }
    }

    // an all-zero history denotes a pristine point
    let history_in = if history.iter().all(|value| *value == 0.0) {
        Driver::initial_history(&model)
    } else {
        let mut vec = Vector::new(history.len());
        for (k, value) in history.iter().enumerate() {
            vec[k] = *value;
        }
        vec
    };

    let input = DriverInput {
        time,
        delta_time: dtime,
        temperature: temp + dtemp,
        previous_temperature: temp,
        deformation_gradient: current,
        previous_deformation_gradient: previous,
        history: history_in,
    };
    let settings = Settings::new();
    let mut driver = match Driver::new(&input, &model, &settings) {
        Ok(driver) => driver,
        Err(error) => return map_failure(error, pnewdt),
    };
    let output = match driver.run() {
        Ok(output) => output,
        Err(error) => return map_failure(error, pnewdt),
    };

    // write back: symmetrized stress in column-major order
    for i in 0..3 {
        for j in 0..3 {
            stress[i + 3 * j] = 0.5 * (output.stress[3 * i + j] + output.stress[3 * j + i]);
        }
    }
    if history.len() == output.history.dim() {
        for (k, slot) in history.iter_mut().enumerate() {
            *slot = output.history[k];
        }
    }
    for i in 0..3 {
        for j in 0..3 {
            let a = i + 3 * j;
            dstress_dt[a] = output.dstress_dt[3 * i + j];
            for k in 0..3 {
                for l in 0..3 {
                    let b = k + 3 * l;
                    dstress_df[9 * a + b] = output.dstress_df.get(3 * i + j, 3 * k + l);
                }
            }
        }
    }
    *pnewdt = output.timestep_scale;
    EXIT_SUCCESS
}

/// Maps a failure kind onto the exit code and the time-step suggestion
fn map_failure(error: FdError, pnewdt: &mut f64) -> i32 {
    if error.is_recoverable() {
        *pnewdt = 0.5;
        EXIT_NOT_CONVERGED
    } else {
        *pnewdt = 0.0;
        EXIT_FATAL
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{decompose_parameter_vector, update_material_point, EXIT_FATAL, EXIT_SUCCESS};
    use crate::base::{FdError, ParamStressCarrier};
    use russell_lab::approx_eq;

    #[test]
    fn decompose_parameter_vector_works() {
        assert_eq!(
            decompose_parameter_vector(&[]).err(),
            Some(FdError::ParameterMismatch("the parameter vector is empty"))
        );
        assert_eq!(
            decompose_parameter_vector(&[9.0]).err(),
            Some(FdError::ParameterMismatch("unknown material model code"))
        );
        assert_eq!(
            decompose_parameter_vector(&[1.0, 600.0]).err(),
            Some(FdError::ParameterMismatch(
                "the parameter vector length does not match the model code"
            ))
        );
        let model = decompose_parameter_vector(&[1.0, 600.0, 400.0]).unwrap();
        match model.stress_carrier {
            ParamStressCarrier::LinearElastic { lambda, mu } => {
                assert_eq!(lambda, 600.0);
                assert_eq!(mu, 400.0);
            }
            _ => panic!("wrong stress carrier"),
        }

        // viscoelastic with 2 volumetric and 1 isochoric branches
        let mut props = vec![3.0, 2.0, 1.0, 0.5, 200.0, 150.0];
        props.extend_from_slice(&[300.0, 100.0]); // K moduli
        props.extend_from_slice(&[0.5, 5.0]); // K taus
        props.extend_from_slice(&[80.0]); // G moduli
        props.extend_from_slice(&[1.0]); // G taus
        props.extend_from_slice(&[0.0, 100.0, 293.15, 0.0, 100.0, 293.15]);
        let model = decompose_parameter_vector(&props).unwrap();
        assert_eq!(model.n_carried_variables(), 2 + 9);
        props.pop();
        assert_eq!(
            decompose_parameter_vector(&props).err(),
            Some(FdError::ParameterMismatch(
                "the parameter vector length does not match the declared branch counts"
            ))
        );
    }

    #[test]
    fn elastic_update_works() {
        // uniaxial stretch of a linear-elastic point
        let (lambda, mu) = (600.0, 400.0);
        let props = [1.0, lambda, mu];
        let eps = 1e-5;
        let dfgrd0 = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let dfgrd1 = [1.0 + eps, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut stress = [0.0; 9];
        let mut history: [f64; 0] = [];
        let mut dstress_df = [0.0; 81];
        let mut dstress_dt = [0.0; 9];
        let mut pnewdt = 1.0;
        let code = update_material_point(
            &mut stress,
            &mut history,
            &mut dstress_df,
            &mut dstress_dt,
            &mut pnewdt,
            &dfgrd0,
            &dfgrd1,
            293.15,
            0.0,
            0.1,
            0.1,
            &props,
            1.0,
            1,
            1,
        );
        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(pnewdt, 1.0);
        approx_eq(stress[0], (lambda + 2.0 * mu) * eps, 1e-6);
        approx_eq(stress[4], lambda * eps, 1e-6);
        approx_eq(stress[8], lambda * eps, 1e-6);
        // tangent entry (00,00) approaches λ+2μ
        approx_eq(dstress_df[0], lambda + 2.0 * mu, 1.0);
    }

    #[test]
    fn degenerate_parameters_leave_outputs_untouched() {
        // λ = μ = 0 must fail fatally without touching the buffers
        let props = [1.0, 0.0, 0.0];
        let eye = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut stress = [7.0; 9];
        let mut history: [f64; 0] = [];
        let mut dstress_df = [7.0; 81];
        let mut dstress_dt = [7.0; 9];
        let mut pnewdt = 1.0;
        let code = update_material_point(
            &mut stress,
            &mut history,
            &mut dstress_df,
            &mut dstress_dt,
            &mut pnewdt,
            &eye,
            &eye,
            293.15,
            0.0,
            0.1,
            0.1,
            &props,
            1.0,
            1,
            1,
        );
        assert_eq!(code, EXIT_FATAL);
        assert_eq!(pnewdt, 0.0);
        assert!(stress.iter().all(|value| *value == 7.0));
        assert!(dstress_df.iter().all(|value| *value == 7.0));
        assert!(dstress_dt.iter().all(|value| *value == 7.0));
    }

    #[test]
    fn wrong_history_length_is_fatal() {
        let props = [1.0, 600.0, 400.0];
        let eye = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut stress = [0.0; 9];
        let mut history = [0.1; 4]; // the elastic model carries no history
        let mut dstress_df = [0.0; 81];
        let mut dstress_dt = [0.0; 9];
        let mut pnewdt = 1.0;
        let code = update_material_point(
            &mut stress,
            &mut history,
            &mut dstress_df,
            &mut dstress_dt,
            &mut pnewdt,
            &eye,
            &eye,
            293.15,
            0.0,
            0.1,
            0.1,
            &props,
            1.0,
            1,
            1,
        );
        assert_eq!(code, EXIT_FATAL);
    }
}
