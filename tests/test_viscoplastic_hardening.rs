use fdmat::base::{FdError, SampleParams, Settings};
use fdmat::core::{Driver, DriverInput};
use fdmat::tensor::{ten_deviator, ten_trace};
use russell_lab::{approx_eq, Vector};

const EYE: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
const T_REF: f64 = 293.15;

fn tight_settings() -> Settings {
    let mut settings = Settings::new();
    settings.tol_abs = 1e-12;
    settings.tol_rel = 1e-12;
    settings
}

fn stretch_at(step: usize, n_steps: usize) -> [f64; 9] {
    let mut f = EYE;
    f[0] = 1.0 + 1e-3 * (step as f64) / (n_steps as f64);
    f
}

fn input_at(step: usize, n_steps: usize, history: Vector) -> DriverInput {
    DriverInput {
        time: 0.1 * (step as f64),
        delta_time: 0.1,
        temperature: T_REF,
        previous_temperature: T_REF,
        deformation_gradient: stretch_at(step, n_steps),
        previous_deformation_gradient: stretch_at(step - 1, n_steps),
        history,
    }
}

/// Computes the Drucker-Prager yield value f = σeq + A tr(σ) - Y
fn yield_value(stress: &Vector, pressure_coefficient: f64, tensile: f64) -> f64 {
    let mut dev = Vector::new(9);
    ten_deviator(&mut dev, stress);
    let mut sum = 0.0;
    for c in 0..9 {
        sum += dev[c] * dev[c];
    }
    f64::sqrt(1.5 * sum) + pressure_coefficient * ten_trace(stress) - tensile
}

#[test]
fn monotone_hardening_with_bounded_overstress() {
    // uniaxial stretch applied in ten equal steps: the hardening variable
    // must grow monotonically once the surface is crossed and the
    // overstress stays at the rate-dependent level
    let model = SampleParams::elastic_viscoplastic();
    let param = model.plastic.as_ref().unwrap();
    let settings = tight_settings();
    let n_steps = 10;
    let mut history = Driver::initial_history(&model);
    let mut hardening_previous = 0.0;
    let mut yielded = false;
    for step in 1..=n_steps {
        let input = input_at(step, n_steps, history.clone());
        let mut driver = Driver::new(&input, &model, &settings).unwrap();
        let output = driver.run().unwrap();
        history = output.history.clone();

        // ξ is stored after the packed plastic configuration
        let hardening = history[9];
        assert!(hardening >= hardening_previous);
        hardening_previous = hardening;

        // driving stress ≈ Cauchy stress here (J_p ≈ 1, F_p ≈ I): the
        // overstress must stay below the rate-dependent level
        let f = yield_value(&output.stress, param.yield_pressure, param.yield_tensile);
        if f > 0.0 {
            yielded = true;
        }
        assert!(f < 1e-2);
    }
    assert!(yielded);
    assert!(hardening_previous > 1e-5);
}

#[test]
fn tangent_matches_finite_differences_after_plastic_flow() {
    // perturbation check of ∂σ/∂F at the end of the loading history
    let model = SampleParams::elastic_viscoplastic();
    let settings = tight_settings();
    let n_steps = 10;
    let mut history = Driver::initial_history(&model);
    for step in 1..n_steps {
        let input = input_at(step, n_steps, history.clone());
        let mut driver = Driver::new(&input, &model, &settings).unwrap();
        history = driver.run().unwrap().history.clone();
    }
    let input = input_at(n_steps, n_steps, history.clone());
    let mut driver = Driver::new(&input, &model, &settings).unwrap();
    let output = driver.run().unwrap();

    let h = 1e-5;
    let f_end = stretch_at(n_steps, n_steps);
    for k in 0..9 {
        let mut input_plus = input_at(n_steps, n_steps, history.clone());
        let mut input_minus = input_at(n_steps, n_steps, history.clone());
        input_plus.deformation_gradient = f_end;
        input_minus.deformation_gradient = f_end;
        input_plus.deformation_gradient[k] += h;
        input_minus.deformation_gradient[k] -= h;
        let mut driver_plus = Driver::new(&input_plus, &model, &settings).unwrap();
        let mut driver_minus = Driver::new(&input_minus, &model, &settings).unwrap();
        let stress_plus = driver_plus.run().unwrap().stress;
        let stress_minus = driver_minus.run().unwrap().stress;
        for r in 0..9 {
            let num = (stress_plus[r] - stress_minus[r]) / (2.0 * h);
            approx_eq(output.dstress_df.get(r, k), num, 1e-2);
        }
    }
}

#[test]
fn jacobian_matches_finite_differences_at_the_converged_point() {
    // the full chain (elastic, thermal, plastic) with heating and stretch:
    // the assembled Jacobian must match central differences of the residual
    let model = SampleParams::thermo_viscoplastic();
    let settings = tight_settings();
    let mut f = EYE;
    f[0] = 1.0009;
    f[1] = 0.0002;
    let input = DriverInput {
        time: 0.1,
        delta_time: 0.1,
        temperature: T_REF + 20.0,
        previous_temperature: T_REF,
        deformation_gradient: f,
        previous_deformation_gradient: EYE,
        history: Driver::initial_history(&model),
    };
    let mut driver = Driver::new(&input, &model, &settings).unwrap();
    driver.run().unwrap();

    let x = driver.unknowns().clone();
    let dim = x.dim();
    let analytic = driver.jacobian_at(&x).unwrap();
    for c in 0..dim {
        let h = 1e-7 * (1.0 + f64::abs(x[c]));
        let mut x_plus = x.clone();
        let mut x_minus = x.clone();
        x_plus[c] += h;
        x_minus[c] -= h;
        let r_plus = driver.residual_at(&x_plus).unwrap();
        let r_minus = driver.residual_at(&x_minus).unwrap();
        for r in 0..dim {
            let num = (r_plus[r] - r_minus[r]) / (2.0 * h);
            let ana = analytic.get(r, c);
            approx_eq(ana, num, 1e-5 * (1.0 + f64::abs(ana)));
        }
    }
}

#[test]
fn temperature_tangent_matches_finite_differences() {
    // a nonzero WLF slope so the plastic rate is temperature-sensitive
    let mut model = SampleParams::thermo_viscoplastic();
    model.plastic.as_mut().unwrap().wlf.c1 = 5.0;
    let settings = tight_settings();
    let mut f = EYE;
    f[0] = 1.0009;
    let make_input = |temperature: f64| DriverInput {
        time: 0.1,
        delta_time: 0.1,
        temperature,
        previous_temperature: T_REF,
        deformation_gradient: f,
        previous_deformation_gradient: EYE,
        history: Driver::initial_history(&model),
    };
    let temperature = T_REF + 20.0;
    let mut driver = Driver::new(&make_input(temperature), &model, &settings).unwrap();
    let output = driver.run().unwrap();

    let h = 1e-3;
    let mut driver_plus = Driver::new(&make_input(temperature + h), &model, &settings).unwrap();
    let mut driver_minus = Driver::new(&make_input(temperature - h), &model, &settings).unwrap();
    let stress_plus = driver_plus.run().unwrap().stress;
    let stress_minus = driver_minus.run().unwrap().stress;
    for r in 0..9 {
        let num = (stress_plus[r] - stress_minus[r]) / (2.0 * h);
        approx_eq(output.dstress_dt[r], num, 1e-4);
    }
}

#[test]
fn exhausted_iterations_report_non_convergence() {
    let model = SampleParams::elastic_viscoplastic();
    let mut settings = tight_settings();
    settings.max_iterations = 1;
    let input = DriverInput {
        time: 0.1,
        delta_time: 0.1,
        temperature: T_REF,
        previous_temperature: T_REF,
        deformation_gradient: [1.001, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        previous_deformation_gradient: EYE,
        history: Driver::initial_history(&model),
    };
    let mut driver = Driver::new(&input, &model, &settings).unwrap();
    let err = driver.run().err().unwrap();
    assert_eq!(err, FdError::NotConverged("Newton-Raphson did not converge"));
    assert!(err.is_recoverable());
}
