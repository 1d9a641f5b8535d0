use super::ConfigurationChain;
use russell_lab::Vector;

/// Describes the layout of the unknown vector
///
/// ```text
/// X = [ σ (9) | F₁ (9) | … | F₍ₙ₋₁₎ (9) | Ξs ]
/// ```
///
/// The first configuration F₀ is not an unknown (it is materialized from the
/// total deformation gradient and the others).
#[derive(Clone, Copy, Debug)]
pub struct UnknownLayout {
    /// Number of configurations in the chain
    pub n_configurations: usize,

    /// Number of solve-coupled state variables
    pub n_solve_vars: usize,
}

impl UnknownLayout {
    /// Returns the total number of unknowns
    pub fn dim(&self) -> usize {
        9 * self.n_configurations + self.n_solve_vars
    }

    /// Returns the column offset of the stress block
    pub fn stress_offset(&self) -> usize {
        0
    }

    /// Returns the column offset of configuration i (i ≥ 1)
    pub fn configuration_offset(&self, i: usize) -> usize {
        assert!(i >= 1 && i < self.n_configurations);
        9 * i
    }

    /// Returns the column offset of the solve-coupled state variables
    pub fn solve_vars_offset(&self) -> usize {
        9 * self.n_configurations
    }
}

/// Holds the state of a material point during one driver lifetime
///
/// Bundles the configuration chain, the current iterate of the stress and
/// solve-coupled variables, the previous-step data, and the time/temperature
/// inputs. Modules receive a shared reference to this structure.
pub struct LocalState {
    /// Configuration chain (current and previous snapshots)
    pub chain: ConfigurationChain,

    /// Current Cauchy stress iterate (row-major, 9)
    pub stress: Vector,

    /// Previous converged Cauchy stress (bootstrapped from the stress carrier)
    pub previous_stress: Vector,

    /// Current iterate of the solve-coupled state variables Ξs
    pub solve_vars: Vector,

    /// Previous values of the solve-coupled state variables
    pub previous_solve_vars: Vector,

    /// Previous values of the carried state variables Ξc
    pub previous_carried_vars: Vector,

    /// Current temperature
    pub temperature: f64,

    /// Previous temperature
    pub previous_temperature: f64,

    /// Current time
    pub time: f64,

    /// Time increment
    pub delta_time: f64,

    /// Layout of the unknown vector
    pub layout: UnknownLayout,
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::UnknownLayout;

    #[test]
    fn offsets_work() {
        let layout = UnknownLayout {
            n_configurations: 3,
            n_solve_vars: 2,
        };
        assert_eq!(layout.dim(), 29);
        assert_eq!(layout.stress_offset(), 0);
        assert_eq!(layout.configuration_offset(1), 9);
        assert_eq!(layout.configuration_offset(2), 18);
        assert_eq!(layout.solve_vars_offset(), 27);
    }
}
