use crate::base::FdError;
use crate::tensor::{deriv_mul_left, ten_det, ten_identity, ten_inverse, ten_mul, ten_norm};
use russell_lab::{mat_mat_mul, vec_add, Matrix, Vector};

/// Implements the multiplicative decomposition of the deformation gradient
///
/// The total deformation gradient factorizes as an ordered chain
///
/// ```text
/// F = F₀ · F₁ · … · F₍ₙ₋₁₎
/// ```
///
/// where every factor is an invertible second-order tensor with positive
/// determinant. The first configuration is never an unknown: it is
/// materialized algebraically as `F₀ = F · (F₁…F₍ₙ₋₁₎)⁻¹` so the partition
/// invariant holds by construction. Current and previous snapshots are both
/// stored; the previous snapshot is immutable for the driver's lifetime.
pub struct ConfigurationChain {
    /// Number of configurations
    n: usize,

    /// Total deformation gradient (current)
    total: Vector,

    /// Total deformation gradient (previous step)
    total_prev: Vector,

    /// Current configurations F₀ … F₍ₙ₋₁₎
    configs: Vec<Vector>,

    /// Previous configurations
    configs_prev: Vec<Vector>,

    /// Inverses of the current configurations
    inverses: Vec<Vector>,

    /// Inverses of the previous configurations
    inverses_prev: Vec<Vector>,

    /// ∂F₀/∂F (depends on the current F₁…F₍ₙ₋₁₎)
    df1_df: Matrix,

    /// ∂F₀/∂(F₁…F₍ₙ₋₁₎) stacked as a 9×9(n-1) block
    df1_dconfigs: Matrix,

    /// Tolerance for the partition invariant (L2 norm)
    partition_tol: f64,
}

impl ConfigurationChain {
    /// Allocates a new chain seeded from the previous-step snapshot
    ///
    /// # Input
    ///
    /// * `total` -- current total deformation gradient (9, row-major)
    /// * `total_prev` -- previous total deformation gradient
    /// * `packed_previous` -- previous `F₁ … F₍ₙ₋₁₎` packed as 9(n-1) values
    /// * `n` -- number of configurations (≥ 1)
    /// * `partition_tol` -- tolerance for the partition invariant
    pub fn new(
        total: &Vector,
        total_prev: &Vector,
        packed_previous: &[f64],
        n: usize,
        partition_tol: f64,
    ) -> Result<Self, FdError> {
        if n < 1 {
            return Err(FdError::ParameterMismatch("the chain needs at least one configuration"));
        }
        if total.dim() != 9 || total_prev.dim() != 9 {
            return Err(FdError::ParameterMismatch("deformation gradients must have 9 components"));
        }
        if packed_previous.len() != 9 * (n - 1) {
            return Err(FdError::ParameterMismatch(
                "the packed configuration history does not match the number of configurations",
            ));
        }
        let mut configs = vec![Vector::new(9); n];
        let mut configs_prev = vec![Vector::new(9); n];
        for k in 1..n {
            for c in 0..9 {
                configs[k][c] = packed_previous[9 * (k - 1) + c];
                configs_prev[k][c] = packed_previous[9 * (k - 1) + c];
            }
        }
        let mut chain = ConfigurationChain {
            n,
            total: total.clone(),
            total_prev: total_prev.clone(),
            configs,
            configs_prev,
            inverses: vec![Vector::new(9); n],
            inverses_prev: vec![Vector::new(9); n],
            df1_df: Matrix::new(9, 9),
            df1_dconfigs: Matrix::new(9, 9 * (n - 1)),
            partition_tol,
        };
        chain.refresh_previous()?;
        chain.refresh_current()?;
        Ok(chain)
    }

    /// Returns the number of configurations
    pub fn n(&self) -> usize {
        self.n
    }

    /// Returns the current total deformation gradient
    pub fn total(&self) -> &Vector {
        &self.total
    }

    /// Returns the previous total deformation gradient
    pub fn previous_total(&self) -> &Vector {
        &self.total_prev
    }

    /// Returns the current configuration i
    pub fn configuration(&self, i: usize) -> &Vector {
        &self.configs[i]
    }

    /// Returns the previous configuration i
    pub fn previous_configuration(&self, i: usize) -> &Vector {
        &self.configs_prev[i]
    }

    /// Returns the inverse of the current configuration i
    pub fn inverse_configuration(&self, i: usize) -> &Vector {
        &self.inverses[i]
    }

    /// Returns ∂F₀/∂F for the current configurations
    pub fn df1_df(&self) -> &Matrix {
        &self.df1_df
    }

    /// Returns ∂F₀/∂(F₁…F₍ₙ₋₁₎) stacked as a 9×9(n-1) block
    pub fn df1_dconfigs(&self) -> &Matrix {
        &self.df1_dconfigs
    }

    /// Updates F₁…F₍ₙ₋₁₎ from the unknown vector and re-materializes F₀
    ///
    /// # Input
    ///
    /// * `x_configs` -- the configuration block of the unknown vector,
    ///   9(n-1) values packing F₁ … F₍ₙ₋₁₎
    pub fn update_from_unknowns(&mut self, x_configs: &[f64]) -> Result<(), FdError> {
        assert_eq!(x_configs.len(), 9 * (self.n - 1));
        for k in 1..self.n {
            for c in 0..9 {
                self.configs[k][c] = x_configs[9 * (k - 1) + c];
            }
        }
        self.refresh_current()
    }

    /// Packs the current F₁…F₍ₙ₋₁₎ into a flat slice
    pub fn pack_configurations(&self, out: &mut [f64]) {
        assert_eq!(out.len(), 9 * (self.n - 1));
        for k in 1..self.n {
            for c in 0..9 {
                out[9 * (k - 1) + c] = self.configs[k][c];
            }
        }
    }

    /// Computes the sub-product F_a·…·F₍b₋₁₎ of the current configurations
    ///
    /// Returns the identity for an empty interval (a == b).
    pub fn subproduct(&self, a: usize, b: usize) -> Vector {
        Self::product_of(&self.configs, a, b)
    }

    /// Computes the sub-product of the previous configurations
    pub fn previous_subproduct(&self, a: usize, b: usize) -> Vector {
        Self::product_of(&self.configs_prev, a, b)
    }

    /// Computes the preceding product F₀·…·F₍ᵢ₋₁₎
    pub fn preceding(&self, i: usize) -> Vector {
        self.subproduct(0, i)
    }

    /// Computes the following product F₍ᵢ₊₁₎·…·F₍ₙ₋₁₎
    pub fn following(&self, i: usize) -> Vector {
        self.subproduct(i + 1, self.n)
    }

    /// Computes the previous preceding product
    pub fn previous_preceding(&self, i: usize) -> Vector {
        self.previous_subproduct(0, i)
    }

    /// Computes the previous following product
    pub fn previous_following(&self, i: usize) -> Vector {
        self.previous_subproduct(i + 1, self.n)
    }

    /// Computes the gradient of a sub-product wrt each configuration in the interval
    ///
    /// Returns a 9×9(b-a) matrix whose k-th block (k in `[a, b)`) is
    ///
    /// ```text
    /// ∂(F_a…F₍b₋₁₎)_ij/∂(F_k)_lm = (F_a…F₍k₋₁₎)_il (F₍k₊₁₎…F₍b₋₁₎)_mj
    /// ```
    pub fn subproduct_gradient(&self, a: usize, b: usize) -> Matrix {
        assert!(a <= b && b <= self.n);
        let mut d = Matrix::new(9, 9 * (b - a));
        for k in a..b {
            let left = self.subproduct(a, k);
            let right = self.subproduct(k + 1, b);
            let col0 = 9 * (k - a);
            for i in 0..3 {
                for j in 0..3 {
                    for l in 0..3 {
                        for m in 0..3 {
                            d.set(3 * i + j, col0 + 3 * l + m, left[3 * i + l] * right[3 * m + j]);
                        }
                    }
                }
            }
        }
        d
    }

    /// Computes the gradients of the preceding product P_i = F₀·…·F₍ᵢ₋₁₎
    ///
    /// Returns `(dP/dF, dP/dconfigs)` where both maps include the implicit
    /// dependence through `F₀ = F·(F₁…F₍ₙ₋₁₎)⁻¹`. The second matrix stacks
    /// the blocks for F₁…F₍ₙ₋₁₎ (9×9(n-1)).
    pub fn preceding_gradients(&self, i: usize) -> (Matrix, Matrix) {
        let mut dp_df = Matrix::new(9, 9);
        let mut dp_dconfigs = Matrix::new(9, 9 * (self.n - 1));
        if i == 0 {
            return (dp_df, dp_dconfigs); // P₀ = I
        }

        // chain through F₀: P = F₀·Q with Q = F₁…F₍ᵢ₋₁₎
        let q = self.subproduct(1, i);
        let mut dp_df1 = Matrix::new(9, 9);
        deriv_mul_left(&mut dp_df1, &q);
        mat_mat_mul(&mut dp_df, 1.0, &dp_df1, &self.df1_df, 0.0).unwrap();
        if self.n > 1 {
            mat_mat_mul(&mut dp_dconfigs, 1.0, &dp_df1, &self.df1_dconfigs, 0.0).unwrap();
        }

        // direct dependence on the unknowns inside the interval
        for m in 1..i {
            let left = self.subproduct(0, m);
            let right = self.subproduct(m + 1, i);
            let col0 = 9 * (m - 1);
            for ii in 0..3 {
                for jj in 0..3 {
                    for r in 0..3 {
                        for s in 0..3 {
                            let cur = dp_dconfigs.get(3 * ii + jj, col0 + 3 * r + s);
                            dp_dconfigs.set(
                                3 * ii + jj,
                                col0 + 3 * r + s,
                                cur + left[3 * ii + r] * right[3 * s + jj],
                            );
                        }
                    }
                }
            }
        }
        (dp_df, dp_dconfigs)
    }

    /// Verifies the partition invariant: the product of the chain equals F
    pub fn verify_partition(&self) -> Result<(), FdError> {
        let product = self.subproduct(0, self.n);
        let mut diff = Vector::new(9);
        vec_add(&mut diff, 1.0, &product, -1.0, &self.total).unwrap();
        if ten_norm(&diff) > self.partition_tol * (1.0 + ten_norm(&self.total)) {
            return Err(FdError::InvalidKinematics(
                "the product of the configurations does not match the deformation gradient",
            ));
        }
        Ok(())
    }

    /// Re-materializes F₀, the inverses, and the F₀ gradients (current snapshot)
    fn refresh_current(&mut self) -> Result<(), FdError> {
        // trailing product B = F₁…F₍ₙ₋₁₎ and F₀ = F·B⁻¹
        let trailing = Self::product_of(&self.configs, 1, self.n);
        let mut trailing_inv = Vector::new(9);
        ten_inverse(&mut trailing_inv, &trailing)
            .map_err(|_| FdError::InvalidKinematics("the trailing sub-product is not invertible"))?;
        let mut first = Vector::new(9);
        ten_mul(&mut first, &self.total, &trailing_inv);
        self.configs[0] = first;

        // determinants and inverses
        for k in 0..self.n {
            if ten_det(&self.configs[k]) <= 0.0 {
                return Err(FdError::InvalidKinematics(
                    "a configuration determinant is not positive",
                ));
            }
            let mut inv = Vector::new(9);
            ten_inverse(&mut inv, &self.configs[k])
                .map_err(|_| FdError::InvalidKinematics("a configuration is not invertible"))?;
            self.inverses[k] = inv;
        }

        // ∂F₀/∂F = δ_ik (B⁻¹)_lj
        deriv_mul_left(&mut self.df1_df, &trailing_inv);

        // ∂F₀_ij/∂(F_m)_rs = -(F₀…F₍ₘ₋₁₎)_ir [(F₁…F_m)⁻¹]_sj
        for m in 1..self.n {
            let left = self.subproduct(0, m);
            let partial = self.subproduct(1, m + 1);
            let mut partial_inv = Vector::new(9);
            ten_inverse(&mut partial_inv, &partial)
                .map_err(|_| FdError::InvalidKinematics("a partial sub-product is not invertible"))?;
            let col0 = 9 * (m - 1);
            for i in 0..3 {
                for j in 0..3 {
                    for r in 0..3 {
                        for s in 0..3 {
                            self.df1_dconfigs
                                .set(3 * i + j, col0 + 3 * r + s, -left[3 * i + r] * partial_inv[3 * s + j]);
                        }
                    }
                }
            }
        }
        self.verify_partition()
    }

    /// Materializes the previous F₀ and the previous inverses (once per driver)
    fn refresh_previous(&mut self) -> Result<(), FdError> {
        let trailing = Self::product_of(&self.configs_prev, 1, self.n);
        let mut trailing_inv = Vector::new(9);
        ten_inverse(&mut trailing_inv, &trailing)
            .map_err(|_| FdError::InvalidKinematics("the previous trailing sub-product is not invertible"))?;
        let mut first = Vector::new(9);
        ten_mul(&mut first, &self.total_prev, &trailing_inv);
        self.configs_prev[0] = first;
        for k in 0..self.n {
            if ten_det(&self.configs_prev[k]) <= 0.0 {
                return Err(FdError::InvalidKinematics(
                    "a previous configuration determinant is not positive",
                ));
            }
            let mut inv = Vector::new(9);
            ten_inverse(&mut inv, &self.configs_prev[k])
                .map_err(|_| FdError::InvalidKinematics("a previous configuration is not invertible"))?;
            self.inverses_prev[k] = inv;
        }
        Ok(())
    }

    /// Computes the product of configurations over the right-open interval [a, b)
    fn product_of(configs: &[Vector], a: usize, b: usize) -> Vector {
        assert!(a <= b && b <= configs.len());
        let mut product = ten_identity();
        let mut work = Vector::new(9);
        for item in configs.iter().take(b).skip(a) {
            ten_mul(&mut work, &product, item);
            std::mem::swap(&mut product, &mut work);
        }
        product
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
