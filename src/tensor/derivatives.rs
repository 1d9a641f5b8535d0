use super::ten_norm;
use crate::StrError;
use russell_lab::{solve_lin_sys, Matrix, Vector};

/// Computes the derivative of the determinant: d[3i+j] = ∂det(a)/∂a_ij
///
/// The result is the cofactor tensor of `a`.
pub fn deriv_det(d: &mut Vector, a: &Vector) {
    assert_eq!(a.dim(), 9);
    assert_eq!(d.dim(), 9);
    for i in 0..3 {
        for j in 0..3 {
            let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
            let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
            d[3 * i + j] = a[3 * i1 + j1] * a[3 * i2 + j2] - a[3 * i1 + j2] * a[3 * i2 + j1];
        }
    }
}

/// Computes the derivative of the inverse: d[(ij),(kl)] = ∂(a⁻¹)_ij/∂a_kl
///
/// Requires the already-computed inverse `ai`:
///
/// ```text
/// ∂(a⁻¹)_ij/∂a_kl = -a⁻¹_ik a⁻¹_lj
/// ```
pub fn deriv_inverse(d: &mut Matrix, ai: &Vector) {
    assert_eq!(ai.dim(), 9);
    assert_eq!(d.dims(), (9, 9));
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                for l in 0..3 {
                    d.set(3 * i + j, 3 * k + l, -ai[3 * i + k] * ai[3 * l + j]);
                }
            }
        }
    }
}

/// Computes the derivative of a product wrt its left factor: ∂(a·b)_ij/∂a_kl = δ_ik b_lj
pub fn deriv_mul_left(d: &mut Matrix, b: &Vector) {
    assert_eq!(b.dim(), 9);
    assert_eq!(d.dims(), (9, 9));
    zero_matrix(d);
    for i in 0..3 {
        for j in 0..3 {
            for l in 0..3 {
                d.set(3 * i + j, 3 * i + l, b[3 * l + j]);
            }
        }
    }
}

/// Computes the derivative of a product wrt its right factor: ∂(a·b)_ij/∂b_kl = a_ik δ_jl
pub fn deriv_mul_right(d: &mut Matrix, a: &Vector) {
    assert_eq!(a.dim(), 9);
    assert_eq!(d.dims(), (9, 9));
    zero_matrix(d);
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                d.set(3 * i + j, 3 * k + j, a[3 * i + k]);
            }
        }
    }
}

/// Computes the derivative of the Green-Lagrange strain wrt the deformation gradient
///
/// ```text
/// ∂E_ij/∂F_kl = (δ_jl F_ki + δ_il F_kj) / 2
/// ```
pub fn deriv_green_lagrange(d: &mut Matrix, f: &Vector) {
    assert_eq!(f.dim(), 9);
    assert_eq!(d.dims(), (9, 9));
    zero_matrix(d);
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                let cur = d.get(3 * i + j, 3 * k + j);
                d.set(3 * i + j, 3 * k + j, cur + 0.5 * f[3 * k + i]);
                let cur = d.get(3 * i + j, 3 * k + i);
                d.set(3 * i + j, 3 * k + i, cur + 0.5 * f[3 * k + j]);
            }
        }
    }
}

/// Zeroes all entries of a matrix
fn zero_matrix(m: &mut Matrix) {
    let (nrow, ncol) = m.dims();
    for r in 0..nrow {
        for c in 0..ncol {
            m.set(r, c, 0.0);
        }
    }
}

/// Computes the derivative of a pulled-back stress wrt the mapping tensor
///
/// With s = det(p) p⁻¹ σ p⁻ᵀ (σ held fixed) and pi = p⁻¹:
///
/// ```text
/// ∂s_ij/∂p_kl = s_ij pi_lk - pi_ik s_lj - s_il pi_jk
/// ```
pub fn deriv_pull_back(d: &mut Matrix, pulled: &Vector, pi: &Vector) {
    assert_eq!(pulled.dim(), 9);
    assert_eq!(pi.dim(), 9);
    assert_eq!(d.dims(), (9, 9));
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                for l in 0..3 {
                    d.set(
                        3 * i + j,
                        3 * k + l,
                        pulled[3 * i + j] * pi[3 * l + k]
                            - pi[3 * i + k] * pulled[3 * l + j]
                            - pulled[3 * i + l] * pi[3 * j + k],
                    );
                }
            }
        }
    }
}

/// Chains a tensor gradient through a right multiplication: out = ∂(m·b)/∂x given g = ∂m/∂x
///
/// `g` and `out` have 9 rows and an arbitrary number of columns (the x components).
pub fn grad_postmul(out: &mut Matrix, g: &Matrix, b: &Vector) {
    let (_, ncol) = g.dims();
    assert_eq!(b.dim(), 9);
    assert_eq!(out.dims(), (9, ncol));
    for i in 0..3 {
        for j in 0..3 {
            for c in 0..ncol {
                let mut sum = 0.0;
                for a in 0..3 {
                    sum += g.get(3 * i + a, c) * b[3 * a + j];
                }
                out.set(3 * i + j, c, sum);
            }
        }
    }
}

/// Chains a tensor gradient through a left multiplication: out = ∂(a·m)/∂x given g = ∂m/∂x
pub fn grad_premul(out: &mut Matrix, a: &Vector, g: &Matrix) {
    let (_, ncol) = g.dims();
    assert_eq!(a.dim(), 9);
    assert_eq!(out.dims(), (9, ncol));
    for i in 0..3 {
        for j in 0..3 {
            for c in 0..ncol {
                let mut sum = 0.0;
                for a_idx in 0..3 {
                    sum += a[3 * i + a_idx] * g.get(3 * a_idx + j, c);
                }
                out.set(3 * i + j, c, sum);
            }
        }
    }
}

/// Computes the tensor exponential e = exp(a)
///
/// Integrates a deformation gradient over a velocity-gradient increment:
/// `F_new = exp(Δt L) · F_old`. Uses scaling-and-squaring with a Taylor
/// series evaluated to machine precision.
pub fn ten_exp(e: &mut Vector, a: &Vector) {
    let mut unused = Matrix::new(9, 9);
    ten_exp_with_gradient(e, &mut unused, a);
}

/// Computes the tensor exponential e = exp(a) and its gradient g = ∂e/∂a
///
/// The gradient is exactly the derivative of the evaluated series, so it is
/// consistent with `e` to machine precision (central-difference checks of
/// the exponential map reproduce `g`).
pub fn ten_exp_with_gradient(e: &mut Vector, g: &mut Matrix, a: &Vector) {
    assert_eq!(a.dim(), 9);
    assert_eq!(e.dim(), 9);
    assert_eq!(g.dims(), (9, 9));

    // scale the argument so the series converges rapidly
    let norm = ten_norm(a);
    let mut n_squarings = 0_usize;
    let mut scale = 1.0;
    while norm * scale > 0.5 && n_squarings < 40 {
        scale *= 0.5;
        n_squarings += 1;
    }
    let mut x = Vector::new(9);
    for c in 0..9 {
        x[c] = a[c] * scale;
    }

    // Taylor series: E = I + Σ Tk with Tk = Tk₋₁·X/k and the term-wise gradient
    let mut ee = Vector::from(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    let mut gg = Matrix::new(9, 9);
    let mut term = ee.clone();
    let mut term_grad = Matrix::new(9, 9);
    for k in 1..30 {
        let mut new_term = Vector::new(9);
        let mut new_grad = Matrix::new(9, 9);
        for i in 0..3 {
            for j in 0..3 {
                let mut sum = 0.0;
                for a_idx in 0..3 {
                    sum += term[3 * i + a_idx] * x[3 * a_idx + j];
                }
                new_term[3 * i + j] = sum / (k as f64);
                for p in 0..3 {
                    for q in 0..3 {
                        let mut dsum = 0.0;
                        for a_idx in 0..3 {
                            dsum += term_grad.get(3 * i + a_idx, 3 * p + q) * x[3 * a_idx + j];
                        }
                        if j == q {
                            dsum += term[3 * i + p];
                        }
                        new_grad.set(3 * i + j, 3 * p + q, dsum / (k as f64));
                    }
                }
            }
        }
        term = new_term;
        term_grad = new_grad;
        let mut term_norm = 0.0;
        for c in 0..9 {
            ee[c] += term[c];
            term_norm = f64::max(term_norm, f64::abs(term[c]));
        }
        for r in 0..9 {
            for c in 0..9 {
                gg.set(r, c, gg.get(r, c) + term_grad.get(r, c));
            }
        }
        if term_norm < 1e-17 * (1.0 + ten_norm(&ee)) && k > 1 {
            break;
        }
    }

    // undo the scaling: E ← E·E with dE ← dE·E + E·dE
    for _ in 0..n_squarings {
        let e_old = ee.clone();
        let g_old = gg.clone();
        let mut right = Matrix::new(9, 9);
        let mut left = Matrix::new(9, 9);
        grad_postmul(&mut right, &g_old, &e_old);
        grad_premul(&mut left, &e_old, &g_old);
        for i in 0..3 {
            for j in 0..3 {
                let mut sum = 0.0;
                for a_idx in 0..3 {
                    sum += e_old[3 * i + a_idx] * e_old[3 * a_idx + j];
                }
                ee[3 * i + j] = sum;
            }
        }
        for r in 0..9 {
            for c in 0..9 {
                gg.set(r, c, right.get(r, c) + left.get(r, c));
            }
        }
    }

    // the gradient is wrt the scaled argument; chain back to a
    for c in 0..9 {
        e[c] = ee[c];
    }
    for r in 0..9 {
        for c in 0..9 {
            g.set(r, c, gg.get(r, c) * scale);
        }
    }
}

/// Solves f·dx + dx·f = dc for dx (f symmetric positive-definite)
///
/// Differentiates the square-root relation c = f·f, giving the sensitivity
/// of the root to a change of its square.
pub fn sylvester_sqrt(dx: &mut Vector, f: &Vector, dc: &Vector) -> Result<(), StrError> {
    assert_eq!(f.dim(), 9);
    assert_eq!(dc.dim(), 9);
    assert_eq!(dx.dim(), 9);
    let mut m = Matrix::new(9, 9);
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                for l in 0..3 {
                    let mut val = 0.0;
                    if i == k {
                        val += f[3 * l + j];
                    }
                    if j == l {
                        val += f[3 * i + k];
                    }
                    m.set(3 * i + j, 3 * k + l, val);
                }
            }
        }
    }
    for c in 0..9 {
        dx[c] = dc[c];
    }
    solve_lin_sys(dx, &mut m)
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
