//! Box-constrained minimisation of black-box objectives.

use tracing::{debug, trace};

use crate::config::constants::CURVATURE_EPSILON;
use crate::config::model_config::CalibrationConfig;
use crate::error::{RadiationError, Result};

/// Outcome of a minimisation run.
///
/// A run that exhausts its budget is not an error: `converged` is false and `parameters` holds
/// the best point reached.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub parameters: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
    pub function_evaluations: usize,
    pub converged: bool,
}

/// Minimise `objective` from `initial` subject to `lower <= x <= upper` per dimension.
pub trait Minimizer {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        initial: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult>;
}

/// Quasi-Newton BFGS with finite-difference gradients, projected onto the bounds.
///
/// Variables sitting on a bound with the gradient pushing outward are frozen for the step and
/// excluded from the curvature pairs. When a variable enters or leaves that set its row and
/// column of the inverse Hessian are decoupled and restarted at the latest curvature scale.
/// The inverse Hessian is reset to the identity whenever the quasi-Newton direction stops being
/// a descent direction, and rescaled by `s'y / y'y` on the first update after a reset.
pub struct ProjectedBfgs {
    config: CalibrationConfig,
}

impl ProjectedBfgs {
    pub fn new() -> Self {
        Self {
            config: CalibrationConfig::default(),
        }
    }

    pub fn with_config(config: CalibrationConfig) -> Self {
        Self { config }
    }

    fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
        for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
            *xi = xi.clamp(lo, hi);
        }
    }

    /// Central differences, falling back to one-sided ones next to a bound.
    fn gradient(
        &self,
        x: &[f64],
        fx: f64,
        objective: &dyn Fn(&[f64]) -> f64,
        bounds: &[(f64, f64)],
        func_evals: &mut usize,
    ) -> Vec<f64> {
        let mut grad = vec![0.0; x.len()];
        let mut probe = x.to_vec();

        for i in 0..x.len() {
            let (lo, hi) = bounds[i];
            let h = self.config.fd_step * x[i].abs().max(1.0);
            let can_up = x[i] + h <= hi;
            let can_down = x[i] - h >= lo;

            grad[i] = if can_up && can_down {
                probe[i] = x[i] + h;
                let f_plus = objective(&probe);
                probe[i] = x[i] - h;
                let f_minus = objective(&probe);
                *func_evals += 2;
                (f_plus - f_minus) / (2.0 * h)
            } else if can_up {
                probe[i] = x[i] + h;
                let f_plus = objective(&probe);
                *func_evals += 1;
                (f_plus - fx) / h
            } else if can_down {
                probe[i] = x[i] - h;
                let f_minus = objective(&probe);
                *func_evals += 1;
                (fx - f_minus) / h
            } else {
                0.0
            };
            probe[i] = x[i];
        }

        grad
    }

    /// Which variables are pinned to a bound by the current gradient.
    fn active_set(x: &[f64], g: &[f64], bounds: &[(f64, f64)]) -> Vec<bool> {
        x.iter()
            .zip(g)
            .zip(bounds)
            .map(|((&xi, &gi), &(lo, hi))| (xi <= lo && gi > 0.0) || (xi >= hi && gi < 0.0))
            .collect()
    }

    fn bfgs_update(h_inv: &mut [Vec<f64>], s: &[f64], y: &[f64], sy: f64) {
        let n = s.len();
        let rho = 1.0 / sy;

        let mut hy = vec![0.0; n];
        for i in 0..n {
            for j in 0..n {
                hy[i] += h_inv[i][j] * y[j];
            }
        }

        let yhy: f64 = y.iter().zip(hy.iter()).map(|(yi, hyi)| yi * hyi).sum();

        for i in 0..n {
            for j in 0..n {
                h_inv[i][j] += rho * ((1.0 + rho * yhy) * s[i] * s[j] - hy[i] * s[j] - s[i] * hy[j]);
            }
        }
    }

    fn identity(n: usize) -> Vec<Vec<f64>> {
        let mut m = vec![vec![0.0; n]; n];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        m
    }

    /// Decouple variable `i` from the rest of the inverse Hessian.
    fn restart_variable(h_inv: &mut [Vec<f64>], i: usize, scale: f64) {
        for j in 0..h_inv.len() {
            h_inv[i][j] = 0.0;
            h_inv[j][i] = 0.0;
        }
        h_inv[i][i] = scale;
    }
}

impl Default for ProjectedBfgs {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_bounds(initial: &[f64], bounds: &[(f64, f64)]) -> Result<()> {
    if initial.len() != bounds.len() {
        return Err(RadiationError::InvalidBounds(format!(
            "{} bounds for {} parameters",
            bounds.len(),
            initial.len()
        )));
    }
    for (i, &(lo, hi)) in bounds.iter().enumerate() {
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return Err(RadiationError::InvalidBounds(format!(
                "dimension {}: lower {} upper {}",
                i, lo, hi
            )));
        }
    }
    if let Some(i) = initial.iter().position(|v| !v.is_finite()) {
        return Err(RadiationError::InvalidBounds(format!("initial guess {} is not finite", i)));
    }
    Ok(())
}

impl Minimizer for ProjectedBfgs {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        initial: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        validate_bounds(initial, bounds)?;
        self.config.validate()?;

        let n = initial.len();
        let mut x = initial.to_vec();
        Self::project(&mut x, bounds);

        let mut func_evals = 0;
        let mut f = objective(&x);
        func_evals += 1;

        if n == 0 {
            return Ok(OptimizationResult {
                parameters: x,
                objective: f,
                iterations: 0,
                function_evaluations: func_evals,
                converged: true,
            });
        }

        let mut h_inv = Self::identity(n);
        let mut unscaled = true;
        let mut curvature_scale = 1.0;
        let mut previous_active: Option<Vec<bool>> = None;
        let mut g = self.gradient(&x, f, objective, bounds, &mut func_evals);

        for iteration in 0..self.config.max_iterations {
            let active = Self::active_set(&x, &g, bounds);
            if let Some(previous) = &previous_active {
                for (i, (&now, &before)) in active.iter().zip(previous).enumerate() {
                    if now != before {
                        Self::restart_variable(&mut h_inv, i, curvature_scale);
                    }
                }
            }
            let pg_norm: f64 = g
                .iter()
                .zip(&active)
                .filter(|(_, a)| !**a)
                .map(|(gi, _)| gi * gi)
                .sum::<f64>()
                .sqrt();
            trace!("iteration {}: f = {:e}, |pg| = {:e}", iteration, f, pg_norm);

            if pg_norm < self.config.gradient_tolerance {
                debug!("Projected gradient below tolerance after {} iterations", iteration);
                return Ok(OptimizationResult {
                    parameters: x,
                    objective: f,
                    iterations: iteration,
                    function_evaluations: func_evals,
                    converged: true,
                });
            }

            // p = -H g over the free variables
            let mut p = vec![0.0; n];
            for i in 0..n {
                if active[i] {
                    continue;
                }
                for j in 0..n {
                    if !active[j] {
                        p[i] -= h_inv[i][j] * g[j];
                    }
                }
            }
            let slope: f64 = p.iter().zip(&g).map(|(pi, gi)| pi * gi).sum();
            if slope >= 0.0 || slope.is_nan() {
                h_inv = Self::identity(n);
                unscaled = true;
                for ((pi, gi), &a) in p.iter_mut().zip(&g).zip(&active) {
                    *pi = if a { 0.0 } else { -gi };
                }
            }

            // Backtracking line search on the projected path
            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..self.config.max_line_search {
                let mut x_new: Vec<f64> = x.iter().zip(&p).map(|(xi, pi)| xi + alpha * pi).collect();
                Self::project(&mut x_new, bounds);
                let f_new = objective(&x_new);
                func_evals += 1;

                let decrease: f64 = g.iter().zip(x_new.iter().zip(&x)).map(|(gi, (xn, xo))| gi * (xn - xo)).sum();
                if f_new <= f + self.config.armijo_c1 * decrease {
                    accepted = Some((x_new, f_new));
                    break;
                }
                alpha *= 0.5;
            }

            let Some((x_new, f_new)) = accepted else {
                debug!("Line search failed at iteration {} (f = {:e})", iteration, f);
                return Ok(OptimizationResult {
                    parameters: x,
                    objective: f,
                    iterations: iteration,
                    function_evaluations: func_evals,
                    converged: false,
                });
            };

            let g_new = self.gradient(&x_new, f_new, objective, bounds, &mut func_evals);
            let stalled = (f - f_new).abs() <= self.config.objective_tolerance * f.abs().max(1.0);

            // Curvature pairs over the free variables only
            let free = |i: usize, v: f64| if active[i] { 0.0 } else { v };
            let s: Vec<f64> = (0..n).map(|i| free(i, x_new[i] - x[i])).collect();
            let y: Vec<f64> = (0..n).map(|i| free(i, g_new[i] - g[i])).collect();
            let sy: f64 = s.iter().zip(&y).map(|(si, yi)| si * yi).sum();
            let ss: f64 = s.iter().map(|si| si * si).sum();
            let yy: f64 = y.iter().map(|yi| yi * yi).sum();

            // Scale-invariant curvature test
            if sy > 0.0 && sy > CURVATURE_EPSILON * (ss * yy).sqrt() {
                curvature_scale = sy / yy;
                if unscaled {
                    h_inv.iter_mut().flatten().for_each(|h| *h *= curvature_scale);
                    unscaled = false;
                }
                Self::bfgs_update(&mut h_inv, &s, &y, sy);
            }

            previous_active = Some(active);
            x = x_new;
            f = f_new;
            g = g_new;

            if stalled {
                debug!("Objective change below tolerance after {} iterations", iteration + 1);
                return Ok(OptimizationResult {
                    parameters: x,
                    objective: f,
                    iterations: iteration + 1,
                    function_evaluations: func_evals,
                    converged: true,
                });
            }
        }

        Ok(OptimizationResult {
            parameters: x,
            objective: f,
            iterations: self.config.max_iterations,
            function_evaluations: func_evals,
            converged: false,
        })
    }
}
