//! Maximum likelihood fits of continuous power laws and their goodness of fit.
//!
//! Two candidate distributions are fitted to the data above a lower cutoff `xmin`:
//! - the power law, with density proportional to `x^(-α)`,
//! - the truncated power law, with density proportional to `x^(-α) e^(-λx)`.
//!
//! The truncated power law is retained only if it explains the data significantly better, according to a nested
//! likelihood ratio test. The goodness of fit of the retained distribution is the fraction of synthetic datasets,
//! drawn from the fitted distribution itself, which are further from it than the data in the Kolmogorov-Smirnov sense.
//!
//! Fitting never prints nor logs: every diagnostic is part of the returned [`PowerLawFit`].
//!
//! # Examples
//!
//! ```rust
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//! use spike_analysis::powerlaw::{fit_power_law, ContinuousDistribution, FitOptions, PowerLaw};
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(42);
//! let data = PowerLaw::new(2.5, 1.0).unwrap().sample_n(500, &mut rng);
//!
//! let options = FitOptions { surrogate_count: 50, ..FitOptions::default() };
//! let fit = fit_power_law(&data, &options).unwrap();
//!
//! assert!((fit.alpha - 2.5).abs() < 0.3);
//! assert!(fit.p_value >= 0.0 && fit.p_value <= 1.0);
//! ```
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution as _, Exp, Gamma, Uniform};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::special::{chi2_sf_1dof, upper_gamma};
use crate::utils::{cmp_f64, mean, sort_in};

/// Maximum number of Nelder-Mead iterations.
const MAX_ITER: usize = 5_000;
/// Absolute tolerance on the simplex vertices for Nelder-Mead convergence.
const XATOL: f64 = 1e-6;

/// How to choose the lower cutoff of the fitted range.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum Xmin {
    /// The smallest value of the data, i.e., the whole dataset is fitted.
    DataMinimum,
    /// A fixed cutoff, values below it are ignored.
    Fixed(f64),
    /// The data value minimizing the Kolmogorov-Smirnov distance between the tail and its power-law fit.
    MinimizeKs,
}

/// Options of [`fit_power_law`].
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct FitOptions {
    /// Number of synthetic datasets used to estimate the goodness of fit.
    pub surrogate_count: usize,
    /// Significance level required to prefer the truncated power law over the power law.
    pub truncation_pvalue: f64,
    /// Choice of the lower cutoff.
    pub xmin: Xmin,
    /// Seed of the synthetic datasets; the k-th dataset is drawn with seed `seed + k`.
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            surrogate_count: 1000,
            truncation_pvalue: 0.05,
            xmin: Xmin::DataMinimum,
            seed: 0,
        }
    }
}

impl FitOptions {
    /// Check that the options are usable.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.surrogate_count == 0 {
            return Err(AnalysisError::InvalidInput(
                "at least one surrogate dataset is required".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.truncation_pvalue) {
            return Err(AnalysisError::InvalidInput(format!(
                "the truncation p-value must be in [0, 1], got {}",
                self.truncation_pvalue
            )));
        }
        if let Xmin::Fixed(xmin) = self.xmin {
            if !(xmin.is_finite() && xmin > 0.0) {
                return Err(AnalysisError::InvalidInput(format!(
                    "the lower cutoff must be positive and finite, got {}",
                    xmin
                )));
            }
        }
        Ok(())
    }
}

/// A continuous distribution supported on `[xmin, ∞)`.
pub trait ContinuousDistribution {
    /// Returns the lower bound of the support.
    fn xmin(&self) -> f64;

    /// Returns the log-density at x.
    fn ln_pdf(&self, x: f64) -> f64;

    /// Returns the cumulative distribution function at x.
    fn cdf(&self, x: f64) -> f64;

    /// Draw a random value from the distribution.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64;

    /// Draw `n` independent random values from the distribution.
    fn sample_n<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        (0..n).map(|_| self.sample(rng)).collect()
    }

    /// Returns the log-likelihood of the data.
    fn log_likelihood(&self, data: &[f64]) -> f64 {
        data.iter().map(|&x| self.ln_pdf(x)).sum()
    }
}

/// A continuous power law, with density `(α - 1) / xmin * (x / xmin)^(-α)` on `[xmin, ∞)`.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PowerLaw {
    alpha: f64,
    xmin: f64,
}

impl PowerLaw {
    /// Create a power law, the exponent must be larger than one and the cutoff positive.
    pub fn new(alpha: f64, xmin: f64) -> Result<Self, AnalysisError> {
        if !(alpha.is_finite() && alpha > 1.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "the power-law exponent must be larger than 1, got {}",
                alpha
            )));
        }
        if !(xmin.is_finite() && xmin > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "the lower cutoff must be positive and finite, got {}",
                xmin
            )));
        }
        Ok(PowerLaw { alpha, xmin })
    }

    /// Maximum likelihood fit to data all larger or equal to `xmin`.
    pub fn fit(tail: &[f64], xmin: f64) -> Result<Self, AnalysisError> {
        if tail.len() < 2 {
            return Err(AnalysisError::FitFailure(format!(
                "at least 2 values are required above xmin={}, got {}",
                xmin,
                tail.len()
            )));
        }
        let sum_ln = tail.iter().map(|&x| (x / xmin).ln()).sum::<f64>();
        if sum_ln <= 0.0 {
            return Err(AnalysisError::FitFailure(format!(
                "all values are equal to xmin={}",
                xmin
            )));
        }
        PowerLaw::new(1.0 + tail.len() as f64 / sum_ln, xmin)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl ContinuousDistribution for PowerLaw {
    fn xmin(&self) -> f64 {
        self.xmin
    }

    fn ln_pdf(&self, x: f64) -> f64 {
        if x < self.xmin {
            return f64::NEG_INFINITY;
        }
        (self.alpha - 1.0).ln() - self.xmin.ln() - self.alpha * (x / self.xmin).ln()
    }

    fn cdf(&self, x: f64) -> f64 {
        if x < self.xmin {
            return 0.0;
        }
        1.0 - (x / self.xmin).powf(1.0 - self.alpha)
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        // Inverse transform sampling
        let u: f64 = rng.gen();
        self.xmin * (1.0 - u).powf(-1.0 / (self.alpha - 1.0))
    }
}

/// A continuous truncated power law, with density `λ^(1 - α) / Γ(1 - α, λ xmin) * x^(-α) e^(-λx)` on `[xmin, ∞)`.
///
/// The exponential cutoff makes the law normalizable for any real exponent, as long as the rate is positive.
#[derive(Debug, Clone)]
pub struct TruncatedPowerLaw {
    alpha: f64,
    lambda: f64,
    xmin: f64,
    /// Γ(1 - α, λ xmin), the normalization of the tail function.
    gamma_xmin: f64,
    /// Logarithm of the normalization constant of the density.
    ln_norm: f64,
    proposal: Proposal,
}

/// Rejection sampling scheme of a truncated power law, chosen so that the acceptance rate stays bounded away from zero.
#[derive(Debug, Clone)]
enum Proposal {
    /// For α ≥ 0: a power law on `[xmin, split)` accepted with probability e^(-λ(x - xmin)), with `split = max(xmin, 1/λ)`,
    /// and a shifted exponential on `[split, ∞)` accepted with probability (x / split)^(-α).
    /// The second part is drawn with probability `split_mass`.
    Split {
        split: f64,
        split_mass: f64,
        exp: Exp<f64>,
    },
    /// For α < 0 with a mode above `xmin`: the gamma distribution restricted to `[xmin, ∞)`.
    Gamma(Gamma<f64>),
    /// For α < 0 with a mode below `xmin`: the log-concave density lies under its tangent exponential at `xmin`.
    Tangent(Exp<f64>),
}

impl TruncatedPowerLaw {
    /// Create a truncated power law, the exponent must be finite and the rate and cutoff positive.
    pub fn new(alpha: f64, lambda: f64, xmin: f64) -> Result<Self, AnalysisError> {
        if !alpha.is_finite() {
            return Err(AnalysisError::InvalidInput(format!(
                "the power-law exponent must be finite, got {}",
                alpha
            )));
        }
        if !(xmin.is_finite() && xmin > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "the lower cutoff must be positive and finite, got {}",
                xmin
            )));
        }
        if !(lambda.is_finite() && lambda > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "the truncation rate must be positive and finite, got {}",
                lambda
            )));
        }
        let gamma_xmin = upper_gamma(1.0 - alpha, lambda * xmin);
        if !(gamma_xmin.is_finite() && gamma_xmin > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "the truncated power law with alpha={} and lambda={} cannot be normalized",
                alpha, lambda
            )));
        }

        let invalid = |e: String| {
            AnalysisError::InvalidInput(format!(
                "no sampler for the truncated power law with alpha={} and lambda={}: {}",
                alpha, lambda, e
            ))
        };
        let proposal = if alpha >= 0.0 {
            let split = xmin.max(1.0 / lambda);
            let split_mass = if split > xmin {
                (upper_gamma(1.0 - alpha, lambda * split) / gamma_xmin).clamp(0.0, 1.0)
            } else {
                1.0
            };
            Proposal::Split {
                split,
                split_mass,
                exp: Exp::new(lambda).map_err(|e| invalid(e.to_string()))?,
            }
        } else if -alpha / lambda >= xmin {
            Proposal::Gamma(Gamma::new(1.0 - alpha, 1.0 / lambda).map_err(|e| invalid(e.to_string()))?)
        } else {
            Proposal::Tangent(Exp::new(lambda + alpha / xmin).map_err(|e| invalid(e.to_string()))?)
        };

        Ok(TruncatedPowerLaw {
            alpha,
            lambda,
            xmin,
            gamma_xmin,
            ln_norm: (1.0 - alpha) * lambda.ln() - gamma_xmin.ln(),
            proposal,
        })
    }

    /// Maximum likelihood fit to data all larger or equal to `xmin`, starting from the exponent `alpha_init`.
    ///
    /// The negative log-likelihood is minimized with the Nelder-Mead method over the exponent and the rate
    /// rescaled by the mean of the data. The exponent is unconstrained.
    pub fn fit(tail: &[f64], xmin: f64, alpha_init: f64) -> Result<Self, AnalysisError> {
        if tail.len() < 2 {
            return Err(AnalysisError::FitFailure(format!(
                "at least 2 values are required above xmin={}, got {}",
                xmin,
                tail.len()
            )));
        }
        let mean_x = mean(tail);
        let mean_ln_x = tail.iter().map(|x| x.ln()).sum::<f64>() / tail.len() as f64;

        let objective = |params: &[f64; 2]| {
            let (alpha, lambda) = (params[0], params[1] / mean_x);
            if !(alpha.is_finite() && lambda > 0.0) {
                return f64::INFINITY;
            }
            let gamma_xmin = upper_gamma(1.0 - alpha, lambda * xmin);
            if !(gamma_xmin.is_finite() && gamma_xmin > 0.0) {
                return f64::INFINITY;
            }
            // Mean negative log-likelihood
            -((1.0 - alpha) * lambda.ln() - gamma_xmin.ln() - alpha * mean_ln_x - lambda * mean_x)
        };

        let (params, _) = nelder_mead(objective, [alpha_init, 1.0], [0.1, 0.25])?;
        TruncatedPowerLaw::new(params[0], params[1] / mean_x, xmin)
            .map_err(|e| AnalysisError::FitFailure(e.to_string()))
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

impl ContinuousDistribution for TruncatedPowerLaw {
    fn xmin(&self) -> f64 {
        self.xmin
    }

    fn ln_pdf(&self, x: f64) -> f64 {
        if x < self.xmin {
            return f64::NEG_INFINITY;
        }
        self.ln_norm - self.alpha * x.ln() - self.lambda * x
    }

    fn cdf(&self, x: f64) -> f64 {
        if x < self.xmin {
            return 0.0;
        }
        (1.0 - upper_gamma(1.0 - self.alpha, self.lambda * x) / self.gamma_xmin).clamp(0.0, 1.0)
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let unit = Uniform::new(0.0, 1.0);
        match &self.proposal {
            Proposal::Split {
                split,
                split_mass,
                exp,
            } => {
                if unit.sample(rng) < *split_mass {
                    loop {
                        let x = split + exp.sample(rng);
                        if unit.sample(rng) < (x / split).powf(-self.alpha) {
                            return x;
                        }
                    }
                }
                // Inverse transform of x^(-α) on [xmin, split), written to stay exact when α is close to 1
                let (b, ln_ratio) = (1.0 - self.alpha, (split / self.xmin).ln());
                loop {
                    let u: f64 = unit.sample(rng);
                    let x = if b == 0.0 {
                        self.xmin * (u * ln_ratio).exp()
                    } else {
                        self.xmin * ((u * (b * ln_ratio).exp_m1()).ln_1p() / b).exp()
                    };
                    if unit.sample(rng) < (-self.lambda * (x - self.xmin)).exp() {
                        return x;
                    }
                }
            }
            Proposal::Gamma(gamma) => loop {
                let x = gamma.sample(rng);
                if x >= self.xmin {
                    return x;
                }
            },
            Proposal::Tangent(exp) => {
                // ln f(x) = -α ln x - λx lies under its tangent at xmin
                let a = -self.alpha;
                loop {
                    let x = self.xmin + exp.sample(rng);
                    let ln_accept = a * (x / self.xmin).ln() - a * (x - self.xmin) / self.xmin;
                    if unit.sample(rng) < ln_accept.exp() {
                        return x;
                    }
                }
            }
        }
    }
}

/// Minimize a function with the Nelder-Mead simplex method, starting from `x0` with initial simplex steps `steps`.
/// Non-finite values of the function are treated as infinite, which allows to encode constraints.
///
/// Returns the minimizer and the minimum, or an error if the simplex did not converge.
pub fn nelder_mead<const N: usize, F>(
    f: F,
    x0: [f64; N],
    steps: [f64; N],
) -> Result<([f64; N], f64), AnalysisError>
where
    F: Fn(&[f64; N]) -> f64,
{
    let eval = |x: &[f64; N]| {
        let value = f(x);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    };

    let mut simplex: Vec<([f64; N], f64)> = Vec::with_capacity(N + 1);
    simplex.push((x0, eval(&x0)));
    for k in 0..N {
        let mut x = x0;
        x[k] += steps[k];
        simplex.push((x, eval(&x)));
    }

    // x + t (y - x)
    let towards = |x: &[f64; N], y: &[f64; N], t: f64| -> [f64; N] {
        let mut z = *x;
        for k in 0..N {
            z[k] += t * (y[k] - x[k]);
        }
        z
    };

    for _ in 0..MAX_ITER {
        simplex.sort_by(|a, b| cmp_f64(&a.1, &b.1));

        let (best, f_best) = simplex[0];
        // A collapsed simplex has converged, whatever the rounding noise of the objective
        let collapsed = simplex
            .iter()
            .skip(1)
            .all(|(x, _)| x.iter().zip(best.iter()).all(|(a, b)| (a - b).abs() <= XATOL));
        if collapsed && f_best.is_finite() {
            return Ok((best, f_best));
        }

        let mut centroid = [0.0; N];
        for (x, _) in simplex.iter().take(N) {
            for k in 0..N {
                centroid[k] += x[k] / N as f64;
            }
        }
        let (worst, f_worst) = simplex[N];
        let f_second_worst = simplex[N - 1].1;

        let reflected = towards(&centroid, &worst, -1.0);
        let f_reflected = eval(&reflected);

        if f_reflected < f_best {
            let expanded = towards(&centroid, &worst, -2.0);
            let f_expanded = eval(&expanded);
            simplex[N] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }
        if f_reflected < f_second_worst {
            simplex[N] = (reflected, f_reflected);
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < f_worst {
            let x = towards(&centroid, &reflected, 0.5);
            (x, eval(&x))
        } else {
            let x = towards(&centroid, &worst, 0.5);
            (x, eval(&x))
        };
        if f_contracted < f_reflected.min(f_worst) {
            simplex[N] = (contracted, f_contracted);
            continue;
        }

        // Shrink towards the best vertex
        for vertex in simplex.iter_mut().skip(1) {
            let x = towards(&best, &vertex.0, 0.5);
            *vertex = (x, eval(&x));
        }
    }

    Err(AnalysisError::FitFailure(format!(
        "the Nelder-Mead method did not converge after {} iterations",
        MAX_ITER
    )))
}

/// Returns the one-sample Kolmogorov-Smirnov statistic between the data and a cumulative distribution function.
pub fn ks_statistic<F>(data: &[f64], cdf: F) -> f64
where
    F: Fn(f64) -> f64,
{
    let mut sorted = data.to_vec();
    sort_in(&mut sorted);
    let n = sorted.len() as f64;
    sorted
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let fx = cdf(x);
            (fx - i as f64 / n).max((i + 1) as f64 / n - fx)
        })
        .fold(0.0, f64::max)
}

/// The distribution retained by [`fit_power_law`].
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum FittedDistribution {
    PowerLaw,
    TruncatedPowerLaw,
}

/// Result of [`fit_power_law`].
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PowerLawFit {
    /// The retained distribution.
    pub distribution: FittedDistribution,
    /// Exponent of the retained distribution.
    pub alpha: f64,
    /// Truncation rate, if the truncated power law is retained.
    pub lambda: Option<f64>,
    /// Lower cutoff of the fitted range.
    pub xmin: f64,
    /// Number of values in the fitted range.
    pub num_tail: usize,
    /// Log-likelihood ratio of the power law against the truncated power law (negative if the latter is more likely).
    pub log_likelihood_ratio: f64,
    /// Significance of the log-likelihood ratio.
    pub comparison_pvalue: f64,
    /// Kolmogorov-Smirnov distance between the data and the retained distribution.
    pub ks_statistic: f64,
    /// Fraction of synthetic datasets further from the retained distribution than the data.
    pub p_value: f64,
}

/// Returns the Kolmogorov-Smirnov statistic of the data and the fraction of synthetic datasets with a larger one.
fn goodness_of_fit<D>(dist: &D, tail: &[f64], options: &FitOptions) -> (f64, f64)
where
    D: ContinuousDistribution + Sync,
{
    let ks = ks_statistic(tail, |x| dist.cdf(x));
    let num_worse = (0..options.surrogate_count)
        .into_par_iter()
        .filter(|&k| {
            let mut rng = ChaCha8Rng::seed_from_u64(options.seed.wrapping_add(k as u64));
            let surrogate = dist.sample_n(tail.len(), &mut rng);
            ks_statistic(&surrogate, |x| dist.cdf(x)) > ks
        })
        .count();
    (ks, num_worse as f64 / options.surrogate_count as f64)
}

/// Returns the lower cutoff minimizing the Kolmogorov-Smirnov distance between the tail and its power-law fit.
fn xmin_minimizing_ks(sorted: &[f64]) -> Result<f64, AnalysisError> {
    let mut candidates = sorted.to_vec();
    candidates.dedup();

    candidates
        .iter()
        .filter_map(|&xmin| {
            let tail = &sorted[sorted.partition_point(|&x| x < xmin)..];
            // Only the candidates with a valid fit compete
            PowerLaw::fit(tail, xmin)
                .ok()
                .map(|pl| (xmin, ks_statistic(tail, |x| pl.cdf(x))))
        })
        .min_by(|a, b| cmp_f64(&a.1, &b.1))
        .map(|(xmin, _)| xmin)
        .ok_or_else(|| {
            AnalysisError::FitFailure("no lower cutoff leaves a tail with a valid power-law fit".to_string())
        })
}

/// Fit a power law and a truncated power law to the data, retain the best one and assess its goodness of fit.
///
/// The data must be positive and finite.
pub fn fit_power_law(data: &[f64], options: &FitOptions) -> Result<PowerLawFit, AnalysisError> {
    options.validate()?;
    if let Some(x) = data.iter().find(|x| !(x.is_finite() && **x > 0.0)) {
        return Err(AnalysisError::InvalidInput(format!(
            "power laws can only be fitted to positive finite values, got {}",
            x
        )));
    }

    let mut sorted = data.to_vec();
    sort_in(&mut sorted);

    let xmin = match options.xmin {
        Xmin::DataMinimum => *sorted
            .first()
            .ok_or_else(|| AnalysisError::FitFailure("no data to fit".to_string()))?,
        Xmin::Fixed(xmin) => xmin,
        Xmin::MinimizeKs => xmin_minimizing_ks(&sorted)?,
    };
    let tail = &sorted[sorted.partition_point(|&x| x < xmin)..];

    let power_law = PowerLaw::fit(tail, xmin)?;
    let truncated = TruncatedPowerLaw::fit(tail, xmin, power_law.alpha())?;

    // Nested comparison: twice the log-likelihood ratio follows a chi-squared distribution with one degree of freedom.
    let log_likelihood_ratio = power_law.log_likelihood(tail) - truncated.log_likelihood(tail);
    let comparison_pvalue = chi2_sf_1dof(2.0 * log_likelihood_ratio.abs());

    if log_likelihood_ratio < 0.0 && comparison_pvalue < options.truncation_pvalue {
        let (ks_statistic, p_value) = goodness_of_fit(&truncated, tail, options);
        Ok(PowerLawFit {
            distribution: FittedDistribution::TruncatedPowerLaw,
            alpha: truncated.alpha(),
            lambda: Some(truncated.lambda()),
            xmin,
            num_tail: tail.len(),
            log_likelihood_ratio,
            comparison_pvalue,
            ks_statistic,
            p_value,
        })
    } else {
        let (ks_statistic, p_value) = goodness_of_fit(&power_law, tail, options);
        Ok(PowerLawFit {
            distribution: FittedDistribution::PowerLaw,
            alpha: power_law.alpha(),
            lambda: None,
            xmin,
            num_tail: tail.len(),
            log_likelihood_ratio,
            comparison_pvalue,
            ks_statistic,
            p_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::E;

    #[test]
    fn test_power_law_fit() {
        let pl = PowerLaw::fit(&[1.0, E, E * E], 1.0).unwrap();
        assert_relative_eq!(pl.alpha(), 2.0, epsilon = 1e-12);

        assert!(matches!(PowerLaw::fit(&[1.0], 1.0), Err(AnalysisError::FitFailure(_))));
        assert!(matches!(PowerLaw::fit(&[3.0, 3.0, 3.0], 3.0), Err(AnalysisError::FitFailure(_))));
        assert!(matches!(PowerLaw::new(0.5, 1.0), Err(AnalysisError::InvalidInput(_))));
    }

    #[test]
    fn test_power_law_distribution() {
        let pl = PowerLaw::new(2.5, 2.0).unwrap();
        assert_eq!(pl.cdf(1.0), 0.0);
        assert_eq!(pl.cdf(2.0), 0.0);
        assert_relative_eq!(pl.cdf(8.0), 1.0 - 4.0_f64.powf(-1.5), epsilon = 1e-12);
        assert_eq!(pl.ln_pdf(1.0), f64::NEG_INFINITY);

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let samples = pl.sample_n(5000, &mut rng);
        assert!(samples.iter().all(|&x| x >= 2.0));
        let refit = PowerLaw::fit(&samples, 2.0).unwrap();
        assert_relative_eq!(refit.alpha(), 2.5, epsilon = 0.1);
        assert!(ks_statistic(&samples, |x| pl.cdf(x)) < 0.05);
    }

    #[test]
    fn test_truncated_power_law_distribution() {
        // One parameter set per sampling scheme, including exponents at and around 1
        for (alpha, lambda) in [
            (1.5, 0.1),
            (2.5, 2.0),
            (1.0 + 1e-9, 0.00184),
            (1.0, 0.01),
            (0.5, 0.1),
            (-1.5, 0.5),
            (-0.5, 2.0),
        ] {
            let tpl = TruncatedPowerLaw::new(alpha, lambda, 1.0).unwrap();
            assert_eq!(tpl.cdf(0.5), 0.0);
            assert_relative_eq!(tpl.cdf(1.0), 0.0, epsilon = 1e-12);
            assert!(tpl.cdf(1e5) > 0.999);

            let mut rng = ChaCha8Rng::seed_from_u64(7);
            let samples = tpl.sample_n(5000, &mut rng);
            assert!(samples.iter().all(|&x| x >= 1.0 && x.is_finite()));
            assert!(ks_statistic(&samples, |x| tpl.cdf(x)) < 0.05);
        }
        assert!(TruncatedPowerLaw::new(1.5, 0.0, 1.0).is_err());
        assert!(TruncatedPowerLaw::new(1.5, -1.0, 1.0).is_err());
        assert!(TruncatedPowerLaw::new(f64::NAN, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_truncated_power_law_fit() {
        let tpl = TruncatedPowerLaw::new(1.5, 0.1, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let samples = tpl.sample_n(5000, &mut rng);

        let fit = TruncatedPowerLaw::fit(&samples, 1.0, 1.5).unwrap();
        assert_relative_eq!(fit.alpha(), 1.5, epsilon = 0.2);
        assert_relative_eq!(fit.lambda(), 0.1, epsilon = 0.04);
        // The fit is at least as likely as the generating distribution
        assert!(fit.log_likelihood(&samples) >= tpl.log_likelihood(&samples) - 1e-6);
    }

    #[test]
    fn test_truncated_power_law_fit_near_unit_exponent() {
        // Avalanche-like sizes: the likelihood peaks at an exponent close to 1
        let tpl = TruncatedPowerLaw::new(1.0, 0.002, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let samples: Vec<f64> = tpl.sample_n(400, &mut rng).iter().map(|x| x.ceil()).collect();

        let fit = TruncatedPowerLaw::fit(&samples, 1.0, 1.2).unwrap();
        assert!(fit.alpha().is_finite() && fit.lambda() > 0.0);

        let options = FitOptions {
            surrogate_count: 50,
            ..FitOptions::default()
        };
        let fit = fit_power_law(&samples, &options).unwrap();
        assert!((0.0..=1.0).contains(&fit.p_value));

        // Exponents below 1 are reachable
        let tpl = TruncatedPowerLaw::new(0.5, 0.1, 1.0).unwrap();
        let samples = tpl.sample_n(5000, &mut rng);
        let fit = TruncatedPowerLaw::fit(&samples, 1.0, 1.5).unwrap();
        assert_relative_eq!(fit.alpha(), 0.5, epsilon = 0.2);
    }

    #[test]
    fn test_nelder_mead() {
        let (x, fx) = nelder_mead(
            |p: &[f64; 2]| (p[0] - 1.0).powi(2) + 10.0 * (p[1] + 2.0).powi(2),
            [0.0, 0.0],
            [0.5, 0.5],
        )
        .unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(x[1], -2.0, epsilon = 1e-5);
        assert_relative_eq!(fx, 0.0, epsilon = 1e-9);

        // Constraints as infinite values
        let (x, _) = nelder_mead(
            |p: &[f64; 1]| if p[0] < 3.0 { f64::INFINITY } else { p[0] * p[0] },
            [5.0],
            [1.0],
        )
        .unwrap();
        assert_relative_eq!(x[0], 3.0, epsilon = 1e-5);

        // Nowhere finite
        assert!(matches!(
            nelder_mead(|_: &[f64; 2]| f64::NAN, [0.0, 0.0], [1.0, 1.0]),
            Err(AnalysisError::FitFailure(_))
        ));
    }

    #[test]
    fn test_ks_statistic() {
        let uniform = |x: f64| x.clamp(0.0, 1.0);
        assert_relative_eq!(ks_statistic(&[0.5], uniform), 0.5);
        assert_relative_eq!(ks_statistic(&[0.4, 0.2, 0.3, 0.1], uniform), 0.6, epsilon = 1e-12);
        assert_eq!(ks_statistic(&[], uniform), 0.0);
    }

    #[test]
    fn test_goodness_of_fit() {
        let pl = PowerLaw::new(2.5, 1.0).unwrap();
        let options = FitOptions {
            surrogate_count: 100,
            ..FitOptions::default()
        };

        // The quantiles of the law itself are closer to it than any random sample
        let n = 200;
        let quantiles: Vec<f64> = (0..n)
            .map(|i| (1.0 - (i as f64 + 0.5) / n as f64).powf(-1.0 / 1.5))
            .collect();
        let (ks, p_value) = goodness_of_fit(&pl, &quantiles, &options);
        assert_relative_eq!(ks, 0.5 / n as f64, epsilon = 1e-12);
        assert_eq!(p_value, 1.0);

        // The quantiles of a steeper law are further from it than any random sample
        let steeper: Vec<f64> = (0..n)
            .map(|i| (1.0 - (i as f64 + 0.5) / n as f64).powf(-1.0 / 3.0))
            .collect();
        let (ks, p_value) = goodness_of_fit(&pl, &steeper, &options);
        assert!(ks > 0.2);
        assert_eq!(p_value, 0.0);
    }

    #[test]
    fn test_fit_power_law_p_value() {
        let options = FitOptions {
            surrogate_count: 200,
            seed: 3,
            ..FitOptions::default()
        };

        // Power-law data is plausible
        let pl = PowerLaw::new(2.0, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let samples = pl.sample_n(500, &mut rng);
        let fit = fit_power_law(&samples, &options).unwrap();
        assert!(fit.p_value > 0.05);

        // A point mass with a few scattered values is not
        let mut samples: Vec<f64> = (0..450).map(|i| 10.0 + 1e-3 * i as f64 / 450.0).collect();
        samples.extend((0..50).map(|i| 1.0 + 99.0 * i as f64 / 50.0));
        let options = FitOptions {
            surrogate_count: 50,
            ..options
        };
        let fit = fit_power_law(&samples, &options).unwrap();
        assert!(fit.ks_statistic > 0.3);
        assert_eq!(fit.p_value, 0.0);
    }

    #[test]
    fn test_fit_power_law_truncated() {
        let tpl = TruncatedPowerLaw::new(1.5, 0.1, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let samples = tpl.sample_n(5000, &mut rng);

        let options = FitOptions {
            surrogate_count: 20,
            ..FitOptions::default()
        };
        let fit = fit_power_law(&samples, &options).unwrap();
        assert_eq!(fit.distribution, FittedDistribution::TruncatedPowerLaw);
        assert!(fit.log_likelihood_ratio < 0.0);
        assert!(fit.comparison_pvalue < 0.05);
        assert!(fit.lambda.is_some());
        assert_eq!(fit.num_tail, 5000);
        assert!((0.0..=1.0).contains(&fit.p_value));
    }

    #[test]
    fn test_fit_power_law_deterministic() {
        let pl = PowerLaw::new(2.0, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let samples = pl.sample_n(300, &mut rng);

        let options = FitOptions {
            surrogate_count: 100,
            seed: 5,
            ..FitOptions::default()
        };
        let fit = fit_power_law(&samples, &options).unwrap();
        assert_eq!(fit, fit_power_law(&samples, &options).unwrap());
        assert_eq!(fit.xmin, samples.iter().cloned().fold(f64::INFINITY, f64::min));
        assert!((0.0..=1.0).contains(&fit.p_value));
        assert!((0.0..=1.0).contains(&fit.comparison_pvalue));
    }

    #[test]
    fn test_fit_power_law_xmin() {
        let pl = PowerLaw::new(2.0, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let samples = pl.sample_n(300, &mut rng);

        let options = FitOptions {
            surrogate_count: 10,
            xmin: Xmin::Fixed(2.0),
            ..FitOptions::default()
        };
        let fit = fit_power_law(&samples, &options).unwrap();
        assert_eq!(fit.xmin, 2.0);
        assert_eq!(fit.num_tail, samples.iter().filter(|&&x| x >= 2.0).count());

        let options = FitOptions {
            surrogate_count: 10,
            xmin: Xmin::MinimizeKs,
            ..FitOptions::default()
        };
        let fit = fit_power_law(&samples, &options).unwrap();
        assert!(samples.contains(&fit.xmin));
        assert!(fit.num_tail >= 2);
    }

    #[test]
    fn test_fit_power_law_failures() {
        let options = FitOptions::default();
        assert!(matches!(fit_power_law(&[], &options), Err(AnalysisError::FitFailure(_))));
        assert!(matches!(fit_power_law(&[4.0], &options), Err(AnalysisError::FitFailure(_))));
        assert!(matches!(fit_power_law(&[4.0, 4.0, 4.0], &options), Err(AnalysisError::FitFailure(_))));
        assert!(matches!(fit_power_law(&[1.0, 0.0], &options), Err(AnalysisError::InvalidInput(_))));
        assert!(matches!(fit_power_law(&[1.0, f64::NAN], &options), Err(AnalysisError::InvalidInput(_))));

        let options = FitOptions {
            surrogate_count: 0,
            ..FitOptions::default()
        };
        assert!(matches!(fit_power_law(&[1.0, 2.0], &options), Err(AnalysisError::InvalidInput(_))));
    }
}
