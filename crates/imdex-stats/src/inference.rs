//! Per-feature test statistics
//!
//! All functions operate feature-wise, propagate NaN instead of raising,
//! and floor degenerate denominators at [`TINY`] rather than dividing by
//! zero.

use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayView2, ArrayView3};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};

use crate::rank::average_ranks;

/// Smallest positive normal f64, the uniform floor for all
/// divide-by-zero and log-of-zero guards.
pub const TINY: f64 = f64::MIN_POSITIVE;

/// Survival probability of the chi-square distribution with `df` degrees
/// of freedom at `stat`. NaN statistic or invalid df yields NaN.
fn chi2_sf(stat: f64, df: f64) -> f64 {
    if stat.is_nan() {
        return f64::NAN;
    }
    if stat <= 0.0 {
        return 1.0;
    }
    match ChiSquared::new(df) {
        Ok(dist) => 1.0 - dist.cdf(stat),
        Err(_) => f64::NAN,
    }
}

/// Two-sided p-value of a standard normal statistic.
fn normal_two_sided(z: f64) -> f64 {
    let standard = Normal::standard();
    2.0 * (1.0 - standard.cdf(z.abs()))
}

/// Likelihood-ratio test per feature.
///
/// The statistic is `2 * (ll_full - ll_reduced)` against a chi-square
/// distribution with `df_full - df_reduced` degrees of freedom. A zero
/// degree-of-freedom difference makes every feature untestable (NaN).
pub fn likelihood_ratio_test(
    ll_full: &[f64],
    ll_reduced: &[f64],
    df_full: usize,
    df_reduced: usize,
) -> Vec<f64> {
    assert_eq!(ll_full.len(), ll_reduced.len());

    let df = df_full.saturating_sub(df_reduced) as f64;
    if df == 0.0 {
        return vec![f64::NAN; ll_full.len()];
    }

    ll_full
        .iter()
        .zip(ll_reduced)
        .map(|(&full, &reduced)| chi2_sf(2.0 * (full - reduced), df))
        .collect()
}

/// Wald test per feature with a normal approximation.
///
/// Standard deviations at or below zero are floored to [`TINY`] before
/// the division.
pub fn wald_test(theta_mle: &[f64], theta_sd: &[f64], theta0: f64) -> Vec<f64> {
    assert_eq!(theta_mle.len(), theta_sd.len());

    theta_mle
        .iter()
        .zip(theta_sd)
        .map(|(&mle, &sd)| {
            let sd = if sd < TINY { TINY } else { sd };
            normal_two_sided((mle - theta0) / sd)
        })
        .collect()
}

/// Wald test per feature over several coefficients at once.
///
/// `theta_mle` is coefficients x features, `theta_covar` is
/// features x coefficients x coefficients. The statistic is the quadratic
/// form `(theta - theta0)^T Sigma^-1 (theta - theta0)` against a
/// chi-square distribution with dim(theta) degrees of freedom. Features
/// with a singular covariance yield NaN.
pub fn wald_test_chisq(
    theta_mle: ArrayView2<f64>,
    theta_covar: ArrayView3<f64>,
    theta0: f64,
) -> Vec<f64> {
    let k = theta_mle.nrows();
    let n_features = theta_mle.ncols();
    assert_eq!(theta_covar.shape(), &[n_features, k, k]);

    (0..n_features)
        .map(|g| {
            let diff = DVector::from_iterator(k, (0..k).map(|c| theta_mle[[c, g]] - theta0));
            let covar = DMatrix::from_fn(k, k, |r, c| theta_covar[[g, r, c]]);
            match covar.try_inverse() {
                Some(inv) => {
                    let stat = (diff.transpose() * inv * diff)[(0, 0)];
                    chi2_sf(stat, k as f64)
                }
                None => f64::NAN,
            }
        })
        .collect()
}

/// Welch's t-test per feature from sufficient statistics.
///
/// Uses the Welch-Satterthwaite degrees of freedom. Group sizes below two
/// or zero pooled variance make the feature untestable (NaN).
pub fn t_test_moments(
    mu0: &[f64],
    mu1: &[f64],
    var0: &[f64],
    var1: &[f64],
    n0: usize,
    n1: usize,
) -> Vec<f64> {
    assert_eq!(mu0.len(), mu1.len());
    assert_eq!(var0.len(), var1.len());
    assert_eq!(mu0.len(), var0.len());

    let n0 = n0 as f64;
    let n1 = n1 as f64;

    (0..mu0.len())
        .map(|i| {
            let s0 = var0[i] / n0;
            let s1 = var1[i] / n1;
            let se2 = s0 + s1;
            let t = (mu1[i] - mu0[i]) / se2.sqrt();
            let df = se2 * se2 / (s0 * s0 / (n0 - 1.0) + s1 * s1 / (n1 - 1.0));
            match StudentsT::new(0.0, 1.0, df) {
                Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
                Err(_) => f64::NAN,
            }
        })
        .collect()
}

/// Two-coefficient z-test per feature.
///
/// The statistic is `(theta1 - theta0) / sqrt(sd0^2 + sd1^2)` with the
/// denominator floored at [`TINY`].
pub fn two_coef_z_test(
    theta_mle0: &[f64],
    theta_mle1: &[f64],
    theta_sd0: &[f64],
    theta_sd1: &[f64],
) -> Vec<f64> {
    assert_eq!(theta_mle0.len(), theta_mle1.len());
    assert_eq!(theta_sd0.len(), theta_sd1.len());
    assert_eq!(theta_mle0.len(), theta_sd0.len());

    (0..theta_mle0.len())
        .map(|i| {
            let denom = (theta_sd0[i] * theta_sd0[i] + theta_sd1[i] * theta_sd1[i]).sqrt();
            let denom = if denom < TINY { TINY } else { denom };
            normal_two_sided((theta_mle1[i] - theta_mle0[i]) / denom)
        })
        .collect()
}

/// Mann-Whitney U test for one feature.
///
/// Rank-sum statistic with a tie-corrected normal approximation and a 0.5
/// continuity correction, two-sided. Empty groups, NaN observations or a
/// fully tied pooled sample yield NaN.
pub fn mann_whitney_u(x0: &[f64], x1: &[f64]) -> f64 {
    if x0.is_empty() || x1.is_empty() {
        return f64::NAN;
    }
    if x0.iter().chain(x1).any(|v| v.is_nan()) {
        return f64::NAN;
    }

    let n0 = x0.len() as f64;
    let n1 = x1.len() as f64;
    let n = n0 + n1;

    let pooled: Vec<f64> = x0.iter().chain(x1).copied().collect();
    let (ranks, tie_term) = average_ranks(&pooled);

    let r0: f64 = ranks[..x0.len()].iter().sum();
    let u0 = r0 - n0 * (n0 + 1.0) / 2.0;

    let mu = n0 * n1 / 2.0;
    let var = n0 * n1 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if var <= 0.0 {
        return f64::NAN;
    }

    let numerator = ((u0 - mu).abs() - 0.5).max(0.0);
    let standard = Normal::standard();
    (2.0 * (1.0 - standard.cdf(numerator / var.sqrt()))).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_wald_known_value() {
        // 2 * (1 - Phi(2.0)) ~= 0.0455
        let pvals = wald_test(&[2.0], &[1.0], 0.0);
        assert!((pvals[0] - 0.0455).abs() < 1e-3);
    }

    #[test]
    fn test_wald_zero_sd_floored() {
        let pvals = wald_test(&[1.0, 0.0], &[0.0, 0.0], 0.0);
        // Non-zero estimate over a floored sd is maximally significant.
        assert_eq!(pvals[0], 0.0);
        // Zero estimate stays non-significant.
        assert_eq!(pvals[1], 1.0);
    }

    #[test]
    fn test_wald_nan_propagates() {
        let pvals = wald_test(&[f64::NAN], &[1.0], 0.0);
        assert!(pvals[0].is_nan());
    }

    #[test]
    fn test_lrt_basic() {
        let pvals = likelihood_ratio_test(&[-10.0, -5.0], &[-12.0, -5.0], 3, 2);
        // 2 * (12 - 10) = 4 against chi2(1): p ~ 0.0455
        assert!((pvals[0] - 0.0455).abs() < 1e-3);
        // Identical likelihoods: statistic zero, p = 1.
        assert_eq!(pvals[1], 1.0);
    }

    #[test]
    fn test_lrt_zero_df() {
        let pvals = likelihood_ratio_test(&[-10.0], &[-12.0], 2, 2);
        assert!(pvals[0].is_nan());
    }

    #[test]
    fn test_wald_chisq_identity_covar() {
        // theta = (2, 0), Sigma = I: statistic 4 against chi2(2).
        let mle = Array2::from_shape_vec((2, 1), vec![2.0, 0.0]).unwrap();
        let covar =
            Array3::from_shape_vec((1, 2, 2), vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let pvals = wald_test_chisq(mle.view(), covar.view(), 0.0);
        // chi2(2) sf at 4 = exp(-2) ~ 0.1353
        assert!((pvals[0] - (-2.0f64).exp()).abs() < 1e-10);
    }

    #[test]
    fn test_wald_chisq_singular_covar() {
        let mle = Array2::from_shape_vec((2, 1), vec![1.0, 1.0]).unwrap();
        let covar =
            Array3::from_shape_vec((1, 2, 2), vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        let pvals = wald_test_chisq(mle.view(), covar.view(), 0.0);
        assert!(pvals[0].is_nan());
    }

    #[test]
    fn test_t_test_moments_identical_groups() {
        let pvals = t_test_moments(&[5.0], &[5.0], &[1.0], &[1.0], 10, 10);
        assert!(pvals[0].is_nan() || pvals[0] > 0.99);
    }

    #[test]
    fn test_t_test_moments_separated_groups() {
        let pvals = t_test_moments(&[0.0], &[10.0], &[1.0], &[1.0], 20, 20);
        assert!(pvals[0] < 1e-6);
    }

    #[test]
    fn test_t_test_moments_bounds() {
        let pvals = t_test_moments(
            &[0.0, 1.0, 2.0],
            &[0.5, 1.5, 1.9],
            &[1.0, 2.0, 0.5],
            &[1.2, 1.8, 0.7],
            8,
            12,
        );
        for p in pvals {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_t_test_moments_tiny_group() {
        // A single observation per group has no Welch df.
        let pvals = t_test_moments(&[1.0], &[2.0], &[0.5], &[0.5], 1, 1);
        assert!(pvals[0].is_nan());
    }

    #[test]
    fn test_two_coef_z_test_symmetric() {
        let p01 = two_coef_z_test(&[1.0], &[3.0], &[0.5], &[0.5]);
        let p10 = two_coef_z_test(&[3.0], &[1.0], &[0.5], &[0.5]);
        assert_eq!(p01[0], p10[0]);
        assert!(p01[0] < 0.05);
    }

    #[test]
    fn test_two_coef_z_test_zero_sd() {
        let pvals = two_coef_z_test(&[1.0], &[1.0], &[0.0], &[0.0]);
        assert_eq!(pvals[0], 1.0);
    }

    #[test]
    fn test_mann_whitney_separated() {
        let x0: Vec<f64> = (1..=20).map(f64::from).collect();
        let x1: Vec<f64> = (31..=50).map(f64::from).collect();
        let p = mann_whitney_u(&x0, &x1);
        assert!(p < 0.001);
    }

    #[test]
    fn test_mann_whitney_identical() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let p = mann_whitney_u(&x, &x);
        assert!(p > 0.8);
    }

    #[test]
    fn test_mann_whitney_ties_in_bounds() {
        let x0 = vec![1.0, 2.0, 3.0, 3.0, 4.0];
        let x1 = vec![3.0, 4.0, 5.0, 5.0, 6.0];
        let p = mann_whitney_u(&x0, &x1);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_mann_whitney_degenerate() {
        assert!(mann_whitney_u(&[], &[1.0]).is_nan());
        assert!(mann_whitney_u(&[1.0, f64::NAN], &[2.0]).is_nan());
        // Fully tied pooled sample has zero rank variance.
        assert!(mann_whitney_u(&[5.0, 5.0], &[5.0, 5.0]).is_nan());
    }
}
