//! Moment-based two-group tests
//!
//! Welch t-test and Mann-Whitney rank test over an observation matrix
//! split by a binary grouping. Both compute their p-values eagerly at
//! construction; the degenerate zero-variance cases follow an explicit
//! policy table instead of dividing by zero.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use imdex_stats::{mann_whitney_u, t_test_moments, CorrectionMethod};

use crate::error::ImdexResult;
use crate::feature::FeatureSet;
use crate::grouping::Grouping;
use crate::result::{ResultCache, TestResult};
use crate::summary::{apply_thresholds, single_records, SummaryFilter, SummaryRecord};

/// Verdict for features whose variance vanishes in both groups while the
/// group means differ: the statistic is undefined, but the observed
/// difference is either trusted (maximally significant) or discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZeroVariancePolicy {
    /// Differing constant groups are reported as p = 0.
    #[default]
    Significant,
    /// Differing constant groups are reported as p = 1.
    NonSignificant,
}

fn check_feature_count(x: &Array2<f64>, features: &FeatureSet) -> ImdexResult<()> {
    if x.ncols() != features.len() {
        return Err(crate::error::ImdexError::ShapeMismatch {
            message: format!(
                "observation matrix has {} columns for {} features",
                x.ncols(),
                features.len()
            ),
        });
    }
    Ok(())
}

/// Per-feature moments of a two-group split.
struct GroupedMoments {
    mean0: Array1<f64>,
    mean1: Array1<f64>,
    var0: Array1<f64>,
    var1: Array1<f64>,
    n0: usize,
    n1: usize,
    /// Group-size weighted mean over both groups.
    mean: Array1<f64>,
    /// Whether either group has positive variance.
    var_nonzero: Vec<bool>,
}

impl GroupedMoments {
    fn compute(x0: &Array2<f64>, x1: &Array2<f64>) -> Self {
        let n0 = x0.nrows();
        let n1 = x1.nrows();
        let n_features = x0.ncols();

        let nan_row = || Array1::from_elem(n_features, f64::NAN);
        let mean0 = x0.mean_axis(Axis(0)).unwrap_or_else(nan_row);
        let mean1 = x1.mean_axis(Axis(0)).unwrap_or_else(nan_row);
        let var0 = x0.var_axis(Axis(0), 0.0);
        let var1 = x1.var_axis(Axis(0), 0.0);

        let w0 = n0 as f64 / (n0 + n1) as f64;
        let w1 = n1 as f64 / (n0 + n1) as f64;
        let mean = &mean0 * w0 + &mean1 * w1;

        let var_nonzero = (0..n_features)
            .map(|g| var0[g] > 0.0 || var1[g] > 0.0)
            .collect();

        Self {
            mean0,
            mean1,
            var0,
            var1,
            n0,
            n1,
            mean,
            var_nonzero,
        }
    }

    /// Features worth running the statistic on: non-zero mean and some
    /// variance.
    fn testable(&self) -> Vec<usize> {
        (0..self.mean.len())
            .filter(|&g| self.mean[g] != 0.0 && self.var_nonzero[g])
            .collect()
    }

    /// Overwrite degenerate entries per the policy table. All-zero
    /// features keep their NaN.
    fn apply_zero_variance_policy(&self, pvals: &mut [f64], policy: ZeroVariancePolicy) {
        for g in 0..self.mean.len() {
            if self.var_nonzero[g] {
                continue;
            }
            if self.mean0[g] == self.mean1[g] {
                if self.mean[g] > 0.0 {
                    pvals[g] = 1.0;
                }
            } else {
                pvals[g] = match policy {
                    ZeroVariancePolicy::Significant => 0.0,
                    ZeroVariancePolicy::NonSignificant => 1.0,
                };
            }
        }
    }

    /// Natural-log fold-change of group one over group zero.
    fn log_fold_change(&self, data_is_logged: bool) -> Array1<f64> {
        if data_is_logged {
            &self.mean1 - &self.mean0
        } else {
            Array1::from_iter(
                self.mean0
                    .iter()
                    .zip(&self.mean1)
                    .map(|(&m0, &m1)| m1.ln() - m0.ln()),
            )
        }
    }
}

/// One Welch t-test per feature from group moments.
#[derive(Debug)]
pub struct TTest {
    features: FeatureSet,
    pval: Array1<f64>,
    log_fold_change: Array1<f64>,
    mean: Array1<f64>,
    zero_variance: Vec<bool>,
    method: CorrectionMethod,
    cache: ResultCache,
}

impl TTest {
    /// Split `x` by the binary `grouping` and test every feature.
    ///
    /// `data_is_logged` marks observation values already in log space, in
    /// which case the fold-change is the plain difference of group means.
    pub fn new(
        x: &Array2<f64>,
        grouping: &Grouping,
        features: FeatureSet,
        data_is_logged: bool,
        policy: ZeroVariancePolicy,
        method: CorrectionMethod,
    ) -> ImdexResult<Self> {
        check_feature_count(x, &features)?;
        let (x0, x1) = grouping.split_rows(x)?;
        let moments = GroupedMoments::compute(&x0, &x1);

        let mut pvals = vec![f64::NAN; features.len()];
        let testable = moments.testable();
        if !testable.is_empty() {
            let sub = |a: &Array1<f64>| -> Vec<f64> {
                testable.iter().map(|&g| a[g]).collect()
            };
            let computed = t_test_moments(
                &sub(&moments.mean0),
                &sub(&moments.mean1),
                &sub(&moments.var0),
                &sub(&moments.var1),
                moments.n0,
                moments.n1,
            );
            for (&g, p) in testable.iter().zip(computed) {
                pvals[g] = p;
            }
        }
        moments.apply_zero_variance_policy(&mut pvals, policy);

        Ok(Self {
            features,
            pval: Array1::from(pvals),
            log_fold_change: moments.log_fold_change(data_is_logged),
            mean: moments.mean.clone(),
            zero_variance: moments.var_nonzero.iter().map(|&v| !v).collect(),
            method,
            cache: ResultCache::new(),
        })
    }

    /// Features whose variance vanished in both groups.
    pub fn zero_variance(&self) -> &[bool] {
        &self.zero_variance
    }
}

impl TestResult for TTest {
    fn features(&self) -> &FeatureSet {
        &self.features
    }

    fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn correction_method(&self) -> CorrectionMethod {
        self.method
    }

    fn compute_pval(&self) -> ImdexResult<ndarray::ArrayD<f64>> {
        Ok(self.pval.clone().into_dyn())
    }

    fn compute_mean(&self) -> Array1<f64> {
        self.mean.clone()
    }

    fn compute_log_fold_change(&self) -> ImdexResult<ndarray::ArrayD<f64>> {
        Ok(self.log_fold_change.clone().into_dyn())
    }

    fn summary(&self, filter: &SummaryFilter) -> ImdexResult<Vec<SummaryRecord>> {
        let mut records = single_records(self)?;
        for (g, record) in records.iter_mut().enumerate() {
            record.zero_variance = Some(self.zero_variance[g]);
        }
        apply_thresholds(records, filter)
    }
}

/// One Mann-Whitney U test per feature.
#[derive(Debug)]
pub struct RankTest {
    features: FeatureSet,
    pval: Array1<f64>,
    log_fold_change: Array1<f64>,
    mean: Array1<f64>,
    zero_variance: Vec<bool>,
    method: CorrectionMethod,
    cache: ResultCache,
}

impl RankTest {
    pub fn new(
        x: &Array2<f64>,
        grouping: &Grouping,
        features: FeatureSet,
        data_is_logged: bool,
        policy: ZeroVariancePolicy,
        method: CorrectionMethod,
    ) -> ImdexResult<Self> {
        check_feature_count(x, &features)?;
        let (x0, x1) = grouping.split_rows(x)?;
        let moments = GroupedMoments::compute(&x0, &x1);

        let mut pvals = vec![f64::NAN; features.len()];
        for g in moments.testable() {
            pvals[g] = mann_whitney_u(&x0.column(g).to_vec(), &x1.column(g).to_vec());
        }
        moments.apply_zero_variance_policy(&mut pvals, policy);

        Ok(Self {
            features,
            pval: Array1::from(pvals),
            log_fold_change: moments.log_fold_change(data_is_logged),
            mean: moments.mean.clone(),
            zero_variance: moments.var_nonzero.iter().map(|&v| !v).collect(),
            method,
            cache: ResultCache::new(),
        })
    }

    pub fn zero_variance(&self) -> &[bool] {
        &self.zero_variance
    }
}

impl TestResult for RankTest {
    fn features(&self) -> &FeatureSet {
        &self.features
    }

    fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn correction_method(&self) -> CorrectionMethod {
        self.method
    }

    fn compute_pval(&self) -> ImdexResult<ndarray::ArrayD<f64>> {
        Ok(self.pval.clone().into_dyn())
    }

    fn compute_mean(&self) -> Array1<f64> {
        self.mean.clone()
    }

    fn compute_log_fold_change(&self) -> ImdexResult<ndarray::ArrayD<f64>> {
        Ok(self.log_fold_change.clone().into_dyn())
    }

    fn summary(&self, filter: &SummaryFilter) -> ImdexResult<Vec<SummaryRecord>> {
        let mut records = single_records(self)?;
        for (g, record) in records.iter_mut().enumerate() {
            record.zero_variance = Some(self.zero_variance[g]);
        }
        apply_thresholds(records, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn features(n: usize) -> FeatureSet {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    fn binary_grouping() -> Grouping {
        Grouping::from_labels(&["a", "a", "a", "b", "b", "b"])
    }

    /// Columns: ordinary signal, equal constant groups, differing constant
    /// groups, all zero.
    fn degenerate_matrix() -> Array2<f64> {
        array![
            [1.0, 5.0, 1.0, 0.0],
            [2.0, 5.0, 1.0, 0.0],
            [3.0, 5.0, 1.0, 0.0],
            [4.0, 5.0, 3.0, 0.0],
            [5.0, 5.0, 3.0, 0.0],
            [6.0, 5.0, 3.0, 0.0],
        ]
    }

    #[test]
    fn test_degenerate_policy_significant() {
        let test = TTest::new(
            &degenerate_matrix(),
            &binary_grouping(),
            features(4),
            false,
            ZeroVariancePolicy::Significant,
            CorrectionMethod::default(),
        )
        .unwrap();

        let pvals = test.pval().unwrap();
        assert!((0.0..=1.0).contains(&pvals[[0]]));
        // Equal constant groups with positive mean: forced to one.
        assert_eq!(pvals[[1]], 1.0);
        // Differing constant groups under the significant policy.
        assert_eq!(pvals[[2]], 0.0);
        // All-zero feature stays untestable.
        assert!(pvals[[3]].is_nan());
    }

    #[test]
    fn test_degenerate_policy_non_significant() {
        let test = TTest::new(
            &degenerate_matrix(),
            &binary_grouping(),
            features(4),
            false,
            ZeroVariancePolicy::NonSignificant,
            CorrectionMethod::default(),
        )
        .unwrap();

        let pvals = test.pval().unwrap();
        assert_eq!(pvals[[2]], 1.0);
    }

    #[test]
    fn test_fold_change_log_and_linear() {
        let x = array![[1.0, 1.0], [1.0, 1.0], [4.0, 3.0], [4.0, 3.0]];
        let grouping = Grouping::from_labels(&["a", "a", "b", "b"]);

        let linear = TTest::new(
            &x,
            &grouping,
            features(2),
            false,
            ZeroVariancePolicy::default(),
            CorrectionMethod::default(),
        )
        .unwrap();
        let lfc = linear.log_fold_change_ln().unwrap();
        assert!((lfc[[0]] - 4.0f64.ln()).abs() < 1e-12);

        let logged = TTest::new(
            &x,
            &grouping,
            features(2),
            true,
            ZeroVariancePolicy::default(),
            CorrectionMethod::default(),
        )
        .unwrap();
        let lfc = logged.log_fold_change_ln().unwrap();
        assert!((lfc[[0]] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_mean() {
        let x = array![[2.0], [2.0], [2.0], [8.0]];
        let grouping = Grouping::from_labels(&["a", "a", "a", "b"]);
        let test = TTest::new(
            &x,
            &grouping,
            features(1),
            false,
            ZeroVariancePolicy::default(),
            CorrectionMethod::default(),
        )
        .unwrap();
        assert!((test.mean()[0] - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_separated_groups_significant() {
        let x = array![
            [1.0],
            [1.1],
            [0.9],
            [9.0],
            [9.1],
            [8.9],
        ];
        let test = TTest::new(
            &x,
            &binary_grouping(),
            features(1),
            false,
            ZeroVariancePolicy::default(),
            CorrectionMethod::default(),
        )
        .unwrap();
        assert!(test.pval().unwrap()[[0]] < 0.01);
    }

    #[test]
    fn test_rank_test_matches_policy_table() {
        let test = RankTest::new(
            &degenerate_matrix(),
            &binary_grouping(),
            features(4),
            false,
            ZeroVariancePolicy::Significant,
            CorrectionMethod::default(),
        )
        .unwrap();

        let pvals = test.pval().unwrap();
        assert_eq!(pvals[[1]], 1.0);
        assert_eq!(pvals[[2]], 0.0);
        assert!(pvals[[3]].is_nan());
    }

    #[test]
    fn test_rank_test_separated_groups() {
        let x = array![
            [1.0],
            [2.0],
            [3.0],
            [10.0],
            [11.0],
            [12.0],
        ];
        let test = RankTest::new(
            &x,
            &binary_grouping(),
            features(1),
            false,
            ZeroVariancePolicy::default(),
            CorrectionMethod::default(),
        )
        .unwrap();
        let p = test.pval().unwrap()[[0]];
        assert!((0.0..0.2).contains(&p));
    }

    #[test]
    fn test_summary_flags_zero_variance() {
        let test = TTest::new(
            &degenerate_matrix(),
            &binary_grouping(),
            features(4),
            false,
            ZeroVariancePolicy::default(),
            CorrectionMethod::default(),
        )
        .unwrap();
        let records = test.summary(&SummaryFilter::default()).unwrap();
        assert_eq!(records[0].zero_variance, Some(false));
        assert_eq!(records[1].zero_variance, Some(true));
    }
}
