//! Dense pairwise result assembled from per-pair single tests

use ndarray::{Array1, Array3};

use imdex_stats::CorrectionMethod;

use crate::error::{ImdexError, ImdexResult};
use crate::feature::FeatureSet;
use crate::result::{clean_log10, CorrectionScope, ResultCache, SingleTest, TestResult};
use crate::summary::{apply_thresholds, multi_records, SummaryFilter, SummaryRecord};

use super::{group_position, pair_summary, slice_pair, upper_pairs};

/// All-against-all comparisons of more than two groups, one test per
/// upper-triangle pair.
///
/// The `[groups, groups, features]` tensors hold p-values symmetrically
/// and fold-changes antisymmetrically; the diagonal is neutral (p = 1,
/// fold-change = 0). Cell `[i, j]` reads as group `j` relative to group
/// `i`.
#[derive(Debug)]
pub struct PairwiseTest {
    features: FeatureSet,
    groups: Vec<String>,
    pval: Array3<f64>,
    log_fold_change: Array3<f64>,
    mean: Array1<f64>,
    retained: Option<Vec<SingleTest>>,
    method: CorrectionMethod,
    scope: CorrectionScope,
    cache: ResultCache,
}

impl PairwiseTest {
    /// Assemble from precomputed per-pair tests in upper-triangle order
    /// ((0,1), (0,2), ..., (1,2), ...). Each test must be oriented so its
    /// fold-change reads as the later group relative to the earlier one.
    ///
    /// `mean` is the grand mean expression across all groups. Pass
    /// `keep_tests` to retain the sub-tests for later inspection.
    #[allow(clippy::too_many_arguments)]
    pub fn from_pairs(
        features: FeatureSet,
        groups: Vec<String>,
        pair_tests: Vec<SingleTest>,
        mean: Array1<f64>,
        method: CorrectionMethod,
        scope: CorrectionScope,
        keep_tests: bool,
    ) -> ImdexResult<Self> {
        let n = groups.len();
        let n_features = features.len();
        let pairs = upper_pairs(n);

        if pair_tests.len() != pairs.len() {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "{} groups need {} pairwise tests, got {}",
                    n,
                    pairs.len(),
                    pair_tests.len()
                ),
            });
        }
        if mean.len() != n_features {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "mean has {} entries for {} features",
                    mean.len(),
                    n_features
                ),
            });
        }

        let mut pval = Array3::from_elem((n, n, n_features), f64::NAN);
        let mut log_fold_change = Array3::from_elem((n, n, n_features), f64::NAN);
        for k in 0..n {
            for g in 0..n_features {
                pval[[k, k, g]] = 1.0;
                log_fold_change[[k, k, g]] = 0.0;
            }
        }

        for (&(i, j), test) in pairs.iter().zip(&pair_tests) {
            let result = test.as_result();
            if result.features() != &features {
                return Err(ImdexError::FeatureMismatch {
                    message: format!("pairwise test ({i}, {j}) covers different features"),
                });
            }
            let p = result.pval()?;
            let lfc = result.log_fold_change_ln()?;
            for g in 0..n_features {
                pval[[i, j, g]] = p[[g]];
                pval[[j, i, g]] = p[[g]];
                log_fold_change[[i, j, g]] = lfc[[g]];
                log_fold_change[[j, i, g]] = -lfc[[g]];
            }
        }

        Ok(Self {
            features,
            groups,
            pval,
            log_fold_change,
            mean,
            retained: keep_tests.then_some(pair_tests),
            method,
            scope,
            cache: ResultCache::new(),
        })
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// The retained per-pair tests, in upper-triangle order.
    pub fn tests(&self) -> ImdexResult<&[SingleTest]> {
        self.retained
            .as_deref()
            .ok_or(ImdexError::TestsNotRetained)
    }

    fn pair_indices(&self, group1: &str, group2: &str) -> ImdexResult<(usize, usize)> {
        Ok((
            group_position(&self.groups, group1)?,
            group_position(&self.groups, group2)?,
        ))
    }

    /// P-values of one group pair.
    pub fn pval_pair(&self, group1: &str, group2: &str) -> ImdexResult<Array1<f64>> {
        let (i, j) = self.pair_indices(group1, group2)?;
        Ok(slice_pair(self.pval()?, i, j))
    }

    /// Q-values of one group pair.
    pub fn qval_pair(&self, group1: &str, group2: &str) -> ImdexResult<Array1<f64>> {
        let (i, j) = self.pair_indices(group1, group2)?;
        Ok(slice_pair(self.qval()?, i, j))
    }

    /// Fold-change of one group pair in the requested base.
    pub fn log_fold_change_pair(
        &self,
        group1: &str,
        group2: &str,
        base: f64,
    ) -> ImdexResult<Array1<f64>> {
        let (i, j) = self.pair_indices(group1, group2)?;
        Ok(slice_pair(&self.log_fold_change(base)?, i, j))
    }

    /// Cleaned log10 p-values of one group pair.
    pub fn log10_pval_pair_clean(
        &self,
        group1: &str,
        group2: &str,
        log10_threshold: f64,
    ) -> ImdexResult<Array1<f64>> {
        let pvals = self.pval_pair(group1, group2)?;
        Ok(Array1::from(clean_log10(pvals, log10_threshold)))
    }

    /// Cleaned log10 q-values of one group pair.
    pub fn log10_qval_pair_clean(
        &self,
        group1: &str,
        group2: &str,
        log10_threshold: f64,
    ) -> ImdexResult<Array1<f64>> {
        let qvals = self.qval_pair(group1, group2)?;
        Ok(Array1::from(clean_log10(qvals, log10_threshold)))
    }

    /// Summary rows restricted to one group pair.
    pub fn summary_pair(
        &self,
        group1: &str,
        group2: &str,
        filter: &SummaryFilter,
    ) -> ImdexResult<Vec<SummaryRecord>> {
        let (i, j) = self.pair_indices(group1, group2)?;
        pair_summary(self, i, j, filter)
    }
}

impl TestResult for PairwiseTest {
    fn features(&self) -> &FeatureSet {
        &self.features
    }

    fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn correction_method(&self) -> CorrectionMethod {
        self.method
    }

    fn correction_scope(&self) -> CorrectionScope {
        self.scope
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
        apply_thresholds(multi_records(self)?, filter)
    }
}
