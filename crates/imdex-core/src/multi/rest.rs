//! Each-group-against-the-rest result

use ndarray::{s, Array1, Array3};

use imdex_stats::CorrectionMethod;

use crate::error::{ImdexError, ImdexResult};
use crate::feature::FeatureSet;
use crate::result::{CorrectionScope, ResultCache, SingleTest, TestResult};
use crate::summary::{
    apply_thresholds, assemble_records, multi_records, SummaryFilter, SummaryRecord,
};

use super::group_position;

/// One precomputed test per group against all remaining observations,
/// reshaped into the common `[1, groups, features]` multi-result form.
#[derive(Debug)]
pub struct VsRestTest {
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

impl VsRestTest {
    /// Assemble from one test per group, in group order. `mean` is the
    /// grand mean expression over all observations.
    #[allow(clippy::too_many_arguments)]
    pub fn from_tests(
        features: FeatureSet,
        groups: Vec<String>,
        tests: Vec<SingleTest>,
        mean: Array1<f64>,
        method: CorrectionMethod,
        scope: CorrectionScope,
        keep_tests: bool,
    ) -> ImdexResult<Self> {
        let n = groups.len();
        let n_features = features.len();

        if tests.len() != n {
            return Err(ImdexError::ShapeMismatch {
                message: format!("{} groups need {} tests, got {}", n, n, tests.len()),
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

        let mut pval = Array3::from_elem((1, n, n_features), f64::NAN);
        let mut log_fold_change = Array3::from_elem((1, n, n_features), f64::NAN);
        for (k, test) in tests.iter().enumerate() {
            let result = test.as_result();
            if result.features() != &features {
                return Err(ImdexError::FeatureMismatch {
                    message: format!("test for group '{}' covers different features", groups[k]),
                });
            }
            let p = result.pval()?;
            let lfc = result.log_fold_change_ln()?;
            for g in 0..n_features {
                pval[[0, k, g]] = p[[g]];
                log_fold_change[[0, k, g]] = lfc[[g]];
            }
        }

        Ok(Self {
            features,
            groups,
            pval,
            log_fold_change,
            mean,
            retained: keep_tests.then_some(tests),
            method,
            scope,
            cache: ResultCache::new(),
        })
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// The retained per-group tests, in group order.
    pub fn tests(&self) -> ImdexResult<&[SingleTest]> {
        self.retained
            .as_deref()
            .ok_or(ImdexError::TestsNotRetained)
    }

    /// P-values of one group against the rest.
    pub fn pval_group(&self, group: &str) -> ImdexResult<Array1<f64>> {
        let k = group_position(&self.groups, group)?;
        Ok(self.pval.slice(s![0, k, ..]).to_owned())
    }

    /// Q-values of one group against the rest.
    pub fn qval_group(&self, group: &str) -> ImdexResult<Array1<f64>> {
        let k = group_position(&self.groups, group)?;
        let qval = self.qval()?;
        Ok(Array1::from_iter(
            (0..self.features.len()).map(|g| qval[[0, k, g]]),
        ))
    }

    /// Fold-change of one group against the rest in the requested base.
    pub fn log_fold_change_group(&self, group: &str, base: f64) -> ImdexResult<Array1<f64>> {
        let k = group_position(&self.groups, group)?;
        let lfc = self.log_fold_change(base)?;
        Ok(Array1::from_iter(
            (0..self.features.len()).map(|g| lfc[[0, k, g]]),
        ))
    }

    /// Summary rows restricted to one group.
    pub fn summary_group(
        &self,
        group: &str,
        filter: &SummaryFilter,
    ) -> ImdexResult<Vec<SummaryRecord>> {
        let pval = self.pval_group(group)?;
        let qval = self.qval_group(group)?;
        let log2fc = self.log_fold_change_group(group, 2.0)?;
        let records = assemble_records(
            &self.features,
            pval.view(),
            qval.view(),
            log2fc.view(),
            self.mean.view(),
        );
        apply_thresholds(records, filter)
    }
}

impl TestResult for VsRestTest {
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
