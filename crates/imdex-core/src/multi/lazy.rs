//! Lazy pairwise result for very large group counts
//!
//! Stores only the per-group coefficient and standard-deviation matrices
//! and computes any requested `[groups0, groups1, features]` sub-block on
//! demand. The full tensor never exists: memory is bounded by the
//! requested block, not by the group-pair combinatorics.

use std::sync::Arc;

use ndarray::{s, Array1, Array2, Array3};

use imdex_stats::{two_coef_z_test, CorrectionMethod, TINY};

use crate::error::{ImdexError, ImdexResult};
use crate::feature::FeatureSet;
use crate::model::ModelFit;
use crate::result::{correct_tensor, CorrectionScope, ResultCache, TestResult};
use crate::summary::{
    apply_thresholds, assemble_records, reduce_tensor, SummaryFilter, SummaryRecord,
};

use super::group_position;

/// Pairwise z-tests evaluated on demand for bounded sub-blocks.
///
/// The whole-tensor accessors (`pval`, `qval`, `log_fold_change`,
/// `summary`) are intentionally unavailable and fail loudly; use the
/// `*_pairs` methods. Sub-block correction and fold-changes are
/// recomputed on every call and never cached.
#[derive(Debug)]
pub struct LazyPairwiseTest {
    features: FeatureSet,
    groups: Vec<String>,
    /// Location coefficients, groups x features.
    theta_mle: Array2<f64>,
    /// Floored standard deviations, groups x features.
    theta_sd: Array2<f64>,
    mean: Array1<f64>,
    log_likelihood: Array1<f64>,
    method: CorrectionMethod,
    scope: CorrectionScope,
    cache: ResultCache,
}

impl LazyPairwiseTest {
    pub fn new(
        model: &Arc<ModelFit>,
        groups: Vec<String>,
        method: CorrectionMethod,
        scope: CorrectionScope,
    ) -> ImdexResult<Self> {
        let n = groups.len();
        if model.n_params() < n {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "model carries {} coefficients for {} groups",
                    model.n_params(),
                    n
                ),
            });
        }

        let theta_mle = model.coefficients().slice(s![..n, ..]).to_owned();
        let theta_sd = Array2::from_shape_fn((n, model.n_features()), |(g, f)| {
            let var = model.fisher_inv()[[f, g, g]];
            let var = if var < TINY { TINY } else { var };
            var.sqrt()
        });

        Ok(Self {
            features: model.features().clone(),
            groups,
            theta_mle,
            theta_sd,
            mean: model.mean_by_feature(),
            log_likelihood: model.log_likelihood().clone(),
            method,
            scope,
            cache: ResultCache::new(),
        })
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Resolve an optional group subset; `None` means all groups.
    fn resolve(&self, subset: Option<&[String]>) -> ImdexResult<Vec<usize>> {
        match subset {
            None => Ok((0..self.groups.len()).collect()),
            Some(labels) => labels
                .iter()
                .map(|label| group_position(&self.groups, label))
                .collect(),
        }
    }

    /// P-values of all pairwise comparisons of `groups0` against
    /// `groups1`, computed on demand. Same-group cells hold p = 1.
    pub fn pval_pairs(
        &self,
        groups0: Option<&[String]>,
        groups1: Option<&[String]>,
    ) -> ImdexResult<Array3<f64>> {
        let idx0 = self.resolve(groups0)?;
        let idx1 = self.resolve(groups1)?;
        let n_features = self.features.len();

        let mut pval = Array3::from_elem((idx0.len(), idx1.len(), n_features), f64::NAN);
        for (a, &i) in idx0.iter().enumerate() {
            for (b, &j) in idx1.iter().enumerate() {
                if i == j {
                    for g in 0..n_features {
                        pval[[a, b, g]] = 1.0;
                    }
                } else {
                    let lane = two_coef_z_test(
                        &self.theta_mle.row(i).to_vec(),
                        &self.theta_mle.row(j).to_vec(),
                        &self.theta_sd.row(i).to_vec(),
                        &self.theta_sd.row(j).to_vec(),
                    );
                    for (g, p) in lane.into_iter().enumerate() {
                        pval[[a, b, g]] = p;
                    }
                }
            }
        }

        Ok(pval)
    }

    /// Corrected p-values of a sub-block, recomputed on every call.
    pub fn qval_pairs(
        &self,
        groups0: Option<&[String]>,
        groups1: Option<&[String]>,
    ) -> ImdexResult<Array3<f64>> {
        let pval = self.pval_pairs(groups0, groups1)?;
        let qval = correct_tensor(&pval.clone().into_dyn(), self.method, self.scope);
        Ok(qval
            .into_dimensionality()
            .expect("correction preserves the block shape"))
    }

    /// Fold-changes of a sub-block in the requested base; `[a, b]` reads
    /// as the second group relative to the first, matching the dense
    /// tensors.
    pub fn log_fold_change_pairs(
        &self,
        groups0: Option<&[String]>,
        groups1: Option<&[String]>,
        base: f64,
    ) -> ImdexResult<Array3<f64>> {
        let idx0 = self.resolve(groups0)?;
        let idx1 = self.resolve(groups1)?;
        let n_features = self.features.len();
        let scale = if base == std::f64::consts::E {
            1.0
        } else {
            base.ln()
        };

        let mut log_fold_change = Array3::zeros((idx0.len(), idx1.len(), n_features));
        for (a, &i) in idx0.iter().enumerate() {
            for (b, &j) in idx1.iter().enumerate() {
                for g in 0..n_features {
                    log_fold_change[[a, b, g]] =
                        (self.theta_mle[[j, g]] - self.theta_mle[[i, g]]) / scale;
                }
            }
        }

        Ok(log_fold_change)
    }

    /// Summary rows of one pairwise comparison.
    pub fn summary_pair(
        &self,
        group0: &str,
        group1: &str,
        filter: &SummaryFilter,
    ) -> ImdexResult<Vec<SummaryRecord>> {
        let g0 = [group0.to_string()];
        let g1 = [group1.to_string()];
        let pval = self.pval_pairs(Some(&g0), Some(&g1))?;
        let qval = self.qval_pairs(Some(&g0), Some(&g1))?;
        let log2fc = self.log_fold_change_pairs(Some(&g0), Some(&g1), 2.0)?;

        let records = assemble_records(
            &self.features,
            pval.slice(s![0, 0, ..]),
            qval.slice(s![0, 0, ..]),
            log2fc.slice(s![0, 0, ..]),
            self.mean.view(),
        );
        apply_thresholds(records, filter)
    }

    /// Reduced summary rows over a set of pairwise comparisons: minimum
    /// p/q per feature and the sign-normalized extreme fold-change.
    pub fn summary_pairs(
        &self,
        groups0: Option<&[String]>,
        groups1: Option<&[String]>,
        filter: &SummaryFilter,
    ) -> ImdexResult<Vec<SummaryRecord>> {
        let pval = self.pval_pairs(groups0, groups1)?.into_dyn();
        let qval = correct_tensor(&pval, self.method, self.scope);
        let log2fc = self
            .log_fold_change_pairs(groups0, groups1, 2.0)?
            .into_dyn();

        let (min_pval, min_qval, extreme_fc) = reduce_tensor(&pval, &qval, &log2fc);
        let records = self
            .features
            .ids()
            .iter()
            .enumerate()
            .map(|(g, id)| {
                SummaryRecord::new(
                    id.clone(),
                    min_pval[g],
                    min_qval[g],
                    extreme_fc[g],
                    self.mean[g],
                )
            })
            .collect();
        apply_thresholds(records, filter)
    }
}

impl TestResult for LazyPairwiseTest {
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
        Err(ImdexError::DenseUnavailable { quantity: "p-value" })
    }

    fn compute_mean(&self) -> Array1<f64> {
        self.mean.clone()
    }

    fn compute_log_likelihood(&self) -> Option<Array1<f64>> {
        Some(self.log_likelihood.clone())
    }

    fn compute_log_fold_change(&self) -> ImdexResult<ndarray::ArrayD<f64>> {
        Err(ImdexError::DenseUnavailable {
            quantity: "fold-change",
        })
    }

    fn summary(&self, _filter: &SummaryFilter) -> ImdexResult<Vec<SummaryRecord>> {
        Err(ImdexError::DenseUnavailable { quantity: "summary" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testutil::fit_from_coefficients;
    use crate::multi::ZTest;
    use ndarray::array;

    fn model() -> Arc<ModelFit> {
        Arc::new(fit_from_coefficients(
            &["f1", "f2"],
            array![[0.0, 1.0], [2.0, 1.1], [5.0, 0.9]],
            0.5,
        ))
    }

    fn group_names() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    fn lazy() -> LazyPairwiseTest {
        LazyPairwiseTest::new(
            &model(),
            group_names(),
            CorrectionMethod::default(),
            CorrectionScope::Global,
        )
        .unwrap()
    }

    #[test]
    fn test_full_block_matches_dense_ztest() {
        let lazy = lazy();
        let dense = ZTest::new(
            &model(),
            group_names(),
            CorrectionMethod::default(),
            CorrectionScope::Global,
        )
        .unwrap();

        let block = lazy.pval_pairs(None, None).unwrap();
        let dense_pval = dense.pval().unwrap();
        assert_eq!(block.shape(), dense_pval.shape());
        for i in 0..3 {
            for j in 0..3 {
                for g in 0..2 {
                    assert_eq!(block[[i, j, g]], dense_pval[[i, j, g]]);
                }
            }
        }
    }

    #[test]
    fn test_sub_block_is_bounded() {
        let lazy = lazy();
        let g0 = ["a".to_string()];
        let block = lazy.pval_pairs(Some(&g0), None).unwrap();
        assert_eq!(block.shape(), &[1, 3, 2]);
        // The self-comparison is neutral.
        assert_eq!(block[[0, 0, 0]], 1.0);
    }

    #[test]
    fn test_dense_accessors_fail_loudly() {
        let lazy = lazy();
        assert!(matches!(
            lazy.pval(),
            Err(ImdexError::DenseUnavailable { .. })
        ));
        assert!(matches!(
            lazy.qval(),
            Err(ImdexError::DenseUnavailable { .. })
        ));
        assert!(matches!(
            lazy.log2_fold_change(),
            Err(ImdexError::DenseUnavailable { .. })
        ));
        assert!(matches!(
            lazy.summary(&SummaryFilter::default()),
            Err(ImdexError::DenseUnavailable { .. })
        ));
        // The refusal is stable across calls.
        assert!(lazy.pval().is_err());
    }

    #[test]
    fn test_unknown_group_fails() {
        let lazy = lazy();
        let bad = ["nope".to_string()];
        assert!(matches!(
            lazy.pval_pairs(Some(&bad), None),
            Err(ImdexError::UnknownGroup { .. })
        ));
    }

    #[test]
    fn test_fold_change_orientation_matches_dense() {
        let lazy = lazy();
        let block = lazy.log_fold_change_pairs(None, None, std::f64::consts::E).unwrap();
        // [i, j] is theta_j - theta_i.
        assert_eq!(block[[0, 2, 0]], 5.0);
        assert_eq!(block[[2, 0, 0]], -5.0);
    }

    #[test]
    fn test_qval_pairs_recomputed_uncached() {
        let lazy = lazy();
        let first = lazy.qval_pairs(None, None).unwrap();
        let second = lazy.qval_pairs(None, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_summary_pair_rows() {
        let lazy = lazy();
        let records = lazy
            .summary_pair("a", "c", &SummaryFilter::default())
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].pval < 1e-6);
    }

    #[test]
    fn test_summary_pairs_reduction() {
        let lazy = lazy();
        let records = lazy
            .summary_pairs(None, None, &SummaryFilter::default())
            .unwrap();
        // Minimum p-value per feature over the full block.
        let block = lazy.pval_pairs(None, None).unwrap();
        let mut min_p = f64::INFINITY;
        for i in 0..3 {
            for j in 0..3 {
                min_p = min_p.min(block[[i, j, 0]]);
            }
        }
        assert_eq!(records[0].pval, min_p);
    }
}
