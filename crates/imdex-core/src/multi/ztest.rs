//! Dense z-test result over per-group location coefficients

use std::sync::Arc;

use ndarray::{s, Array1, Array2, Array3};

use imdex_stats::{two_coef_z_test, CorrectionMethod, TINY};

use crate::error::{ImdexError, ImdexResult};
use crate::feature::FeatureSet;
use crate::model::ModelFit;
use crate::result::{clean_log10, CorrectionScope, ResultCache, TestResult};
use crate::summary::{apply_thresholds, multi_records, SummaryFilter, SummaryRecord};

use super::{group_position, map_pairs, pair_summary, slice_pair, upper_pairs};

/// All-against-all z-tests between per-group location coefficients of one
/// fitted model (one coefficient per group).
///
/// Same tensor discipline as [`super::PairwiseTest`]: symmetric p-values,
/// antisymmetric fold-changes, neutral diagonal; `[i, j]` reads as group
/// `j` relative to group `i`.
#[derive(Debug)]
pub struct ZTest {
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

impl ZTest {
    /// The model must carry one location coefficient per group, in group
    /// order; standard deviations come off the inverse Fisher diagonal.
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

    fn pair_indices(&self, group1: &str, group2: &str) -> ImdexResult<(usize, usize)> {
        Ok((
            group_position(&self.groups, group1)?,
            group_position(&self.groups, group2)?,
        ))
    }

    pub fn pval_pair(&self, group1: &str, group2: &str) -> ImdexResult<Array1<f64>> {
        let (i, j) = self.pair_indices(group1, group2)?;
        Ok(slice_pair(self.pval()?, i, j))
    }

    pub fn qval_pair(&self, group1: &str, group2: &str) -> ImdexResult<Array1<f64>> {
        let (i, j) = self.pair_indices(group1, group2)?;
        Ok(slice_pair(self.qval()?, i, j))
    }

    pub fn log_fold_change_pair(
        &self,
        group1: &str,
        group2: &str,
        base: f64,
    ) -> ImdexResult<Array1<f64>> {
        let (i, j) = self.pair_indices(group1, group2)?;
        Ok(slice_pair(&self.log_fold_change(base)?, i, j))
    }

    pub fn log10_pval_pair_clean(
        &self,
        group1: &str,
        group2: &str,
        log10_threshold: f64,
    ) -> ImdexResult<Array1<f64>> {
        let pvals = self.pval_pair(group1, group2)?;
        Ok(Array1::from(clean_log10(pvals, log10_threshold)))
    }

    pub fn log10_qval_pair_clean(
        &self,
        group1: &str,
        group2: &str,
        log10_threshold: f64,
    ) -> ImdexResult<Array1<f64>> {
        let qvals = self.qval_pair(group1, group2)?;
        Ok(Array1::from(clean_log10(qvals, log10_threshold)))
    }

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

impl TestResult for ZTest {
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
        let n = self.groups.len();
        let n_features = self.features.len();

        let mut pval = Array3::from_elem((n, n, n_features), f64::NAN);
        for k in 0..n {
            for g in 0..n_features {
                pval[[k, k, g]] = 1.0;
            }
        }

        let pairs = upper_pairs(n);
        let computed = map_pairs(&pairs, |i, j| {
            two_coef_z_test(
                &self.theta_mle.row(i).to_vec(),
                &self.theta_mle.row(j).to_vec(),
                &self.theta_sd.row(i).to_vec(),
                &self.theta_sd.row(j).to_vec(),
            )
        });
        for (&(i, j), lane) in pairs.iter().zip(computed) {
            for (g, p) in lane.into_iter().enumerate() {
                pval[[i, j, g]] = p;
                pval[[j, i, g]] = p;
            }
        }

        Ok(pval.into_dyn())
    }

    fn compute_mean(&self) -> Array1<f64> {
        self.mean.clone()
    }

    fn compute_log_likelihood(&self) -> Option<Array1<f64>> {
        Some(self.log_likelihood.clone())
    }

    fn compute_log_fold_change(&self) -> ImdexResult<ndarray::ArrayD<f64>> {
        let n = self.groups.len();
        let n_features = self.features.len();

        let mut log_fold_change = Array3::zeros((n, n, n_features));
        for (i, j) in upper_pairs(n) {
            for g in 0..n_features {
                let delta = self.theta_mle[[j, g]] - self.theta_mle[[i, g]];
                log_fold_change[[i, j, g]] = delta;
                log_fold_change[[j, i, g]] = -delta;
            }
        }

        Ok(log_fold_change.into_dyn())
    }

    fn summary(&self, filter: &SummaryFilter) -> ImdexResult<Vec<SummaryRecord>> {
        apply_thresholds(multi_records(self)?, filter)
    }
}
