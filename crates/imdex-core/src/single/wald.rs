//! Wald test result

use std::sync::Arc;

use ndarray::{Array1, Array3, Axis};

use imdex_stats::{wald_test, wald_test_chisq, CorrectionMethod, TINY};

use crate::error::{ImdexError, ImdexResult};
use crate::feature::FeatureSet;
use crate::model::ModelFit;
use crate::result::{ResultCache, TestResult};
use crate::summary::{apply_thresholds, single_records, SummaryFilter, SummaryRecord};

use super::dominant_coefficient;

/// One Wald test per feature over a set of tested coefficients.
///
/// A single tested coefficient uses the normal approximation; several use
/// the chi-square quadratic form over the coefficient block of the
/// inverse Fisher information.
#[derive(Debug)]
pub struct WaldTest {
    model: Arc<ModelFit>,
    coef_indices: Vec<usize>,
    method: CorrectionMethod,
    cache: ResultCache,
}

impl WaldTest {
    pub fn new(
        model: Arc<ModelFit>,
        coef_indices: Vec<usize>,
        method: CorrectionMethod,
    ) -> ImdexResult<Self> {
        if coef_indices.is_empty() {
            return Err(ImdexError::ShapeMismatch {
                message: "no coefficients selected for testing".to_string(),
            });
        }
        if let Some(&bad) = coef_indices.iter().find(|&&c| c >= model.n_params()) {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "coefficient index {} out of range for {} parameters",
                    bad,
                    model.n_params()
                ),
            });
        }

        if let Some(codes) = model.error_codes() {
            let failed = codes.iter().filter(|&&c| c != 0).count();
            if failed > 0 {
                tracing::warn!(
                    features = failed,
                    "estimator reported fit errors; tests proceed on the reported estimates"
                );
            }
        }

        Ok(Self {
            model,
            coef_indices,
            method,
            cache: ResultCache::new(),
        })
    }

    /// Floored standard deviation of the single tested coefficient.
    fn single_coef_sd(&self) -> Array1<f64> {
        self.model.coef_variance(self.coef_indices[0]).mapv(|v| {
            let floored = if v < TINY { TINY } else { v };
            floored.sqrt()
        })
    }

    pub fn model(&self) -> &ModelFit {
        &self.model
    }

    pub fn coef_indices(&self) -> &[usize] {
        &self.coef_indices
    }
}

impl TestResult for WaldTest {
    fn features(&self) -> &FeatureSet {
        self.model.features()
    }

    fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn correction_method(&self) -> CorrectionMethod {
        self.method
    }

    fn compute_pval(&self) -> ImdexResult<ndarray::ArrayD<f64>> {
        let pvals = if self.coef_indices.len() == 1 {
            let coef = self.coef_indices[0];
            let theta_mle = self.model.coefficients().row(coef).to_vec();
            let theta_sd = self.single_coef_sd().to_vec();
            wald_test(&theta_mle, &theta_sd, 0.0)
        } else {
            let k = self.coef_indices.len();
            let n_features = self.model.n_features();
            let theta_mle = self
                .model
                .coefficients()
                .select(Axis(0), &self.coef_indices);
            let fisher_inv = self.model.fisher_inv();
            let theta_covar = Array3::from_shape_fn((n_features, k, k), |(g, r, c)| {
                fisher_inv[[g, self.coef_indices[r], self.coef_indices[c]]]
            });
            wald_test_chisq(theta_mle.view(), theta_covar.view(), 0.0)
        };
        Ok(Array1::from(pvals).into_dyn())
    }

    fn compute_mean(&self) -> Array1<f64> {
        self.model.mean_by_feature()
    }

    fn compute_log_likelihood(&self) -> Option<Array1<f64>> {
        Some(self.model.log_likelihood().clone())
    }

    fn compute_log_fold_change(&self) -> ImdexResult<ndarray::ArrayD<f64>> {
        let tested = self
            .model
            .coefficients()
            .select(Axis(0), &self.coef_indices);
        Ok(dominant_coefficient(tested.view()).into_dyn())
    }

    fn summary(&self, filter: &SummaryFilter) -> ImdexResult<Vec<SummaryRecord>> {
        let mut records = single_records(self)?;

        let coef_sd = if self.coef_indices.len() == 1 {
            Some(self.single_coef_sd())
        } else {
            None
        };
        for (g, record) in records.iter_mut().enumerate() {
            if let Some(sd) = &coef_sd {
                record.coef_mle = Some(self.model.coefficients()[[self.coef_indices[0], g]]);
                record.coef_sd = Some(sd[g]);
            }
            record.log_likelihood = Some(self.model.log_likelihood()[g]);
            if let Some(codes) = self.model.error_codes() {
                record.error_code = Some(codes[g]);
            }
            if let Some(niter) = self.model.niter() {
                record.niter = Some(niter[g]);
            }
        }

        apply_thresholds(records, filter)
    }
}
