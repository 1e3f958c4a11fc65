//! Likelihood-ratio test result

use std::sync::Arc;

use ndarray::{s, Array1};

use imdex_stats::{likelihood_ratio_test, CorrectionMethod};

use crate::error::{ImdexError, ImdexResult};
use crate::feature::FeatureSet;
use crate::model::ModelFit;
use crate::result::{ResultCache, TestResult};
use crate::summary::{apply_thresholds, single_records, SummaryFilter, SummaryRecord};

use super::dominant_coefficient;

/// One likelihood-ratio test per feature, comparing a full against a
/// reduced fitted model over the same features.
#[derive(Debug)]
pub struct LrtTest {
    full: Arc<ModelFit>,
    reduced: Arc<ModelFit>,
    method: CorrectionMethod,
    cache: ResultCache,
}

impl LrtTest {
    pub fn new(
        full: Arc<ModelFit>,
        reduced: Arc<ModelFit>,
        method: CorrectionMethod,
    ) -> ImdexResult<Self> {
        if full.features() != reduced.features() {
            return Err(ImdexError::FeatureMismatch {
                message: "full and reduced fits cover different features".to_string(),
            });
        }
        Ok(Self {
            full,
            reduced,
            method,
            cache: ResultCache::new(),
        })
    }

    /// Degrees of freedom: difference in constrained parameter counts
    /// (location + scale) between the two models.
    pub fn df(&self) -> usize {
        self.full
            .constrained_params()
            .saturating_sub(self.reduced.constrained_params())
    }

    pub fn full_model(&self) -> &ModelFit {
        &self.full
    }

    pub fn reduced_model(&self) -> &ModelFit {
        &self.reduced
    }
}

impl TestResult for LrtTest {
    fn features(&self) -> &FeatureSet {
        self.full.features()
    }

    fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn correction_method(&self) -> CorrectionMethod {
        self.method
    }

    fn compute_pval(&self) -> ImdexResult<ndarray::ArrayD<f64>> {
        let ll_full = self.full.log_likelihood();
        let ll_reduced = self.reduced.log_likelihood();

        let degraded = ll_full
            .iter()
            .zip(ll_reduced)
            .filter(|(f, r)| f < r)
            .count();
        if degraded > 0 {
            tracing::warn!(
                features = degraded,
                "test assumption failed: full model is (partially) less probable than reduced model"
            );
        }

        let pvals = likelihood_ratio_test(
            &ll_full.to_vec(),
            &ll_reduced.to_vec(),
            self.full.constrained_params(),
            self.reduced.constrained_params(),
        );
        Ok(Array1::from(pvals).into_dyn())
    }

    fn compute_mean(&self) -> Array1<f64> {
        self.full.mean_by_feature()
    }

    fn compute_log_likelihood(&self) -> Option<Array1<f64>> {
        Some(self.full.log_likelihood().clone())
    }

    fn compute_log_fold_change(&self) -> ImdexResult<ndarray::ArrayD<f64>> {
        // The tested coefficients are the location parameters present in
        // the full model beyond the reduced model's.
        let first = self.reduced.constraints_loc().min(self.full.n_params());
        if first == self.full.n_params() {
            return Ok(
                Array1::from_elem(self.features().len(), f64::NAN).into_dyn()
            );
        }
        let tested = self.full.coefficients().slice(s![first.., ..]);
        Ok(dominant_coefficient(tested).into_dyn())
    }

    fn summary(&self, filter: &SummaryFilter) -> ImdexResult<Vec<SummaryRecord>> {
        let mut records = single_records(self)?;
        for (g, record) in records.iter_mut().enumerate() {
            record.ll_full = Some(self.full.log_likelihood()[g]);
            record.ll_reduced = Some(self.reduced.log_likelihood()[g]);
        }
        apply_thresholds(records, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureSet;
    use ndarray::{Array2, Array3};

    fn fit(ids: &[&str], ll: Vec<f64>, n_params: usize, loc: usize) -> Arc<ModelFit> {
        let n_features = ids.len();
        let features: FeatureSet = ids.iter().copied().collect();
        let mut coefficients = Array2::zeros((n_params, n_features));
        for p in 0..n_params {
            for g in 0..n_features {
                coefficients[[p, g]] = (p + 1) as f64 * 0.5;
            }
        }
        Arc::new(
            ModelFit::new(
                features,
                Array2::ones((4, n_features)),
                Array1::from(ll),
                coefficients,
                Array3::zeros((n_features, n_params, n_params)),
            )
            .unwrap()
            .with_constraints(loc, 1),
        )
    }

    #[test]
    fn test_pvalues_in_unit_interval() {
        let full = fit(&["a", "b"], vec![-10.0, -4.0], 3, 3);
        let reduced = fit(&["a", "b"], vec![-12.0, -4.0], 2, 2);
        let test = LrtTest::new(full, reduced, CorrectionMethod::default()).unwrap();

        let pvals = test.pval().unwrap();
        for &p in pvals.iter() {
            assert!((0.0..=1.0).contains(&p));
        }
        // Identical likelihoods give a p-value of one.
        assert_eq!(pvals[[1]], 1.0);
    }

    #[test]
    fn test_df_from_constraint_counts() {
        let full = fit(&["a"], vec![-1.0], 3, 3);
        let reduced = fit(&["a"], vec![-1.0], 2, 2);
        let test = LrtTest::new(full, reduced, CorrectionMethod::default()).unwrap();
        assert_eq!(test.df(), 1);
    }

    #[test]
    fn test_feature_mismatch_rejected() {
        let full = fit(&["a", "b"], vec![-1.0, -1.0], 2, 2);
        let reduced = fit(&["a", "c"], vec![-1.0, -1.0], 1, 1);
        assert!(matches!(
            LrtTest::new(full, reduced, CorrectionMethod::default()),
            Err(ImdexError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn test_fold_change_uses_tested_coefficients() {
        let full = fit(&["a", "b"], vec![-1.0, -1.0], 3, 3);
        let reduced = fit(&["a", "b"], vec![-2.0, -2.0], 2, 2);
        let test = LrtTest::new(full, reduced, CorrectionMethod::default()).unwrap();

        // Rows beyond the reduced location parameters: row 2, value 1.5.
        let lfc = test.log_fold_change_ln().unwrap();
        assert_eq!(lfc[[0]], 1.5);
    }

    #[test]
    fn test_summary_carries_likelihoods() {
        let full = fit(&["a"], vec![-1.0], 2, 2);
        let reduced = fit(&["a"], vec![-2.0], 1, 1);
        let test = LrtTest::new(full, reduced, CorrectionMethod::default()).unwrap();

        let records = test.summary(&SummaryFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ll_full, Some(-1.0));
        assert_eq!(records[0].ll_reduced, Some(-2.0));
    }
}
