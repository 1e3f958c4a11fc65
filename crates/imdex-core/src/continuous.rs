//! Continuous-covariate decorator
//!
//! Wraps a single-test result together with a fitted continuous response
//! model. Significance, q-values, means and likelihoods pass through
//! unchanged; only the fold-change is recomputed, as the log span of the
//! fitted curve over the observed continuous coordinates.

use std::sync::Arc;

use ndarray::{Array1, ArrayD};

use imdex_stats::{CorrectionMethod, TINY};

use crate::error::{ImdexError, ImdexResult};
use crate::feature::FeatureSet;
use crate::model::ModelFit;
use crate::result::{CorrectionScope, ResultCache, SingleTest, TestResult};
use crate::summary::{apply_thresholds, SummaryFilter, SummaryRecord};

/// A single-test result whose fold-change is derived from a fitted
/// continuous curve.
#[derive(Debug)]
pub struct ContinuousTest {
    inner: Box<SingleTest>,
    model: Arc<ModelFit>,
    /// Observed continuous coordinate per observation.
    coords: Array1<f64>,
    /// Columns of the design matrix spanning the continuous basis
    /// (intercept included).
    basis: Vec<usize>,
    cache: ResultCache,
}

impl ContinuousTest {
    pub fn new(
        inner: SingleTest,
        model: Arc<ModelFit>,
        coords: Array1<f64>,
        basis: Vec<usize>,
    ) -> ImdexResult<Self> {
        let design = model.design().ok_or(ImdexError::MissingDesign)?;
        if design.nrows() != coords.len() {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "{} continuous coordinates for {} observations",
                    coords.len(),
                    design.nrows()
                ),
            });
        }
        if let Some(&bad) = basis.iter().find(|&&c| c >= model.n_params()) {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "basis column {} out of range for {} parameters",
                    bad,
                    model.n_params()
                ),
            });
        }
        if inner.as_result().features() != model.features() {
            return Err(ImdexError::FeatureMismatch {
                message: "wrapped test and continuous model cover different features"
                    .to_string(),
            });
        }

        Ok(Self {
            inner: Box::new(inner),
            model,
            coords,
            basis,
            cache: ResultCache::new(),
        })
    }

    /// The wrapped single-test result.
    pub fn inner(&self) -> &SingleTest {
        &self.inner
    }

    /// Fitted response of one feature at every observed coordinate:
    /// exp(design[:, basis] . coef[basis, feature]).
    fn curve(&self, feature: usize) -> Array1<f64> {
        let design = self
            .model
            .design()
            .expect("design presence is checked at construction");
        let coefficients = self.model.coefficients();
        Array1::from_iter((0..design.nrows()).map(|obs| {
            self.basis
                .iter()
                .map(|&c| design[[obs, c]] * coefficients[[c, feature]])
                .sum::<f64>()
                .exp()
        }))
    }

    /// Resolve feature ids, logging and dropping the unknown ones.
    fn resolve_ids(&self, ids: &[String]) -> Vec<(String, usize)> {
        let features = self.inner.as_result().features();
        ids.iter()
            .filter_map(|id| match features.position(id) {
                Some(g) => Some((id.clone(), g)),
                None => {
                    tracing::warn!(feature = %id, "feature not found, omitting");
                    None
                }
            })
            .collect()
    }

    /// Maximum fitted value per requested feature.
    pub fn fitted_max(&self, ids: &[String]) -> Vec<(String, f64)> {
        self.resolve_ids(ids)
            .into_iter()
            .map(|(id, g)| {
                let max = self.curve(g).iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (id, max)
            })
            .collect()
    }

    /// Minimum fitted value per requested feature.
    pub fn fitted_min(&self, ids: &[String]) -> Vec<(String, f64)> {
        self.resolve_ids(ids)
            .into_iter()
            .map(|(id, g)| {
                let min = self.curve(g).iter().copied().fold(f64::INFINITY, f64::min);
                (id, min)
            })
            .collect()
    }

    /// Continuous coordinate at which the fitted value peaks.
    pub fn arg_fitted_max(&self, ids: &[String]) -> Vec<(String, f64)> {
        self.extremum_coord(ids, |current, best| current > best)
    }

    /// Continuous coordinate at which the fitted value bottoms out.
    pub fn arg_fitted_min(&self, ids: &[String]) -> Vec<(String, f64)> {
        self.extremum_coord(ids, |current, best| current < best)
    }

    fn extremum_coord(
        &self,
        ids: &[String],
        better: impl Fn(f64, f64) -> bool,
    ) -> Vec<(String, f64)> {
        self.resolve_ids(ids)
            .into_iter()
            .map(|(id, g)| {
                let curve = self.curve(g);
                let mut best = 0;
                for (obs, &value) in curve.iter().enumerate() {
                    if better(value, curve[best]) {
                        best = obs;
                    }
                }
                (id, self.coords[best])
            })
            .collect()
    }
}

impl TestResult for ContinuousTest {
    fn features(&self) -> &FeatureSet {
        self.inner.as_result().features()
    }

    fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn correction_method(&self) -> CorrectionMethod {
        self.inner.as_result().correction_method()
    }

    fn correction_scope(&self) -> CorrectionScope {
        self.inner.as_result().correction_scope()
    }

    // Significance passes through to the wrapped result and shares its
    // cache.
    fn pval(&self) -> ImdexResult<&ArrayD<f64>> {
        self.inner.as_result().pval()
    }

    fn qval(&self) -> ImdexResult<&ArrayD<f64>> {
        self.inner.as_result().qval()
    }

    fn mean(&self) -> &Array1<f64> {
        self.inner.as_result().mean()
    }

    fn log_likelihood(&self) -> Option<&Array1<f64>> {
        self.inner.as_result().log_likelihood()
    }

    fn compute_pval(&self) -> ImdexResult<ArrayD<f64>> {
        self.inner.as_result().pval().cloned()
    }

    fn compute_mean(&self) -> Array1<f64> {
        self.inner.as_result().mean().clone()
    }

    fn compute_log_likelihood(&self) -> Option<Array1<f64>> {
        self.inner.as_result().log_likelihood().cloned()
    }

    /// Log of the fitted curve's span, with a degenerate span floored to
    /// the smallest positive value before the log.
    fn compute_log_fold_change(&self) -> ImdexResult<ArrayD<f64>> {
        let n_features = self.features().len();
        let lfc = Array1::from_iter((0..n_features).map(|g| {
            let curve = self.curve(g);
            let max = curve.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = curve.iter().copied().fold(f64::INFINITY, f64::min);
            let span = max - min;
            let span = if span == 0.0 { TINY } else { span };
            span.ln()
        }));
        Ok(lfc.into_dyn())
    }

    fn summary(&self, filter: &SummaryFilter) -> ImdexResult<Vec<SummaryRecord>> {
        let mut records = self
            .inner
            .as_result()
            .summary(&SummaryFilter::default())?;
        let log2fc = self.log_fold_change(2.0)?;
        for (g, record) in records.iter_mut().enumerate() {
            record.log2fc = log2fc[[g]];
        }
        apply_thresholds(records, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureSet;
    use crate::grouping::Grouping;
    use crate::single::{TTest, ZeroVariancePolicy};
    use ndarray::{array, Array2, Array3};

    /// Two features over four observations with a linear-in-coordinate
    /// log response for feature one and a flat response for feature two.
    fn continuous_fixture() -> ContinuousTest {
        let features: FeatureSet = ["f1", "f2"].into_iter().collect();
        let coords = array![0.0, 1.0, 2.0, 3.0];

        // Design: intercept and the coordinate itself.
        let design = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        // f1 rises with the coordinate, f2 stays flat.
        let coefficients = array![[0.0, 1.0], [1.0, 0.0]];

        let x = array![
            [1.0, 2.0],
            [2.5, 2.1],
            [7.0, 1.9],
            [20.0, 2.0],
        ];
        let model = ModelFit::new(
            features.clone(),
            x.clone(),
            Array1::zeros(2),
            coefficients,
            Array3::zeros((2, 2, 2)),
        )
        .unwrap()
        .with_design(design)
        .unwrap();

        let grouping = Grouping::from_labels(&["a", "a", "b", "b"]);
        let inner = TTest::new(
            &x,
            &grouping,
            features,
            false,
            ZeroVariancePolicy::default(),
            CorrectionMethod::default(),
        )
        .unwrap();

        ContinuousTest::new(
            SingleTest::TTest(inner),
            Arc::new(model),
            coords,
            vec![0, 1],
        )
        .unwrap()
    }

    #[test]
    fn test_significance_passes_through() {
        let test = continuous_fixture();
        let inner_pval = test.inner().as_result().pval().unwrap().clone();
        let pval = test.pval().unwrap();
        assert_eq!(pval, &inner_pval);
    }

    #[test]
    fn test_fold_change_is_curve_span() {
        let test = continuous_fixture();
        let lfc = test.log_fold_change_ln().unwrap();
        // f1 curve: exp(0) .. exp(3); span = e^3 - 1.
        let expected = (3.0f64.exp() - 1.0).ln();
        assert!((lfc[[0]] - expected).abs() < 1e-12);
        // f2 curve is constant: span floored to TINY.
        assert!((lfc[[1]] - TINY.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_fitted_extrema_and_coordinates() {
        let test = continuous_fixture();
        let ids = vec!["f1".to_string()];

        let max = test.fitted_max(&ids);
        assert_eq!(max.len(), 1);
        assert!((max[0].1 - 3.0f64.exp()).abs() < 1e-12);

        let argmax = test.arg_fitted_max(&ids);
        assert_eq!(argmax[0].1, 3.0);
        let argmin = test.arg_fitted_min(&ids);
        assert_eq!(argmin[0].1, 0.0);
    }

    #[test]
    fn test_unknown_feature_dropped() {
        let test = continuous_fixture();
        let ids = vec!["f1".to_string(), "ghost".to_string()];
        let max = test.fitted_max(&ids);
        assert_eq!(max.len(), 1);
        assert_eq!(max[0].0, "f1");
    }

    #[test]
    fn test_summary_overrides_fold_change_only() {
        let test = continuous_fixture();
        let records = test.summary(&SummaryFilter::default()).unwrap();
        let inner_records = test
            .inner()
            .as_result()
            .summary(&SummaryFilter::default())
            .unwrap();

        assert_eq!(records[0].pval, inner_records[0].pval);
        assert_ne!(records[0].log2fc, inner_records[0].log2fc);
    }

    #[test]
    fn test_missing_design_rejected() {
        let features: FeatureSet = ["f1"].into_iter().collect();
        let x = array![[1.0], [2.0]];
        let model = ModelFit::new(
            features.clone(),
            x.clone(),
            Array1::zeros(1),
            Array2::zeros((1, 1)),
            Array3::zeros((1, 1, 1)),
        )
        .unwrap();

        let grouping = Grouping::from_labels(&["a", "b"]);
        let inner = TTest::new(
            &x,
            &grouping,
            features,
            false,
            ZeroVariancePolicy::default(),
            CorrectionMethod::default(),
        )
        .unwrap();

        assert!(matches!(
            ContinuousTest::new(
                SingleTest::TTest(inner),
                Arc::new(model),
                array![0.0, 1.0],
                vec![0],
            ),
            Err(ImdexError::MissingDesign)
        ));
    }
}
