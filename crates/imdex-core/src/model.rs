//! Upstream fit contract
//!
//! The result engine consumes already-fitted model output; it never fits
//! anything itself. `ModelFit` carries the per-feature quantities an
//! estimator hands over: log-likelihoods, link-scale coefficients, the
//! inverse Fisher information, and optional fit diagnostics.

use ndarray::{Array1, Array2, Array3, Axis};

use crate::error::{ImdexError, ImdexResult};
use crate::feature::FeatureSet;

/// Fitted model output for a set of features.
///
/// Shapes: observations N, features G, parameters P.
#[derive(Debug, Clone)]
pub struct ModelFit {
    features: FeatureSet,
    /// Observation matrix, N x G.
    x: Array2<f64>,
    /// Log-likelihood per feature.
    log_likelihood: Array1<f64>,
    /// Link-scale coefficient estimates, P x G.
    coefficients: Array2<f64>,
    /// Inverse Fisher information per feature, G x P x P.
    fisher_inv: Array3<f64>,
    /// Design matrix, N x P. Needed by the continuous decorator only.
    design: Option<Array2<f64>>,
    /// Constrained parameter count of the location model.
    constraints_loc: usize,
    /// Constrained parameter count of the scale model.
    constraints_scale: usize,
    /// Optional per-feature fit error codes.
    error_codes: Option<Array1<i32>>,
    /// Optional per-feature iteration counts.
    niter: Option<Array1<u32>>,
}

impl ModelFit {
    /// Assemble a fit, validating that every array agrees on the feature
    /// and parameter dimensions.
    pub fn new(
        features: FeatureSet,
        x: Array2<f64>,
        log_likelihood: Array1<f64>,
        coefficients: Array2<f64>,
        fisher_inv: Array3<f64>,
    ) -> ImdexResult<Self> {
        let n_features = features.len();
        let n_params = coefficients.nrows();

        if x.ncols() != n_features {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "observation matrix has {} columns for {} features",
                    x.ncols(),
                    n_features
                ),
            });
        }
        if log_likelihood.len() != n_features {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "log-likelihood has {} entries for {} features",
                    log_likelihood.len(),
                    n_features
                ),
            });
        }
        if coefficients.ncols() != n_features {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "coefficient matrix has {} columns for {} features",
                    coefficients.ncols(),
                    n_features
                ),
            });
        }
        if fisher_inv.shape() != [n_features, n_params, n_params] {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "inverse Fisher tensor has shape {:?}, expected [{}, {}, {}]",
                    fisher_inv.shape(),
                    n_features,
                    n_params,
                    n_params
                ),
            });
        }

        Ok(Self {
            features,
            x,
            log_likelihood,
            coefficients,
            fisher_inv,
            design: None,
            constraints_loc: n_params,
            constraints_scale: 0,
            error_codes: None,
            niter: None,
        })
    }

    /// Attach the design matrix (observations x parameters).
    pub fn with_design(mut self, design: Array2<f64>) -> ImdexResult<Self> {
        if design.nrows() != self.x.nrows() || design.ncols() != self.n_params() {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "design matrix has shape [{}, {}], expected [{}, {}]",
                    design.nrows(),
                    design.ncols(),
                    self.x.nrows(),
                    self.n_params()
                ),
            });
        }
        self.design = Some(design);
        Ok(self)
    }

    /// Set the constrained parameter counts of the location and scale
    /// models, used for likelihood-ratio degrees of freedom.
    pub fn with_constraints(mut self, loc: usize, scale: usize) -> Self {
        self.constraints_loc = loc;
        self.constraints_scale = scale;
        self
    }

    /// Attach per-feature fit error codes.
    pub fn with_error_codes(mut self, codes: Array1<i32>) -> Self {
        self.error_codes = Some(codes);
        self
    }

    /// Attach per-feature iteration counts.
    pub fn with_niter(mut self, niter: Array1<u32>) -> Self {
        self.niter = Some(niter);
        self
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn n_observations(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_params(&self) -> usize {
        self.coefficients.nrows()
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn log_likelihood(&self) -> &Array1<f64> {
        &self.log_likelihood
    }

    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    pub fn fisher_inv(&self) -> &Array3<f64> {
        &self.fisher_inv
    }

    pub fn design(&self) -> Option<&Array2<f64>> {
        self.design.as_ref()
    }

    /// Total constrained parameter count (location + scale).
    pub fn constrained_params(&self) -> usize {
        self.constraints_loc + self.constraints_scale
    }

    pub fn constraints_loc(&self) -> usize {
        self.constraints_loc
    }

    pub fn error_codes(&self) -> Option<&Array1<i32>> {
        self.error_codes.as_ref()
    }

    pub fn niter(&self) -> Option<&Array1<u32>> {
        self.niter.as_ref()
    }

    /// Mean observed value per feature.
    pub fn mean_by_feature(&self) -> Array1<f64> {
        self.x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::from_elem(self.n_features(), f64::NAN))
    }

    /// Variance of one coefficient per feature, read off the inverse
    /// Fisher diagonal.
    pub fn coef_variance(&self, coef: usize) -> Array1<f64> {
        Array1::from_iter((0..self.n_features()).map(|g| self.fisher_inv[[g, coef, coef]]))
    }
}
