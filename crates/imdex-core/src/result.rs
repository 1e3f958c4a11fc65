//! The test result contract
//!
//! Every result type exposes the same capability surface: lazily computed,
//! permanently cached p-values, q-values, means and log-likelihoods, plus
//! fold-change base conversion and cleaned log10 transforms for
//! presentation. The concrete result types form a closed set, [`Test`].

use std::sync::OnceLock;

use ndarray::{Array1, ArrayD, Axis};
use serde::{Deserialize, Serialize};

use imdex_stats::{correct, CorrectionMethod, TINY};

use crate::continuous::ContinuousTest;
use crate::error::ImdexResult;
use crate::feature::FeatureSet;
use crate::multi::{LazyPairwiseTest, PairwiseTest, PartitionedTest, VsRestTest, ZTest};
use crate::single::{LrtTest, RankTest, TTest, WaldTest};
use crate::summary::{SummaryFilter, SummaryRecord};

/// Family scope for multiple testing correction of multi-test tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CorrectionScope {
    /// Flatten the entire tensor and correct it as one family.
    #[default]
    Global,
    /// Correct each group pair independently across features.
    ByTest,
}

/// Compute-once storage for the cached accessors of one result.
///
/// `OnceLock` serializes first-access population (single writer) and makes
/// later reads synchronization-free. Fallible cells store the outcome
/// verbatim, so a lazy result's refusal is cached exactly like a value.
#[derive(Debug, Default)]
pub struct ResultCache {
    pval: OnceLock<ImdexResult<ArrayD<f64>>>,
    qval: OnceLock<ImdexResult<ArrayD<f64>>>,
    log_fold_change: OnceLock<ImdexResult<ArrayD<f64>>>,
    mean: OnceLock<Array1<f64>>,
    log_likelihood: OnceLock<Option<Array1<f64>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cached(entry: &ImdexResult<ArrayD<f64>>) -> ImdexResult<&ArrayD<f64>> {
    match entry {
        Ok(value) => Ok(value),
        Err(err) => Err(err.clone()),
    }
}

/// Adjust a p-value tensor for multiple testing under a correction scope.
pub fn correct_tensor(
    pvals: &ArrayD<f64>,
    method: CorrectionMethod,
    scope: CorrectionScope,
) -> ArrayD<f64> {
    match scope {
        CorrectionScope::Global => {
            let flat: Vec<f64> = pvals.iter().copied().collect();
            let qvals = correct(&flat, method);
            ArrayD::from_shape_vec(pvals.raw_dim(), qvals)
                .expect("corrected values preserve the input shape")
        }
        CorrectionScope::ByTest => {
            let feature_axis = Axis(pvals.ndim() - 1);
            let mut flat = Vec::with_capacity(pvals.len());
            for lane in pvals.lanes(feature_axis) {
                let lane: Vec<f64> = lane.iter().copied().collect();
                flat.extend(correct(&lane, method));
            }
            ArrayD::from_shape_vec(pvals.raw_dim(), flat)
                .expect("corrected values preserve the input shape")
        }
    }
}

/// Floor to [`TINY`], take log10, map NaN to zero (non-significant) and
/// clamp to `[log10_threshold, 0]`.
pub(crate) fn clean_log10<I: IntoIterator<Item = f64>>(
    values: I,
    log10_threshold: f64,
) -> Vec<f64> {
    values
        .into_iter()
        .map(|v| {
            let v = if v <= 0.0 { TINY } else { v };
            let log = v.log10();
            let log = if log.is_nan() { 0.0 } else { log };
            log.clamp(log10_threshold, 0.0)
        })
        .collect()
}

/// Capability interface shared by every result variant.
///
/// `compute_*` operations are invoked at most once per instance; the
/// provided accessors route them through the [`ResultCache`].
pub trait TestResult {
    /// The ordered feature identifiers shared by all arrays.
    fn features(&self) -> &FeatureSet;

    /// The per-instance compute-once cache.
    fn cache(&self) -> &ResultCache;

    /// Multiple testing correction method fixed at construction.
    fn correction_method(&self) -> CorrectionMethod {
        CorrectionMethod::default()
    }

    /// Correction family scope fixed at construction.
    fn correction_scope(&self) -> CorrectionScope {
        CorrectionScope::Global
    }

    /// Produce the p-value container.
    fn compute_pval(&self) -> ImdexResult<ArrayD<f64>>;

    /// Produce the q-value container from the cached p-values.
    fn compute_qval(&self, pvals: &ArrayD<f64>) -> ArrayD<f64> {
        correct_tensor(pvals, self.correction_method(), self.correction_scope())
    }

    /// Produce the mean expression per feature.
    fn compute_mean(&self) -> Array1<f64>;

    /// Produce the per-feature log-likelihood, when the result carries one.
    fn compute_log_likelihood(&self) -> Option<Array1<f64>> {
        None
    }

    /// Produce the fold-change container in natural-log units.
    fn compute_log_fold_change(&self) -> ImdexResult<ArrayD<f64>>;

    /// Summarize the result into one row per feature, then filter.
    fn summary(&self, filter: &SummaryFilter) -> ImdexResult<Vec<SummaryRecord>>;

    /// P-values, computed on first access and cached permanently.
    fn pval(&self) -> ImdexResult<&ArrayD<f64>> {
        cached(self.cache().pval.get_or_init(|| self.compute_pval()))
    }

    /// Q-values, computed once from the cached p-values.
    fn qval(&self) -> ImdexResult<&ArrayD<f64>> {
        cached(self.cache().qval.get_or_init(|| {
            let pvals = self.pval()?;
            Ok(self.compute_qval(pvals))
        }))
    }

    /// Mean expression per feature.
    fn mean(&self) -> &Array1<f64> {
        self.cache().mean.get_or_init(|| self.compute_mean())
    }

    /// Per-feature log-likelihood, if the result carries one.
    fn log_likelihood(&self) -> Option<&Array1<f64>> {
        self.cache()
            .log_likelihood
            .get_or_init(|| self.compute_log_likelihood())
            .as_ref()
    }

    /// Cached fold-change in natural-log units.
    fn log_fold_change_ln(&self) -> ImdexResult<&ArrayD<f64>> {
        cached(
            self.cache()
                .log_fold_change
                .get_or_init(|| self.compute_log_fold_change()),
        )
    }

    /// Fold-change converted to `base`, rescaled on every call.
    fn log_fold_change(&self, base: f64) -> ImdexResult<ArrayD<f64>> {
        let ln = self.log_fold_change_ln()?;
        if base == std::f64::consts::E {
            Ok(ln.clone())
        } else {
            Ok(ln / base.ln())
        }
    }

    /// Fold-change in log2 units.
    fn log2_fold_change(&self) -> ImdexResult<ArrayD<f64>> {
        self.log_fold_change(2.0)
    }

    /// Fold-change in log10 units.
    fn log10_fold_change(&self) -> ImdexResult<ArrayD<f64>> {
        self.log_fold_change(10.0)
    }

    /// Flattened log10 p-values cleaned for presentation: non-positive
    /// values floored to the smallest positive float, NaN treated as
    /// non-significant, clamped to `[log10_threshold, 0]`.
    fn log10_pval_clean(&self, log10_threshold: f64) -> ImdexResult<Array1<f64>> {
        Ok(Array1::from(clean_log10(
            self.pval()?.iter().copied(),
            log10_threshold,
        )))
    }

    /// Flattened log10 q-values cleaned for presentation.
    fn log10_qval_clean(&self, log10_threshold: f64) -> ImdexResult<Array1<f64>> {
        Ok(Array1::from(clean_log10(
            self.qval()?.iter().copied(),
            log10_threshold,
        )))
    }
}

/// One result per single test, used where containers hold precomputed
/// sub-tests.
#[derive(Debug)]
pub enum SingleTest {
    Lrt(LrtTest),
    Wald(WaldTest),
    TTest(TTest),
    Rank(RankTest),
}

impl SingleTest {
    /// The capability view of the wrapped result.
    pub fn as_result(&self) -> &dyn TestResult {
        match self {
            SingleTest::Lrt(t) => t,
            SingleTest::Wald(t) => t,
            SingleTest::TTest(t) => t,
            SingleTest::Rank(t) => t,
        }
    }
}

impl From<LrtTest> for SingleTest {
    fn from(t: LrtTest) -> Self {
        SingleTest::Lrt(t)
    }
}

impl From<WaldTest> for SingleTest {
    fn from(t: WaldTest) -> Self {
        SingleTest::Wald(t)
    }
}

impl From<TTest> for SingleTest {
    fn from(t: TTest) -> Self {
        SingleTest::TTest(t)
    }
}

impl From<RankTest> for SingleTest {
    fn from(t: RankTest) -> Self {
        SingleTest::Rank(t)
    }
}

/// The closed set of result variants.
#[derive(Debug)]
pub enum Test {
    Lrt(LrtTest),
    Wald(WaldTest),
    TTest(TTest),
    Rank(RankTest),
    Pairwise(PairwiseTest),
    ZTest(ZTest),
    LazyPairwise(LazyPairwiseTest),
    VsRest(VsRestTest),
    Partitioned(PartitionedTest),
    Continuous(ContinuousTest),
}

impl Test {
    /// The capability view of the wrapped result.
    pub fn as_result(&self) -> &dyn TestResult {
        match self {
            Test::Lrt(t) => t,
            Test::Wald(t) => t,
            Test::TTest(t) => t,
            Test::Rank(t) => t,
            Test::Pairwise(t) => t,
            Test::ZTest(t) => t,
            Test::LazyPairwise(t) => t,
            Test::VsRest(t) => t,
            Test::Partitioned(t) => t,
            Test::Continuous(t) => t,
        }
    }
}
