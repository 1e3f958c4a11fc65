//! One test per data partition

use ndarray::{Array1, Array3};

use imdex_stats::CorrectionMethod;

use crate::error::{ImdexError, ImdexResult};
use crate::feature::FeatureSet;
use crate::result::{CorrectionScope, ResultCache, SingleTest, TestResult};
use crate::summary::{apply_thresholds, multi_records, SummaryFilter, SummaryRecord};

/// The same test carried out within each partition of the data set,
/// stacked into the `[1, partitions, features]` multi-result form.
///
/// Each partition's test is its own hypothesis family, so the default
/// correction scope is per test.
#[derive(Debug)]
pub struct PartitionedTest {
    features: FeatureSet,
    partitions: Vec<String>,
    pval: Array3<f64>,
    log_fold_change: Array3<f64>,
    mean: Array1<f64>,
    tests: Vec<SingleTest>,
    method: CorrectionMethod,
    scope: CorrectionScope,
    cache: ResultCache,
}

impl PartitionedTest {
    /// Assemble from one precomputed test per partition, in partition
    /// order. The feature set is taken from the first test; all tests
    /// must agree on it. `mean` is the grand mean over all partitions.
    pub fn from_tests(
        partitions: Vec<String>,
        tests: Vec<SingleTest>,
        mean: Array1<f64>,
        method: CorrectionMethod,
    ) -> ImdexResult<Self> {
        if tests.len() != partitions.len() || tests.is_empty() {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "{} partitions need as many tests, got {}",
                    partitions.len(),
                    tests.len()
                ),
            });
        }

        let features = tests[0].as_result().features().clone();
        let n = partitions.len();
        let n_features = features.len();

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
                    message: format!(
                        "test for partition '{}' covers different features",
                        partitions[k]
                    ),
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
            partitions,
            pval,
            log_fold_change,
            mean,
            tests,
            method,
            scope: CorrectionScope::ByTest,
            cache: ResultCache::new(),
        })
    }

    pub fn partitions(&self) -> &[String] {
        &self.partitions
    }

    /// The test carried out within one partition.
    pub fn test_for(&self, partition: &str) -> ImdexResult<&SingleTest> {
        let k = self
            .partitions
            .iter()
            .position(|p| p == partition)
            .ok_or_else(|| ImdexError::UnknownPartition {
                label: partition.to_string(),
            })?;
        Ok(&self.tests[k])
    }

    /// All partition tests, in partition order.
    pub fn tests(&self) -> &[SingleTest] {
        &self.tests
    }
}

impl TestResult for PartitionedTest {
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
