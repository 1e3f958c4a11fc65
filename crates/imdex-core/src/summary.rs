//! Summary tables
//!
//! Reduces a result into one row per feature and filters rows by
//! significance, fold-change and expression thresholds.

use ndarray::{ArrayD, ArrayView1};
use serde::Serialize;

use crate::error::{ImdexError, ImdexResult};
use crate::feature::FeatureSet;
use crate::result::TestResult;

/// One row of the canonical output table.
///
/// The core columns are always present; diagnostic columns depend on the
/// test variant and are omitted from serialized output when absent.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRecord {
    pub feature: String,
    pub pval: f64,
    pub qval: f64,
    pub log2fc: f64,
    pub mean: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_mean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_variance: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coef_mle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coef_sd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_likelihood: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ll_full: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ll_reduced: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub niter: Option<u32>,
}

impl SummaryRecord {
    pub fn new(feature: String, pval: f64, qval: f64, log2fc: f64, mean: f64) -> Self {
        Self {
            feature,
            pval,
            qval,
            log2fc,
            mean,
            zero_mean: None,
            zero_variance: None,
            coef_mle: None,
            coef_sd: None,
            log_likelihood: None,
            ll_full: None,
            ll_reduced: None,
            error_code: None,
            niter: None,
        }
    }
}

/// Row filter applied by `summary`-family methods.
///
/// Fold-change bounds are ratios: only an upper bound keeps rows with
/// log2fc at or above log2(upper); only a lower bound keeps rows at or
/// below log2(lower); both bounds keep rows satisfying either one (far
/// from zero in either direction).
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryFilter {
    /// Upper bound on corrected p-values.
    pub qval_max: Option<f64>,
    /// Upper fold-change bound (ratio, must be positive).
    pub fc_upper: Option<f64>,
    /// Lower fold-change bound (ratio, must be positive).
    pub fc_lower: Option<f64>,
    /// Lower bound on mean expression.
    pub mean_min: Option<f64>,
}

/// Apply the threshold filter to summary rows.
pub fn apply_thresholds(
    records: Vec<SummaryRecord>,
    filter: &SummaryFilter,
) -> ImdexResult<Vec<SummaryRecord>> {
    for bound in [filter.fc_upper, filter.fc_lower].into_iter().flatten() {
        if bound <= 0.0 {
            return Err(ImdexError::NonPositiveFoldChangeThreshold { value: bound });
        }
    }

    let mut records = records;

    if let Some(qmax) = filter.qval_max {
        records.retain(|r| !r.qval.is_nan() && r.qval <= qmax);
    }

    match (filter.fc_upper, filter.fc_lower) {
        (Some(upper), None) => records.retain(|r| r.log2fc >= upper.log2()),
        (None, Some(lower)) => records.retain(|r| r.log2fc <= lower.log2()),
        (Some(upper), Some(lower)) => {
            records.retain(|r| r.log2fc >= upper.log2() || r.log2fc <= lower.log2())
        }
        (None, None) => {}
    }

    if let Some(mmin) = filter.mean_min {
        records.retain(|r| r.mean >= mmin);
    }

    Ok(records)
}

/// Assemble rows from per-feature columns.
pub(crate) fn assemble_records(
    features: &FeatureSet,
    pval: ArrayView1<f64>,
    qval: ArrayView1<f64>,
    log2fc: ArrayView1<f64>,
    mean: ArrayView1<f64>,
) -> Vec<SummaryRecord> {
    features
        .ids()
        .iter()
        .enumerate()
        .map(|(g, id)| {
            SummaryRecord::new(id.clone(), pval[g], qval[g], log2fc[g], mean[g])
        })
        .collect()
}

/// Rows for a single-test result (one p-value per feature), with the
/// shared `zero_mean` diagnostic.
pub(crate) fn single_records<T: TestResult + ?Sized>(
    test: &T,
) -> ImdexResult<Vec<SummaryRecord>> {
    let pval = test.pval()?;
    let qval = test.qval()?;
    let log2fc = test.log_fold_change(2.0)?;
    let mean = test.mean();

    let mut records = Vec::with_capacity(test.features().len());
    for (g, id) in test.features().ids().iter().enumerate() {
        let mut record = SummaryRecord::new(
            id.clone(),
            pval[[g]],
            qval[[g]],
            log2fc[[g]],
            mean[g],
        );
        record.zero_mean = Some(mean[g] == 0.0);
        records.push(record);
    }
    Ok(records)
}

/// Per-feature reduction of dense `[g0, g1, features]` tensors: the
/// NaN-propagating minimum of p and q over all pairs, and the
/// largest-magnitude fold-change with its sign normalized to canonical
/// group ordering (negated when the extreme sits in the lower triangle).
pub(crate) fn reduce_tensor(
    pval: &ArrayD<f64>,
    qval: &ArrayD<f64>,
    log2fc: &ArrayD<f64>,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let shape = pval.shape();
    let (rows, cols, n_features) = (shape[0], shape[1], shape[2]);

    let mut min_pval = Vec::with_capacity(n_features);
    let mut min_qval = Vec::with_capacity(n_features);
    let mut extreme_fc = Vec::with_capacity(n_features);

    for g in 0..n_features {
        let mut p_min = f64::INFINITY;
        let mut q_min = f64::INFINITY;
        let mut fc_best = f64::NAN;
        let mut fc_magnitude = f64::NEG_INFINITY;

        for i in 0..rows {
            for j in 0..cols {
                let p = pval[[i, j, g]];
                let q = qval[[i, j, g]];
                p_min = sticky_min(p_min, p);
                q_min = sticky_min(q_min, q);

                let fc = log2fc[[i, j, g]];
                if fc.abs() > fc_magnitude {
                    fc_magnitude = fc.abs();
                    fc_best = if i > j { -fc } else { fc };
                }
            }
        }

        min_pval.push(p_min);
        min_qval.push(q_min);
        extreme_fc.push(fc_best);
    }

    (min_pval, min_qval, extreme_fc)
}

/// Minimum that propagates NaN instead of discarding it.
fn sticky_min(acc: f64, value: f64) -> f64 {
    if acc.is_nan() || value.is_nan() {
        f64::NAN
    } else {
        acc.min(value)
    }
}

/// Rows for a dense multi-test result via tensor reduction.
pub(crate) fn multi_records<T: TestResult + ?Sized>(
    test: &T,
) -> ImdexResult<Vec<SummaryRecord>> {
    let pval = test.pval()?;
    let qval = test.qval()?;
    let log2fc = test.log_fold_change(2.0)?;
    let mean = test.mean();

    let (min_pval, min_qval, extreme_fc) = reduce_tensor(pval, qval, &log2fc);

    Ok(test
        .features()
        .ids()
        .iter()
        .enumerate()
        .map(|(g, id)| {
            SummaryRecord::new(id.clone(), min_pval[g], min_qval[g], extreme_fc[g], mean[g])
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn record(feature: &str, qval: f64, log2fc: f64, mean: f64) -> SummaryRecord {
        SummaryRecord::new(feature.to_string(), qval, qval, log2fc, mean)
    }

    #[test]
    fn test_qval_and_fc_filter() {
        let records = vec![
            record("a", 0.2, 3.0, 1.0),
            record("b", 0.01, 0.5, 1.0),
            record("c", 0.01, 1.5, 1.0),
        ];
        let filter = SummaryFilter {
            qval_max: Some(0.05),
            fc_upper: Some(2.0),
            ..Default::default()
        };
        let kept = apply_thresholds(records, &filter).unwrap();
        // "a" fails the q-value bound, "b" sits below log2(2) = 1.
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].feature, "c");
    }

    #[test]
    fn test_fc_window_is_a_union() {
        let records = vec![
            record("up", 0.01, 2.0, 1.0),
            record("down", 0.01, -2.0, 1.0),
            record("flat", 0.01, 0.1, 1.0),
        ];
        let filter = SummaryFilter {
            fc_upper: Some(2.0),
            fc_lower: Some(0.5),
            ..Default::default()
        };
        let kept = apply_thresholds(records, &filter).unwrap();
        let names: Vec<&str> = kept.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(names, vec!["up", "down"]);
    }

    #[test]
    fn test_nan_qval_never_passes() {
        let records = vec![record("a", f64::NAN, 1.0, 1.0)];
        let filter = SummaryFilter {
            qval_max: Some(0.9),
            ..Default::default()
        };
        assert!(apply_thresholds(records, &filter).unwrap().is_empty());
    }

    #[test]
    fn test_mean_threshold() {
        let records = vec![record("a", 0.01, 1.0, 0.5), record("b", 0.01, 1.0, 2.0)];
        let filter = SummaryFilter {
            mean_min: Some(1.0),
            ..Default::default()
        };
        let kept = apply_thresholds(records, &filter).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].feature, "b");
    }

    #[test]
    fn test_non_positive_fold_bound_rejected() {
        let filter = SummaryFilter {
            fc_lower: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            apply_thresholds(Vec::new(), &filter),
            Err(ImdexError::NonPositiveFoldChangeThreshold { .. })
        ));
    }

    #[test]
    fn test_record_omits_absent_diagnostics() {
        let record = record("a", 0.01, 1.0, 2.0);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"feature\":\"a\""));
        assert!(!json.contains("coef_mle"));
        assert!(!json.contains("zero_variance"));
    }

    #[test]
    fn test_reduce_tensor_sign_normalization() {
        // One feature, three groups; extreme fold-change stored at (2, 0).
        let mut pval = ArrayD::from_elem(IxDyn(&[3, 3, 1]), 0.5);
        let mut log2fc = ArrayD::zeros(IxDyn(&[3, 3, 1]));
        for i in 0..3 {
            pval[[i, i, 0]] = 1.0;
        }
        log2fc[[2, 0, 0]] = 4.0;
        log2fc[[0, 2, 0]] = -4.0;
        pval[[2, 0, 0]] = 0.01;
        pval[[0, 2, 0]] = 0.01;

        let (min_p, _, fc) = reduce_tensor(&pval, &pval.clone(), &log2fc);
        assert_eq!(min_p[0], 0.01);
        // The (2, 0) extreme lies in the lower triangle: sign flips.
        assert_eq!(fc[0], -4.0);
    }

    #[test]
    fn test_reduce_tensor_nan_propagates() {
        let mut pval = ArrayD::from_elem(IxDyn(&[2, 2, 1]), 0.5);
        pval[[0, 1, 0]] = f64::NAN;
        let log2fc = ArrayD::zeros(IxDyn(&[2, 2, 1]));
        let (min_p, _, _) = reduce_tensor(&pval, &pval.clone(), &log2fc);
        assert!(min_p[0].is_nan());
    }
}
