//! imdex-core - Differential test result engine
//!
//! Turns already-fitted model estimates, or raw grouped observations,
//! into per-feature significance calls: p-values, multiple-testing
//! corrected q-values, log fold-changes and filterable summary tables.
//!
//! # Key Components
//!
//! - **TestResult**: the capability interface every result exposes, with
//!   compute-once cached accessors
//! - **Single tests**: likelihood-ratio, Wald, Welch t-test, rank test
//! - **Multi tests**: dense pairwise and z-test tensors, a lazy pairwise
//!   result for very large group counts, vs-rest and per-partition forms
//! - **ContinuousTest**: fold-changes recomputed from a fitted continuous
//!   response curve
//! - **ModelFit / Grouping / FeatureSet**: the upstream fit contract,
//!   observation grouping and shared feature identity
//!
//! # Conventions
//!
//! Fold-changes are stored in natural-log units and converted on read.
//! NaN marks untestable features and propagates untouched; the only
//! places NaN is rewritten are the explicit `log10_*_clean` presentation
//! helpers. Dense pairwise tensors are symmetric in p and antisymmetric
//! in fold-change, with a neutral diagonal.

pub mod continuous;
pub mod error;
pub mod feature;
pub mod grouping;
pub mod model;
pub mod multi;
pub mod result;
pub mod single;
pub mod summary;

pub use continuous::ContinuousTest;
pub use error::{ImdexError, ImdexResult};
pub use feature::FeatureSet;
pub use grouping::Grouping;
pub use model::ModelFit;
pub use multi::{LazyPairwiseTest, PairwiseTest, PartitionedTest, VsRestTest, ZTest};
pub use result::{correct_tensor, CorrectionScope, ResultCache, SingleTest, Test, TestResult};
pub use single::{LrtTest, RankTest, TTest, WaldTest, ZeroVariancePolicy};
pub use summary::{apply_thresholds, SummaryFilter, SummaryRecord};

// Re-export the statistics layer so downstream callers need one import.
pub use imdex_stats::{correct, CorrectionMethod, TINY};
