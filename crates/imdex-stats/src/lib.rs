//! imdex-stats - Statistical primitives for differential feature testing
//!
//! This crate provides the pure per-feature test statistics underneath the
//! imdex result engine:
//!
//! - **Inference**: likelihood-ratio, Wald (normal and chi-square paths),
//!   Welch t-test from moments, Mann-Whitney U, two-coefficient z-test
//! - **Ranking**: midranks with tie bookkeeping for the U test
//! - **Correction**: Benjamini-Hochberg family p-value adjustment
//!
//! # Design Philosophy
//!
//! Every function is vectorized over the feature axis, side-effect-free and
//! NaN-propagating: an untestable feature yields NaN, never a panic. All
//! divide-by-zero and log-of-zero guards share a single named floor,
//! [`TINY`].

pub mod correction;
pub mod inference;
pub mod rank;

pub use correction::*;
pub use inference::*;
pub use rank::*;
