// src/engine/mod.rs
//
// Pure algorithmic core: paper generation, grading, retake eligibility and
// anomaly scoring. No I/O here; handlers feed these from the store.

pub mod eligibility;
pub mod grading;
pub mod paper;
pub mod scoring;
