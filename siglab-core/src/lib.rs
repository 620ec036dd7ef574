//! SigLab Core: composite signal evaluation.
//!
//! This crate contains the evaluation half of the audit pipeline:
//! - Domain types (bars, component results, signal evaluations)
//! - Composite signal configuration and validation
//! - Built-in indicators, precomputed once per replay
//! - Condition components and the AND/OR composite generator
//!
//! Collection, statistics and export live in `siglab-runner`.

pub mod components;
pub mod config;
pub mod domain;
pub mod indicators;
