//! # Engine Module
//!
//! The stateful machinery behind the workflow stages.
//!
//! ## Architecture
//!
//! - **Structure Transformations** ([`supercell`], [`doping`]) - Integer-matrix tiling
//!   and random substitution without replacement
//! - **Geometry Optimisation** ([`optimizer`]) - BFGS with restart state, log and step cap
//! - **Persistence** ([`checkpoint`]) - JSON checkpoints of converged calculations
//! - **Configuration** ([`config`]) - Stage settings and their builders
//! - **Process Topology** ([`parallel`]) - Rank detection and the coordinator rule
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - The unified [`error::EngineError`]

pub mod checkpoint;
pub mod config;
pub mod doping;
pub mod error;
pub mod optimizer;
pub mod parallel;
pub mod progress;
pub mod supercell;
