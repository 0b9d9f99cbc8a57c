//! # defectflow Core Library
//!
//! Building blocks for a small point-defect workflow: construct a supercell from a
//! crystal structure, substitute dopants, converge a self-consistent electronic state,
//! relax the geometry, and analyse interatomic distances in the result.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Structure`, `Lattice`,
//!   `Element`), structure file I/O (CIF, extended XYZ), the `Calculator` seam with its
//!   built-in self-consistent charge model, and distance analysis.
//!
//! - **[`engine`]: The Logic Core.** Supercell tiling, dopant substitution, the BFGS
//!   optimizer with its restart state, checkpoints, stage configuration, process-rank
//!   detection, progress reporting and the unified error type.
//!
//! - **[`workflows`]: The Public API.** One entry point per pipeline stage
//!   (`build`, `scf`, `relax`, `analyze`). Each stage consumes the previous stage's
//!   output and produces the artefacts for the next one.

pub mod core;
pub mod engine;
pub mod workflows;
