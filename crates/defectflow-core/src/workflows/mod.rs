//! # Workflows Module
//!
//! One public entry point per pipeline stage. Stages hand their results to each
//! other only through files, so each `run` function takes what the previous stage
//! wrote and returns what the next one needs.
//!
//! - **Build** ([`build`]) - Supercell tiling followed by dopant substitution
//! - **SCF** ([`scf`]) - A converged single-point calculation captured as a checkpoint
//! - **Relax** ([`relax`]) - BFGS from the checkpoint, with a convergence-gated save
//! - **Analyze** ([`analyze`]) - Nearest-neighbour distances of one species

pub mod analyze;
pub mod build;
pub mod relax;
pub mod scf;
