//! # Core Module
//!
//! Stateless foundations shared by every stage of the workflow.
//!
//! - **Structure Representation** ([`models`]) - Elements, lattices, atoms and periodic structures
//! - **File I/O** ([`io`]) - CIF and extended XYZ readers/writers behind one trait
//! - **Energy and Forces** ([`calculator`]) - The `Calculator` seam and the built-in
//!   self-consistent charge-equilibration model
//! - **Analysis** ([`analysis`]) - Pairwise distance matrices and nearest-neighbour reports

pub mod analysis;
pub mod calculator;
pub mod io;
pub mod models;
