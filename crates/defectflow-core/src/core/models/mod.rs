//! # Core Models Module
//!
//! Data structures describing periodic atomic structures.
//!
//! - [`element`] - Chemical species identified by atomic number
//! - [`lattice`] - Cell vectors, boundary conditions and coordinate conversion
//! - [`atom`] - A single atom: species plus cartesian position
//! - [`structure`] - An ordered collection of atoms inside a lattice
//!
//! ```ignore
//! use defectflow::core::models::{atom::Atom, element::Element, lattice::Lattice, structure::Structure};
//! use nalgebra::Point3;
//!
//! let lattice = Lattice::cubic(5.43);
//! let mut structure = Structure::new(lattice);
//! structure.push(Atom::new(Element::from_symbol("Si")?, Point3::origin()));
//! ```

pub mod atom;
pub mod element;
pub mod lattice;
pub mod structure;
