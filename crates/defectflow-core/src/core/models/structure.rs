use super::atom::Atom;
use super::element::Element;
use super::lattice::Lattice;
use nalgebra::{DVector, Point3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const WRAP_EPSILON: f64 = 1e-7;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructureError {
    #[error("Atom index {index} is out of bounds for a structure of {len} atoms")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("Expected {expected} coordinates but received {found}")]
    CoordinateCount { expected: usize, found: usize },
}

/// An ordered collection of atoms inside a periodic cell.
///
/// The order of atoms is significant and is preserved by every reader, writer and
/// transformation in this crate. Stages that run on the same in-memory structure may
/// refer to atoms by index; stages that reload a structure from disk should locate
/// atoms by element with [`Structure::indices_of`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    lattice: Lattice,
    atoms: Vec<Atom>,
}

impl Structure {
    pub fn new(lattice: Lattice) -> Self {
        Self {
            lattice,
            atoms: Vec::new(),
        }
    }

    pub fn from_atoms(lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Self { lattice, atoms }
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn push(&mut self, atom: Atom) {
        self.atoms.push(atom);
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Indices of every atom of the given element, in structure order.
    pub fn indices_of(&self, element: Element) -> Vec<usize> {
        self.atoms
            .iter()
            .enumerate()
            .filter(|(_, atom)| atom.element == element)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn count_of(&self, element: Element) -> usize {
        self.atoms.iter().filter(|a| a.element == element).count()
    }

    /// Cartesian positions of every atom of the given element, in structure order.
    pub fn positions_of(&self, element: Element) -> Vec<Point3<f64>> {
        self.atoms
            .iter()
            .filter(|a| a.element == element)
            .map(|a| a.position)
            .collect()
    }

    pub fn species_counts(&self) -> BTreeMap<Element, usize> {
        let mut counts = BTreeMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.element).or_insert(0) += 1;
        }
        counts
    }

    /// Empirical formula with elements sorted alphabetically (e.g. `"C14O2Si16"`).
    pub fn formula(&self) -> String {
        let mut parts: Vec<(&'static str, usize)> = self
            .species_counts()
            .into_iter()
            .map(|(element, count)| (element.symbol(), count))
            .collect();
        parts.sort_unstable();
        parts
            .into_iter()
            .map(|(symbol, count)| {
                if count == 1 {
                    symbol.to_string()
                } else {
                    format!("{}{}", symbol, count)
                }
            })
            .collect()
    }

    /// Replaces the species of the atom at `index`, leaving its position untouched.
    pub fn set_element(&mut self, index: usize, element: Element) -> Result<(), StructureError> {
        let len = self.atoms.len();
        let atom = self
            .atoms
            .get_mut(index)
            .ok_or(StructureError::IndexOutOfBounds { index, len })?;
        atom.element = element;
        Ok(())
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    /// Positions as a flat `[x0, y0, z0, x1, ...]` vector, the layout used by optimizers.
    pub fn positions_flat(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.atoms.len() * 3,
            self.atoms
                .iter()
                .flat_map(|a| [a.position.x, a.position.y, a.position.z]),
        )
    }

    pub fn set_positions_flat(&mut self, coords: &DVector<f64>) -> Result<(), StructureError> {
        let expected = self.atoms.len() * 3;
        if coords.len() != expected {
            return Err(StructureError::CoordinateCount {
                expected,
                found: coords.len(),
            });
        }
        for (i, atom) in self.atoms.iter_mut().enumerate() {
            atom.position = Point3::new(coords[3 * i], coords[3 * i + 1], coords[3 * i + 2]);
        }
        Ok(())
    }

    /// Folds every position back into the cell along the periodic axes.
    ///
    /// Fractional coordinates within `1e-7` below an integer are mapped to the
    /// upper face's image at zero rather than left at `0.9999999`.
    pub fn wrap(&mut self) {
        let pbc = self.lattice.pbc();
        for atom in &mut self.atoms {
            let mut frac = self.lattice.to_fractional(&atom.position);
            for axis in 0..3 {
                if pbc[axis] {
                    frac[axis] = (frac[axis] + WRAP_EPSILON).rem_euclid(1.0) - WRAP_EPSILON;
                }
            }
            atom.position = self.lattice.to_cartesian(&frac);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(symbol: &str) -> Element {
        Element::from_symbol(symbol).unwrap()
    }

    fn sample_structure() -> Structure {
        let mut s = Structure::new(Lattice::cubic(4.0));
        s.push(Atom::new(el("Si"), Point3::new(0.0, 0.0, 0.0)));
        s.push(Atom::new(el("C"), Point3::new(1.0, 1.0, 1.0)));
        s.push(Atom::new(el("Si"), Point3::new(2.0, 2.0, 0.0)));
        s.push(Atom::new(el("C"), Point3::new(3.0, 3.0, 1.0)));
        s
    }

    #[test]
    fn indices_and_counts_follow_structure_order() {
        let s = sample_structure();
        assert_eq!(s.indices_of(el("Si")), vec![0, 2]);
        assert_eq!(s.indices_of(el("C")), vec![1, 3]);
        assert_eq!(s.count_of(el("O")), 0);
        assert_eq!(s.positions_of(el("C"))[1], Point3::new(3.0, 3.0, 1.0));
    }

    #[test]
    fn formula_is_alphabetical() {
        let mut s = sample_structure();
        s.set_element(1, el("O")).unwrap();
        assert_eq!(s.formula(), "COSi2");
    }

    #[test]
    fn set_element_rejects_out_of_bounds_index() {
        let mut s = sample_structure();
        assert_eq!(
            s.set_element(10, el("O")),
            Err(StructureError::IndexOutOfBounds { index: 10, len: 4 })
        );
    }

    #[test]
    fn flat_positions_round_trip() {
        let mut s = sample_structure();
        let mut flat = s.positions_flat();
        assert_eq!(flat.len(), 12);
        flat[3] = 1.5;
        s.set_positions_flat(&flat).unwrap();
        assert_eq!(s.atoms()[1].position.x, 1.5);
        assert!(matches!(
            s.set_positions_flat(&DVector::zeros(5)),
            Err(StructureError::CoordinateCount { expected: 12, found: 5 })
        ));
    }

    #[test]
    fn wrap_folds_positions_into_cell_on_periodic_axes_only() {
        let lattice = Lattice::cubic(4.0).with_pbc([true, true, false]);
        let mut s = Structure::new(lattice);
        s.push(Atom::new(el("Si"), Point3::new(-1.0, 5.0, 9.0)));
        s.push(Atom::new(el("C"), Point3::new(3.9999999999, 0.0, -2.0)));
        s.wrap();
        let p0 = s.atoms()[0].position;
        assert!((p0.x - 3.0).abs() < 1e-9);
        assert!((p0.y - 1.0).abs() < 1e-9);
        assert!((p0.z - 9.0).abs() < 1e-9);
        let p1 = s.atoms()[1].position;
        assert!(p1.x.abs() < 1e-6);
        assert!((p1.z + 2.0).abs() < 1e-9);
    }
}
