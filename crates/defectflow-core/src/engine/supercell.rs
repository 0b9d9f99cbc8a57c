use crate::core::models::atom::Atom;
use crate::core::models::lattice::LatticeError;
use crate::core::models::structure::Structure;
use itertools::iproduct;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Tolerance used when deciding whether a lattice point lies inside the new cell.
const INSIDE_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SupercellError {
    #[error("Supercell matrix {matrix} has determinant {determinant}; it must be positive")]
    Degenerate {
        matrix: SupercellMatrix,
        determinant: i64,
    },
    #[error("Found {found} lattice points inside the supercell, expected {expected}")]
    LatticePointCount { expected: usize, found: usize },
    #[error("Invalid supercell lattice: {0}")]
    Lattice(#[from] LatticeError),
}

/// Integer 3x3 matrix whose rows express the new cell vectors in the old ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupercellMatrix([[i32; 3]; 3]);

impl SupercellMatrix {
    pub fn new(rows: [[i32; 3]; 3]) -> Self {
        Self(rows)
    }

    pub fn diagonal(a: i32, b: i32, c: i32) -> Self {
        Self([[a, 0, 0], [0, b, 0], [0, 0, c]])
    }

    pub fn rows(&self) -> [[i32; 3]; 3] {
        self.0
    }

    pub fn determinant(&self) -> i64 {
        let m = self.0.map(|row| row.map(i64::from));
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    pub fn as_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_fn(|r, c| self.0[r][c] as f64)
    }
}

impl fmt::Display for SupercellMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<String> = self
            .0
            .iter()
            .map(|row| format!("[{}, {}, {}]", row[0], row[1], row[2]))
            .collect();
        write!(f, "[{}]", rows.join(", "))
    }
}

/// Integer translations of the original cell that fall inside the supercell,
/// ordered lexicographically.
fn lattice_points(matrix: &SupercellMatrix) -> Result<Vec<[i32; 3]>, SupercellError> {
    let rows = matrix.rows();
    let mut lower = [0i32; 3];
    let mut upper = [0i32; 3];
    for (a, b, c) in iproduct!(0..2, 0..2, 0..2) {
        for axis in 0..3 {
            let corner = a * rows[0][axis] + b * rows[1][axis] + c * rows[2][axis];
            lower[axis] = lower[axis].min(corner);
            upper[axis] = upper[axis].max(corner);
        }
    }

    let inverse = matrix
        .as_matrix()
        .try_inverse()
        .ok_or(SupercellError::Degenerate {
            matrix: *matrix,
            determinant: matrix.determinant(),
        })?;
    let inside = |x: f64| x > -INSIDE_TOLERANCE && x < 1.0 - INSIDE_TOLERANCE;

    let points: Vec<[i32; 3]> = iproduct!(
        lower[0]..=upper[0],
        lower[1]..=upper[1],
        lower[2]..=upper[2]
    )
    .map(|(i, j, k)| [i, j, k])
    .filter(|n| {
        let s = (Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64).transpose() * inverse).transpose();
        s.iter().all(|&x| inside(x))
    })
    .collect();

    let expected = matrix.determinant() as usize;
    if points.len() != expected {
        return Err(SupercellError::LatticePointCount {
            expected,
            found: points.len(),
        });
    }
    Ok(points)
}

/// Tiles `structure` into the supercell described by `matrix`.
///
/// Atoms are emitted cell by cell: every atom of the first lattice translation,
/// then every atom of the next, each block in the original atom order. The
/// result is wrapped into the new cell along its periodic axes.
///
/// # Errors
///
/// Returns [`SupercellError::Degenerate`] when `det(matrix) <= 0`.
pub fn make_supercell(
    structure: &Structure,
    matrix: &SupercellMatrix,
) -> Result<Structure, SupercellError> {
    let determinant = matrix.determinant();
    if determinant <= 0 {
        return Err(SupercellError::Degenerate {
            matrix: *matrix,
            determinant,
        });
    }

    let lattice = structure.lattice();
    let new_lattice = lattice.transformed(&matrix.as_matrix())?;
    let points = lattice_points(matrix)?;
    debug!(
        matrix = %matrix,
        translations = points.len(),
        atoms = structure.len() * points.len(),
        "Tiling supercell"
    );

    let atoms = points
        .iter()
        .flat_map(|&point| {
            let shift = lattice.translation(point);
            structure
                .atoms()
                .iter()
                .map(move |atom| Atom::new(atom.element, atom.position + shift))
        })
        .collect();

    let mut supercell = Structure::from_atoms(new_lattice, atoms);
    supercell.wrap();
    Ok(supercell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::lattice::Lattice;
    use nalgebra::Point3;

    fn el(symbol: &str) -> Element {
        Element::from_symbol(symbol).unwrap()
    }

    fn two_atom_cell() -> Structure {
        let lattice = Lattice::from_parameters([3.0, 3.0, 5.0], [90.0, 90.0, 120.0]).unwrap();
        let mut s = Structure::new(lattice.clone());
        s.push(Atom::new(el("Si"), lattice.to_cartesian(&Vector3::new(0.0, 0.0, 0.1))));
        s.push(Atom::new(el("C"), lattice.to_cartesian(&Vector3::new(1.0 / 3.0, 2.0 / 3.0, 0.6))));
        s
    }

    #[test]
    fn determinant_handles_general_matrices() {
        assert_eq!(SupercellMatrix::diagonal(2, 2, 1).determinant(), 4);
        assert_eq!(SupercellMatrix::new([[1, 1, 0], [-1, 1, 0], [0, 0, 1]]).determinant(), 2);
        assert_eq!(SupercellMatrix::new([[1, 0, 0], [0, 1, 0], [0, 0, -1]]).determinant(), -1);
    }

    #[test]
    fn diagonal_tiling_multiplies_atoms_and_volume() {
        let base = two_atom_cell();
        let supercell = make_supercell(&base, &SupercellMatrix::diagonal(2, 2, 1)).unwrap();
        assert_eq!(supercell.len(), 8);
        assert_eq!(supercell.count_of(el("Si")), 4);
        assert!((supercell.lattice().volume() - 4.0 * base.lattice().volume()).abs() < 1e-9);
    }

    #[test]
    fn atoms_are_emitted_cell_major() {
        let base = two_atom_cell();
        let supercell = make_supercell(&base, &SupercellMatrix::diagonal(2, 1, 1)).unwrap();
        let symbols: Vec<&str> = supercell.atoms().iter().map(|a| a.symbol()).collect();
        assert_eq!(symbols, vec!["Si", "C", "Si", "C"]);
        let shift = supercell.atoms()[2].position - supercell.atoms()[0].position;
        assert!((shift - base.lattice().vector(0)).norm() < 1e-9);
    }

    #[test]
    fn non_diagonal_matrix_produces_unique_wrapped_sites() {
        let base = two_atom_cell();
        let matrix = SupercellMatrix::new([[1, 1, 0], [-1, 1, 0], [0, 0, 2]]);
        let supercell = make_supercell(&base, &matrix).unwrap();
        assert_eq!(supercell.len(), base.len() * 4);

        let lattice = supercell.lattice();
        for atom in supercell.atoms() {
            let frac = lattice.to_fractional(&atom.position);
            assert!(frac.iter().all(|&x| (-1e-9..1.0).contains(&x)), "{frac:?}");
        }
        let positions = supercell.positions();
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                assert!((positions[i] - positions[j]).norm() > 0.5);
            }
        }
    }

    #[test]
    fn non_positive_determinant_is_rejected() {
        let base = two_atom_cell();
        let singular = SupercellMatrix::new([[1, 0, 0], [2, 0, 0], [0, 0, 1]]);
        assert!(matches!(
            make_supercell(&base, &singular),
            Err(SupercellError::Degenerate { determinant: 0, .. })
        ));
        let mirrored = SupercellMatrix::diagonal(-1, 1, 1);
        assert!(matches!(
            make_supercell(&base, &mirrored),
            Err(SupercellError::Degenerate { determinant: -1, .. })
        ));
    }

    #[test]
    fn identity_matrix_is_a_wrapped_copy() {
        let mut base = Structure::new(Lattice::cubic(4.0));
        base.push(Atom::new(el("Si"), Point3::new(-1.0, 0.5, 4.5)));
        let copy = make_supercell(&base, &SupercellMatrix::diagonal(1, 1, 1)).unwrap();
        assert_eq!(copy.len(), 1);
        assert!((copy.atoms()[0].position - Point3::new(3.0, 0.5, 0.5)).norm() < 1e-9);
    }
}
