use crate::core::models::element::Element;
use crate::core::models::lattice::Lattice;
use crate::core::models::structure::Structure;
use itertools::{Itertools, iproduct};
use nalgebra::{DMatrix, Point3};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Need at least 2 {species} atoms to define a nearest neighbour, found {found}")]
    TooFewAtoms { species: Element, found: usize },
    #[error("CSV export error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
}

/// Pairwise distances between a set of points, stored in condensed form.
///
/// Entry `k` of the condensed vector holds the distance of pair `(i, j)` with
/// `i < j`, enumerated row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    condensed: Vec<f64>,
}

impl DistanceMatrix {
    /// Plain Euclidean distances.
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        Self::with_metric(points, |a, b| (b - a).norm())
    }

    /// Distances to the nearest periodic image along the lattice's periodic axes.
    ///
    /// The fractional difference is folded into `[-0.5, 0.5]` first; in skewed
    /// cells the shortest image can still sit one cell further, so the adjacent
    /// images are scanned as well.
    pub fn minimum_image(points: &[Point3<f64>], lattice: &Lattice) -> Self {
        let pbc = lattice.pbc();
        let range = |axis: usize| if pbc[axis] { -1..=1 } else { 0..=0 };
        let images: Vec<_> = iproduct!(range(0), range(1), range(2))
            .map(|(i, j, k)| lattice.translation([i, j, k]))
            .collect();
        Self::with_metric(points, |a, b| {
            let mut delta = lattice.to_fractional(b) - lattice.to_fractional(a);
            for axis in 0..3 {
                if pbc[axis] {
                    delta[axis] -= delta[axis].round();
                }
            }
            let folded = lattice.to_cartesian(&delta).coords;
            images
                .iter()
                .map(|shift| (folded + shift).norm())
                .fold(f64::INFINITY, f64::min)
        })
    }

    fn with_metric(points: &[Point3<f64>], metric: impl Fn(&Point3<f64>, &Point3<f64>) -> f64) -> Self {
        let condensed = points
            .iter()
            .tuple_combinations()
            .map(|(a, b)| metric(a, b))
            .collect();
        Self {
            n: points.len(),
            condensed,
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn condensed(&self) -> &[f64] {
        &self.condensed
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        self.condensed[self.n * i - i * (i + 1) / 2 + (j - i - 1)]
    }

    /// Expands to the full symmetric matrix with a zero diagonal.
    pub fn to_square(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.n, self.n, |i, j| self.get(i, j))
    }

    /// Smallest off-diagonal value of every row.
    ///
    /// Each row of the square form is partially ordered so that its second-smallest
    /// entry lands at index 1; the self-distance always occupies index 0. A matrix
    /// of fewer than two points has no neighbours and yields an empty vector.
    pub fn nearest_distances(&self) -> Vec<f64> {
        if self.n < 2 {
            return Vec::new();
        }
        let square = self.to_square();
        square
            .row_iter()
            .map(|row| {
                let mut values: Vec<f64> = row.iter().copied().collect();
                values.select_nth_unstable_by(1, f64::total_cmp);
                values[1]
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborEntry {
    /// Position of the atom among atoms of the analysed species.
    pub index: usize,
    /// Position of the atom in the full structure.
    pub atom_index: usize,
    pub species: String,
    pub nearest_neighbor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceSummary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

/// Nearest same-species neighbour distance of every atom of one species.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborReport {
    pub species: Element,
    pub entries: Vec<NeighborEntry>,
}

impl NeighborReport {
    /// One human-readable line per atom, e.g. `Si atom 0: nearest neighbor = 3.081 Å`.
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "{} atom {}: nearest neighbor = {:.3} Å",
                    self.species, e.index, e.nearest_neighbor
                )
            })
            .collect()
    }

    pub fn summary(&self) -> DistanceSummary {
        let values = self.entries.iter().map(|e| e.nearest_neighbor);
        let (min, max) = values
            .clone()
            .minmax_by(f64::total_cmp)
            .into_option()
            .unwrap_or((0.0, 0.0));
        let mean = values.sum::<f64>() / self.entries.len().max(1) as f64;
        DistanceSummary { min, mean, max }
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), AnalysisError> {
        let to_error = |source: csv::Error| AnalysisError::Csv {
            path: path.to_string_lossy().to_string(),
            source,
        };
        let mut writer = csv::Writer::from_path(path).map_err(to_error)?;
        for entry in &self.entries {
            writer.serialize(entry).map_err(to_error)?;
        }
        writer.flush().map_err(|e| to_error(e.into()))?;
        Ok(())
    }
}

/// Computes the nearest-neighbour report for all atoms of `species`.
///
/// # Errors
///
/// Returns [`AnalysisError::TooFewAtoms`] when fewer than two atoms match.
pub fn nearest_neighbors(
    structure: &Structure,
    species: Element,
    minimum_image: bool,
) -> Result<NeighborReport, AnalysisError> {
    let atom_indices = structure.indices_of(species);
    if atom_indices.len() < 2 {
        return Err(AnalysisError::TooFewAtoms {
            species,
            found: atom_indices.len(),
        });
    }
    let points = structure.positions_of(species);
    let matrix = if minimum_image {
        DistanceMatrix::minimum_image(&points, structure.lattice())
    } else {
        DistanceMatrix::from_points(&points)
    };

    let entries = matrix
        .nearest_distances()
        .into_iter()
        .zip(atom_indices)
        .enumerate()
        .map(|(index, (nearest_neighbor, atom_index))| NeighborEntry {
            index,
            atom_index,
            species: species.symbol().to_string(),
            nearest_neighbor,
        })
        .collect();

    Ok(NeighborReport { species, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;

    fn el(symbol: &str) -> Element {
        Element::from_symbol(symbol).unwrap()
    }

    fn line_of_points() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(7.0, 0.0, 0.0),
        ]
    }

    #[test]
    fn condensed_layout_matches_square_matrix() {
        let matrix = DistanceMatrix::from_points(&line_of_points());
        assert_eq!(matrix.condensed(), &[1.0, 3.0, 7.0, 2.0, 6.0, 4.0]);
        let square = matrix.to_square();
        for i in 0..4 {
            assert_eq!(square[(i, i)], 0.0);
            for j in 0..4 {
                assert_eq!(square[(i, j)], square[(j, i)]);
            }
        }
        assert_eq!(square[(1, 3)], 6.0);
    }

    #[test]
    fn nearest_distance_is_row_minimum_excluding_diagonal() {
        let matrix = DistanceMatrix::from_points(&line_of_points());
        assert_eq!(matrix.nearest_distances(), vec![1.0, 1.0, 2.0, 4.0]);
    }

    #[test]
    fn minimum_image_uses_closest_periodic_copy() {
        let lattice = Lattice::cubic(10.0);
        let points = [Point3::new(0.5, 0.0, 0.0), Point3::new(9.5, 0.0, 0.0)];
        assert_eq!(DistanceMatrix::from_points(&points).condensed(), &[9.0]);
        let periodic = DistanceMatrix::minimum_image(&points, &lattice);
        assert!((periodic.condensed()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn minimum_image_finds_the_shortest_copy_in_a_hexagonal_cell() {
        let lattice = Lattice::from_parameters([6.162, 6.162, 10.083], [90.0, 90.0, 120.0]).unwrap();
        let a = Point3::origin();
        let b = lattice.to_cartesian(&nalgebra::Vector3::new(0.4, -0.4, 0.0));
        let periodic = DistanceMatrix::minimum_image(&[a, b], &lattice);

        let brute_force = iproduct!(-2..=2, -2..=2, -2..=2)
            .map(|(i, j, k)| (b.coords + lattice.translation([i, j, k]) - a.coords).norm())
            .fold(f64::INFINITY, f64::min);
        assert!((brute_force - 3.2606).abs() < 1e-3);
        assert!((periodic.condensed()[0] - brute_force).abs() < 1e-9);
        assert_eq!(periodic.nearest_distances(), vec![periodic.condensed()[0]; 2]);
    }

    #[test]
    fn minimum_image_ignores_non_periodic_axes() {
        let lattice = Lattice::cubic(10.0).with_pbc([true, true, false]);
        let points = [Point3::new(0.0, 0.0, 0.5), Point3::new(0.0, 0.0, 9.5)];
        let periodic = DistanceMatrix::minimum_image(&points, &lattice);
        assert!((periodic.condensed()[0] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn fewer_than_two_points_have_no_nearest_distances() {
        assert!(DistanceMatrix::from_points(&[]).nearest_distances().is_empty());
        let single = DistanceMatrix::from_points(&[Point3::new(1.0, 2.0, 3.0)]);
        assert_eq!(single.len(), 1);
        assert!(single.nearest_distances().is_empty());
    }

    #[test]
    fn report_filters_species_and_keeps_structure_indices() {
        let mut s = Structure::new(Lattice::cubic(20.0));
        s.push(Atom::new(el("Si"), Point3::new(0.0, 0.0, 0.0)));
        s.push(Atom::new(el("C"), Point3::new(0.5, 0.0, 0.0)));
        s.push(Atom::new(el("Si"), Point3::new(3.0, 0.0, 0.0)));
        s.push(Atom::new(el("Si"), Point3::new(3.0, 4.0, 0.0)));

        let report = nearest_neighbors(&s, el("Si"), false).unwrap();
        let atom_indices: Vec<usize> = report.entries.iter().map(|e| e.atom_index).collect();
        assert_eq!(atom_indices, vec![0, 2, 3]);
        assert_eq!(report.lines()[0], "Si atom 0: nearest neighbor = 3.000 Å");
        assert_eq!(report.lines()[2], "Si atom 2: nearest neighbor = 4.000 Å");

        let summary = report.summary();
        assert_eq!(summary.min, 3.0);
        assert_eq!(summary.max, 4.0);
        assert!((summary.mean - 10.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn single_matching_atom_is_an_error() {
        let mut s = Structure::new(Lattice::cubic(5.0));
        s.push(Atom::new(el("Si"), Point3::origin()));
        s.push(Atom::new(el("C"), Point3::new(1.0, 1.0, 1.0)));
        assert!(matches!(
            nearest_neighbors(&s, el("Si"), false),
            Err(AnalysisError::TooFewAtoms { found: 1, .. })
        ));
        assert!(matches!(
            nearest_neighbors(&s, el("O"), false),
            Err(AnalysisError::TooFewAtoms { found: 0, .. })
        ));
    }

    #[test]
    fn csv_export_has_header_and_one_row_per_atom() {
        let mut s = Structure::new(Lattice::cubic(20.0));
        s.push(Atom::new(el("Si"), Point3::new(0.0, 0.0, 0.0)));
        s.push(Atom::new(el("Si"), Point3::new(2.5, 0.0, 0.0)));
        let report = nearest_neighbors(&s, el("Si"), false).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nn.csv");
        report.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "index,atom_index,species,nearest_neighbor");
        assert_eq!(lines[1], "0,0,Si,2.5");
        assert_eq!(lines.len(), 3);
    }
}
