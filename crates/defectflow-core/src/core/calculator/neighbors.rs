use crate::core::models::structure::Structure;
use nalgebra::Vector3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A neighbour `j` of some atom `i`, possibly in a periodic image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    /// Vector from atom `i` to the image of atom `j`.
    pub vector: Vector3<f64>,
    pub distance: f64,
}

/// Per-atom lists of every atom image within a cutoff radius.
///
/// Lists are "full": each pair appears once from each side, and an atom may see
/// its own periodic images when the cell is smaller than the cutoff.
#[derive(Debug, Clone)]
pub struct NeighborList {
    cutoff: f64,
    neighbors: Vec<Vec<Neighbor>>,
}

impl NeighborList {
    pub fn build(structure: &Structure, cutoff: f64) -> Self {
        let lattice = structure.lattice();
        let pbc = lattice.pbc();
        let spacings = lattice.plane_spacings();
        let reach: [i32; 3] =
            std::array::from_fn(|axis| if pbc[axis] { (cutoff / spacings[axis]).ceil() as i32 } else { 0 });

        let images: Vec<Vector3<f64>> = (-reach[0]..=reach[0])
            .flat_map(|a| (-reach[1]..=reach[1]).flat_map(move |b| (-reach[2]..=reach[2]).map(move |c| [a, b, c])))
            .map(|image| lattice.translation(image))
            .collect();

        let fractional: Vec<Vector3<f64>> = structure
            .atoms()
            .iter()
            .map(|atom| lattice.to_fractional(&atom.position))
            .collect();
        let n = structure.len();

        let for_atom = |i: usize| -> Vec<Neighbor> {
            let mut found = Vec::new();
            for j in 0..n {
                let mut delta = fractional[j] - fractional[i];
                for axis in 0..3 {
                    if pbc[axis] {
                        delta[axis] -= delta[axis].round();
                    }
                }
                let base = lattice.to_cartesian(&delta).coords;
                for shift in &images {
                    let vector = base + shift;
                    let distance = vector.norm();
                    if distance < cutoff && distance > 1e-8 {
                        found.push(Neighbor {
                            index: j,
                            vector,
                            distance,
                        });
                    }
                }
            }
            found
        };

        #[cfg(not(feature = "parallel"))]
        let iterator = 0..n;

        #[cfg(feature = "parallel")]
        let iterator = (0..n).into_par_iter();

        Self {
            cutoff,
            neighbors: iterator.map(for_atom).collect(),
        }
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn of(&self, i: usize) -> &[Neighbor] {
        &self.neighbors[i]
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Number of ordered `(i, j, image)` entries across all lists.
    pub fn entry_count(&self) -> usize {
        self.neighbors.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::element::Element;
    use crate::core::models::lattice::Lattice;
    use nalgebra::Point3;

    fn si() -> Element {
        Element::from_symbol("Si").unwrap()
    }

    #[test]
    fn simple_cubic_has_six_nearest_neighbours_including_self_images() {
        let mut structure = Structure::new(Lattice::cubic(2.0));
        structure.push(Atom::new(si(), Point3::new(0.0, 0.0, 0.0)));
        let list = NeighborList::build(&structure, 2.1);
        assert_eq!(list.of(0).len(), 6);
        assert!(list.of(0).iter().all(|n| n.index == 0 && (n.distance - 2.0).abs() < 1e-12));
    }

    #[test]
    fn pairs_are_found_across_the_boundary_from_both_sides() {
        let mut structure = Structure::new(Lattice::cubic(10.0));
        structure.push(Atom::new(si(), Point3::new(0.2, 5.0, 5.0)));
        structure.push(Atom::new(si(), Point3::new(9.7, 5.0, 5.0)));
        let list = NeighborList::build(&structure, 1.0);
        assert_eq!(list.entry_count(), 2);
        let from_first = list.of(0)[0];
        assert_eq!(from_first.index, 1);
        assert!((from_first.distance - 0.5).abs() < 1e-12);
        assert!((from_first.vector.x + 0.5).abs() < 1e-12);
        assert!((list.of(1)[0].vector.x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn non_periodic_axes_have_no_images() {
        let lattice = Lattice::cubic(10.0).with_pbc([false; 3]);
        let mut structure = Structure::new(lattice);
        structure.push(Atom::new(si(), Point3::new(0.2, 5.0, 5.0)));
        structure.push(Atom::new(si(), Point3::new(9.7, 5.0, 5.0)));
        let list = NeighborList::build(&structure, 1.0);
        assert_eq!(list.entry_count(), 0);
    }
}
