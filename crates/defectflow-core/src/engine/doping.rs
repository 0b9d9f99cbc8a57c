use crate::core::models::element::Element;
use crate::core::models::structure::{Structure, StructureError};
use rand::Rng;
use rand::seq::index;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DopingError {
    #[error("Host and dopant are both {0}; nothing would change")]
    SameSpecies(Element),
    #[error("Cannot substitute {requested} {host} atoms: only {available} present")]
    InsufficientCandidates {
        host: Element,
        requested: usize,
        available: usize,
    },
    #[error(transparent)]
    Structure(#[from] StructureError),
}

/// The outcome of a dopant substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub host: Element,
    pub dopant: Element,
    /// Indices of the replaced atoms in ascending order.
    pub indices: Vec<usize>,
}

/// Replaces `count` randomly chosen `host` atoms with `dopant`, in place.
///
/// Candidates are drawn uniformly without replacement, so the same atom is never
/// picked twice. Positions and the order of atoms are left untouched.
///
/// # Errors
///
/// Fails without modifying the structure when fewer than `count` host atoms exist
/// or when host and dopant are the same species.
pub fn substitute<R: Rng + ?Sized>(
    structure: &mut Structure,
    host: Element,
    dopant: Element,
    count: usize,
    rng: &mut R,
) -> Result<Substitution, DopingError> {
    if host == dopant {
        return Err(DopingError::SameSpecies(host));
    }
    let candidates = structure.indices_of(host);
    if count > candidates.len() {
        return Err(DopingError::InsufficientCandidates {
            host,
            requested: count,
            available: candidates.len(),
        });
    }

    let mut indices: Vec<usize> = index::sample(rng, candidates.len(), count)
        .into_iter()
        .map(|i| candidates[i])
        .collect();
    indices.sort_unstable();

    for &i in &indices {
        structure.set_element(i, dopant)?;
    }
    debug!(?indices, %host, %dopant, "Substituted dopants");

    Ok(Substitution {
        host,
        dopant,
        indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::lattice::Lattice;
    use nalgebra::Point3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn el(symbol: &str) -> Element {
        Element::from_symbol(symbol).unwrap()
    }

    fn silicon_carbide(pairs: usize) -> Structure {
        let mut s = Structure::new(Lattice::cubic(10.0));
        for i in 0..pairs {
            let x = i as f64;
            s.push(Atom::new(el("Si"), Point3::new(x, 0.0, 0.0)));
            s.push(Atom::new(el("C"), Point3::new(x, 1.0, 0.0)));
        }
        s
    }

    #[test]
    fn replaces_exactly_count_host_atoms() {
        let mut s = silicon_carbide(16);
        let mut rng = StdRng::seed_from_u64(42);
        let result = substitute(&mut s, el("C"), el("O"), 2, &mut rng).unwrap();

        assert_eq!(result.indices.len(), 2);
        assert_ne!(result.indices[0], result.indices[1]);
        assert!(result.indices.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(s.count_of(el("C")), 14);
        assert_eq!(s.count_of(el("O")), 2);
        assert_eq!(s.count_of(el("Si")), 16);
        for &i in &result.indices {
            assert_eq!(s.atoms()[i].element, el("O"));
            assert_eq!(i % 2, 1, "only carbon sites may be replaced");
        }
    }

    #[test]
    fn same_seed_gives_same_selection() {
        let pick = |seed| {
            let mut s = silicon_carbide(16);
            substitute(&mut s, el("C"), el("O"), 3, &mut StdRng::seed_from_u64(seed))
                .unwrap()
                .indices
        };
        assert_eq!(pick(7), pick(7));
    }

    #[test]
    fn requesting_every_candidate_replaces_them_all() {
        let mut s = silicon_carbide(3);
        let mut rng = StdRng::seed_from_u64(1);
        let result = substitute(&mut s, el("C"), el("O"), 3, &mut rng).unwrap();
        assert_eq!(result.indices, vec![1, 3, 5]);
        assert_eq!(s.count_of(el("C")), 0);
    }

    #[test]
    fn too_few_candidates_fails_and_leaves_structure_untouched() {
        let mut s = silicon_carbide(1);
        let before = s.clone();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            substitute(&mut s, el("C"), el("O"), 2, &mut rng),
            Err(DopingError::InsufficientCandidates {
                host: el("C"),
                requested: 2,
                available: 1
            })
        );
        assert_eq!(s, before);

        assert!(matches!(
            substitute(&mut s, el("N"), el("O"), 1, &mut rng),
            Err(DopingError::InsufficientCandidates { available: 0, .. })
        ));
    }

    #[test]
    fn identical_host_and_dopant_is_rejected() {
        let mut s = silicon_carbide(2);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            substitute(&mut s, el("C"), el("C"), 1, &mut rng),
            Err(DopingError::SameSpecies(el("C")))
        );
    }
}
