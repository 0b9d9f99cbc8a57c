use crate::core::analysis::distances::{NeighborReport, nearest_neighbors};
use crate::core::models::structure::Structure;
use crate::engine::config::AnalysisConfig;
use crate::engine::error::EngineError;
use crate::engine::parallel::ParallelContext;
use tracing::{info, instrument};

/// Reports the nearest same-species neighbour of every atom of the configured species.
///
/// Atoms are located by species, so the structure may come from any file that
/// preserves element labels. The optional CSV export is written by the
/// coordinator only.
#[instrument(skip_all, name = "analyze_workflow")]
pub fn run(
    structure: &Structure,
    config: &AnalysisConfig,
    context: &ParallelContext,
) -> Result<NeighborReport, EngineError> {
    let report = nearest_neighbors(structure, config.species, config.minimum_image)?;
    let summary = report.summary();
    info!(
        species = %config.species,
        atoms = report.entries.len(),
        min = summary.min,
        mean = summary.mean,
        max = summary.max,
        "Nearest-neighbour distances"
    );

    if let Some(path) = config.csv.as_deref().filter(|_| context.is_coordinator()) {
        report.write_csv(path)?;
        info!(path = %path.display(), "Distance table written");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analysis::distances::AnalysisError;
    use crate::core::models::atom::Atom;
    use crate::core::models::element::Element;
    use crate::core::models::lattice::Lattice;
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn si() -> Element {
        Element::from_symbol("Si").unwrap()
    }

    fn square_of_silicon() -> Structure {
        let mut s = Structure::new(Lattice::cubic(10.0));
        for (x, y) in [(1.0, 1.0), (4.0, 1.0), (1.0, 4.0), (4.0, 4.0)] {
            s.push(Atom::new(si(), Point3::new(x, y, 5.0)));
        }
        s.push(Atom::new(Element::from_symbol("O").unwrap(), Point3::new(2.5, 2.5, 5.0)));
        s
    }

    #[test]
    fn reports_every_silicon_atom_and_exports_csv() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("nn.csv");
        let config = AnalysisConfig {
            species: si(),
            minimum_image: false,
            csv: Some(csv.clone()),
        };
        let report = run(&square_of_silicon(), &config, &ParallelContext::serial()).unwrap();
        assert_eq!(report.entries.len(), 4);
        assert!(report.lines().iter().all(|l| l.ends_with("nearest neighbor = 3.000 Å")));
        assert!(csv.exists());
    }

    #[test]
    fn periodic_images_can_be_closer_than_in_cell_neighbours() {
        let config = AnalysisConfig {
            species: si(),
            minimum_image: true,
            csv: None,
        };
        let mut s = square_of_silicon();
        s.push(Atom::new(si(), Point3::new(9.5, 1.0, 5.0)));
        let report = run(&s, &config, &ParallelContext::serial()).unwrap();
        assert!((report.entries[0].nearest_neighbor - 1.5).abs() < 1e-9);
    }

    #[test]
    fn fewer_than_two_atoms_is_an_error() {
        let config = AnalysisConfig {
            species: Element::from_symbol("O").unwrap(),
            minimum_image: false,
            csv: None,
        };
        assert!(matches!(
            run(&square_of_silicon(), &config, &ParallelContext::serial()),
            Err(EngineError::Analysis(AnalysisError::TooFewAtoms { found: 1, .. }))
        ));
    }
}
