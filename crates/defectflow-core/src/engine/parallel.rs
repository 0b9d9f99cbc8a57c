//! Process-rank detection for runs started under an MPI-style launcher.
//!
//! Stages are written so that every rank can run them, but only the coordinator
//! (rank 0) writes files and reports to the user.

use serde::Serialize;

const RANK_VARIABLES: [&str; 3] = ["OMPI_COMM_WORLD_RANK", "PMI_RANK", "SLURM_PROCID"];
const SIZE_VARIABLES: [&str; 3] = ["OMPI_COMM_WORLD_SIZE", "PMI_SIZE", "SLURM_NTASKS"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParallelContext {
    pub rank: usize,
    pub size: usize,
}

impl Default for ParallelContext {
    fn default() -> Self {
        Self::serial()
    }
}

impl ParallelContext {
    pub fn serial() -> Self {
        Self { rank: 0, size: 1 }
    }

    /// Reads the rank and size from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the rank and size through `lookup`, falling back to a serial context.
    ///
    /// The first launcher variable that parses wins. A rank outside `0..size`
    /// is ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| lookup(key).and_then(|v| v.trim().parse::<usize>().ok()))
        };
        let rank = first(&RANK_VARIABLES).unwrap_or(0);
        let size = first(&SIZE_VARIABLES).unwrap_or(1).max(1);
        if rank >= size {
            return Self::serial();
        }
        Self { rank, size }
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_single_coordinator_process() {
        let ctx = ParallelContext::from_lookup(lookup(&[]));
        assert_eq!(ctx, ParallelContext::serial());
        assert!(ctx.is_coordinator());
    }

    #[test]
    fn reads_open_mpi_rank_and_size() {
        let ctx = ParallelContext::from_lookup(lookup(&[
            ("OMPI_COMM_WORLD_RANK", "3"),
            ("OMPI_COMM_WORLD_SIZE", "8"),
        ]));
        assert_eq!(ctx, ParallelContext { rank: 3, size: 8 });
        assert!(!ctx.is_coordinator());
    }

    #[test]
    fn falls_back_to_slurm_variables() {
        let ctx = ParallelContext::from_lookup(lookup(&[("SLURM_PROCID", "0"), ("SLURM_NTASKS", "4")]));
        assert_eq!(ctx, ParallelContext { rank: 0, size: 4 });
        assert!(ctx.is_coordinator());
    }

    #[test]
    fn inconsistent_values_fall_back_to_serial() {
        let ctx = ParallelContext::from_lookup(lookup(&[("PMI_RANK", "5"), ("PMI_SIZE", "2")]));
        assert_eq!(ctx, ParallelContext::serial());
        let ctx = ParallelContext::from_lookup(lookup(&[("PMI_RANK", "x")]));
        assert_eq!(ctx, ParallelContext::serial());
    }
}
