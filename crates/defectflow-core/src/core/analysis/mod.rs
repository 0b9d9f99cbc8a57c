//! Post-processing of relaxed structures.

pub mod distances;
