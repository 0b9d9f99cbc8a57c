//! Provides input/output functionality for crystal structure file formats.
//!
//! Every format implements the [`traits::StructureFile`] trait so that stages can read
//! and write structures without caring about the concrete format. The helpers
//! [`read_structure`] and [`write_structure`] pick the format from the file extension.

pub mod cif;
pub mod traits;
pub mod xyz;

use crate::core::models::structure::Structure;
use cif::{CifError, CifFile};
use std::path::Path;
use thiserror::Error;
use traits::StructureFile;
use xyz::{ExtXyzFile, XyzError};

/// Structure file formats understood by [`read_structure`] and [`write_structure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureFormat {
    Cif,
    ExtXyz,
}

#[derive(Debug, Error)]
pub enum StructureIoError {
    #[error("CIF error: {0}")]
    Cif(#[from] CifError),
    #[error("Extended XYZ error: {0}")]
    Xyz(#[from] XyzError),
    #[error("Cannot infer a structure format from '{0}' (expected .cif, .xyz or .extxyz)")]
    UnsupportedFormat(String),
}

impl StructureFormat {
    pub fn from_path(path: &Path) -> Result<Self, StructureIoError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("cif") => Ok(Self::Cif),
            Some("xyz") | Some("extxyz") => Ok(Self::ExtXyz),
            _ => Err(StructureIoError::UnsupportedFormat(
                path.display().to_string(),
            )),
        }
    }
}

/// Reads a structure, choosing the format from the file extension.
pub fn read_structure(path: &Path) -> Result<Structure, StructureIoError> {
    match StructureFormat::from_path(path)? {
        StructureFormat::Cif => Ok(CifFile::read_from_path(path)?),
        StructureFormat::ExtXyz => Ok(ExtXyzFile::read_from_path(path)?),
    }
}

/// Writes a structure, choosing the format from the file extension.
pub fn write_structure(structure: &Structure, path: &Path) -> Result<(), StructureIoError> {
    match StructureFormat::from_path(path)? {
        StructureFormat::Cif => Ok(CifFile::write_to_path(structure, path)?),
        StructureFormat::ExtXyz => Ok(ExtXyzFile::write_to_path(structure, path)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn format_is_inferred_from_extension() {
        assert_eq!(
            StructureFormat::from_path(&PathBuf::from("a/b/SiC.CIF")).unwrap(),
            StructureFormat::Cif
        );
        assert_eq!(
            StructureFormat::from_path(&PathBuf::from("relax.xyz")).unwrap(),
            StructureFormat::ExtXyz
        );
        assert!(matches!(
            StructureFormat::from_path(&PathBuf::from("relaxed.gpw")),
            Err(StructureIoError::UnsupportedFormat(_))
        ));
        assert!(StructureFormat::from_path(&PathBuf::from("noext")).is_err());
    }
}
