use crate::core::models::element::Element;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

const BUILTIN_PARAMETERS: &str = include_str!("../../../data/default.toml");

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GlobalParams {
    /// Interaction cutoff in Å.
    pub cutoff: f64,
    /// Width of the cosine taper that brings pair terms smoothly to zero at the cutoff.
    pub taper_width: f64,
    /// Decay length of the screened Coulomb coupling in Å.
    pub screening_length: f64,
    #[serde(default)]
    pub total_charge: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ElementParams {
    pub electronegativity: f64,
    pub hardness: f64,
    pub radius: f64,
    pub well_depth: f64,
    pub stiffness: f64,
}

/// Morse parameters for an unordered pair of species.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairParams {
    pub equilibrium_distance: f64,
    pub well_depth: f64,
    pub stiffness: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ParameterSet {
    pub globals: GlobalParams,
    pub elements: BTreeMap<String, ElementParams>,
}

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Unknown element '{0}' in parameter table")]
    UnknownElement(String),
    #[error("Invalid parameter: {0}")]
    Invalid(String),
}

impl ParameterSet {
    /// The parameter table compiled into the library.
    pub fn builtin() -> Result<Self, ParamLoadError> {
        Self::from_toml_str(BUILTIN_PARAMETERS, "<builtin>")
    }

    pub fn load(path: &Path) -> Result<Self, ParamLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.to_string_lossy())
    }

    fn from_toml_str(content: &str, origin: &str) -> Result<Self, ParamLoadError> {
        let set: Self = toml::from_str(content).map_err(|e| ParamLoadError::Toml {
            path: origin.to_string(),
            source: e,
        })?;
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<(), ParamLoadError> {
        let g = &self.globals;
        if !(g.cutoff > 0.0) {
            return Err(ParamLoadError::Invalid(format!(
                "cutoff must be positive, got {}",
                g.cutoff
            )));
        }
        if !(g.taper_width > 0.0 && g.taper_width <= g.cutoff) {
            return Err(ParamLoadError::Invalid(format!(
                "taper_width must lie in (0, cutoff], got {}",
                g.taper_width
            )));
        }
        if !(g.screening_length > 0.0) {
            return Err(ParamLoadError::Invalid(format!(
                "screening_length must be positive, got {}",
                g.screening_length
            )));
        }
        for (symbol, params) in &self.elements {
            Element::from_symbol(symbol)
                .map_err(|_| ParamLoadError::UnknownElement(symbol.clone()))?;
            if !(params.hardness > 0.0) {
                return Err(ParamLoadError::Invalid(format!(
                    "hardness of {} must be positive, got {}",
                    symbol, params.hardness
                )));
            }
        }
        Ok(())
    }

    pub fn element(&self, element: Element) -> Option<&ElementParams> {
        self.elements.get(element.symbol())
    }

    pub fn pair(&self, a: &ElementParams, b: &ElementParams) -> PairParams {
        PairParams {
            equilibrium_distance: a.radius + b.radius,
            well_depth: (a.well_depth * b.well_depth).sqrt(),
            stiffness: 0.5 * (a.stiffness + b.stiffness),
        }
    }
}
