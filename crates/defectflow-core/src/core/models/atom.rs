use super::element::Element;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// A single atom: its chemical species and cartesian position in Ångström.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// The chemical species of the atom.
    pub element: Element,
    /// The cartesian coordinates of the atom in Ångström.
    pub position: Point3<f64>,
}

impl Atom {
    pub fn new(element: Element, position: Point3<f64>) -> Self {
        Self { element, position }
    }

    pub fn symbol(&self) -> &'static str {
        self.element.symbol()
    }
}
