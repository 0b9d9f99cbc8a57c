use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SINGULAR_VOLUME: f64 = 1e-10;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LatticeError {
    #[error("Cell vectors are linearly dependent (volume {volume:.3e} Å³)")]
    Singular { volume: f64 },
    #[error("Invalid cell parameters: {0}")]
    InvalidParameters(String),
}

/// A periodic cell described by three lattice vectors and per-axis boundary flags.
///
/// The vectors are stored as the **rows** of a 3x3 matrix, so a fractional row
/// vector `f` maps to cartesian coordinates as `f · M`. The inverse is cached on
/// construction; a `Lattice` is therefore always non-singular.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LatticeRepr", into = "LatticeRepr")]
pub struct Lattice {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
    pbc: [bool; 3],
}

impl PartialEq for Lattice {
    fn eq(&self, other: &Self) -> bool {
        self.matrix == other.matrix && self.pbc == other.pbc
    }
}

#[derive(Serialize, Deserialize)]
struct LatticeRepr {
    vectors: [[f64; 3]; 3],
    pbc: [bool; 3],
}

impl TryFrom<LatticeRepr> for Lattice {
    type Error = LatticeError;

    fn try_from(repr: LatticeRepr) -> Result<Self, Self::Error> {
        let [a, b, c] = repr.vectors;
        Lattice::new(
            Matrix3::new(a[0], a[1], a[2], b[0], b[1], b[2], c[0], c[1], c[2]),
            repr.pbc,
        )
    }
}

impl From<Lattice> for LatticeRepr {
    fn from(lattice: Lattice) -> Self {
        let row = |i: usize| {
            let v = lattice.vector(i);
            [v.x, v.y, v.z]
        };
        Self {
            vectors: [row(0), row(1), row(2)],
            pbc: lattice.pbc,
        }
    }
}

impl Lattice {
    /// Creates a lattice from a row-vector cell matrix.
    ///
    /// # Errors
    ///
    /// Returns [`LatticeError::Singular`] when the vectors span (almost) no volume.
    pub fn new(matrix: Matrix3<f64>, pbc: [bool; 3]) -> Result<Self, LatticeError> {
        let volume = matrix.determinant();
        if volume.abs() < SINGULAR_VOLUME {
            return Err(LatticeError::Singular { volume });
        }
        let inverse = matrix
            .try_inverse()
            .ok_or(LatticeError::Singular { volume })?;
        Ok(Self {
            matrix,
            inverse,
            pbc,
        })
    }

    /// Creates a fully periodic lattice from three cell vectors.
    pub fn from_vectors(
        a: Vector3<f64>,
        b: Vector3<f64>,
        c: Vector3<f64>,
    ) -> Result<Self, LatticeError> {
        Self::new(Matrix3::from_rows(&[a.transpose(), b.transpose(), c.transpose()]), [true; 3])
    }

    /// Builds a fully periodic lattice from cell lengths (Å) and angles (degrees).
    ///
    /// Uses the standard orientation: `a` along x, `b` in the xy-plane, `c` completing
    /// a right-handed set.
    pub fn from_parameters(
        lengths: [f64; 3],
        angles_degrees: [f64; 3],
    ) -> Result<Self, LatticeError> {
        let [a, b, c] = lengths;
        if lengths.iter().any(|&l| !(l > 0.0) || !l.is_finite()) {
            return Err(LatticeError::InvalidParameters(format!(
                "cell lengths must be positive, got {:?}",
                lengths
            )));
        }
        let [alpha, beta, gamma] = angles_degrees.map(f64::to_radians);
        let (ca, cb, cg) = (alpha.cos(), beta.cos(), gamma.cos());
        let sg = gamma.sin();
        if sg.abs() < 1e-12 {
            return Err(LatticeError::InvalidParameters(format!(
                "gamma angle of {} degrees collapses the cell",
                angles_degrees[2]
            )));
        }

        let cx = c * cb;
        let cy = c * (ca - cb * cg) / sg;
        let cz_sq = c * c - cx * cx - cy * cy;
        if cz_sq <= 0.0 {
            return Err(LatticeError::InvalidParameters(format!(
                "angles {:?} do not describe a valid cell",
                angles_degrees
            )));
        }

        Self::from_vectors(
            Vector3::new(a, 0.0, 0.0),
            Vector3::new(b * cg, b * sg, 0.0),
            Vector3::new(cx, cy, cz_sq.sqrt()),
        )
    }

    pub fn cubic(a: f64) -> Self {
        Self {
            matrix: Matrix3::from_diagonal_element(a),
            inverse: Matrix3::from_diagonal_element(1.0 / a),
            pbc: [true; 3],
        }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Returns lattice vector `i` (0 = a, 1 = b, 2 = c).
    pub fn vector(&self, i: usize) -> Vector3<f64> {
        self.matrix.row(i).transpose()
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn with_pbc(mut self, pbc: [bool; 3]) -> Self {
        self.pbc = pbc;
        self
    }

    pub fn is_periodic(&self) -> bool {
        self.pbc.iter().any(|&p| p)
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    /// Returns `([a, b, c], [alpha, beta, gamma])` with angles in degrees.
    pub fn parameters(&self) -> ([f64; 3], [f64; 3]) {
        let (a, b, c) = (self.vector(0), self.vector(1), self.vector(2));
        let angle = |u: &Vector3<f64>, v: &Vector3<f64>| {
            (u.dot(v) / (u.norm() * v.norm()))
                .clamp(-1.0, 1.0)
                .acos()
                .to_degrees()
        };
        (
            [a.norm(), b.norm(), c.norm()],
            [angle(&b, &c), angle(&a, &c), angle(&a, &b)],
        )
    }

    /// Distance between adjacent lattice planes along each axis.
    ///
    /// Used to decide how many periodic images a cutoff sphere can reach.
    pub fn plane_spacings(&self) -> [f64; 3] {
        let (a, b, c) = (self.vector(0), self.vector(1), self.vector(2));
        let volume = self.volume();
        [
            volume / b.cross(&c).norm(),
            volume / c.cross(&a).norm(),
            volume / a.cross(&b).norm(),
        ]
    }

    pub fn to_fractional(&self, position: &Point3<f64>) -> Vector3<f64> {
        (position.coords.transpose() * self.inverse).transpose()
    }

    pub fn to_cartesian(&self, fractional: &Vector3<f64>) -> Point3<f64> {
        Point3::from((fractional.transpose() * self.matrix).transpose())
    }

    /// Translation vector for an integer image offset.
    pub fn translation(&self, image: [i32; 3]) -> Vector3<f64> {
        let f = Vector3::new(image[0] as f64, image[1] as f64, image[2] as f64);
        (f.transpose() * self.matrix).transpose()
    }

    /// Returns the lattice `transform · M`, keeping the boundary flags.
    pub fn transformed(&self, transform: &Matrix3<f64>) -> Result<Self, LatticeError> {
        Self::new(transform * self.matrix, self.pbc)
    }
}
