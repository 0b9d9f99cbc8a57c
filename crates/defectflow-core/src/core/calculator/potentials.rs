use std::f64::consts::PI;

/// e²/(4πε₀) in eV·Å.
pub const COULOMB_CONSTANT: f64 = 14.399645;

/// Morse pair energy and its radial derivative, zero-shifted so that `E(r0) = -D`.
#[inline]
pub fn morse(dist: f64, r0: f64, well_depth: f64, stiffness: f64) -> (f64, f64) {
    let e = (-stiffness * (dist - r0)).exp();
    let one_minus = 1.0 - e;
    let energy = well_depth * (one_minus * one_minus - 1.0);
    let derivative = 2.0 * well_depth * stiffness * e * one_minus;
    (energy, derivative)
}

/// Cosine switching function: 1 below `cutoff - width`, 0 at and beyond `cutoff`.
#[inline]
pub fn taper(dist: f64, cutoff: f64, width: f64) -> (f64, f64) {
    let r_on = cutoff - width;
    if dist <= r_on {
        (1.0, 0.0)
    } else if dist >= cutoff {
        (0.0, 0.0)
    } else {
        let x = PI * (dist - r_on) / width;
        (0.5 * (1.0 + x.cos()), -0.5 * PI / width * x.sin())
    }
}

/// Yukawa-screened Coulomb kernel `k e^{-r/λ} / r` and its radial derivative.
#[inline]
pub fn screened_coulomb(dist: f64, screening_length: f64) -> (f64, f64) {
    if dist < 1e-6 {
        return (0.0, 0.0);
    }
    let kernel = COULOMB_CONSTANT * (-dist / screening_length).exp() / dist;
    let derivative = -kernel * (1.0 / dist + 1.0 / screening_length);
    (kernel, derivative)
}

/// Multiplies a `(value, derivative)` pair by the taper using the product rule.
#[inline]
pub fn apply_taper(term: (f64, f64), switch: (f64, f64)) -> (f64, f64) {
    (term.0 * switch.0, term.1 * switch.0 + term.0 * switch.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_derivative(f: impl Fn(f64) -> f64, x: f64) -> f64 {
        let h = 1e-6;
        (f(x + h) - f(x - h)) / (2.0 * h)
    }

    #[test]
    fn morse_has_minimum_at_equilibrium_distance() {
        let (energy, derivative) = morse(1.88, 1.88, 2.9, 1.6);
        assert!((energy + 2.9).abs() < 1e-12);
        assert!(derivative.abs() < 1e-12);
        assert!(morse(1.5, 1.88, 2.9, 1.6).1 < 0.0);
        assert!(morse(2.3, 1.88, 2.9, 1.6).1 > 0.0);
    }

    #[test]
    fn analytic_derivatives_match_finite_differences() {
        for &r in &[1.2, 1.9, 2.7, 2.85] {
            let d = morse(r, 1.88, 2.9, 1.6).1;
            assert!((d - numeric_derivative(|x| morse(x, 1.88, 2.9, 1.6).0, r)).abs() < 1e-6);

            let d = screened_coulomb(r, 0.5).1;
            assert!((d - numeric_derivative(|x| screened_coulomb(x, 0.5).0, r)).abs() < 1e-6);

            let d = taper(r, 3.0, 0.4).1;
            assert!((d - numeric_derivative(|x| taper(x, 3.0, 0.4).0, r)).abs() < 1e-6);

            let tapered = |x: f64| apply_taper(morse(x, 1.88, 2.9, 1.6), taper(x, 3.0, 0.4));
            assert!((tapered(r).1 - numeric_derivative(|x| tapered(x).0, r)).abs() < 1e-6);
        }
    }

    #[test]
    fn taper_is_continuous_at_both_ends() {
        assert_eq!(taper(2.6, 3.0, 0.4), (1.0, 0.0));
        assert!((taper(2.6 + 1e-9, 3.0, 0.4).0 - 1.0).abs() < 1e-9);
        assert!(taper(3.0 - 1e-9, 3.0, 0.4).0.abs() < 1e-9);
        assert_eq!(taper(3.5, 3.0, 0.4), (0.0, 0.0));
    }

    #[test]
    fn screened_coulomb_is_repulsive_and_decays() {
        let (near, _) = screened_coulomb(1.0, 0.5);
        let (far, _) = screened_coulomb(2.0, 0.5);
        assert!(near > far && far > 0.0);
        assert_eq!(screened_coulomb(0.0, 0.5), (0.0, 0.0));
    }
}
