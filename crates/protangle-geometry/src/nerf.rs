//! Backbone reconstruction from torsion angles (natural extension reference frame).
use crate::vector::{add, cross, normalize, scale, sub, Vec3};

/// Ideal bond lengths (angstrom) and bond angles (radians) of the peptide backbone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackboneGeometry {
    pub n_ca: f32,
    pub ca_c: f32,
    pub c_n: f32,
    pub n_ca_c: f32,
    pub ca_c_n: f32,
    pub c_n_ca: f32,
}

impl Default for BackboneGeometry {
    fn default() -> Self {
        Self {
            n_ca: 1.458,
            ca_c: 1.525,
            c_n: 1.329,
            n_ca_c: 111.2f32.to_radians(),
            ca_c_n: 116.2f32.to_radians(),
            c_n_ca: 121.7f32.to_radians(),
        }
    }
}

/// Place `d` so that |cd| = `bond`, the angle b-c-d is `angle` and the torsion
/// a-b-c-d is `torsion`.
pub fn place_atom(a: &Vec3, b: &Vec3, c: &Vec3, bond: f32, angle: f32, torsion: f32) -> Vec3 {
    let bc = normalize(&sub(c, b));
    let n = normalize(&cross(&sub(b, a), &bc));
    let m = cross(&n, &bc);
    let (sin_a, cos_a) = angle.sin_cos();
    let (sin_t, cos_t) = torsion.sin_cos();
    let offset = add(
        &scale(&bc, -bond * cos_a),
        &add(
            &scale(&m, bond * sin_a * cos_t),
            &scale(&n, bond * sin_a * sin_t),
        ),
    );
    add(c, &offset)
}

/// Build N/CA/C coordinates from per-residue (phi, psi, omega) torsions.
///
/// Uses the same convention as [`crate::frames::backbone_dihedrals`]: phi of
/// the first residue and psi/omega of the last residue are ignored.
pub fn build_backbone(torsions: &[[f32; 3]], geometry: &BackboneGeometry) -> Vec<[Vec3; 3]> {
    let mut residues: Vec<[Vec3; 3]> = Vec::with_capacity(torsions.len());
    if torsions.is_empty() {
        return residues;
    }
    let n0 = [0.0, 0.0, 0.0];
    let ca0 = [geometry.n_ca, 0.0, 0.0];
    let c0 = add(
        &ca0,
        &[
            -geometry.ca_c * geometry.n_ca_c.cos(),
            geometry.ca_c * geometry.n_ca_c.sin(),
            0.0,
        ],
    );
    residues.push([n0, ca0, c0]);

    for (i, [phi, _, _]) in torsions.iter().enumerate().skip(1) {
        let [n_prev, ca_prev, c_prev] = residues[i - 1];
        let [_, psi_prev, omega_prev] = torsions[i - 1];
        let n = place_atom(
            &n_prev,
            &ca_prev,
            &c_prev,
            geometry.c_n,
            geometry.ca_c_n,
            psi_prev,
        );
        let ca = place_atom(&ca_prev, &c_prev, &n, geometry.n_ca, geometry.c_n_ca, omega_prev);
        let c = place_atom(&c_prev, &n, &ca, geometry.ca_c, geometry.n_ca_c, *phi);
        residues.push([n, ca, c]);
    }
    residues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{dihedral_from_points, norm, vector_angle};

    #[test]
    fn test_place_atom() {
        let a = [0.0, 1.0, 0.3];
        let b = [0.0, 0.0, 0.0];
        let c = [1.5, 0.0, 0.0];
        for torsion in [-2.5f32, -1.0, 0.3, 1.2, 3.0] {
            let d = place_atom(&a, &b, &c, 1.4, 2.0, torsion);
            assert!((norm(&sub(&d, &c)) - 1.4).abs() < 1e-5);
            assert!((vector_angle(&sub(&b, &c), &sub(&d, &c)) - 2.0).abs() < 1e-5);
            assert!((dihedral_from_points(&a, &b, &c, &d) - torsion).abs() < 1e-5);
        }
    }

    #[test]
    fn test_build_backbone_bond_lengths() {
        let geometry = BackboneGeometry::default();
        let torsions = vec![[-1.0f32, -0.8, 3.1]; 6];
        let backbone = build_backbone(&torsions, &geometry);
        assert_eq!(backbone.len(), 6);
        for window in backbone.windows(2) {
            let [_, _, c_prev] = window[0];
            let [n, ca, c] = window[1];
            assert!((norm(&sub(&n, &c_prev)) - geometry.c_n).abs() < 1e-4);
            assert!((norm(&sub(&ca, &n)) - geometry.n_ca).abs() < 1e-4);
            assert!((norm(&sub(&c, &ca)) - geometry.ca_c).abs() < 1e-4);
        }
        assert!(build_backbone(&[], &geometry).is_empty());
    }
}
