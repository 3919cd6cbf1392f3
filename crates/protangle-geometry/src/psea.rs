//! P-SEA secondary structure assignment from C-alpha positions.
//!
//! Labels a residue from the window of five consecutive C-alpha atoms starting
//! at it, using the distances to residues i+2, i+3 and i+4, the virtual
//! bond angle at i+1 and the virtual torsion over i..i+3.
use crate::vector::{dihedral_from_points, norm, sub, vector_angle, Vec3};
use strum::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum SecondaryStructure {
    #[strum(serialize = "H")]
    Helix,
    #[strum(serialize = "E")]
    Sheet,
    #[strum(serialize = "C")]
    Coil,
}

impl SecondaryStructure {
    pub fn one_hot(&self) -> [f32; 3] {
        match self {
            Self::Helix => [1.0, 0.0, 0.0],
            Self::Sheet => [0.0, 1.0, 0.0],
            Self::Coil => [0.0, 0.0, 1.0],
        }
    }
}

/// (target, tolerance) windows; angles in degrees, distances in angstrom.
struct Criteria {
    angle: (f32, f32),
    dihedral: (f32, f32),
    distances: [(f32, f32); 3],
}

const HELIX: Criteria = Criteria {
    angle: (89.0, 12.0),
    dihedral: (50.0, 20.0),
    distances: [(5.5, 0.5), (5.3, 0.5), (6.4, 0.6)],
};

const SHEET: Criteria = Criteria {
    angle: (124.0, 14.0),
    dihedral: (-170.0, 45.0),
    distances: [(6.7, 0.6), (9.9, 0.9), (12.4, 1.1)],
};

struct WindowGeometry {
    angle: f32,
    dihedral: f32,
    distances: [f32; 3],
}

impl WindowGeometry {
    fn new(window: &[Vec3; 5]) -> Self {
        let distances = [2, 3, 4].map(|j| norm(&sub(&window[j], &window[0])));
        let angle = vector_angle(&sub(&window[0], &window[1]), &sub(&window[2], &window[1]));
        let dihedral = dihedral_from_points(&window[0], &window[1], &window[2], &window[3]);
        Self {
            angle: angle.to_degrees(),
            dihedral: dihedral.to_degrees(),
            distances,
        }
    }

    fn fits(&self, criteria: &Criteria) -> bool {
        let within = |value: f32, (target, tolerance): (f32, f32)| {
            target - tolerance < value && value < target + tolerance
        };
        let dihedral_offset = (self.dihedral - criteria.dihedral.0 + 180.0).rem_euclid(360.0) - 180.0;

        within(self.angle, criteria.angle)
            && dihedral_offset.abs() < criteria.dihedral.1
            && self
                .distances
                .iter()
                .zip(criteria.distances.iter())
                .all(|(d, window)| within(*d, *window))
    }
}

/// Assign the residue at the start of a five residue C-alpha window.
pub fn assign(window: &[Vec3; 5]) -> SecondaryStructure {
    let geometry = WindowGeometry::new(window);
    if geometry.fits(&HELIX) {
        SecondaryStructure::Helix
    } else if geometry.fits(&SHEET) {
        SecondaryStructure::Sheet
    } else {
        SecondaryStructure::Coil
    }
}

/// One label per residue of a C-alpha trace. The last four residues have no
/// complete window and are coil.
pub fn assign_chain(positions: &[Vec3]) -> Vec<SecondaryStructure> {
    let mut labels: Vec<SecondaryStructure> = positions
        .windows(5)
        .map(|w| assign(&[w[0], w[1], w[2], w[3], w[4]]))
        .collect();
    labels.resize(positions.len(), SecondaryStructure::Coil);
    log::debug!("assigned secondary structure for {} residues", labels.len());
    labels
}
