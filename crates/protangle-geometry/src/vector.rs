//! Geometry on single points and frames.
//!
//! Frames are stored row major with the basis vectors as rows, matching the
//! layout produced by [`crate::frames::orientation`].
pub type Vec3 = [f32; 3];
pub type Mat3 = [[f32; 3]; 3];

pub const IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

pub fn add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn sub(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn scale(a: &Vec3, s: f32) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

pub fn dot(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn norm(a: &Vec3) -> f32 {
    dot(a, a).sqrt()
}

/// Unit vector along `a`. The zero vector maps to itself.
pub fn normalize(a: &Vec3) -> Vec3 {
    let n = norm(a);
    if n == 0.0 {
        *a
    } else {
        scale(a, 1.0 / n)
    }
}

pub fn mat_vec(m: &Mat3, v: &Vec3) -> Vec3 {
    [dot(&m[0], v), dot(&m[1], v), dot(&m[2], v)]
}

pub fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0f32; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, value) in row.iter_mut().enumerate() {
            *value = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

pub fn transpose(m: &Mat3) -> Mat3 {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}

/// Torsion angle in radians, in (-pi, pi], of three consecutive bond vectors.
pub fn dihedral_angle(a: &Vec3, b: &Vec3, c: &Vec3) -> f32 {
    let c1 = cross(a, b);
    let c2 = cross(b, c);
    let b0 = normalize(b);
    dot(&cross(&c1, &c2), &b0).atan2(dot(&c1, &c2))
}

/// Torsion angle defined by four points.
pub fn dihedral_from_points(p0: &Vec3, p1: &Vec3, p2: &Vec3, p3: &Vec3) -> f32 {
    dihedral_angle(&sub(p1, p0), &sub(p2, p1), &sub(p3, p2))
}

/// Unsigned angle between two vectors, in [0, pi].
pub fn vector_angle(v1: &Vec3, v2: &Vec3) -> f32 {
    let v1 = normalize(v1);
    let v2 = normalize(v2);
    norm(&cross(&v1, &v2)).atan2(dot(&v1, &v2))
}

/// Rodrigues rotation of `angle` radians about `axis`.
pub fn rotation_matrix(axis: Vec3, angle: f32) -> Mat3 {
    if norm(&axis) == 0.0 {
        return IDENTITY;
    }
    let [x, y, z] = normalize(&axis);
    let k: Mat3 = [[0.0, -z, y], [z, 0.0, -x], [-y, x, 0.0]];
    let k2 = mat_mul(&k, &k);
    let (sin, cos) = angle.sin_cos();
    let mut rot = IDENTITY;
    for i in 0..3 {
        for j in 0..3 {
            rot[i][j] += sin * k[i][j] + (1.0 - cos) * k2[i][j];
        }
    }
    rot
}

pub fn rotate(vector: &Vec3, axis: Vec3, angle: f32) -> Vec3 {
    mat_vec(&rotation_matrix(axis, angle), vector)
}

/// Rotation matrix to a (w, x, y, z) quaternion.
///
/// Assumes a proper rotation with `1 + trace > 0`; the near-180 degree case
/// degrades to `w ~ 0`.
pub fn matrix_to_quaternion(m: &Mat3) -> [f32; 4] {
    let w = (1.0 + m[0][0] + m[1][1] + m[2][2]).max(0.0).sqrt() / 2.0;
    let w4 = 4.0 * w + 1e-6;
    [
        w,
        (m[2][1] - m[1][2]) / w4,
        (m[0][2] - m[2][0]) / w4,
        (m[1][0] - m[0][1]) / w4,
    ]
}

/// Pose of one oriented point as seen from another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeOrientation {
    pub distance: f32,
    /// Unit offset expressed in the source frame.
    pub direction: Vec3,
    /// (w, x, y, z) quaternion of the rotation taking the target frame into the source frame.
    pub rotation: [f32; 4],
}

/// Relative orientation of `y` (frame `y_o`) with respect to `x` (frame `x_o`).
pub fn relative_orientation(x: &Vec3, y: &Vec3, x_o: &Mat3, y_o: &Mat3) -> RelativeOrientation {
    let offset = sub(y, x);
    let distance = norm(&offset);
    let direction = if distance == 0.0 {
        [0.0; 3]
    } else {
        mat_vec(x_o, &scale(&offset, 1.0 / distance))
    };
    let rotation = matrix_to_quaternion(&mat_mul(x_o, &transpose(y_o)));
    RelativeOrientation {
        distance,
        direction,
        rotation,
    }
}
