//! Batched backbone geometry on candle tensors.
//!
//! Conventions:
//! - points are `[.., 3]`
//! - frames are `[.., 3, 3]` with the basis vectors as rows
//! - quaternions are `[.., 4]` ordered (w, x, y, z)
use crate::error::GeometryError;
use crate::ops::{atan2, cross, dot, norm, normalize};
use crate::vector::Vec3;
use candle_core::{DType, Device, IndexOp, Result, Tensor, D};

const EPS: f64 = 1e-6;

/// Stack points into an `[N, 3]` tensor.
pub fn points_tensor(points: &[Vec3], device: &Device) -> Result<Tensor> {
    let flat: Vec<f32> = points.iter().flatten().copied().collect();
    Tensor::from_vec(flat, (points.len(), 3), device)
}

/// Batched torsion angle of consecutive bond vectors `[N, 3]` -> `[N]`.
pub fn dihedrals(b0: &Tensor, b1: &Tensor, b2: &Tensor) -> Result<Tensor> {
    let c1 = cross(b0, b1)?;
    let c2 = cross(b1, b2)?;
    let y = dot(&cross(&c1, &c2)?, &normalize(b1, 1e-12)?)?;
    let x = dot(&c1, &c2)?;
    atan2(&y, &x)?.squeeze(D::Minus1)
}

/// Phi, psi and omega per residue from an N/CA/C backbone `[N, 3, 3]`.
///
/// phi of the first residue and psi/omega of the last residue are undefined and set to 0.
pub fn backbone_dihedrals(backbone: &Tensor) -> Result<Tensor> {
    let (n_res, atoms, dim) = backbone.dims3()?;
    if atoms < 3 || dim != 3 {
        return Err(GeometryError::shape("[N, 3, 3] N/CA/C backbone", backbone.dims()));
    }
    if n_res < 2 {
        return Tensor::zeros((n_res, 3), backbone.dtype(), backbone.device());
    }
    let n = backbone.i((.., 0, ..))?.contiguous()?;
    let ca = backbone.i((.., 1, ..))?.contiguous()?;
    let c = backbone.i((.., 2, ..))?.contiguous()?;

    let head = |t: &Tensor| t.narrow(0, 0, n_res - 1);
    let tail = |t: &Tensor| t.narrow(0, 1, n_res - 1);

    // C(i-1) N(i) CA(i) C(i)
    let phi = dihedrals(
        &(tail(&n)? - head(&c)?)?,
        &(tail(&ca)? - tail(&n)?)?,
        &(tail(&c)? - tail(&ca)?)?,
    )?;
    // N(i) CA(i) C(i) N(i+1)
    let psi = dihedrals(
        &(head(&ca)? - head(&n)?)?,
        &(head(&c)? - head(&ca)?)?,
        &(tail(&n)? - head(&c)?)?,
    )?;
    // CA(i) C(i) N(i+1) CA(i+1)
    let omega = dihedrals(
        &(head(&c)? - head(&ca)?)?,
        &(tail(&n)? - head(&c)?)?,
        &(tail(&ca)? - tail(&n)?)?,
    )?;

    let zero = Tensor::zeros(1, phi.dtype(), phi.device())?;
    let phi = Tensor::cat(&[&zero, &phi], 0)?;
    let psi = Tensor::cat(&[&psi, &zero], 0)?;
    let omega = Tensor::cat(&[&omega, &zero], 0)?;
    Tensor::stack(&[&phi, &psi, &omega], 1)
}

/// Local reference frames along a C-alpha trace `[N, 3]` -> `[N, 3, 3]`.
///
/// Frame rows are the bisector `b`, the normal `n` and `b x n`. Terminal
/// residues have no neighbours on one side and receive the identity frame.
pub fn orientation(positions: &Tensor) -> Result<Tensor> {
    let (n_res, dim) = positions.dims2()?;
    if dim != 3 {
        return Err(GeometryError::shape("[N, 3] positions", positions.dims()));
    }
    let edge = Tensor::eye(3, positions.dtype(), positions.device())?.unsqueeze(0)?;
    if n_res < 3 {
        return edge.repeat((n_res, 1, 1));
    }

    let u = (positions.narrow(0, 1, n_res - 1)? - positions.narrow(0, 0, n_res - 1)?)?;
    let u = normalize(&u, EPS)?;
    let u_prev = u.narrow(0, 0, n_res - 2)?;
    let u_next = u.narrow(0, 1, n_res - 2)?;

    let b = normalize(&(&u_prev - &u_next)?, EPS)?;
    let n = normalize(&cross(&u_prev, &u_next)?, EPS)?;
    let bxn = cross(&b, &n)?;

    let frames = Tensor::stack(&[&b, &n, &bxn], 1)?;
    Tensor::cat(&[&edge, &frames, &edge], 0)
}

/// Rotation matrices `[B, 3, 3]` to quaternions `[B, 4]`.
pub fn matrix_to_quaternion(matrix: &Tensor) -> Result<Tensor> {
    let (_, rows, cols) = matrix.dims3()?;
    if rows != 3 || cols != 3 {
        return Err(GeometryError::shape("[B, 3, 3] rotation matrices", matrix.dims()));
    }
    let m = |i: usize, j: usize| matrix.i((.., i, j));
    let trace = ((m(0, 0)? + m(1, 1)?)? + m(2, 2)?)?;
    let w = (trace + 1.0)?.relu()?.sqrt()?.affine(0.5, 0.0)?;
    let w4 = w.affine(4.0, EPS)?;
    let x = (m(2, 1)? - m(1, 2)?)?.div(&w4)?;
    let y = (m(0, 2)? - m(2, 0)?)?.div(&w4)?;
    let z = (m(1, 0)? - m(0, 1)?)?.div(&w4)?;
    Tensor::stack(&[&w, &x, &y, &z], 1)
}

/// Distance `[B, 1]`, direction `[B, 3]` and rotation `[B, 4]` of one set of
/// oriented points as seen from another.
#[derive(Debug, Clone)]
pub struct RelativeOrientationTensors {
    pub distance: Tensor,
    pub direction: Tensor,
    pub rotation: Tensor,
}

impl RelativeOrientationTensors {
    /// `[B, 1 + 3 + 4]`
    pub fn concat(&self) -> Result<Tensor> {
        Tensor::cat(&[&self.distance, &self.direction, &self.rotation], D::Minus1)
    }
}

/// Pairwise relative orientation of `y` (frames `y_o`) in the frames of `x` (`x_o`).
pub fn relative_orientation(
    x: &Tensor,
    y: &Tensor,
    x_o: &Tensor,
    y_o: &Tensor,
) -> Result<RelativeOrientationTensors> {
    let (batch, _) = x.dims2()?;
    let (other, _) = y.dims2()?;
    if batch != other {
        return Err(candle_core::Error::wrap(GeometryError::BatchMismatch {
            left: batch,
            right: other,
        }));
    }
    let offset = (y - x)?;
    let distance = norm(&offset)?;
    let unit = offset.broadcast_div(&(&distance + EPS)?)?;
    let direction = x_o
        .contiguous()?
        .matmul(&unit.unsqueeze(D::Minus1)?)?
        .squeeze(D::Minus1)?;
    let nonzero = distance.ne(0.0)?.to_dtype(direction.dtype())?;
    let direction = direction.broadcast_mul(&nonzero)?;

    let relative = x_o
        .contiguous()?
        .matmul(&y_o.transpose(1, 2)?.contiguous()?)?;
    let rotation = matrix_to_quaternion(&relative)?;

    Ok(RelativeOrientationTensors {
        distance,
        direction,
        rotation,
    })
}

/// One centre `x [3]` with frame `x_o [3, 3]` against `K` neighbours.
pub fn neighbourhood_relative_orientation(
    x: &Tensor,
    y: &Tensor,
    x_o: &Tensor,
    y_o: &Tensor,
) -> Result<RelativeOrientationTensors> {
    let (k, _) = y.dims2()?;
    let x = x.unsqueeze(0)?.broadcast_as((k, 3))?.contiguous()?;
    let x_o = x_o.unsqueeze(0)?.broadcast_as((k, 3, 3))?.contiguous()?;
    relative_orientation(&x, y, &x_o, y_o)
}

/// Check that every frame is orthonormal up to `tolerance`.
pub fn frames_are_orthonormal(frames: &Tensor, tolerance: f64) -> Result<bool> {
    let (count, _, _) = frames.dims3()?;
    let gram = frames
        .contiguous()?
        .matmul(&frames.transpose(1, 2)?.contiguous()?)?;
    let eye = Tensor::eye(3, frames.dtype(), frames.device())?
        .unsqueeze(0)?
        .repeat((count, 1, 1))?;
    let worst = (gram - eye)?
        .abs()?
        .flatten_all()?
        .max(0)?
        .to_dtype(DType::F64)?
        .to_scalar::<f64>()?;
    Ok(worst <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector;

    fn helix(n: usize) -> Vec<[f32; 3]> {
        // ideal alpha helix C-alpha trace: 2.3 A radius, 100 degrees and 1.5 A rise per residue
        (0..n)
            .map(|i| {
                let t = i as f32 * 100f32.to_radians();
                [2.3 * t.cos(), 2.3 * t.sin(), 1.5 * i as f32]
            })
            .collect()
    }

    #[test]
    fn test_orientation_shapes_and_edges() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let trace = helix(8);
        let positions = points_tensor(&trace, &device)?;
        let frames = orientation(&positions)?;
        assert_eq!(frames.dims(), &[8, 3, 3]);
        assert!(frames_are_orthonormal(&frames, 1e-4)?);

        let first: Vec<Vec<f32>> = frames.i(0)?.to_vec2()?;
        assert_eq!(first, vec![vec![1., 0., 0.], vec![0., 1., 0.], vec![0., 0., 1.]]);
        let last: Vec<Vec<f32>> = frames.i(7)?.to_vec2()?;
        assert_eq!(last, first);

        let short = orientation(&Tensor::new(&[[0f32, 0., 0.], [1., 0., 0.]], &device)?)?;
        assert_eq!(short.dims(), &[2, 3, 3]);
        Ok(())
    }

    #[test]
    fn test_orientation_bisector_points_outward() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let trace = helix(5);
        let frames = orientation(&points_tensor(&trace, &device)?)?;
        let b: Vec<f32> = frames.i((2, 0))?.to_vec1()?;
        // on a helix the bisector points from the axis through the C-alpha
        let radial = vector::normalize(&[trace[2][0], trace[2][1], 0.0]);
        assert!(vector::dot(&[b[0], b[1], b[2]], &radial) > 0.9);
        Ok(())
    }

    #[test]
    fn test_quaternion_batch_matches_scalar() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let rots = [
            vector::rotation_matrix([0.0, 0.0, 1.0], 0.3),
            vector::rotation_matrix([1.0, 1.0, 0.0], 2.0),
            vector::IDENTITY,
        ];
        let matrix = Tensor::new(&rots, &device)?;
        let quats: Vec<Vec<f32>> = matrix_to_quaternion(&matrix)?.to_vec2()?;
        for (rot, quat) in rots.iter().zip(quats.iter()) {
            let expected = vector::matrix_to_quaternion(rot);
            for (a, b) in quat.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-5);
            }
        }
        Ok(())
    }

    #[test]
    fn test_degenerate_quaternion_is_finite() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let flip = Tensor::new(&[[[-1f32, 0., 0.], [0., -1., 0.], [0., 0., -1.]]], &device)?;
        let quat: Vec<Vec<f32>> = matrix_to_quaternion(&flip)?.to_vec2()?;
        assert!(quat[0].iter().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn test_relative_orientation_batch_matches_scalar() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let xs = [[0f32, 0., 0.], [1., 2., 3.], [4., 4., 4.]];
        let ys = [[0f32, 0., 0.], [2., 0., 3.], [1., -1., 0.5]];
        let x_frames = [
            vector::IDENTITY,
            vector::rotation_matrix([0.0, 1.0, 0.0], 0.4),
            vector::rotation_matrix([1.0, 0.0, 1.0], -1.2),
        ];
        let y_frames = [
            vector::IDENTITY,
            vector::rotation_matrix([0.0, 0.0, 1.0], 1.0),
            vector::rotation_matrix([0.3, 1.0, 0.0], 0.8),
        ];
        let out = relative_orientation(
            &Tensor::new(&xs, &device)?,
            &Tensor::new(&ys, &device)?,
            &Tensor::new(&x_frames, &device)?,
            &Tensor::new(&y_frames, &device)?,
        )?;
        assert_eq!(out.concat()?.dims(), &[3, 8]);

        let distance: Vec<Vec<f32>> = out.distance.to_vec2()?;
        let direction: Vec<Vec<f32>> = out.direction.to_vec2()?;
        let rotation: Vec<Vec<f32>> = out.rotation.to_vec2()?;
        for i in 0..3 {
            let expected = vector::relative_orientation(&xs[i], &ys[i], &x_frames[i], &y_frames[i]);
            assert!((distance[i][0] - expected.distance).abs() < 1e-5);
            for k in 0..3 {
                assert!((direction[i][k] - expected.direction[k]).abs() < 1e-4);
            }
            for k in 0..4 {
                assert!((rotation[i][k] - expected.rotation[k]).abs() < 1e-4);
            }
        }
        // coincident points have no direction
        assert_eq!(direction[0], vec![0., 0., 0.]);
        Ok(())
    }

    #[test]
    fn test_neighbourhood_matches_batch() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let centre = Tensor::new(&[1f32, 0., 0.], &device)?;
        let centre_frame = Tensor::new(&vector::rotation_matrix([0.0, 0.0, 1.0], 0.5), &device)?;
        let neighbours = Tensor::new(&[[2f32, 0., 0.], [1., 1., 1.]], &device)?;
        let frames = Tensor::new(&[vector::IDENTITY, vector::IDENTITY], &device)?;
        let out = neighbourhood_relative_orientation(&centre, &neighbours, &centre_frame, &frames)?;
        assert_eq!(out.distance.dims(), &[2, 1]);
        assert_eq!(out.direction.dims(), &[2, 3]);
        assert_eq!(out.rotation.dims(), &[2, 4]);
        Ok(())
    }
}
