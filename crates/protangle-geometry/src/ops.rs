//! Elementwise tensor helpers candle does not ship.
use candle_core::{Result, Tensor, D};
use std::f64::consts::{FRAC_PI_2, PI};

// Abramowitz & Stegun 4.4.49, |error| <= 2e-8 on [0, 1].
const ATAN_COEFFS: [f64; 8] = [
    -0.333_331_452_8,
    0.199_935_508_5,
    -0.142_088_994_4,
    0.106_562_639_3,
    -0.075_289_640_0,
    0.042_909_613_8,
    -0.016_165_736_7,
    0.002_866_225_7,
];

/// Cross product along the last dimension.
pub fn cross(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let last_dim = a.rank() - 1;

    let a0 = a.narrow(last_dim, 0, 1)?;
    let a1 = a.narrow(last_dim, 1, 1)?;
    let a2 = a.narrow(last_dim, 2, 1)?;

    let b0 = b.narrow(last_dim, 0, 1)?;
    let b1 = b.narrow(last_dim, 1, 1)?;
    let b2 = b.narrow(last_dim, 2, 1)?;

    let c0 = (a1.broadcast_mul(&b2)? - a2.broadcast_mul(&b1)?)?;
    let c1 = (a2.broadcast_mul(&b0)? - a0.broadcast_mul(&b2)?)?;
    let c2 = (a0.broadcast_mul(&b1)? - a1.broadcast_mul(&b0)?)?;

    Tensor::cat(&[&c0, &c1, &c2], last_dim)
}

pub fn dot(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    a.broadcast_mul(b)?.sum_keepdim(D::Minus1)
}

/// Euclidean norm over the last dimension, keeping it.
pub fn norm(v: &Tensor) -> Result<Tensor> {
    v.sqr()?.sum_keepdim(D::Minus1)?.sqrt()
}

/// `v / (|v| + eps)` along the last dimension.
pub fn normalize(v: &Tensor, eps: f64) -> Result<Tensor> {
    v.broadcast_div(&(norm(v)? + eps)?)
}

/// Elementwise `atan2(y, x)` in (-pi, pi].
///
/// Built from differentiable primitives: octant reduction to [0, 1] followed by
/// a polynomial arctangent.
pub fn atan2(y: &Tensor, x: &Tensor) -> Result<Tensor> {
    let ax = x.abs()?;
    let ay = y.abs()?;
    let hi = ax.maximum(&ay)?;
    let lo = ax.minimum(&ay)?;
    let a = (lo / (hi + 1e-30)?)?;
    let s = a.sqr()?;

    let mut poly = s.affine(ATAN_COEFFS[7], ATAN_COEFFS[6])?;
    for coeff in ATAN_COEFFS[..6].iter().rev() {
        poly = (poly * &s)?.affine(1.0, *coeff)?;
    }
    let r = (&a + ((poly * &s)? * &a)?)?;

    let r = ay.gt(&ax)?.where_cond(&r.affine(-1.0, FRAC_PI_2)?, &r)?;
    let r = x.lt(0.0)?.where_cond(&r.affine(-1.0, PI)?, &r)?;
    y.lt(0.0)?.where_cond(&r.neg()?, &r)
}

/// Wrap angles into (-pi, pi].
pub fn wrap_angle(angles: &Tensor) -> Result<Tensor> {
    atan2(&angles.sin()?, &angles.cos()?)
}
