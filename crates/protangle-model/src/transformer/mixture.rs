//! Mixtures of von Mises distributions over the three backbone torsions.
use candle_core::{IndexOp, Result, Tensor, D};
use protangle_geometry::ops::wrap_angle;

const LOG_TWO_PI: f64 = 1.837_877_066_409_345_5;
const BESSEL_SPLIT: f64 = 3.75;

// Abramowitz & Stegun 9.8.1, in powers of (x / 3.75)^2
const I0_SMALL: [f64; 7] = [
    1.0, 3.515_622_9, 3.089_942_4, 1.206_749_2, 0.265_973_2, 0.036_076_8, 0.004_581_3,
];
// Abramowitz & Stegun 9.8.2, in powers of 3.75 / x
const I0_LARGE: [f64; 9] = [
    0.398_942_28,
    0.013_285_92,
    0.002_253_19,
    -0.001_575_65,
    0.009_162_81,
    -0.020_577_06,
    0.026_355_37,
    -0.016_476_33,
    0.003_923_77,
];

fn horner(x: &Tensor, coeffs: &[f64]) -> Result<Tensor> {
    let (last, rest) = match coeffs.split_last() {
        Some(split) => split,
        None => return x.zeros_like(),
    };
    let mut out = x.ones_like()?.affine(0.0, *last)?;
    for coeff in rest.iter().rev() {
        out = (out * x)?.affine(1.0, *coeff)?;
    }
    Ok(out)
}

/// `log I0(kappa)`, the log normalizer of the von Mises distribution.
///
/// Both regimes are evaluated on inputs clamped to their own domain so
/// neither produces a NaN that `where_cond` would have to hide.
pub fn log_bessel_i0(kappa: &Tensor) -> Result<Tensor> {
    let x = kappa.abs()?;

    let small = x.minimum(BESSEL_SPLIT)?;
    let t = (small / BESSEL_SPLIT)?.sqr()?;
    let log_small = horner(&t, &I0_SMALL)?.log()?;

    let large = x.maximum(BESSEL_SPLIT)?;
    let u = large.recip()?.affine(BESSEL_SPLIT, 0.0)?;
    let log_large = ((&large - large.log()?.affine(0.5, 0.0)?)? + horner(&u, &I0_LARGE)?.log()?)?;

    x.le(BESSEL_SPLIT)?.where_cond(&log_small, &log_large)
}

/// Elementwise von Mises log density, broadcasting `x`, `mu` and `kappa`.
pub fn von_mises_log_prob(x: &Tensor, mu: &Tensor, kappa: &Tensor) -> Result<Tensor> {
    let cosine = x.broadcast_sub(mu)?.cos()?;
    let normalizer = (log_bessel_i0(kappa)? + LOG_TWO_PI)?;
    kappa.broadcast_mul(&cosine)?.broadcast_sub(&normalizer)
}

/// Parameters of a per-residue mixture over (phi, psi, omega).
///
/// - `weights`: `[N, M]`, rows sum to one
/// - `means`: `[N, 3, M]`
/// - `concentrations`: `[N, 3, M]`
#[derive(Debug, Clone)]
pub struct MixtureParameters {
    pub weights: Tensor,
    pub means: Tensor,
    pub concentrations: Tensor,
}

impl MixtureParameters {
    pub fn mix(&self) -> Result<usize> {
        self.weights.dim(D::Minus1)
    }

    /// `(mean [N, 3], concentration [N, 3])` for each component.
    pub fn components(&self) -> Result<Vec<(Tensor, Tensor)>> {
        (0..self.mix()?)
            .map(|idx| {
                Ok((
                    self.means.i((.., .., idx))?,
                    self.concentrations.i((.., .., idx))?,
                ))
            })
            .collect()
    }

    /// Log likelihood `[N]` of the torsions `angles [N, 3]`; the three angles
    /// are independent given the component.
    pub fn log_prob(&self, angles: &Tensor) -> Result<Tensor> {
        let per_angle = von_mises_log_prob(&angles.unsqueeze(D::Minus1)?, &self.means, &self.concentrations)?;
        let log_weights = self.weights.maximum(1e-30)?.log()?;
        let joint = (per_angle.sum(1)? + log_weights)?;
        let max = joint.max_keepdim(D::Minus1)?;
        let sum = joint.broadcast_sub(&max)?.exp()?.sum_keepdim(D::Minus1)?;
        (max + sum.log()?)?.squeeze(D::Minus1)
    }

    /// Means `[N, 3]` of the heaviest component per residue, in (-pi, pi].
    pub fn most_likely_angles(&self) -> Result<Tensor> {
        let (n, angles, _) = self.means.dims3()?;
        let best = self
            .weights
            .argmax_keepdim(D::Minus1)?
            .unsqueeze(1)?
            .broadcast_as((n, angles, 1))?
            .contiguous()?;
        let means = self.means.contiguous()?.gather(&best, 2)?.squeeze(2)?;
        wrap_angle(&means)
    }
}
