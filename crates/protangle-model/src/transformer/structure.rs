//! Graph views of a backbone: which residues attend to which, and the
//! geometric features carried on each edge.
use super::config::ConfigError;
use crate::error::ModelError;
use candle_core::{DType, Device, IndexOp, Result, Tensor, D};
use protangle_geometry::frames::{orientation, relative_orientation};

pub fn linspace(start: f64, stop: f64, steps: usize, device: &Device) -> Result<Tensor> {
    if steps == 0 {
        Tensor::from_vec(Vec::<f64>::new(), steps, device)
    } else if steps == 1 {
        Tensor::from_vec(vec![start], steps, device)
    } else {
        let delta = (stop - start) / (steps - 1) as f64;
        let vs = (0..steps)
            .map(|step| start + step as f64 * delta)
            .collect::<Vec<_>>();
        Tensor::from_vec(vs, steps, device)
    }
}

/// Gaussian radial basis `[...] -> [..., kernels]` with centres spaced evenly
/// on `[min, max]` and width `(max - min) / kernels`.
pub fn gaussian_rbf(distance: &Tensor, min: f64, max: f64, kernels: usize) -> Result<Tensor> {
    let mu = linspace(min, max, kernels, distance.device())?.to_dtype(distance.dtype())?;
    let sigma = (max - min) / kernels as f64;
    let diff = (distance.unsqueeze(D::Minus1)?.broadcast_sub(&mu)? / sigma)?;
    diff.sqr()?.neg()?.exp()
}

/// Fixed degree neighbourhoods: `indices [N, K]` (u32) into the residues of
/// the chain and `mask [N, K]` (f32, 1 for a real neighbour).
#[derive(Debug, Clone)]
pub struct NeighbourGraph {
    pub indices: Tensor,
    pub mask: Tensor,
}

impl NeighbourGraph {
    /// The `k` nearest residues by euclidean distance, self included.
    ///
    /// Residues with `residue_mask == 0` are ranked behind every unmasked
    /// residue and their slots carry a zero mask.
    pub fn nearest(positions: &Tensor, k: usize, residue_mask: Option<&Tensor>) -> Result<Self> {
        let (n, dim) = positions.dims2()?;
        if dim != 3 {
            return Err(ModelError::shape("positions", "[N, 3]", positions.dims()));
        }
        if n == 0 {
            return Err(candle_core::Error::wrap(ModelError::EmptyChain));
        }
        let k = k.min(n);
        let positions = positions.to_dtype(DType::F32)?;
        let distances = positions
            .unsqueeze(1)?
            .broadcast_sub(&positions.unsqueeze(0)?)?
            .sqr()?
            .sum(D::Minus1)?;

        let residue_mask = match residue_mask {
            Some(mask) => mask.to_dtype(DType::F32)?,
            None => Tensor::ones(n, DType::F32, positions.device())?,
        };
        // push masked columns behind the farthest unmasked residue
        let penalty = (distances.max_keepdim(D::Minus1)? + 1.0)?
            .broadcast_mul(&residue_mask.affine(-1.0, 1.0)?.unsqueeze(0)?)?;
        let ranked = (distances + penalty)?;

        let indices = ranked
            .arg_sort_last_dim(true)?
            .narrow(D::Minus1, 0, k)?
            .contiguous()?;
        let mask = residue_mask
            .index_select(&indices.flatten_all()?, 0)?
            .reshape((n, k))?;
        log::debug!("nearest neighbour graph: {n} residues, {k} neighbours");
        Ok(Self { indices, mask })
    }

    /// Residue `i` sees `i, i - 1, ..., i - k + 1`. Slots before the start of
    /// the chain point at residue 0 and are masked.
    pub fn sequential(n: usize, k: usize, device: &Device) -> Result<Self> {
        if n == 0 {
            return Err(candle_core::Error::wrap(ModelError::EmptyChain));
        }
        let k = k.min(n);
        let mut indices = Vec::with_capacity(n * k);
        let mut mask = Vec::with_capacity(n * k);
        for i in 0..n {
            for offset in 0..k {
                let valid = offset <= i;
                indices.push(if valid { (i - offset) as u32 } else { 0 });
                mask.push(if valid { 1f32 } else { 0f32 });
            }
        }
        Ok(Self {
            indices: Tensor::from_vec(indices, (n, k), device)?,
            mask: Tensor::from_vec(mask, (n, k), device)?,
        })
    }

    pub fn len(&self) -> usize {
        self.indices.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn neighbours(&self) -> usize {
        self.indices.dims()[1]
    }

    /// Node features `[N, C]` at the neighbour indices => `[N, K, C]`.
    pub fn gather(&self, features: &Tensor) -> Result<Tensor> {
        let (n_nodes, k) = self.indices.dims2()?;
        let flat = features.index_select(&self.indices.flatten_all()?, 0)?;
        let mut shape = vec![n_nodes, k];
        shape.extend_from_slice(&features.dims()[1..]);
        flat.reshape(shape)
    }
}

/// How edges are featurized: the radial basis of the distance plus the
/// clamped sequence offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeEncoding {
    pub max_distance: f64,
    pub kernels: usize,
    pub max_offset: usize,
}

impl EdgeEncoding {
    /// rbf + direction (3) + rotation (4) + offset (1)
    pub fn size(&self) -> usize {
        self.kernels + 8
    }
}

/// The neighbour graph with edge features `[N, K, E]`, as consumed by the encoder.
#[derive(Debug, Clone)]
pub struct RelativeStructure {
    pub graph: NeighbourGraph,
    pub edges: Tensor,
}

/// Oriented points along a chain: position, local frame and residue index.
#[derive(Debug, Clone)]
pub struct OrientationFeatures {
    positions: Tensor,
    frames: Tensor,
    index: Tensor,
}

impl OrientationFeatures {
    pub fn new(positions: &Tensor, frames: &Tensor) -> Result<Self> {
        let (n, _) = positions.dims2()?;
        if frames.dims() != [n, 3, 3] {
            return Err(ModelError::shape("frames", format!("[{n}, 3, 3]"), frames.dims()));
        }
        let index = Tensor::arange(0u32, n as u32, positions.device())?.to_dtype(positions.dtype())?;
        Ok(Self {
            positions: positions.contiguous()?,
            frames: frames.contiguous()?,
            index,
        })
    }

    /// Frames from [`orientation`] along a C-alpha trace `[N, 3]`.
    pub fn from_positions(positions: &Tensor) -> Result<Self> {
        Self::new(positions, &orientation(positions)?)
    }

    /// C-alpha trace of an N/CA/C backbone `[N, 3, 3]`.
    pub fn from_backbone(backbone: &Tensor) -> Result<Self> {
        let (_, atoms, dim) = backbone.dims3()?;
        if atoms < 2 || dim != 3 {
            return Err(ModelError::shape("backbone", "[N, 3, 3]", backbone.dims()));
        }
        Self::from_positions(&backbone.i((.., 1, ..))?.contiguous()?)
    }

    pub fn positions(&self) -> &Tensor {
        &self.positions
    }

    pub fn frames(&self) -> &Tensor {
        &self.frames
    }

    /// `[N, 3 + 9 + 1]`: position, flattened frame, residue index.
    pub fn payload(&self) -> Result<Tensor> {
        let n = self.positions.dim(0)?;
        Tensor::cat(
            &[
                &self.positions,
                &self.frames.reshape((n, 9))?,
                &self.index.unsqueeze(1)?,
            ],
            D::Minus1,
        )
    }

    /// Edge features `[N, K, encoding.size()]` of every neighbour in the frame
    /// of its centre residue. Masked slots are zero.
    pub fn relative(
        &self,
        graph: &NeighbourGraph,
        encoding: &EdgeEncoding,
    ) -> Result<RelativeStructure> {
        let (n, k) = graph.indices.dims2()?;
        if n != self.positions.dim(0)? {
            return Err(ModelError::shape(
                "neighbour graph",
                format!("[{}, K]", self.positions.dim(0)?),
                graph.indices.dims(),
            ));
        }
        if encoding.max_offset == 0 {
            return Err(candle_core::Error::wrap(ModelError::from(ConfigError::Zero(
                "max_offset",
            ))));
        }
        let batch = n * k;
        let centre = self
            .positions
            .unsqueeze(1)?
            .broadcast_as((n, k, 3))?
            .contiguous()?
            .reshape((batch, 3))?;
        let centre_frames = self
            .frames
            .unsqueeze(1)?
            .broadcast_as((n, k, 3, 3))?
            .contiguous()?
            .reshape((batch, 3, 3))?;
        let neighbour = graph.gather(&self.positions)?.reshape((batch, 3))?;
        let neighbour_frames = graph.gather(&self.frames)?.reshape((batch, 3, 3))?;

        let relative = relative_orientation(&centre, &neighbour, &centre_frames, &neighbour_frames)?;
        let rbf = gaussian_rbf(
            &relative.distance.squeeze(D::Minus1)?,
            0.0,
            encoding.max_distance,
            encoding.kernels,
        )?;

        let max_offset = encoding.max_offset as f64;
        let offset = graph
            .gather(&self.index)?
            .broadcast_sub(&self.index.unsqueeze(1)?)?
            .clamp(-max_offset, max_offset)?
            .affine(1.0 / max_offset, 0.0)?
            .reshape((batch, 1))?;

        let edges = Tensor::cat(&[&rbf, &relative.direction, &relative.rotation, &offset], D::Minus1)?
            .reshape((n, k, encoding.size()))?
            .broadcast_mul(&graph.mask.unsqueeze(D::Minus1)?.to_dtype(rbf.dtype())?)?;
        Ok(RelativeStructure {
            graph: graph.clone(),
            edges,
        })
    }
}
