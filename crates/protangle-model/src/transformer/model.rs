//! Autoregressive torsion model.
//!
//! Each residue sees the torsions of the residue before it (teacher forcing)
//! and the geometry of its nearest neighbours, and predicts a mixture of von
//! Mises distributions over its own (phi, psi, omega). Within a residue psi
//! depends linearly on phi and omega on phi and psi.
use super::config::ProteinTransformerConfig;
use super::encoder::StructuredTransformerEncoder;
use super::layers::AngleProject;
use super::mixture::MixtureParameters;
use super::structure::{EdgeEncoding, NeighbourGraph, OrientationFeatures};
use crate::error::ModelError;
use candle_core::{IndexOp, Module, Result, Tensor, D};
use candle_nn::ops::{sigmoid, softmax_last_dim};
use candle_nn::{linear, Linear, VarBuilder};

const MIN_CONCENTRATION: f64 = 0.1;
const CONCENTRATION_SCALE: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct ProteinTransformer {
    preprocess: Linear,
    encoder: StructuredTransformerEncoder,
    mean: AngleProject,
    log_concentration: Linear,
    weights: Linear,
    factor: Linear,
    edges: EdgeEncoding,
    config: ProteinTransformerConfig,
}

impl ProteinTransformer {
    pub fn new(config: &ProteinTransformerConfig, vb: VarBuilder) -> Result<Self> {
        config
            .validate()
            .map_err(|err| candle_core::Error::wrap(ModelError::from(err)))?;
        let size = config.size;
        let mix = config.mix;
        // sin and cos of the three previous torsions
        let preprocess = linear(6, size, vb.pp("preprocess"))?;
        let encoder = StructuredTransformerEncoder::new(&config.encoder_config(), vb.pp("encoder"))?;
        let mean = AngleProject::new(size, 3 * mix, vb.pp("mean"))?;
        let log_concentration = linear(size, 3 * mix, vb.pp("log_concentration"))?;
        let weights = linear(size, mix, vb.pp("weights"))?;
        let factor = linear(size, 3, vb.pp("factor"))?;
        log::debug!(
            "protein transformer: size {size}, {mix} components, {} blocks",
            encoder.depth()
        );
        Ok(Self {
            preprocess,
            encoder,
            mean,
            log_concentration,
            weights,
            factor,
            edges: config.edge_encoding(),
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &ProteinTransformerConfig {
        &self.config
    }

    /// Angles of residue `i - 1` at row `i`; the first row is zero.
    fn previous_angles(angles: &Tensor) -> Result<Tensor> {
        let (n, _) = angles.dims2()?;
        let first = angles.i(0..1)?.zeros_like()?;
        if n == 1 {
            return Ok(first);
        }
        Tensor::cat(&[&first, &angles.narrow(0, 0, n - 1)?], 0)
    }

    /// - `angles`: `[N, 3]` torsions (phi, psi, omega), used both as history
    ///   and for the intra-residue dependency of the means
    /// - `tertiary`: `[N, 3, 3]` N/CA/C coordinates
    /// - `graph`: neighbourhoods over the N residues
    pub fn forward(
        &self,
        angles: &Tensor,
        tertiary: &Tensor,
        graph: &NeighbourGraph,
        train: bool,
    ) -> Result<MixtureParameters> {
        let (n, width) = angles.dims2()?;
        if n == 0 {
            return Err(candle_core::Error::wrap(ModelError::EmptyChain));
        }
        if width != 3 {
            return Err(ModelError::shape("angles", "[N, 3]", angles.dims()));
        }
        if tertiary.dims() != [n, 3, 3] {
            return Err(ModelError::shape("tertiary", format!("[{n}, 3, 3]"), tertiary.dims()));
        }
        let mix = self.config.mix;

        let previous = Self::previous_angles(angles)?;
        let angle_features = Tensor::cat(&[&previous.sin()?, &previous.cos()?], D::Minus1)?;
        let features = self.preprocess.forward(&angle_features)?;

        let nodes = OrientationFeatures::from_backbone(tertiary)?;
        let structure = nodes.relative(graph, &self.edges)?;
        let encoding = self.encoder.forward(&features, &structure, train)?;

        let mean = self.mean.forward(&encoding)?.reshape((n, 3, mix))?;
        let factor = self.factor.forward(&encoding)?;
        let phi = angles.i((.., 0))?;
        let psi = angles.i((.., 1))?;
        let psi_shift = (factor.i((.., 0))? * &phi)?;
        let omega_shift = ((factor.i((.., 1))? * &phi)? + (factor.i((.., 2))? * &psi)?)?;
        let shift = Tensor::stack(&[&phi.zeros_like()?, &psi_shift, &omega_shift], 1)?;
        let means = mean.broadcast_add(&shift.unsqueeze(D::Minus1)?)?;

        let concentrations = sigmoid(&self.log_concentration.forward(&encoding)?)?
            .affine(CONCENTRATION_SCALE, MIN_CONCENTRATION)?
            .reshape((n, 3, mix))?;
        let weights = softmax_last_dim(&self.weights.forward(&encoding)?)?;

        Ok(MixtureParameters {
            weights,
            means,
            concentrations,
        })
    }

    /// [`Self::forward`] over the `neighbours` nearest C-alpha atoms.
    pub fn forward_from_structure(
        &self,
        angles: &Tensor,
        tertiary: &Tensor,
        train: bool,
    ) -> Result<MixtureParameters> {
        let graph = self.neighbour_graph(tertiary)?;
        self.forward(angles, tertiary, &graph, train)
    }

    pub fn neighbour_graph(&self, tertiary: &Tensor) -> Result<NeighbourGraph> {
        let (_, atoms, _) = tertiary.dims3()?;
        if atoms < 2 {
            return Err(ModelError::shape("tertiary", "[N, 3, 3]", tertiary.dims()));
        }
        let ca = tertiary.i((.., 1, ..))?.contiguous()?;
        NeighbourGraph::nearest(&ca, self.config.neighbours, None)
    }
}
