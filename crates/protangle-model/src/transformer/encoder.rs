use super::layers::{Activation, Mlp, NeighbourAttention};
use super::structure::RelativeStructure;
use candle_core::{Module, Result, Tensor};
use candle_nn::{layer_norm, linear, Dropout, LayerNorm, Linear, VarBuilder};

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub in_size: usize,
    pub size: usize,
    pub edge_size: usize,
    pub attention_size: usize,
    pub heads: usize,
    pub hidden_size: usize,
    pub depth: usize,
    pub mlp_depth: usize,
    pub activation: Activation,
    pub batch_norm: bool,
    pub pre_norm: bool,
    pub dropout: f32,
    pub layer_norm_eps: f64,
}

/// Attention over the neighbour graph followed by a residue-wise MLP, each
/// wrapped in a residual connection.
#[derive(Debug, Clone)]
pub struct StructuredTransformerEncoderBlock {
    attention: NeighbourAttention,
    local: Mlp,
    attention_norm: Option<LayerNorm>,
    local_norm: Option<LayerNorm>,
    dropout: Dropout,
    pre_norm: bool,
}

impl StructuredTransformerEncoderBlock {
    pub fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let attention = NeighbourAttention::new(
            config.size,
            config.edge_size,
            config.attention_size,
            config.heads,
            vb.pp("attention"),
        )?;
        let local = Mlp::new(
            config.size,
            config.size,
            config.hidden_size,
            config.mlp_depth,
            config.activation,
            vb.pp("local"),
        )?;
        let (attention_norm, local_norm) = if config.batch_norm {
            (
                Some(layer_norm(config.size, config.layer_norm_eps, vb.pp("attention_norm"))?),
                Some(layer_norm(config.size, config.layer_norm_eps, vb.pp("local_norm"))?),
            )
        } else {
            (None, None)
        };
        Ok(Self {
            attention,
            local,
            attention_norm,
            local_norm,
            dropout: Dropout::new(config.dropout),
            pre_norm: config.pre_norm,
        })
    }

    fn norm(norm: &Option<LayerNorm>, xs: &Tensor) -> Result<Tensor> {
        match norm {
            Some(norm) => norm.forward(xs),
            None => Ok(xs.clone()),
        }
    }

    pub fn forward(
        &self,
        features: &Tensor,
        structure: &RelativeStructure,
        train: bool,
    ) -> Result<Tensor> {
        if self.pre_norm {
            let normed = Self::norm(&self.attention_norm, features)?;
            let attended = self.attention.forward(&normed, structure)?;
            let out = (features + self.dropout.forward(&attended, train)?)?;
            let local = self.local.forward(&Self::norm(&self.local_norm, &out)?)?;
            out + self.dropout.forward(&local, train)?
        } else {
            let attended = self.attention.forward(features, structure)?;
            let out = Self::norm(
                &self.attention_norm,
                &(features + self.dropout.forward(&attended, train)?)?,
            )?;
            let local = self.local.forward(&out)?;
            Self::norm(&self.local_norm, &(out + self.dropout.forward(&local, train)?)?)
        }
    }
}

/// Input projection followed by `depth` encoder blocks.
#[derive(Debug, Clone)]
pub struct StructuredTransformerEncoder {
    preprocessor: Linear,
    blocks: Vec<StructuredTransformerEncoderBlock>,
}

impl StructuredTransformerEncoder {
    pub fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let preprocessor = linear(config.in_size, config.size, vb.pp("preprocessor"))?;
        let blocks = (0..config.depth)
            .map(|layer| StructuredTransformerEncoderBlock::new(config, vb.pp("blocks").pp(layer)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            preprocessor,
            blocks,
        })
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    pub fn forward(
        &self,
        features: &Tensor,
        structure: &RelativeStructure,
        train: bool,
    ) -> Result<Tensor> {
        let mut out = self.preprocessor.forward(features)?;
        for block in self.blocks.iter() {
            out = block.forward(&out, structure, train)?;
        }
        log::debug!("encoder output: {:?}", out.dims());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::structure::{EdgeEncoding, NeighbourGraph, OrientationFeatures};
    use candle_core::{DType, Device, D};
    use candle_nn::VarMap;

    fn config() -> EncoderConfig {
        EncoderConfig {
            in_size: 6,
            size: 16,
            edge_size: EdgeEncoding {
                max_distance: 20.0,
                kernels: 8,
                max_offset: 32,
            }
            .size(),
            attention_size: 16,
            heads: 4,
            hidden_size: 32,
            depth: 2,
            mlp_depth: 2,
            activation: Activation::Relu,
            batch_norm: true,
            pre_norm: true,
            dropout: 0.5,
            layer_norm_eps: 1e-5,
        }
    }

    fn structure(n: usize, device: &Device) -> Result<RelativeStructure> {
        let points: Vec<f32> = (0..n)
            .flat_map(|i| {
                let t = i as f32 * 100f32.to_radians();
                [2.3 * t.cos(), 2.3 * t.sin(), 1.5 * i as f32]
            })
            .collect();
        let nodes = OrientationFeatures::from_positions(&Tensor::from_vec(points, (n, 3), device)?)?;
        let graph = NeighbourGraph::nearest(nodes.positions(), 5, None)?;
        nodes.relative(
            &graph,
            &EdgeEncoding {
                max_distance: 20.0,
                kernels: 8,
                max_offset: 32,
            },
        )
    }

    #[test]
    fn test_encoder_shapes() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = StructuredTransformerEncoder::new(&config(), vb)?;
        assert_eq!(encoder.depth(), 2);

        let structure = structure(9, &device)?;
        let features = Tensor::randn(0f32, 1.0, (9, 6), &device)?;
        let out = encoder.forward(&features, &structure, false)?;
        assert_eq!(out.dims(), &[9, 16]);
        Ok(())
    }

    #[test]
    fn test_dropout_only_in_training() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = StructuredTransformerEncoder::new(&config(), vb)?;
        let structure = structure(9, &device)?;
        let features = Tensor::randn(0f32, 1.0, (9, 6), &device)?;

        let first: Vec<Vec<f32>> = encoder.forward(&features, &structure, false)?.to_vec2()?;
        let second: Vec<Vec<f32>> = encoder.forward(&features, &structure, false)?.to_vec2()?;
        assert_eq!(first, second);

        let trained: Vec<Vec<f32>> = encoder.forward(&features, &structure, true)?.to_vec2()?;
        assert_ne!(first, trained);
        Ok(())
    }

    #[test]
    fn test_pre_norm_normalizes_sublayer_inputs() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let block = StructuredTransformerEncoderBlock::new(&config(), vb)?;
        let structure = structure(9, &device)?;
        // far from zero mean and unit variance, so the norms change the inputs
        let features = Tensor::randn(0f32, 1.0, (9, 16), &device)?.affine(3.0, 2.0)?;

        let (attention_norm, local_norm) = match (&block.attention_norm, &block.local_norm) {
            (Some(attention_norm), Some(local_norm)) => (attention_norm, local_norm),
            _ => anyhow::bail!("layer norms missing with batch_norm set"),
        };
        let attended = block
            .attention
            .forward(&attention_norm.forward(&features)?, &structure)?;
        let out = (&features + attended)?;
        let expected = (&out + block.local.forward(&local_norm.forward(&out)?)?)?;

        let actual: Vec<Vec<f32>> = block.forward(&features, &structure, false)?.to_vec2()?;
        let expected: Vec<Vec<f32>> = expected.to_vec2()?;
        for (row_a, row_b) in actual.iter().zip(expected.iter()) {
            for (a, b) in row_a.iter().zip(row_b.iter()) {
                assert!((a - b).abs() < 1e-5);
            }
        }

        // the unnormalized input takes a different path
        let skipped = (&features + block.attention.forward(&features, &structure)?)?;
        let skipped: Vec<Vec<f32>> = (&skipped
            + block.local.forward(&local_norm.forward(&skipped)?)?)?
        .to_vec2()?;
        assert_ne!(actual, skipped);
        Ok(())
    }

    #[test]
    fn test_post_norm_output_is_normalized() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let config = EncoderConfig {
            pre_norm: false,
            ..config()
        };
        let block = StructuredTransformerEncoderBlock::new(&config, vb)?;
        let structure = structure(9, &device)?;
        let features = Tensor::randn(0f32, 1.0, (9, 16), &device)?;
        let out = block.forward(&features, &structure, false)?;

        // freshly initialized LayerNorm has unit scale and zero shift
        let mean: Vec<f32> = out.mean_keepdim(D::Minus1)?.flatten_all()?.to_vec1()?;
        let var: Vec<f32> = out
            .broadcast_sub(&out.mean_keepdim(D::Minus1)?)?
            .sqr()?
            .mean_keepdim(D::Minus1)?
            .flatten_all()?
            .to_vec1()?;
        assert!(mean.iter().all(|m| m.abs() < 1e-4));
        assert!(var.iter().all(|v| (v - 1.0).abs() < 1e-2));
        Ok(())
    }

    #[test]
    fn test_without_norm_is_residual() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let config = EncoderConfig {
            batch_norm: false,
            dropout: 0.0,
            ..config()
        };
        // all weights zero: both sublayers contribute nothing
        let block = StructuredTransformerEncoderBlock::new(&config, VarBuilder::zeros(DType::F32, &device))?;
        let structure = structure(9, &device)?;
        let features = Tensor::randn(0f32, 1.0, (9, 16), &device)?;
        let out: Vec<Vec<f32>> = block.forward(&features, &structure, false)?.to_vec2()?;
        let expected: Vec<Vec<f32>> = features.to_vec2()?;
        assert_eq!(out, expected);
        Ok(())
    }
}
