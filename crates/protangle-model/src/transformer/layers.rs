use super::structure::RelativeStructure;
use candle_core::{Module, Result, Tensor, D};
use candle_nn::ops::softmax_last_dim;
use candle_nn::{linear, Linear, VarBuilder};
use protangle_geometry::ops::atan2;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Gelu,
    Silu,
    Elu,
    Tanh,
}

impl Module for Activation {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            Self::Relu => xs.relu(),
            Self::Gelu => xs.gelu(),
            Self::Silu => xs.silu(),
            Self::Elu => xs.elu(1.0),
            Self::Tanh => xs.tanh(),
        }
    }
}

/// `depth` linear layers with the activation between them.
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Linear>,
    activation: Activation,
}

impl Mlp {
    pub fn new(
        in_size: usize,
        out_size: usize,
        hidden_size: usize,
        depth: usize,
        activation: Activation,
        vb: VarBuilder,
    ) -> Result<Self> {
        let depth = depth.max(1);
        let vb = vb.pp("layers");
        let layers = (0..depth)
            .map(|layer| {
                let input = if layer == 0 { in_size } else { hidden_size };
                let output = if layer == depth - 1 { out_size } else { hidden_size };
                linear(input, output, vb.pp(layer))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers, activation })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut out = xs.clone();
        for (idx, layer) in self.layers.iter().enumerate() {
            if idx > 0 {
                out = self.activation.forward(&out)?;
            }
            out = layer.forward(&out)?;
        }
        Ok(out)
    }
}

/// Multi-head attention of each residue over its graph neighbours.
///
/// Queries come from the residue, keys and values from the neighbour's
/// features concatenated with the edge features. Masked neighbours get zero
/// weight; a residue without any neighbour receives a zero update.
#[derive(Debug, Clone)]
pub struct NeighbourAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    heads: usize,
    head_size: usize,
}

impl NeighbourAttention {
    pub fn new(
        size: usize,
        edge_size: usize,
        attention_size: usize,
        heads: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        if heads == 0 || attention_size % heads != 0 {
            candle_core::bail!("attention_size {attention_size} is not divisible by heads {heads}")
        }
        Ok(Self {
            query: linear(size, attention_size, vb.pp("query"))?,
            key: linear(size + edge_size, attention_size, vb.pp("key"))?,
            value: linear(size + edge_size, attention_size, vb.pp("value"))?,
            output: linear(attention_size, size, vb.pp("output"))?,
            heads,
            head_size: attention_size / heads,
        })
    }

    pub fn forward(&self, features: &Tensor, structure: &RelativeStructure) -> Result<Tensor> {
        let graph = &structure.graph;
        let (n, k) = graph.indices.dims2()?;
        let (heads, head_size) = (self.heads, self.head_size);

        // [N, H, 1, D]
        let query = self
            .query
            .forward(features)?
            .reshape((n, heads, 1, head_size))?;

        let neighbours = Tensor::cat(&[&graph.gather(features)?, &structure.edges], D::Minus1)?;
        // [N, K, H*D] => [N, H, K, D]
        let split = |t: Tensor| -> Result<Tensor> {
            t.reshape((n, k, heads, head_size))?
                .transpose(1, 2)?
                .contiguous()
        };
        let key = split(self.key.forward(&neighbours)?)?;
        let value = split(self.value.forward(&neighbours)?)?;

        let scale = 1.0 / (head_size as f64).sqrt();
        // [N, H, K]
        let scores = (query.matmul(&key.transpose(2, 3)?.contiguous()?)? * scale)?.squeeze(2)?;
        let mask = graph
            .mask
            .to_dtype(scores.dtype())?
            .unsqueeze(1)?
            .broadcast_as(scores.dims())?
            .contiguous()?;
        let scores = mask
            .gt(0.0)?
            .where_cond(&scores, &(scores.zeros_like()? - 1e9)?)?;
        let weights = (softmax_last_dim(&scores)? * &mask)?;

        let attended = weights
            .unsqueeze(2)?
            .matmul(&value)?
            .reshape((n, heads * head_size))?;
        let any_neighbour = graph.mask.max_keepdim(D::Minus1)?.to_dtype(scores.dtype())?;
        self.output.forward(&attended)?.broadcast_mul(&any_neighbour)
    }
}

/// Linear projection onto `out` angles: predicts a (sin, cos) pair per angle
/// and returns `atan2(sin, cos)` in (-pi, pi].
#[derive(Debug, Clone)]
pub struct AngleProject {
    linear: Linear,
    out: usize,
}

impl AngleProject {
    pub fn new(in_size: usize, out: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            linear: linear(in_size, 2 * out, vb.pp("linear"))?,
            out,
        })
    }
}

impl Module for AngleProject {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let projected = self.linear.forward(xs)?;
        let sin = projected.narrow(D::Minus1, 0, self.out)?;
        let cos = projected.narrow(D::Minus1, self.out, self.out)?;
        atan2(&sin, &cos)
    }
}
