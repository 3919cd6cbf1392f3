use super::encoder::EncoderConfig;
use super::layers::Activation;
use super::structure::EdgeEncoding;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
    #[error("attention_size {attention_size} is not divisible by heads {heads}")]
    Heads { attention_size: usize, heads: usize },
    #[error("dropout must lie in [0, 1), got {0}")]
    Dropout(f32),
    #[error("max_distance must be positive and finite, got {0}")]
    MaxDistance(f64),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Hyperparameters of [`super::model::ProteinTransformer`].
///
/// Missing fields take their [`Default`] values when deserializing, so a JSON
/// file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProteinTransformerConfig {
    /// Number of mixture components.
    pub mix: usize,
    pub size: usize,
    /// Total width of the attention projections, split across `heads`.
    pub attention_size: usize,
    pub heads: usize,
    pub hidden_size: usize,
    pub mlp_depth: usize,
    pub depth: usize,
    /// Upper end of the radial basis in angstrom.
    pub max_distance: f64,
    pub distance_kernels: usize,
    pub neighbours: usize,
    pub activation: Activation,
    /// Enables the LayerNorm in each encoder block.
    pub batch_norm: bool,
    pub pre_norm: bool,
    pub dropout: f32,
    pub layer_norm_eps: f64,
    /// Sequence offsets are clamped to +/- this many residues.
    pub max_relative_offset: usize,
}

impl Default for ProteinTransformerConfig {
    fn default() -> Self {
        Self {
            mix: 10,
            size: 128,
            attention_size: 128,
            heads: 8,
            hidden_size: 128,
            mlp_depth: 3,
            depth: 3,
            max_distance: 20.0,
            distance_kernels: 16,
            neighbours: 15,
            activation: Activation::Relu,
            batch_norm: true,
            pre_norm: true,
            dropout: 0.1,
            layer_norm_eps: 1e-5,
            max_relative_offset: 32,
        }
    }
}

impl ProteinTransformerConfig {
    /// A narrow, shallow network for tests and demos.
    pub fn small() -> Self {
        Self {
            mix: 3,
            size: 32,
            attention_size: 32,
            heads: 4,
            hidden_size: 32,
            mlp_depth: 2,
            depth: 2,
            distance_kernels: 8,
            neighbours: 8,
            dropout: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("mix", self.mix),
            ("size", self.size),
            ("attention_size", self.attention_size),
            ("heads", self.heads),
            ("hidden_size", self.hidden_size),
            ("mlp_depth", self.mlp_depth),
            ("distance_kernels", self.distance_kernels),
            ("neighbours", self.neighbours),
            ("max_relative_offset", self.max_relative_offset),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(*name));
        }
        if self.attention_size % self.heads != 0 {
            return Err(ConfigError::Heads {
                attention_size: self.attention_size,
                heads: self.heads,
            });
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::Dropout(self.dropout));
        }
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return Err(ConfigError::MaxDistance(self.max_distance));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn edge_encoding(&self) -> EdgeEncoding {
        EdgeEncoding {
            max_distance: self.max_distance,
            kernels: self.distance_kernels,
            max_offset: self.max_relative_offset,
        }
    }

    /// The encoder stack consumes the projected angle features, so its input
    /// width is `size`.
    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            in_size: self.size,
            size: self.size,
            edge_size: self.edge_encoding().size(),
            attention_size: self.attention_size,
            heads: self.heads,
            hidden_size: self.hidden_size,
            depth: self.depth,
            mlp_depth: self.mlp_depth,
            activation: self.activation,
            batch_norm: self.batch_norm,
            pre_norm: self.pre_norm,
            dropout: self.dropout,
            layer_norm_eps: self.layer_norm_eps,
        }
    }
}
