use crate::transformer::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{what}: expected shape {expected}, got {got:?}")]
    Shape {
        what: &'static str,
        expected: String,
        got: Vec<usize>,
    },
    #[error("cannot run on an empty chain")]
    EmptyChain,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ModelError {
    pub fn shape(
        what: &'static str,
        expected: impl Into<String>,
        got: &[usize],
    ) -> candle_core::Error {
        candle_core::Error::wrap(Self::Shape {
            what,
            expected: expected.into(),
            got: got.to_vec(),
        })
    }
}
