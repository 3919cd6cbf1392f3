use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("expected {expected} but got tensor of shape {got:?}")]
    InvalidShape {
        expected: &'static str,
        got: Vec<usize>,
    },
    #[error("batch mismatch: {left} vs {right}")]
    BatchMismatch { left: usize, right: usize },
}

impl GeometryError {
    pub fn shape(expected: &'static str, got: &[usize]) -> candle_core::Error {
        candle_core::Error::wrap(Self::InvalidShape {
            expected,
            got: got.to_vec(),
        })
    }
}
