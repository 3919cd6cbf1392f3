//! protangle-model
//!
//! A structured transformer over protein backbones that predicts a mixture of
//! von Mises distributions for the (phi, psi, omega) torsions of each residue.
//!
//! ```shell
//! cargo run --example helix
//! cargo run --example helix --features metal
//! ```
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, Result};

pub use error::ModelError;
pub use transformer::config::{ConfigError, ProteinTransformerConfig};
pub use transformer::encoder::{
    EncoderConfig, StructuredTransformerEncoder, StructuredTransformerEncoderBlock,
};
pub use transformer::layers::{Activation, AngleProject, Mlp, NeighbourAttention};
pub use transformer::mixture::MixtureParameters;
pub use transformer::model::ProteinTransformer;
pub use transformer::structure::{
    EdgeEncoding, NeighbourGraph, OrientationFeatures, RelativeStructure,
};

pub mod error;
pub mod transformer;

pub fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            log::info!("Running on CPU, to run on GPU(metal), build with `--features metal`");
        }
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            log::info!("Running on CPU, to run on GPU, build with `--features cuda`");
        }
        Ok(Device::Cpu)
    }
}
