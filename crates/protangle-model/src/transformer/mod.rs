pub mod config;
pub mod encoder;
pub mod layers;
pub mod mixture;
pub mod model;
pub mod structure;
