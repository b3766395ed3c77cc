pub mod list;
pub mod plan;
pub mod synth;
pub mod validate;
