//! モデル定義

mod deployment;
mod settings;

// Re-exports
pub use deployment::*;
pub use settings::*;
