// src/config/mod.rs

//! Configuration for filedag.
//!
//! Two documents are involved:
//! - the pipeline definition (`model.rs`, loaded by `loader.rs`, checked by
//!   `validate.rs`), which declares tasks and orchestration settings;
//! - layered parameter files merged by `resolver.rs` into the immutable
//!   [`Params`] mapping every task reads.

pub mod loader;
pub mod model;
pub mod params;
pub mod resolver;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigSection, DefaultSection, PipelineFile, RawPipelineFile, TaskConfig};
pub use params::Params;
pub use resolver::{resolve, ConfigSources, SiblingImport};
