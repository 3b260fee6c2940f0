// src/rules/mod.rs

//! Task declarations: what each task reads, writes and runs.
//!
//! - [`template`] parses command and path templates.
//! - [`input`] describes input specifications and compiles them.
//! - [`matches`] holds the per-file bindings produced at run time.
//! - [`registry`] stores declarations; it performs no matching itself.

pub mod body;
pub mod input;
pub mod matches;
pub mod registry;
pub mod resources;
pub mod template;

pub use body::{CommandTemplate, FnBody, TaskBody};
pub use input::{InputMatcher, InputSpec};
pub use matches::{Captures, Match, MatchKey};
pub use registry::{Registry, TaskDecl};
pub use resources::ResourceProfile;
pub use template::{Template, UnboundPlaceholder};
