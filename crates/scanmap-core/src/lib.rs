//! Core types shared by the `scanmap-*` crates.
//!
//! This crate is purely data: poses, marker observations and records, and
//! host mesh surfaces. It knows nothing about fusion, files, or sessions.

mod logger;
mod marker;
mod mesh;
mod pose;

pub use marker::{MarkerObservation, MarkerRecord};
pub use mesh::MeshSurface;
pub use pose::Pose;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_env, LOG_ENV_VAR};
