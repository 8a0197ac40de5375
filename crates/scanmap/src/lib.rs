//! High-level facade crate for the `scanmap-*` workspace.
//!
//! This crate provides:
//! - stable re-exports of the underlying crates,
//! - [`replay`]: offline fusion of recorded observation batches,
//! - the `scanmap` command-line tool (feature `cli`).
//!
//! ## Quickstart
//!
//! ```no_run
//! use scanmap::core::{MarkerObservation, Pose};
//! use scanmap::export::{ExportConfig, SnapshotExporter};
//! use scanmap::registry::MarkerRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = MarkerRegistry::new();
//! let changed = registry.fuse(&[MarkerObservation::new(
//!     7,
//!     Pose::from_position(1.0, 2.0, 3.0),
//!     0.02,
//! )]);
//! assert!(changed);
//!
//! let exporter = SnapshotExporter::new(ExportConfig::new("room"));
//! exporter.export(&[], &registry.snapshot())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `scanmap::core`: poses, observations, records, mesh surfaces, logging.
//! - `scanmap::registry`: the marker registry and its fusion policy.
//! - `scanmap::export`: binary STL + marker JSON bundles.
//! - `scanmap::session`: the host-driven detection session state machine.

pub use scanmap_core as core;
pub use scanmap_export as export;
pub use scanmap_registry as registry;
pub use scanmap_session as session;

pub use scanmap_core::{MarkerObservation, MarkerRecord, MeshSurface, Pose};
pub use scanmap_registry::{FusionPolicy, MarkerRegistry};

pub mod replay;
