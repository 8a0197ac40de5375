//! Detection session: the tick-driven glue between an AR host, the marker
//! registry, and the snapshot exporter.
//!
//! The host drives a [`DetectionSession`] through four entry points:
//! - [`DetectionSession::start`] once, then [`DetectionSession::tick`] every frame,
//! - [`DetectionSession::on_permission`] when the permission prompt resolves,
//! - [`DetectionSession::on_export_trigger`] when the bound input action fires,
//! - [`DetectionSession::shutdown`] on teardown.
//!
//! Host services are injected as already-resolved handles implementing the
//! traits in [`host`]; nothing is looked up by name at runtime.

mod config;
pub mod host;
mod session;

pub use config::{ConfigError, SessionConfig, SessionIoError};
pub use host::{
    BindingError, DetectorProfile, MarkerDetectorSettings, MarkerSource, MarkerType,
    MarkerVisuals, MeshDetectorFlags, MeshQuerySettings, MeshRenderMode, MeshSource, Permission,
    PermissionOutcome, SessionHost, SourceError, VisualHandle,
};
pub use session::{
    visual_label, DetectionSession, DisableReason, PermissionState, SessionError, SessionState,
    TickOutcome,
};
