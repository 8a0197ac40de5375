use log::{debug, error, info, warn};
use scanmap_core::MarkerRecord;
use scanmap_export::{ExportError, ExportReport, SnapshotExporter};
use scanmap_registry::MarkerRegistry;

use crate::config::{ConfigError, SessionConfig};
use crate::host::{
    MarkerSource, MarkerVisuals, MeshSource, Permission, PermissionOutcome, SessionHost,
    VisualHandle,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a session stopped itself. Fatal for the session only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisableReason {
    /// The host's meshing capability is not enabled.
    MissingCapability,
    /// No input-action source to bind the export trigger to.
    MissingInputSource,
    PermissionDenied,
    /// The XR subsystem did not load within the configured number of ticks.
    ReadinessTimeout,
    DetectorCreation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    WaitingForSubsystem,
    Active,
    Disabled(DisableReason),
    Terminated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PermissionState {
    #[default]
    NotRequested,
    Pending,
    Granted,
    Denied,
}

/// What a single [`DetectionSession::tick`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do in the current state.
    Idle,
    /// Still polling for the XR subsystem.
    Waiting,
    /// The subsystem became ready and the session is now active.
    Activated,
    /// A batch was fused; `changed` triggered a visual rebuild.
    Fused { changed: bool },
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot {action} in state {state:?}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Label shown on a marker visual.
pub fn visual_label(record: &MarkerRecord) -> String {
    format!(
        "Marker:{}\nError: {}",
        record.number, record.reprojection_error
    )
}

/// Per-host detection session.
///
/// Single-threaded: every entry point takes `&mut self`, so fusing and
/// exporting never overlap.
pub struct DetectionSession<M, S, H, V> {
    config: SessionConfig,
    state: SessionState,
    permission: PermissionState,
    markers: M,
    mesh: S,
    host: H,
    presenter: V,
    registry: MarkerRegistry,
    exporter: SnapshotExporter,
    visuals: Vec<VisualHandle>,
    waited_ticks: u32,
    trigger_bound: bool,
    detector_created: bool,
}

impl<M, S, H, V> DetectionSession<M, S, H, V>
where
    M: MarkerSource,
    S: MeshSource,
    H: SessionHost,
    V: MarkerVisuals,
{
    /// Validate `config` and wire the collaborators. Nothing runs until
    /// [`DetectionSession::start`].
    pub fn new(
        config: SessionConfig,
        markers: M,
        mesh: S,
        host: H,
        presenter: V,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let registry = MarkerRegistry::with_policy(config.fusion).map_err(ConfigError::from)?;
        let exporter = SnapshotExporter::new(config.export.clone());
        Ok(Self {
            config,
            state: SessionState::Uninitialized,
            permission: PermissionState::NotRequested,
            markers,
            mesh,
            host,
            presenter,
            registry,
            exporter,
            visuals: Vec::new(),
            waited_ticks: 0,
            trigger_bound: false,
            detector_created: false,
        })
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    /// Visuals currently alive, one per registry record after a rebuild.
    #[inline]
    pub fn visuals(&self) -> &[VisualHandle] {
        &self.visuals
    }

    pub fn marker_source(&self) -> &M {
        &self.markers
    }

    pub fn marker_source_mut(&mut self) -> &mut M {
        &mut self.markers
    }

    pub fn mesh_source(&self) -> &S {
        &self.mesh
    }

    pub fn mesh_source_mut(&mut self) -> &mut S {
        &mut self.mesh
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn presenter(&self) -> &V {
        &self.presenter
    }

    /// Pause mesh acquisition and begin waiting for the XR subsystem.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::InvalidState {
                action: "start",
                state: self.state,
            });
        }
        self.mesh.set_acquisition_enabled(false);
        self.state = SessionState::WaitingForSubsystem;
        info!("session started; waiting for XR subsystem");
        Ok(())
    }

    /// Advance one frame.
    pub fn tick(&mut self) -> TickOutcome {
        match self.state {
            SessionState::WaitingForSubsystem => self.poll_readiness(),
            SessionState::Active => {
                let changed = self.fuse_latest();
                TickOutcome::Fused { changed }
            }
            _ => TickOutcome::Idle,
        }
    }

    /// Deliver the answer to the spatial-mapping permission request.
    pub fn on_permission(&mut self, outcome: PermissionOutcome) {
        if self.state != SessionState::Active || self.permission != PermissionState::Pending {
            warn!(
                "ignoring permission outcome {outcome:?} in state {:?}",
                self.state
            );
            return;
        }
        match outcome {
            PermissionOutcome::Granted(p) => {
                info!("permission {} granted", p.name());
                self.permission = PermissionState::Granted;
                self.mesh.set_acquisition_enabled(true);
                self.apply_mesh_settings();
            }
            PermissionOutcome::Denied(p) => {
                error!(
                    "permission {} denied; meshing cannot run, disabling session",
                    p.name()
                );
                self.permission = PermissionState::Denied;
                self.disable(DisableReason::PermissionDenied);
            }
        }
    }

    /// Export the current mesh and registry. Only valid while active.
    ///
    /// The registry is copied once, here; mesh acquisition is paused for the
    /// whole export and restored afterwards. An I/O failure is returned but
    /// leaves the session active.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(markers = self.registry.len()))
    )]
    pub fn on_export_trigger(&mut self) -> Result<ExportReport, SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::InvalidState {
                action: "export",
                state: self.state,
            });
        }
        let markers = self.registry.snapshot();
        match self.exporter.export_live(&mut self.mesh, &markers) {
            Ok(report) => {
                info!(
                    "snapshot written: {} triangles, {} markers",
                    report.triangles, report.markers
                );
                Ok(report)
            }
            Err(err) => {
                error!("snapshot export failed: {err}");
                Err(err.into())
            }
        }
    }

    /// Release host resources and stop for good. Safe to call repeatedly
    /// and from any state.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.release();
        self.state = SessionState::Terminated;
        info!("session terminated");
    }

    fn poll_readiness(&mut self) -> TickOutcome {
        if !self.host.subsystems_loaded() {
            self.waited_ticks = self.waited_ticks.saturating_add(1);
            if let Some(limit) = self.config.readiness_timeout_ticks {
                if self.waited_ticks >= limit {
                    error!("XR subsystem not loaded after {limit} ticks");
                    self.disable(DisableReason::ReadinessTimeout);
                    return TickOutcome::Idle;
                }
            }
            return TickOutcome::Waiting;
        }

        debug!("XR subsystem ready after {} ticks", self.waited_ticks);
        match self.activate() {
            Ok(()) => TickOutcome::Activated,
            Err(reason) => {
                self.disable(reason);
                TickOutcome::Idle
            }
        }
    }

    fn activate(&mut self) -> Result<(), DisableReason> {
        if !self.host.meshing_feature_enabled() {
            error!("meshing capability is not enabled on the host");
            return Err(DisableReason::MissingCapability);
        }

        self.host.bind_export_trigger().map_err(|e| {
            error!("cannot bind export trigger: {e}");
            DisableReason::MissingInputSource
        })?;
        self.trigger_bound = true;

        self.host.request_permission(Permission::SpatialMapping);
        self.permission = PermissionState::Pending;

        self.markers
            .create_detector(&self.config.detector)
            .map_err(|e| {
                error!("{e}");
                DisableReason::DetectorCreation
            })?;
        self.detector_created = true;

        self.state = SessionState::Active;
        info!(
            "session active ({:?} detector, profile {:?})",
            self.config.detector.marker_type, self.config.detector.profile
        );
        Ok(())
    }

    fn fuse_latest(&mut self) -> bool {
        let batch = self.markers.poll_batch();
        let changed = self.registry.fuse(&batch);
        if changed {
            self.rebuild_visuals();
        }
        changed
    }

    /// Tear down every visual and create one per record.
    fn rebuild_visuals(&mut self) {
        self.clear_visuals();
        for record in self.registry.records() {
            let handle = self.presenter.spawn(record, &visual_label(record));
            self.visuals.push(handle);
        }
        debug!("rebuilt {} marker visuals", self.visuals.len());
    }

    fn clear_visuals(&mut self) {
        for handle in self.visuals.drain(..) {
            self.presenter.despawn(handle);
        }
    }

    fn apply_mesh_settings(&mut self) {
        self.mesh.apply_query_settings(&self.config.mesh);
        self.mesh.destroy_all_meshes();
        // Restart acquisition so the new settings take effect.
        self.mesh.set_acquisition_enabled(false);
        self.mesh.set_acquisition_enabled(true);
    }

    fn disable(&mut self, reason: DisableReason) {
        self.release();
        self.state = SessionState::Disabled(reason);
        warn!("session disabled: {reason:?}");
    }

    fn release(&mut self) {
        if self.trigger_bound {
            self.host.unbind_export_trigger();
            self.trigger_bound = false;
        }
        self.clear_visuals();
        if self.detector_created {
            self.markers.destroy_all_detectors();
            self.detector_created = false;
        }
    }
}
