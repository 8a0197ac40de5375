use std::cell::Cell;
use std::collections::VecDeque;
use std::path::Path;

use nalgebra::Point3;
use scanmap_core::{MarkerObservation, MarkerRecord, MeshSurface, Pose};
use scanmap_export::{bundle_status, load_bundle, Artifact, BundleStatus, LiveMesh};
use scanmap_session::{
    BindingError, DetectionSession, DisableReason, MarkerDetectorSettings, MarkerSource,
    MarkerType, MarkerVisuals, MeshQuerySettings, MeshSource, Permission, PermissionOutcome,
    PermissionState, SessionConfig, SessionError, SessionHost, SessionState, SourceError,
    TickOutcome, VisualHandle,
};

#[derive(Default)]
struct FakeMarkers {
    batches: VecDeque<Vec<MarkerObservation>>,
    created: Vec<MarkerDetectorSettings>,
    destroy_calls: usize,
    fail_create: bool,
}

impl MarkerSource for FakeMarkers {
    fn create_detector(&mut self, settings: &MarkerDetectorSettings) -> Result<(), SourceError> {
        if self.fail_create {
            return Err(SourceError::DetectorCreation("no marker feature".into()));
        }
        self.created.push(*settings);
        Ok(())
    }

    fn poll_batch(&mut self) -> Vec<MarkerObservation> {
        self.batches.pop_front().unwrap_or_default()
    }

    fn destroy_all_detectors(&mut self) {
        self.destroy_calls += 1;
    }
}

#[derive(Default)]
struct FakeMesh {
    enabled: bool,
    toggles: Vec<bool>,
    applied: Vec<MeshQuerySettings>,
    destroy_calls: usize,
    surfaces: Vec<MeshSurface>,
}

impl LiveMesh for FakeMesh {
    fn acquisition_enabled(&self) -> bool {
        self.enabled
    }

    fn set_acquisition_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.toggles.push(enabled);
    }

    fn surfaces(&self) -> Vec<MeshSurface> {
        self.surfaces.clone()
    }
}

impl MeshSource for FakeMesh {
    fn apply_query_settings(&mut self, settings: &MeshQuerySettings) {
        self.applied.push(*settings);
    }

    fn destroy_all_meshes(&mut self) {
        self.destroy_calls += 1;
    }
}

struct FakeHost {
    /// Number of unready polls before the subsystem reports loaded.
    loaded_after: Option<u32>,
    polls: Cell<u32>,
    meshing: bool,
    input: bool,
    bound: bool,
    bind_calls: usize,
    unbind_calls: usize,
    requested: Vec<Permission>,
}

impl FakeHost {
    fn ready_after(polls: u32) -> Self {
        Self {
            loaded_after: Some(polls),
            polls: Cell::new(0),
            meshing: true,
            input: true,
            bound: false,
            bind_calls: 0,
            unbind_calls: 0,
            requested: Vec::new(),
        }
    }

    fn never_ready() -> Self {
        Self {
            loaded_after: None,
            ..Self::ready_after(0)
        }
    }
}

impl SessionHost for FakeHost {
    fn subsystems_loaded(&self) -> bool {
        let polls = self.polls.get();
        self.polls.set(polls + 1);
        self.loaded_after.is_some_and(|n| polls >= n)
    }

    fn meshing_feature_enabled(&self) -> bool {
        self.meshing
    }

    fn bind_export_trigger(&mut self) -> Result<(), BindingError> {
        self.bind_calls += 1;
        if !self.input {
            return Err(BindingError::NoInputSource);
        }
        self.bound = true;
        Ok(())
    }

    fn unbind_export_trigger(&mut self) {
        self.unbind_calls += 1;
        self.bound = false;
    }

    fn request_permission(&mut self, permission: Permission) {
        self.requested.push(permission);
    }
}

#[derive(Default)]
struct FakeVisuals {
    next_id: u64,
    alive: Vec<(u64, String)>,
    despawned: usize,
}

impl MarkerVisuals for FakeVisuals {
    fn spawn(&mut self, record: &MarkerRecord, label: &str) -> VisualHandle {
        self.next_id += 1;
        self.alive.push((self.next_id, label.to_string()));
        VisualHandle {
            id: self.next_id,
            marker: record.number,
        }
    }

    fn despawn(&mut self, handle: VisualHandle) {
        self.alive.retain(|(id, _)| *id != handle.id);
        self.despawned += 1;
    }
}

type Session = DetectionSession<FakeMarkers, FakeMesh, FakeHost, FakeVisuals>;

fn config_at(base: &Path) -> SessionConfig {
    let mut cfg = SessionConfig::default();
    cfg.export.base_path = base.to_path_buf();
    cfg
}

fn session_with(cfg: SessionConfig, host: FakeHost) -> Session {
    let mesh = FakeMesh {
        enabled: true,
        ..FakeMesh::default()
    };
    DetectionSession::new(cfg, FakeMarkers::default(), mesh, host, FakeVisuals::default())
        .expect("session")
}

fn active_session(base: &Path) -> Session {
    let mut s = session_with(config_at(base), FakeHost::ready_after(0));
    s.start().expect("start");
    assert_eq!(s.tick(), TickOutcome::Activated);
    s
}

fn obs(number: u64, x: f32, y: f32, z: f32, err: f32) -> MarkerObservation {
    MarkerObservation::new(number, Pose::from_position(x, y, z), err)
}

#[test]
fn start_pauses_mesh_and_rejects_second_start() {
    let mut s = session_with(SessionConfig::default(), FakeHost::never_ready());
    assert_eq!(s.state(), SessionState::Uninitialized);
    s.start().expect("start");

    assert_eq!(s.state(), SessionState::WaitingForSubsystem);
    assert!(!s.mesh_source().enabled);
    assert!(matches!(
        s.start(),
        Err(SessionError::InvalidState {
            action: "start",
            ..
        })
    ));
}

#[test]
fn invalid_config_is_rejected_before_anything_runs() {
    let mut cfg = SessionConfig::default();
    cfg.mesh.density = -1.0;
    let res = DetectionSession::new(
        cfg,
        FakeMarkers::default(),
        FakeMesh::default(),
        FakeHost::ready_after(0),
        FakeVisuals::default(),
    );
    assert!(matches!(res, Err(SessionError::Config(_))));
}

#[test]
fn waits_for_subsystem_then_activates_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut s = session_with(config_at(&dir.path().join("snap")), FakeHost::ready_after(3));
    s.start().expect("start");

    for _ in 0..3 {
        assert_eq!(s.tick(), TickOutcome::Waiting);
        assert_eq!(s.state(), SessionState::WaitingForSubsystem);
    }
    assert_eq!(s.tick(), TickOutcome::Activated);
    assert_eq!(s.state(), SessionState::Active);

    let host = s.host();
    assert_eq!(host.bind_calls, 1);
    assert!(host.bound);
    assert_eq!(host.requested, vec![Permission::SpatialMapping]);
    assert_eq!(s.permission(), PermissionState::Pending);

    let created = &s.marker_source().created;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].marker_type, MarkerType::Aruco);
    assert!(created[0].estimate_length);

    // Mesh stays paused until the permission is granted.
    assert!(!s.mesh_source().enabled);
    assert_eq!(s.tick(), TickOutcome::Fused { changed: false });
    assert_eq!(s.marker_source().created.len(), 1);
}

#[test]
fn never_ready_host_waits_indefinitely_by_default() {
    let mut s = session_with(SessionConfig::default(), FakeHost::never_ready());
    s.start().expect("start");
    for _ in 0..1_000 {
        assert_eq!(s.tick(), TickOutcome::Waiting);
    }
    assert_eq!(s.state(), SessionState::WaitingForSubsystem);
}

#[test]
fn readiness_timeout_disables_when_configured() {
    let mut cfg = SessionConfig::default();
    cfg.readiness_timeout_ticks = Some(5);
    let mut s = session_with(cfg, FakeHost::never_ready());
    s.start().expect("start");

    for _ in 0..4 {
        assert_eq!(s.tick(), TickOutcome::Waiting);
    }
    assert_eq!(s.tick(), TickOutcome::Idle);
    assert_eq!(
        s.state(),
        SessionState::Disabled(DisableReason::ReadinessTimeout)
    );
    assert_eq!(s.tick(), TickOutcome::Idle);
}

#[test]
fn missing_capability_disables_without_binding() {
    let mut host = FakeHost::ready_after(0);
    host.meshing = false;
    let mut s = session_with(SessionConfig::default(), host);
    s.start().expect("start");

    assert_eq!(s.tick(), TickOutcome::Idle);
    assert_eq!(
        s.state(),
        SessionState::Disabled(DisableReason::MissingCapability)
    );
    assert_eq!(s.host().bind_calls, 0);
    assert!(s.marker_source().created.is_empty());
}

#[test]
fn missing_input_source_never_becomes_active() {
    let mut host = FakeHost::ready_after(0);
    host.input = false;
    let mut s = session_with(SessionConfig::default(), host);
    s.start().expect("start");
    s.tick();

    assert_eq!(
        s.state(),
        SessionState::Disabled(DisableReason::MissingInputSource)
    );
    assert!(s.host().requested.is_empty());
    assert!(s.marker_source().created.is_empty());
    assert_eq!(s.host().unbind_calls, 0);
}

#[test]
fn detector_failure_releases_the_trigger() {
    let mut s = session_with(SessionConfig::default(), FakeHost::ready_after(0));
    s.marker_source_mut().fail_create = true;
    s.start().expect("start");
    s.tick();

    assert_eq!(
        s.state(),
        SessionState::Disabled(DisableReason::DetectorCreation)
    );
    assert!(!s.host().bound);
    assert_eq!(s.marker_source().destroy_calls, 0);
}

#[test]
fn visuals_are_rebuilt_only_when_registry_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut s = active_session(&dir.path().join("snap"));

    s.marker_source_mut()
        .batches
        .push_back(vec![obs(7, 1.0, 2.0, 3.0, 0.02)]);
    assert_eq!(s.tick(), TickOutcome::Fused { changed: true });
    assert_eq!(s.visuals().len(), 1);
    assert_eq!(s.visuals()[0].marker, 7);
    assert_eq!(s.presenter().alive[0].1, "Marker:7\nError: 0.02");

    // Nearby, worse error: record replaced but no rebuild under the
    // reference change reporting.
    s.marker_source_mut()
        .batches
        .push_back(vec![obs(7, 1.0, 2.0, 3.005, 0.05)]);
    assert_eq!(s.tick(), TickOutcome::Fused { changed: false });
    assert_eq!(s.registry().get(7).expect("record").reprojection_error, 0.05);
    assert_eq!(s.presenter().despawned, 0);
    assert_eq!(s.presenter().alive[0].1, "Marker:7\nError: 0.02");

    // Placeholder pose: dropped.
    s.marker_source_mut()
        .batches
        .push_back(vec![obs(9, 0.0, 0.0, 0.0, 0.01)]);
    assert_eq!(s.tick(), TickOutcome::Fused { changed: false });
    assert_eq!(s.registry().len(), 1);

    s.marker_source_mut()
        .batches
        .push_back(vec![obs(9, 0.0, 1.0, 0.0, 0.01)]);
    assert_eq!(s.tick(), TickOutcome::Fused { changed: true });
    assert_eq!(s.visuals().len(), 2);
    assert_eq!(s.presenter().despawned, 1);
    assert_eq!(s.presenter().alive.len(), 2);
    assert_eq!(s.presenter().alive[0].1, "Marker:7\nError: 0.05");
}

#[test]
fn granted_permission_resumes_meshing_with_settings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cfg = config_at(&dir.path().join("snap"));
    cfg.mesh.density = 0.4;
    let mut s = session_with(cfg, FakeHost::ready_after(0));
    s.start().expect("start");
    s.tick();

    s.on_permission(PermissionOutcome::Granted(Permission::SpatialMapping));

    assert_eq!(s.permission(), PermissionState::Granted);
    assert_eq!(s.state(), SessionState::Active);
    let mesh = s.mesh_source();
    assert!(mesh.enabled);
    assert_eq!(mesh.applied.len(), 1);
    assert_eq!(mesh.applied[0].density, 0.4);
    assert_eq!(mesh.destroy_calls, 1);

    // A late duplicate answer is ignored.
    s.on_permission(PermissionOutcome::Denied(Permission::SpatialMapping));
    assert_eq!(s.state(), SessionState::Active);
}

#[test]
fn denied_permission_disables_session_for_good() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut s = active_session(&dir.path().join("snap"));
    s.marker_source_mut()
        .batches
        .push_back(vec![obs(1, 1.0, 1.0, 1.0, 0.01)]);
    s.tick();
    assert_eq!(s.visuals().len(), 1);

    s.on_permission(PermissionOutcome::Denied(Permission::SpatialMapping));

    assert_eq!(
        s.state(),
        SessionState::Disabled(DisableReason::PermissionDenied)
    );
    assert!(!s.host().bound);
    assert!(s.visuals().is_empty());
    assert_eq!(s.marker_source().destroy_calls, 1);
    assert_eq!(s.tick(), TickOutcome::Idle);
    assert!(matches!(
        s.on_export_trigger(),
        Err(SessionError::InvalidState {
            action: "export",
            ..
        })
    ));
    assert!(!dir.path().join("snap.stl").exists());
}

#[test]
fn export_trigger_writes_bundle_and_keeps_scanning() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = dir.path().join("room");
    let mut s = active_session(&base);
    s.on_permission(PermissionOutcome::Granted(Permission::SpatialMapping));
    s.marker_source_mut().batches.extend([
        vec![obs(4, 1.0, 0.0, 1.0, 0.02)],
        vec![obs(2, 0.0, 1.0, 1.0, 0.03)],
    ]);
    s.tick();
    s.tick();

    let report = s.on_export_trigger().expect("export");
    assert_eq!(report.markers, 2);
    assert_eq!(report.triangles, 0);
    assert_eq!(bundle_status(&base), BundleStatus::Complete);
    let bundle = load_bundle(&base).expect("bundle");
    let numbers: Vec<u64> = bundle.markers.iter().map(|m| m.number).collect();
    assert_eq!(numbers, vec![2, 4]);

    assert_eq!(s.state(), SessionState::Active);
    assert!(s.mesh_source().enabled);
    assert_eq!(s.tick(), TickOutcome::Fused { changed: false });
}

#[test]
fn export_failure_keeps_session_active_and_mesh_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = dir.path().join("missing-dir").join("room");
    let mut s = active_session(&base);
    s.on_permission(PermissionOutcome::Granted(Permission::SpatialMapping));
    s.marker_source_mut().batches.push_back(vec![obs(4, 1.0, 0.0, 1.0, 0.02)]);
    s.tick();

    let err = s.on_export_trigger().expect_err("export must fail");
    match err {
        SessionError::Export(e) => assert_eq!(e.artifact(), Artifact::Geometry),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(s.state(), SessionState::Active);
    assert!(s.mesh_source().enabled);
    let toggles = &s.mesh_source().toggles;
    assert_eq!(&toggles[toggles.len() - 2..], &[false, true]);
}

#[test]
fn export_before_permission_keeps_mesh_paused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = dir.path().join("early");
    let mut s = active_session(&base);
    s.mesh_source_mut().surfaces.push(MeshSurface::new(
        "floor",
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ],
        vec![[0, 1, 2]],
    ));
    let toggles_before = s.mesh_source().toggles.len();

    let report = s.on_export_trigger().expect("export");

    assert_eq!(report.triangles, 1);
    assert_eq!(report.markers, 0);
    assert!(!s.mesh_source().enabled);
    assert_eq!(s.mesh_source().toggles.len(), toggles_before);
}

#[test]
fn shutdown_is_idempotent_from_waiting() {
    let mut s = session_with(SessionConfig::default(), FakeHost::never_ready());
    s.start().expect("start");
    s.shutdown();
    s.shutdown();

    assert_eq!(s.state(), SessionState::Terminated);
    assert_eq!(s.host().unbind_calls, 0);
    assert_eq!(s.marker_source().destroy_calls, 0);
    assert_eq!(s.tick(), TickOutcome::Idle);
}

#[test]
fn shutdown_releases_active_resources_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut s = active_session(&dir.path().join("snap"));
    s.marker_source_mut().batches.push_back(vec![
        obs(1, 1.0, 0.0, 0.0, 0.01),
        obs(2, 2.0, 0.0, 0.0, 0.01),
    ]);
    s.tick();
    assert_eq!(s.presenter().alive.len(), 2);

    s.shutdown();
    s.shutdown();

    assert_eq!(s.state(), SessionState::Terminated);
    assert_eq!(s.host().unbind_calls, 1);
    assert!(!s.host().bound);
    assert!(s.presenter().alive.is_empty());
    assert!(s.visuals().is_empty());
    assert_eq!(s.marker_source().destroy_calls, 1);
    assert!(matches!(
        s.on_export_trigger(),
        Err(SessionError::InvalidState { .. })
    ));
}
