use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use scanmap_core::{MarkerRecord, MeshSurface};
use serde::{Deserialize, Serialize};

use crate::markers::{MarkerList, MarkerListError};
use crate::stl::{StlError, StlMesh};

#[cfg(feature = "tracing")]
use tracing::instrument;

pub const DEFAULT_STL_HEADER: &str = "scanmap binary snapshot";

/// The two files of an export bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// `<base>.stl`
    Geometry,
    /// `<base>.json`
    Markers,
}

impl Artifact {
    pub fn extension(self) -> &'static str {
        match self {
            Artifact::Geometry => "stl",
            Artifact::Markers => "json",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Geometry => f.write_str("geometry"),
            Artifact::Markers => f.write_str("marker list"),
        }
    }
}

/// `<base>.<ext>`, appended rather than substituted so dotted base names
/// survive.
pub fn artifact_path(base: &Path, artifact: Artifact) -> PathBuf {
    let mut raw: OsString = base.as_os_str().to_owned();
    raw.push(".");
    raw.push(artifact.extension());
    PathBuf::from(raw)
}

/// Export failure; identifies the artifact that could not be written.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("failed to write {artifact} artifact {}", path.display())]
    Io {
        artifact: Artifact,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {artifact} artifact {}", path.display())]
    Encode {
        artifact: Artifact,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ExportError {
    pub fn artifact(&self) -> Artifact {
        match self {
            ExportError::Io { artifact, .. } | ExportError::Encode { artifact, .. } => *artifact,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ExportError::Io { path, .. } | ExportError::Encode { path, .. } => path,
        }
    }

    fn from_stl(path: PathBuf, err: StlError) -> Self {
        match err {
            StlError::Io(source) => ExportError::Io {
                artifact: Artifact::Geometry,
                path,
                source,
            },
            other => ExportError::Encode {
                artifact: Artifact::Geometry,
                path,
                source: Box::new(other),
            },
        }
    }

    fn from_markers(path: PathBuf, err: MarkerListError) -> Self {
        match err {
            MarkerListError::Io(source) => ExportError::Io {
                artifact: Artifact::Markers,
                path,
                source,
            },
            MarkerListError::Json(source) if source.is_io() => ExportError::Io {
                artifact: Artifact::Markers,
                path,
                source: source.into(),
            },
            MarkerListError::Json(source) => ExportError::Encode {
                artifact: Artifact::Markers,
                path,
                source: Box::new(source),
            },
        }
    }
}

/// Where and how snapshots are written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Base path; `.stl` and `.json` are appended.
    pub base_path: PathBuf,
    /// Text stored in the 80-byte STL header (truncated if longer).
    #[serde(default = "default_stl_header")]
    pub stl_header: String,
}

fn default_stl_header() -> String {
    DEFAULT_STL_HEADER.to_string()
}

impl ExportConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            stl_header: default_stl_header(),
        }
    }

    pub fn artifact_path(&self, artifact: Artifact) -> PathBuf {
        artifact_path(&self.base_path, artifact)
    }
}

/// Summary of a successful export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportReport {
    pub geometry_path: PathBuf,
    pub markers_path: PathBuf,
    pub surfaces: usize,
    pub triangles: usize,
    pub skipped_triangles: usize,
    pub markers: usize,
}

/// A mesh source whose live acquisition can be paused during an export.
pub trait LiveMesh {
    fn acquisition_enabled(&self) -> bool;
    fn set_acquisition_enabled(&mut self, enabled: bool);
    /// Surfaces currently held by the host.
    fn surfaces(&self) -> Vec<MeshSurface>;
}

/// Pauses acquisition while alive; restores the prior state on drop.
struct AcquisitionPause<'a, M: LiveMesh + ?Sized> {
    mesh: &'a mut M,
    resume: bool,
}

impl<'a, M: LiveMesh + ?Sized> AcquisitionPause<'a, M> {
    fn new(mesh: &'a mut M) -> Self {
        let resume = mesh.acquisition_enabled();
        if resume {
            mesh.set_acquisition_enabled(false);
        }
        Self { mesh, resume }
    }
}

impl<M: LiveMesh + ?Sized> Drop for AcquisitionPause<'_, M> {
    fn drop(&mut self) {
        if self.resume {
            self.mesh.set_acquisition_enabled(true);
        }
    }
}

/// Writes geometry + marker bundles.
#[derive(Clone, Debug)]
pub struct SnapshotExporter {
    config: ExportConfig,
}

impl SnapshotExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Pause `mesh`, export its surfaces together with `markers`, then
    /// restore acquisition regardless of the outcome.
    pub fn export_live<M: LiveMesh + ?Sized>(
        &self,
        mesh: &mut M,
        markers: &[MarkerRecord],
    ) -> Result<ExportReport, ExportError> {
        let pause = AcquisitionPause::new(mesh);
        let surfaces = pause.mesh.surfaces();
        self.export(&surfaces, markers)
    }

    /// Write `<base>.stl` and then `<base>.json`.
    ///
    /// A marker list left by an earlier export to the same base is removed
    /// first, and the new one is renamed into place only once fully
    /// written. Stops at the first failure: a geometry failure leaves no
    /// marker file, a marker failure leaves the geometry file behind. Either
    /// way readers see an incomplete bundle, never old markers next to new
    /// geometry.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, surfaces, markers),
            fields(surfaces = surfaces.len(), markers = markers.len())
        )
    )]
    pub fn export(
        &self,
        surfaces: &[MeshSurface],
        markers: &[MarkerRecord],
    ) -> Result<ExportReport, ExportError> {
        let geometry_path = self.config.artifact_path(Artifact::Geometry);
        let markers_path = self.config.artifact_path(Artifact::Markers);
        info!(
            "exporting {} surfaces and {} markers to {}",
            surfaces.len(),
            markers.len(),
            self.config.base_path.display()
        );

        let mut mesh = StlMesh::new(self.config.stl_header.clone());
        let mut skipped = 0;
        for surface in surfaces {
            skipped += mesh.append_surface(surface);
        }

        discard_stale_markers(&markers_path).inspect_err(|e| error!("{e}"))?;
        write_geometry(&mesh, &geometry_path).inspect_err(|e| error!("{e}"))?;
        write_markers(markers, &markers_path)
            .inspect_err(|e| error!("{e}; geometry artifact left without its marker list"))?;

        Ok(ExportReport {
            geometry_path,
            markers_path,
            surfaces: surfaces.len(),
            triangles: mesh.facet_count(),
            skipped_triangles: skipped,
            markers: markers.len(),
        })
    }
}

fn markers_io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        artifact: Artifact::Markers,
        path: path.to_path_buf(),
        source,
    }
}

/// Marker lists are written here first, then renamed over `<base>.json`.
fn staging_path(markers_path: &Path) -> PathBuf {
    let mut raw: OsString = markers_path.as_os_str().to_owned();
    raw.push(".partial");
    PathBuf::from(raw)
}

fn discard_stale_markers(path: &Path) -> Result<(), ExportError> {
    if !path.is_file() {
        return Ok(());
    }
    fs::remove_file(path).map_err(|source| markers_io_error(path, source))?;
    debug!("removed previous marker list {}", path.display());
    Ok(())
}

fn write_markers(markers: &[MarkerRecord], path: &Path) -> Result<(), ExportError> {
    let staging = staging_path(path);
    let result = MarkerList::new(markers.to_vec())
        .write_json(&staging)
        .map_err(|e| ExportError::from_markers(path.to_path_buf(), e))
        .and_then(|()| fs::rename(&staging, path).map_err(|source| markers_io_error(path, source)));
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

fn write_geometry(mesh: &StlMesh, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Io {
        artifact: Artifact::Geometry,
        path: path.to_path_buf(),
        source,
    })?;
    mesh.write_to(BufWriter::new(file))
        .map_err(|e| ExportError::from_stl(path.to_path_buf(), e))
}
