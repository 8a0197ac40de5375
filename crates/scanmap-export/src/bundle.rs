//! Reading bundles back and classifying partial ones.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use scanmap_core::MarkerRecord;

use crate::exporter::{artifact_path, Artifact};
use crate::markers::{MarkerList, MarkerListError};
use crate::stl::{StlError, StlMesh};

/// Presence of the two bundle files on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleStatus {
    Complete,
    /// Exactly one artifact is present; the snapshot must not be trusted.
    Incomplete { missing: Artifact },
    Missing,
}

impl BundleStatus {
    #[inline]
    pub fn is_complete(self) -> bool {
        self == BundleStatus::Complete
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BundleError {
    #[error("no snapshot bundle at {}", base.display())]
    NotFound { base: PathBuf },
    #[error("incomplete snapshot bundle at {}: {missing} artifact missing", base.display())]
    Incomplete { base: PathBuf, missing: Artifact },
    #[error("failed to read {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Stl(#[from] StlError),
    #[error(transparent)]
    Markers(#[from] MarkerListError),
}

/// A fully loaded, complete bundle.
#[derive(Clone, Debug)]
pub struct LoadedBundle {
    pub mesh: StlMesh,
    pub markers: Vec<MarkerRecord>,
}

/// Classify the bundle at `base` by which files exist.
pub fn bundle_status(base: impl AsRef<Path>) -> BundleStatus {
    let base = base.as_ref();
    let geometry = artifact_path(base, Artifact::Geometry).is_file();
    let markers = artifact_path(base, Artifact::Markers).is_file();
    match (geometry, markers) {
        (true, true) => BundleStatus::Complete,
        (true, false) => BundleStatus::Incomplete {
            missing: Artifact::Markers,
        },
        (false, true) => BundleStatus::Incomplete {
            missing: Artifact::Geometry,
        },
        (false, false) => BundleStatus::Missing,
    }
}

/// Load both artifacts; partial bundles are an error, never a success.
pub fn load_bundle(base: impl AsRef<Path>) -> Result<LoadedBundle, BundleError> {
    let base = base.as_ref();
    match bundle_status(base) {
        BundleStatus::Complete => {}
        BundleStatus::Incomplete { missing } => {
            return Err(BundleError::Incomplete {
                base: base.to_path_buf(),
                missing,
            })
        }
        BundleStatus::Missing => {
            return Err(BundleError::NotFound {
                base: base.to_path_buf(),
            })
        }
    }

    let geometry_path = artifact_path(base, Artifact::Geometry);
    let file = File::open(&geometry_path).map_err(|source| BundleError::Open {
        path: geometry_path.clone(),
        source,
    })?;
    let mesh = StlMesh::read_from(BufReader::new(file))?;
    let markers = MarkerList::load_json(artifact_path(base, Artifact::Markers))?.markers;

    Ok(LoadedBundle { mesh, markers })
}
