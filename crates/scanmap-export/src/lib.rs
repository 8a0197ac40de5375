//! Snapshot export of a scanned environment.
//!
//! An export bundle is two files sharing a base path:
//! - `<base>.stl`: binary STL of every mesh surface, in world space, with
//!   normals recomputed from the current triangulation,
//! - `<base>.json`: `{"markers":[{"number","pose","reprojectionError"}]}`.
//!
//! Geometry is always written first. [`SnapshotExporter::export_live`] pauses
//! mesh acquisition on a [`LiveMesh`] for the whole export and restores it on
//! every exit path. A bundle with only one of its two files is incomplete;
//! [`bundle_status`] and [`load_bundle`] report it as such.

mod bundle;
mod exporter;
mod markers;
mod normals;
mod stl;

pub use bundle::{bundle_status, load_bundle, BundleError, BundleStatus, LoadedBundle};
pub use exporter::{
    artifact_path, Artifact, ExportConfig, ExportError, ExportReport, LiveMesh, SnapshotExporter,
    DEFAULT_STL_HEADER,
};
pub use markers::{MarkerList, MarkerListError};
pub use normals::{face_normal, vertex_normals};
pub use stl::{StlError, StlFacet, StlMesh, STL_FACET_BYTES, STL_HEADER_BYTES};
