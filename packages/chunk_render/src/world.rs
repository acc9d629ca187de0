//! Interfaces through which the pipeline consumes the world and camera.

use crate::util_abort_handle::AbortHandle;
use mesh_data::MeshData;
use section_data::SectionPos;


/// World and camera state the scheduler queries when deciding what to mesh.
///
/// Implementations are read-only views; when one is backed by a lock, the
/// caller acquires that lock before calling into the scheduler, which takes
/// its own queue locks strictly inside it (world lock, then queue lock,
/// never the reverse).
pub trait WorldView {
    /// Whether the section currently exists in the world. A missing section
    /// is an ordinary answer, not an error; the world may evict sections at
    /// any time and the scheduler tolerates the miss.
    fn contains_section(&self, sc: SectionPos) -> bool;

    /// Whether the section and all face neighbors it shares geometry
    /// borders with are loaded, so a build would see complete data.
    fn neighbors_complete(&self, sc: SectionPos) -> bool;

    /// Frustum/occlusion test for the section, provided by the camera
    /// collaborator.
    fn is_visible(&self, sc: SectionPos) -> bool;
}

/// Builds the geometry of one section. Runs on mesh worker threads.
///
/// Implementations resolve the key to the section's current block and light
/// data themselves, each call anew; holding on to data across calls would
/// keep evicted sections alive. A missing section meshes to empty.
///
/// `aborted` should be checked at safe points in the build loop, returning
/// early with whatever is cheapest when it reports true; the result of an
/// aborted build is discarded. `AbortHandle::shield` covers short critical
/// sections that must not observe an interrupt midway.
pub trait MeshSection: Send + Sync + 'static {
    fn mesh_section(&self, sc: SectionPos, aborted: &AbortHandle) -> MeshData;
}
