
use crate::{
    cause::MeshingCause,
    mesher::{
        MeshResponse,
        SectionMesher,
    },
    queue::{
        ActiveQueue,
        CulledQueue,
        QueueComparator,
    },
    settings::Settings,
    thread_pool::pool_size,
    visibility::VisibilitySet,
    world::{
        MeshSection,
        WorldView,
    },
};
use mesh_data::MeshData;
use section_data::{
    SectionPos,
    sp,
};
use std::{
    collections::HashSet,
    sync::Arc,
};
use parking_lot::Mutex;
use vek::*;


/// Finished geometry for one section, ready for the GPU-upload stage.
#[derive(Debug, Clone)]
pub struct MeshedSection {
    pub sc: SectionPos,
    pub mesh: MeshData,
}

// scheduling state, all guarded by the one queue lock so the membership
// invariant (a key is in at most one of active queue / culled queue) can
// never be observed torn
#[derive(Debug)]
struct SchedState {
    active: ActiveQueue,
    culled: CulledQueue,
    comparator: QueueComparator,
    visibility: VisibilitySet,
    meshed: HashSet<SectionPos>,
}

/// Coordinator of the chunk meshing pipeline.
///
/// Owns the visibility window, the active and culled queues, and the worker
/// pool, and exposes the queue/invalidate/frame surface the rest of the
/// engine drives. One render thread calls `frame` and `update_camera`;
/// `try_queue` and the load/unload notifications may come from any thread
/// and never block on in-flight work.
///
/// Lock order: callers synchronize their world state before calling in (the
/// `WorldView` they pass is a pre-locked view), the scheduler's queue lock
/// nests inside that, and the mesher's task-set lock is never held together
/// with the queue lock.
pub struct ChunkRenderer {
    state: Mutex<SchedState>,
    mesher: SectionMesher,
    disable_culling: bool,
    results_per_frame: usize,
    culled_promotions_per_frame: usize,
}

impl ChunkRenderer {
    pub fn new(settings: &Settings, mesh: Arc<dyn MeshSection>) -> Self {
        let cores = num_cpus::get();
        let num_threads = settings.mesh_workers
            .unwrap_or_else(|| pool_size(
                cores,
                settings.other_pool_threads.unwrap_or(cores),
            ))
            .max(1);
        info!(num_threads, "starting mesh worker pool");
        ChunkRenderer {
            state: Mutex::new(SchedState {
                active: ActiveQueue::new(),
                culled: CulledQueue::new(),
                comparator: QueueComparator::new(Vec3::zero()),
                visibility: VisibilitySet::new(
                    sp(0, 0, 0),
                    settings.view_radius,
                    settings.view_radius_vertical,
                ),
                meshed: HashSet::new(),
            }),
            mesher: SectionMesher::new(num_threads, mesh),
            disable_culling: settings.disable_culling,
            results_per_frame: settings.results_per_frame,
            culled_promotions_per_frame: settings.culled_promotions_per_frame,
        }
    }

    /// Make the section eligible for (re)meshing, or upgrade the cause of
    /// already pending work for it. Never blocks.
    ///
    /// Invisible sections are parked in the culled queue until the camera
    /// can see them, unless `ignore_visibility` (or the culling debug
    /// toggle) bypasses that. Unloaded sections are refused unless
    /// `ignore_loaded`. Returns whether the section is now queued.
    pub fn try_queue(
        &self,
        sc: SectionPos,
        cause: MeshingCause,
        world: &dyn WorldView,
        ignore_loaded: bool,
        ignore_visibility: bool,
    ) -> bool {
        if self.mesher.is_in_flight(sc) {
            // the running build is already stale; ask it to retry instead
            // of queueing a second entry for the key
            self.mesher.interrupt(sc, true);
            return false;
        }
        if !ignore_loaded && !world.contains_section(sc) {
            return false;
        }
        let mut state = self.state.lock();
        let visible = self.disable_culling
            || ignore_visibility
            || (state.visibility.contains(sc) && world.is_visible(sc));
        if visible {
            let cause = match state.culled.remove(sc) {
                Some(stored) if stored.upgrades(cause) => stored,
                _ => cause,
            };
            state.active.queue(sc, cause);
        } else {
            let cause = match state.active.remove(sc) {
                Some(stored) if stored.upgrades(cause) => stored,
                _ => cause,
            };
            state.culled.queue(sc, cause);
        }
        true
    }

    /// Queue at the explicit-invalidation tier, superseding any pending
    /// lower-priority entry for the section.
    pub fn invalidate(&self, sc: SectionPos, world: &dyn WorldView) -> bool {
        self.try_queue(sc, MeshingCause::ExplicitInvalidate, world, false, false)
    }

    /// Per-tick pump, render thread only.
    ///
    /// Drains a bounded number of finished builds and returns them for
    /// upload, promotes a bounded number of culled sections that became
    /// schedulable, and dispatches the most urgent pending work up to the
    /// pool's free capacity.
    pub fn frame(&self, world: &dyn WorldView) -> Vec<MeshedSection> {
        let mut delivered = Vec::new();

        // finished builds, bounded to keep frame time flat
        for _ in 0..self.results_per_frame {
            let Some(response) = self.mesher.try_recv() else { break };
            match response {
                MeshResponse::Meshed { sc, cause, mesh } => {
                    if !world.contains_section(sc) {
                        // unloaded while the build raced to the finish
                        continue;
                    }
                    self.state.lock().meshed.insert(sc);
                    trace!(?sc, ?cause, "section meshed");
                    delivered.push(MeshedSection { sc, mesh });
                }
                MeshResponse::Interrupted { sc, requeue } => {
                    if requeue {
                        self.try_queue(
                            sc,
                            MeshingCause::ExplicitInvalidate,
                            world,
                            false,
                            false,
                        );
                    }
                }
                MeshResponse::Failed { sc } => {
                    warn!(?sc, "mesh build failed, retrying at low priority");
                    self.try_queue(sc, MeshingCause::Culled, world, false, false);
                }
            }
        }

        // opportunistically promote culled sections that became schedulable
        {
            let mut state = self.state.lock();
            let state = &mut *state;
            let visibility = &state.visibility;
            let disable_culling = self.disable_culling;
            let promoted = state.culled.collect(
                self.culled_promotions_per_frame,
                |sc| {
                    (disable_culling
                        || (visibility.contains(sc) && world.is_visible(sc)))
                        && world.contains_section(sc)
                        && world.neighbors_complete(sc)
                },
            );
            for item in promoted {
                state.active.queue(item.sc, item.cause);
            }
        }

        // dispatch the most urgent work onto free worker slots
        let capacity = self.mesher.free_capacity();
        if capacity > 0 {
            let batch = {
                let mut state = self.state.lock();
                let state = &mut *state;
                state.active.drain_best(capacity, &state.comparator)
            };
            for item in batch {
                if !world.contains_section(item.sc) {
                    // evicted while pending, tolerated
                    continue;
                }
                if !world.neighbors_complete(item.sc) {
                    // not meshable yet, park it for a later collect
                    self.state.lock().culled.queue(item.sc, item.cause);
                    continue;
                }
                if !self.mesher.submit(item.sc, item.cause) {
                    // lost a race against an out-of-band queue of a key
                    // that went in flight; that build is stale, retry it
                    self.mesher.interrupt(item.sc, true);
                }
            }
        }

        delivered
    }

    /// Report camera movement: reorders pending work around the new
    /// reference point, recenters the visibility window onto the camera's
    /// section, and demotes pending work that fell out of view. Builds
    /// already in flight for now-invisible sections are left to finish; a
    /// slightly stale mesh beats a hole.
    pub fn update_camera(&self, pos: Vec3<f64>, world: &dyn WorldView) {
        let mut state = self.state.lock();
        state.comparator.update_reference(pos);
        let origin = SectionPos::of_block(pos.map(|n| n.floor() as i64));
        if origin != state.visibility.origin() {
            debug!(?origin, "recentering visibility window");
            state.visibility.recenter(origin);
        }
        if self.disable_culling {
            return;
        }
        let state = &mut *state;
        let visibility = &state.visibility;
        let demoted = state.active.drain_where(|item| {
            !(visibility.contains(item.sc) && world.is_visible(item.sc))
        });
        for item in demoted {
            state.culled.queue(item.sc, item.cause);
        }
    }

    /// Report that a section's data became available. Until this, the
    /// section is treated as invisible no matter what the frustum says.
    pub fn section_loaded(&self, sc: SectionPos) {
        self.state.lock().visibility.insert(sc);
    }

    /// Report that a section's data went away. Forgets all pending work for
    /// it and interrupts any in-flight build without retry.
    pub fn section_unloaded(&self, sc: SectionPos) {
        {
            let mut state = self.state.lock();
            state.visibility.remove(sc);
            state.active.remove(sc);
            state.culled.remove(sc);
            state.meshed.remove(&sc);
        }
        self.mesher.interrupt(sc, false);
    }

    /// Sections awaiting meshing: queued anywhere or in flight.
    pub fn pending_count(&self) -> usize {
        let queued = {
            let state = self.state.lock();
            state.active.len() + state.culled.len()
        };
        queued + self.mesher.in_flight_count()
    }

    /// Sections whose current geometry has been delivered.
    pub fn loaded_count(&self) -> usize {
        self.state.lock().meshed.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.mesher.in_flight_count()
    }

    /// Interrupt all in-flight work and wait for the workers to exit.
    pub fn shutdown(&mut self) {
        self.mesher.shutdown();
    }
}


#[cfg(test)]
mod test_support {
    use super::*;
    use crate::util_abort_handle::AbortHandle;
    use section_data::{
        LoadedSections,
        PerSection,
    };
    use std::time::{
        Duration,
        Instant,
    };

    /// World double backed by the real loaded-section index, with a per
    /// section color payload the test mesher resolves through keys.
    pub struct TestWorld {
        pub sections: Mutex<LoadedSections>,
        pub colors: Mutex<PerSection<u8>>,
        pub visible: Mutex<HashSet<SectionPos>>,
        /// pretend every loaded section has complete neighbor data
        pub assume_complete: bool,
    }

    impl TestWorld {
        pub fn new(assume_complete: bool) -> Self {
            TestWorld {
                sections: Mutex::new(LoadedSections::new()),
                colors: Mutex::new(PerSection::new()),
                visible: Mutex::new(HashSet::new()),
                assume_complete,
            }
        }

        pub fn load(&self, renderer: &ChunkRenderer, sc: SectionPos, color: u8) {
            let si = self.sections.lock().add(sc);
            self.colors.lock().add(sc, si, color);
            renderer.section_loaded(sc);
        }

        pub fn unload(&self, renderer: &ChunkRenderer, sc: SectionPos) {
            let si = self.sections.lock().remove(sc);
            self.colors.lock().remove(sc, si);
            renderer.section_unloaded(sc);
        }

        pub fn set_visible(&self, sc: SectionPos, visible: bool) {
            if visible {
                self.visible.lock().insert(sc);
            } else {
                self.visible.lock().remove(&sc);
            }
        }

        pub fn color(&self, sc: SectionPos) -> Option<u8> {
            let sections = self.sections.lock();
            let si = sections.getter().get(sc)?;
            Some(*self.colors.lock().get(sc, si))
        }
    }

    impl WorldView for TestWorld {
        fn contains_section(&self, sc: SectionPos) -> bool {
            self.sections.lock().contains(sc)
        }

        fn neighbors_complete(&self, sc: SectionPos) -> bool {
            let sections = self.sections.lock();
            if self.assume_complete {
                sections.contains(sc)
            } else {
                sections.neighbors_complete(sc)
            }
        }

        fn is_visible(&self, sc: SectionPos) -> bool {
            self.visible.lock().contains(&sc)
        }
    }

    /// Mesh builder double: re-resolves the key against current world state
    /// each call and emits one quad shaded by the section's color.
    pub struct TestMesher {
        pub world: Arc<TestWorld>,
        pub built: Mutex<Vec<SectionPos>>,
    }

    impl MeshSection for TestMesher {
        fn mesh_section(&self, sc: SectionPos, aborted: &AbortHandle) -> MeshData {
            self.built.lock().push(sc);
            let mut mesh = MeshData::new();
            if aborted.is_aborted() {
                return mesh;
            }
            if let Some(color) = self.world.color(sc) {
                let shade = color as f32 / 255.0;
                mesh.add_quad(&mesh_data::Quad {
                    pos_start: Vec3::new(0.0, 0.0, 0.0),
                    pos_ext_1: Extent3::new(0.0, 1.0, 0.0),
                    pos_ext_2: Extent3::new(1.0, 0.0, 0.0),
                    tex_start: Vec2::zero(),
                    tex_extent: Extent2::new(1.0, 1.0),
                    vert_colors: [Rgba::new(shade, shade, shade, 1.0); 4],
                    tex_index: 0,
                });
            }
            mesh
        }
    }

    pub fn test_renderer(world: &Arc<TestWorld>, workers: usize) -> ChunkRenderer {
        let settings = Settings {
            mesh_workers: Some(workers),
            ..Default::default()
        };
        ChunkRenderer::new(&settings, Arc::new(TestMesher {
            world: Arc::clone(world),
            built: Mutex::new(Vec::new()),
        }))
    }

    /// Pump frames until the expected number of meshes is delivered and
    /// nothing is pending, panicking on timeout.
    pub fn drive(
        renderer: &ChunkRenderer,
        world: &TestWorld,
        expect: usize,
    ) -> Vec<MeshedSection> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut delivered = Vec::new();
        while delivered.len() < expect || renderer.pending_count() > 0 {
            delivered.extend(renderer.frame(world));
            assert!(
                Instant::now() < deadline,
                "timed out driving renderer, delivered {} of {}",
                delivered.len(),
                expect,
            );
            std::thread::sleep(Duration::from_millis(2));
        }
        delivered
    }

    /// Pump a fixed number of frames, for asserting that nothing happens.
    pub fn run_frames(
        renderer: &ChunkRenderer,
        world: &TestWorld,
        frames: usize,
    ) -> Vec<MeshedSection> {
        let mut delivered = Vec::new();
        for _ in 0..frames {
            delivered.extend(renderer.frame(world));
            std::thread::sleep(Duration::from_millis(2));
        }
        delivered
    }
}

#[cfg(test)]
use self::test_support::*;

#[test]
fn test_round_trip_coalesces_queued_causes() {
    let world = Arc::new(TestWorld::new(true));
    let mut renderer = test_renderer(&world, 2);
    let a = sp(0, 0, 0);
    world.load(&renderer, a, 200);
    world.set_visible(a, true);

    assert!(renderer.try_queue(a, MeshingCause::BlockChange, &*world, false, false));
    assert!(renderer.invalidate(a, &*world));
    assert!(renderer.try_queue(a, MeshingCause::NeighborChange, &*world, false, false));
    assert_eq!(renderer.pending_count(), 1);

    let delivered = drive(&renderer, &world, 1);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].sc, a);
    assert!(!delivered[0].mesh.is_empty());
    assert_eq!(renderer.pending_count(), 0);
    assert_eq!(renderer.loaded_count(), 1);

    renderer.shutdown();
    assert_eq!(renderer.in_flight_count(), 0);
}

#[test]
fn test_two_sections_ignore_visibility_scenario() {
    let world = Arc::new(TestWorld::new(true));
    let renderer = test_renderer(&world, 2);
    let a = sp(0, 0, 0);
    let b = sp(0, 1, 0);
    world.load(&renderer, a, 10);
    world.load(&renderer, b, 20);
    // nothing is frustum-visible, but visibility is bypassed

    assert!(renderer.try_queue(a, MeshingCause::Load, &*world, false, true));
    assert!(renderer.try_queue(b, MeshingCause::Load, &*world, false, true));

    let mut delivered = drive(&renderer, &world, 2);
    delivered.sort_by_key(|meshed| meshed.sc);
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].sc, a);
    assert_eq!(delivered[1].sc, b);
    assert_eq!(renderer.pending_count(), 0);
    assert_eq!(renderer.loaded_count(), 2);
}

#[test]
fn test_invisible_section_parks_then_promotes_exactly_once() {
    let world = Arc::new(TestWorld::new(true));
    let renderer = test_renderer(&world, 2);
    let a = sp(2, 0, 0);
    world.load(&renderer, a, 50);

    // queued while invisible: parked in the culled queue, never dispatched
    assert!(renderer.try_queue(a, MeshingCause::BlockChange, &*world, false, false));
    assert_eq!(renderer.pending_count(), 1);
    assert!(run_frames(&renderer, &world, 10).is_empty());
    assert_eq!(renderer.pending_count(), 1);

    // once visible it migrates to the active queue and meshes exactly once
    world.set_visible(a, true);
    let delivered = drive(&renderer, &world, 1);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].sc, a);
    assert_eq!(renderer.pending_count(), 0);
}

#[test]
fn test_unload_forgets_pending_work() {
    let world = Arc::new(TestWorld::new(true));
    let renderer = test_renderer(&world, 2);
    let a = sp(0, 0, 0);
    world.load(&renderer, a, 1);
    world.set_visible(a, true);

    assert!(renderer.try_queue(a, MeshingCause::BlockChange, &*world, false, false));
    world.unload(&renderer, a);
    assert_eq!(renderer.pending_count(), 0);
    assert!(run_frames(&renderer, &world, 5).is_empty());
    assert_eq!(renderer.loaded_count(), 0);
}

#[test]
fn test_neighbor_incomplete_parks_until_ready() {
    let world = Arc::new(TestWorld::new(false));
    let renderer = test_renderer(&world, 2);
    let a = sp(0, 0, 0);
    world.load(&renderer, a, 99);
    world.set_visible(a, true);

    // visible but neighbors missing: dispatch parks it rather than meshing
    assert!(renderer.try_queue(a, MeshingCause::Load, &*world, false, false));
    assert!(run_frames(&renderer, &world, 10).is_empty());
    assert_eq!(renderer.pending_count(), 1);

    for neighbor in a.face_neighbors() {
        world.load(&renderer, neighbor, 0);
    }
    let delivered = drive(&renderer, &world, 1);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].sc, a);
}

#[test]
fn test_camera_move_demotes_now_invisible_work() {
    let world = Arc::new(TestWorld::new(true));
    let renderer = test_renderer(&world, 2);
    let a = sp(3, 0, 0);
    world.load(&renderer, a, 5);
    world.set_visible(a, true);

    assert!(renderer.try_queue(a, MeshingCause::LodUpdate, &*world, false, false));
    world.set_visible(a, false);
    renderer.update_camera(Vec3::new(8.0, 8.0, 8.0), &*world);

    // demoted, not dropped
    assert_eq!(renderer.pending_count(), 1);
    assert!(run_frames(&renderer, &world, 5).is_empty());

    world.set_visible(a, true);
    let delivered = drive(&renderer, &world, 1);
    assert_eq!(delivered.len(), 1);
}

#[test]
fn test_mesh_resolves_world_data_through_key() {
    let world = Arc::new(TestWorld::new(true));
    let renderer = test_renderer(&world, 1);
    let a = sp(1, 2, 3);
    world.load(&renderer, a, 255);
    world.set_visible(a, true);

    assert!(renderer.try_queue(a, MeshingCause::Load, &*world, false, false));
    let delivered = drive(&renderer, &world, 1);
    let mesh = &delivered[0].mesh;
    mesh.validate_indices();
    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.vertices[0].color, Rgba::new(1.0, 1.0, 1.0, 1.0));
}

#[test]
fn test_queue_unloaded_section_refused_unless_overridden() {
    let world = Arc::new(TestWorld::new(true));
    let renderer = test_renderer(&world, 1);
    let ghost = sp(7, 0, 7);

    assert!(!renderer.try_queue(ghost, MeshingCause::Load, &*world, false, false));
    assert_eq!(renderer.pending_count(), 0);

    // admission can be overridden, but dispatch still drops the miss
    assert!(renderer.try_queue(ghost, MeshingCause::Load, &*world, true, true));
    assert_eq!(renderer.pending_count(), 1);
    run_frames(&renderer, &world, 5);
    assert_eq!(renderer.pending_count(), 0);
    assert_eq!(renderer.loaded_count(), 0);
}
