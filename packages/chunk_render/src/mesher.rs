
use crate::{
    cause::MeshingCause,
    thread_pool::ThreadPool,
    util_abort_handle::AbortHandle,
    world::MeshSection,
};
use mesh_data::MeshData;
use section_data::SectionPos;
use std::{
    collections::HashMap,
    panic::{
        AssertUnwindSafe,
        catch_unwind,
    },
    sync::Arc,
};
use parking_lot::Mutex;
use crossbeam_channel::{
    Sender,
    Receiver,
    unbounded,
};


/// Terminal outcome of one dispatched mesh build. Every accepted `submit`
/// produces exactly one of these.
#[derive(Debug)]
pub enum MeshResponse {
    /// The build completed and was not interrupted.
    Meshed {
        sc: SectionPos,
        cause: MeshingCause,
        mesh: MeshData,
    },
    /// The build was interrupted before or during execution. `requeue`
    /// carries whether any of the interrupts asked for a retry.
    Interrupted {
        sc: SectionPos,
        requeue: bool,
    },
    /// The build panicked. The worker survives; the section is retryable.
    Failed {
        sc: SectionPos,
    },
}

impl MeshResponse {
    pub fn sc(&self) -> SectionPos {
        match *self {
            MeshResponse::Meshed { sc, .. } => sc,
            MeshResponse::Interrupted { sc, .. } => sc,
            MeshResponse::Failed { sc } => sc,
        }
    }
}


/// Dispatches section mesh builds onto the worker pool.
///
/// Enforces that at most one build per section is in flight at a time, and
/// supports cooperatively interrupting in-flight builds. Finished geometry
/// flows back through an internal channel (workers write, the render thread
/// drains with `try_recv`), so retrieving results never touches the task
/// set's lock, let alone the scheduler's queue locks.
pub struct SectionMesher {
    pool: ThreadPool,
    in_flight: Arc<Mutex<HashMap<SectionPos, AbortHandle>>>,
    send_response: Sender<MeshResponse>,
    recv_response: Receiver<MeshResponse>,
    mesh: Arc<dyn MeshSection>,
}

impl SectionMesher {
    /// Construct with the given worker count (see `thread_pool::pool_size`)
    /// and mesh builder.
    pub fn new(num_threads: usize, mesh: Arc<dyn MeshSection>) -> Self {
        let (send_response, recv_response) = unbounded();
        SectionMesher {
            pool: ThreadPool::new(num_threads),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            send_response,
            recv_response,
            mesh,
        }
    }

    /// Dispatch a build for the given section, unless one is already in
    /// flight for it, in which case nothing happens and false is returned.
    pub fn submit(&self, sc: SectionPos, cause: MeshingCause) -> bool {
        let aborted = AbortHandle::new();
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains_key(&sc) {
                return false;
            }
            in_flight.insert(sc, aborted.clone());
        }

        let mesh = Arc::clone(&self.mesh);
        let in_flight = Arc::clone(&self.in_flight);
        let send_response = self.send_response.clone();
        self.pool.submit(move || {
            let response =
                if aborted.is_aborted() {
                    MeshResponse::Interrupted {
                        sc,
                        requeue: aborted.requeue_requested(),
                    }
                } else {
                    match catch_unwind(AssertUnwindSafe(|| mesh.mesh_section(sc, &aborted))) {
                        Ok(mesh) =>
                            if aborted.is_aborted() {
                                MeshResponse::Interrupted {
                                    sc,
                                    requeue: aborted.requeue_requested(),
                                }
                            } else {
                                MeshResponse::Meshed { sc, cause, mesh }
                            },
                        Err(_) => {
                            error!(?sc, "mesh build panicked");
                            MeshResponse::Failed { sc }
                        }
                    }
                };
            // release the key before publishing, so a drained response can
            // immediately resubmit
            in_flight.lock().remove(&sc);
            let _ = send_response.send(response);
        });
        true
    }

    /// Cooperatively interrupt the in-flight build for the given section,
    /// if any. Idempotent; a repeated interrupt of the same build changes
    /// nothing and can never double-requeue.
    pub fn interrupt(&self, sc: SectionPos, requeue: bool) -> bool {
        let in_flight = self.in_flight.lock();
        if let Some(aborted) = in_flight.get(&sc) {
            aborted.abort(requeue);
            true
        } else {
            false
        }
    }

    /// Interrupt every in-flight build whose section the predicate accepts.
    /// Returns how many builds were signalled.
    pub fn interrupt_where(
        &self,
        mut pred: impl FnMut(SectionPos) -> bool,
        requeue: bool,
    ) -> usize {
        let in_flight = self.in_flight.lock();
        let mut signalled = 0;
        for (&sc, aborted) in in_flight.iter() {
            if pred(sc) {
                aborted.abort(requeue);
                signalled += 1;
            }
        }
        signalled
    }

    /// Interrupt every in-flight build.
    pub fn interrupt_all(&self, requeue: bool) -> usize {
        self.interrupt_where(|_| true, requeue)
    }

    /// Drain one terminal response, if any is ready. Never blocks.
    pub fn try_recv(&self) -> Option<MeshResponse> {
        self.recv_response.try_recv().ok()
    }

    /// Whether a build for the given section is in flight.
    pub fn is_in_flight(&self, sc: SectionPos) -> bool {
        self.in_flight.lock().contains_key(&sc)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Worker slots not currently occupied by a build.
    pub fn free_capacity(&self) -> usize {
        self.pool.num_threads().saturating_sub(self.in_flight_count())
    }

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }

    /// Interrupt everything and wait for the workers to exit. After this
    /// returns no build touches shared state.
    pub fn shutdown(&mut self) {
        self.interrupt_all(false);
        self.pool.shutdown();
    }
}


#[cfg(test)]
mod test_support {
    use super::*;
    use std::time::{
        Duration,
        Instant,
    };

    /// Mesher double whose builds block until released through a channel.
    pub struct GatedMesher {
        pub started: Sender<SectionPos>,
        pub gate: Receiver<()>,
    }

    impl MeshSection for GatedMesher {
        fn mesh_section(&self, sc: SectionPos, _aborted: &AbortHandle) -> MeshData {
            let _ = self.started.send(sc);
            let _ = self.gate.recv_timeout(Duration::from_secs(10));
            MeshData::new()
        }
    }

    /// Mesher double that panics on sections below y 0.
    pub struct FaultyMesher;

    impl MeshSection for FaultyMesher {
        fn mesh_section(&self, sc: SectionPos, _aborted: &AbortHandle) -> MeshData {
            assert!(sc.sy >= 0, "no data below the world floor");
            MeshData::new()
        }
    }

    pub fn recv_blocking(mesher: &SectionMesher) -> MeshResponse {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(response) = mesher.try_recv() {
                return response;
            }
            assert!(Instant::now() < deadline, "timed out awaiting mesh response");
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

#[cfg(test)]
use self::test_support::*;
#[cfg(test)]
use section_data::sp;

#[test]
fn test_at_most_one_in_flight() {
    let (started_tx, started_rx) = unbounded();
    let (gate_tx, gate_rx) = unbounded();
    let mesher = SectionMesher::new(2, Arc::new(GatedMesher {
        started: started_tx,
        gate: gate_rx,
    }));

    let sc = sp(0, 0, 0);
    assert!(mesher.submit(sc, MeshingCause::Load));
    started_rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
    // the build is running, resubmits must refuse
    assert!(!mesher.submit(sc, MeshingCause::Load));
    assert!(mesher.is_in_flight(sc));
    assert_eq!(mesher.in_flight_count(), 1);
    assert_eq!(mesher.free_capacity(), 1);

    gate_tx.send(()).unwrap();
    let response = recv_blocking(&mesher);
    assert!(matches!(response, MeshResponse::Meshed { .. }));
    assert_eq!(response.sc(), sc);

    // once drained the key is free again
    assert!(mesher.submit(sc, MeshingCause::Load));
    gate_tx.send(()).unwrap();
    let response = recv_blocking(&mesher);
    assert!(matches!(response, MeshResponse::Meshed { .. }));
}

#[test]
fn test_interrupt_is_idempotent() {
    let (started_tx, started_rx) = unbounded();
    let (gate_tx, gate_rx) = unbounded();
    let mesher = SectionMesher::new(1, Arc::new(GatedMesher {
        started: started_tx,
        gate: gate_rx,
    }));

    let sc = sp(0, 0, 0);
    assert!(mesher.submit(sc, MeshingCause::Load));
    started_rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
    assert!(mesher.interrupt(sc, true));
    assert!(mesher.interrupt(sc, true));
    gate_tx.send(()).unwrap();

    // exactly one terminal response, no double-requeue
    let response = recv_blocking(&mesher);
    assert!(matches!(response, MeshResponse::Interrupted { requeue: true, .. }));
    assert!(mesher.try_recv().is_none());
    assert_eq!(mesher.in_flight_count(), 0);
    assert!(!mesher.interrupt(sc, true));
}

#[test]
fn test_interrupt_before_run_still_reports() {
    let (started_tx, started_rx) = unbounded();
    let (gate_tx, gate_rx) = unbounded();
    let mesher = SectionMesher::new(1, Arc::new(GatedMesher {
        started: started_tx,
        gate: gate_rx,
    }));

    // occupy the single worker, then queue a second build behind it
    let running = sp(0, 0, 0);
    let waiting = sp(1, 0, 0);
    assert!(mesher.submit(running, MeshingCause::Load));
    started_rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
    assert!(mesher.submit(waiting, MeshingCause::Load));
    assert!(mesher.interrupt(waiting, false));

    gate_tx.send(()).unwrap();
    gate_tx.send(()).unwrap();
    let first = recv_blocking(&mesher);
    assert_eq!(first.sc(), running);
    assert!(matches!(first, MeshResponse::Meshed { .. }));
    // the aborted build never ran its mesh fn but still reported back
    let second = recv_blocking(&mesher);
    assert_eq!(second.sc(), waiting);
    assert!(matches!(second, MeshResponse::Interrupted { requeue: false, .. }));
}

#[test]
fn test_panicking_build_fails_and_pool_survives() {
    let mesher = SectionMesher::new(1, Arc::new(FaultyMesher));

    assert!(mesher.submit(sp(0, -1, 0), MeshingCause::Load));
    let response = recv_blocking(&mesher);
    assert!(matches!(response, MeshResponse::Failed { .. }));
    assert_eq!(response.sc(), sp(0, -1, 0));

    // the pool keeps serving builds afterwards
    assert!(mesher.submit(sp(0, 1, 0), MeshingCause::Load));
    let response = recv_blocking(&mesher);
    assert!(matches!(response, MeshResponse::Meshed { .. }));
}

#[test]
fn test_interrupt_all_and_shutdown() {
    let (started_tx, started_rx) = unbounded();
    let (gate_tx, gate_rx) = unbounded();
    let mut mesher = SectionMesher::new(2, Arc::new(GatedMesher {
        started: started_tx,
        gate: gate_rx,
    }));

    assert!(mesher.submit(sp(0, 0, 0), MeshingCause::Load));
    assert!(mesher.submit(sp(1, 0, 0), MeshingCause::Load));
    started_rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
    started_rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
    assert_eq!(mesher.interrupt_all(false), 2);
    gate_tx.send(()).unwrap();
    gate_tx.send(()).unwrap();
    mesher.shutdown();
    assert_eq!(mesher.in_flight_count(), 0);
}
