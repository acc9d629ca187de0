
use std::{
    panic::{
        AssertUnwindSafe,
        catch_unwind,
    },
    thread::{
        Builder,
        JoinHandle,
    },
};
use crossbeam_channel::{
    Sender,
    Receiver,
    unbounded,
};


/// Number of mesh worker threads to run: one fewer than the available
/// cores, further capped below the thread count of other pools sharing the
/// machine, and never less than one. The render/main thread always keeps a
/// core; the pool never shrinks to zero workers.
pub fn pool_size(available_cores: usize, other_pool_threads: usize) -> usize {
    available_cores.saturating_sub(1)
        .min(other_pool_threads.saturating_sub(1))
        .max(1)
}


type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded pool of mesh worker threads.
///
/// Jobs are picked up by whichever worker goes idle first. Worker bodies
/// catch panics, so a panicking job never takes down the pool; job-level
/// outcome reporting is layered above (see `mesher`).
#[derive(Debug)]
pub struct ThreadPool {
    send_job: Option<Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn a pool with the given number of worker threads.
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads >= 1, "mesh pool needs at least one worker");
        let (send_job, recv_job) = unbounded::<Job>();
        let threads = (0..num_threads)
            .map(|n| {
                let recv_job = recv_job.clone();
                Builder::new()
                    .name(format!("mesh-worker-{}", n))
                    .spawn(move || worker_body(recv_job))
                    .expect("unable to spawn mesh worker thread")
            })
            .collect();
        ThreadPool {
            send_job: Some(send_job),
            threads,
        }
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Hand a job to the pool. Never blocks.
    pub fn submit<F: FnOnce() + Send + 'static>(&self, job: F) {
        self.send_job.as_ref()
            .expect("submit after shutdown")
            .send(Box::new(job))
            .expect("mesh worker job channel disconnected");
    }

    /// Close the job channel and wait for all workers to finish their
    /// remaining jobs and exit. Idempotent; also runs on drop, so no job
    /// can outlive the pool's shared state.
    pub fn shutdown(&mut self) {
        drop(self.send_job.take());
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                error!("mesh worker thread panicked");
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_body(recv_job: Receiver<Job>) {
    while let Ok(job) = recv_job.recv() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("mesh worker job panicked past its own handler");
        }
    }
}


#[test]
fn test_pool_size_formula() {
    assert_eq!(pool_size(8, 8), 7);
    assert_eq!(pool_size(8, 4), 3);
    assert_eq!(pool_size(2, 8), 1);
    // structural floor of one worker, even on starved machines
    assert_eq!(pool_size(1, 8), 1);
    assert_eq!(pool_size(8, 1), 1);
    assert_eq!(pool_size(0, 0), 1);
}

#[test]
fn test_pool_runs_jobs_and_survives_panics() {
    use std::sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    };

    let mut pool = ThreadPool::new(2);
    let ran = Arc::new(AtomicUsize::new(0));
    pool.submit(|| panic!("exercising panic containment"));
    for _ in 0..8 {
        let ran = Arc::clone(&ran);
        pool.submit(move || { ran.fetch_add(1, Ordering::SeqCst); });
    }
    pool.shutdown();
    assert_eq!(ran.load(Ordering::SeqCst), 8);
}
