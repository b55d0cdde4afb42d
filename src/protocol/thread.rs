use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, mpsc},
    thread,
};

use log::{debug, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of threads, each running one job at a time.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Job>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let mut workers = Vec::with_capacity(size);
        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));

        for id in 0..size {
            workers.push(Worker::new(id, Arc::clone(&receiver)));
        }

        Self {
            workers,
            sender: Some(sender),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a job; it runs once a worker is free.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let queued = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(Box::new(f)).is_ok());
        if !queued {
            warn!("worker pool is shut down; dropping job");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            debug!("shutting down worker {}", worker.id);
            if worker.thread.join().is_err() {
                warn!("worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Self {
        let thread = thread::spawn(move || {
            loop {
                // The lock guard is released before the job runs.
                let job = match receiver.lock() {
                    Ok(receiver) => receiver.recv(),
                    Err(_) => break,
                };
                match job {
                    Ok(job) => {
                        debug!("worker {id} running a job");
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            warn!("job on worker {id} panicked");
                        }
                    }
                    Err(_) => {
                        debug!("worker {id} disconnected");
                        break;
                    }
                }
            }
        });

        Self { id, thread }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn runs_every_job_before_shutdown() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(3);
        assert_eq!(pool.size(), 3);

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool);

        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn worker_survives_panicking_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(1);

        pool.execute(|| panic!("job failed"));
        let after = Arc::clone(&counter);
        pool.execute(move || {
            after.fetch_add(1, Ordering::SeqCst);
        });
        drop(pool);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_size_gets_one_worker() {
        assert_eq!(WorkerPool::new(0).size(), 1);
    }
}
