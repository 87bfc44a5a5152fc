use std::{
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool for network-bound work: catalog fetches, package
/// downloads, release queries. Jobs queue on a shared channel and run on
/// whichever worker frees up first, so concurrency stays bounded no matter
/// how fast callers submit.
pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..size.max(1))
            .map(|index| {
                let rx = Arc::clone(&rx);
                thread::Builder::new()
                    .name(format!("tacklebox-worker-{index}"))
                    .spawn(move || worker_loop(rx))
                    .expect("spawn worker thread")
            })
            .collect();
        Self {
            tx: Some(tx),
            handles,
        }
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Box::new(job));
        }
    }
}

fn worker_loop(rx: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let guard = match rx.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            guard.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => {
                debug!("worker channel closed, exiting");
                return;
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_all_submitted_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(3);
            for _ in 0..20 {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
            // pool drop joins the workers
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }
}
