use std::marker::PhantomData;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::debug_print;

/// Per-worker state handed to every task: the worker's index and a PRNG
/// seeded from the process seed plus that index. Reproducibility therefore
/// depends on running with the same worker count.
pub struct TaskContext {
    pub worker_index: usize,
    pub rng: StdRng,
}

type Job = Box<dyn FnOnce(&mut TaskContext) + Send>;

/// A submit-and-future worker pool.
///
/// Tasks are fire-and-forget closures; `submit` returns a handle to wait on,
/// `scope` joins every task before returning so tasks may borrow from the
/// caller's stack. There is no cooperative suspension; tasks run to
/// completion on one of the workers.
pub struct TaskPool {
    workers: Vec<JoinHandle<()>>,
    sender: Option<Sender<Job>>,
    n_workers: usize,
}

impl TaskPool {
    pub fn new(n_workers: usize, seed: u64) -> Self {
        let n_workers = n_workers.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(n_workers);

        for worker_index in 0..n_workers {
            let receiver: Receiver<Job> = receiver.clone();

            workers.push(std::thread::spawn(move || {
                let mut context = TaskContext {
                    worker_index,
                    rng: StdRng::seed_from_u64(seed.wrapping_add(worker_index as u64)),
                };

                while let Ok(job) = receiver.recv() {
                    // A panicking task must not take the worker down; the
                    // scope that submitted it re-raises on join.
                    let _ = panic::catch_unwind(AssertUnwindSafe(|| job(&mut context)));
                }
            }));
        }

        Self {
            workers,
            sender: Some(sender),
            n_workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.n_workers
    }

    /// The number of contiguous ranges parallel sections split into.
    pub fn granularity(&self) -> usize {
        4 * self.n_workers
    }

    /// Submits a `'static` task and returns a handle for its result.
    pub fn submit<R, F>(&self, task: F) -> TaskHandle<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut TaskContext) -> R + Send + 'static,
    {
        let (result_sender, result_receiver) = bounded(1);

        let job: Job = Box::new(move |context| {
            let _ = result_sender.send(task(context));
        });

        if let Some(sender) = &self.sender {
            let _ = sender.send(job);
        }

        TaskHandle {
            receiver: result_receiver,
        }
    }

    /// Runs `f` with a [`Scope`] through which tasks borrowing from the
    /// caller's stack can be submitted. Every submitted task has finished by
    /// the time `scope` returns; if any of them panicked, the panic is
    /// raised here.
    pub fn scope<'env, F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Scope<'_, 'env>) -> R,
    {
        let latch = Arc::new(Latch::default());
        let scope = Scope {
            pool: self,
            latch: Arc::clone(&latch),
            _env: PhantomData,
        };

        let result = f(&scope);

        latch.wait();

        if latch.panicked() {
            panic!("a task submitted to the scope panicked");
        }

        result
    }

    /// Drains outstanding tasks and joins the workers. Called on drop;
    /// submitting after `stop` is a no-op whose handles never resolve.
    pub fn stop(&mut self) {
        self.sender.take();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }

        debug_print!("task pool stopped");
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A future for the result of a task submitted with [`TaskPool::submit`].
pub struct TaskHandle<R> {
    receiver: Receiver<R>,
}

impl<R> TaskHandle<R> {
    /// Blocks until the task has run.
    ///
    /// Panics if the task was dropped without running (pool stopped) or
    /// panicked itself.
    pub fn wait(self) -> R {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => panic!("task did not complete; the pool was stopped or the task panicked"),
        }
    }
}

/// Scoped task submission; see [`TaskPool::scope`].
pub struct Scope<'pool, 'env> {
    pool: &'pool TaskPool,
    latch: Arc<Latch>,
    _env: PhantomData<&'env mut &'env ()>,
}

impl<'pool, 'env> Scope<'pool, 'env> {
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce(&mut TaskContext) + Send + 'env,
    {
        self.latch.add();

        let latch = Arc::clone(&self.latch);

        let job: Box<dyn FnOnce(&mut TaskContext) + Send + 'env> = Box::new(move |context| {
            let guard = CompletionGuard {
                latch,
                completed: false,
            };

            task(context);

            guard.complete();
        });

        // The closing `latch.wait()` in `scope` keeps every borrow in `task`
        // alive until the task has run, so erasing the lifetime is sound.
        let job: Job = unsafe { mem::transmute(job) };

        if let Some(sender) = &self.pool.sender {
            let _ = sender.send(job);
        }
    }
}

struct CompletionGuard {
    latch: Arc<Latch>,
    completed: bool,
}

impl CompletionGuard {
    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        // Reached on unwind as well, so a panicking task still releases the
        // scope instead of deadlocking it.
        self.latch.done(!self.completed);
    }
}

#[derive(Default)]
struct Latch {
    state: Mutex<LatchState>,
    condvar: Condvar,
}

#[derive(Default)]
struct LatchState {
    pending: usize,
    panicked: bool,
}

fn lock_state(latch: &Latch) -> MutexGuard<'_, LatchState> {
    match latch.state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Latch {
    fn add(&self) {
        lock_state(self).pending += 1;
    }

    fn done(&self, panicked: bool) {
        let mut state = lock_state(self);

        state.pending -= 1;
        state.panicked |= panicked;

        if state.pending == 0 {
            self.condvar.notify_all();
        }
    }

    fn wait(&self) {
        let mut state = lock_state(self);

        while state.pending > 0 {
            state = match self.condvar.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn panicked(&self) -> bool {
        lock_state(self).panicked
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rand::Rng;

    use super::TaskPool;

    #[test]
    fn submit_returns_a_result() {
        let pool = TaskPool::new(2, 7);

        let handle = pool.submit(|_context| 21 * 2);

        assert_eq!(handle.wait(), 42);
    }

    #[test]
    fn scope_joins_all_tasks() {
        let pool = TaskPool::new(4, 7);
        let counter = AtomicUsize::new(0);

        pool.scope(|scope| {
            for _ in 0..64 {
                let counter = &counter;

                scope.submit(move |_context| {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
        });

        assert_eq!(counter.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn scoped_tasks_borrow_disjoint_chunks() {
        let pool = TaskPool::new(3, 7);
        let mut values = vec![0usize; 100];

        pool.scope(|scope| {
            for (chunk_index, chunk) in values.chunks_mut(9).enumerate() {
                scope.submit(move |_context| {
                    for (offset, value) in chunk.iter_mut().enumerate() {
                        *value = chunk_index * 9 + offset;
                    }
                });
            }
        });

        for (index, value) in values.iter().enumerate() {
            assert_eq!(*value, index);
        }
    }

    #[test]
    fn worker_context_carries_a_usable_rng() {
        let pool = TaskPool::new(2, 1234);

        let draw = pool
            .submit(|context| context.rng.random::<f32>())
            .wait();

        assert!((0.0..1.0).contains(&draw));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut pool = TaskPool::new(2, 7);

        pool.stop();
        pool.stop();
    }

    #[test]
    fn a_panicking_task_surfaces_on_join() {
        let pool = TaskPool::new(2, 7);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pool.scope(|scope| {
                scope.submit(|_context| panic!("boom"));
            });
        }));

        assert!(outcome.is_err());

        // The pool survives and keeps scheduling.
        assert_eq!(pool.submit(|_context| 5).wait(), 5);
    }
}
