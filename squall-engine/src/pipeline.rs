//! Lock-free task distribution pipeline.
//!
//! The coordinator thread splits the requested transfer into fixed-size
//! tasks and hands them to workers over per-worker SPSC rings. Workers push
//! finished tasks onto a shared MPSC completion ring. A credit pool bounds
//! the number of tasks in flight so the coordinator can never outrun the
//! workers by more than the pool capacity.

use std::sync::Arc;

use squall::{MpscReceiver, MpscRing, MpscSender, SpscConsumer, SpscProducer, SpscRing, TaskPool};
use thiserror::Error;

/// Default ring capacity; the credit pool holds one fewer.
pub const DEFAULT_PIPELINE_CAPACITY: usize = 65536;

/// A unit of transmit work: an owned payload buffer and a routing id.
/// The id doubles as the load-balancing key (`id % workers`).
#[derive(Debug)]
pub struct Task {
    pub id: u64,
    pub payload: Vec<u8>,
}

impl Task {
    pub fn new(id: u64, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// All task credits are in use. Carries the task back so the caller
    /// can drain completions and retry without losing the buffer.
    #[error("task pool exhausted")]
    Exhausted(Task),
}

/// A worker's two ring endpoints: its private todo consumer and a clone of
/// the shared completion sender.
pub struct WorkerQueues {
    pub todo: SpscConsumer<Task>,
    pub done: MpscSender<Task>,
}

impl WorkerQueues {
    /// Push a finished task, spinning until the completion ring accepts it.
    /// The ring holds `capacity - 1` credits so this cannot spin forever
    /// unless the coordinator stops draining.
    pub fn complete(&self, mut task: Task) {
        loop {
            match self.done.try_push(task) {
                Ok(()) => return,
                Err(t) => {
                    task = t;
                    std::hint::spin_loop();
                }
            }
        }
    }
}

/// Coordinator-side handle: enqueue work, drain completions.
pub struct Pipeline {
    todo: Vec<SpscProducer<Task>>,
    done: MpscReceiver<Task>,
    pool: Arc<TaskPool>,
}

impl Pipeline {
    /// Build rings for `workers` workers, each `capacity` slots deep, plus
    /// one shared completion ring. Returns the coordinator handle and one
    /// [`WorkerQueues`] per worker, in worker-index order.
    pub fn new(workers: usize, capacity: usize) -> squall::Result<(Self, Vec<WorkerQueues>)> {
        if workers == 0 {
            return Err(squall::SquallError::config("pipeline needs at least one worker"));
        }
        let (done_tx, done_rx) = MpscRing::new(capacity)?;
        let mut todo = Vec::with_capacity(workers);
        let mut queues = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, rx) = SpscRing::new(capacity)?;
            todo.push(tx);
            queues.push(WorkerQueues {
                todo: rx,
                done: done_tx.clone(),
            });
        }
        let pipeline = Self {
            todo,
            done: done_rx,
            pool: Arc::new(TaskPool::for_ring(capacity)),
        };
        Ok((pipeline, queues))
    }

    pub fn workers(&self) -> usize {
        self.todo.len()
    }

    /// Credits currently available, i.e. how many more tasks fit in flight.
    pub fn credits(&self) -> usize {
        self.pool.available()
    }

    /// Hand a task to the worker selected by `task.id % workers`. Fails
    /// with the task returned intact when no credit is available.
    pub fn enqueue(&self, task: Task) -> Result<(), PipelineError> {
        if !self.pool.try_acquire() {
            return Err(PipelineError::Exhausted(task));
        }
        let idx = (task.id % self.todo.len() as u64) as usize;
        match self.todo[idx].try_push(task) {
            Ok(()) => Ok(()),
            // Credits bound occupancy below ring capacity, so a full todo
            // ring means a bookkeeping bug rather than normal backpressure.
            Err(task) => {
                self.pool.release();
                Err(PipelineError::Exhausted(task))
            }
        }
    }

    /// Pop one finished task and return its credit to the pool.
    pub fn dequeue_completion(&self) -> Option<Task> {
        let task = self.done.try_pop()?;
        self.pool.release();
        Some(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64) -> Task {
        Task::new(id, vec![0u8; 64])
    }

    #[test]
    fn round_robin_by_id() {
        let (pipeline, queues) = Pipeline::new(4, 16).unwrap();
        for id in 0..8u64 {
            pipeline.enqueue(task(id)).unwrap();
        }
        for (w, q) in queues.iter().enumerate() {
            let a = q.todo.try_pop().unwrap();
            let b = q.todo.try_pop().unwrap();
            assert_eq!(a.id % 4, w as u64);
            assert_eq!(b.id, a.id + 4);
            assert!(q.todo.try_pop().is_none());
        }
    }

    #[test]
    fn exhaustion_returns_task_and_completion_restores_credit() {
        let (pipeline, queues) = Pipeline::new(1, 8).unwrap();
        // 7 credits for an 8-slot ring
        for id in 0..7u64 {
            pipeline.enqueue(task(id)).unwrap();
        }
        let rejected = match pipeline.enqueue(task(99)) {
            Err(PipelineError::Exhausted(t)) => t,
            Ok(()) => panic!("enqueue should fail at capacity"),
        };
        assert_eq!(rejected.id, 99);
        assert_eq!(rejected.len(), 64);

        // worker finishes one task; coordinator drains it and retries
        let done = queues[0].todo.try_pop().unwrap();
        queues[0].complete(done);
        let back = pipeline.dequeue_completion().unwrap();
        assert_eq!(back.id, 0);
        pipeline.enqueue(rejected).unwrap();
    }

    #[test]
    fn completions_preserve_payloads() {
        let (pipeline, queues) = Pipeline::new(2, 16).unwrap();
        for id in 0..6u64 {
            pipeline
                .enqueue(Task::new(id, vec![id as u8; 32]))
                .unwrap();
        }
        for q in &queues {
            while let Some(t) = q.todo.try_pop() {
                q.complete(t);
            }
        }
        let mut seen = Vec::new();
        while let Some(t) = pipeline.dequeue_completion() {
            assert!(t.payload.iter().all(|&b| b == t.id as u8));
            seen.push(t.id);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(pipeline.credits(), 15);
    }

    #[test]
    fn threaded_workers_complete_everything_once() {
        let workers = 3usize;
        let total = 3000u64;
        let (pipeline, queues) = Pipeline::new(workers, 256).unwrap();
        let shutdown = crate::Shutdown::new();

        let handles: Vec<_> = queues
            .into_iter()
            .map(|q| {
                let stop = shutdown.clone();
                std::thread::spawn(move || {
                    loop {
                        while let Some(t) = q.todo.try_pop() {
                            q.complete(t);
                        }
                        if stop.is_requested() {
                            // one last drain after the stop signal
                            while let Some(t) = q.todo.try_pop() {
                                q.complete(t);
                            }
                            break;
                        }
                        std::thread::yield_now();
                    }
                })
            })
            .collect();

        let mut next = 0u64;
        let mut done = 0u64;
        let mut pending: Option<Task> = None;
        while done < total {
            if next < total && pending.is_none() {
                let t = Task::new(next, vec![0u8; 8]);
                match pipeline.enqueue(t) {
                    Ok(()) => next += 1,
                    Err(PipelineError::Exhausted(t)) => pending = Some(t),
                }
            } else if let Some(t) = pending.take() {
                match pipeline.enqueue(t) {
                    Ok(()) => next += 1,
                    Err(PipelineError::Exhausted(t)) => pending = Some(t),
                }
            }
            while pipeline.dequeue_completion().is_some() {
                done += 1;
            }
        }
        shutdown.request();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(done, total);
        assert_eq!(pipeline.credits(), 255);
    }
}
