//! Shared plumbing for the fixed-size worker pools.
//!
//! Both pools follow the same shape: every job is queued up front into a
//! channel sized to the job count, the sender is dropped so the queue is
//! closed, and `n` workers pull from one shared receiver until it runs dry.

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Number of workers to spawn for `jobs` units of work.
///
/// Never more workers than jobs, and never zero: an empty pool would leave
/// the collector waiting forever for results.
pub fn clamp_workers(requested: usize, jobs: usize) -> usize {
    requested.min(jobs).max(1)
}

/// Closed, pre-filled job queue shared by a pool's workers.
#[derive(Debug)]
pub struct JobQueue<T> {
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: Arc::clone(&self.receiver),
        }
    }
}

impl<T> JobQueue<T> {
    /// Queue every job and close the queue.
    pub fn filled(jobs: Vec<T>) -> Self {
        let (sender, receiver) = mpsc::channel(jobs.len().max(1));
        for job in jobs {
            // Capacity equals the job count, so this never hits a full queue.
            if sender.try_send(job).is_err() {
                unreachable!("job queue sized to its job count");
            }
        }
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Next job, or `None` once the queue is drained.
    pub async fn next(&self) -> Option<T> {
        let mut guard = self.receiver.lock().await;
        guard.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_workers() {
        assert_eq!(clamp_workers(0, 5), 1);
        assert_eq!(clamp_workers(8, 3), 3);
        assert_eq!(clamp_workers(2, 10), 2);
        assert_eq!(clamp_workers(4, 0), 1);
    }

    #[tokio::test]
    async fn test_queue_drains_then_closes() {
        let queue = JobQueue::filled(vec![1, 2, 3]);
        let other = queue.clone();
        let mut seen = vec![
            queue.next().await.unwrap(),
            other.next().await.unwrap(),
            queue.next().await.unwrap(),
        ];
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(queue.next().await, None);
        assert_eq!(other.next().await, None);
    }

    #[tokio::test]
    async fn test_empty_queue_is_closed() {
        let queue: JobQueue<u8> = JobQueue::filled(Vec::new());
        assert_eq!(queue.next().await, None);
    }
}
