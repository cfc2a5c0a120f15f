//! Rate-limited task launcher.
//!
//! Two limits apply to every job:
//!
//! * at most `max_concurrent` tasks in flight, enforced by a semaphore whose
//!   owned permit moves into the spawned task and is released when it ends;
//! * at least `launch_interval` between two launches, enforced by a single
//!   `sleep_until` in the launch loop. The gap is kept even when a slot is
//!   free, so the request rate never exceeds `1 / launch_interval`.
//!
//! Tasks are launched strictly in index order.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct RateLimitedExecutor {
    max_concurrent: usize,
    launch_interval: Duration,
}

impl RateLimitedExecutor {
    /// `max_concurrent` below 1 is raised to 1.
    pub fn new(max_concurrent: usize, launch_interval: Duration) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            launch_interval,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn launch_interval(&self) -> Duration {
        self.launch_interval
    }

    /// Launch `task(0)`, `task(1)`, … `task(count - 1)` and wait for all of
    /// them.
    ///
    /// Returns the indices of tasks that panicked, in index order. A task
    /// that panics still releases its permit.
    pub async fn run<F, Fut>(&self, count: usize, mut task: F) -> Vec<usize>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(count);
        let mut next_launch = Instant::now();

        for index in 0..count {
            sleep_until(next_launch).await;

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Launch {} aborted: {}", index, e);
                    break;
                }
            };

            debug!("Launching task {}/{}", index + 1, count);
            let fut = task(index);
            handles.push((
                index,
                tokio::spawn(async move {
                    let _permit = permit;
                    fut.await;
                }),
            ));
            next_launch = Instant::now() + self.launch_interval;
        }

        let (indices, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        join_all(handles)
            .await
            .into_iter()
            .zip(indices)
            .filter_map(|(result, index)| match result {
                Ok(()) => None,
                Err(e) => {
                    warn!("Task {} did not finish: {}", index, e);
                    Some(index)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::sleep;

    #[derive(Default)]
    struct Probe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        launches: Mutex<Vec<(usize, Instant)>>,
    }

    impl Probe {
        fn enter(&self, index: usize) {
            self.launches.lock().unwrap().push((index, Instant::now()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn run_probe(
        executor: &RateLimitedExecutor,
        count: usize,
        work: Duration,
    ) -> (Arc<Probe>, Vec<usize>) {
        let probe = Arc::new(Probe::default());
        let panicked = executor
            .run(count, |index| {
                let probe = Arc::clone(&probe);
                async move {
                    probe.enter(index);
                    sleep(work).await;
                    probe.leave();
                }
            })
            .await;
        (probe, panicked)
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_concurrent() {
        let executor = RateLimitedExecutor::new(2, Duration::from_secs(1));
        let (probe, panicked) = run_probe(&executor, 7, Duration::from_secs(10)).await;

        assert!(panicked.is_empty());
        assert_eq!(probe.peak.load(Ordering::SeqCst), 2);
        assert_eq!(probe.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(probe.launches.lock().unwrap().len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn launches_in_order_with_minimum_gap() {
        let interval = Duration::from_secs(4);
        let executor = RateLimitedExecutor::new(5, interval);
        let (probe, _) = run_probe(&executor, 5, Duration::from_millis(100)).await;

        let launches = probe.launches.lock().unwrap();
        let order: Vec<usize> = launches.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        for pair in launches.windows(2) {
            assert!(
                pair[1].1 - pair[0].1 >= interval,
                "gap {:?} < {:?}",
                pair[1].1 - pair[0].1,
                interval
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_a_slot_when_work_outlasts_the_interval() {
        let executor = RateLimitedExecutor::new(1, Duration::from_secs(1));
        let start = Instant::now();
        let (probe, _) = run_probe(&executor, 3, Duration::from_secs(10)).await;

        let launches = probe.launches.lock().unwrap();
        assert!(launches[1].1 - start >= Duration::from_secs(10));
        assert!(launches[2].1 - start >= Duration::from_secs(20));
        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_panicked_tasks() {
        let executor = RateLimitedExecutor::new(2, Duration::ZERO);
        let finished = Arc::new(AtomicUsize::new(0));
        let panicked = executor
            .run(4, |index| {
                let finished = Arc::clone(&finished);
                async move {
                    if index == 2 {
                        panic!("task {index} blew up");
                    }
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(panicked, vec![2]);
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_tasks_returns_immediately() {
        let executor = RateLimitedExecutor::new(0, Duration::from_secs(60));
        assert_eq!(executor.max_concurrent(), 1);
        let panicked = executor.run(0, |_| async {}).await;
        assert!(panicked.is_empty());
    }
}
