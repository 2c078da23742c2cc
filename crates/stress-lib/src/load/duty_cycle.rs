//! Duty-cycled CPU saturation
//!
//! Each worker alternates between running the work unit and sleeping inside
//! a fixed window: at 40% it works for ~40 ms then sleeps ~60 ms. The
//! granularity is one window plus one work unit.

use super::kernel::MandelbrotKernel;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Length of one busy/idle window
pub const WINDOW: Duration = Duration::from_millis(100);

/// Length of one CPU burst before the control loop re-evaluates
pub const DEFAULT_BURST: Duration = Duration::from_secs(60);

const MIN_PAUSE: Duration = Duration::from_millis(1);

/// Busy/idle accounting for one or more workers
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DutyCycleStats {
    pub windows: u64,
    pub work_units: u64,
    pub busy: Duration,
    pub idle: Duration,
}

impl DutyCycleStats {
    /// Fraction of wall time spent working
    pub fn busy_ratio(&self) -> f64 {
        let total = (self.busy + self.idle).as_secs_f64();
        if total == 0.0 {
            return 0.0;
        }
        self.busy.as_secs_f64() / total
    }

    pub fn merge(&mut self, other: &DutyCycleStats) {
        self.windows += other.windows;
        self.work_units += other.work_units;
        self.busy += other.busy;
        self.idle += other.idle;
    }
}

/// Duty-cycle parameters for a single worker
#[derive(Debug, Clone, Copy)]
pub struct DutyCycle {
    busy_budget: Duration,
    window: Duration,
    burst: Duration,
}

impl DutyCycle {
    /// `target_percent` is clamped into [0, 100]
    pub fn new(target_percent: i32, burst: Duration) -> Self {
        Self::with_window(target_percent, burst, WINDOW)
    }

    pub fn with_window(target_percent: i32, burst: Duration, window: Duration) -> Self {
        let percent = target_percent.clamp(0, 100) as u32;
        Self {
            busy_budget: window * percent / 100,
            window,
            burst,
        }
    }

    /// Run the duty cycle on the current thread until the burst ends.
    ///
    /// Blocking: call from `spawn_blocking`. `work` returns false when it was
    /// interrupted by cancellation; `keep_going` is polled at each window
    /// boundary. Sleeps are driven by `runtime` so cancellation cuts them short.
    pub fn run<W, K>(
        &self,
        mut work: W,
        keep_going: K,
        cancel: &CancellationToken,
        runtime: &Handle,
    ) -> DutyCycleStats
    where
        W: FnMut(&CancellationToken) -> bool,
        K: Fn() -> bool,
    {
        let mut stats = DutyCycleStats::default();
        let burst_start = Instant::now();
        let mut window_start = Instant::now();

        while burst_start.elapsed() < self.burst && !cancel.is_cancelled() {
            if !work(cancel) {
                break;
            }
            stats.work_units += 1;

            let elapsed = window_start.elapsed();
            if elapsed <= self.busy_budget {
                continue;
            }

            stats.busy += elapsed;
            let pause = self.window.saturating_sub(elapsed).max(MIN_PAUSE);
            let slept_from = Instant::now();
            sleep_or_cancel(runtime, cancel, pause);
            stats.idle += slept_from.elapsed();
            stats.windows += 1;

            if !keep_going() {
                debug!("Duty cycle stopped at window boundary");
                return stats;
            }
            window_start = Instant::now();
        }

        // Work done in the final, unfinished window
        stats.busy += window_start.elapsed();
        stats
    }
}

fn sleep_or_cancel(runtime: &Handle, cancel: &CancellationToken, pause: Duration) {
    runtime.block_on(async {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    });
}

/// Run one CPU burst with `workers` parallel duty-cycled workers.
///
/// `keep_going` is shared by every worker and checked at window boundaries.
pub async fn run_cpu_burst<K>(
    cycle: DutyCycle,
    kernel: MandelbrotKernel,
    workers: usize,
    keep_going: K,
    cancel: &CancellationToken,
) -> DutyCycleStats
where
    K: Fn() -> bool + Clone + Send + 'static,
{
    let runtime = Handle::current();
    let mut handles = Vec::with_capacity(workers);

    for _ in 0..workers.max(1) {
        let cancel = cancel.clone();
        let runtime = runtime.clone();
        let keep_going = keep_going.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            cycle.run(
                |token| kernel.compute(token).is_some(),
                keep_going,
                &cancel,
                &runtime,
            )
        }));
    }

    let mut total = DutyCycleStats::default();
    for handle in handles {
        match handle.await {
            Ok(stats) => total.merge(&stats),
            Err(e) => warn!(error = %e, "CPU worker panicked"),
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Busy-wait for a fixed slice, standing in for the kernel
    fn spin(slice: Duration) -> impl FnMut(&CancellationToken) -> bool {
        move |_| {
            let start = Instant::now();
            while start.elapsed() < slice {
                std::hint::spin_loop();
            }
            true
        }
    }

    #[test]
    fn test_busy_budget_follows_percent() {
        assert_eq!(DutyCycle::new(40, DEFAULT_BURST).busy_budget, Duration::from_millis(40));
        assert_eq!(DutyCycle::new(150, DEFAULT_BURST).busy_budget, WINDOW);
        assert_eq!(DutyCycle::new(-1, DEFAULT_BURST).busy_budget, Duration::ZERO);
    }

    #[test]
    fn test_busy_ratio_of_empty_stats() {
        assert_eq!(DutyCycleStats::default().busy_ratio(), 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_forty_percent_window_split() {
        let cycle = DutyCycle::new(40, Duration::from_millis(1000));
        let cancel = CancellationToken::new();
        let runtime = Handle::current();

        let stats = tokio::task::spawn_blocking(move || {
            cycle.run(spin(Duration::from_millis(1)), || true, &cancel, &runtime)
        })
        .await
        .unwrap();

        assert!(stats.windows >= 8, "windows = {}", stats.windows);
        let busy_per_window = stats.busy.as_secs_f64() * 1000.0 / stats.windows as f64;
        let idle_per_window = stats.idle.as_secs_f64() * 1000.0 / stats.windows as f64;

        assert!(
            (38.0..=55.0).contains(&busy_per_window),
            "busy per window = {busy_per_window}ms"
        );
        assert!(
            (45.0..=65.0).contains(&idle_per_window),
            "idle per window = {idle_per_window}ms"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_interrupts_sleep() {
        let cycle = DutyCycle::new(0, Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let runtime = Handle::current();

        let worker_cancel = cancel.clone();
        let started = Instant::now();
        let handle = tokio::task::spawn_blocking(move || {
            cycle.run(spin(Duration::from_millis(1)), || true, &worker_cancel, &runtime)
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_ends_burst_at_window_boundary() {
        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();

        let burst = tokio::spawn(async move {
            let cancel = CancellationToken::new();
            run_cpu_burst(
                DutyCycle::new(20, Duration::from_secs(30)),
                MandelbrotKernel::new(0.05),
                2,
                move || flag.load(Ordering::SeqCst),
                &cancel,
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        active.store(false, Ordering::SeqCst);

        let stats = tokio::time::timeout(Duration::from_secs(2), burst)
            .await
            .expect("burst should stop within a window")
            .unwrap();
        assert!(stats.work_units > 0);
    }
}
