//! Concurrent scenarios that validate [`CseMutex`](struct@crate::CseMutex) under load.
//!
//! Both scenarios return an error describing the observed misbehavior if the lock
//! failed to provide mutual exclusion or acquire/release visibility.
use std::{
    cell::UnsafeCell,
    thread::sleep,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossbeam::{channel::bounded, thread};
use log::{debug, info};
use nix::sched;
use thiserror::Error;

use crate::{
    affinity,
    config::{CounterConfig, HoldConfig},
    CseMutex, Mutex,
};

/// flag value before the holder locked
pub const FLAG_UNSET: i32 = 0;
/// flag value while the holder sleeps with the lock held
pub const FLAG_SLEEPING: i32 = 1;
/// flag value written right before the holder unlocks
pub const FLAG_RELEASED: i32 = 2;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("count was {actual} instead of {expected}")]
    LostCounts { expected: u64, actual: u64 },
    #[error("flag is unmodified")]
    FlagUnmodified,
    #[error("blocking thread is still asleep")]
    StillAsleep,
    #[error("flag is corrupt: {0}")]
    FlagCorrupt(i32),
    #[error("a harness thread panicked")]
    ThreadPanicked,
}

/// Memory that is only ever accessed while holding a [`CseMutex`]
struct Unguarded<T>(UnsafeCell<T>);

unsafe impl<T: Send> Sync for Unguarded<T> {}

#[derive(Debug)]
pub struct CounterReport {
    pub threads: usize,
    pub iterations: u64,
    pub count: u64,
    pub elapsed: Duration,
}

/// Spawns `cfg.threads` threads that each perform `cfg.iterations` lock/increment/unlock
/// cycles on a plain, non-atomic counter. Fails if any increment got lost.
pub fn count_under_contention(cfg: &CounterConfig) -> Result<CounterReport> {
    let mutex = CseMutex::new();
    let count = Unguarded(UnsafeCell::new(0u64));
    mutex.init();

    let start = Instant::now();
    let results = thread::scope(|s| {
        let handles: Vec<_> = (0..cfg.threads)
            .map(|id| {
                let (mutex, count) = (&mutex, &count);
                let cpu = cfg.cpu_for(id);
                s.spawn(move |_| counter_thread(mutex, count, cfg.iterations, cpu))
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| HarnessError::ThreadPanicked))
            .collect::<Vec<_>>()
    })
    .map_err(|_| HarnessError::ThreadPanicked)?;
    let elapsed = start.elapsed();

    for (id, r) in results.into_iter().enumerate() {
        r?.context(format!("counter thread {} failed", id))?;
    }

    //all counters are done, the mutex should be available
    mutex.lock();
    let actual = unsafe { *count.0.get() };
    mutex.unlock();

    let expected = cfg.threads as u64 * cfg.iterations;
    debug!("counted {}/{} in {:?}", actual, expected, elapsed);
    if actual != expected {
        return Err(HarnessError::LostCounts { expected, actual }.into());
    }

    Ok(CounterReport {
        threads: cfg.threads,
        iterations: cfg.iterations,
        count: actual,
        elapsed,
    })
}

fn counter_thread(
    mutex: &CseMutex,
    count: &Unguarded<u64>,
    iterations: u64,
    cpu: Option<usize>,
) -> Result<()> {
    if let Some(cpu) = cpu {
        affinity::pin_current_thread(cpu)?;
        debug!("pinned counter thread to core {}", cpu);
    }

    //give the other threads a chance to start before we hammer the lock
    let _ = sched::sched_yield();

    for _ in 0..iterations {
        mutex.lock();
        unsafe {
            *count.0.get() += 1;
        }
        mutex.unlock();
    }

    Ok(())
}

#[derive(Debug)]
pub struct FlagObservation {
    /// flag value seen by the contender right after it locked
    pub flag: i32,
    /// time the contender spent inside `lock`
    pub waited: Duration,
}

/// A holder thread locks, sets the flag to [`FLAG_SLEEPING`], sleeps for `cfg.hold`,
/// sets the flag to [`FLAG_RELEASED`] and unlocks. The calling thread tries to lock
/// `cfg.contender_delay` after the holder locked and must then observe [`FLAG_RELEASED`].
pub fn hold_and_contend(cfg: &HoldConfig) -> Result<FlagObservation> {
    let flag: Mutex<i32> = Mutex::new(FLAG_UNSET);
    let (hold, delay) = (cfg.hold(), cfg.contender_delay());

    let observation = thread::scope(|s| -> Result<FlagObservation> {
        let (locked_tx, locked_rx) = bounded(1);
        let flag = &flag;

        let holder = s.spawn(move |_| {
            let mut guard = flag.lock();
            *guard = FLAG_SLEEPING;
            let _ = locked_tx.send(());
            sleep(hold);
            *guard = FLAG_RELEASED;
        });

        locked_rx
            .recv()
            .context("holder thread exited before it locked")?;
        sleep(delay);

        let attempt = Instant::now();
        let seen = *flag.lock();
        let waited = attempt.elapsed();
        debug!("contender saw flag {} after waiting {:?}", seen, waited);

        holder.join().map_err(|_| HarnessError::ThreadPanicked)?;

        Ok(FlagObservation { flag: seen, waited })
    })
    .map_err(|_| HarnessError::ThreadPanicked)??;

    match observation.flag {
        FLAG_RELEASED => {
            info!("contender was held off for {:?}", observation.waited);
            Ok(observation)
        }
        FLAG_UNSET => Err(HarnessError::FlagUnmodified.into()),
        FLAG_SLEEPING => Err(HarnessError::StillAsleep.into()),
        v => Err(HarnessError::FlagCorrupt(v).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_thread_counts_exactly() {
        let cfg = CounterConfig {
            threads: 1,
            iterations: 1_000,
            pin_cpus: Vec::new(),
        };
        let report = count_under_contention(&cfg).unwrap();
        assert_eq!(report.count, 1_000);
    }

    #[test]
    fn zero_threads_count_nothing() {
        let cfg = CounterConfig {
            threads: 0,
            iterations: 10,
            pin_cpus: Vec::new(),
        };
        assert_eq!(count_under_contention(&cfg).unwrap().count, 0);
    }

    #[test]
    fn lost_counts_message() {
        let e = HarnessError::LostCounts {
            expected: 10,
            actual: 9,
        };
        assert_eq!(e.to_string(), "count was 9 instead of 10");
    }
}
