//! Adaptive cache manager: a background controller that resizes
//! registered caches in response to memory pressure, keeping each within
//! its configured `[min, max]` window.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// Resizable view the manager holds on a cache. Object-safe so caches of
/// different key/value types can register with one manager.
pub trait AdaptiveCache: Send + Sync {
    fn cache_name(&self) -> &str;
    fn population(&self) -> usize;
    fn current_capacity(&self) -> usize;
    fn apply_capacity(&self, capacity: usize);
}

#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub budget_bytes: u64,
}

impl MemorySample {
    pub fn usage_ratio(&self) -> f32 {
        if self.budget_bytes == 0 {
            return 1.0;
        }
        self.used_bytes as f32 / self.budget_bytes as f32
    }
}

/// Source of memory-pressure samples. `None` means the platform cannot
/// report one; the controller then leaves capacities untouched.
pub trait MemoryPressure: Send + Sync {
    fn sample(&self) -> Option<MemorySample>;
}

/// Samples process resident-set size against a fixed budget.
pub struct ProcessMemoryPressure {
    budget_bytes: u64,
}

impl ProcessMemoryPressure {
    pub fn new(budget_bytes: u64) -> Self {
        Self { budget_bytes }
    }
}

impl MemoryPressure for ProcessMemoryPressure {
    fn sample(&self) -> Option<MemorySample> {
        #[cfg(target_os = "linux")]
        {
            let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
            let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
            Some(MemorySample {
                used_bytes: rss_pages * 4096,
                budget_bytes: self.budget_bytes,
            })
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = self.budget_bytes;
            None
        }
    }
}

struct Registration {
    cache: Arc<dyn AdaptiveCache>,
    heap_ratio: f32,
    min_size: usize,
    max_size: usize,
}

#[derive(Default)]
struct WorkerState {
    stop: bool,
}

struct Shared {
    registrations: Mutex<Vec<Registration>>,
    state: Mutex<WorkerState>,
    wake: Condvar,
    pressure: Box<dyn MemoryPressure>,
    interval: Duration,
}

/// Proportional controller with a deadband: over-pressure shrinks a cache
/// by a quarter toward its floor, clear headroom grows it by a tenth
/// toward its ceiling, and the band in between leaves it alone.
pub struct AdaptiveCacheManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

const SHRINK_NUM: usize = 3;
const SHRINK_DEN: usize = 4;
const GROW_NUM: usize = 11;
const GROW_DEN: usize = 10;
const HEADROOM_FACTOR: f32 = 0.7;

impl AdaptiveCacheManager {
    pub fn new(pressure: Box<dyn MemoryPressure>, interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                registrations: Mutex::new(Vec::new()),
                state: Mutex::new(WorkerState::default()),
                wake: Condvar::new(),
                pressure,
                interval,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn register(
        &self,
        cache: Arc<dyn AdaptiveCache>,
        heap_ratio: f32,
        min_size: usize,
        max_size: usize,
    ) {
        debug!(
            cache = cache.cache_name(),
            heap_ratio, min_size, max_size, "registering cache for adaptive resizing"
        );
        self.shared.registrations.lock().push(Registration {
            cache,
            heap_ratio,
            min_size,
            max_size,
        });
    }

    pub fn unregister(&self, cache: &Arc<dyn AdaptiveCache>) {
        self.shared
            .registrations
            .lock()
            .retain(|reg| !Arc::ptr_eq(&reg.cache, cache));
    }

    /// Spawns the sampling worker. Idempotent.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        self.shared.state.lock().stop = false;
        let shared = Arc::clone(&self.shared);
        *worker = Some(std::thread::spawn(move || {
            loop {
                {
                    let mut state = shared.state.lock();
                    if state.stop {
                        break;
                    }
                    let _ = shared.wake.wait_for(&mut state, shared.interval);
                    if state.stop {
                        break;
                    }
                }
                Self::tick(&shared);
            }
        }));
    }

    /// Stops and joins the worker.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stop = true;
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!("adaptive cache worker panicked");
            }
        }
    }

    /// Runs one sampling pass immediately. Deterministic hook for tests
    /// and for callers that drive their own schedule.
    pub fn poll_now(&self) {
        Self::tick(&self.shared);
    }

    fn tick(shared: &Shared) {
        let Some(sample) = shared.pressure.sample() else {
            return;
        };
        let usage = sample.usage_ratio();
        let registrations = shared.registrations.lock();
        for reg in registrations.iter() {
            let current = reg.cache.current_capacity();
            let floor = reg.min_size.max(1);
            let target = if usage > reg.heap_ratio {
                (current * SHRINK_NUM / SHRINK_DEN).max(floor)
            } else if usage < reg.heap_ratio * HEADROOM_FACTOR {
                ((current * GROW_NUM / GROW_DEN).max(current + 1)).min(reg.max_size)
            } else {
                current
            };
            let target = target.clamp(floor, reg.max_size.max(floor));
            if target != current {
                debug!(
                    cache = reg.cache.cache_name(),
                    usage,
                    from = current,
                    to = target,
                    population = reg.cache.population(),
                    "adaptive resize"
                );
                reg.cache.apply_capacity(target);
            }
        }
    }
}

impl Drop for AdaptiveCacheManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::lru::LruEntityCache;
    use parking_lot::Mutex as PlMutex;

    /// Replays a scripted sequence of samples, repeating the last one.
    struct ScriptedPressure {
        script: PlMutex<Vec<MemorySample>>,
    }

    impl ScriptedPressure {
        fn new(samples: Vec<(u64, u64)>) -> Self {
            Self {
                script: PlMutex::new(
                    samples
                        .into_iter()
                        .rev()
                        .map(|(used_bytes, budget_bytes)| MemorySample {
                            used_bytes,
                            budget_bytes,
                        })
                        .collect(),
                ),
            }
        }
    }

    impl MemoryPressure for ScriptedPressure {
        fn sample(&self) -> Option<MemorySample> {
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop()
            } else {
                script.last().copied()
            }
        }
    }

    fn manager_with(samples: Vec<(u64, u64)>) -> AdaptiveCacheManager {
        AdaptiveCacheManager::new(
            Box::new(ScriptedPressure::new(samples)),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn shrinks_under_pressure_within_bounds() {
        let cache = Arc::new(LruEntityCache::<u64, u64>::new("nodes", 1000).unwrap());
        for i in 0..1000 {
            cache.put(i, i);
        }
        let manager = manager_with(vec![(95, 100)]);
        manager.register(cache.clone(), 0.77, 100, 1500);

        manager.poll_now();
        assert_eq!(cache.capacity(), 750);
        assert!(cache.len() <= 750);

        // Sustained pressure keeps shrinking but respects the floor.
        for _ in 0..20 {
            manager.poll_now();
        }
        assert_eq!(cache.capacity(), 100);
    }

    #[test]
    fn grows_with_headroom_up_to_max() {
        let cache = Arc::new(LruEntityCache::<u64, u64>::new("nodes", 100).unwrap());
        let manager = manager_with(vec![(10, 100)]);
        manager.register(cache.clone(), 0.77, 0, 120);

        manager.poll_now();
        assert_eq!(cache.capacity(), 110);
        manager.poll_now();
        assert_eq!(cache.capacity(), 120);
        manager.poll_now();
        assert_eq!(cache.capacity(), 120, "growth stops at the ceiling");
    }

    #[test]
    fn deadband_leaves_capacity_alone() {
        let cache = Arc::new(LruEntityCache::<u64, u64>::new("nodes", 500).unwrap());
        // 0.6 usage sits between 0.7 * 0.77 and 0.77.
        let manager = manager_with(vec![(60, 100)]);
        manager.register(cache.clone(), 0.77, 0, 1500);
        manager.poll_now();
        assert_eq!(cache.capacity(), 500);
    }

    #[test]
    fn unregistered_cache_is_left_alone() {
        let cache = Arc::new(LruEntityCache::<u64, u64>::new("nodes", 400).unwrap());
        let manager = manager_with(vec![(95, 100)]);
        let handle: Arc<dyn AdaptiveCache> = cache.clone();
        manager.register(handle.clone(), 0.77, 1, 1500);
        manager.unregister(&handle);
        manager.poll_now();
        assert_eq!(cache.capacity(), 400);
    }

    #[test]
    fn worker_start_stop_is_clean() {
        let manager = manager_with(vec![(10, 100)]);
        manager.start();
        manager.start(); // idempotent
        manager.stop();
        manager.stop();
    }
}
