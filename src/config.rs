use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

pub const HEAP_RATIO_MIN: f32 = 0.1;
pub const HEAP_RATIO_MAX: f32 = 0.95;

/// Which eviction policy backs the node and relationship caches.
///
/// `Weak` and `Soft` select the LRU policy with adaptive-pressure
/// registration; the runtime has no collector-managed references, so the
/// distinction is a configuration-level choice between eagerness of the
/// pressure response, not a separate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Weak,
    Soft,
    Lru,
    Clock,
    Strong,
    None,
}

impl CacheKind {
    pub fn description(self) -> &'static str {
        match self {
            CacheKind::Weak => "weak reference cache",
            CacheKind::Soft => "soft reference cache",
            CacheKind::Lru => "lru cache",
            CacheKind::Clock => "clock cache",
            CacheKind::Strong => "strong reference cache",
            CacheKind::None => "no cache",
        }
    }

    /// Weak/soft caches shed entries on memory pressure; they register
    /// with the adaptive manager even when `use_adaptive_cache` is off.
    pub fn pressure_driven(self) -> bool {
        matches!(self, CacheKind::Weak | CacheKind::Soft)
    }
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub cache_kind: CacheKind,
    pub use_adaptive_cache: bool,
    /// Target fraction of the memory budget the caches may occupy,
    /// clamped to `[0.1, 0.95]`.
    pub adaptive_cache_heap_ratio: f32,
    pub min_node_cache_size: usize,
    pub min_relationship_cache_size: usize,
    pub max_node_cache_size: usize,
    pub max_relationship_cache_size: usize,
    pub adaptive_sample_interval: Duration,
    /// Memory budget the adaptive heap ratio is measured against.
    pub memory_budget_bytes: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            cache_kind: CacheKind::Soft,
            use_adaptive_cache: false,
            adaptive_cache_heap_ratio: 0.77,
            min_node_cache_size: 0,
            min_relationship_cache_size: 0,
            max_node_cache_size: 1500,
            max_relationship_cache_size: 3500,
            adaptive_sample_interval: Duration::from_secs(3),
            memory_budget_bytes: 512 << 20,
        }
    }
}

impl GraphConfig {
    /// Parses the string parameter map accepted by the embedded runtime.
    /// Unparsable values are reported and left at their defaults.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = params.get("cache_type") {
            match value.to_lowercase().as_str() {
                "weak" => config.cache_kind = CacheKind::Weak,
                "soft" => config.cache_kind = CacheKind::Soft,
                "lru" | "old" => config.cache_kind = CacheKind::Lru,
                "clock" => config.cache_kind = CacheKind::Clock,
                "strong" => config.cache_kind = CacheKind::Strong,
                "none" => config.cache_kind = CacheKind::None,
                other => warn!(value = other, "unable to parse cache_type"),
            }
        }
        if let Some(value) = params.get("use_adaptive_cache") {
            match value.to_lowercase().as_str() {
                "yes" | "true" => config.use_adaptive_cache = true,
                "no" | "false" => config.use_adaptive_cache = false,
                other => warn!(value = other, "unable to parse use_adaptive_cache"),
            }
        }
        if let Some(value) = params.get("adaptive_cache_heap_ratio") {
            match value.parse::<f32>() {
                Ok(ratio) => config.adaptive_cache_heap_ratio = ratio,
                Err(_) => warn!(value, "unable to parse adaptive_cache_heap_ratio"),
            }
        }
        parse_usize(params, "min_node_cache_size", &mut config.min_node_cache_size);
        parse_usize(
            params,
            "min_relationship_cache_size",
            &mut config.min_relationship_cache_size,
        );
        parse_usize(params, "max_node_cache_size", &mut config.max_node_cache_size);
        parse_usize(
            params,
            "max_relationship_cache_size",
            &mut config.max_relationship_cache_size,
        );
        config.clamped()
    }

    pub fn clamped(mut self) -> Self {
        self.adaptive_cache_heap_ratio = self
            .adaptive_cache_heap_ratio
            .clamp(HEAP_RATIO_MIN, HEAP_RATIO_MAX);
        self
    }
}

fn parse_usize(params: &HashMap<String, String>, key: &str, slot: &mut usize) {
    if let Some(value) = params.get(key) {
        match value.parse::<usize>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!(key, value, "unable to parse cache size option"),
        }
    }
}
