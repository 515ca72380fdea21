//! Pass-through policy: nothing is retained, every lookup misses. Keeps
//! the load path honest in configurations that opt out of caching.

use crate::error::{GraphError, Result};

pub struct NoCache {
    name: String,
}

impl NoCache {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "cache name cannot be empty".into(),
            ));
        }
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_its_name_only() {
        let cache = NoCache::new("relationships").unwrap();
        assert_eq!(cache.name(), "relationships");
        assert!(NoCache::new("").is_err());
    }
}
