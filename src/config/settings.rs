//! Dispatcher and pool configuration structures.

use serde::{Deserialize, Serialize};

use crate::scheduler::PoolKind;

/// Sizing of one worker pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Fixed worker thread count.
    pub workers: usize,
    /// Advisory ceiling on outstanding (queued + running) jobs.
    pub capacity: usize,
}

impl PoolSettings {
    fn sized(workers: usize, capacity: usize) -> Self {
        Self { workers, capacity }
    }

    fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be greater than 0".into());
        }
        if self.capacity == 0 {
            return Err("capacity must be greater than 0".into());
        }
        Ok(())
    }
}

/// Sizing of all five worker pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolsSettings {
    /// Indexer maintenance pool.
    pub indexer: PoolSettings,
    /// Release-name parsing pool.
    pub parse: PoolSettings,
    /// External search pool.
    pub search: PoolSettings,
    /// File-system scan pool.
    pub files: PoolSettings,
    /// Metadata/feed pool.
    pub metadata: PoolSettings,
}

impl Default for PoolsSettings {
    fn default() -> Self {
        // Scan and search pools scale with the host; parsing and metadata
        // work is light and mostly I/O-bound against one local database.
        let scaled = num_cpus::get().clamp(1, 4);
        Self {
            indexer: PoolSettings::sized(scaled, 100),
            parse: PoolSettings::sized(2, 100),
            search: PoolSettings::sized(scaled, 100),
            files: PoolSettings::sized(scaled, 100),
            metadata: PoolSettings::sized(2, 100),
        }
    }
}

impl PoolsSettings {
    /// Settings for one pool kind.
    #[must_use]
    pub const fn of(&self, kind: PoolKind) -> PoolSettings {
        match kind {
            PoolKind::Indexer => self.indexer,
            PoolKind::Parse => self.parse,
            PoolKind::Search => self.search,
            PoolKind::Files => self.files,
            PoolKind::Metadata => self.metadata,
        }
    }

    fn validate(&self) -> Result<(), String> {
        for kind in PoolKind::ALL {
            self.of(kind)
                .validate()
                .map_err(|e| format!("pool `{}` invalid: {e}", kind.name()))?;
        }
        Ok(())
    }
}

/// Root configuration for the scheduling core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Worker pool sizing.
    pub pools: PoolsSettings,
    /// Minimum gap between submissions in one throttle bucket, ms.
    pub submit_gap_ms: u64,
    /// Throttle retry attempts before a submission is abandoned.
    pub submit_retries: u32,
    /// Depth of the single-writer operation mailbox.
    pub ops_queue_depth: usize,
    /// Hard per-pool ceiling on the shutdown wait, seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            pools: PoolsSettings::default(),
            submit_gap_ms: 200,
            submit_retries: 11,
            ops_queue_depth: 100,
            shutdown_timeout_secs: 120,
        }
    }
}

impl DispatcherSettings {
    /// Validate all settings.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        self.pools.validate()?;
        if self.submit_gap_ms == 0 {
            return Err("submit_gap_ms must be greater than 0".into());
        }
        if self.submit_retries == 0 {
            return Err("submit_retries must be greater than 0".into());
        }
        if self.ops_queue_depth == 0 {
            return Err("ops_queue_depth must be greater than 0".into());
        }
        if self.shutdown_timeout_secs == 0 {
            return Err("shutdown_timeout_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse settings from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse failure or the first invalid
    /// value.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let settings: Self =
            serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(DispatcherSettings::default().validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut settings = DispatcherSettings::default();
        settings.pools.search.workers = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.contains("search"));
    }

    #[test]
    fn json_roundtrip_with_partial_overrides() {
        let settings = DispatcherSettings::from_json_str(
            r#"{"submit_gap_ms": 50, "pools": {"files": {"workers": 8, "capacity": 32}}}"#,
        )
        .unwrap();
        assert_eq!(settings.submit_gap_ms, 50);
        assert_eq!(settings.pools.files.workers, 8);
        // Untouched fields keep their defaults.
        assert_eq!(settings.submit_retries, 11);
    }

    #[test]
    fn invalid_json_is_reported() {
        assert!(DispatcherSettings::from_json_str("{nope").is_err());
        assert!(
            DispatcherSettings::from_json_str(r#"{"submit_gap_ms": 0}"#).is_err()
        );
    }
}
