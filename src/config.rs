//! Engine configuration loaded from environment variables

const DEFAULT_SNAPSHOT_CAPACITY: usize = 64;
const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;
const DEFAULT_COALESCE_THRESHOLD: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Buffer size of each per-list snapshot broadcast channel
    pub snapshot_capacity: usize,
    /// Buffer size of the achiever notification channel
    pub notification_capacity: usize,
    /// Queue depth at which consecutive vote updates for one proof collapse
    pub coalesce_threshold: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            coalesce_threshold: DEFAULT_COALESCE_THRESHOLD,
        }
    }
}

impl SyncConfig {
    /// Load from SYNC_SNAPSHOT_CAPACITY, SYNC_NOTIFICATION_CAPACITY and
    /// SYNC_COALESCE_THRESHOLD. Unset or invalid values keep the default.
    pub fn from_env() -> Self {
        let config = Self {
            snapshot_capacity: read_positive("SYNC_SNAPSHOT_CAPACITY", DEFAULT_SNAPSHOT_CAPACITY),
            notification_capacity: read_positive(
                "SYNC_NOTIFICATION_CAPACITY",
                DEFAULT_NOTIFICATION_CAPACITY,
            ),
            coalesce_threshold: read_positive(
                "SYNC_COALESCE_THRESHOLD",
                DEFAULT_COALESCE_THRESHOLD,
            ),
        };
        tracing::debug!("Sync config: {:?}", config);
        config
    }
}

fn read_positive(key: &str, default: usize) -> usize {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        // broadcast channels panic on zero capacity
        Ok(value) if value > 0 => value,
        _ => {
            tracing::warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var("SYNC_SNAPSHOT_CAPACITY");
        std::env::remove_var("SYNC_NOTIFICATION_CAPACITY");
        std::env::remove_var("SYNC_COALESCE_THRESHOLD");
    }

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        clear_env();
        assert_eq!(SyncConfig::from_env(), SyncConfig::default());
    }

    #[test]
    #[serial]
    fn test_reads_values() {
        clear_env();
        std::env::set_var("SYNC_SNAPSHOT_CAPACITY", "8");
        std::env::set_var("SYNC_COALESCE_THRESHOLD", " 4 ");

        let config = SyncConfig::from_env();
        assert_eq!(config.snapshot_capacity, 8);
        assert_eq!(config.coalesce_threshold, 4);
        assert_eq!(config.notification_capacity, DEFAULT_NOTIFICATION_CAPACITY);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back() {
        clear_env();
        std::env::set_var("SYNC_SNAPSHOT_CAPACITY", "0");
        std::env::set_var("SYNC_NOTIFICATION_CAPACITY", "lots");

        let config = SyncConfig::from_env();
        assert_eq!(config.snapshot_capacity, DEFAULT_SNAPSHOT_CAPACITY);
        assert_eq!(config.notification_capacity, DEFAULT_NOTIFICATION_CAPACITY);
        clear_env();
    }
}
