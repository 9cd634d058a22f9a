use serde::{Deserialize, Serialize};

/// Longest span a `*_secs` setting can express: 100 years.
const MAX_SPAN_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Larger settings are clamped so that `now - span` always stays in range.
fn span(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_SPAN_SECS) as i64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceWorkerConfig {
    /// A Locked transaction older than this may be reclaimed.
    pub lock_staleness_secs: u64,
    /// Sleep after an idle or failed pass.
    pub idle_backoff_ms: u64,
}

impl Default for BalanceWorkerConfig {
    fn default() -> Self {
        Self {
            lock_staleness_secs: 60,
            idle_backoff_ms: 50,
        }
    }
}

impl BalanceWorkerConfig {
    pub fn lock_staleness(&self) -> chrono::Duration {
        span(self.lock_staleness_secs)
    }

    pub fn idle_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.idle_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Minimum spacing between successful cycles.
    pub interval_secs: u64,
    /// A Locked correction older than this is considered crashed.
    pub lock_staleness_secs: u64,
    /// N: every cycle looks at the latest 2N settled transactions.
    pub batch_size: usize,
    pub poll_interval_ms: u64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            lock_staleness_secs: 600,
            batch_size: 10,
            poll_interval_ms: 1000,
        }
    }
}

impl CorrectionConfig {
    pub fn interval(&self) -> chrono::Duration {
        span(self.interval_secs)
    }

    pub fn lock_staleness(&self) -> chrono::Duration {
        span(self.lock_staleness_secs)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub db_path: String,
    pub busy_timeout_ms: u64,
    pub balance: BalanceWorkerConfig,
    pub correction: CorrectionConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: "ledger.db".into(),
            busy_timeout_ms: 5_000,
            balance: BalanceWorkerConfig::default(),
            correction: CorrectionConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LedgerConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    pub fn busy_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.busy_timeout_ms)
    }

    /// Config with short timings for use in tests.
    pub fn default_test() -> Self {
        Self {
            db_path: ":memory:".into(),
            busy_timeout_ms: 5_000,
            balance: BalanceWorkerConfig {
                lock_staleness_secs: 60,
                idle_backoff_ms: 5,
            },
            correction: CorrectionConfig {
                interval_secs: 600,
                lock_staleness_secs: 600,
                batch_size: 10,
                poll_interval_ms: 5,
            },
        }
    }
}
