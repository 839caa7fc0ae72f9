use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "d_url")]
    pub url: String,
    /// Default `result_ttl` applied to job records, in seconds.
    #[serde(default = "d_result_ttl")]
    pub result_ttl_secs: u64,
    /// Default `failure_ttl` applied to failed job records, in seconds.
    #[serde(default = "d_failure_ttl")]
    pub failure_ttl_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: d_url(),
            result_ttl_secs: d_result_ttl(),
            failure_ttl_secs: d_failure_ttl(),
        }
    }
}

fn d_url() -> String {
    "redis://localhost:6379/0".into()
}

fn d_result_ttl() -> u64 {
    86_400
}

fn d_failure_ttl() -> u64 {
    86_400
}
