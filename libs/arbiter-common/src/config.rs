use std::path::PathBuf;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    /// Root of the scratch directory; every judging job gets its own
    /// subdirectory underneath it.
    pub scratch_dir: PathBuf,
    /// Number of consumer slots; each slot processes one job at a time.
    pub worker_slots: usize,
    /// Bind address for the synchronous run API.
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let scratch_dir = std::env::var("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("arbiter"));

        let worker_slots = std::env::var("WORKER_SLOTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(1);

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5003".to_string());

        Self {
            redis_url,
            scratch_dir,
            worker_slots,
            bind_addr,
        }
    }
}
