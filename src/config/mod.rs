use std::env;
use std::path::PathBuf;

/// Runtime configuration for the intake and progress services
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory uploaded files are written to (default: "uploads")
    pub upload_dir: PathBuf,

    /// Maximum upload size in bytes (default: 512 MB)
    pub max_file_size: usize,

    /// Interval between simulated progress ticks in milliseconds (default: 1000)
    pub tick_interval_ms: u64,

    /// Progress added per tick, 1..=100 (default: 20)
    pub progress_step: u8,

    /// Capacity of the progress event channel (default: 256)
    pub event_buffer: usize,

    /// Allowed CORS Origins (comma separated, "*" for any)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            max_file_size: 512 * 1024 * 1024, // 512 MB
            tick_interval_ms: 1000,
            progress_step: 20,
            event_buffer: 256,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload_dir: env::var("UPLOAD_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            tick_interval_ms: env::var("PROGRESS_TICK_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.tick_interval_ms),

            progress_step: env::var("PROGRESS_STEP")
                .ok()
                .and_then(|v| v.parse::<u8>().ok())
                .map(|v| v.clamp(1, 100))
                .unwrap_or(default.progress_step),

            event_buffer: env::var("EVENT_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.event_buffer),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|v| !v.is_empty())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Config for local runs and tests: fast ticks, temp-friendly upload dir
    pub fn development(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            tick_interval_ms: 10,
            ..Self::default()
        }
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}
