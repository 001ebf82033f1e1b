//! Environment-derived configuration, parsed once at startup into an
//! immutable snapshot. Nothing in this module re-reads the environment past
//! `AppConfig::from_env()`; the composition root in `main` owns the result.

use std::path::PathBuf;

use cipher_core::pool::PoolConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub api_token: Option<String>,
    pub pool: PoolConfig,
    pub preprocessed_cache_size: usize,
    pub solver_cache_size: usize,
    pub sts_cache_size: usize,
    pub ignore_script_region: bool,
    pub cache_dir: PathBuf,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Parses a positive integer from the environment, falling back to
/// `default` on anything unparsable or absent rather than panicking.
fn env_positive_usize(name: &str, default: usize) -> usize {
    env_string(name)
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn env_bool_flag(name: &str) -> bool {
    match env_string(name) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => false,
    }
}

/// `{cache_root}/yt-cipher/player_cache`, where `cache_root` follows
/// `XDG_CACHE_HOME` if set, else the platform cache-directory convention.
fn resolve_cache_dir() -> PathBuf {
    let root = env_string("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir);
    root.join("yt-cipher").join("player_cache")
}

impl AppConfig {
    pub fn from_env() -> Self {
        let pool = PoolConfig {
            concurrency: env_positive_usize(
                "MAX_THREADS",
                std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            ),
            messages_limit: env_positive_usize("MESSAGES_LIMIT", 10_000) as u32,
            ..PoolConfig::default()
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_string("PORT").and_then(|v| v.parse().ok()).unwrap_or(8001),
            api_token: env_string("API_TOKEN"),
            pool,
            preprocessed_cache_size: env_positive_usize("PREPROCESSED_CACHE_SIZE", 150),
            solver_cache_size: env_positive_usize("SOLVER_CACHE_SIZE", 50),
            sts_cache_size: env_positive_usize("STS_CACHE_SIZE", 150),
            ignore_script_region: env_bool_flag("IGNORE_SCRIPT_REGION"),
            cache_dir: resolve_cache_dir(),
        }
    }

    /// `HOST=[::]` requests dual-stack binding; `std::net::ToSocketAddrs`
    /// already treats `[::]` as the IPv6 unspecified address, which most
    /// platforms dual-stack by default, so no special-casing is needed here
    /// beyond accepting the literal as a valid host string.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_combines_host_and_port() {
        let mut config = AppConfig::from_env();
        config.host = "127.0.0.1".to_string();
        config.port = 9999;
        assert_eq!(config.bind_addr(), "127.0.0.1:9999");
    }

    #[test]
    fn env_positive_usize_falls_back_on_garbage() {
        std::env::set_var("CIPHER_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_positive_usize("CIPHER_TEST_GARBAGE", 42), 42);
        std::env::remove_var("CIPHER_TEST_GARBAGE");
    }

    #[test]
    fn env_bool_flag_accepts_known_truthy_spellings() {
        for value in ["1", "true", "TRUE", "yes", "On"] {
            std::env::set_var("CIPHER_TEST_FLAG", value);
            assert!(env_bool_flag("CIPHER_TEST_FLAG"), "expected {value} to be truthy");
        }
        std::env::remove_var("CIPHER_TEST_FLAG");
    }
}
