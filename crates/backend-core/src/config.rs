//! Hand-rolled `key=value` configuration reader.
//!
//! No external config crate: every key is parsed with a typed
//! fallback, mirroring this crate's `env_get` idiom — invalid or
//! missing input silently resolves to the documented default rather
//! than erroring. The file itself must exist and be readable; that is
//! the one condition that aborts startup.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::kprint::LogLevel;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub node_name: String,
    pub log_level: LogLevel,
    pub tcp_port: u16,
    pub tcp_io_threads: usize,
    pub udp_io_threads: usize,
    pub worker_threads: usize,
    pub disk_threads: usize,
    pub log_threads: usize,
    pub timer_threads: usize,
    pub queue_size_io_to_worker: usize,
    pub queue_size_worker_to_io: usize,
    pub queue_size_worker_to_disk: usize,
    pub queue_size_worker_to_log: usize,
    pub lua_main_script: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            node_name: "embedded-node".to_string(),
            log_level: LogLevel::Info,
            tcp_port: 9000,
            tcp_io_threads: 4,
            udp_io_threads: 2,
            worker_threads: 8,
            disk_threads: 3,
            log_threads: 1,
            timer_threads: 1,
            queue_size_io_to_worker: 65536,
            queue_size_worker_to_io: 65536,
            queue_size_worker_to_disk: 16384,
            queue_size_worker_to_log: 16384,
            lua_main_script: "scripts/main.lua".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from a `key=value` file. Blank lines and `#`-prefixed
    /// comment lines (after trimming) are skipped. The file must
    /// exist and be readable; individual bad values fall back to
    /// defaults silently.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parse already-read config text. Exposed separately from
    /// [`AppConfig::load`] so tests don't need a filesystem.
    pub fn parse(text: &str) -> Self {
        let mut raw: HashMap<String, String> = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                raw.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let default = AppConfig::default();
        let get_str = |key: &str, default: &str| {
            raw.get(key).cloned().unwrap_or_else(|| default.to_string())
        };
        // Mirrors the original `ToInt`/`ToSize`: unparsable *or* zero
        // falls back to the field's default, never clamps to 1.
        let get_num = |key: &str, default: usize| -> usize {
            match raw.get(key).and_then(|v| v.parse::<usize>().ok()) {
                Some(0) | None => default,
                Some(v) => v,
            }
        };
        let get_u16 = |key: &str, default: u16| -> u16 {
            match raw.get(key).and_then(|v| v.parse::<u16>().ok()) {
                Some(0) | None => default,
                Some(v) => v,
            }
        };

        AppConfig {
            node_name: get_str("node_name", &default.node_name),
            log_level: raw
                .get("log_level")
                .map(|v| LogLevel::parse_or(v, default.log_level))
                .unwrap_or(default.log_level),
            tcp_port: get_u16("tcp_port", default.tcp_port),
            tcp_io_threads: get_num("tcp_io_threads", default.tcp_io_threads),
            udp_io_threads: get_num("udp_io_threads", default.udp_io_threads),
            worker_threads: get_num("worker_threads", default.worker_threads),
            disk_threads: get_num("disk_threads", default.disk_threads),
            log_threads: get_num("log_threads", default.log_threads),
            timer_threads: get_num("timer_threads", default.timer_threads),
            queue_size_io_to_worker: get_num("queue_size_io_to_worker", default.queue_size_io_to_worker),
            queue_size_worker_to_io: get_num("queue_size_worker_to_io", default.queue_size_worker_to_io),
            queue_size_worker_to_disk: get_num("queue_size_worker_to_disk", default.queue_size_worker_to_disk),
            queue_size_worker_to_log: get_num("queue_size_worker_to_log", default.queue_size_worker_to_log),
            lua_main_script: get_str("lua_main_script", &default.lua_main_script),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_empty() {
        let cfg = AppConfig::parse("");
        assert_eq!(cfg.tcp_port, 9000);
        assert_eq!(cfg.worker_threads, 8);
        assert_eq!(cfg.node_name, "embedded-node");
    }

    #[test]
    fn parses_valid_keys() {
        let text = "node_name=edge-1\ntcp_port=8080\nworker_threads=16\nlog_level=debug\n";
        let cfg = AppConfig::parse(text);
        assert_eq!(cfg.node_name, "edge-1");
        assert_eq!(cfg.tcp_port, 8080);
        assert_eq!(cfg.worker_threads, 16);
        assert_eq!(cfg.log_level, LogLevel::Debug);
    }

    #[test]
    fn invalid_values_fall_back_to_default() {
        let text = "tcp_port=not-a-port\nworker_threads=-5\n";
        let cfg = AppConfig::parse(text);
        assert_eq!(cfg.tcp_port, 9000);
        assert_eq!(cfg.worker_threads, 8);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let text = "\n# a comment\nnode_name=from-file\n\n  # indented comment\n";
        let cfg = AppConfig::parse(text);
        assert_eq!(cfg.node_name, "from-file");
    }

    #[test]
    fn zero_thread_counts_fall_back_to_default() {
        let text = "worker_threads=0\ndisk_threads=0\nqueue_size_io_to_worker=0\n";
        let cfg = AppConfig::parse(text);
        assert_eq!(cfg.worker_threads, 8);
        assert_eq!(cfg.disk_threads, 3);
        assert_eq!(cfg.queue_size_io_to_worker, 65536);
    }
}
