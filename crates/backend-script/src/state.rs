//! Durable per-script state, persisted as `state/<name>.bin`.
//!
//! `persist_state` (called from Lua) writes synchronously, in line
//! with the worker thread that called it — unlike `post_disk_task`,
//! which only ever queues a description for the disk executor to log.
//! This is a deliberate exception to "workers never block on disk":
//! state writes are rare, small, and the one case the script needs a
//! durability guarantee before it continues.

use std::fs;
use std::path::Path;

pub const STATE_DIR: &str = "state";

pub fn restore_dir() -> &'static str {
    STATE_DIR
}

/// Write `data` to `state/<name>.bin`, creating the directory if
/// needed. Always a full truncating write, never an append.
pub fn persist(name: &str, data: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(STATE_DIR)?;
    let path = Path::new(STATE_DIR).join(format!("{name}.bin"));
    fs::write(path, data)
}

/// Scan `state/` for `*.bin` files at startup, returning `(name, data)`
/// pairs with the `.bin` suffix stripped from `name`. Missing directory
/// is not an error — it just means no state has ever been persisted.
pub fn scan_state_files() -> Vec<(String, Vec<u8>)> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(STATE_DIR) {
        Ok(e) => e,
        Err(_) => return out,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bin") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(data) = fs::read(&path) {
            out.push((stem.to_string(), data));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_then_scan_round_trips() {
        let dir = tempdir();
        let _guard = ChdirGuard::enter(&dir);

        persist("session_42", b"hello").unwrap();
        let found = scan_state_files();
        assert!(found.iter().any(|(name, data)| name == "session_42" && data == b"hello"));
    }

    #[test]
    fn scan_on_missing_dir_returns_empty() {
        let dir = tempdir();
        let _guard = ChdirGuard::enter(&dir);
        assert!(scan_state_files().is_empty());
    }

    // Minimal self-contained temp-dir + chdir helpers so this test
    // module doesn't reach for a dev-dependency just for filesystem
    // isolation.
    fn tempdir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        let unique = format!("backend-script-test-{}-{:?}", std::process::id(), std::thread::current().id());
        p.push(unique);
        std::fs::create_dir_all(&p).unwrap();
        p
    }

    struct ChdirGuard {
        original: std::path::PathBuf,
    }

    impl ChdirGuard {
        fn enter(dir: &std::path::Path) -> Self {
            let original = std::env::current_dir().unwrap();
            std::env::set_current_dir(dir).unwrap();
            ChdirGuard { original }
        }
    }

    impl Drop for ChdirGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.original);
        }
    }
}
