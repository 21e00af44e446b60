//! Multi-protocol backend server binary.
//!
//! Usage:
//!     backend-server [config-path]
//!
//! Defaults `config-path` to `config/app_config.cfg`. Exits 1 on any
//! startup-fatal condition (unreadable config, main script fails its
//! syntax precheck); blocks until SIGINT/SIGTERM, then drains every
//! thread before exiting 0.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use backend_core::kprint;
use backend_core::{kcritical, kinfo};
use backend_core::AppConfig;

use backend_runtime::wiring::new_run_flag;
use backend_runtime::Runtime;

const DEFAULT_CONFIG_PATH: &str = "config/app_config.cfg";
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

fn main() {
    kprint::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = match AppConfig::load(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            kcritical!("cannot start: {}", e);
            std::process::exit(1);
        }
    };
    kprint::set_log_level(config.log_level);

    install_signal_handlers();

    let runtime = match Runtime::start(&config) {
        Ok(rt) => rt,
        Err(e) => {
            kcritical!("cannot start: {}", e);
            std::process::exit(1);
        }
    };

    kinfo!("backend-server '{}' up, tcp port {}", config.node_name, config.tcp_port);

    let running = new_run_flag();
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(SHUTDOWN_POLL);
    }

    kinfo!("shutdown signal received, draining threads");
    runtime.join();
    kinfo!("backend-server stopped cleanly");
}

extern "C" fn handle_shutdown_signal(_sig: libc::c_int) {
    new_run_flag().store(false, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, handle_shutdown_signal as usize);
        libc::signal(libc::SIGTERM, handle_shutdown_signal as usize);
    }
}
