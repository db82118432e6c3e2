//! Demo application for **instance-relay**.
//!
//! The first launch becomes the primary, prints `primary <id>` and then one
//! JSON line per argument list forwarded by later launches.  Every later
//! launch forwards its own arguments and exits with status 0.
//!
//! The identifier comes from `$INSTANCE_RELAY_APP_ID` (default
//! `instance-relay-demo`); optional settings are read from
//! `$XDG_CONFIG_HOME/instance-relay/config.json`.

use instance_relay::Config;
use log::{error, info};

const DEFAULT_APP_ID: &str = "instance-relay-demo";

/// Resolve the config directory (`$XDG_CONFIG_HOME/instance-relay`).
fn config_dir() -> std::path::PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        format!("{}/.config", home)
    });
    std::path::PathBuf::from(base).join("instance-relay")
}

/// Try to load the config from `$XDG_CONFIG_HOME/instance-relay/config.json`,
/// falling back to compiled-in defaults.
fn load_config() -> Config {
    let path = config_dir().join("config.json");
    match Config::load(&path) {
        Ok(cfg) => {
            info!("loaded config from {}", path.display());
            cfg
        }
        Err(e) => {
            info!("no config file ({}), using defaults", e);
            Config::default()
        }
    }
}

fn main() {
    env_logger::init();

    let app_id = std::env::var("INSTANCE_RELAY_APP_ID").unwrap_or_else(|_| DEFAULT_APP_ID.into());

    instance_relay::on_args_received(|args: Vec<String>| match serde_json::to_string(&args) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("could not print received arguments: {}", e),
    });

    let coordinator = match instance_relay::init(&app_id, load_config()) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            eprintln!("instance-relay: {}", e);
            std::process::exit(2);
        }
    };

    // Secondaries exit inside this call.
    coordinator.launch_or_exit(true);

    println!("primary {}", coordinator.app_id());
    info!("waiting for other launches on {}", coordinator.socket_path().display());

    loop {
        std::thread::park();
    }
}
