pub mod actions;
pub mod config;
pub mod edge;
pub mod run;

use std::path::PathBuf;

/// Resolve the config path or exit with guidance.
pub(crate) fn require_config(config_path: Option<PathBuf>) -> PathBuf {
    match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/zonewatch/config.yml");
            eprintln!("  /etc/zonewatch/config.yml");
            eprintln!(
                "\nUse --config <path> to specify a config file, or run 'zonewatch config init' to generate one."
            );
            std::process::exit(1);
        }
    }
}
