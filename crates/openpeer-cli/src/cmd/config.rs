//! Config command: print what a channel would be opened with.

use openpeer_channel::config::default_config_path;
use openpeer_channel::load_config;
use std::path::PathBuf;

pub fn cmd_config_show(config: Option<PathBuf>) {
    let path = config.unwrap_or_else(default_config_path);
    let effective = load_config(Some(&path));

    let rendered = toml::to_string_pretty(&effective).unwrap_or_else(|e| {
        eprintln!("Error rendering config: {e}");
        std::process::exit(1);
    });

    if path.exists() {
        println!("# {}", path.display());
    } else {
        println!("# {} (not found, showing defaults)", path.display());
    }
    println!("# session: {}\n", effective.session_id());
    print!("{rendered}");
}
