//! vifctl - Virtual interface control binary
//!
//! A command-line tool that allocates a TUN/TAP interface, brings it up,
//! and holds it open until the user presses Enter. Process-exit policy
//! lives here; the library itself only ever returns typed errors.

use log::{error, info};
use std::env;
use std::io::{self, BufRead};
use std::path::Path;
use std::process;
use viface::{Config, InterfaceKind, InterfaceManager, InterfaceRequest, Result};

fn main() {
    let args: Vec<String> = env::args().collect();

    let (config_path, rest) = if args.len() > 2 && args[1] == "--config" {
        (args[2].as_str(), &args[3..])
    } else {
        ("config.toml", &args[1..])
    };

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    info!("Starting vifctl v{}", env!("CARGO_PKG_VERSION"));

    let (kind, preferred) = match parse_request(rest) {
        Some(request) => request,
        None => {
            eprintln!("Usage: vifctl [--config <path>] <tun|tap> [name]");
            process::exit(2);
        }
    };

    if let Err(e) = run(&config, kind, &preferred) {
        error!("{e}");
        process::exit(1);
    }
}

fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        Ok(Config::default())
    }
}

fn parse_request(args: &[String]) -> Option<(InterfaceKind, String)> {
    let kind = match args.first().map(String::as_str) {
        Some("tun") => InterfaceKind::Tun,
        Some("tap") => InterfaceKind::Tap,
        _ => return None,
    };
    let preferred = args.get(1).cloned().unwrap_or_default();
    Some((kind, preferred))
}

fn run(config: &Config, kind: InterfaceKind, preferred: &str) -> Result<()> {
    let manager = InterfaceManager::new(config);
    let request = InterfaceRequest::new(kind, preferred)?;

    let name = manager.create(&request)?;
    info!("Allocated {kind} interface {name}");

    manager.bring_up(name.as_str())?;

    for (name, state) in manager.list_interfaces() {
        info!("  {name}: {state}");
    }

    println!("Interface {name} is up; press Enter to destroy it");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    manager.destroy(name.as_str())?;
    info!("Interface {name} destroyed");
    Ok(())
}
