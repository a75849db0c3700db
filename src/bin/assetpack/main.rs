//! assetpack CLI - Tool for inspecting asset packages.

use assetpack::core::{LoadSession, LoaderSettings};
use assetpack::package::{Asset, Package, PackageRegistry};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "warn";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("assetpack={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    match filtered_args[0] {
        // Info command - show header and asset table
        "info" | "i" => {
            if filtered_args.len() < 2 {
                eprintln!("Error: missing file argument");
                eprintln!("Usage: assetpack-cli info <file.crp>");
                std::process::exit(1);
            }
            cmd_info(filtered_args[1]);
        }

        // Dump command - decode assets as JSON
        "dump" | "d" => {
            if filtered_args.len() < 2 {
                eprintln!("Error: missing file argument");
                eprintln!("Usage: assetpack-cli dump <file.crp> [asset] [--all] [--share]");
                std::process::exit(1);
            }
            let all = filtered_args.iter().any(|&s| s == "--all" || s == "-a");
            let share = filtered_args.iter().any(|&s| s == "--share");
            let name = filtered_args[2..].iter().find(|s| !s.starts_with('-')).copied();
            cmd_dump(filtered_args[1], name, all, share);
        }

        "help" | "h" | "--help" | "-h" => print_help(),

        // Direct file argument = info
        path if path.ends_with(".crp") => cmd_info(path),

        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Run 'assetpack-cli help' for usage");
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!("assetpack-cli - asset package inspector");
    println!();
    println!("USAGE:");
    println!("    assetpack-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info   <file>                Show package header and asset table");
    println!("    d, dump   <file> [asset]        Decode the main (or named) asset as JSON");
    println!("              --all                 Decode every asset in parallel");
    println!("              --share               Share textures, meshes and materials by checksum");
    println!("    h, help                         Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show errors");
    println!();
    println!("NOTES:");
    println!("    - RUST_LOG overrides the verbosity flags");
    println!("    - Passing a .crp file directly is equivalent to 'info'");
}

fn open(path: &str) -> Package {
    match Package::open(path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn cmd_info(path: &str) {
    let package = open(path);

    println!("Package: {}", package.name());
    println!("Author:  {}", package.author());
    println!("Version: {}", package.version());
    println!("Main:    {}", package.main_asset_name());
    println!();
    println!("Assets ({}):", package.len());
    for asset in package.assets() {
        println!(
            "  {:<12} {:>10}  {:<34} {}",
            format!("{:?}", asset.asset_type()),
            asset.size(),
            asset.checksum(),
            asset.name()
        );
    }
}

fn cmd_dump(path: &str, name: Option<&str>, all: bool, share: bool) {
    let package = open(path);
    let registry = PackageRegistry::new();
    registry.add(package.clone());

    let settings = if share { LoaderSettings::sharing_all() } else { LoaderSettings::load_or_default() };
    let session = LoadSession::builder().settings(settings).resolver(Arc::new(registry)).build();

    let assets: Vec<Asset> = if all {
        package.assets().collect()
    } else {
        match package.get(name.unwrap_or(package.main_asset_name())) {
            Ok(a) => vec![a],
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
    };

    let results = session.deserialize_all(&assets);
    let mut failed = false;
    let decoded: Vec<_> = assets
        .iter()
        .zip(results)
        .map(|(asset, result)| match result {
            Ok(value) => serde_json::json!({
                "asset": asset.name(),
                "checksum": asset.checksum(),
                "value": value.map(|v| v.to_json()),
            }),
            Err(e) => {
                failed = true;
                serde_json::json!({ "asset": asset.name(), "error": e.to_string() })
            }
        })
        .collect();

    let stats = session.stats();
    session.close();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "package": package.name(),
            "assets": decoded,
            "stats": stats,
        }))
        .unwrap_or_default()
    );
    if failed {
        std::process::exit(2);
    }
}
