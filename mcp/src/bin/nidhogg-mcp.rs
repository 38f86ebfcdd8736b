use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, LevelFilter};
use nidhogg_core::{get_default_config_file, NidhoggConfig};
use nidhogg_mcp::{run_stdio, ConversationServer};
use std::path::PathBuf;

/// MCP server that saves conversations as transcript, metadata and append-log files.
#[derive(Parser, Debug)]
#[command(name = "nidhogg-mcp", version, about)]
struct Cli {
    /// Directory for conversations when a call does not pass `out_dir`
    #[arg(long, env = "NIDHOGG_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Config file (defaults to <config dir>/nidhogg/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

// stdout carries protocol frames, so logs always go to stderr.
fn setup_logging(verbose: bool, config_level: Option<&str>) {
    let default_level = config_level.unwrap_or("info");
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder
        .target(env_logger::Target::Stderr)
        .format_timestamp_millis()
        .init();
}

// An explicit --config path must exist; the default location is optional.
fn load_config(cli: &Cli) -> Result<NidhoggConfig> {
    let file_config = match &cli.config {
        Some(path) => NidhoggConfig::load_required(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match get_default_config_file() {
            Ok(path) => NidhoggConfig::load_from_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            Err(_) => NidhoggConfig::default(),
        },
    };
    Ok(file_config.merge(&NidhoggConfig::new(cli.out_dir.clone(), None)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    setup_logging(cli.verbose, config.log_level.as_deref());
    debug!("Starting with arguments: {:?}", cli);

    let out_dir = config.resolved_out_dir();
    info!(
        "Starting nidhogg-mcp server, default output directory {}",
        out_dir.display()
    );

    let server = ConversationServer::new(out_dir);
    run_stdio(&server)
        .await
        .context("MCP stdio session failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nidhogg-mcp").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = load_config(&cli(&["--config", missing.to_str().unwrap()])).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn test_out_dir_flag_overrides_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "out_dir = \"from-file\"\nlog_level = \"warn\"\n").unwrap();

        let from_file = load_config(&cli(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(from_file.log_level.as_deref(), Some("warn"));

        let overridden = load_config(&cli(&[
            "--config",
            path.to_str().unwrap(),
            "--out-dir",
            "from-flag",
        ]))
        .unwrap();
        assert_eq!(overridden.resolved_out_dir(), PathBuf::from("from-flag"));
        assert_eq!(overridden.log_level.as_deref(), Some("warn"));
    }
}
