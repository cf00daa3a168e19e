//! Layered configuration: file < environment < CLI, each layer optional.
//!
//! Mirrors the teacher's split between a file-sourced, env-sourced, and
//! flag-sourced configuration stage, merged ascending so the most specific
//! source always wins.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use crate::eviction::EvictionPolicy;
use crate::util::{Error, NanodResult};

#[derive(Debug, Clone)]
pub struct ConfigurationSet {
    pub bind: String,
    pub port: u16,
    pub maxclients: usize,
    pub timeout_secs: u64,
    pub maxmemory: u64,
    pub maxmemory_policy: EvictionPolicy,
    pub requirepass: Option<String>,
    pub dbfilename: String,
    pub dir: PathBuf,
    pub save_interval: u64,
    pub min_changes: u64,
    /// Wear-levelling: alternate saves between two sibling snapshot files
    /// instead of rewriting one in place. A configuration concern, not a
    /// format concern -- both schemes share the same `MRDB` encoding.
    pub dual_slot: bool,
}

impl Default for ConfigurationSet {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 6379,
            maxclients: 8,
            timeout_secs: 300,
            maxmemory: 0,
            maxmemory_policy: EvictionPolicy::NoEviction,
            requirepass: None,
            dbfilename: "dump.mrdb".to_string(),
            dir: PathBuf::from("."),
            save_interval: 300,
            min_changes: 100,
            dual_slot: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileLayer {
    bind: Option<String>,
    port: Option<u16>,
    maxclients: Option<usize>,
    timeout: Option<u64>,
    maxmemory: Option<u64>,
    maxmemory_policy: Option<String>,
    requirepass: Option<String>,
    dbfilename: Option<String>,
    dir: Option<String>,
    save_interval: Option<u64>,
    min_changes: Option<u64>,
    dual_slot: Option<bool>,
}

#[derive(Debug, Default)]
struct EnvLayer {
    bind: Option<String>,
    port: Option<u16>,
    maxclients: Option<usize>,
    timeout: Option<u64>,
    maxmemory: Option<u64>,
    maxmemory_policy: Option<String>,
    requirepass: Option<String>,
    dbfilename: Option<String>,
    dir: Option<String>,
    save_interval: Option<u64>,
    min_changes: Option<u64>,
    dual_slot: Option<bool>,
}

/// Command-line flags, parsed with `clap`'s derive API. Every field is
/// optional here: absence means "layer doesn't contribute", not zero.
#[derive(Debug, Parser, Default)]
#[command(name = "nanod", about = "An in-memory, RESP2-speaking key-value server")]
pub struct CliLayer {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub maxclients: Option<usize>,
    #[arg(long)]
    pub timeout: Option<u64>,
    #[arg(long)]
    pub maxmemory: Option<u64>,
    #[arg(long = "maxmemory-policy")]
    pub maxmemory_policy: Option<String>,
    #[arg(long)]
    pub requirepass: Option<String>,
    #[arg(long)]
    pub dbfilename: Option<String>,
    #[arg(long)]
    pub dir: Option<String>,
    #[arg(long = "save-interval")]
    pub save_interval: Option<u64>,
    #[arg(long = "min-changes")]
    pub min_changes: Option<u64>,
    #[arg(long = "dual-slot")]
    pub dual_slot: Option<bool>,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> NanodResult<Option<T>> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name}: invalid value {raw:?}"))),
    }
}

fn load_env_layer() -> NanodResult<EnvLayer> {
    Ok(EnvLayer {
        bind: env_string("NANOD_BIND"),
        port: env_parsed("NANOD_PORT")?,
        maxclients: env_parsed("NANOD_MAXCLIENTS")?,
        timeout: env_parsed("NANOD_TIMEOUT")?,
        maxmemory: env_parsed("NANOD_MAXMEMORY")?,
        maxmemory_policy: env_string("NANOD_MAXMEMORY_POLICY"),
        requirepass: env_string("NANOD_REQUIREPASS"),
        dbfilename: env_string("NANOD_DBFILENAME"),
        dir: env_string("NANOD_DIR"),
        save_interval: env_parsed("NANOD_SAVE_INTERVAL")?,
        min_changes: env_parsed("NANOD_MIN_CHANGES")?,
        dual_slot: env_parsed("NANOD_DUAL_SLOT")?,
    })
}

fn load_file_layer(path: &PathBuf) -> NanodResult<FileLayer> {
    let raw = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(Error::from)
}

fn parse_policy(name: &str) -> NanodResult<EvictionPolicy> {
    EvictionPolicy::parse(name).ok_or_else(|| Error::Config(format!("maxmemory_policy: unknown policy {name:?}")))
}

/// Builds the final configuration by merging file < env < CLI, ascending.
pub fn load(cli: CliLayer) -> NanodResult<ConfigurationSet> {
    let mut cfg = ConfigurationSet::default();

    if let Some(path) = &cli.config {
        let file = load_file_layer(path)?;
        apply_file(&mut cfg, file)?;
    }

    let env = load_env_layer()?;
    apply_env(&mut cfg, env)?;

    apply_cli(&mut cfg, cli)?;

    Ok(cfg)
}

fn apply_file(cfg: &mut ConfigurationSet, layer: FileLayer) -> NanodResult<()> {
    if let Some(v) = layer.bind {
        cfg.bind = v;
    }
    if let Some(v) = layer.port {
        cfg.port = v;
    }
    if let Some(v) = layer.maxclients {
        cfg.maxclients = v;
    }
    if let Some(v) = layer.timeout {
        cfg.timeout_secs = v;
    }
    if let Some(v) = layer.maxmemory {
        cfg.maxmemory = v;
    }
    if let Some(v) = layer.maxmemory_policy {
        cfg.maxmemory_policy = parse_policy(&v)?;
    }
    if let Some(v) = layer.requirepass {
        cfg.requirepass = Some(v);
    }
    if let Some(v) = layer.dbfilename {
        cfg.dbfilename = v;
    }
    if let Some(v) = layer.dir {
        cfg.dir = PathBuf::from(v);
    }
    if let Some(v) = layer.save_interval {
        cfg.save_interval = v;
    }
    if let Some(v) = layer.min_changes {
        cfg.min_changes = v;
    }
    if let Some(v) = layer.dual_slot {
        cfg.dual_slot = v;
    }
    Ok(())
}

fn apply_env(cfg: &mut ConfigurationSet, layer: EnvLayer) -> NanodResult<()> {
    if let Some(v) = layer.bind {
        cfg.bind = v;
    }
    if let Some(v) = layer.port {
        cfg.port = v;
    }
    if let Some(v) = layer.maxclients {
        cfg.maxclients = v;
    }
    if let Some(v) = layer.timeout {
        cfg.timeout_secs = v;
    }
    if let Some(v) = layer.maxmemory {
        cfg.maxmemory = v;
    }
    if let Some(v) = layer.maxmemory_policy {
        cfg.maxmemory_policy = parse_policy(&v)?;
    }
    if let Some(v) = layer.requirepass {
        cfg.requirepass = Some(v);
    }
    if let Some(v) = layer.dbfilename {
        cfg.dbfilename = v;
    }
    if let Some(v) = layer.dir {
        cfg.dir = PathBuf::from(v);
    }
    if let Some(v) = layer.save_interval {
        cfg.save_interval = v;
    }
    if let Some(v) = layer.min_changes {
        cfg.min_changes = v;
    }
    if let Some(v) = layer.dual_slot {
        cfg.dual_slot = v;
    }
    Ok(())
}

fn apply_cli(cfg: &mut ConfigurationSet, cli: CliLayer) -> NanodResult<()> {
    if let Some(v) = cli.bind {
        cfg.bind = v;
    }
    if let Some(v) = cli.port {
        cfg.port = v;
    }
    if let Some(v) = cli.maxclients {
        cfg.maxclients = v;
    }
    if let Some(v) = cli.timeout {
        cfg.timeout_secs = v;
    }
    if let Some(v) = cli.maxmemory {
        cfg.maxmemory = v;
    }
    if let Some(v) = cli.maxmemory_policy {
        cfg.maxmemory_policy = parse_policy(&v)?;
    }
    if let Some(v) = cli.requirepass {
        cfg.requirepass = Some(v);
    }
    if let Some(v) = cli.dbfilename {
        cfg.dbfilename = v;
    }
    if let Some(v) = cli.dir {
        cfg.dir = PathBuf::from(v);
    }
    if let Some(v) = cli.save_interval {
        cfg.save_interval = v;
    }
    if let Some(v) = cli.min_changes {
        cfg.min_changes = v;
    }
    if let Some(v) = cli.dual_slot {
        cfg.dual_slot = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ConfigurationSet::default();
        assert_eq!(cfg.port, 6379);
        assert_eq!(cfg.maxclients, 8);
        assert_eq!(cfg.timeout_secs, 300);
    }

    #[test]
    fn cli_overrides_default() {
        let mut cfg = ConfigurationSet::default();
        let cli = CliLayer {
            port: Some(7000),
            ..Default::default()
        };
        apply_cli(&mut cfg, cli).unwrap();
        assert_eq!(cfg.port, 7000);
    }

    #[test]
    fn unknown_policy_name_is_config_error() {
        assert!(parse_policy("not-a-policy").is_err());
    }
}
