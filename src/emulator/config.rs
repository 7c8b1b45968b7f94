/*
 *  emulator/config.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Emulator configuration: defaults, YAML scenario file, CLI overrides
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::collections::BTreeMap;
use std::{fs, path::{Path, PathBuf}};

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a scenario could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level emulator configuration. Every field is optional so the
/// layers can be merged field by field.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EmulatorConfig {
    pub log_level: Option<String>,      // "info" | "debug" | ...
    /// Path the bridge believes it was loaded from; the Lua entry point is
    /// looked up next to it.
    pub plugin: Option<PathBuf>,
    pub interface_version: Option<String>,
    /// Pretend to be this executable, e.g. `portal2.exe`
    pub executable_name: Option<String>,
    pub session: Option<SessionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionConfig {
    pub map: Option<String>,
    pub max_clients: Option<u32>,
    pub edict_count: Option<u32>,
    pub frames: Option<u32>,
    pub pause_at_frame: Option<u32>,
    pub clients: Option<Vec<ClientConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub name: String,
    pub address: Option<String>,
    pub network_id: Option<String>,
    /// number of console commands the client sends
    pub commands: Option<u32>,
    /// replies to cvar queries, reported through OnQueryCvarValueFinished
    pub cvars: Option<BTreeMap<String, String>>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "luaplug-emulator", about = "Run a luaplug Lua plugin without the engine")]
pub struct Cli {
    /// Path to a YAML scenario file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Plugin module path, e.g. addons/hello.so
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub plugin: Option<PathBuf>,
    #[arg(long)]
    pub interface_version: Option<String>,
    #[arg(long)]
    pub executable_name: Option<String>,
    #[arg(long)]
    pub map: Option<String>,
    #[arg(long)]
    pub frames: Option<u32>,
    #[arg(long)]
    pub pause_at_frame: Option<u32>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<EmulatorConfig, ConfigError> {
    let cli = Cli::parse();
    let cfg = load_from(&cli)?;

    if cli.dump_config {
        // Pretty YAML of effective config
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Layer defaults, YAML and `cli`, then validate.
pub fn load_from(cli: &Cli) -> Result<EmulatorConfig, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = EmulatorConfig::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/luaplug/emulator.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/luaplug/emulator.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["luaplug.yaml", "emulator.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<EmulatorConfig, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

pub fn parse_yaml(s: &str) -> Result<EmulatorConfig, ConfigError> {
    let cfg: EmulatorConfig = serde_yaml::from_str(s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
pub fn merge(dst: &mut EmulatorConfig, src: EmulatorConfig) {
    if src.log_level.is_some()          { dst.log_level = src.log_level; }
    if src.plugin.is_some()             { dst.plugin = src.plugin; }
    if src.interface_version.is_some()  { dst.interface_version = src.interface_version; }
    if src.executable_name.is_some()    { dst.executable_name = src.executable_name; }
    match (&mut dst.session, src.session) {
        (None, Some(s)) => dst.session = Some(s),
        (Some(d), Some(s)) => merge_session(d, s),
        _ => {}
    }
}

fn merge_session(dst: &mut SessionConfig, src: SessionConfig) {
    if src.map.is_some()             { dst.map = src.map; }
    if src.max_clients.is_some()     { dst.max_clients = src.max_clients; }
    if src.edict_count.is_some()     { dst.edict_count = src.edict_count; }
    if src.frames.is_some()          { dst.frames = src.frames; }
    if src.pause_at_frame.is_some()  { dst.pause_at_frame = src.pause_at_frame; }
    if src.clients.is_some()         { dst.clients = src.clients; }
}

fn apply_cli_overrides(cfg: &mut EmulatorConfig, cli: &Cli) {
    if cli.log_level.is_some()          { cfg.log_level = cli.log_level.clone(); }
    if cli.plugin.is_some()             { cfg.plugin = cli.plugin.clone(); }
    if cli.interface_version.is_some()  { cfg.interface_version = cli.interface_version.clone(); }
    if cli.executable_name.is_some()    { cfg.executable_name = cli.executable_name.clone(); }

    let any_session = cli.map.is_some() || cli.frames.is_some() || cli.pause_at_frame.is_some();
    if any_session && cfg.session.is_none() {
        cfg.session = Some(SessionConfig::default());
    }
    if let Some(session) = cfg.session.as_mut() {
        if cli.map.is_some()             { session.map = cli.map.clone(); }
        if cli.frames.is_some()          { session.frames = cli.frames; }
        if cli.pause_at_frame.is_some()  { session.pause_at_frame = cli.pause_at_frame; }
    }
}

/// A plugin path is required; session numbers must describe a playable level.
pub fn validate(cfg: &EmulatorConfig) -> Result<(), ConfigError> {
    if cfg.plugin.is_none() {
        return Err(ConfigError::Validation(
            "plugin path is required (--plugin or `plugin:` in the scenario file)".into(),
        ));
    }
    if let Some(version) = cfg.interface_version.as_ref() {
        if version.trim().is_empty() {
            return Err(ConfigError::Validation("interface_version must not be empty".into()));
        }
    }
    if let Some(session) = cfg.session.as_ref() {
        if let Some(max) = session.max_clients {
            if max == 0 || max > 255 {
                return Err(ConfigError::Validation("session max_clients must be 1..=255".into()));
            }
        }
        if let Some(count) = session.edict_count {
            if count == 0 {
                return Err(ConfigError::Validation("session edict_count must be > 0".into()));
            }
        }
        if let (Some(pause), Some(frames)) = (session.pause_at_frame, session.frames) {
            if pause >= frames {
                return Err(ConfigError::Validation("session pause_at_frame must be < frames".into()));
            }
        }
        if let Some(clients) = session.clients.as_ref() {
            if clients.iter().any(|c| c.name.trim().is_empty()) {
                return Err(ConfigError::Validation("client names must not be empty".into()));
            }
            let max = session.max_clients.unwrap_or(super::session::DEFAULT_MAX_CLIENTS);
            if clients.len() > max as usize {
                return Err(ConfigError::Validation(format!(
                    "{} clients configured but max_clients is {}",
                    clients.len(),
                    max
                )));
            }
        }
    }
    Ok(())
}
