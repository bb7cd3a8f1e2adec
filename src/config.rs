use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("{}: {source}", .path.display())]
	Read { path: PathBuf, source: io::Error },
	#[error("{}: {source}", .path.display())]
	Parse { path: PathBuf, source: toml::de::Error },
	#[error("invalid log level '{0}'")]
	LogLevel(String),
	#[error("max_line must be at least 2, got {0}")]
	MaxLine(usize),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
	pub prompt: String,
	pub max_line: usize,
	pub reap_background: bool,
	pub log_level: String,
	#[serde(default)]
	pub log_file: Option<PathBuf>,
}

/// User file contents; every key optional, unknown keys rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
	prompt: Option<String>,
	max_line: Option<usize>,
	reap_background: Option<bool>,
	log_level: Option<String>,
	log_file: Option<PathBuf>,
}

impl Default for Config {
	fn default() -> Config {
		toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
	}
}

impl Config {
	/// Defaults, overlaid with `path` if given, else with
	/// `~/.config/osh/config.toml` when that file exists.
	pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
		let mut config = Config::default();
		let path = match path {
			Some(p) => Some(p.to_path_buf()),
			None => Config::user_path().filter(|p| p.is_file()),
		};
		if let Some(path) = path {
			let content = fs::read_to_string(&path).map_err(|e| ConfigError::Read { path: path.clone(), source: e })?;
			let overlay = toml::from_str(&content).map_err(|e| ConfigError::Parse { path: path.clone(), source: e })?;
			config.apply_overlay(overlay);
		}
		config.validate()?;
		Ok(config)
	}

	fn user_path() -> Option<PathBuf> {
		let home = std::env::var_os("HOME")?;
		Some(Path::new(&home).join(".config/osh/config.toml"))
	}

	fn apply_overlay(&mut self, overlay: ConfigOverlay) {
		if let Some(v) = overlay.prompt { self.prompt = v; }
		if let Some(v) = overlay.max_line { self.max_line = v; }
		if let Some(v) = overlay.reap_background { self.reap_background = v; }
		if let Some(v) = overlay.log_level { self.log_level = v; }
		if overlay.log_file.is_some() { self.log_file = overlay.log_file; }
	}

	fn validate(&self) -> Result<(), ConfigError> {
		// One content byte plus the newline.
		if self.max_line < 2 {
			return Err(ConfigError::MaxLine(self.max_line));
		}
		self.level_filter().map(|_| ())
	}

	pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
		self.log_level.parse().map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
	}

	/// Longest line content accepted, newline excluded.
	pub fn max_content_len(&self) -> usize {
		self.max_line - 1
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn load_str(content: &str) -> Result<Config, ConfigError> {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		fs::write(&path, content).unwrap();
		Config::load(Some(&path))
	}

	#[test]
	fn defaults() {
		let config = Config::default();
		assert_eq!(config.prompt, "osh> ");
		assert_eq!(config.max_line, 80);
		assert_eq!(config.max_content_len(), 79);
		assert!(config.reap_background);
		assert_eq!(config.level_filter().unwrap(), LevelFilter::Warn);
		assert_eq!(config.log_file, None);
	}

	#[test]
	fn overlay_overrides_only_given_keys() {
		let config = load_str("prompt = \"$ \"\nreap_background = false\n").unwrap();
		assert_eq!(config.prompt, "$ ");
		assert!(!config.reap_background);
		assert_eq!(config.max_line, 80);
		assert_eq!(config.log_level, "warn");
	}

	#[test]
	fn empty_overlay_changes_nothing() {
		assert_eq!(load_str("").unwrap(), Config::default());
	}

	#[test]
	fn unknown_key_is_rejected() {
		match load_str("promt = \"> \"\n") {
			Err(ConfigError::Parse { .. }) => {},
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn bad_values_are_rejected() {
		match load_str("log_level = \"loud\"\n") {
			Err(ConfigError::LogLevel(l)) => assert_eq!(l, "loud"),
			other => panic!("unexpected {:?}", other),
		}
		match load_str("max_line = 1\n") {
			Err(ConfigError::MaxLine(1)) => {},
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn missing_explicit_file_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		match Config::load(Some(&dir.path().join("absent.toml"))) {
			Err(ConfigError::Read { .. }) => {},
			other => panic!("unexpected {:?}", other),
		}
	}
}
