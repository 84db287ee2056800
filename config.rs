//! Configuration sources and run resolution.
//!
//! This module turns a key-value [`ConfigSource`] plus explicit [`Anchors`]
//! into a fully populated [`Configuration`].
//!
//! ## Recognized Keys
//!
//! - `target`: directory to transform (default: the engine's own directory)
//! - `key`: URL-safe base64 key (default: freshly generated)
//! - `save`: key backup file (default: `keys.bak`, empty value disables it)
//! - `protected`: comma-separated extra paths to leave untouched
//! - `site`: identifier of an external key holder
//!
//! ## Environment Variables
//!
//! - `DIRLOCK_CONFIG`: Override config file path

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::error::DirlockError;
use crate::key_manager::KeyMaterial;
use crate::pipeline::Direction;
use crate::protect::{lexical_absolute, ProtectedPaths};

pub const ENV_CONFIG_PATH: &str = "DIRLOCK_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "dirlock.json";
pub const DEFAULT_BACKUP_FILE: &str = "keys.bak";
pub const DEFAULT_SECTION: &str = "DEFAULT";

pub type Section = HashMap<String, String>;

/// Opaque key-value source of configuration sections.
pub trait ConfigSource {
    /// Values of `name`, or of the default section when `name` is `None`.
    /// Named sections see default-section values for keys they leave unset.
    fn section(&self, name: Option<&str>) -> Option<Section>;
}

impl ConfigSource for HashMap<String, Section> {
    fn section(&self, name: Option<&str>) -> Option<Section> {
        let defaults = self.get(DEFAULT_SECTION).cloned().unwrap_or_default();
        match name {
            None => Some(defaults),
            Some(name) => {
                let mut merged = defaults;
                merged.extend(self.get(name)?.clone());
                Some(merged)
            }
        }
    }
}

/// On-disk shape: section name -> key -> scalar (or list of scalars)
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RawConfig(HashMap<String, HashMap<String, Value>>);

/// JSON file of sections: `{"DEFAULT": {"target": "..."}, "name": {...}}`
#[derive(Debug, Clone, Default)]
pub struct JsonConfigSource {
    sections: HashMap<String, Section>,
}

impl JsonConfigSource {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let RawConfig(root): RawConfig =
            serde_json::from_str(s).context("config must be an object of sections")?;
        let sections = root
            .into_iter()
            .map(|(name, values)| {
                let values = values
                    .into_iter()
                    .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.to_lowercase(), v)))
                    .collect();
                (name, values)
            })
            .collect();
        Ok(Self { sections })
    }

    /// Load from file. A missing file gives an empty source (defaults only).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        info!(path = %path.display(), "loading config from file");
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&s).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load with `DIRLOCK_CONFIG` taking priority over `path`.
    /// Returns the source together with the path actually used.
    pub fn load_with_env(path: &Path) -> anyhow::Result<(Self, PathBuf)> {
        let path = match env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => {
                debug!(path = %p, "overriding config path from environment");
                PathBuf::from(p)
            }
            _ => path.to_path_buf(),
        };
        Ok((Self::load(&path)?, path))
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

impl ConfigSource for JsonConfigSource {
    fn section(&self, name: Option<&str>) -> Option<Section> {
        self.sections.section(name)
    }
}

fn scalar_to_string(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Null | Value::Object(_) => None,
    }
}

/// Locations of the engine itself. Always protected.
#[derive(Debug, Clone)]
pub struct Anchors {
    /// The running executable
    pub executable: PathBuf,
    /// Directory used as the default target
    pub home: PathBuf,
    /// Config file used for this run
    pub config_file: PathBuf,
    /// Config file used when none is given
    pub default_config_file: PathBuf,
}

impl Anchors {
    pub fn from_process(config_file: &Path) -> std::io::Result<Self> {
        let executable = env::current_exe()?;
        let home = match executable.parent() {
            Some(dir) => dir.to_path_buf(),
            None => env::current_dir()?,
        };
        Ok(Self {
            executable,
            home,
            config_file: lexical_absolute(config_file)?,
            default_config_file: lexical_absolute(Path::new(DEFAULT_CONFIG_FILE))?,
        })
    }

    fn paths(&self) -> [&Path; 3] {
        [&self.executable, &self.config_file, &self.default_config_file]
    }
}

/// Per-run switches that do not come from the config file
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub direction: Direction,
    pub compress: bool,
}

#[derive(Debug)]
pub struct Configuration {
    pub target: PathBuf,
    pub key: KeyMaterial,
    pub backup: Option<PathBuf>,
    pub protected: ProtectedPaths,
    pub site: Option<String>,
    pub compress: bool,
    pub direction: Direction,
}

impl Configuration {
    /// Runs without a site have no external holder for the key
    pub fn is_standalone(&self) -> bool {
        self.site.is_none()
    }
}

#[derive(Debug)]
pub struct Resolution {
    pub config: Configuration,
    /// True when no key was configured and one was generated for this run
    pub generated_key: bool,
}

fn non_empty(section: &Section, key: &str) -> Option<String> {
    section
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Build the run configuration from `source`.
pub fn resolve(
    source: &dyn ConfigSource,
    section: Option<&str>,
    anchors: &Anchors,
    options: RunOptions,
) -> Result<Resolution, DirlockError> {
    let values = source.section(section).ok_or_else(|| {
        DirlockError::config(format!("no configuration section named '{}'", section.unwrap_or(DEFAULT_SECTION)))
    })?;

    let target = non_empty(&values, "target")
        .map(PathBuf::from)
        .unwrap_or_else(|| anchors.home.clone());
    if target.exists() && !target.is_dir() {
        return Err(DirlockError::config(format!(
            "target {} is not a directory",
            target.display()
        )));
    }

    let (key, generated_key) = match non_empty(&values, "key") {
        Some(text) => (KeyMaterial::from_encoded(&text)?, false),
        None => (KeyMaterial::generate(), true),
    };

    // explicit empty `save` disables the backup file
    let backup = match values.get("save") {
        Some(v) if v.trim().is_empty() => None,
        Some(v) => Some(PathBuf::from(v.trim())),
        None => Some(PathBuf::from(DEFAULT_BACKUP_FILE)),
    };
    let backup = backup
        .map(|p| lexical_absolute(&p))
        .transpose()
        .map_err(|e| DirlockError::config(format!("cannot resolve backup path: {}", e)))?;

    let declared = values.get("protected").map(String::as_str).unwrap_or_default();
    let mut protected = ProtectedPaths::from_list(declared)
        .map_err(|e| DirlockError::config(format!("cannot resolve protected paths: {}", e)))?;
    protected
        .extend(anchors.paths().into_iter().chain(backup.as_deref()))
        .map_err(|e| DirlockError::config(format!("cannot resolve protected paths: {}", e)))?;

    let site = non_empty(&values, "site");
    if site.is_none() {
        match &backup {
            Some(path) if generated_key => {
                error!(path = %path.display(), "no site specified: saving key to backup")
            }
            None if generated_key => error!("no site specified and no backup file: key will be printed"),
            _ => error!("no site specified: make sure the configured key is stored safely"),
        }
    }

    let config = Configuration {
        target,
        key,
        backup,
        protected,
        site,
        compress: options.compress,
        direction: options.direction,
    };
    debug!(
        target = %config.target.display(),
        backup = ?config.backup,
        protected = %config.protected.to_list(),
        site = ?config.site,
        compress = config.compress,
        direction = %config.direction,
        "configuration resolved"
    );

    Ok(Resolution {
        config,
        generated_key,
    })
}
