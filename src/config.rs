//! Sandbox configuration.
//!
//! The configuration is read from a TOML file, overridden from the command
//! line and validated once, before any namespace is created. The core only
//! ever sees a validated [`SandboxConfig`](struct.SandboxConfig.html).
//!
//! # Configuration file
//!
//! When no file is given explicitly, the following locations are searched in
//! order:
//!
//! 1. `./burrow.toml`
//! 1. `./.burrow.toml`
//! 1. `~/.config/burrow.toml`
//! 1. `~/.burrow.toml`
//! 1. `/etc/burrow.toml`
//!
//! If none exists, the [default configuration](constant.DEFAULT_CONFIG.html)
//! is used.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use error::*;

/// The default configuration, also printed by `burrow --default-config`.
pub const DEFAULT_CONFIG: &str = include_str!("burrow.toml");

/// Everything the sandbox needs to know beyond who the caller is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Command passed to the shell with `-c`. Empty runs an interactive shell.
    pub command: String,
    /// Shell executed inside the sandbox.
    pub shell: PathBuf,
    /// Directories mounted under the sandbox home, each by its base name.
    pub home_dirs: Vec<PathBuf>,
    /// Host files or directories mounted at the same path inside the sandbox.
    pub bindings: Vec<PathBuf>,
    /// Directory mounted as the sandbox home instead of an empty one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_source: Option<PathBuf>,
    /// Mount a private devpts instance.
    pub ptys: bool,
    /// Expose the caller's `.Xauthority`.
    pub xauth: bool,
    /// Size limit of the tmpfs holding the sandbox root.
    pub root_size: String,
}

impl Default for SandboxConfig {
    fn default() -> SandboxConfig {
        SandboxConfig {
            command: String::new(),
            shell: PathBuf::from("/bin/bash"),
            home_dirs: Vec::new(),
            bindings: Vec::new(),
            home_source: None,
            ptys: false,
            xauth: false,
            root_size: "200M".to_string(),
        }
    }
}

/// Settings given on the command line, which take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Replaces the configured command.
    pub command: Option<String>,
    /// Replaces the configured home directories when not empty.
    pub home_dirs: Vec<PathBuf>,
    /// Appended to the configured bindings.
    pub bindings: Vec<PathBuf>,
    /// Replaces the configured home source.
    pub home_source: Option<PathBuf>,
    /// Enables pseudo-terminals.
    pub ptys: bool,
    /// Enables `.Xauthority` forwarding.
    pub xauth: bool,
}

impl SandboxConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<SandboxConfig> {
        Ok(::toml::from_str(text)?)
    }

    /// Read a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SandboxConfig> {
        let path = path.as_ref();
        let mut text = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut text))
            .chain_err(|| ErrorKind::InvalidConfig(format!("reading {}", path.display())))?;

        SandboxConfig::from_toml(&text)
            .chain_err(|| ErrorKind::InvalidConfig(format!("parsing {}", path.display())))
    }

    /// Load the configuration from the first file found, or the default.
    pub fn discover(explicit: Option<&str>) -> Result<SandboxConfig> {
        match find_config_path(explicit, ::std::env::var("HOME").ok()) {
            Some(path) => {
                debug!(path = %path.display(), "loading configuration");
                SandboxConfig::load(path)
            }
            None => SandboxConfig::from_toml(DEFAULT_CONFIG),
        }
    }

    /// Apply command line settings.
    pub fn apply(mut self, overrides: Overrides) -> SandboxConfig {
        if let Some(command) = overrides.command {
            self.command = command;
        }
        if !overrides.home_dirs.is_empty() {
            self.home_dirs = overrides.home_dirs;
        }
        self.bindings.extend(overrides.bindings);
        if overrides.home_source.is_some() {
            self.home_source = overrides.home_source;
        }
        self.ptys |= overrides.ptys;
        self.xauth |= overrides.xauth;
        self
    }

    /// Check that the configuration can be turned into a sandbox.
    pub fn validate(&self) -> Result<()> {
        if !self.shell.is_absolute() {
            bail!(invalid(format!("shell {} is not absolute", self.shell.display())));
        }

        for binding in &self.bindings {
            if !binding.is_absolute() {
                bail!(invalid(format!("binding {} is not absolute", binding.display())));
            }
        }

        if let Some(ref source) = self.home_source {
            if !source.is_absolute() {
                bail!(invalid(format!("home source {} is not absolute", source.display())));
            }
        }

        for dir in &self.home_dirs {
            if dir.file_name().is_none() {
                bail!(invalid(format!("home directory {} has no base name", dir.display())));
            }
        }

        if self.root_size.trim().is_empty() {
            bail!(invalid("root size is empty".to_string()));
        }

        Ok(())
    }

    /// The command to run, if this is not an interactive session.
    pub fn command(&self) -> Option<&str> {
        if self.command.is_empty() {
            None
        } else {
            Some(&self.command)
        }
    }
}

fn invalid(reason: String) -> ErrorKind {
    ErrorKind::InvalidConfig(reason)
}

/// Determine the path of the configuration file.
pub fn find_config_path(explicit: Option<&str>, home: Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    default_config_paths(home)
        .into_iter()
        .find(|path| path.exists())
}

/// Default configuration path list.
pub fn default_config_paths(home: Option<String>) -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("burrow.toml"),
        PathBuf::from(".burrow.toml"),
    ];

    if let Some(home) = home {
        paths.push(format!("{}/.config/burrow.toml", home).into());
        paths.push(format!("{}/.burrow.toml", home).into());
    }

    paths.push("/etc/burrow.toml".into());

    paths
}
