//! `burrow` runs a shell, or a single command, in a throwaway sandbox built
//! from linux namespaces. No privileges beyond those of the calling user are
//! needed.
//!
//! The sandbox sees the host's system directories (`/bin`, `/etc`, `/usr`,
//! ...) through bind mounts, a private `/proc`, `/tmp` and `/dev`, and an
//! empty home directory into which selected directories are mounted.
//!
//! # Configuration file
//!
//! The configuration file can be specified at the command line using the `-f` or `--config-file`
//! flag. Alternatively, the following locations are searched in order:
//!
//! 1. `./burrow.toml`
//! 1. `./.burrow.toml`
//! 1. `~/.config/burrow.toml`
//! 1. `~/.burrow.toml`
//! 1. `/etc/burrow.toml`
//!
//! # Usage
//!
//! `burrow [options] [<dir>...]`
//!
//! Each `<dir>` appears in the sandbox home directory under its base name.

extern crate burrow;
extern crate docopt;
#[macro_use]
extern crate serde_derive;
extern crate tracing_subscriber;

use std::env;
use std::path::PathBuf;
use std::process::exit;

use docopt::Docopt;
use tracing_subscriber::EnvFilter;

use burrow::{Overrides, SandboxConfig, Stage, DEFAULT_CONFIG};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "BURROW_LOG";

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("burrow: {}", err.one_line());
            1
        }
    };

    exit(code);
}

fn run() -> burrow::Result<i32> {
    // The re-executed process inside the namespaces.
    if let Some(stage) = Stage::from_args(env::args())? {
        init_logging();
        return stage.run();
    }

    let args = Arguments::load();

    if args.flag_default_config {
        print!("{}", DEFAULT_CONFIG);
        return Ok(0);
    }

    if args.flag_verbose && env::var_os(LOG_ENV).is_none() {
        // Inherited by the re-executed process.
        env::set_var(LOG_ENV, "debug");
    }
    init_logging();

    let config = SandboxConfig::discover(args.flag_config_file.as_ref().map(String::as_str))?
        .apply(args.overrides());

    Stage::start(config)?.run()
}

/// Log to stderr, filtered by `BURROW_LOG`.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

const USAGE: &'static str = "
Usage:
    burrow [options] [--bind=<path>]... [<dir>...]
    burrow (-d | --default-config)
    burrow (-h | --help)
    burrow --version

Options:
    -f <file>, --config-file <file>  Location of configuration file to use.
    -c <command>, --exec <command>   Run a single command instead of a shell.
    -b <path>, --bind <path>         Expose a host file or directory at the same path.
    --home <dir>                     Mount <dir> as the sandbox home directory.
    -t, --ptys                       Provide a private pseudo-terminal instance.
    -x, --xauth                      Expose ~/.Xauthority inside the sandbox.
    -v, --verbose                    Log each step of building the sandbox.
    -d, --default-config             Dump the default configuration to stdout.
    -h, --help                       Show this help.
    --version                        Show the version.
";

#[derive(Deserialize)]
struct Arguments {
    flag_config_file: Option<String>,
    flag_exec: Option<String>,
    flag_bind: Vec<String>,
    flag_home: Option<String>,
    flag_ptys: bool,
    flag_xauth: bool,
    flag_verbose: bool,
    flag_default_config: bool,
    arg_dir: Vec<String>,
}

impl Arguments {
    /// Load arguments from the command line.
    fn load() -> Arguments {
        Docopt::new(USAGE)
            .unwrap_or_else(|e| e.exit())
            .help(true)
            .version(Some(version()))
            .deserialize()
            .unwrap_or_else(|e| e.exit())
    }

    /// The settings that take precedence over the configuration file.
    fn overrides(&self) -> Overrides {
        Overrides {
            command: self.flag_exec.clone(),
            home_dirs: self.arg_dir.iter().map(PathBuf::from).collect(),
            bindings: self.flag_bind.iter().map(PathBuf::from).collect(),
            home_source: self.flag_home.as_ref().map(PathBuf::from),
            ptys: self.flag_ptys,
            xauth: self.flag_xauth,
        }
    }
}

/// Construct the version string for the program.
fn version() -> String {
    format!(
        "{} - {}\n{}\n\n{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_AUTHORS"),
        env!("CARGO_PKG_DESCRIPTION"),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(argv: &[&str]) -> Arguments {
        Docopt::new(USAGE)
            .and_then(|d| d.argv(argv.iter().cloned()).deserialize())
            .unwrap()
    }

    #[test]
    fn positional_directories_and_repeated_binds() {
        let args = parse(&[
            "burrow", "-b", "/etc/hosts", "--bind", "/srv", "-c", "make", "/data/project",
        ]);
        let overrides = args.overrides();

        assert_eq!(overrides.command, Some("make".to_string()));
        assert_eq!(overrides.home_dirs, vec![PathBuf::from("/data/project")]);
        assert_eq!(
            overrides.bindings,
            vec![PathBuf::from("/etc/hosts"), PathBuf::from("/srv")]
        );
        assert!(!overrides.ptys);
    }

    #[test]
    fn flags_enable_ptys_and_xauth() {
        let overrides = parse(&["burrow", "-t", "--xauth", "--home", "/data/home"]).overrides();

        assert!(overrides.ptys);
        assert!(overrides.xauth);
        assert_eq!(overrides.home_source, Some(PathBuf::from("/data/home")));
    }

    #[test]
    fn default_config_flag() {
        assert!(parse(&["burrow", "-d"]).flag_default_config);
    }
}
