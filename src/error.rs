//! Error types.
//!
//! Every failure is fatal to the invocation. Errors are propagated to `main`
//! which reports them on a single line and exits.

use std::path::PathBuf;

error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Nix(::nix::Error);
        TomlDe(::toml::de::Error);
        TomlSer(::toml::ser::Error);
    }

    errors {
        // The caller is root; the sandbox relies on a non-root caller.
        RunAsRoot {
            description("refusing to run as root")
            display("refusing to run as root (home directory is /root)")
        }

        // No password database entry for the calling user.
        UnknownUser(uid: u32) {
            description("unknown user")
            display("no user entry for uid {}", uid)
        }

        // The serialized identity and configuration could not be decoded.
        Handoff(reason: String) {
            description("malformed handoff")
            display("malformed handoff: {}", reason)
        }

        // The configuration is not usable.
        InvalidConfig(reason: String) {
            description("invalid configuration")
            display("invalid configuration: {}", reason)
        }

        // Two sources would be bound onto the same destination.
        DestinationCollision(path: PathBuf) {
            description("colliding mount destination")
            display("more than one directory would be mounted at {}", path.display())
        }

        // Inspecting the host filesystem failed.
        HostInspection(path: PathBuf) {
            description("host inspection failed")
            display("inspecting {}", path.display())
        }

        // A path the sandbox needs does not exist on the host.
        MissingHostPath(path: PathBuf) {
            description("missing host path")
            display("{} does not exist on the host", path.display())
        }

        // A filesystem operation while building the sandbox failed.
        Mount(operation: &'static str, path: PathBuf) {
            description("building the sandbox failed")
            display("{} {}", operation, path.display())
        }

        // Creating or entering a namespace failed.
        Namespace(reason: String) {
            description("namespace setup failed")
            display("namespace setup: {}", reason)
        }

        // Launching the sandboxed shell failed.
        Launch(reason: String) {
            description("launch failed")
            display("launching shell: {}", reason)
        }
    }
}

impl Error {
    /// Render the error and all of its causes on one line.
    pub fn one_line(&self) -> String {
        self.iter()
            .map(|cause| cause.to_string())
            .collect::<Vec<_>>()
            .join(": ")
    }
}
