//! Dropping into the sandbox root as the caller.
//!
//! The builder runs as root of the outer user namespace. The shell is started
//! in a second, inner user namespace that maps the caller's own uid and gid
//! onto that root. The two maps compose to the caller's host ids, so the shell
//! sees itself as the caller and never holds more than the caller does.

use std::path::Path;

use nix::unistd::{Gid, Uid};
use unshare::{self, ExitStatus, GidMap, Namespace, UidMap};

use config::SandboxConfig;
use error::*;
use identity::CallerIdentity;
use namespace::IdMap;
use rootfs::SandboxRoot;

/// Arguments passed to the shell.
pub fn shell_args(config: &SandboxConfig) -> Vec<String> {
    match config.command() {
        Some(command) => vec!["-c".to_string(), command.to_string()],
        None => Vec::new(),
    }
}

/// User and group maps of the inner user namespace.
///
/// The caller's ids inside map onto the ids of the current process outside.
pub fn id_maps(identity: &CallerIdentity) -> (IdMap, IdMap) {
    (
        IdMap::single(identity.uid, Uid::current().as_raw()),
        IdMap::single(identity.gid, Gid::current().as_raw()),
    )
}

/// Run the shell inside the sandbox and wait for it.
///
/// Returns the exit code of the shell.
pub fn launch(
    root: &SandboxRoot,
    identity: &CallerIdentity,
    config: &SandboxConfig,
) -> Result<i32> {
    let (uid_map, gid_map) = id_maps(identity);
    let args = shell_args(config);

    let mut command = unshare::Command::new(&config.shell);
    command
        .args(&args[..])
        .unshare(&[Namespace::User])
        .set_id_maps(
            vec![UidMap {
                inside_uid: uid_map.inside,
                outside_uid: uid_map.outside,
                count: uid_map.count,
            }],
            vec![GidMap {
                inside_gid: gid_map.inside,
                outside_gid: gid_map.outside,
                count: gid_map.count,
            }],
        )
        .chroot_dir(root.path())
        .current_dir(&identity.home);

    info!(
        shell = %config.shell.display(),
        command = config.command().unwrap_or(""),
        uid_map = %uid_map,
        gid_map = %gid_map,
        "launching"
    );

    // unshare::Error is not a std error, so it cannot be chained.
    let mut child = command.spawn().map_err(|err| {
        Error::from(ErrorKind::Launch(format!("{}: {}", describe(&config.shell, root.path()), err)))
    })?;
    let status = child.wait()
        .chain_err(|| ErrorKind::Launch("waiting for the shell".into()))?;
    debug!(?status, "shell exited");

    Ok(exit_code(status))
}

fn describe(shell: &Path, root: &Path) -> String {
    format!("{} in {}", shell.display(), root.display())
}

/// The exit code a shell would report for the status.
pub fn exit_code(status: ExitStatus) -> i32 {
    match status {
        ExitStatus::Exited(code) => code as u8 as i32,
        ExitStatus::Signaled(signal, _) => 128 + signal as i32,
    }
}

#[cfg(test)]
mod test {
    extern crate tempfile;

    use super::*;

    fn alice() -> CallerIdentity {
        CallerIdentity {
            uid: 1000,
            gid: 1000,
            home: "/home/alice".into(),
            name: "alice".into(),
        }
    }

    #[test]
    fn interactive_shell_has_no_arguments() {
        assert!(shell_args(&SandboxConfig::default()).is_empty());
    }

    #[test]
    fn command_runs_through_the_shell() {
        let config = SandboxConfig {
            command: "make -j4".into(),
            ..SandboxConfig::default()
        };

        assert_eq!(shell_args(&config), vec!["-c", "make -j4"]);
    }

    #[test]
    fn maps_put_the_caller_inside() {
        let (uid_map, gid_map) = id_maps(&alice());

        assert_eq!(uid_map.inside, 1000);
        assert_eq!(gid_map.inside, 1000);
        assert_eq!(uid_map.to_outside(1000), Some(Uid::current().as_raw()));
        assert_eq!(uid_map.to_outside(0), None);
    }

    #[test]
    fn maps_compose_back_to_the_host_ids() {
        let identity = alice();
        let entry = IdMap::root(identity.uid);
        // Inside the outer namespace the builder is uid 0.
        let launch = IdMap::single(identity.uid, 0);

        let host = launch.to_outside(identity.uid).and_then(|outer| entry.to_outside(outer));
        assert_eq!(host, Some(identity.uid));
    }

    #[test]
    fn spawn_failure_is_a_launch_error() {
        let scratch = tempfile::tempdir().unwrap();
        let root = SandboxRoot::new(scratch.path());
        let config = SandboxConfig {
            shell: "/nonexistent/shell".into(),
            ..SandboxConfig::default()
        };

        match *launch(&root, &alice(), &config).unwrap_err().kind() {
            ErrorKind::Launch(ref reason) => assert!(reason.starts_with("/nonexistent/shell in ")),
            ref other => panic!("expected a launch error, got {:?}", other),
        }
    }

    #[test]
    fn exit_codes_follow_shell_conventions() {
        assert_eq!(exit_code(ExitStatus::Exited(3)), 3);
        assert_eq!(exit_code(ExitStatus::Exited(-1)), 255);
    }
}
