//! Entering the sandbox namespaces.
//!
//! The invoking process clones a child into new user, mount and PID
//! namespaces, maps the child's root onto the caller, and has the child
//! re-execute this program with the [handoff](../handoff/index.html). The
//! child is init of the new PID namespace; when it exits, so does every
//! process in the sandbox.

use std::env;
use std::fs;

use nix::unistd::{execv, Uid};

use context::Context;
use error::*;
use handoff::Handoff;
use namespace::{Mount, Pid, User};

/// The `uid_map` of a process in the initial user namespace.
const INITIAL_UID_MAP: &[&str] = &["0", "0", "4294967295"];

/// The namespaces a sandbox is built in.
pub fn sandbox_context(uid: u32, gid: u32) -> Context {
    Context::new()
        .with(User::new().map_root_user(uid).map_root_group(gid))
        .with(Mount::new())
        .with(Pid::new())
}

/// Re-execute this program inside new namespaces and wait for it.
///
/// Returns the exit code of the re-executed program.
pub fn enter(handoff: &Handoff) -> Result<i32> {
    let exe = env::current_exe()
        .chain_err(|| ErrorKind::Namespace("locating the current executable".into()))?;
    let args = handoff.to_args(&exe)?;

    info!(
        user = %handoff.identity.name,
        uid = handoff.identity.uid,
        gid = handoff.identity.gid,
        "entering namespaces"
    );

    let child = sandbox_context(handoff.identity.uid, handoff.identity.gid)
        .spawn(move || {
            execv(&args[0], &args[..])
                .chain_err(|| ErrorKind::Namespace("re-executing inside the namespaces".into()))?;
            Ok(())
        })?;

    child.wait_code()
}

/// Refuse to build a sandbox outside of a namespace created by `enter`.
///
/// The builder remounts `/` and mounts over `/proc`; on the host that would
/// need, and affect, the real root.
pub fn ensure_inside() -> Result<()> {
    let map = fs::read_to_string("/proc/self/uid_map")
        .chain_err(|| ErrorKind::HostInspection("/proc/self/uid_map".into()))?;
    let fields: Vec<&str> = map.split_whitespace().collect();

    if fields == INITIAL_UID_MAP {
        bail!(ErrorKind::Namespace("not inside a sandbox user namespace".into()));
    }

    if !Uid::current().is_root() {
        bail!(ErrorKind::Namespace(format!(
            "expected uid 0 inside the namespace, got {}",
            Uid::current()
        )));
    }

    Ok(())
}
