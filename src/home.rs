//! The caller's home directory inside the sandbox.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::PathBuf;

use config::SandboxConfig;
use error::*;
use identity::CallerIdentity;
use mounts::{self, Binding, Step};
use rootfs::SandboxRoot;

/// X authority file, relative to the home directory.
pub const XAUTHORITY: &str = ".Xauthority";

/// The ordered steps that populate the sandbox home.
///
/// Extra directories appear under the home by their base name; two with the
/// same base name, or one named like the X authority file when that is
/// exposed, are rejected before anything is mounted.
pub fn plan(
    root: &SandboxRoot,
    identity: &CallerIdentity,
    config: &SandboxConfig,
) -> Result<Vec<Step>> {
    let home = root.path().join(identity.relative_home());
    let mut steps = Vec::new();

    if let Some(parent) = home.parent() {
        steps.push(Step::CreateDir {
            path: parent.to_path_buf(),
            mode: 0o755,
        });
    }
    steps.push(Step::CreateDir {
        path: home.clone(),
        mode: 0o700,
    });

    if let Some(ref source) = config.home_source {
        steps.push(Step::Bind(Binding::directory(source.clone(), home.clone())));
    }

    let mut seen = HashSet::new();
    if config.xauth {
        seen.insert(OsString::from(XAUTHORITY));
    }
    for dir in &config.home_dirs {
        let name = dir.file_name().ok_or_else(|| {
            ErrorKind::InvalidConfig(format!("home directory {} has no base name", dir.display()))
        })?;
        let destination = home.join(name);
        if !seen.insert(name.to_os_string()) {
            bail!(ErrorKind::DestinationCollision(destination));
        }

        steps.push(Step::CreateDir {
            path: destination.clone(),
            mode: 0o700,
        });
        steps.push(Step::Bind(Binding::directory(dir.clone(), destination)));
    }

    if config.xauth {
        let destination = home.join(XAUTHORITY);
        steps.push(Step::CreateFile { path: destination.clone() });
        steps.push(Step::Bind(Binding::file(identity.home.join(XAUTHORITY), destination)));
    }

    Ok(steps)
}

/// Populate the sandbox home, returning its path before the `chroot`.
pub fn build(
    root: &SandboxRoot,
    identity: &CallerIdentity,
    config: &SandboxConfig,
) -> Result<PathBuf> {
    let steps = plan(root, identity, config)?;
    info!(
        home = %identity.home.display(),
        extra = config.home_dirs.len(),
        "building sandbox home"
    );

    mounts::apply(&steps)?;

    Ok(root.join(&identity.home))
}
