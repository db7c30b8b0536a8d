//! Filesystem mutations used to assemble a sandbox root.
//!
//! Building a root is split in two: the builders produce an ordered list of
//! [`Step`](enum.Step.html)s, and [`apply`](fn.apply.html) performs them. The
//! order of the list is the order of the syscalls.

use std::fs::{DirBuilder, OpenOptions};
use std::os::unix::fs::{symlink, DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use nix::mount::{mount, MsFlags};

use error::*;

/// Options of the private devpts instance.
const DEVPTS_OPTIONS: &str = "newinstance,ptmxmode=0666";

/// Whether a binding exposes a directory tree or a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    /// Bound onto a directory.
    Directory,
    /// Bound onto a placeholder file.
    File,
}

/// A host path made visible at a second location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Path on the host.
    pub source: PathBuf,
    /// Path the source appears at.
    pub destination: PathBuf,
    /// Kind of the source.
    pub kind: BindKind,
    /// Include everything mounted below the source.
    pub recursive: bool,
}

impl Binding {
    /// A recursive binding of a directory.
    pub fn directory<S, D>(source: S, destination: D) -> Binding
    where
        S: Into<PathBuf>,
        D: Into<PathBuf>,
    {
        Binding {
            source: source.into(),
            destination: destination.into(),
            kind: BindKind::Directory,
            recursive: true,
        }
    }

    /// A binding of a single file.
    pub fn file<S, D>(source: S, destination: D) -> Binding
    where
        S: Into<PathBuf>,
        D: Into<PathBuf>,
    {
        Binding {
            source: source.into(),
            destination: destination.into(),
            kind: BindKind::File,
            recursive: false,
        }
    }

    /// Flags passed to `mount(2)`.
    pub fn flags(&self) -> MsFlags {
        if self.recursive {
            MsFlags::MS_BIND | MsFlags::MS_REC
        } else {
            MsFlags::MS_BIND
        }
    }

    /// The steps that create the mount point and bind onto it.
    ///
    /// A file can only be bound onto an existing file, so files get their
    /// parent directory and a placeholder first.
    pub fn steps(&self) -> Vec<Step> {
        let mut steps = Vec::new();

        match self.kind {
            BindKind::Directory => {
                steps.push(Step::CreateDir {
                    path: self.destination.clone(),
                    mode: 0o755,
                });
            }
            BindKind::File => {
                if let Some(parent) = self.destination.parent() {
                    steps.push(Step::CreateDir {
                        path: parent.to_path_buf(),
                        mode: 0o755,
                    });
                }
                steps.push(Step::CreateFile {
                    path: self.destination.clone(),
                });
            }
        }

        steps.push(Step::Bind(self.clone()));
        steps
    }
}

/// One mutation of the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Stop mount events propagating out of the mount namespace.
    MakePrivate,
    /// Mount a size limited tmpfs.
    Tmpfs {
        /// Mount point.
        target: PathBuf,
        /// Value of the `size=` option.
        size: String,
    },
    /// Create a directory and any missing parents. Existing directories are kept.
    CreateDir {
        /// Directory to create.
        path: PathBuf,
        /// Permissions of created directories.
        mode: u32,
    },
    /// Create an empty file unless one exists.
    CreateFile {
        /// File to create.
        path: PathBuf,
    },
    /// Bind mount.
    Bind(Binding),
    /// Mount a procfs.
    Proc {
        /// Mount point.
        target: PathBuf,
    },
    /// Mount a new devpts instance.
    Devpts {
        /// Mount point.
        target: PathBuf,
    },
    /// Create a symbolic link.
    Symlink {
        /// What the link points to.
        target: PathBuf,
        /// The link itself.
        link: PathBuf,
    },
}

impl Step {
    /// Whether the step changes the mount table.
    pub fn is_mount(&self) -> bool {
        match *self {
            Step::MakePrivate
            | Step::Tmpfs { .. }
            | Step::Bind(_)
            | Step::Proc { .. }
            | Step::Devpts { .. } => true,
            Step::CreateDir { .. } | Step::CreateFile { .. } | Step::Symlink { .. } => false,
        }
    }

    /// The path the step acts on.
    pub fn path(&self) -> &Path {
        match *self {
            Step::MakePrivate => Path::new("/"),
            Step::Tmpfs { ref target, .. } => target,
            Step::CreateDir { ref path, .. } => path,
            Step::CreateFile { ref path } => path,
            Step::Bind(ref binding) => &binding.destination,
            Step::Proc { ref target } => target,
            Step::Devpts { ref target } => target,
            Step::Symlink { ref link, .. } => link,
        }
    }

    /// Perform the step.
    pub fn apply(&self) -> Result<()> {
        match *self {
            Step::MakePrivate => {
                mount(
                    None::<&str>,
                    "/",
                    None::<&str>,
                    MsFlags::MS_REC | MsFlags::MS_PRIVATE,
                    None::<&str>,
                ).chain_err(|| ErrorKind::Mount("making private", "/".into()))
            }
            Step::Tmpfs { ref target, ref size } => {
                mount(
                    Some("tmpfs"),
                    target.as_path(),
                    Some("tmpfs"),
                    MsFlags::empty(),
                    Some(format!("size={}", size).as_str()),
                ).chain_err(|| ErrorKind::Mount("mounting tmpfs at", target.clone()))
            }
            Step::CreateDir { ref path, mode } => {
                DirBuilder::new()
                    .recursive(true)
                    .mode(mode)
                    .create(path)
                    .chain_err(|| ErrorKind::Mount("creating directory", path.clone()))
            }
            Step::CreateFile { ref path } => {
                if path.exists() {
                    return Ok(());
                }
                OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o644)
                    .open(path)
                    .map(|_| ())
                    .chain_err(|| ErrorKind::Mount("creating placeholder", path.clone()))
            }
            Step::Bind(ref binding) => {
                mount(
                    Some(binding.source.as_path()),
                    binding.destination.as_path(),
                    None::<&str>,
                    binding.flags(),
                    None::<&str>,
                ).chain_err(|| ErrorKind::Mount("bind mounting onto", binding.destination.clone()))
            }
            Step::Proc { ref target } => {
                mount(
                    Some("proc"),
                    target.as_path(),
                    Some("proc"),
                    MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV,
                    None::<&str>,
                ).chain_err(|| ErrorKind::Mount("mounting proc at", target.clone()))
            }
            Step::Devpts { ref target } => {
                mount(
                    Some("devpts"),
                    target.as_path(),
                    Some("devpts"),
                    MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC,
                    Some(DEVPTS_OPTIONS),
                ).chain_err(|| ErrorKind::Mount("mounting devpts at", target.clone()))
            }
            Step::Symlink { ref target, ref link } => {
                symlink(target, link)
                    .chain_err(|| ErrorKind::Mount("creating symlink", link.clone()))
            }
        }
    }
}

/// Perform the steps in order, stopping at the first failure.
pub fn apply(steps: &[Step]) -> Result<()> {
    for step in steps {
        trace!(?step, "applying");
        step.apply()?;
        debug!(path = %step.path().display(), mount = step.is_mount(), "applied");
    }

    Ok(())
}
