//! Construction of the sandbox root filesystem.
//!
//! The root lives on a tmpfs mounted over `/root` inside the private mount
//! namespace, so nothing is written to persistent storage and everything
//! disappears with the namespace.
//!
//! ```text
//! /root/sandbox-root
//! ├── bin, etc, lib, lib64?, opt, sbin, usr, var   recursive binds of the host
//! ├── dev
//! │   ├── null, random, urandom, zero             binds of the host devices
//! │   ├── shm                                     recursive bind
//! │   ├── pts, ptmx -> pts/ptmx                   private devpts (optional)
//! ├── proc                                        fresh procfs
//! ├── run/user                                    recursive bind
//! ├── tmp
//! └── home/<user>                                 see the home module
//! ```

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use config::SandboxConfig;
use error::*;
use mounts::{self, BindKind, Binding, Step};

/// Directory the tmpfs holding the root is mounted on.
pub const STAGING_DIR: &str = "/root";

/// Name of the root directory inside the staging tmpfs.
pub const ROOT_DIR: &str = "sandbox-root";

/// Host directories bound into every sandbox, in mount order.
pub const SYSTEM_DIRS: &[&str] = &[
    "/bin",
    "/etc",
    "/lib",
    "/opt",
    "/sbin",
    "/usr",
    "/var",
    "/dev/shm",
    "/run/user",
];

/// Bound only when present on the host, right after `/lib`.
pub const LIB64_DIR: &str = "/lib64";

/// Devices bound into the sandbox `dev` directory.
pub const DEVICES: &[&str] = &["random", "urandom", "null", "zero"];

const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Give up on symlink chains longer than the kernel would follow.
const MAX_LINKS: usize = 40;

/// The root directory of a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRoot {
    staging: PathBuf,
    path: PathBuf,
}

impl SandboxRoot {
    /// A root at `<staging>/sandbox-root`.
    pub fn new<P: Into<PathBuf>>(staging: P) -> SandboxRoot {
        let staging = staging.into();
        let path = staging.join(ROOT_DIR);

        SandboxRoot {
            staging: staging,
            path: path,
        }
    }

    /// Directory holding the tmpfs.
    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// The root itself.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an absolute path inside the sandbox lives before the `chroot`.
    pub fn join<P: AsRef<Path>>(&self, inside: P) -> PathBuf {
        let inside = inside.as_ref();
        self.path.join(inside.strip_prefix("/").unwrap_or(inside))
    }

    /// The sandbox `dev` directory.
    pub fn dev(&self) -> PathBuf {
        self.path.join("dev")
    }
}

impl Default for SandboxRoot {
    fn default() -> SandboxRoot {
        SandboxRoot::new(STAGING_DIR)
    }
}

/// A view of the host filesystem.
///
/// Paths are host absolute paths; the view resolves them below `root`, which
/// is `/` except in tests.
#[derive(Debug, Clone)]
pub struct Host {
    root: PathBuf,
}

/// What the host provides to a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    /// Directories bound recursively at the same path, in mount order.
    pub directories: Vec<PathBuf>,
    /// Files bound at the same path.
    pub files: Vec<PathBuf>,
}

impl Host {
    /// The real host.
    pub fn system() -> Host {
        Host::new("/")
    }

    /// A host whose `/` is the given directory.
    pub fn new<P: Into<PathBuf>>(root: P) -> Host {
        Host { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path.strip_prefix("/").unwrap_or(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    /// Find everything the configuration needs from the host.
    pub fn inspect(&self, config: &SandboxConfig) -> Result<HostLayout> {
        let mut directories = Vec::new();

        for dir in SYSTEM_DIRS {
            let dir = Path::new(dir);
            if !self.exists(dir) {
                bail!(ErrorKind::MissingHostPath(dir.to_path_buf()));
            }
            directories.push(dir.to_path_buf());

            if dir == Path::new("/lib") && self.exists(Path::new(LIB64_DIR)) {
                directories.push(PathBuf::from(LIB64_DIR));
            }
        }

        let mut files = Vec::new();
        if let Some(target) = self.resolv_conf_target()? {
            match target.parent() {
                Some(dir) if dir != Path::new("/") => {
                    if directories.iter().any(|bound| dir.starts_with(bound)) {
                        debug!(dir = %dir.display(), "resolv.conf target already bound");
                    } else {
                        directories.push(dir.to_path_buf());
                    }
                }
                // Binding the parent would expose the whole host.
                _ => files.push(target.clone()),
            }
        }

        for binding in &config.bindings {
            match self.kind_of(binding)? {
                BindKind::Directory => directories.push(binding.clone()),
                BindKind::File => files.push(binding.clone()),
            }
        }

        Ok(HostLayout {
            directories: directories,
            files: files,
        })
    }

    fn kind_of(&self, path: &Path) -> Result<BindKind> {
        match fs::metadata(self.resolve(path)) {
            Ok(ref meta) if meta.is_dir() => Ok(BindKind::Directory),
            Ok(_) => Ok(BindKind::File),
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => {
                bail!(ErrorKind::MissingHostPath(path.to_path_buf()))
            }
            Err(err) => Err(err).chain_err(|| ErrorKind::HostInspection(path.to_path_buf())),
        }
    }

    /// The real `resolv.conf`, when `/etc/resolv.conf` is a symlink.
    ///
    /// A host without `/etc/resolv.conf` needs nothing extra.
    fn resolv_conf_target(&self) -> Result<Option<PathBuf>> {
        let path = Path::new(RESOLV_CONF);
        match fs::symlink_metadata(self.resolve(path)) {
            Ok(ref meta) if meta.file_type().is_symlink() => {}
            Ok(_) => return Ok(None),
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).chain_err(|| ErrorKind::HostInspection(path.to_path_buf())),
        }

        let target = self.canonicalize(path)?;
        debug!(target = %target.display(), "resolv.conf is a symlink");
        Ok(Some(target))
    }

    /// Resolve every symlink in a host path, as `realpath(3)` does.
    ///
    /// Absolute link targets are taken relative to the view's root.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        let mut pending = Vec::new();
        push_components(&mut pending, path);

        let mut resolved = PathBuf::from("/");
        let mut links = 0;

        while let Some(name) = pending.pop() {
            if name == ".." {
                resolved.pop();
                continue;
            }

            let candidate = resolved.join(&name);
            let meta = fs::symlink_metadata(self.resolve(&candidate))
                .chain_err(|| ErrorKind::HostInspection(candidate.clone()))?;
            if !meta.file_type().is_symlink() {
                resolved = candidate;
                continue;
            }

            links += 1;
            if links > MAX_LINKS {
                bail!(ErrorKind::HostInspection(path.to_path_buf()));
            }

            let target = fs::read_link(self.resolve(&candidate))
                .chain_err(|| ErrorKind::HostInspection(candidate.clone()))?;
            if target.is_absolute() {
                resolved = PathBuf::from("/");
            }
            push_components(&mut pending, &target);
        }

        Ok(resolved)
    }
}

/// Queue the names of a path so that `pop` yields them first to last.
fn push_components(pending: &mut Vec<OsString>, path: &Path) {
    for component in path.components().rev() {
        match component {
            Component::ParentDir => pending.push(OsString::from("..")),
            Component::Normal(name) => pending.push(name.to_os_string()),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
}

/// The ordered steps that build the root.
pub fn plan(root: &SandboxRoot, layout: &HostLayout, config: &SandboxConfig) -> Vec<Step> {
    let mut steps = vec![
        Step::MakePrivate,
        Step::Tmpfs {
            target: root.staging().to_path_buf(),
            size: config.root_size.clone(),
        },
    ];

    for dir in &[root.path().to_path_buf(), root.dev(), root.join("proc"), root.join("tmp")] {
        steps.push(Step::CreateDir {
            path: dir.clone(),
            mode: 0o755,
        });
    }

    for dir in &layout.directories {
        steps.extend(Binding::directory(dir.clone(), root.join(dir)).steps());
    }

    for file in &layout.files {
        steps.extend(Binding::file(file.clone(), root.join(file)).steps());
    }

    for device in DEVICES {
        let target = root.dev().join(device);
        steps.push(Step::CreateFile { path: target.clone() });
        steps.push(Step::Bind(Binding::file(Path::new("/dev").join(device), target)));
    }

    // The host /proc is replaced too: it still shows the parent PID namespace.
    steps.push(Step::Proc { target: PathBuf::from("/proc") });
    steps.push(Step::Proc { target: root.join("proc") });

    if config.ptys {
        let pts = root.dev().join("pts");
        steps.push(Step::CreateDir {
            path: pts.clone(),
            mode: 0o755,
        });
        steps.push(Step::Devpts { target: pts });
        steps.push(Step::Symlink {
            target: PathBuf::from("pts/ptmx"),
            link: root.dev().join("ptmx"),
        });
    }

    steps
}

/// Build the root of a sandbox for the given configuration.
pub fn build(host: &Host, root: SandboxRoot, config: &SandboxConfig) -> Result<SandboxRoot> {
    let layout = host.inspect(config)?;
    info!(
        root = %root.path().display(),
        directories = layout.directories.len(),
        files = layout.files.len(),
        "building sandbox root"
    );

    mounts::apply(&plan(&root, &layout, config))?;

    Ok(root)
}

#[cfg(test)]
mod test {
    extern crate tempfile;

    use super::*;
    use std::os::unix::fs::symlink;

    use self::tempfile::TempDir;

    fn host() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for system in SYSTEM_DIRS {
            fs::create_dir_all(dir.path().join(&system[1..])).unwrap();
        }
        fs::write(dir.path().join("etc/resolv.conf"), "nameserver 127.0.0.1\n").unwrap();
        dir
    }

    fn system_dirs() -> Vec<PathBuf> {
        SYSTEM_DIRS.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn plain_host_binds_only_system_directories() {
        let dir = host();
        let layout = Host::new(dir.path()).inspect(&SandboxConfig::default()).unwrap();

        assert_eq!(layout.directories, system_dirs());
        assert!(layout.files.is_empty());
    }

    #[test]
    fn lib64_follows_lib_when_present() {
        let dir = host();
        fs::create_dir(dir.path().join("lib64")).unwrap();

        let layout = Host::new(dir.path()).inspect(&SandboxConfig::default()).unwrap();

        let lib = layout.directories.iter().position(|d| d == Path::new("/lib")).unwrap();
        assert_eq!(layout.directories[lib + 1], PathBuf::from("/lib64"));
    }

    #[test]
    fn missing_system_directory_is_an_error() {
        let dir = host();
        fs::remove_dir(dir.path().join("opt")).unwrap();

        match *Host::new(dir.path()).inspect(&SandboxConfig::default()).unwrap_err().kind() {
            ErrorKind::MissingHostPath(ref path) => assert_eq!(path, Path::new("/opt")),
            ref other => panic!("expected a missing path, got {:?}", other),
        }
    }

    #[test]
    fn resolv_conf_symlink_adds_target_directory() {
        let dir = host();
        let resolve = dir.path().join("run/systemd/resolve");
        fs::create_dir_all(&resolve).unwrap();
        fs::write(resolve.join("stub-resolv.conf"), "nameserver 127.0.0.53\n").unwrap();
        fs::remove_file(dir.path().join("etc/resolv.conf")).unwrap();
        symlink("../run/systemd/resolve/stub-resolv.conf", dir.path().join("etc/resolv.conf"))
            .unwrap();

        let layout = Host::new(dir.path()).inspect(&SandboxConfig::default()).unwrap();

        assert_eq!(layout.directories.last(), Some(&PathBuf::from("/run/systemd/resolve")));
    }

    #[test]
    fn resolv_conf_symlink_chain_is_followed() {
        let dir = host();
        fs::create_dir_all(dir.path().join("run/resolvconf")).unwrap();
        fs::write(dir.path().join("run/resolvconf/resolv.conf"), "").unwrap();
        fs::create_dir_all(dir.path().join("etc/resolvconf/run")).unwrap();
        symlink("/run/resolvconf/resolv.conf", dir.path().join("etc/resolvconf/run/resolv.conf"))
            .unwrap();
        fs::remove_file(dir.path().join("etc/resolv.conf")).unwrap();
        symlink("resolvconf/run/resolv.conf", dir.path().join("etc/resolv.conf")).unwrap();

        let layout = Host::new(dir.path()).inspect(&SandboxConfig::default()).unwrap();

        assert_eq!(layout.directories.last(), Some(&PathBuf::from("/run/resolvconf")));
    }

    #[test]
    fn resolv_conf_below_a_bound_directory_adds_nothing() {
        let dir = host();
        fs::write(dir.path().join("etc/resolv.conf.real"), "").unwrap();
        fs::remove_file(dir.path().join("etc/resolv.conf")).unwrap();
        symlink("resolv.conf.real", dir.path().join("etc/resolv.conf")).unwrap();

        let layout = Host::new(dir.path()).inspect(&SandboxConfig::default()).unwrap();

        assert_eq!(layout.directories, system_dirs());
    }

    #[test]
    fn bindings_are_sorted_by_kind() {
        let dir = host();
        fs::create_dir_all(dir.path().join("srv/shared")).unwrap();
        fs::write(dir.path().join("srv/token"), "secret").unwrap();
        let config = SandboxConfig {
            bindings: vec!["/srv/token".into(), "/srv/shared".into()],
            ..SandboxConfig::default()
        };

        let layout = Host::new(dir.path()).inspect(&config).unwrap();

        assert_eq!(layout.directories.last(), Some(&PathBuf::from("/srv/shared")));
        assert_eq!(layout.files, vec![PathBuf::from("/srv/token")]);
    }

    #[test]
    fn missing_binding_is_an_error() {
        let dir = host();
        let config = SandboxConfig {
            bindings: vec!["/srv/absent".into()],
            ..SandboxConfig::default()
        };

        assert!(Host::new(dir.path()).inspect(&config).is_err());
    }

    #[test]
    fn plan_starts_private_then_tmpfs() {
        let layout = HostLayout { directories: system_dirs(), files: vec![] };
        let steps = plan(&SandboxRoot::default(), &layout, &SandboxConfig::default());

        assert_eq!(steps[0], Step::MakePrivate);
        assert_eq!(
            steps[1],
            Step::Tmpfs { target: "/root".into(), size: "200M".into() }
        );
        assert!(steps[2..].iter().all(|step| *step != Step::MakePrivate));
    }

    #[test]
    fn plan_mounts_proc_twice_and_pts_only_on_request() {
        let layout = HostLayout { directories: system_dirs(), files: vec![] };
        let root = SandboxRoot::default();

        let steps = plan(&root, &layout, &SandboxConfig::default());
        let procs: Vec<_> = steps.iter().filter(|s| match **s {
            Step::Proc { .. } => true,
            _ => false,
        }).collect();
        assert_eq!(procs.len(), 2);
        assert_eq!(procs[0].path(), Path::new("/proc"));
        assert_eq!(procs[1].path(), Path::new("/root/sandbox-root/proc"));
        assert!(!steps.iter().any(|s| s.path().starts_with("/root/sandbox-root/dev/pts")));

        let config = SandboxConfig { ptys: true, ..SandboxConfig::default() };
        let steps = plan(&root, &layout, &config);
        let tail: Vec<_> = steps.iter().rev().take(3).cloned().collect();
        assert_eq!(
            tail,
            vec![
                Step::Symlink {
                    target: "pts/ptmx".into(),
                    link: "/root/sandbox-root/dev/ptmx".into(),
                },
                Step::Devpts { target: "/root/sandbox-root/dev/pts".into() },
                Step::CreateDir { path: "/root/sandbox-root/dev/pts".into(), mode: 0o755 },
            ]
        );
    }

    #[test]
    fn root_joins_absolute_paths() {
        let root = SandboxRoot::default();
        assert_eq!(root.join("/usr"), PathBuf::from("/root/sandbox-root/usr"));
        assert_eq!(root.join("dev/shm"), PathBuf::from("/root/sandbox-root/dev/shm"));
    }

    #[test]
    fn resolv_conf_through_a_symlinked_directory() {
        let dir = host();
        fs::create_dir_all(dir.path().join("run/resolvconf")).unwrap();
        fs::write(dir.path().join("run/resolvconf/resolv.conf"), "").unwrap();
        symlink("../run", dir.path().join("var/run")).unwrap();
        fs::remove_file(dir.path().join("etc/resolv.conf")).unwrap();
        symlink("/var/run/resolvconf/resolv.conf", dir.path().join("etc/resolv.conf")).unwrap();

        let layout = Host::new(dir.path()).inspect(&SandboxConfig::default()).unwrap();

        assert_eq!(layout.directories.last(), Some(&PathBuf::from("/run/resolvconf")));
    }

    #[test]
    fn resolv_conf_at_the_top_binds_only_the_file() {
        let dir = host();
        fs::write(dir.path().join("resolv.conf"), "").unwrap();
        fs::remove_file(dir.path().join("etc/resolv.conf")).unwrap();
        symlink("/resolv.conf", dir.path().join("etc/resolv.conf")).unwrap();

        let layout = Host::new(dir.path()).inspect(&SandboxConfig::default()).unwrap();
        assert_eq!(layout.directories, system_dirs());
        assert_eq!(layout.files, vec![PathBuf::from("/resolv.conf")]);

        let root = SandboxRoot::default();
        let steps = plan(&root, &layout, &SandboxConfig::default());
        assert!(steps.iter().all(|step| match *step {
            Step::Bind(ref binding) => binding.destination != root.path(),
            _ => true,
        }));
    }

    #[test]
    fn dangling_resolv_conf_is_an_inspection_error() {
        let dir = host();
        fs::remove_file(dir.path().join("etc/resolv.conf")).unwrap();
        symlink("/run/absent/resolv.conf", dir.path().join("etc/resolv.conf")).unwrap();

        match *Host::new(dir.path()).inspect(&SandboxConfig::default()).unwrap_err().kind() {
            ErrorKind::HostInspection(ref path) => assert_eq!(path, Path::new("/run/absent")),
            ref other => panic!("expected an inspection error, got {:?}", other),
        }
    }

    #[test]
    fn symlink_loop_is_an_inspection_error() {
        let dir = host();
        fs::remove_file(dir.path().join("etc/resolv.conf")).unwrap();
        symlink("resolv.conf", dir.path().join("etc/resolv.conf")).unwrap();

        assert!(Host::new(dir.path()).inspect(&SandboxConfig::default()).is_err());
    }

    #[test]
    fn canonicalize_resolves_parent_components() {
        let dir = host();
        let host = Host::new(dir.path());

        assert_eq!(host.canonicalize(Path::new("/etc/../usr/./")).unwrap(), PathBuf::from("/usr"));
        assert_eq!(host.canonicalize(Path::new("/../etc")).unwrap(), PathBuf::from("/etc"));
    }
}
