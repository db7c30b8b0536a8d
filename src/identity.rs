//! The identity of the user invoking the sandbox.

use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid, User};

use error::*;

/// Home directory that marks a root caller.
const ROOT_HOME: &str = "/root";

/// The user that invoked the sandbox, as seen on the host.
///
/// Captured once before any namespace is created and carried unchanged into
/// the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Host user id.
    pub uid: u32,
    /// Host primary group id.
    pub gid: u32,
    /// Home directory.
    pub home: PathBuf,
    /// Login name.
    pub name: String,
}

impl CallerIdentity {
    /// Capture the calling process.
    ///
    /// The ids are the real ids of the process, which may differ from the
    /// password entry after `newgrp` or `sg`. Only the name and home come from
    /// the password database.
    pub fn current() -> Result<CallerIdentity> {
        CallerIdentity::lookup(Uid::current(), Gid::current())
    }

    /// The identity of a process running with the given real ids.
    pub fn lookup(uid: Uid, gid: Gid) -> Result<CallerIdentity> {
        let user = User::from_uid(uid)?
            .ok_or_else(|| ErrorKind::UnknownUser(uid.as_raw()))?;

        Ok(CallerIdentity {
            uid: uid.as_raw(),
            gid: gid.as_raw(),
            home: user.dir,
            name: user.name,
        })
    }

    /// Refuse to continue for a caller whose home is `/root`.
    ///
    /// Both id remaps assume the caller is an ordinary user.
    pub fn ensure_unprivileged(&self) -> Result<()> {
        if self.home == Path::new(ROOT_HOME) {
            bail!(ErrorKind::RunAsRoot);
        }

        Ok(())
    }

    /// The home directory as a path relative to `/`.
    pub fn relative_home(&self) -> &Path {
        self.home.strip_prefix("/").unwrap_or(&self.home)
    }
}

#[cfg(test)]
mod test {
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
    fn ordinary_user_is_accepted() {
        assert!(alice().ensure_unprivileged().is_ok());
    }

    #[test]
    fn root_home_is_refused() {
        let root = CallerIdentity {
            home: "/root".into(),
            ..alice()
        };

        match *root.ensure_unprivileged().unwrap_err().kind() {
            ErrorKind::RunAsRoot => {}
            ref other => panic!("expected RunAsRoot, got {:?}", other),
        }
    }

    #[test]
    fn trailing_slash_on_root_home_is_refused() {
        let root = CallerIdentity {
            home: "/root/".into(),
            ..alice()
        };

        assert!(root.ensure_unprivileged().is_err());
    }

    #[test]
    fn ids_are_the_real_ids_not_the_password_entry() {
        // root has a password entry with primary group 0 everywhere.
        let identity = CallerIdentity::lookup(Uid::from_raw(0), Gid::from_raw(4242)).unwrap();

        assert_eq!(identity.uid, 0);
        assert_eq!(identity.gid, 4242);
        assert_eq!(identity.home, PathBuf::from("/root"));
    }

    #[test]
    fn current_identity_matches_the_process() {
        let identity = match CallerIdentity::current() {
            Ok(identity) => identity,
            // Containers may run tests under a uid without a password entry.
            Err(_) => return,
        };

        assert_eq!(identity.uid, Uid::current().as_raw());
        assert_eq!(identity.gid, Gid::current().as_raw());
    }

    #[test]
    fn home_is_relative_to_root() {
        assert_eq!(alice().relative_home(), Path::new("home/alice"));
    }
}
