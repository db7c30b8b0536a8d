//! The namespaces a sandbox is created in.
//!
//! Each namespace contributes a flag to `clone(2)`, may check the host before
//! the clone, and may leave behind an [`ExternalConfig`](trait.ExternalConfig.html)
//! that the parent applies to the child before releasing it. The sandbox uses:
//!
//! * [Mounts](struct.Mount.html)
//! * [Process IDs](struct.Pid.html)
//! * [Users and Groups](struct.User.html)

/// Implement `Split` for a namespace with nothing to configure from outside.
macro_rules! discarding_split {
    ($ty:ident) => {
        impl $crate::namespace::Split for $ty {
            type ExternalConfig = ();

            fn split(self) {}
        }
    }
}

mod mount;
mod pid;
mod user;

use std::fmt::Debug;

use nix::sched::CloneFlags;

pub use self::mount::Mount;
pub use self::pid::Pid;
pub use self::user::{IdMap, User};

use ::error::*;
use ::Child;

mod prelude {
    pub(super) use super::CloneFlags;
    pub(super) use super::Namespace;
    pub(super) use super::ExternalConfig;
    pub(super) use super::Split;
}

/// A namespace that can be created by `clone(2)`.
pub trait Namespace: Debug {
    /// The `CLONE_NEW*` flag creating the namespace, if any.
    fn clone_flag(&self) -> Option<CloneFlags> {
        None
    }

    /// Check the host before the namespace is created.
    fn prepare(&self) -> Result<()> {
        Ok(())
    }
}

/// Separate what the parent must do to the child once it exists.
pub trait Split {
    /// Work left for the parent.
    type ExternalConfig: ExternalConfig;

    /// Consume the namespace, keeping the work left for the parent.
    fn split(self) -> Self::ExternalConfig;
}

/// Configuration applied by the parent to a cloned child.
///
/// The child does not run until every external configuration of its context
/// has been applied.
pub trait ExternalConfig: Debug {
    /// Configure the child from outside its namespaces.
    fn configure(&mut self, _child: &Child) -> Result<()> {
        Ok(())
    }
}

impl ExternalConfig for () {}

/// A namespace held by a context until the child is cloned.
pub(crate) trait BoxedSplit: Namespace {
    /// Split the namespace, leaving nothing behind.
    ///
    /// Returns `None` when already split.
    fn take_split(&mut self) -> Option<Box<dyn ExternalConfig>>;
}

/// Holds a namespace until it is split.
#[derive(Debug)]
pub(crate) struct Pending<N>(Option<N>);

impl<N> Pending<N>
where
    N: Namespace + Split + 'static,
{
    pub(crate) fn boxed(namespace: N) -> Box<dyn BoxedSplit> {
        Box::new(Pending(Some(namespace)))
    }
}

impl<N: Namespace> Namespace for Pending<N> {
    fn clone_flag(&self) -> Option<CloneFlags> {
        self.0.as_ref().and_then(Namespace::clone_flag)
    }

    fn prepare(&self) -> Result<()> {
        match self.0 {
            Some(ref namespace) => namespace.prepare(),
            None => Ok(()),
        }
    }
}

impl<N> BoxedSplit for Pending<N>
where
    N: Namespace + Split,
    N::ExternalConfig: 'static,
{
    fn take_split(&mut self) -> Option<Box<dyn ExternalConfig>> {
        self.0.take().map(|namespace| {
            Box::new(namespace.split()) as Box<dyn ExternalConfig>
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pending_forwards_flags_until_split() {
        let mut pending = Pending::boxed(Pid::new());
        assert_eq!(pending.clone_flag(), Some(CloneFlags::CLONE_NEWPID));

        assert!(pending.take_split().is_some());
        assert_eq!(pending.clone_flag(), None);
        assert!(pending.take_split().is_none());
    }
}
