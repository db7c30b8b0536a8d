use super::prelude::*;

/// Process IDs
///
/// Process IDs are unique and specific to a PID namespace. Processes from
/// different namespaces are unable to determine any information about processes
/// in other PID namespaces.
///
/// The first process created in a new PID namespace is its init. When it exits
/// every other process in the namespace is killed.
#[derive(Debug, Clone, Default)]
pub struct Pid {}

discarding_split!(Pid);

impl Pid {
	/// Configure a new PID namespace to for creation.
	pub fn new() -> Pid {
		Pid {}
	}
}

impl Namespace for Pid {
	fn clone_flag(&self) -> Option<CloneFlags> {
		Some(CloneFlags::CLONE_NEWPID)
	}
}
