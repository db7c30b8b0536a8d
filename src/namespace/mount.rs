use super::prelude::*;

/// Mounts
///
/// Each process exists in a particular mount namespace which specifies which
/// *additional* mount mappings exist over the base file-system. This means that
/// if a set of processes exists in a separate mount namespace, they can have
/// directory mounts applied that are not visible to processes in any other
/// namespace. These processes are also unable to affect the mounts on external
/// namespaces.
///
/// Mount namespaces are copied on creation, including the propagation type of
/// each mount; the sandbox makes its copy private before mounting anything.
#[derive(Debug, Clone, Default)]
pub struct Mount {}

discarding_split!(Mount);

impl Mount {
	/// Configure a new mount namespace for creation.
	pub fn new() -> Mount {
		Mount {}
	}
}

impl Namespace for Mount {
	fn clone_flag(&self) -> Option<CloneFlags> {
		Some(CloneFlags::CLONE_NEWNS)
	}
}
