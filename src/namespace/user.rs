use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use ::error::*;
use ::Child;
use super::prelude::*;

/// Users and Groups
///
/// User namespaces control the access privileges of UIDs and GIDs. When a new
/// user namespace is created, the initial process in that namespace is
/// considered user 0 within that namespace but has the privileges of the user
/// that created that namespace in the parent namespace.
///
/// An unprivileged creator may map exactly one id: its own. The sandbox maps
/// namespace root onto the calling user and group so that mounting and
/// `chroot` become possible without gaining anything on the host.
#[derive(Debug, Clone, Default)]
pub struct User {
	uid_map: Option<IdMap>,
	gid_map: Option<IdMap>,
}

impl User {
	/// Configure a new user namespace for creation.
	pub fn new() -> User {
		Default::default()
	}

	/// Map the root user to the given user of the parent namespace.
	pub fn map_root_user(self, outside: u32) -> User {
		User {
			uid_map: Some(IdMap::root(outside)),
			..
			self
		}
	}

	/// Map the root group to the given group of the parent namespace.
	pub fn map_root_group(self, outside: u32) -> User {
		User {
			gid_map: Some(IdMap::root(outside)),
			..
			self
		}
	}
}

impl Namespace for User {
	fn clone_flag(&self) -> Option<CloneFlags> {
		Some(CloneFlags::CLONE_NEWUSER)
	}

	fn prepare(&self) -> Result<()> {
		if disabled_by_sysctl("/proc/sys/kernel/unprivileged_userns_clone")?
			|| disabled_by_sysctl("/proc/sys/user/max_user_namespaces")?
		{
			bail!(ErrorKind::Namespace(
				"unprivileged user namespaces are disabled on this host".into()
			));
		}

		Ok(())
	}
}

impl Split for User {
	type ExternalConfig = IdMapWriter;

	fn split(self) -> IdMapWriter {
		IdMapWriter {
			uid_map: self.uid_map,
			gid_map: self.gid_map,
		}
	}
}

/// Check whether a sysctl that gates user namespaces is set to zero.
///
/// Kernels without the sysctl do not gate them.
fn disabled_by_sysctl(path: &str) -> Result<bool> {
	if !Path::new(path).exists() {
		return Ok(false);
	}

	let value = fs::read_to_string(path)
		.chain_err(|| ErrorKind::HostInspection(path.into()))?;
	Ok(value.trim() == "0")
}

/// A single contiguous range of a user or group id map.
///
/// Written to `/proc/<pid>/uid_map` and `/proc/<pid>/gid_map` as
/// `<inside> <outside> <count>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMap {
	/// First id inside the namespace.
	pub inside: u32,
	/// First id in the parent namespace.
	pub outside: u32,
	/// Number of ids mapped.
	pub count: u32,
}

impl IdMap {
	/// Map a single id.
	pub fn single(inside: u32, outside: u32) -> IdMap {
		IdMap {
			inside: inside,
			outside: outside,
			count: 1,
		}
	}

	/// Map id 0 inside the namespace to `outside`.
	pub fn root(outside: u32) -> IdMap {
		IdMap::single(0, outside)
	}

	/// Translate an id inside the namespace to the parent namespace.
	#[cfg(test)]
	pub fn to_outside(&self, inside: u32) -> Option<u32> {
		if inside >= self.inside && inside - self.inside < self.count {
			Some(self.outside + (inside - self.inside))
		} else {
			None
		}
	}
}

impl fmt::Display for IdMap {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{} {} {}", self.inside, self.outside, self.count)
	}
}

/// Writes the id maps of a freshly cloned child.
#[derive(Debug)]
pub struct IdMapWriter {
	uid_map: Option<IdMap>,
	gid_map: Option<IdMap>,
}

impl IdMapWriter {
	fn write_map(child: &Child, file: &str, map: &IdMap) -> Result<()> {
		let path = format!("/proc/{}/{}", child.pid(), file);
		let mut target = OpenOptions::new()
			.write(true)
			.open(&path)
			.chain_err(|| ErrorKind::Namespace(format!("opening {}", path)))?;
		target.write_all(format!("{}\n", map).as_bytes())
			.chain_err(|| ErrorKind::Namespace(format!("writing '{}' to {}", map, path)))?;

		Ok(())
	}
}

impl ExternalConfig for IdMapWriter {
	fn configure(&mut self, child: &Child) -> Result<()> {
		if let Some(ref map) = self.uid_map {
			IdMapWriter::write_map(child, "uid_map", map)?;
			debug!(pid = %child.pid(), map = %map, "wrote uid map");
		}

		if let Some(ref map) = self.gid_map {
			// An unprivileged parent may only write gid_map once setgroups is denied.
			SetGroups::Deny.write(child)?;
			IdMapWriter::write_map(child, "gid_map", map)?;
			debug!(pid = %child.pid(), map = %map, "wrote gid map");
		}

		Ok(())
	}
}

/// Set the ability for the child process to change its own group mappings.
#[derive(Debug, Clone, Copy)]
enum SetGroups {
	Deny,
}

impl SetGroups {
	fn write(&self, child: &Child) -> Result<()> {
		let path = format!("/proc/{}/setgroups", child.pid());
		let mut setgroups = OpenOptions::new()
			.write(true)
			.open(&path)
			.chain_err(|| ErrorKind::Namespace(format!("opening {}", path)))?;
		setgroups.write_all(format!("{}", self).as_bytes())
			.chain_err(|| ErrorKind::Namespace(format!("writing {}", path)))?;

		Ok(())
	}
}

impl fmt::Display for SetGroups {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			SetGroups::Deny => write!(f, "deny"),
		}
	}
}
