//! Unprivileged, per-invocation sandboxes for a shell.
//!
//! A sandbox is built in three steps:
//!
//! 1. The invoking process clones a child into new user, mount and PID
//!    namespaces, mapping the child's root onto the caller, and the child
//!    re-executes this program with the caller's identity and configuration
//!    ([`entry`](entry/index.html), [`handoff`](handoff/index.html)).
//! 1. The re-executed process assembles a private root out of bind mounts of
//!    the host on a tmpfs ([`rootfs`](rootfs/index.html)) and fills in the
//!    caller's home ([`home`](home/index.html)).
//! 1. It starts the shell chrooted into that root, in a second user namespace
//!    that maps the caller back onto itself ([`launch`](launch/index.html)).
//!
//! [`Stage`](stage/enum.Stage.html) ties the steps together.

#![warn(missing_docs)]
#![deny(unused_must_use)]
#![warn(missing_debug_implementations)]

#[macro_use]
extern crate error_chain;
extern crate libc;
extern crate nix;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate toml;
#[macro_use]
extern crate tracing;
extern crate unshare;

mod error;
mod context;
pub mod config;
pub mod entry;
pub mod handoff;
pub mod home;
pub mod identity;
pub mod launch;
pub mod mounts;
pub mod namespace;
pub mod rootfs;
pub mod stage;

pub use config::{Overrides, SandboxConfig, DEFAULT_CONFIG};
pub use context::{Child, Context};
pub use error::*;
pub use handoff::Handoff;
pub use identity::CallerIdentity;
pub use rootfs::SandboxRoot;
pub use stage::Stage;
