use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::panic::{self, PanicHookInfo};
use std::process::abort;

use libc::SIGCHLD;
use nix::fcntl::OFlag;
use nix::sched::{clone, CloneFlags};
use nix::unistd::{close, pipe2, Pid};
use nix::sys::wait::{waitpid, WaitStatus};

use error::*;
use ::namespace::{BoxedSplit, ExternalConfig, Namespace, Pending, Split};

/// A process execution context constructed of namespaces.
#[derive(Debug)]
pub struct Context {
    namespaces: Vec<Box<dyn BoxedSplit>>,
}

/// The collection of external configrations of a context.
#[derive(Debug)]
pub struct ContextOuter {
    configs: Vec<Box<dyn ExternalConfig>>,
}

/// The child half of a context: holds the child back until the parent has configured it.
struct ContextInner {
    ready: Option<OwnedFd>,
    parent_end: RawFd,
}

/// Byte sent by the parent once every external configuration has been applied.
const READY: u8 = b'1';

impl Context {
    /// Create a new empty context.
    ///
    /// This will effectively be configured to be a context that executes code
    /// in a new process with the same privileges as the parent.
    pub fn new() -> Context {
        Context {
            namespaces: Vec::new(),
        }
    }

    /// Add a namespace configuration to the context.
    pub fn with<N>(mut self, ns: N) -> Context
    where
        N: 'static + Namespace + Split
    {
        self.push(ns);
        self
    }

    /// Push a new configuration into the context.
    pub fn push<N>(&mut self, ns: N)
    where
        N: 'static + Namespace + Split
    {
        self.namespaces.push(Pending::boxed(ns));
    }

    /// Create and enter the context, running the given function in the child.
    ///
    /// The child gets a copy of the address space of the caller. It only runs
    /// `f` once the parent has applied every external configuration (such as
    /// the user namespace id maps). The value returned by `f` becomes the exit
    /// status of the child; `f` is expected to `exec` on success.
    pub fn spawn<C>(self, f: C) -> Result<Child>
    where
        C: FnMut() -> Result<()>
    {
        let flags = self.clone_flag().unwrap_or(CloneFlags::empty());
        self.prepare()?;

        let mut external = self.split();
        let (ready, parent_end) = pipe2(OFlag::O_CLOEXEC)
            .chain_err(|| ErrorKind::Namespace("creating synchronisation pipe".into()))?;
        let internal = ContextInner {
            ready: Some(ready),
            parent_end: parent_end.as_raw_fd(),
        };

        let mut stack = vec![0u8; Stack::SIZE];
        // The closure runs on its own copy of the address space, so it owns
        // nothing the parent still uses.
        let pid = unsafe {
            clone(internal.wrap(f), &mut stack, flags, Some(SIGCHLD))
        }.chain_err(|| ErrorKind::Namespace(format!("cloning with {:?}", flags)))?;
        let child = Child::from_pid(pid);
        debug!(pid = %child.pid(), ?flags, "cloned child");

        let mut parent_end = File::from(parent_end);
        if let Err(err) = external.configure(&child) {
            drop(parent_end);
            let _ = child.wait();
            return Err(err);
        }
        parent_end.write_all(&[READY])
            .chain_err(|| ErrorKind::Namespace("releasing child".into()))?;

        Ok(child)
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

impl ContextInner {
    /// Initialise the child process.
    fn wrap<'a, C>(mut self, mut child: C) -> Box<dyn FnMut() -> isize + 'a>
    where
        C: FnMut() -> Result<()> + 'a
    {
        Box::new(move || {
            panic::set_hook(Box::new(ContextInner::panic_hook));

            if let Err(err) = self.await_parent() {
                eprintln!("Failed to configure context externally: {}", err.one_line());
                return 1;
            }

            match child() {
                Ok(()) => 0,
                Err(err) => {
                    eprintln!("burrow: {}", err.one_line());
                    1
                }
            }
        })
    }

    /// Block until the parent has configured the namespaces.
    fn await_parent(&mut self) -> Result<()> {
        close(self.parent_end)?;

        let mut ready = match self.ready.take() {
            Some(fd) => File::from(fd),
            None => bail!(ErrorKind::Namespace("child started twice".into())),
        };

        let mut byte = [0u8; 1];
        if ready.read(&mut byte)? != 1 || byte[0] != READY {
            bail!(ErrorKind::Namespace("parent abandoned the child".into()));
        }

        Ok(())
    }

    /// A hook to catch panics within a child.
    fn panic_hook(info: &PanicHookInfo) {
        eprintln!("Context panic: {}", info);
        abort();
    }
}

impl Namespace for Context {
    fn clone_flag(&self) -> Option<CloneFlags> {
        Some(
            self.namespaces.iter()
                .flat_map(|n| n.clone_flag())
                .fold(CloneFlags::empty(), |flags, flag| flags | flag)
        )
    }

    fn prepare(&self) -> Result<()> {
        for ns in &self.namespaces {
            ns.prepare()?;
        }

        Ok(())
    }
}

impl Split for Context {
    type ExternalConfig = ContextOuter;

    fn split(self) -> ContextOuter {
        let configs = self.namespaces
            .into_iter()
            .filter_map(|mut ns| ns.take_split())
            .collect();

        ContextOuter { configs: configs }
    }
}

impl ExternalConfig for ContextOuter {
    fn configure(&mut self, child: &Child) -> Result<()> {
        for config in &mut self.configs {
            config.configure(child)?;
        }

        Ok(())
    }
}

struct Stack;

impl Stack {
    const SIZE: usize = 8 * 1024 * 1024;
}

/// The child process that has been started in the context.
#[derive(Debug)]
pub struct Child(Pid);

impl Child {
    fn from_pid(pid: Pid) -> Child {
        Child(pid)
    }

    /// Wait for a the child process to exit.
    pub fn wait(&self) -> Result<WaitStatus> {
        loop {
            match waitpid(self.pid(), None)? {
                status @ WaitStatus::Exited(..) | status @ WaitStatus::Signaled(..) => {
                    return Ok(status)
                }
                _ => continue,
            }
        }
    }

    /// Wait for the child process to exit and return its exit code.
    ///
    /// A child killed by a signal reports `128 + signal`, as a shell does.
    pub fn wait_code(&self) -> Result<i32> {
        match self.wait()? {
            WaitStatus::Exited(_, code) => Ok(code),
            WaitStatus::Signaled(_, signal, _) => Ok(128 + signal as i32),
            status => bail!(ErrorKind::Namespace(format!("unexpected wait status {:?}", status))),
        }
    }

    /// Get the PID of the child process.
    pub fn pid(&self) -> Pid {
        self.0
    }
}
