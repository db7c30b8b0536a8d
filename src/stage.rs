//! The stages a sandbox invocation passes through.
//!
//! ```text
//! AwaitingNamespaceEntry ──clone+exec──▶ Building ──▶ Launching ──▶ exit code
//!     (host, as caller)              (namespace root)
//! ```
//!
//! The first stage runs in the invoking process. The re-executed process
//! starts in `Building`, recognised from its arguments, and moves on to
//! `Launching` in place.

use config::SandboxConfig;
use entry;
use error::*;
use handoff::Handoff;
use home;
use identity::CallerIdentity;
use launch;
use rootfs::{self, Host, SandboxRoot};

/// Where an invocation is in the sandbox pipeline.
#[derive(Debug)]
pub enum Stage {
    /// On the host, about to create the namespaces.
    AwaitingNamespaceEntry {
        /// The caller.
        identity: CallerIdentity,
        /// Validated configuration.
        config: SandboxConfig,
    },
    /// Inside the namespaces, about to build the root and home.
    Building {
        /// What the entering process passed on.
        handoff: Handoff,
    },
    /// Inside the namespaces with the root built, about to start the shell.
    Launching {
        /// The built root.
        root: SandboxRoot,
        /// What the entering process passed on.
        handoff: Handoff,
    },
}

/// The outcome of advancing a stage.
#[derive(Debug)]
pub enum Transition {
    /// Continue with another stage in this process.
    Next(Stage),
    /// The invocation is over; exit with this code.
    Exit(i32),
}

impl Stage {
    /// The first stage of an invocation by the current user.
    pub fn start(config: SandboxConfig) -> Result<Stage> {
        Ok(Stage::AwaitingNamespaceEntry {
            identity: CallerIdentity::current()?,
            config: config,
        })
    }

    /// The stage of a re-executed process, if these are its arguments.
    pub fn from_args<I>(args: I) -> Result<Option<Stage>>
    where
        I: IntoIterator<Item = String>
    {
        Ok(Handoff::from_args(args)?.map(|handoff| Stage::Building { handoff: handoff }))
    }

    /// A short name for logging.
    pub fn name(&self) -> &'static str {
        match *self {
            Stage::AwaitingNamespaceEntry { .. } => "awaiting-namespace-entry",
            Stage::Building { .. } => "building",
            Stage::Launching { .. } => "launching",
        }
    }

    /// Perform this stage.
    pub fn advance(self) -> Result<Transition> {
        info!(stage = self.name(), "advancing");

        match self {
            Stage::AwaitingNamespaceEntry { identity, config } => {
                identity.ensure_unprivileged()?;
                config.validate()?;

                let code = entry::enter(&Handoff::new(identity, config))?;
                Ok(Transition::Exit(code))
            }
            Stage::Building { handoff } => {
                handoff.identity.ensure_unprivileged()?;
                handoff.config.validate()?;
                entry::ensure_inside()?;

                let root = rootfs::build(&Host::system(), SandboxRoot::default(), &handoff.config)?;
                home::build(&root, &handoff.identity, &handoff.config)?;

                Ok(Transition::Next(Stage::Launching {
                    root: root,
                    handoff: handoff,
                }))
            }
            Stage::Launching { root, handoff } => {
                let code = launch::launch(&root, &handoff.identity, &handoff.config)?;
                Ok(Transition::Exit(code))
            }
        }
    }

    /// Advance through every remaining stage.
    pub fn run(self) -> Result<i32> {
        let mut stage = self;

        loop {
            match stage.advance()? {
                Transition::Next(next) => stage = next,
                Transition::Exit(code) => return Ok(code),
            }
        }
    }
}
