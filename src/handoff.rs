//! Transfer of the caller identity and configuration across the re-exec.
//!
//! The process that enters the namespaces re-executes itself as
//! `<exe> --handoff <document>`, where the document is a TOML rendering of a
//! [`Handoff`](struct.Handoff.html):
//!
//! ```toml
//! [identity]
//! uid = 1000
//! gid = 1000
//! home = "/home/alice"
//! name = "alice"
//!
//! [config]
//! command = ""
//! shell = "/bin/bash"
//! home_dirs = ["/data/project"]
//! # ...
//! ```

use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;

use config::SandboxConfig;
use error::*;
use identity::CallerIdentity;

/// Argument marking a re-executed process.
pub const HANDOFF_FLAG: &str = "--handoff";

/// Everything the re-executed process needs to build the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    /// Who invoked the sandbox.
    pub identity: CallerIdentity,
    /// What the sandbox contains.
    pub config: SandboxConfig,
}

impl Handoff {
    /// Bundle an identity and a validated configuration.
    pub fn new(identity: CallerIdentity, config: SandboxConfig) -> Handoff {
        Handoff {
            identity: identity,
            config: config,
        }
    }

    /// Render as a TOML document.
    pub fn encode(&self) -> Result<String> {
        Ok(::toml::to_string(self)?)
    }

    /// Parse a TOML document produced by `encode`.
    pub fn decode(text: &str) -> Result<Handoff> {
        ::toml::from_str(text)
            .chain_err(|| ErrorKind::Handoff("undecodable document".into()))
    }

    /// The argument vector that re-executes `exe` with this handoff.
    pub fn to_args<S: AsRef<OsStr>>(&self, exe: S) -> Result<Vec<CString>> {
        let document = self.encode()?;

        [exe.as_ref().as_bytes(), HANDOFF_FLAG.as_bytes(), document.as_bytes()]
            .iter()
            .map(|arg| {
                CString::new(*arg)
                    .chain_err(|| ErrorKind::Handoff("argument contains NUL".into()))
            })
            .collect()
    }

    /// Recover the handoff from the arguments of a re-executed process.
    ///
    /// Returns `None` for an ordinary invocation.
    pub fn from_args<I>(args: I) -> Result<Option<Handoff>>
    where
        I: IntoIterator<Item = String>
    {
        let args: Vec<String> = args.into_iter().collect();
        if args.get(1).map(String::as_str) != Some(HANDOFF_FLAG) {
            return Ok(None);
        }

        if args.len() != 3 {
            bail!(ErrorKind::Handoff(format!(
                "expected one document after {}, got {} arguments",
                HANDOFF_FLAG,
                args.len() - 2
            )));
        }

        Handoff::decode(&args[2]).map(Some)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    fn handoff() -> Handoff {
        let identity = CallerIdentity {
            uid: 1000,
            gid: 100,
            home: "/home/alice".into(),
            name: "alice".into(),
        };
        let config = SandboxConfig {
            command: "echo \"it's\" done".into(),
            home_dirs: vec!["/data/project".into()],
            home_source: Some("/data/home".into()),
            ptys: true,
            ..SandboxConfig::default()
        };

        Handoff::new(identity, config)
    }

    #[test]
    fn document_survives_the_argument_vector() {
        let args: Vec<String> = handoff()
            .to_args("/usr/bin/burrow")
            .unwrap()
            .into_iter()
            .map(|arg| arg.into_string().unwrap())
            .collect();

        assert_eq!(args[0], "/usr/bin/burrow");
        assert_eq!(args[1], HANDOFF_FLAG);
        assert_eq!(Handoff::from_args(args).unwrap(), Some(handoff()));
    }

    #[test]
    fn ordinary_invocation_has_no_handoff() {
        let args = vec!["burrow".to_string(), "-c".to_string(), "ls".to_string()];
        assert_eq!(Handoff::from_args(args).unwrap(), None);
    }

    #[test]
    fn missing_document_is_rejected() {
        let args = vec!["burrow".to_string(), HANDOFF_FLAG.to_string()];
        assert!(Handoff::from_args(args).is_err());
    }

    #[test]
    fn garbage_document_is_rejected() {
        let args = vec![
            "burrow".to_string(),
            HANDOFF_FLAG.to_string(),
            "uid = ".to_string(),
        ];
        match *Handoff::from_args(args).unwrap_err().kind() {
            ErrorKind::Handoff(_) => {}
            ref other => panic!("expected a handoff error, got {:?}", other),
        }
    }

    #[test]
    fn absent_home_source_is_omitted() {
        let mut handoff = handoff();
        handoff.config.home_source = None;

        let text = handoff.encode().unwrap();
        assert!(!text.contains("home_source"));
        assert_eq!(Handoff::decode(&text).unwrap().config.home_source, None::<PathBuf>);
    }
}
