//! Compilation targets.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of code a target produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    /// Native host execution (`"llvm"`, `"host"`, `"cpu"`).
    Host,
    /// Portable C source alongside host execution.
    C,
    /// A named custom backend. Only operators that list the backend support it.
    Custom(String),
}

impl TargetKind {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "llvm" | "host" | "cpu" => Ok(TargetKind::Host),
            "c" => Ok(TargetKind::C),
            name if !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') =>
            {
                Ok(TargetKind::Custom(name.to_string()))
            }
            other => Err(Error::InvalidTarget(format!("unrecognized target '{other}'"))),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Host => f.write_str("llvm"),
            TargetKind::C => f.write_str("c"),
            TargetKind::Custom(name) => f.write_str(name),
        }
    }
}

/// Compilation target: a device kind plus, for custom devices, the host that drives it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    kind: TargetKind,
    host: Option<TargetKind>,
}

impl Target {
    pub fn host() -> Self {
        Self {
            kind: TargetKind::Host,
            host: None,
        }
    }

    pub fn c() -> Self {
        Self {
            kind: TargetKind::C,
            host: None,
        }
    }

    pub fn custom(name: &str) -> Self {
        Self {
            kind: TargetKind::Custom(name.to_string()),
            host: None,
        }
    }

    /// Attach a host to a custom target.
    ///
    /// Returns an error unless `self` is a custom target and `host` is a
    /// built-in kind.
    pub fn with_host(mut self, host: TargetKind) -> Result<Self> {
        if !matches!(self.kind, TargetKind::Custom(_)) {
            return Err(Error::InvalidTarget(format!(
                "target '{}' does not take a host",
                self.kind
            )));
        }
        if matches!(host, TargetKind::Custom(_)) {
            return Err(Error::InvalidTarget(format!(
                "host '{host}' must be a built-in target"
            )));
        }
        self.host = Some(host);
        Ok(self)
    }

    /// Parse a target string such as `"llvm"`, `"c"`, or `"custom -host=llvm"`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let kind = parts
            .next()
            .ok_or_else(|| Error::InvalidTarget("empty target string".to_string()))?;
        let mut target = Self {
            kind: TargetKind::parse(kind)?,
            host: None,
        };
        for option in parts {
            match option.strip_prefix("-host=") {
                Some(host) => target = target.with_host(TargetKind::parse(host)?)?,
                None => {
                    return Err(Error::InvalidTarget(format!(
                        "unknown target option '{option}'"
                    )));
                }
            }
        }
        Ok(target)
    }

    pub fn kind(&self) -> &TargetKind {
        &self.kind
    }

    pub fn host_kind(&self) -> Option<&TargetKind> {
        self.host.as_ref()
    }

    /// Whether kernels for this target can run on the host CPU.
    ///
    /// Custom targets qualify only when driven by a built-in host.
    pub fn runs_on_host(&self) -> bool {
        match self.kind {
            TargetKind::Host | TargetKind::C => true,
            TargetKind::Custom(_) => self.host.is_some(),
        }
    }

    /// Whether compiled kernels carry generated C source.
    pub fn emits_c_source(&self) -> bool {
        self.kind == TargetKind::C || self.host == Some(TargetKind::C)
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::host()
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(host) = &self.host {
            write!(f, " -host={host}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builtin() {
        assert_eq!(Target::parse("llvm").unwrap(), Target::host());
        assert_eq!(Target::parse("cpu").unwrap(), Target::host());
        assert_eq!(Target::parse("c").unwrap(), Target::c());
    }

    #[test]
    fn test_parse_custom_with_host() {
        let target: Target = "custom -host=llvm".parse().unwrap();
        assert_eq!(target.kind(), &TargetKind::Custom("custom".to_string()));
        assert_eq!(target.host_kind(), Some(&TargetKind::Host));
        assert!(target.runs_on_host());
        assert_eq!(target.to_string(), "custom -host=llvm");
    }

    #[test]
    fn test_custom_without_host_does_not_run_on_host() {
        assert!(!Target::custom("accel").runs_on_host());
    }

    #[test]
    fn test_host_option_rejected_for_builtin() {
        assert!(Target::parse("llvm -host=c").is_err());
        assert!(Target::parse("custom -host=other").is_err());
        assert!(Target::parse("custom -opt=3").is_err());
        assert!(Target::parse("").is_err());
    }

    #[test]
    fn test_c_source_emission() {
        assert!(Target::c().emits_c_source());
        assert!(!Target::host().emits_c_source());
        let hosted = Target::custom("custom").with_host(TargetKind::C).unwrap();
        assert!(hosted.emits_c_source());
    }
}
