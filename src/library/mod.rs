//! Library resources - artifacts installed onto a cluster
//!
//! The control plane encodes the kind of a library as an implicit union:
//! exactly one of `jar`, `egg`, `whl`, `pypi`, `maven` or `cran` is present.
//! [`LibrarySpec`] is the closed enum over those kinds; (de)serialization
//! goes through [`LibraryWire`] and rejects objects with zero or several
//! kinds populated.

pub mod diff;

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cluster::ValidationError;

pub use diff::{diff_libraries, is_converged, InstallAttempts, LibraryDiff};

// ============================================================================
// LibrarySpec
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PyPiLibrary {
    /// Package with optional version pin, e.g. `seaborn==1.2.4`
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MavenLibrary {
    /// `group:artifact[:classifier]:version`
    pub coordinates: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CranLibrary {
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

/// A single installable artifact. Two specs name the same library iff every
/// field of the active variant matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "LibraryWire", into = "LibraryWire")]
pub enum LibrarySpec {
    Jar(String),
    Egg(String),
    Whl(String),
    Pypi(PyPiLibrary),
    Maven(MavenLibrary),
    Cran(CranLibrary),
}

impl LibrarySpec {
    pub fn jar(path: impl Into<String>) -> Self {
        LibrarySpec::Jar(path.into())
    }

    pub fn egg(path: impl Into<String>) -> Self {
        LibrarySpec::Egg(path.into())
    }

    pub fn whl(path: impl Into<String>) -> Self {
        LibrarySpec::Whl(path.into())
    }

    pub fn pypi(package: impl Into<String>) -> Self {
        LibrarySpec::Pypi(PyPiLibrary {
            package: package.into(),
            repo: None,
        })
    }

    pub fn maven(coordinates: impl Into<String>) -> Self {
        LibrarySpec::Maven(MavenLibrary {
            coordinates: coordinates.into(),
            repo: None,
            exclusions: Vec::new(),
        })
    }

    pub fn cran(package: impl Into<String>) -> Self {
        LibrarySpec::Cran(CranLibrary {
            package: package.into(),
            repo: None,
        })
    }

    /// Kind name as used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            LibrarySpec::Jar(_) => "jar",
            LibrarySpec::Egg(_) => "egg",
            LibrarySpec::Whl(_) => "whl",
            LibrarySpec::Pypi(_) => "pypi",
            LibrarySpec::Maven(_) => "maven",
            LibrarySpec::Cran(_) => "cran",
        }
    }

    /// Check field-level constraints of the active variant
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |msg: String| Err(ValidationError::InvalidLibrary(msg));

        match self {
            LibrarySpec::Jar(path) | LibrarySpec::Egg(path) | LibrarySpec::Whl(path) => {
                if path.trim().is_empty() {
                    return invalid(format!("{} path must not be empty", self.kind()));
                }
                let extension = format!(".{}", self.kind());
                if !path.to_ascii_lowercase().ends_with(&extension) {
                    return invalid(format!(
                        "{} path '{}' must end with {}",
                        self.kind(),
                        path,
                        extension
                    ));
                }
            }
            LibrarySpec::Pypi(pypi) if pypi.package.trim().is_empty() => {
                return invalid("pypi package must not be empty".to_string());
            }
            LibrarySpec::Cran(cran) if cran.package.trim().is_empty() => {
                return invalid("cran package must not be empty".to_string());
            }
            LibrarySpec::Maven(maven) => {
                let coordinates = Regex::new(r"^[^:\s]+(:[^:\s]+){2,3}$")
                    .map_err(|e| ValidationError::InvalidLibrary(e.to_string()))?;
                if !coordinates.is_match(&maven.coordinates) {
                    return invalid(format!(
                        "maven coordinates '{}' must look like group:artifact:version",
                        maven.coordinates
                    ));
                }
                let exclusion = Regex::new(r"^[^:\s]+:[^:\s]+$")
                    .map_err(|e| ValidationError::InvalidLibrary(e.to_string()))?;
                if let Some(bad) = maven.exclusions.iter().find(|e| !exclusion.is_match(e)) {
                    return invalid(format!(
                        "maven exclusion '{}' must look like group:artifact",
                        bad
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl fmt::Display for LibrarySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibrarySpec::Jar(path) | LibrarySpec::Egg(path) | LibrarySpec::Whl(path) => {
                write!(f, "{}:{}", self.kind(), path)
            }
            LibrarySpec::Pypi(pypi) => write!(f, "pypi:{}", pypi.package),
            LibrarySpec::Maven(maven) => write!(f, "maven:{}", maven.coordinates),
            LibrarySpec::Cran(cran) => write!(f, "cran:{}", cran.package),
        }
    }
}

/// Wire layout of a library: one optional field per kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pypi: Option<PyPiLibrary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maven: Option<MavenLibrary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cran: Option<CranLibrary>,
}

impl TryFrom<LibraryWire> for LibrarySpec {
    type Error = ValidationError;

    fn try_from(wire: LibraryWire) -> Result<Self, Self::Error> {
        let mut kinds = Vec::with_capacity(1);
        if let Some(path) = wire.jar {
            kinds.push(LibrarySpec::Jar(path));
        }
        if let Some(path) = wire.egg {
            kinds.push(LibrarySpec::Egg(path));
        }
        if let Some(path) = wire.whl {
            kinds.push(LibrarySpec::Whl(path));
        }
        if let Some(pypi) = wire.pypi {
            kinds.push(LibrarySpec::Pypi(pypi));
        }
        if let Some(maven) = wire.maven {
            kinds.push(LibrarySpec::Maven(maven));
        }
        if let Some(cran) = wire.cran {
            kinds.push(LibrarySpec::Cran(cran));
        }

        match kinds.len() {
            1 => Ok(kinds.remove(0)),
            0 => Err(ValidationError::InvalidLibrary(
                "one of jar, egg, whl, pypi, maven or cran must be set".to_string(),
            )),
            _ => {
                let names: Vec<_> = kinds.iter().map(|k| k.kind()).collect();
                Err(ValidationError::InvalidLibrary(format!(
                    "exactly one library kind may be set, got {}",
                    names.join(", ")
                )))
            }
        }
    }
}

impl From<LibrarySpec> for LibraryWire {
    fn from(spec: LibrarySpec) -> Self {
        let mut wire = LibraryWire::default();
        match spec {
            LibrarySpec::Jar(path) => wire.jar = Some(path),
            LibrarySpec::Egg(path) => wire.egg = Some(path),
            LibrarySpec::Whl(path) => wire.whl = Some(path),
            LibrarySpec::Pypi(pypi) => wire.pypi = Some(pypi),
            LibrarySpec::Maven(maven) => wire.maven = Some(maven),
            LibrarySpec::Cran(cran) => wire.cran = Some(cran),
        }
        wire
    }
}

// ============================================================================
// LibraryStatus
// ============================================================================

/// Install status reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallStatus {
    Pending,
    Resolving,
    Installing,
    Installed,
    Failed,
    Skipped,
    UninstallOnRestart,
    #[serde(other)]
    Unknown,
}

impl InstallStatus {
    /// Install did not and will not succeed without resubmission
    pub fn is_failed(&self) -> bool {
        matches!(self, InstallStatus::Failed | InstallStatus::Skipped)
    }

    /// Still moving towards installed
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            InstallStatus::Pending
                | InstallStatus::Resolving
                | InstallStatus::Installing
                | InstallStatus::Unknown
        )
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallStatus::Pending => "PENDING",
            InstallStatus::Resolving => "RESOLVING",
            InstallStatus::Installing => "INSTALLING",
            InstallStatus::Installed => "INSTALLED",
            InstallStatus::Failed => "FAILED",
            InstallStatus::Skipped => "SKIPPED",
            InstallStatus::UninstallOnRestart => "UNINSTALL_ON_RESTART",
            InstallStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// A library as observed on a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryStatus {
    pub library: LibrarySpec,
    pub status: InstallStatus,

    /// Diagnostic messages, populated for failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,

    /// Installed through the workspace-wide "all clusters" setting; cannot be
    /// removed per cluster
    #[serde(default)]
    pub is_library_for_all_clusters: bool,
}

impl LibraryStatus {
    pub fn new(library: LibrarySpec, status: InstallStatus) -> Self {
        Self {
            library,
            status,
            messages: Vec::new(),
            is_library_for_all_clusters: false,
        }
    }
}
