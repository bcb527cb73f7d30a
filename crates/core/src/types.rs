//! Identity types for programs and runs
//!
//! - `ProgramType`: the closed set of program kinds
//! - `ProgramId`: namespace/application/type/program
//! - `RunId`: time-ordered run identifier (UUIDv7)
//! - `Scope`: target of bulk deletes

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::{NoContext, Timestamp, Uuid};

/// Kind of program a run belongs to
///
/// The byte code is part of the persisted key layout and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProgramType {
    /// Realtime flow
    Flow = 0x01,
    /// MapReduce batch job
    Mapreduce = 0x02,
    /// Spark batch job
    Spark = 0x03,
    /// Workflow orchestrating other programs
    Workflow = 0x04,
    /// Long-running service
    Service = 0x05,
    /// Long-running worker
    Worker = 0x06,
}

impl ProgramType {
    /// Stable byte code used in keys
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Decode from a key byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(ProgramType::Flow),
            0x02 => Some(ProgramType::Mapreduce),
            0x03 => Some(ProgramType::Spark),
            0x04 => Some(ProgramType::Workflow),
            0x05 => Some(ProgramType::Service),
            0x06 => Some(ProgramType::Worker),
            _ => None,
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramType::Flow => "flow",
            ProgramType::Mapreduce => "mapreduce",
            ProgramType::Spark => "spark",
            ProgramType::Workflow => "workflow",
            ProgramType::Service => "service",
            ProgramType::Worker => "worker",
        }
    }
}

impl fmt::Display for ProgramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgramType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flow" => Ok(ProgramType::Flow),
            "mapreduce" => Ok(ProgramType::Mapreduce),
            "spark" => Ok(ProgramType::Spark),
            "workflow" => Ok(ProgramType::Workflow),
            "service" => Ok(ProgramType::Service),
            "worker" => Ok(ProgramType::Worker),
            other => Err(Error::InvalidInput(format!("unknown program type '{}'", other))),
        }
    }
}

/// Fully qualified program identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramId {
    /// Tenant namespace
    pub namespace: String,
    /// Application within the namespace
    pub application: String,
    /// Program kind
    pub program_type: ProgramType,
    /// Program name within the application
    pub program: String,
}

impl ProgramId {
    /// Create a program id
    pub fn new(
        namespace: impl Into<String>,
        application: impl Into<String>,
        program_type: ProgramType,
        program: impl Into<String>,
    ) -> Self {
        ProgramId {
            namespace: namespace.into(),
            application: application.into(),
            program_type,
            program: program.into(),
        }
    }

    /// Shorthand for a workflow program id
    pub fn workflow(
        namespace: impl Into<String>,
        application: impl Into<String>,
        workflow: impl Into<String>,
    ) -> Self {
        Self::new(namespace, application, ProgramType::Workflow, workflow)
    }

    /// Same namespace and application, different program
    pub fn sibling(&self, program_type: ProgramType, program: impl Into<String>) -> Self {
        ProgramId {
            program_type,
            program: program.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.namespace, self.application, self.program_type, self.program
        )
    }
}

/// Time-ordered run identifier
///
/// Backed by a UUIDv7 whose embedded unix timestamp is the run's creation
/// time, so the id alone yields the coarse start time used by range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// New run id stamped with the current wall clock
    pub fn new() -> Self {
        RunId(Uuid::now_v7())
    }

    /// New run id stamped with `secs` since the unix epoch
    pub fn from_time(secs: u64) -> Self {
        RunId(Uuid::new_v7(Timestamp::from_unix(NoContext, secs, 0)))
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        RunId(uuid)
    }

    /// Parse the hyphenated string form
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(RunId)
            .map_err(|e| Error::InvalidInput(format!("invalid run id '{}': {}", s, e)))
    }

    /// Creation time in seconds since the unix epoch
    ///
    /// Ids without an embedded timestamp (for example v4) report 0.
    pub fn time_secs(&self) -> u64 {
        self.0
            .get_timestamp()
            .map(|ts| ts.to_unix().0)
            .unwrap_or(0)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for RunId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RunId::parse(s)
    }
}

impl PartialOrd for RunId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RunId {
    /// Creation second first, full id string as tie-break
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time_secs()
            .cmp(&other.time_secs())
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

/// Target of a bulk delete
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every application in a namespace
    Namespace(String),
    /// One application
    Application {
        /// Namespace of the application
        namespace: String,
        /// Application name
        application: String,
    },
}

impl Scope {
    /// Scope covering one application
    pub fn application(namespace: impl Into<String>, application: impl Into<String>) -> Self {
        Scope::Application {
            namespace: namespace.into(),
            application: application.into(),
        }
    }

    /// Scope covering a namespace
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Scope::Namespace(namespace.into())
    }

    /// Whether a program falls inside this scope
    pub fn contains(&self, program: &ProgramId) -> bool {
        match self {
            Scope::Namespace(ns) => program.namespace == *ns,
            Scope::Application {
                namespace,
                application,
            } => program.namespace == *namespace && program.application == *application,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Namespace(ns) => write!(f, "{}", ns),
            Scope::Application {
                namespace,
                application,
            } => write!(f, "{}.{}", namespace, application),
        }
    }
}
