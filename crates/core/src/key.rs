//! Order-preserving composite keys
//!
//! Every stored entry lives under a `Key{table, type_tag, user_key}`. Keys
//! order by table, then type tag, then `user_key` bytes, so the byte layout
//! of `user_key` decides what a range scan returns.
//!
//! ## Component encoding
//!
//! - `u8`: one raw byte
//! - `u64`: eight bytes, big-endian
//! - string: bytes with `0x00` escaped as `0x00 0xFF`, terminated by `0x00 0x01`
//!
//! The escape keeps string components prefix-free: a component is never a
//! prefix of a longer one, and `"ab" < "ab\0" < "abc"` holds byte-wise.
//!
//! ## Layouts
//!
//! | Table | Tag | user_key |
//! |-------|-----|----------|
//! | AppMeta | Run | ns, app, type, program, run_secs, run_id |
//! | AppMeta | RunByStatus | status, run_secs, run_id, ns, app, type, program |
//! | AppMeta | NodeState | ns, app, type, program, run_id, node_id |
//! | AppMeta | WorkflowToken | ns, app, type, program, run_id |
//! | WorkflowStats | WorkflowRun | ns, app, workflow, run_secs, run_id |

use crate::error::{Error, Result};
use crate::run_types::RunStatus;
use crate::types::{ProgramId, ProgramType, RunId, Scope};
use byteorder::{BigEndian, ByteOrder};
use std::fmt;

const ESCAPE: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Logical table an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Table {
    /// Run lifecycle metadata (primary records and indexes)
    AppMeta = 0x01,
    /// Derived statistics of completed workflow runs
    WorkflowStats = 0x02,
}

/// Entry kind within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeTag {
    /// Primary run record
    Run = 0x10,
    /// Status index entry
    RunByStatus = 0x11,
    /// Workflow node state
    NodeState = 0x12,
    /// Workflow token
    WorkflowToken = 0x13,
    /// Completed workflow run summary
    WorkflowRun = 0x20,
}

/// Composite storage key
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    /// Logical table
    pub table: Table,
    /// Entry kind
    pub type_tag: TypeTag,
    /// Encoded components
    pub user_key: Vec<u8>,
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?}/{:?}/", self.table, self.type_tag)?;
        for b in &self.user_key {
            if b.is_ascii_graphic() {
                write!(f, "{}", *b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        write!(f, ")")
    }
}

impl Key {
    /// Create a key from raw parts
    pub fn new(table: Table, type_tag: TypeTag, user_key: Vec<u8>) -> Self {
        Key {
            table,
            type_tag,
            user_key,
        }
    }

    /// Check if this key starts with the given prefix
    ///
    /// Table and tag must match exactly; `user_key` is compared byte-wise.
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.table == prefix.table
            && self.type_tag == prefix.type_tag
            && self.user_key.starts_with(&prefix.user_key)
    }

    /// Reader over the encoded components
    pub fn reader(&self) -> KeyReader<'_> {
        KeyReader::new(&self.user_key)
    }

    // ========== Run records ==========

    /// Primary key of a run record
    pub fn run(program: &ProgramId, run_id: &RunId) -> Self {
        let user_key = KeyBuilder::new()
            .program(program)
            .u64(run_id.time_secs())
            .str(&run_id.to_string())
            .finish();
        Key::new(Table::AppMeta, TypeTag::Run, user_key)
    }

    /// Prefix covering every run of a program
    pub fn run_program_prefix(program: &ProgramId) -> Self {
        Key::new(
            Table::AppMeta,
            TypeTag::Run,
            KeyBuilder::new().program(program).finish(),
        )
    }

    /// Lower bound for runs of `program` created at or after `secs`
    pub fn run_time_bound(program: &ProgramId, secs: u64) -> Self {
        Key::new(
            Table::AppMeta,
            TypeTag::Run,
            KeyBuilder::new().program(program).u64(secs).finish(),
        )
    }

    /// Prefix covering every run inside a scope
    pub fn run_scope_prefix(scope: &Scope) -> Self {
        Key::new(
            Table::AppMeta,
            TypeTag::Run,
            KeyBuilder::new().scope(scope).finish(),
        )
    }

    /// Prefix covering every run record
    pub fn run_table_prefix() -> Self {
        Key::new(Table::AppMeta, TypeTag::Run, Vec::new())
    }

    /// Decode a primary run key back into its identity
    pub fn decode_run(&self) -> Result<(ProgramId, RunId)> {
        if self.type_tag != TypeTag::Run {
            return Err(Error::Corruption(format!("{:?} is not a run key", self)));
        }
        let mut r = self.reader();
        let program = r.program()?;
        let _secs = r.u64()?;
        let run_id = RunId::parse(&r.str()?).map_err(|e| Error::Corruption(e.to_string()))?;
        Ok((program, run_id))
    }

    // ========== Status index ==========

    /// Status index entry of a run
    pub fn status_index(status: RunStatus, program: &ProgramId, run_id: &RunId) -> Self {
        let user_key = KeyBuilder::new()
            .u8(status.as_byte())
            .u64(run_id.time_secs())
            .str(&run_id.to_string())
            .program(program)
            .finish();
        Key::new(Table::AppMeta, TypeTag::RunByStatus, user_key)
    }

    /// Prefix covering every index entry of one status
    pub fn status_prefix(status: RunStatus) -> Self {
        Key::new(
            Table::AppMeta,
            TypeTag::RunByStatus,
            KeyBuilder::new().u8(status.as_byte()).finish(),
        )
    }

    // ========== Workflow progress ==========

    /// Node state of one node in a workflow run
    pub fn node_state(program: &ProgramId, run_id: &RunId, node_id: &str) -> Self {
        let user_key = KeyBuilder::new()
            .program(program)
            .str(&run_id.to_string())
            .str(node_id)
            .finish();
        Key::new(Table::AppMeta, TypeTag::NodeState, user_key)
    }

    /// Prefix covering every node state of a workflow run
    pub fn node_state_prefix(program: &ProgramId, run_id: &RunId) -> Self {
        let user_key = KeyBuilder::new()
            .program(program)
            .str(&run_id.to_string())
            .finish();
        Key::new(Table::AppMeta, TypeTag::NodeState, user_key)
    }

    /// Token of a workflow run
    pub fn workflow_token(program: &ProgramId, run_id: &RunId) -> Self {
        let user_key = KeyBuilder::new()
            .program(program)
            .str(&run_id.to_string())
            .finish();
        Key::new(Table::AppMeta, TypeTag::WorkflowToken, user_key)
    }

    // ========== Workflow statistics ==========

    /// Summary record of a completed workflow run
    pub fn workflow_run(workflow: &ProgramId, run_id: &RunId) -> Self {
        let user_key = KeyBuilder::new()
            .str(&workflow.namespace)
            .str(&workflow.application)
            .str(&workflow.program)
            .u64(run_id.time_secs())
            .str(&run_id.to_string())
            .finish();
        Key::new(Table::WorkflowStats, TypeTag::WorkflowRun, user_key)
    }

    /// Lower bound for summaries of `workflow` created at or after `secs`
    pub fn workflow_run_time_bound(workflow: &ProgramId, secs: u64) -> Self {
        let user_key = KeyBuilder::new()
            .str(&workflow.namespace)
            .str(&workflow.application)
            .str(&workflow.program)
            .u64(secs)
            .finish();
        Key::new(Table::WorkflowStats, TypeTag::WorkflowRun, user_key)
    }

    /// Prefix covering every summary of one workflow
    pub fn workflow_run_prefix(workflow: &ProgramId) -> Self {
        let user_key = KeyBuilder::new()
            .str(&workflow.namespace)
            .str(&workflow.application)
            .str(&workflow.program)
            .finish();
        Key::new(Table::WorkflowStats, TypeTag::WorkflowRun, user_key)
    }

    /// Prefix covering every summary inside a scope
    pub fn workflow_scope_prefix(scope: &Scope) -> Self {
        Key::new(
            Table::WorkflowStats,
            TypeTag::WorkflowRun,
            KeyBuilder::new().scope(scope).finish(),
        )
    }
}

/// Appends order-preserving components to a key buffer
#[derive(Debug, Default)]
pub struct KeyBuilder {
    buf: Vec<u8>,
}

impl KeyBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one raw byte
    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    /// Append a fixed-width big-endian integer
    pub fn u64(mut self, v: u64) -> Self {
        let mut bytes = [0u8; 8];
        BigEndian::write_u64(&mut bytes, v);
        self.buf.extend_from_slice(&bytes);
        self
    }

    /// Append an escaped, terminated string
    pub fn str(mut self, s: &str) -> Self {
        for &b in s.as_bytes() {
            self.buf.push(b);
            if b == ESCAPE {
                self.buf.push(ESCAPED_NUL);
            }
        }
        self.buf.push(ESCAPE);
        self.buf.push(TERMINATOR);
        self
    }

    /// Append namespace, application, type and program name
    pub fn program(self, program: &ProgramId) -> Self {
        self.str(&program.namespace)
            .str(&program.application)
            .u8(program.program_type.as_byte())
            .str(&program.program)
    }

    /// Append the leading components selected by a scope
    pub fn scope(self, scope: &Scope) -> Self {
        match scope {
            Scope::Namespace(ns) => self.str(ns),
            Scope::Application {
                namespace,
                application,
            } => self.str(namespace).str(application),
        }
    }

    /// Finished bytes
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads components written by [`KeyBuilder`]
#[derive(Debug)]
pub struct KeyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> KeyReader<'a> {
    /// Reader positioned at the start of `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        KeyReader { bytes, pos: 0 }
    }

    /// Read one raw byte
    pub fn u8(&mut self) -> Result<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| Error::Corruption("key truncated reading u8".to_string()))?;
        self.pos += 1;
        Ok(b)
    }

    /// Read a big-endian integer
    pub fn u64(&mut self) -> Result<u64> {
        let end = self.pos + 8;
        if end > self.bytes.len() {
            return Err(Error::Corruption("key truncated reading u64".to_string()));
        }
        let v = BigEndian::read_u64(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(v)
    }

    /// Read an escaped string
    pub fn str(&mut self) -> Result<String> {
        let mut out = Vec::new();
        loop {
            let b = self.u8()?;
            if b != ESCAPE {
                out.push(b);
                continue;
            }
            match self.u8()? {
                TERMINATOR => break,
                ESCAPED_NUL => out.push(ESCAPE),
                other => {
                    return Err(Error::Corruption(format!(
                        "invalid escape 0x{:02x} in key string",
                        other
                    )))
                }
            }
        }
        String::from_utf8(out).map_err(|e| Error::Corruption(e.to_string()))
    }

    /// Read namespace, application, type and program name
    pub fn program(&mut self) -> Result<ProgramId> {
        let namespace = self.str()?;
        let application = self.str()?;
        let type_byte = self.u8()?;
        let program_type = ProgramType::from_byte(type_byte).ok_or_else(|| {
            Error::Corruption(format!("unknown program type byte 0x{:02x}", type_byte))
        })?;
        let program = self.str()?;
        Ok(ProgramId {
            namespace,
            application,
            program_type,
            program,
        })
    }

    /// True when every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}
