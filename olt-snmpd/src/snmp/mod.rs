pub mod ber;
pub mod client;

use std::fmt;
use std::str::FromStr;
use async_trait::async_trait;

/// An SNMP object identifier, e.g. `1.3.6.1.4.1.3902.1012.3.28.1.1.2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(Vec<u32>);

impl Oid {
    pub fn new(arcs: Vec<u32>) -> Self {
        Self(arcs)
    }

    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    /// Append one arc, returning the child OID
    pub fn child(&self, arc: u32) -> Self {
        let mut arcs = self.0.clone();
        arcs.push(arc);
        Self(arcs)
    }

    /// True if `self` lies strictly below `root`
    pub fn is_under(&self, root: &Oid) -> bool {
        self.0.len() > root.0.len() && self.0.starts_with(&root.0)
    }

    pub fn last(&self) -> Option<u32> {
        self.0.last().copied()
    }
}

impl FromStr for Oid {
    type Err = SnmpError;

    /// Accepts dotted notation with or without a leading dot
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Err(SnmpError::InvalidOid(s.to_string()));
        }

        let arcs = trimmed
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SnmpError::InvalidOid(s.to_string()))?;

        if arcs.len() < 2 {
            return Err(SnmpError::InvalidOid(s.to_string()));
        }

        Ok(Self(arcs))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", arc)?;
            first = false;
        }
        Ok(())
    }
}

/// A raw value as returned by the device, before domain decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolledValue {
    Text(String),
    Bytes(Vec<u8>),
    Integer(i64),
    /// NULL, noSuchObject or noSuchInstance
    Absent,
    EndOfMibView,
}

impl PolledValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent | Self::EndOfMibView)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Integer(_) => "integer",
            Self::Absent => "absent",
            Self::EndOfMibView => "end-of-mib-view",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Varbind {
    pub oid: Oid,
    pub value: PolledValue,
}

#[derive(Debug, thiserror::Error)]
pub enum SnmpError {
    #[error("device unreachable: {0}")]
    Io(#[from] std::io::Error),
    #[error("no response after {0} attempt(s)")]
    Timeout(u32),
    #[error("malformed PDU: {0}")]
    Malformed(String),
    #[error("agent returned error-status {status} at index {index}")]
    Agent { status: i64, index: i64 },
    #[error("invalid OID: {0}")]
    InvalidOid(String),
}

/// The polling transport. Implementations must be safe to share between
/// request tasks; ordering between concurrent callers is unspecified.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch every OID in one request. The result is aligned with `oids`.
    async fn get(&self, oids: &[Oid]) -> Result<Vec<Varbind>, SnmpError>;

    /// Visit every instance below `root` in lexicographic order.
    async fn walk(
        &self,
        root: &Oid,
        visitor: &mut (dyn FnMut(Varbind) + Send),
    ) -> Result<(), SnmpError>;
}
