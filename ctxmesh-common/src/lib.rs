//! Shared types between the ctxmesh core, the agent and the operator console
//!
//! This crate defines the values that cross a process boundary:
//! - identifiers for servers, contexts and query rounds
//! - context history entries
//! - the uniform result envelope returned for every command

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// Ids are JSON object keys inside tagged replies, where serde buffers them as
// strings. Accept both the integer and the string form.
macro_rules! id_from_int_or_str {
    ($id:ident, $repr:ty) => {
        impl<'de> Deserialize<'de> for $id {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct IdVisitor;

                impl<'de> Visitor<'de> for IdVisitor {
                    type Value = $id;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str("a non-negative integer id")
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<$id, E> {
                        <$repr>::try_from(v)
                            .map($id)
                            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
                    }

                    fn visit_i64<E: de::Error>(self, v: i64) -> Result<$id, E> {
                        <$repr>::try_from(v)
                            .map($id)
                            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<$id, E> {
                        v.parse::<$repr>()
                            .map($id)
                            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
                    }
                }

                deserializer.deserialize_any(IdVisitor)
            }
        }
    };
}

id_from_int_or_str!(ServerId, u32);
id_from_int_or_str!(ContextId, u64);

/// Server identifier in `[0, N)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ServerId(pub u32);

impl ServerId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context identifier, unique across the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Query round identifier, monotonically increasing across the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a context replica
///
/// `origin` is the ingress server that submitted a query, or the server whose
/// response was chosen for a committed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub seq: u64,
    pub origin: ServerId,
    #[serde(flatten)]
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    Query { text: String },
    Response { text: String },
}

impl Entry {
    pub fn text(&self) -> &str {
        match &self.kind {
            EntryKind::Query { text } | EntryKind::Response { text } => text,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self.kind, EntryKind::Query { .. })
    }
}

/// Entries of one context, per server replica
pub type ReplicaView = BTreeMap<ServerId, Vec<Entry>>;

/// Command error taxonomy exposed to the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    BadArguments,
    UnknownCommand,
    UnknownServer,
    UnknownContext,
    DuplicateContext,
    NoReachableServer,
    UnknownRound,
    InvalidChoice,
    NoQuorum,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadArguments => "BadArguments",
            ErrorKind::UnknownCommand => "UnknownCommand",
            ErrorKind::UnknownServer => "UnknownServer",
            ErrorKind::UnknownContext => "UnknownContext",
            ErrorKind::DuplicateContext => "DuplicateContext",
            ErrorKind::NoReachableServer => "NoReachableServer",
            ErrorKind::UnknownRound => "UnknownRound",
            ErrorKind::InvalidChoice => "InvalidChoice",
            ErrorKind::NoQuorum => "NoQuorum",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "errorKind")]
    pub kind: ErrorKind,
    pub message: String,
}

/// Successful command payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Created {
        context: ContextId,
        servers: Vec<ServerId>,
    },
    RoundOpened {
        context: ContextId,
        round: RoundId,
        responses: BTreeMap<ServerId, String>,
    },
    Chosen {
        context: ContextId,
        round: RoundId,
        server: ServerId,
        response: String,
        committed: Vec<ServerId>,
    },
    Context {
        context: ContextId,
        replicas: ReplicaView,
    },
    AllContexts {
        contexts: BTreeMap<ContextId, ReplicaView>,
    },
    Link {
        src: ServerId,
        dest: ServerId,
        up: bool,
    },
    Node {
        node: ServerId,
        alive: bool,
    },
    Resynced {
        context: ContextId,
        updated: Vec<ServerId>,
    },
}

/// Uniform result of every command: `{ok, data | error}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Reply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    pub fn success(reply: Reply) -> Self {
        Self {
            ok: true,
            data: Some(reply),
            error: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn into_result(self) -> Result<Reply, ErrorBody> {
        match (self.data, self.error) {
            (Some(reply), None) if self.ok => Ok(reply),
            (_, Some(error)) => Err(error),
            _ => Err(ErrorBody {
                kind: ErrorKind::BadArguments,
                message: "malformed envelope".to_string(),
            }),
        }
    }
}
