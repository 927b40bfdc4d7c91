//! Normalizes the four transports an operation can arrive on into one shape
//! the guard consumes: where the principal is read from, which arguments the
//! operation received, and where per-request results may be attached.

mod attach;
mod http;

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::{Map, Value};

use crate::principal::Principal;

pub use attach::Attachments;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    Query,
    Socket,
    Rpc,
    Unknown,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Http => "http",
            TransportKind::Query => "query",
            TransportKind::Socket => "socket",
            TransportKind::Rpc => "rpc",
            TransportKind::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// A plain HTTP request, as seen after routing.
#[derive(Debug, Default)]
pub struct HttpContext {
    /// Header names are stored lowercased.
    pub headers: HashMap<String, String>,

    /// Headers present on the request whose value is not one UTF-8 string
    /// (repeated, or not valid UTF-8). They are left out of `headers`.
    pub unreadable_headers: HashSet<String>,

    /// Path parameters of the matched route.
    pub params: Map<String, Value>,

    /// Principal set by an authentication layer running before the guard.
    pub user: Option<Principal>,

    pub attachments: Attachments,
}

impl HttpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn with_user(mut self, user: Principal) -> Self {
        self.user = Some(user);
        self
    }
}

/// The execution context of a query/mutation protocol resolver.
///
/// When the protocol runs over HTTP the underlying request is kept in `req`;
/// it then takes over as principal carrier and attach target.
#[derive(Debug, Default)]
pub struct QueryContext {
    /// Resolver arguments, including a nested `input` object if any.
    pub args: Map<String, Value>,

    pub variables: Map<String, Value>,

    pub req: Option<HttpContext>,

    pub headers: HashMap<String, String>,

    pub unreadable_headers: HashSet<String>,

    pub user: Option<Principal>,

    pub attachments: Attachments,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.args.insert(name.to_string(), value.into());
        self
    }

    pub fn with_variable(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    pub fn with_request(mut self, req: HttpContext) -> Self {
        self.req = Some(req);
        self
    }

    /// Arguments merged over variables; arguments win on conflicts.
    fn merged_args(&self) -> Value {
        let mut merged = self.variables.clone();
        for (key, value) in self.args.iter() {
            merged.insert(key.clone(), value.clone());
        }
        Value::Object(merged)
    }
}

/// Connection-scoped state of a persistent socket client.
#[derive(Debug, Default)]
pub struct SocketClient {
    pub id: String,

    /// Principal established during the connection handshake.
    pub user: Option<Principal>,

    pub attachments: Attachments,
}

impl SocketClient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// One inbound invocation, tagged with the transport it arrived on.
///
/// The carriers are borrowed from the surrounding framework; the guard never
/// takes ownership of them.
pub enum Invocation<'a> {
    Http(&'a mut HttpContext),
    Query(&'a mut QueryContext),
    Socket {
        client: &'a mut SocketClient,
        data: &'a Value,
    },
    /// The RPC context is read-only: its transport semantics vary, so nothing
    /// is ever attached to it.
    Rpc {
        context: &'a Map<String, Value>,
        data: &'a Value,
    },
    Unknown(&'a str),
}

/// Read-only view of the structure a principal is extracted from.
pub enum Carrier<'a> {
    Request {
        headers: &'a HashMap<String, String>,
        unreadable: &'a HashSet<String>,
        user: Option<&'a Principal>,
    },
    Client {
        user: Option<&'a Principal>,
    },
    Rpc {
        context: &'a Map<String, Value>,
    },
}

/// The normalized `(carrier, arguments, attach target)` triple.
pub struct Adapted<'a> {
    pub kind: TransportKind,
    pub carrier: Option<Carrier<'a>>,
    pub args: Option<Value>,
    pub target: Option<&'a mut Attachments>,
}

impl<'a> Invocation<'a> {
    pub fn kind(&self) -> TransportKind {
        match self {
            Invocation::Http(_) => TransportKind::Http,
            Invocation::Query(_) => TransportKind::Query,
            Invocation::Socket { .. } => TransportKind::Socket,
            Invocation::Rpc { .. } => TransportKind::Rpc,
            Invocation::Unknown(_) => TransportKind::Unknown,
        }
    }

    pub fn adapt(self) -> Adapted<'a> {
        let kind = self.kind();
        match self {
            Invocation::Http(ctx) => {
                let args = Value::Object(ctx.params.clone());
                let (carrier, target) = split_request(ctx);
                Adapted {
                    kind,
                    carrier: Some(carrier),
                    args: Some(args),
                    target: Some(target),
                }
            }
            Invocation::Query(ctx) => {
                let args = ctx.merged_args();
                let QueryContext {
                    req,
                    headers,
                    unreadable_headers,
                    user,
                    attachments,
                    ..
                } = ctx;
                let (carrier, target) = match req {
                    Some(req) => split_request(req),
                    None => {
                        let headers: &'a HashMap<String, String> = headers;
                        let unreadable: &'a HashSet<String> = unreadable_headers;
                        let user: &'a Option<Principal> = user;
                        let carrier = Carrier::Request {
                            headers,
                            unreadable,
                            user: user.as_ref(),
                        };
                        (carrier, attachments)
                    }
                };
                Adapted {
                    kind,
                    carrier: Some(carrier),
                    args: Some(args),
                    target: Some(target),
                }
            }
            Invocation::Socket { client, data } => {
                let SocketClient {
                    user, attachments, ..
                } = client;
                let user: &'a Option<Principal> = user;
                Adapted {
                    kind,
                    carrier: Some(Carrier::Client { user: user.as_ref() }),
                    args: Some(data.clone()),
                    target: Some(attachments),
                }
            }
            Invocation::Rpc { context, data } => Adapted {
                kind,
                carrier: Some(Carrier::Rpc { context }),
                args: Some(data.clone()),
                target: None,
            },
            Invocation::Unknown(_) => Adapted {
                kind,
                carrier: None,
                args: None,
                target: None,
            },
        }
    }
}

fn split_request(ctx: &mut HttpContext) -> (Carrier<'_>, &mut Attachments) {
    let HttpContext {
        headers,
        unreadable_headers,
        user,
        attachments,
        ..
    } = ctx;
    let headers: &HashMap<String, String> = headers;
    let unreadable: &HashSet<String> = unreadable_headers;
    let user: &Option<Principal> = user;
    let carrier = Carrier::Request {
        headers,
        unreadable,
        user: user.as_ref(),
    };
    (carrier, attachments)
}
