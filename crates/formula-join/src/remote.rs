//! Client side of the server-executed equality + time-window join.
//!
//! The join itself runs on a remote compute server. This module validates the arguments, groups
//! the right-hand keys locally, uploads every client-held array the request names through the
//! [`Transport`], and turns the `<handle>+<handle>` reply into two result handles.

use crate::domain::GroupedDomain;
use crate::error::{JoinError, JoinResult};
use ahash::AHashMap;
use std::fmt;
use std::str::FromStr;

/// Server command implementing the time-window join.
pub const JOIN_EQ_WITH_DT: &str = "joinEqWithDT";

/// Prefix of names minted by [`HandleRegistry::register`]. Server-created arrays use `id_`.
pub const LOCAL_NAME_PREFIX: &str = "local_";

/// Result cap used when the caller does not set one.
pub const DEFAULT_RESULT_LIMIT: i64 = 1000;

/// Element type of a registered array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Int64,
    UInt64,
    Float64,
    Bool,
}

impl DType {
    pub fn as_str(self) -> &'static str {
        match self {
            DType::Int64 => "int64",
            DType::UInt64 => "uint64",
            DType::Float64 => "float64",
            DType::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = JoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int64" => Ok(DType::Int64),
            "uint64" => Ok(DType::UInt64),
            "float64" => Ok(DType::Float64),
            "bool" => Ok(DType::Bool),
            other => Err(JoinError::Protocol(format!("unknown dtype {other:?}"))),
        }
    }
}

/// Array data held by the client.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
}

impl Column {
    pub fn dtype(&self) -> DType {
        match self {
            Column::Int64(_) => DType::Int64,
            Column::UInt64(_) => DType::UInt64,
            Column::Float64(_) => DType::Float64,
            Column::Bool(_) => DType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int64(v) => v.len(),
            Column::UInt64(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Name and shape of an array known to the server.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArrayHandle {
    pub name: String,
    pub dtype: DType,
    pub size: usize,
}

impl FromStr for ArrayHandle {
    type Err = JoinError;

    /// Parses a server creation notice: `created <name> <dtype> <size> [...]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        if fields.next() != Some("created") {
            return Err(JoinError::Protocol(format!(
                "expected a creation notice, got {s:?}"
            )));
        }
        let (Some(name), Some(dtype), Some(size)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(JoinError::Protocol(format!("truncated creation notice {s:?}")));
        };
        let size = size
            .parse::<usize>()
            .map_err(|_| JoinError::Protocol(format!("invalid array size {size:?} in {s:?}")))?;
        Ok(ArrayHandle {
            name: name.to_string(),
            dtype: dtype.parse()?,
            size,
        })
    }
}

#[derive(Clone, Debug)]
enum Entry {
    Local(Column),
    Remote(ArrayHandle),
}

/// Maps array names to client-held data or to server-side handles.
///
/// The registry is an ordinary value: callers own it and pass it to every operation that needs to
/// resolve or create names.
#[derive(Clone, Debug, Default)]
pub struct HandleRegistry {
    next_id: u64,
    entries: AHashMap<String, Entry>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Store client-side data under a fresh name.
    ///
    /// Names never collide with an existing entry, including adopted server arrays.
    pub fn register(&mut self, column: Column) -> ArrayHandle {
        let name = loop {
            let candidate = format!("{LOCAL_NAME_PREFIX}{}", self.next_id);
            self.next_id += 1;
            if !self.entries.contains_key(&candidate) {
                break candidate;
            }
        };
        let handle = ArrayHandle {
            name: name.clone(),
            dtype: column.dtype(),
            size: column.len(),
        };
        self.entries.insert(name, Entry::Local(column));
        handle
    }

    /// Record an array that lives on the server.
    ///
    /// Fails with [`JoinError::Protocol`] if the name is already taken; the existing entry is kept.
    pub fn adopt(&mut self, handle: ArrayHandle) -> JoinResult<()> {
        if self.entries.contains_key(&handle.name) {
            return Err(JoinError::Protocol(format!(
                "server returned {:?}, which is already registered",
                handle.name
            )));
        }
        self.entries
            .insert(handle.name.clone(), Entry::Remote(handle));
        Ok(())
    }

    pub fn handle(&self, name: &str) -> JoinResult<ArrayHandle> {
        match self.entries.get(name) {
            Some(Entry::Local(column)) => Ok(ArrayHandle {
                name: name.to_string(),
                dtype: column.dtype(),
                size: column.len(),
            }),
            Some(Entry::Remote(handle)) => Ok(handle.clone()),
            None => Err(JoinError::UnknownHandle(name.to_string())),
        }
    }

    /// Client-side data for `name`, if it is held locally.
    pub fn column(&self, name: &str) -> Option<&Column> {
        match self.entries.get(name)? {
            Entry::Local(column) => Some(column),
            Entry::Remote(_) => None,
        }
    }

    pub fn release(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }
}

/// Time-window condition checked by the server in addition to key equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowPredicate {
    /// Exact-equality window.
    TrueDt,
    /// Absolute time delta bounded by `dt`.
    AbsDt,
    /// Signed time delta bounded by `dt`.
    PosDt,
}

impl WindowPredicate {
    pub fn name(self) -> &'static str {
        match self {
            WindowPredicate::TrueDt => "true_dt",
            WindowPredicate::AbsDt => "abs_dt",
            WindowPredicate::PosDt => "pos_dt",
        }
    }

    /// Numeric code understood by the server.
    pub fn code(self) -> i64 {
        match self {
            WindowPredicate::TrueDt => 0,
            WindowPredicate::AbsDt => 1,
            WindowPredicate::PosDt => 2,
        }
    }
}

impl fmt::Display for WindowPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindowPredicate {
    type Err = JoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "true_dt" => Ok(WindowPredicate::TrueDt),
            "abs_dt" => Ok(WindowPredicate::AbsDt),
            "pos_dt" => Ok(WindowPredicate::PosDt),
            other => Err(JoinError::Domain(format!(
                "window predicate must be one of true_dt, abs_dt, pos_dt; got {other:?}"
            ))),
        }
    }
}

/// A command line sent to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub command: String,
    pub args: Vec<String>,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Request/response channel to the compute server.
pub trait Transport {
    /// Make client-held `column` available on the server under `handle.name`.
    fn upload(&mut self, handle: &ArrayHandle, column: &Column) -> JoinResult<()>;

    fn send(&mut self, request: &Request) -> JoinResult<String>;
}

/// Inner join on `a1 == a2` where the paired timestamps also satisfy a window predicate.
///
/// All four arrays are referenced by registry name and must be `int64`; `a2` must additionally be
/// held locally because it is grouped on the client before the request is sent.
#[derive(Clone, Debug)]
pub struct TimeWindowJoin<'a> {
    a1: &'a str,
    a2: &'a str,
    t1: &'a str,
    t2: &'a str,
    dt: i64,
    predicate: &'a str,
    result_limit: i64,
}

impl<'a> TimeWindowJoin<'a> {
    pub fn new(
        a1: &'a str,
        a2: &'a str,
        t1: &'a str,
        t2: &'a str,
        dt: i64,
        predicate: &'a str,
    ) -> Self {
        Self {
            a1,
            a2,
            t1,
            t2,
            dt,
            predicate,
            result_limit: DEFAULT_RESULT_LIMIT,
        }
    }

    pub fn result_limit(mut self, result_limit: i64) -> Self {
        self.result_limit = result_limit;
        self
    }

    /// Validate, group `a2`, send the request and register the two result arrays.
    ///
    /// Returns handles for the matching `a1` indices and `a2` indices, in that order.
    pub fn execute<D, T>(
        &self,
        domain: &D,
        registry: &mut HandleRegistry,
        transport: &mut T,
    ) -> JoinResult<(ArrayHandle, ArrayHandle)>
    where
        D: GroupedDomain,
        T: Transport,
    {
        for (label, name) in [
            ("a1", self.a1),
            ("a2", self.a2),
            ("t1", self.t1),
            ("t2", self.t2),
        ] {
            let handle = registry.handle(name)?;
            if handle.dtype != DType::Int64 {
                return Err(JoinError::TypeMismatch {
                    array: format!("{label} ({name})"),
                    expected: DType::Int64,
                    actual: handle.dtype,
                });
            }
        }

        let predicate: WindowPredicate = self.predicate.parse()?;

        if self.result_limit < 0 {
            return Err(JoinError::Domain(format!(
                "the result limit must be 0 or greater, got {}",
                self.result_limit
            )));
        }

        let Some(Column::Int64(keys)) = registry.column(self.a2) else {
            return Err(JoinError::Domain(format!(
                "a2 ({}) must be held locally to be grouped",
                self.a2
            )));
        };
        let grouping = domain.group_by(keys.as_slice());

        let to_column = |values: &[usize]| Column::Int64(values.iter().map(|&v| v as i64).collect());
        let segments = registry.register(to_column(&grouping.segments));
        let unique_keys = registry.register(Column::Int64(grouping.unique_keys));
        let permutation = registry.register(to_column(&grouping.permutation));

        let request = Request {
            command: JOIN_EQ_WITH_DT.to_string(),
            args: vec![
                self.a1.to_string(),
                segments.name.clone(),
                unique_keys.name.clone(),
                permutation.name.clone(),
                self.t1.to_string(),
                self.t2.to_string(),
                self.dt.to_string(),
                predicate.code().to_string(),
                self.result_limit.to_string(),
            ],
        };

        let shipped = [
            self.a1,
            segments.name.as_str(),
            unique_keys.name.as_str(),
            permutation.name.as_str(),
            self.t1,
            self.t2,
        ];
        let reply = upload_local(registry, transport, &shipped).and_then(|()| {
            log::debug!("sending {request}");
            transport.send(&request)
        });
        for temporary in [&segments, &unique_keys, &permutation] {
            registry.release(&temporary.name);
        }
        let (left, right) = parse_reply(&reply?)?;

        registry.adopt(left.clone())?;
        registry.adopt(right.clone())?;
        Ok((left, right))
    }
}

/// Upload every name in `names` that is held locally. Server-side names are left alone.
fn upload_local<T: Transport>(
    registry: &HandleRegistry,
    transport: &mut T,
    names: &[&str],
) -> JoinResult<()> {
    for &name in names {
        if let Some(column) = registry.column(name) {
            let handle = registry.handle(name)?;
            log::trace!("uploading {name} ({} {})", handle.dtype, handle.size);
            transport.upload(&handle, column)?;
        }
    }
    Ok(())
}

/// Split a `<handle>+<handle>` reply into its two handles.
fn parse_reply(reply: &str) -> JoinResult<(ArrayHandle, ArrayHandle)> {
    let mut parts = reply.split('+');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(left), Some(right), None) => Ok((left.parse()?, right.parse()?)),
        _ => Err(JoinError::Protocol(format!(
            "expected two '+'-separated results, got {reply:?}"
        ))),
    }
}
