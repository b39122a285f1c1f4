// rust/datasets-core/src/graph_runner.rs

//! Runs single-input array functions in either execution mode.
//!
//! In [`ExecutionMode::Eager`] a function is applied directly. In
//! [`ExecutionMode::Graph`] it is first compiled by an
//! [`ExecutionBackend`] for one concrete input dtype and shape; the
//! resulting [`Session`] is cached under `(function, dtype, shape)` and
//! reused for every later call with the same signature.
//!
//! The cache is unbounded. Each distinct input shape adds one session, so
//! feeding many different shapes through one function grows it without
//! limit.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{DatasetError, Result};
use crate::tensor::{Array, DType, Shape, TensorSpec};

/// How [`GraphRunner::run`] executes functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Eager,
    Graph,
}

/// Opaque identity of a [`GraphFn`], stable across clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(u64);

static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(0);

impl FunctionId {
    fn next() -> Self {
        FunctionId(NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type ArrayFn = dyn Fn(&Array) -> Result<Array> + Send + Sync;

/// A named single-input, single-output array function.
#[derive(Clone)]
pub struct GraphFn {
    id: FunctionId,
    name: String,
    func: Arc<ArrayFn>,
}

impl GraphFn {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Array) -> Result<Array> + Send + Sync + 'static,
    {
        Self {
            id: FunctionId::next(),
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, input: &Array) -> Result<Array> {
        (self.func)(input)
    }
}

impl fmt::Debug for GraphFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphFn")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A function compiled for one input signature.
pub trait Session: Send {
    fn run(&mut self, input: &Array) -> Result<Array>;

    /// Releases the session's resources. Later `run` calls fail.
    fn close(&mut self);
}

/// Compiles functions into sessions.
pub trait ExecutionBackend: Send + Sync {
    fn compile(&self, func: &GraphFn, input: &TensorSpec) -> Result<Box<dyn Session>>;
}

/// Compiles on the host by tracing the function once against a zero
/// placeholder and pinning the input and output signatures it observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostBackend;

impl ExecutionBackend for HostBackend {
    fn compile(&self, func: &GraphFn, input: &TensorSpec) -> Result<Box<dyn Session>> {
        let placeholder = Array::zeros(input.dtype, input.shape.clone());
        let traced = func.call(&placeholder)?;

        Ok(Box::new(HostSession {
            func: func.clone(),
            input: input.clone(),
            output: traced.spec(),
            closed: false,
        }))
    }
}

struct HostSession {
    func: GraphFn,
    input: TensorSpec,
    output: TensorSpec,
    closed: bool,
}

fn check_spec(actual: &TensorSpec, expected: &TensorSpec) -> Result<()> {
    if actual.dtype != expected.dtype {
        return Err(DatasetError::DTypeMismatch {
            actual: actual.dtype.to_string(),
            expected: expected.dtype.to_string(),
        });
    }
    if actual.shape != expected.shape {
        return Err(DatasetError::ShapeMismatch {
            actual: actual.shape.to_string(),
            expected: expected.shape.to_string(),
        });
    }
    Ok(())
}

impl Session for HostSession {
    fn run(&mut self, input: &Array) -> Result<Array> {
        if self.closed {
            return Err(DatasetError::invalid_state(format!(
                "session for '{}' is closed",
                self.func.name()
            )));
        }
        check_spec(&input.spec(), &self.input)?;
        let output = self.func.call(input)?;
        check_spec(&output.spec(), &self.output)?;
        Ok(output)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Signature {
    func: FunctionId,
    dtype: DType,
    shape: Shape,
}

/// Memoizing dispatcher over an [`ExecutionBackend`].
pub struct GraphRunner {
    mode: ExecutionMode,
    backend: Box<dyn ExecutionBackend>,
    cache: HashMap<Signature, Box<dyn Session>>,
}

impl GraphRunner {
    pub fn new(mode: ExecutionMode) -> Self {
        Self::with_backend(mode, Box::new(HostBackend))
    }

    pub fn with_backend(mode: ExecutionMode, backend: Box<dyn ExecutionBackend>) -> Self {
        Self {
            mode,
            backend,
            cache: HashMap::new(),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Applies `func` to `input`, compiling once per input signature in
    /// graph mode.
    pub fn run(&mut self, func: &GraphFn, input: &Array) -> Result<Array> {
        if self.mode == ExecutionMode::Eager {
            return func.call(input);
        }

        let spec = input.spec();
        let key = Signature {
            func: func.id(),
            dtype: spec.dtype,
            shape: spec.shape.clone(),
        };

        let session = match self.cache.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                tracing::debug!(function = func.name(), input = %spec, "Compiling session");
                let session = self.backend.compile(func, &spec)?;
                entry.insert(session)
            }
        };
        session.run(input)
    }

    /// Number of cached sessions.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Closes and drops every cached session.
    pub fn clear(&mut self) {
        for (_, mut session) in self.cache.drain() {
            session.close();
        }
    }
}

impl Drop for GraphRunner {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for GraphRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphRunner")
            .field("mode", &self.mode)
            .field("cached_sessions", &self.cache.len())
            .finish_non_exhaustive()
    }
}
