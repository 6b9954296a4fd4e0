//! Tool handles, typed tool wrappers, and the tool registry
//!
//! A [`ToolHandle`] is the uniform runtime contract the executor invokes:
//! a name, JSON Schemas for input and output, and a generic `execute` over
//! raw JSON. [`FunctionTool`] wraps a typed async function into a handle,
//! generating both schemas from the Rust types via `schemars` (cached once
//! per type) and validating/deserializing inputs before user code runs.
//!
//! ```rust
//! use laksa::error::AiError;
//! use laksa::tool::{ExecutionMeta, FunctionTool};
//! use schemars::JsonSchema;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct EchoInput { v: String }
//!
//! #[derive(Serialize, JsonSchema)]
//! struct EchoOutput { v: String }
//!
//! let tool = FunctionTool::new("echo", "Echoes its input", |input: EchoInput, _meta: ExecutionMeta| async move {
//!     Ok::<_, AiError>(EchoOutput { v: input.v })
//! });
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{AiError, ErrorCode};
use crate::types::ChatMessage;

/// Context handed to a tool execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMeta {
    /// Id of the tool call being answered.
    pub call_id: Option<String>,
    /// Snapshot of the conversation at invocation time.
    pub messages: Vec<ChatMessage>,
    /// Step number the call belongs to.
    pub step_number: usize,
}

/// Per-tool behavior knobs.
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Per-execution deadline override. The executor default applies when
    /// absent.
    pub timeout: Option<Duration>,
    /// Whether a failed execution may be retried by callers.
    pub retryable: bool,
    /// Whether results may be cached by callers.
    pub cacheable: bool,
    /// Maximum serialized input size in bytes. Unlimited when absent.
    pub max_input_size: Option<usize>,
    /// Maximum serialized output size in bytes. Unlimited when absent.
    pub max_output_size: Option<usize>,
    /// Validate raw input against the input schema before deserializing.
    pub validate_input: bool,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            retryable: false,
            cacheable: false,
            max_input_size: None,
            max_output_size: None,
            validate_input: false,
        }
    }
}

/// Uniform runtime contract over a tool.
#[async_trait]
pub trait ToolHandle: Send + Sync {
    /// Tool name; unique within a request.
    fn name(&self) -> &str;

    /// Human-readable description forwarded to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the input.
    fn input_schema(&self) -> serde_json::Value;

    /// JSON Schema of the output.
    fn output_schema(&self) -> serde_json::Value;

    /// Behavior knobs.
    fn options(&self) -> ToolOptions {
        ToolOptions::default()
    }

    /// Execute the tool on raw JSON input.
    async fn execute(
        &self,
        cancel: CancellationToken,
        input: serde_json::Value,
        meta: ExecutionMeta,
    ) -> Result<serde_json::Value, AiError>;
}

// ------------------------------------------------------------------------
// Schema cache
// ------------------------------------------------------------------------

fn schema_cache() -> &'static RwLock<HashMap<TypeId, Arc<serde_json::Value>>> {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, Arc<serde_json::Value>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// JSON Schema for `T`, generated once per type and cached process-wide.
pub fn schema_of<T: JsonSchema + 'static>() -> Arc<serde_json::Value> {
    let key = TypeId::of::<T>();
    if let Some(schema) = schema_cache().read().expect("schema cache poisoned").get(&key) {
        return schema.clone();
    }
    let root = schemars::r#gen::SchemaGenerator::default().into_root_schema_for::<T>();
    let value = serde_json::to_value(root).unwrap_or(serde_json::Value::Null);
    let schema = Arc::new(value);
    schema_cache()
        .write()
        .expect("schema cache poisoned")
        .insert(key, schema.clone());
    schema
}

/// Drop all cached schemas. Intended for tests.
pub fn clear_schema_cache() {
    schema_cache()
        .write()
        .expect("schema cache poisoned")
        .clear();
}

fn validate_against_schema(
    schema: &serde_json::Value,
    instance: &serde_json::Value,
) -> Result<(), String> {
    if !schema.is_object() {
        return Ok(());
    }
    match jsonschema::validator_for(schema) {
        Ok(validator) => {
            let msgs: Vec<String> = validator
                .iter_errors(instance)
                .take(3)
                .map(|err| format!("{} at {}", err, err.instance_path))
                .collect();
            if msgs.is_empty() {
                Ok(())
            } else {
                Err(format!(
                    "input failed schema validation: {}",
                    msgs.join("; ")
                ))
            }
        }
        Err(e) => {
            tracing::warn!("invalid tool schema: {e}");
            Ok(())
        }
    }
}

// ------------------------------------------------------------------------
// Typed tool wrapper
// ------------------------------------------------------------------------

type BoxedHandler<I, O> = Box<
    dyn Fn(I, ExecutionMeta) -> Pin<Box<dyn Future<Output = Result<O, AiError>> + Send>>
        + Send
        + Sync,
>;

/// A [`ToolHandle`] over a typed async function.
///
/// Input and output schemas are generated from the Rust types; the raw JSON
/// input is size-checked, optionally validated, and deserialized before the
/// user function runs, and the output is serialized and size-checked before
/// it is returned.
pub struct FunctionTool<I, O> {
    name: String,
    description: String,
    options: ToolOptions,
    input_schema: Arc<serde_json::Value>,
    output_schema: Arc<serde_json::Value>,
    handler: BoxedHandler<I, O>,
}

impl<I, O> FunctionTool<I, O>
where
    I: DeserializeOwned + JsonSchema + Send + Sync + 'static,
    O: Serialize + JsonSchema + Send + Sync + 'static,
{
    /// Wrap a typed async function.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(I, ExecutionMeta) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, AiError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            options: ToolOptions::default(),
            input_schema: schema_of::<I>(),
            output_schema: schema_of::<O>(),
            handler: Box::new(move |input, meta| Box::pin(handler(input, meta))),
        }
    }

    /// Replace the behavior knobs.
    pub fn with_options(mut self, options: ToolOptions) -> Self {
        self.options = options;
        self
    }

    /// Convert into a shareable handle.
    pub fn into_handle(self) -> Arc<dyn ToolHandle> {
        Arc::new(self)
    }
}

#[async_trait]
impl<I, O> ToolHandle for FunctionTool<I, O>
where
    I: DeserializeOwned + JsonSchema + Send + Sync + 'static,
    O: Serialize + JsonSchema + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        (*self.input_schema).clone()
    }

    fn output_schema(&self) -> serde_json::Value {
        (*self.output_schema).clone()
    }

    fn options(&self) -> ToolOptions {
        self.options.clone()
    }

    async fn execute(
        &self,
        _cancel: CancellationToken,
        input: serde_json::Value,
        meta: ExecutionMeta,
    ) -> Result<serde_json::Value, AiError> {
        if let Some(max) = self.options.max_input_size {
            let size = serde_json::to_vec(&input).map(|v| v.len()).unwrap_or(0);
            if size > max {
                return Err(AiError::new(
                    ErrorCode::InvalidRequest,
                    format!("tool {} input of {size} bytes exceeds limit of {max}", self.name),
                ));
            }
        }
        if self.options.validate_input {
            validate_against_schema(&self.input_schema, &input).map_err(|reason| {
                AiError::new(
                    ErrorCode::InvalidRequest,
                    format!("tool {}: {reason}", self.name),
                )
            })?;
        }

        let typed: I = serde_json::from_value(input).map_err(|e| {
            AiError::new(
                ErrorCode::InvalidRequest,
                format!("tool {}: invalid input: {e}", self.name),
            )
        })?;

        let output = (self.handler)(typed, meta).await?;
        let raw = serde_json::to_value(&output).map_err(|e| {
            AiError::internal(format!("tool {}: output serialization failed: {e}", self.name))
        })?;

        if let Some(max) = self.options.max_output_size {
            let size = serde_json::to_vec(&raw).map(|v| v.len()).unwrap_or(0);
            if size > max {
                return Err(AiError::new(
                    ErrorCode::InvalidRequest,
                    format!("tool {} output of {size} bytes exceeds limit of {max}", self.name),
                ));
            }
        }

        Ok(raw)
    }
}

// ------------------------------------------------------------------------
// Registry
// ------------------------------------------------------------------------

/// A concurrent-safe registry of tool handles.
///
/// Reads take a shared lock; registration takes an exclusive lock.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn ToolHandle>>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle. Fails on an empty or duplicate name.
    pub fn register(&self, handle: Arc<dyn ToolHandle>) -> Result<(), AiError> {
        let name = handle.name().to_string();
        if name.is_empty() {
            return Err(AiError::invalid_request("tool name must not be empty"));
        }
        let mut tools = self.tools.write().expect("tool registry poisoned");
        if tools.contains_key(&name) {
            return Err(AiError::invalid_request(format!(
                "tool {name} is already registered"
            )));
        }
        tools.insert(name, handle);
        Ok(())
    }

    /// Look up a handle by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandle>> {
        self.tools
            .read()
            .expect("tool registry poisoned")
            .get(name)
            .cloned()
    }

    /// Sorted names of all registered tools.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// All registered handles.
    pub fn all(&self) -> Vec<Arc<dyn ToolHandle>> {
        self.tools
            .read()
            .expect("tool registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Remove every registered tool.
    pub fn clear(&self) {
        self.tools.write().expect("tool registry poisoned").clear();
    }
}
