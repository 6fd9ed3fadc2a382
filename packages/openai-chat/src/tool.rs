//! Tool definitions and the name-keyed tool registry.
//!
//! A tool is a typed async function the model may request by name.
//! Arguments arrive as JSON text chosen by the model; outputs are
//! serialized back to JSON and appended to the transcript as a tool
//! turn. Registration happens once at startup; duplicate names are
//! rejected there rather than at dispatch time.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use openai_chat::{Tool, ToolRegistry};
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct LookupArgs {
//!     city: String,
//! }
//!
//! struct WeatherLookup;
//!
//! #[async_trait]
//! impl Tool for WeatherLookup {
//!     const NAME: &'static str = "getWeather";
//!     type Args = LookupArgs;
//!     type Output = String;
//!     type Error = anyhow::Error;
//!
//!     fn description(&self) -> &str {
//!         "Get the current weather for a city"
//!     }
//!
//!     async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
//!         Ok(format!("Sunny in {}", args.city))
//!     }
//! }
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(WeatherLookup)?;
//! ```

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ToolError;
use crate::schema::parameters_schema;
use crate::types::ToolCallPayload;

/// A typed tool the model can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, as advertised to the model.
    const NAME: &'static str;

    /// Argument type; the schema shown to the model is derived from it.
    type Args: DeserializeOwned + JsonSchema + Send;

    /// Output type, serialized into the tool turn.
    type Output: Serialize + Send;

    /// Handler error type. Errors are contained by the dispatch loop and
    /// surfaced to the model, never propagated out of the session. Only
    /// the display form reaches the model, so `anyhow::Error` works.
    type Error: std::fmt::Display + Send + Sync + 'static;

    /// What this tool does, as advertised to the model.
    fn description(&self) -> &str;

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error>;

    /// The OpenAI tool definition for this tool.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: self.description().to_string(),
            parameters: parameters_schema::<Self::Args>(),
        }
    }
}

/// Tool metadata in provider-neutral form.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,

    /// JSON schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Convert to the OpenAI `tools` array entry format.
    pub fn to_openai_format(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

/// A pending call, as seen by the dispatch loop.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque provider-assigned id; echoed back on the tool turn.
    pub id: String,

    pub name: String,

    /// Raw JSON argument text.
    pub arguments: String,
}

impl ToolCall {
    pub fn from_payload(payload: &ToolCallPayload) -> Self {
        Self {
            id: payload.id.clone(),
            name: payload.function.name.clone(),
            arguments: payload.function.arguments.clone(),
        }
    }

    /// Decode the arguments into a typed struct.
    pub fn parse_args<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// Type-erased tool, so heterogeneous tools share one registry.
#[async_trait]
pub trait ErasedTool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    /// Decode JSON arguments, run the tool, serialize the output.
    async fn call_erased(&self, arguments: &str) -> Result<String, ToolError>;
}

#[async_trait]
impl<T: Tool> ErasedTool for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn definition(&self) -> ToolDefinition {
        Tool::definition(self)
    }

    async fn call_erased(&self, arguments: &str) -> Result<String, ToolError> {
        let args: T::Args = serde_json::from_str(arguments)
            .map_err(|e| ToolError::ArgumentParse(e.to_string()))?;

        let output = self
            .call(args)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        serde_json::to_string(&output).map_err(|e| ToolError::OutputSerialize(e.to_string()))
    }
}

/// Name-keyed collection of tools, resolved once at startup.
///
/// Registration order is preserved because it is the order definitions
/// are advertised to the model.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn ErasedTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if a tool with the same name exists.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<(), ToolError> {
        if self.get(T::NAME).is_some() {
            return Err(ToolError::DuplicateName(T::NAME.to_string()));
        }
        self.tools.push(Box::new(tool));
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn ErasedTool> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(|tool| tool.as_ref())
    }

    /// Tool definitions in OpenAI format, in registration order.
    pub fn definitions(&self) -> Vec<serde_json::Value> {
        self.tools
            .iter()
            .map(|tool| tool.definition().to_openai_format())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
