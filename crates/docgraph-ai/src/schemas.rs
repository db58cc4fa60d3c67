use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// Structured JSON shape the write phase asks the LLM for; parsed directly
/// into the fields of `ModuleArtifact`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModuleDocData {
    pub summary: String,
    pub responsibility: String,
    #[serde(default)]
    pub key_functions: Vec<KeyFunctionData>,
    #[serde(default)]
    pub dependency_usage: String,
    #[serde(default)]
    pub exports: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KeyFunctionData {
    pub name: String,
    pub purpose: String,
}

/// Structured JSON shape `CycleContextBuilder` asks the LLM for.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SccOverviewData {
    pub cycle_pattern: String,
    pub collective_responsibility: String,
    pub interdependency_explanation: String,
    #[serde(default)]
    pub key_abstractions: Vec<String>,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub utilities: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    pub summary: String,
}

/// Structured JSON shape the reviewer returns.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReviewData {
    pub passed: bool,
    #[serde(default)]
    pub feedback: String,
}

/// Structured JSON shape plan generation returns, mapped onto `DocPlan`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanData {
    pub project_type: String,
    pub audience: String,
    pub primary_use_case: String,
    pub architecture_pattern: String,
    pub sections: Vec<SectionData>,
    #[serde(default)]
    pub glossary: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SectionData {
    pub section_id: String,
    pub title: String,
    pub purpose: String,
    #[serde(default)]
    pub required_context: Vec<String>,
    pub style: String,
    pub max_tokens: u32,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Structured JSON shape the plan reviewer returns.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanReviewData {
    pub passed: bool,
    #[serde(default)]
    pub feedback: String,
}

/// Renders a schema as the JSON value a provider's structured-output
/// request parameter expects.
pub fn schema_to_json_value<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(serde_json::Value::Null)
}
