//! Argument schemas for each MCP tool, deserialized from the tool call's
//! JSON params and documented via `schemars` for the tool's input schema.

use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteArgs {
    /// Language to run the snippet under: python, typescript, javascript, go, rust, bash.
    pub language: String,
    /// Source code to execute.
    pub code: String,
    /// Existing session name to run against. Omit for a one-shot pooled container.
    #[serde(default)]
    pub session: Option<String>,
    /// Execution timeout in milliseconds. Defaults to the configured engine timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Run under the preloaded ML-Python image with the numeric stack available.
    #[serde(default)]
    pub ml: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionArgs {
    /// One of: create, list, get, pause, resume, destroy, extend.
    pub action: String,
    /// Session name, required for create and usable in place of id elsewhere.
    #[serde(default)]
    pub name: Option<String>,
    /// Session id, required for pause/resume/destroy/extend when name is not given.
    #[serde(default)]
    pub id: Option<String>,
    /// Language for a new session. Required when action is create.
    #[serde(default)]
    pub language: Option<String>,
    /// TTL in seconds. Used as the initial TTL on create, or the delta on extend.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InstallArgs {
    /// Session name to install packages into. Packages only install into long-lived sessions.
    pub session: String,
    /// Language the package manager should target.
    pub language: String,
    /// Package specifiers, e.g. "requests==2.31.0".
    pub packages: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileOpsArgs {
    /// One of: read, write, delete, list.
    pub action: String,
    /// Session name the path is resolved against.
    pub session: String,
    /// Workspace-relative or absolute path under /workspace.
    pub path: String,
    /// UTF-8 file content for a write. Ignored for other actions.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InspectArgs {
    /// One of: pool, cache, sessions, audit, all. Defaults to all.
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SecurityArgs {
    /// One of: events, violations, stats. Defaults to stats.
    #[serde(default)]
    pub action: Option<String>,
    /// Number of events to return for events/violations. Defaults to 50.
    #[serde(default)]
    pub count: Option<usize>,
}
