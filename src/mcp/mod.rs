//! MCP stdio transport: exposes the six sandbox tools over JSON-RPC on
//! stdin/stdout via `rmcp`. Each tool method is a thin translator between
//! the wire args and the `Server` API, mirroring how the teacher's HTTP
//! handlers stay thin and push logic down into `Manager`.

mod args;

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{tool, ServerHandler};
use serde_json::json;

use crate::error::SandboxError;
use crate::language::Language;
use crate::server::{ExecuteRequest, InspectTarget, SecurityAction, Server, SessionAction};

use args::{ExecuteArgs, FileOpsArgs, InspectArgs, InstallArgs, SecurityArgs, SessionArgs};

fn error_result(err: impl std::fmt::Display) -> CallToolResult {
    CallToolResult::error(vec![Content::text(err.to_string())])
}

fn json_result(value: impl serde::Serialize) -> CallToolResult {
    match serde_json::to_string_pretty(&value) {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => error_result(e),
    }
}

fn parse_language(raw: &str) -> Result<Language, SandboxError> {
    raw.parse().map_err(SandboxError::Validation)
}

#[derive(Clone)]
pub struct SandboxMcpServer {
    server: Arc<Server>,
    caller_key: String,
}

#[tool(tool_box)]
impl SandboxMcpServer {
    pub fn new(server: Arc<Server>) -> Self {
        Self {
            server,
            caller_key: "stdio".to_string(),
        }
    }

    fn check_rate_limit(&self, operation: &str) -> Result<(), SandboxError> {
        self.server.check_rate_limit(&self.caller_key, operation)
    }

    #[tool(description = "Execute a code snippet in an ephemeral pooled container or an existing session")]
    async fn sandbox_execute(&self, #[tool(aggr)] args: ExecuteArgs) -> Result<CallToolResult, rmcp::Error> {
        if let Err(e) = self.check_rate_limit("execute") {
            return Ok(error_result(e));
        }

        let language = match parse_language(&args.language) {
            Ok(l) => l,
            Err(e) => return Ok(error_result(e)),
        };

        let result = self
            .server
            .sandbox_execute(ExecuteRequest {
                language,
                code: args.code,
                session: args.session,
                timeout_ms: args.timeout_ms,
                ml: args.ml,
            })
            .await;

        Ok(match result {
            Ok(output) => json_result(json!({
                "stdout": output.stdout,
                "stderr": output.stderr,
                "exit_code": output.exit_code,
                "duration_ms": output.duration_ms,
            })),
            Err(e) => error_result(e),
        })
    }

    #[tool(description = "Create, inspect, pause, resume, extend, or destroy a long-lived sandbox session")]
    async fn sandbox_session(&self, #[tool(aggr)] args: SessionArgs) -> Result<CallToolResult, rmcp::Error> {
        if let Err(e) = self.check_rate_limit("session") {
            return Ok(error_result(e));
        }

        let action = match args.action.as_str() {
            "create" => {
                let language = match args
                    .language
                    .as_deref()
                    .ok_or_else(|| SandboxError::Validation("session create requires a language".into()))
                    .and_then(parse_language)
                {
                    Ok(l) => l,
                    Err(e) => return Ok(error_result(e)),
                };
                SessionAction::Create {
                    language,
                    ttl: args.ttl_seconds,
                }
            }
            "list" => SessionAction::List,
            "get" => SessionAction::Get,
            "pause" => SessionAction::Pause,
            "resume" => SessionAction::Resume,
            "destroy" => SessionAction::Destroy,
            "extend" => {
                let ttl = match args
                    .ttl_seconds
                    .ok_or_else(|| SandboxError::Validation("session extend requires ttl_seconds".into()))
                {
                    Ok(ttl) => ttl,
                    Err(e) => return Ok(error_result(e)),
                };
                SessionAction::Extend { ttl }
            }
            other => {
                return Ok(error_result(SandboxError::Validation(format!(
                    "unknown session action: {other}"
                ))))
            }
        };

        let result = self.server.sandbox_session(action, args.name, args.id).await;
        Ok(match result {
            Ok(sessions) => json_result(sessions),
            Err(e) => error_result(e),
        })
    }

    #[tool(description = "Install packages into an existing session, keyed through the package cache")]
    async fn sandbox_install(&self, #[tool(aggr)] args: InstallArgs) -> Result<CallToolResult, rmcp::Error> {
        if let Err(e) = self.check_rate_limit("install") {
            return Ok(error_result(e));
        }

        let language = match parse_language(&args.language) {
            Ok(l) => l,
            Err(e) => return Ok(error_result(e)),
        };

        let result = self.server.sandbox_install(&args.session, language, args.packages).await;
        Ok(match result {
            Ok(outcome) => json_result(outcome),
            Err(e) => error_result(e),
        })
    }

    #[tool(description = "Read, write, delete, or list a file inside a session's workspace")]
    async fn sandbox_file_ops(&self, #[tool(aggr)] args: FileOpsArgs) -> Result<CallToolResult, rmcp::Error> {
        if let Err(e) = self.check_rate_limit("file_ops") {
            return Ok(error_result(e));
        }

        let result: Result<serde_json::Value, SandboxError> = match args.action.as_str() {
            "read" => self
                .server
                .sandbox_file_read(&args.session, &args.path)
                .await
                .map(|bytes| json!({ "content": String::from_utf8_lossy(&bytes) })),
            "write" => {
                let content = args.content.unwrap_or_default().into_bytes();
                self.server
                    .sandbox_file_write(&args.session, &args.path, content)
                    .await
                    .map(|_| json!({ "ok": true }))
            }
            "delete" => self
                .server
                .sandbox_file_delete(&args.session, &args.path)
                .await
                .map(|_| json!({ "ok": true })),
            "list" => self
                .server
                .sandbox_file_list(&args.session, &args.path)
                .await
                .map(|listing| json!({ "listing": listing })),
            other => Err(SandboxError::Validation(format!("unknown file_ops action: {other}"))),
        };

        Ok(match result {
            Ok(value) => json_result(value),
            Err(e) => error_result(e),
        })
    }

    #[tool(description = "Inspect pool, cache, session, or audit statistics")]
    async fn sandbox_inspect(&self, #[tool(aggr)] args: InspectArgs) -> Result<CallToolResult, rmcp::Error> {
        let target = match args.target.as_deref().unwrap_or("all") {
            "pool" => InspectTarget::Pool,
            "cache" => InspectTarget::Cache,
            "sessions" => InspectTarget::Sessions,
            "audit" => InspectTarget::Audit,
            "all" => InspectTarget::All,
            other => {
                return Ok(error_result(SandboxError::Validation(format!(
                    "unknown inspect target: {other}"
                ))))
            }
        };

        Ok(match self.server.sandbox_inspect(target).await {
            Ok(report) => json_result(json!({
                "pool": report.pool,
                "cache": report.cache,
                "sessions": report.sessions,
                "audit": report.audit,
            })),
            Err(e) => error_result(e),
        })
    }

    #[tool(description = "Query recent security events, violations, or aggregate audit statistics")]
    async fn sandbox_security(&self, #[tool(aggr)] args: SecurityArgs) -> Result<CallToolResult, rmcp::Error> {
        let count = args.count.unwrap_or(50);
        let action = match args.action.as_deref().unwrap_or("stats") {
            "events" => SecurityAction::Events { count },
            "violations" => SecurityAction::Violations { count },
            "stats" => SecurityAction::Stats,
            other => {
                return Ok(error_result(SandboxError::Validation(format!(
                    "unknown security action: {other}"
                ))))
            }
        };

        let report = self.server.sandbox_security(action);
        Ok(json_result(json!({
            "events": report.events,
            "stats": report.stats,
        })))
    }
}

#[tool(tool_box)]
impl ServerHandler for SandboxMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sandboxd".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Execute code in hardened, ephemeral or session-backed Docker containers. \
                 Use sandbox_session to create a long-lived session before sandbox_install."
                    .to_string(),
            ),
        }
    }
}
