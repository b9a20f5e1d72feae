//! Runtime Adapters: per-language code-to-command translation and package
//! install protocol. Encoded as a small variant over adapter values rather
//! than a trait-object hierarchy — ML-Python is composition over the base
//! Python adapter, not inheritance.

mod adapters;
mod wrap;

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::engine::{EngineAdapter, ContainerHandle, ExecOutput, ExecRequest};
use crate::language::Language;
use crate::security::{self, PackageValidation};

pub use adapters::RuntimeAdapter;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Security(#[from] security::SecurityError),

    #[error(transparent)]
    Engine(#[from] crate::engine::EngineError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Everything an adapter needs to run one piece of source against one
/// container.
pub struct ExecutionContext<'a> {
    pub handle: &'a ContainerHandle,
    pub timeout: Duration,
    pub env: HashMap<String, String>,
    pub stdin: Option<Vec<u8>>,
    pub cwd: Option<String>,
}

/// Outcome of a package install attempt.
#[derive(Debug, Clone)]
pub struct InstallResult {
    pub success: bool,
    pub installed_packages: Vec<String>,
    pub errors: Vec<String>,
}

/// Metrics parsed from an ML-Python run's stderr telemetry tokens.
#[derive(Debug, Clone, Default)]
pub struct MlMetrics {
    pub peak_memory_mib: Option<u64>,
    pub model_load_ms: Option<u64>,
    pub inference_ms: Option<u64>,
}

/// Execute `source` under `ctx` against `engine`, running the Security Gate
/// code validator first. No container command is issued on a validator
/// rejection.
pub async fn execute(
    language: Language,
    engine: &dyn EngineAdapter,
    source: &str,
    ctx: ExecutionContext<'_>,
) -> RuntimeResult<ExecOutput> {
    security::validate_code(language, source)?;

    let argv = adapters::for_language(language).build_argv(source);
    let mut req = ExecRequest::new(argv, ctx.timeout);
    req.env = ctx.env;
    req.stdin = ctx.stdin;
    req.cwd = ctx.cwd;

    let output = engine.exec(ctx.handle, req).await?;
    Ok(output)
}

/// Install `packages` into the container at `handle`, running the Package
/// Validator first.
pub async fn install_packages(
    language: Language,
    engine: &dyn EngineAdapter,
    handle: &ContainerHandle,
    packages: &[String],
    timeout: Duration,
) -> RuntimeResult<InstallResult> {
    let validated: Vec<PackageValidation> = security::validate_packages(language, packages)?;
    let argv = adapters::for_language(language).build_install_argv(&validated);

    let req = ExecRequest::new(argv, timeout);
    let output = engine.exec(handle, req).await?;

    if output.exit_code == 0 && !output.timed_out {
        Ok(InstallResult {
            success: true,
            installed_packages: validated.into_iter().map(|p| p.base_name).collect(),
            errors: Vec::new(),
        })
    } else {
        Ok(InstallResult {
            success: false,
            installed_packages: Vec::new(),
            errors: vec![output.stderr_string()],
        })
    }
}

/// ML-Python preloaded image: numeric/ML libraries baked in so installs are
/// rare on the hot path.
pub const ML_PYTHON_IMAGE: &str = "sandboxd/python-ml:3.12-cuda";

/// Allow-list enforced in addition to the ordinary package validator when
/// installing into an ML-Python container.
const ML_PACKAGE_ALLOWLIST: &[&str] = &[
    "numpy", "pandas", "scipy", "scikit-learn", "torch", "torchvision", "tensorflow", "matplotlib",
    "transformers", "xgboost", "lightgbm", "pillow",
];

/// Source prepended to every ML-Python run for deterministic seeding and
/// verbose logging, ahead of the caller's snippet.
pub fn ml_python_prelude() -> &'static str {
    "import random, numpy as _np\nrandom.seed(0)\n_np.random.seed(0)\n"
}

/// Validate `packages` against both the ordinary Python package validator
/// and the ML allow-list.
pub fn validate_ml_packages(packages: &[String]) -> RuntimeResult<Vec<PackageValidation>> {
    let validated = security::validate_packages(Language::Python, packages)?;
    for package in &validated {
        if !ML_PACKAGE_ALLOWLIST.contains(&package.base_name.to_ascii_lowercase().as_str()) {
            return Err(RuntimeError::Security(security::SecurityError::BlockedPackage(
                package.base_name.clone(),
            )));
        }
    }
    Ok(validated)
}

/// Parse the well-known telemetry tokens an ML-Python run writes to stderr:
/// `[telemetry] peak_memory_mib=123 model_load_ms=456 inference_ms=789`.
pub fn parse_ml_metrics(stderr: &str) -> MlMetrics {
    let mut metrics = MlMetrics::default();
    for line in stderr.lines() {
        let Some(rest) = line.strip_prefix("[telemetry]") else {
            continue;
        };
        for token in rest.split_whitespace() {
            if let Some((key, value)) = token.split_once('=') {
                let parsed: Option<u64> = value.parse().ok();
                match key {
                    "peak_memory_mib" => metrics.peak_memory_mib = parsed,
                    "model_load_ms" => metrics.model_load_ms = parsed,
                    "inference_ms" => metrics.inference_ms = parsed,
                    _ => {}
                }
            }
        }
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_telemetry_line() {
        let stderr = "loading model...\n[telemetry] peak_memory_mib=512 model_load_ms=820 inference_ms=13\ndone\n";
        let metrics = parse_ml_metrics(stderr);
        assert_eq!(metrics.peak_memory_mib, Some(512));
        assert_eq!(metrics.model_load_ms, Some(820));
        assert_eq!(metrics.inference_ms, Some(13));
    }

    #[test]
    fn missing_telemetry_yields_all_none() {
        let metrics = parse_ml_metrics("no telemetry here\n");
        assert!(metrics.peak_memory_mib.is_none());
    }

    #[test]
    fn ml_allowlist_accepts_numpy_and_rejects_requests() {
        assert!(validate_ml_packages(&["numpy".to_string()]).is_ok());
        assert!(validate_ml_packages(&["requests".to_string()]).is_err());
    }
}
