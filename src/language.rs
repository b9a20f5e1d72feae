//! The language enumeration shared by the Security Gate, Runtime Adapters,
//! and Container Pool.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    TypeScript,
    JavaScript,
    Go,
    Rust,
    Bash,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::TypeScript,
        Language::JavaScript,
        Language::Go,
        Language::Rust,
        Language::Bash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Bash => "bash",
        }
    }

    pub fn default_image(&self) -> &'static str {
        match self {
            Language::Python => "sandboxd/python:3.12-slim",
            Language::TypeScript => "sandboxd/node:20-slim",
            Language::JavaScript => "sandboxd/node:20-slim",
            Language::Go => "sandboxd/go:1.22",
            Language::Rust => "sandboxd/rust:1.78",
            Language::Bash => "sandboxd/bash:alpine",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "javascript" | "js" => Ok(Language::JavaScript),
            "go" | "golang" => Ok(Language::Go),
            "rust" | "rs" => Ok(Language::Rust),
            "bash" | "sh" | "shell" => Ok(Language::Bash),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_as_str() {
        for lang in Language::ALL {
            assert_eq!(Language::from_str(lang.as_str()).unwrap(), lang);
        }
    }

    #[test]
    fn accepts_common_aliases() {
        assert_eq!(Language::from_str("py").unwrap(), Language::Python);
        assert_eq!(Language::from_str("GOLANG").unwrap(), Language::Go);
    }
}
