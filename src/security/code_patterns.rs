//! Per-language lexical blocklist. Advisory only: it complements the kernel-
//! level controls in [`super::hardening`], it does not replace them.

use regex::RegexSet;

use crate::language::Language;

use super::SecurityError;

struct Blocklist {
    set: RegexSet,
    patterns: &'static [&'static str],
}

fn blocklist_for(language: Language) -> Blocklist {
    let patterns: &'static [&'static str] = match language {
        Language::Python => &[
            r"(?m)^\s*import\s+os\b",
            r"(?m)^\s*import\s+subprocess\b",
            r"(?m)^\s*import\s+sys\b",
            r"(?m)^\s*from\s+os\s+import",
            r"\beval\s*\(",
            r"\bexec\s*\(",
            r"__import__\s*\(",
            r"\bcompile\s*\(",
            r#"open\s*\([^)]*['"]\s*[wa]\b"#,
            r"\.system\s*\(",
            r"\.popen\s*\(",
        ],
        Language::TypeScript | Language::JavaScript => &[
            r#"require\s*\(\s*['"]child_process['"]\s*\)"#,
            r#"from\s+['"]child_process['"]"#,
            r#"require\s*\(\s*['"]fs['"]\s*\)"#,
            r#"from\s+['"]fs['"]"#,
            r"\beval\s*\(",
            r"\bFunction\s*\(",
            r"process\.exit\s*\(",
            r"process\.kill\s*\(",
        ],
        Language::Go => &[
            r"\bos/exec\b",
            r#""syscall""#,
            r#""unsafe""#,
            r"exec\.Command\s*\(",
        ],
        Language::Rust => &[
            r"use\s+std::process",
            r"use\s+std::os\b",
            r"Command::",
            r"unsafe\s*\{",
        ],
        Language::Bash => &[
            r"rm\s+-rf\s+/",
            r"dd\s+if=",
            r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;",
            r"mkfs\.",
            r"curl\s+[^|]*\|\s*sh",
            r"wget\s+[^|]*\|\s*sh",
        ],
    };

    Blocklist {
        set: RegexSet::new(patterns).expect("blocklist patterns are statically valid"),
        patterns,
    }
}

/// Reject `source` if it matches any disallowed construct for `language`.
/// Returns the first matching pattern's source text in the error so a
/// caller can surface a specific reason.
pub fn validate_code(language: Language, source: &str) -> Result<(), SecurityError> {
    let blocklist = blocklist_for(language);
    let matches = blocklist.set.matches(source);
    if let Some(index) = matches.iter().next() {
        return Err(SecurityError::BlockedCodePattern(
            blocklist.patterns[index].to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_python_os_import() {
        assert!(validate_code(Language::Python, "import os\nos.system('ls')").is_err());
    }

    #[test]
    fn allows_clean_python() {
        assert!(validate_code(Language::Python, "print(sum(range(10)))").is_ok());
    }

    #[test]
    fn rejects_bash_fork_bomb() {
        assert!(validate_code(Language::Bash, ":(){ :|:& };:").is_err());
    }

    #[test]
    fn rejects_rust_unsafe_block() {
        assert!(validate_code(Language::Rust, "fn main() { unsafe { } }").is_err());
    }

    #[test]
    fn rejects_go_exec_command() {
        assert!(validate_code(Language::Go, "exec.Command(\"ls\")").is_err());
    }

    #[test]
    fn rejects_js_child_process() {
        assert!(validate_code(
            Language::JavaScript,
            "const cp = require('child_process')"
        )
        .is_err());
    }
}
