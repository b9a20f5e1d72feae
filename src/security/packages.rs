//! Package name/spec validation, run before any install is attempted.

use regex::Regex;

use crate::language::Language;

use super::SecurityError;

const MAX_SPEC_LEN: usize = 200;
const VERSION_SEPARATORS: &[&str] = &["==", ">=", "<=", "!=", "~="];

fn blocked_identifiers(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["os", "subprocess", "sys", "ctypes"],
        Language::TypeScript | Language::JavaScript => &["child_process", "fs"],
        Language::Go => &["os/exec", "syscall", "unsafe"],
        Language::Rust => &["std"],
        Language::Bash => &[],
    }
}

fn name_pattern(language: Language) -> Regex {
    let pattern = match language {
        Language::Python => r"^[A-Za-z0-9][A-Za-z0-9._-]{0,199}$",
        Language::TypeScript | Language::JavaScript => r"^(@[a-z0-9-][a-z0-9._-]*/)?[a-z0-9][a-z0-9._-]{0,199}$",
        Language::Go => r"^[A-Za-z0-9][A-Za-z0-9._/-]{0,199}$",
        Language::Rust => r"^[A-Za-z0-9][A-Za-z0-9_-]{0,199}$",
        Language::Bash => r"^[A-Za-z0-9][A-Za-z0-9._-]{0,199}$",
    };
    Regex::new(pattern).expect("package name patterns are statically valid")
}

/// Outcome of validating one package spec: the cleaned base name, stripped
/// of any version specifier or extras.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageValidation {
    pub base_name: String,
}

fn strip_version(spec: &str) -> &str {
    let mut base = spec;
    for sep in VERSION_SEPARATORS {
        if let Some((head, _)) = base.split_once(sep) {
            base = head;
        }
    }
    if let Some((head, _)) = base.split_once('@') {
        if !head.is_empty() {
            base = head;
        }
    }
    if let Some((head, _)) = base.split_once('[') {
        base = head;
    }
    base.trim()
}

fn validate_one(language: Language, spec: &str) -> Result<PackageValidation, SecurityError> {
    if spec.len() > MAX_SPEC_LEN {
        return Err(SecurityError::InvalidPackageSpec(format!(
            "package spec exceeds {MAX_SPEC_LEN} characters"
        )));
    }

    let lower = spec.to_ascii_lowercase();
    for disallowed in ["git+", "://", "..", ";", "|", "&", "$", "`", " "] {
        if lower.contains(disallowed) {
            return Err(SecurityError::InvalidPackageSpec(format!(
                "package spec contains disallowed token: {disallowed}"
            )));
        }
    }
    if spec.starts_with('/') || spec.starts_with('.') {
        return Err(SecurityError::InvalidPackageSpec(
            "local paths are not allowed as package specs".to_string(),
        ));
    }

    let base_name = strip_version(spec).to_string();
    if base_name.is_empty() {
        return Err(SecurityError::InvalidPackageSpec(
            "empty package name".to_string(),
        ));
    }

    let base_lower = base_name.to_ascii_lowercase();
    if blocked_identifiers(language)
        .iter()
        .any(|blocked| base_lower == *blocked)
    {
        return Err(SecurityError::BlockedPackage(base_name));
    }

    if !name_pattern(language).is_match(&base_name) {
        return Err(SecurityError::InvalidPackageSpec(format!(
            "{base_name} does not match the allowed character set for {language}"
        )));
    }

    Ok(PackageValidation { base_name })
}

/// Validate every package spec in `specs`, stopping at the first failure.
pub fn validate_packages(
    language: Language,
    specs: &[String],
) -> Result<Vec<PackageValidation>, SecurityError> {
    specs
        .iter()
        .map(|spec| validate_one(language, spec))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_python_package() {
        let result = validate_packages(Language::Python, &["numpy==1.26.0".to_string()]).unwrap();
        assert_eq!(result[0].base_name, "numpy");
    }

    #[test]
    fn rejects_blocked_python_identifier() {
        assert!(validate_packages(Language::Python, &["os".to_string()]).is_err());
    }

    #[test]
    fn rejects_git_url() {
        assert!(validate_packages(
            Language::Python,
            &["git+https://example.com/evil.git".to_string()]
        )
        .is_err());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        assert!(validate_packages(Language::Bash, &["foo; rm -rf /".to_string()]).is_err());
    }

    #[test]
    fn strips_extras_and_version() {
        let result =
            validate_packages(Language::Python, &["requests[security]>=2.0".to_string()]).unwrap();
        assert_eq!(result[0].base_name, "requests");
    }

    #[test]
    fn rejects_go_blocked_import_path() {
        assert!(validate_packages(Language::Go, &["os/exec".to_string()]).is_err());
    }
}
