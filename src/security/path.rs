//! Workspace path sanitizer. Every caller-supplied path that reaches the
//! container (`putFile`, `getFile`, temp-file names) is routed through
//! [`sanitize_path`] first.

use percent_encoding::percent_decode_str;

use super::SecurityError;

pub const WORKSPACE_ROOT: &str = "/workspace";
const MAX_DECODE_ROUNDS: u32 = 3;

/// Percent-decode `input` up to [`MAX_DECODE_ROUNDS`] times, so a doubly- or
/// triply-encoded traversal sequence like `%252e%252e` still gets caught.
/// Traversal checks run on the fully decoded string, never the original.
fn decode_repeatedly(input: &str) -> Result<String, SecurityError> {
    let mut current = input.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        let decoded = percent_decode_str(&current)
            .decode_utf8()
            .map_err(|_| SecurityError::InvalidPath("path is not valid UTF-8".to_string()))?
            .into_owned();
        if decoded == current {
            break;
        }
        current = decoded;
    }
    Ok(current)
}

/// Validate a caller-supplied path and normalize it under [`WORKSPACE_ROOT`].
/// Returns the normalized absolute path on success.
pub fn sanitize_path(raw: &str) -> Result<String, SecurityError> {
    if raw.as_bytes().contains(&0) {
        return Err(SecurityError::InvalidPath("path contains a null byte".to_string()));
    }

    let decoded = decode_repeatedly(raw)?;

    if decoded.contains("..") || decoded.contains("%2e%2e") {
        return Err(SecurityError::PathTraversal(decoded));
    }

    let relative = if decoded.starts_with('/') {
        decoded
            .strip_prefix(WORKSPACE_ROOT)
            .ok_or_else(|| SecurityError::InvalidPath(format!("{decoded} is outside the workspace root")))?
            .trim_start_matches('/')
    } else {
        decoded.trim_start_matches('/')
    };

    let mut normalized: Vec<&str> = Vec::new();
    for component in relative.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(SecurityError::PathTraversal(decoded)),
            other => normalized.push(other),
        }
    }

    if normalized.is_empty() {
        return Err(SecurityError::InvalidPath(
            "operations on the workspace root directory itself are rejected".to_string(),
        ));
    }

    Ok(format!("{WORKSPACE_ROOT}/{}", normalized.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_relative_path() {
        assert_eq!(sanitize_path("out.txt").unwrap(), "/workspace/out.txt");
    }

    #[test]
    fn accepts_already_rooted_path() {
        assert_eq!(sanitize_path("/workspace/sub/out.txt").unwrap(), "/workspace/sub/out.txt");
    }

    #[test]
    fn rejects_plain_dotdot() {
        assert!(sanitize_path("../etc/passwd").is_err());
    }

    #[test]
    fn rejects_single_percent_encoded_dotdot() {
        assert!(sanitize_path("%2e%2e/etc/passwd").is_err());
    }

    #[test]
    fn rejects_double_percent_encoded_dotdot() {
        assert!(sanitize_path("%252e%252e/etc/passwd").is_err());
    }

    #[test]
    fn rejects_null_byte() {
        assert!(sanitize_path("out\0.txt").is_err());
    }

    #[test]
    fn rejects_workspace_root_itself() {
        assert!(sanitize_path("/workspace").is_err());
        assert!(sanitize_path("").is_err());
    }

    #[test]
    fn rejects_absolute_path_outside_the_workspace() {
        assert!(sanitize_path("/etc/passwd").is_err());
        assert!(sanitize_path("/root/.ssh/id_rsa").is_err());
    }
}
