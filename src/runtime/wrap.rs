//! Temp-file naming and the Go/Rust `main`-wrapping rule. Temp files always
//! live under `/workspace`, never `/tmp`, since `/tmp` may be mounted
//! `noexec`.

/// A `/workspace`-rooted temp file name embedding a millisecond timestamp
/// and a random suffix, so concurrent execs never collide on a file name.
pub fn temp_file_path(extension: &str) -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("/workspace/.exec-{millis}-{}.{extension}", &suffix[..8])
}

/// Wrap a Go fragment in `package main` + `func main() { ... }` unless it
/// already declares its own `main`.
pub fn wrap_go(source: &str) -> String {
    if source.contains("func main(") {
        return source.to_string();
    }

    let indented: String = source
        .lines()
        .map(|line| format!("\t{line}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("package main\n\nimport \"fmt\"\n\nfunc main() {{\n{indented}\n}}\n\nvar _ = fmt.Sprint")
}

/// Wrap a Rust fragment in `fn main() { ... }` unless it already declares
/// its own `main`.
pub fn wrap_rust(source: &str) -> String {
    if source.contains("fn main(") {
        return source.to_string();
    }

    let indented: String = source
        .lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("fn main() {{\n{indented}\n}}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_paths_are_rooted_under_workspace_and_distinct() {
        let a = temp_file_path("go");
        let b = temp_file_path("go");
        assert!(a.starts_with("/workspace/"));
        assert_ne!(a, b);
    }

    #[test]
    fn wraps_bare_go_fragment_in_main() {
        let wrapped = wrap_go("fmt.Println(\"hi\")");
        assert!(wrapped.contains("func main()"));
        assert!(wrapped.contains("package main"));
    }

    #[test]
    fn leaves_go_fragment_with_own_main_untouched() {
        let source = "package main\nfunc main() { println(\"hi\") }";
        assert_eq!(wrap_go(source), source);
    }

    #[test]
    fn wraps_bare_rust_fragment_in_main() {
        let wrapped = wrap_rust("println!(\"hi\");");
        assert!(wrapped.starts_with("fn main() {"));
    }

    #[test]
    fn leaves_rust_fragment_with_own_main_untouched() {
        let source = "fn main() { println!(\"hi\"); }";
        assert_eq!(wrap_rust(source), source);
    }
}
