//! Per-language adapter data: default image, package manager, and the
//! code-to-command translation rule. One small variant, not a class
//! hierarchy — see the module doc comment on `runtime`.

use crate::language::Language;
use crate::security::PackageValidation;

use super::wrap;

pub struct RuntimeAdapter {
    language: Language,
}

pub fn for_language(language: Language) -> RuntimeAdapter {
    RuntimeAdapter { language }
}

impl RuntimeAdapter {
    pub fn language(&self) -> Language {
        self.language
    }

    pub fn default_image(&self) -> &'static str {
        self.language.default_image()
    }

    /// Translate `source` into the argv that executes it inside the
    /// container.
    pub fn build_argv(&self, source: &str) -> Vec<String> {
        match self.language {
            Language::Python => vec!["python".to_string(), "-c".to_string(), source.to_string()],
            Language::JavaScript => vec!["node".to_string(), "-e".to_string(), source.to_string()],
            Language::TypeScript => {
                let path = wrap::temp_file_path("ts");
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!(
                        "cat > {path} <<'SANDBOXD_EOF'\n{source}\nSANDBOXD_EOF\nnpx --yes tsx {path}; status=$?; rm -f {path}; exit $status"
                    ),
                ]
            }
            Language::Go => {
                let path = wrap::temp_file_path("go");
                let wrapped = wrap::wrap_go(source);
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!(
                        "cat > {path} <<'SANDBOXD_EOF'\n{wrapped}\nSANDBOXD_EOF\ngo run {path}; status=$?; rm -f {path}; exit $status"
                    ),
                ]
            }
            Language::Rust => {
                let src_path = wrap::temp_file_path("rs");
                let bin_path = src_path.trim_end_matches(".rs").to_string();
                let err_path = format!("{bin_path}.stderr");
                let wrapped = wrap::wrap_rust(source);
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!(
                        "cat > {src_path} <<'SANDBOXD_EOF'\n{wrapped}\nSANDBOXD_EOF\n\
                         rustc -O -o {bin_path} {src_path} 2>{err_path}; status=$?; \
                         if [ $status -ne 0 ]; then sed 's/^/[compile error] /' {err_path} >&2; \
                         rm -f {src_path} {bin_path} {err_path}; exit $status; fi; \
                         cat {err_path} >&2; {bin_path}; status=$?; \
                         rm -f {src_path} {bin_path} {err_path}; exit $status"
                    ),
                ]
            }
            Language::Bash => vec!["sh".to_string(), "-c".to_string(), source.to_string()],
        }
    }

    /// Translate a validated package list into the install argv using the
    /// language's native package manager.
    pub fn build_install_argv(&self, packages: &[PackageValidation]) -> Vec<String> {
        let names: Vec<String> = packages.iter().map(|p| p.base_name.clone()).collect();
        match self.language {
            Language::Python => {
                let mut argv = vec!["pip".to_string(), "install".to_string(), "--no-cache-dir".to_string()];
                argv.extend(names);
                argv
            }
            Language::JavaScript | Language::TypeScript => {
                let mut argv = vec!["npm".to_string(), "install".to_string(), "--no-save".to_string()];
                argv.extend(names);
                argv
            }
            Language::Go => {
                let joined = names.join(" ");
                vec!["sh".to_string(), "-c".to_string(), format!("for pkg in {joined}; do go get \"$pkg\" || exit 1; done")]
            }
            Language::Rust => {
                let joined = names.join(" ");
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!(
                        "test -f Cargo.toml || cargo init --name sandbox-workspace >/dev/null; \
                         for pkg in {joined}; do cargo add \"$pkg\" || exit 1; done"
                    ),
                ]
            }
            Language::Bash => {
                let joined = names.join(" ");
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!("apk update >/dev/null && apk add --no-cache {joined}"),
                ]
            }
        }
    }

    /// A text recipe for an external image builder; not required at
    /// runtime, provided so the pool/cache layers can pass it through.
    pub fn build_image_recipe(&self, packages: Option<&[String]>) -> String {
        let base = self.default_image();
        let mut recipe = format!("FROM {base}\n");
        if let Some(packages) = packages {
            if !packages.is_empty() {
                let install_argv = self.build_install_argv(
                    &packages
                        .iter()
                        .map(|p| PackageValidation { base_name: p.clone() })
                        .collect::<Vec<_>>(),
                );
                recipe.push_str(&format!("RUN {}\n", install_argv.join(" ")));
            }
        }
        recipe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_builds_dash_c_invocation() {
        let adapter = for_language(Language::Python);
        assert_eq!(adapter.build_argv("print(1)"), vec!["python", "-c", "print(1)"]);
    }

    #[test]
    fn go_install_argv_loops_over_packages() {
        let adapter = for_language(Language::Go);
        let argv = adapter.build_install_argv(&[PackageValidation { base_name: "golang.org/x/text".into() }]);
        assert_eq!(argv[0], "sh");
        assert!(argv[2].contains("go get"));
    }

    #[test]
    fn image_recipe_starts_with_from_line() {
        let adapter = for_language(Language::Python);
        let recipe = adapter.build_image_recipe(None);
        assert!(recipe.starts_with("FROM sandboxd/python"));
    }
}
