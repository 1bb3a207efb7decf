//! The `compile` command: CSS-in-source-text transformation.
//!
//! Scans JS/TS source for `` css`...` `` template literals (only when the
//! file imports `css` from `"embedcss"`), replaces each literal with a
//! `css.$("...")` call yielding its class name list, and collects the
//! rewritten CSS. Literal replacement pads with blank lines so line numbers
//! downstream of a literal are preserved.

mod css;
mod naming;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::error::CommandError;
use crate::handler::HandlerResult;
use crate::protocol::{Request, Value};

pub use css::transform_css;
pub use naming::{class_suffix, unique_name, SUFFIX_LEN};

/// Options carried in the second `compile` argument as JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerOptions {
    #[serde(rename = "UniqueClassNames", default)]
    pub unique_class_names: bool,
}

/// Errors surfaced to the host as `{Error: true, Msg}` responses.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compile expected 2 arguments, got {0}")]
    WrongArity(usize),

    #[error("compile failed to parse options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("invalid class name: {0}")]
    InvalidClassName(&'static str),

    #[error("no class selector found in the CSS snippet")]
    NoClassSelector,
}

impl From<CompileError> for CommandError {
    fn from(err: CompileError) -> Self {
        CommandError::new(err.to_string())
    }
}

/// Handler for the `compile` command.
///
/// `Args = [sourceText, optionsJSON]`; responds with `{Code, Styles}`.
pub async fn compile_command(request: Request) -> HandlerResult {
    if request.args.len() != 2 {
        return Err(CompileError::WrongArity(request.args.len()).into());
    }
    let options: CompilerOptions =
        serde_json::from_str(&request.args[1]).map_err(CompileError::Options)?;

    let (code, styles) = rewrite_source(&request.args[0], &options)?;

    Ok(Value::Map(BTreeMap::from([
        ("Code".to_string(), Value::String(code)),
        ("Styles".to_string(), Value::String(styles)),
    ])))
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"import\s*\{\s*(\w|,|\s)*\s*css\s*(\w|,|\s)*\s*\}\s*from\s*("embedcss"|'embedcss')"#)
            .expect("import pattern is valid")
    })
}

/// Rewrite every style literal in `source`, returning the transformed code
/// and the concatenated styles. Sources that do not import `css` from
/// `"embedcss"` pass through untouched.
pub fn rewrite_source(
    source: &str,
    options: &CompilerOptions,
) -> Result<(String, String), CompileError> {
    if !import_re().is_match(source) {
        return Ok((source.to_string(), String::new()));
    }
    rewrite_literals(source, options)
}

fn rewrite_literals(
    source: &str,
    options: &CompilerOptions,
) -> Result<(String, String), CompileError> {
    let Some(start) = source.find("css`") else {
        return Ok((source.to_string(), String::new()));
    };
    let before = &source[..start];
    let tail = &source[start + 4..];
    let Some(end) = tail.find('`') else {
        // Unterminated literal: leave the rest of the file alone.
        return Ok((source.to_string(), String::new()));
    };
    let literal = &tail[..end];
    let after = &tail[end + 1..];

    // One newline per literal line keeps line numbers stable downstream.
    let padding: String = literal.chars().filter(|&c| c == '\n').collect();

    if !is_assigned(source.as_bytes(), start) {
        // The literal's value is discarded: treat it as a global style,
        // inserted before whatever the rest of the file produces.
        let spliced = format!("{before}css.$(\"\"){padding}{after}");
        let (code, next_styles) = rewrite_literals(&spliced, options)?;
        return Ok((code, join_styles(literal.to_string(), next_styles)));
    }

    let (class_list, transformed) = transform_css(literal, options)?;
    let spliced = format!("{before}css.$(\"{class_list}\"){padding}{after}");
    let (code, next_styles) = rewrite_literals(&spliced, options)?;
    Ok((code, join_styles(transformed, next_styles)))
}

fn join_styles(head: String, tail: String) -> String {
    if tail.is_empty() {
        head
    } else {
        format!("{head}\n{tail}")
    }
}

/// Whether the literal starting at `start` is bound to anything: scan
/// backwards over whitespace and decide on the first meaningful byte.
fn is_assigned(source: &[u8], start: usize) -> bool {
    for i in (0..start).rev() {
        match source[i] {
            b'=' | b':' | b'(' | b'{' => return true,
            b' ' | b'\n' => continue,
            _ => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMPORT: &str = "import { css } from \"embedcss\";\n";

    fn unique() -> CompilerOptions {
        CompilerOptions {
            unique_class_names: true,
        }
    }

    #[test]
    fn test_source_without_import_passes_through() {
        let source = "const styles = css`.btn { color: red }`;";
        let (code, styles) = rewrite_source(source, &unique()).unwrap();
        assert_eq!(code, source);
        assert_eq!(styles, "");
    }

    #[test]
    fn test_source_without_literals_passes_through() {
        let source = format!("{IMPORT}export const x = 1;");
        let (code, styles) = rewrite_source(&source, &unique()).unwrap();
        assert_eq!(code, source);
        assert_eq!(styles, "");
    }

    #[test]
    fn test_single_assigned_literal() {
        let snippet = ".btn { color: red }";
        let source = format!("{IMPORT}const styles = css`{snippet}`;\nuse(styles);");
        let (code, styles) = rewrite_source(&source, &unique()).unwrap();

        let suffix = class_suffix(snippet);
        assert!(code.contains(&format!("css.$(\"btn btn_{suffix}\")")));
        assert!(!code.contains("css`"));
        assert!(styles.contains(&format!(".btn.btn_{suffix} {{ color: red }}")));
    }

    #[test]
    fn test_line_numbers_preserved() {
        let source = format!("{IMPORT}const s = css`.a {{\n  color: red;\n}}`;\nafter();");
        let (code, _styles) = rewrite_source(&source, &unique()).unwrap();
        assert_eq!(
            code.matches('\n').count(),
            source.matches('\n').count(),
            "rewrite changed the line count"
        );
        assert!(code.ends_with("after();"));
    }

    #[test]
    fn test_unassigned_literal_becomes_global_style() {
        let source = format!("{IMPORT}css`.reset {{ margin: 0 }}`;\n");
        let (code, styles) = rewrite_source(&source, &unique()).unwrap();

        assert!(code.contains("css.$(\"\")"));
        // Global styles pass through unrewritten.
        assert_eq!(styles, ".reset { margin: 0 }");
    }

    #[test]
    fn test_global_style_precedes_later_styles() {
        let snippet = ".btn { color: red }";
        let source = format!(
            "{IMPORT}css`.reset {{ margin: 0 }}`;\nconst s = css`{snippet}`;\n"
        );
        let (code, styles) = rewrite_source(&source, &unique()).unwrap();

        let suffix = class_suffix(snippet);
        assert!(code.contains(&format!("css.$(\"btn btn_{suffix}\")")));
        let reset_pos = styles.find(".reset").unwrap();
        let btn_pos = styles.find(".btn.").unwrap();
        assert!(reset_pos < btn_pos);
    }

    #[test]
    fn test_unterminated_literal_left_alone() {
        let source = format!("{IMPORT}const s = css`.a {{ color: red }};");
        let (code, styles) = rewrite_source(&source, &unique()).unwrap();
        assert_eq!(code, source);
        assert_eq!(styles, "");
    }

    #[test]
    fn test_invalid_snippet_propagates_error() {
        let source = format!("{IMPORT}const s = css`.a .b {{ }}`;");
        let err = rewrite_source(&source, &unique()).unwrap_err();
        assert!(err.to_string().contains("single class name"));
    }

    #[tokio::test]
    async fn test_compile_command_arity() {
        let err = compile_command(Request::new("compile", vec!["only one".to_string()]))
            .await
            .unwrap_err();
        assert!(err.message().contains("expected 2 arguments"));
    }

    #[tokio::test]
    async fn test_compile_command_bad_options() {
        let request = Request::new(
            "compile",
            vec!["code".to_string(), "not json".to_string()],
        );
        let err = compile_command(request).await.unwrap_err();
        assert!(err.message().contains("failed to parse options"));
    }

    #[tokio::test]
    async fn test_compile_command_success_shape() {
        let source = format!("{IMPORT}const s = css`.a {{ color: red }}`;");
        let request = Request::new(
            "compile",
            vec![source, "{\"UniqueClassNames\":true}".to_string()],
        );
        let Value::Map(map) = compile_command(request).await.unwrap() else {
            panic!("expected map response");
        };
        assert!(matches!(map.get("Code"), Some(Value::String(_))));
        assert!(matches!(map.get("Styles"), Some(Value::String(_))));
    }
}
