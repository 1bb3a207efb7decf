//! Class selector rewriting for style snippets.
//!
//! A snippet's first rule must select a single class. With unique class
//! names enabled, the derived suffix class is appended to the selector
//! (`.btn` becomes `.btn.btn_XXXXXXXXXX`) and the caller receives the
//! space-separated class list to splice into the source.

use std::sync::OnceLock;

use regex::Regex;

use super::naming::unique_name;
use super::{CompileError, CompilerOptions};

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_-]*").expect("ident pattern is valid"))
}

/// Rewrite one style snippet.
///
/// Returns the class name list for the call site and the rewritten CSS.
pub fn transform_css(
    snippet: &str,
    options: &CompilerOptions,
) -> Result<(String, String), CompileError> {
    let Some(brace) = snippet.find('{') else {
        return Err(CompileError::NoClassSelector);
    };
    let prelude = &snippet[..brace];
    let rest = &snippet[brace..];

    let mut idents = ident_re().find_iter(prelude);
    let Some(class) = idents.next() else {
        return Err(CompileError::InvalidClassName("missing class selector"));
    };
    if idents.next().is_some() {
        return Err(CompileError::InvalidClassName(
            "selector must be a single class name",
        ));
    }

    if !options.unique_class_names {
        return Ok((class.as_str().to_string(), snippet.to_string()));
    }

    let unique = unique_name(class.as_str(), snippet);
    let mut selector = String::with_capacity(prelude.len() + unique.len() + 1);
    selector.push_str(&prelude[..class.end()]);
    selector.push('.');
    selector.push_str(&unique);
    selector.push_str(&prelude[class.end()..]);

    let class_list = format!("{} {}", class.as_str(), unique);
    Ok((class_list, format!("{selector}{rest}")))
}
