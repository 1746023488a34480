//! SQL template rendering.
//!
//! Resolves `{name}`-style placeholders inside raw SQL text against a merged
//! variable context. Substitution is single-pass: a substituted value is not
//! re-scanned for further placeholders, so rendering an already-resolved
//! string is a no-op.

use crate::error::{BqflowError, Result};
use std::collections::HashMap;

/// The merged variable mapping used to render one SQL statement.
pub type TemplateContext = HashMap<String, String>;

/// Resolves `{name}` placeholders in SQL text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateResolver;

impl TemplateResolver {
    /// Creates a new resolver.
    pub fn new() -> Self {
        Self
    }

    /// Renders `sql`, replacing every `{key}` occurrence with `context[key]`.
    ///
    /// `{{` and `}}` escape to literal braces. A placeholder missing from
    /// `context` fails fast; no partially rendered string is returned.
    pub fn render(&self, sql: &str, context: &TemplateContext) -> Result<String> {
        let mut out = String::with_capacity(sql.len());
        let mut chars = sql.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if chars.peek() == Some(&'{') {
                        chars.next();
                        out.push('{');
                        continue;
                    }

                    let mut key = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(k) => key.push(k),
                            None => {
                                return Err(BqflowError::template(format!(
                                    "unterminated placeholder '{{{key}' in SQL"
                                )));
                            }
                        }
                    }

                    match context.get(&key) {
                        Some(value) => out.push_str(value),
                        None => {
                            return Err(BqflowError::template(format!(
                                "placeholder '{key}' not found in template context"
                            )));
                        }
                    }
                }
                '}' => {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                        out.push('}');
                    } else {
                        return Err(BqflowError::template(
                            "single '}' encountered in SQL template",
                        ));
                    }
                }
                _ => out.push(c),
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, &str)]) -> TemplateContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let resolver = TemplateResolver::new();
        let ctx = context(&[("orders", "proj.ds.orders"), ("dt", "2020-01-01")]);

        let rendered = resolver
            .render("SELECT * FROM `{orders}` WHERE dt = '{dt}'", &ctx)
            .unwrap();

        assert_eq!(
            rendered,
            "SELECT * FROM `proj.ds.orders` WHERE dt = '2020-01-01'"
        );
    }

    #[test]
    fn test_render_missing_placeholder_fails_fast() {
        let resolver = TemplateResolver::new();
        let ctx = context(&[("orders", "proj.ds.orders")]);

        let err = resolver
            .render("SELECT * FROM {orders} WHERE dt = '{dt}'", &ctx)
            .unwrap_err();

        assert!(matches!(err, BqflowError::TemplateRender(_)));
        assert!(err.to_string().contains("'dt'"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let resolver = TemplateResolver::new();
        let ctx = context(&[("t", "proj.ds.t")]);

        let once = resolver.render("SELECT * FROM {t}", &ctx).unwrap();
        let twice = resolver.render(&once, &ctx).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_render_no_recursive_substitution() {
        let resolver = TemplateResolver::new();
        // The substituted value contains something placeholder-shaped; it
        // must land in the output verbatim.
        let ctx = context(&[("a", "{{b}}"), ("b", "oops")]);

        let rendered = resolver.render("{a}", &ctx).unwrap();
        assert_eq!(rendered, "{{b}}");
    }

    #[test]
    fn test_render_brace_escapes() {
        let resolver = TemplateResolver::new();
        let ctx = context(&[("t", "proj.ds.t")]);

        let rendered = resolver
            .render("SELECT STRUCT{{x: 1}} FROM {t}", &ctx)
            .unwrap();
        assert_eq!(rendered, "SELECT STRUCT{x: 1} FROM proj.ds.t");
    }

    #[test]
    fn test_render_unterminated_placeholder() {
        let resolver = TemplateResolver::new();
        let err = resolver
            .render("SELECT {orders", &context(&[]))
            .unwrap_err();
        assert!(matches!(err, BqflowError::TemplateRender(_)));
    }

    #[test]
    fn test_render_stray_closing_brace() {
        let resolver = TemplateResolver::new();
        let err = resolver.render("SELECT 1 }", &context(&[])).unwrap_err();
        assert!(matches!(err, BqflowError::TemplateRender(_)));
    }

    #[test]
    fn test_render_without_placeholders_is_passthrough() {
        let resolver = TemplateResolver::new();
        let sql = "SELECT 1";
        assert_eq!(resolver.render(sql, &context(&[])).unwrap(), sql);
    }
}
