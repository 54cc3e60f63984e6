//! Left-to-right scanner for `${[prefix:]expression}` placeholders

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placeholder<'a> {
    /// Full placeholder text including `${` and `}`
    pub raw: &'a str,
    /// Everything between the braces
    pub inner: &'a str,
    /// `(prefix, expression)` if the inner text has a `prefix:` part
    pub prefixed: Option<(&'a str, &'a str)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Literal(&'a str),
    /// `\$`, rendered as a literal `$`
    Escaped,
    Placeholder(Placeholder<'a>),
}

fn split_prefix(inner: &str) -> Option<(&str, &str)> {
    let (prefix, expression) = inner.split_once(':')?;
    let valid = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then_some((prefix, expression))
}

/// Split `text` into literal runs, escapes and placeholders.
///
/// # Errors
///
/// Returns [`Error::ExpressionFormat`] for a `${` without closing `}`.
pub(crate) fn parse(text: &str) -> Result<Vec<Segment<'_>>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if bytes.get(i + 1) == Some(&b'$') => {
                if literal_start < i {
                    segments.push(Segment::Literal(&text[literal_start..i]));
                }
                segments.push(Segment::Escaped);
                i += 2;
                literal_start = i;
            }
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                let Some(close) = text[i + 2..].find('}') else {
                    return Err(Error::ExpressionFormat {
                        expression: text.to_string(),
                        position: i,
                    });
                };
                if literal_start < i {
                    segments.push(Segment::Literal(&text[literal_start..i]));
                }
                let end = i + 2 + close;
                let inner = &text[i + 2..end];
                segments.push(Segment::Placeholder(Placeholder {
                    raw: &text[i..=end],
                    inner,
                    prefixed: split_prefix(inner),
                }));
                i = end + 1;
                literal_start = i;
            }
            _ => i += 1,
        }
    }

    if literal_start < bytes.len() {
        segments.push(Segment::Literal(&text[literal_start..]));
    }
    Ok(segments)
}

/// Cheap check whether `text` needs evaluation at all
pub(crate) fn has_expression_syntax(text: &str) -> bool {
    text.contains("${") || text.contains("\\$")
}
