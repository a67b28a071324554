//! Delimiter-based extraction of sections from raw model output.
//!
//! Prompts ask the model to wrap each part of its answer in XML-like tags
//! (`<lecture>...</lecture>`). A section is the text after the *last* opening
//! tag, up to the first matching closing tag that follows it, trimmed.

use crate::error::TemplateError;

/// Return the trimmed content of the last `<tag>...</tag>` section in `raw`.
///
/// Fails when the opening tag is absent, or when no closing tag follows the
/// last opening tag (typically a truncated response).
pub fn delimited<'a>(raw: &'a str, tag: &str) -> Result<&'a str, TemplateError> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = raw
        .rfind(&open)
        .map(|pos| pos + open.len())
        .ok_or_else(|| TemplateError::MissingOpenTag(tag.to_string()))?;

    let rest = &raw[start..];
    let end = rest
        .find(&close)
        .ok_or_else(|| TemplateError::MissingCloseTag(tag.to_string()))?;

    Ok(rest[..end].trim())
}
