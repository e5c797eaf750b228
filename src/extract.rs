//! Fenced code block extraction from model output

use log::trace;

const FENCE: &str = "```";

/// Return the trimmed body of the first fenced block tagged `language`.
///
/// The tagged opener is searched for directly, so stray or untagged
/// fences before it do not matter. The body runs to the next fence.
/// Unterminated fences and empty bodies yield `None`.
pub fn extract_code(text: &str, language: &str) -> Option<String>
{   let opener = format!("{}{}", FENCE, language);
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find(&opener)
    {   let body_start = cursor + found + opener.len();
        let after_opener = &text[body_start..];
        if !after_opener.starts_with(char::is_whitespace)
        {   cursor = body_start;
            continue;
        }

        let closing = after_opener.find(FENCE)?;
        let body = after_opener[..closing].trim();
        trace!("Extracted {} byte {} block", body.len(), language);
        return if body.is_empty()
        {   None
        } else
        {   Some(body.to_string())
        };
    }
    None
}
