//! Best-effort extraction of generated code from fenced model output.
//!
//! The parser always runs over the whole accumulated buffer, so a marker split
//! across chunk boundaries is seen intact once its last byte arrives.

const FENCE: &str = "```";

/// Extract the code payload from accumulated model output.
///
/// - Opening fence lines (three backticks, optional language tag, newline)
///   are dropped; repeated sections are concatenated.
/// - Closing fences are dropped, whether on their own line or glued to the
///   end of a code line.
/// - A marker that is still arriving at the end of the text is dropped.
/// - Text without any fence passes through unchanged.
pub fn parse_code(text: &str) -> String {
    if !text.contains(FENCE) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut inside = false;

    for line in text.split_inclusive('\n') {
        let complete = line.ends_with('\n');
        let body = line.trim_end_matches(['\n', '\r']);
        let marker = body.trim();

        if let Some(tag) = marker.strip_prefix(FENCE) {
            if is_language_tag(tag) {
                // A tagged fence inside a block is a new section, not a close.
                inside = if tag.is_empty() { !inside } else { true };
                continue;
            }
        }

        if !complete && !marker.is_empty() && FENCE.starts_with(marker) {
            continue;
        }

        if inside {
            let code = body.trim_end();
            if let Some(before) = code.strip_suffix(FENCE) {
                out.push_str(before);
                if complete {
                    out.push('\n');
                }
                inside = false;
                continue;
            }

            if !complete {
                out.push_str(strip_partial_close(body));
                continue;
            }
        }

        out.push_str(line);
    }

    out.trim().to_string()
}

fn is_language_tag(tag: &str) -> bool {
    tag.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '#' | '-'))
}

/// Drop one or two trailing backticks that may be the start of a closing fence.
fn strip_partial_close(body: &str) -> &str {
    let stripped = body.trim_end_matches('`');
    if body.len() - stripped.len() < FENCE.len() {
        stripped
    } else {
        body
    }
}
