//! Strict decoder for the model's reply.
//!
//! Accepted deviations from bare JSON: a surrounding Markdown code fence,
//! prose before the first `{` or after the last `}`, and trailing commas
//! before `}` or `]`. Field contents are never rewritten.

use super::AnalysisResult;

pub fn decode_result(reply: &str) -> Result<AnalysisResult, String> {
    let object = extract_object(reply)?;
    let cleaned = strip_trailing_commas(object);

    let result: AnalysisResult = serde_json::from_str(&cleaned)
        .map_err(|e| format!("Invalid analysis JSON: {e}"))?;

    if !result.confidence.is_finite() || !(0.0..=1.0).contains(&result.confidence) {
        return Err(format!(
            "Confidence out of range: {}",
            result.confidence
        ));
    }
    Ok(result)
}

/// The slice from the first `{` to the last `}`. Fences and prose fall outside it.
fn extract_object(reply: &str) -> Result<&str, String> {
    let start = reply
        .find('{')
        .ok_or_else(|| "No JSON object in analysis reply".to_string())?;
    let end = reply
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| "Unterminated JSON object in analysis reply".to_string())?;
    Ok(&reply[start..=end])
}

/// Drop commas that are followed only by whitespace and a closing bracket.
/// String literals are copied untouched.
fn strip_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}
