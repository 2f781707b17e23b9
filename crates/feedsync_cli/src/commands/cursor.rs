//! Cursor command implementation.

use feedsync_protocol::{Cursor, LimitClamp};
use serde::Serialize;
use std::collections::BTreeMap;

/// Rendered cursor.
#[derive(Debug, Serialize)]
pub struct CursorReport {
    /// Cursor kind.
    pub kind: String,
    /// Cursor in display form.
    pub cursor: String,
    /// Query parameters after clamping; empty for the default cursor.
    pub parameters: BTreeMap<String, String>,
    /// Query string after clamping.
    pub query: String,
}

/// Builds a cursor from the command-line flags.
///
/// At most one id flag is accepted by the argument parser; without one a
/// limit yields a limit cursor and no flags yield the default cursor.
pub fn build_cursor(
    max_id: Option<String>,
    since_id: Option<String>,
    min_id: Option<String>,
    limit: Option<u32>,
) -> Cursor {
    match (max_id, since_id, min_id, limit) {
        (Some(id), _, _, limit) => Cursor::upper_bound(id, limit),
        (None, Some(id), _, limit) => Cursor::since(id, limit),
        (None, None, Some(id), limit) => Cursor::min(id, limit),
        (None, None, None, Some(n)) => Cursor::limit(n),
        (None, None, None, None) => Cursor::Default,
    }
}

/// Renders `cursor` through the clamp.
pub fn render(cursor: &Cursor, clamp: &LimitClamp) -> CursorReport {
    let params = cursor.build_clamped(clamp);
    CursorReport {
        kind: cursor.kind().to_string(),
        cursor: cursor.to_string(),
        parameters: params
            .as_ref()
            .map(|params| {
                params
                    .to_pairs()
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect()
            })
            .unwrap_or_default(),
        query: params
            .map(|params| params.to_query_string())
            .unwrap_or_default(),
    }
}

/// Runs the cursor command.
pub fn run(
    cursor: &Cursor,
    min: u32,
    max: u32,
    default: u32,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if min > max {
        return Err(format!("--min {} exceeds --max {}", min, max).into());
    }
    let report = render(cursor, &LimitClamp::between(min, max, default));

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("Cursor: {}", report.cursor);
            if report.parameters.is_empty() {
                println!("Parameters: (source defaults)");
            } else {
                println!("Parameters:");
                for (name, value) in &report.parameters {
                    println!("  {} = {}", name, value);
                }
                println!("Query: {}", report.query);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_each_kind() {
        assert_eq!(
            build_cursor(Some("9".into()), None, None, Some(20)),
            Cursor::upper_bound("9", Some(20))
        );
        assert_eq!(
            build_cursor(None, Some("9".into()), None, None),
            Cursor::since("9", None)
        );
        assert_eq!(
            build_cursor(None, None, Some("9".into()), None),
            Cursor::min("9", None)
        );
        assert_eq!(build_cursor(None, None, None, Some(5)), Cursor::limit(5));
        assert_eq!(build_cursor(None, None, None, None), Cursor::Default);
    }

    #[test]
    fn render_clamps_limit() {
        let clamp = LimitClamp::between(1, 80, 40);
        let report = render(&Cursor::upper_bound("120", Some(500)), &clamp);
        assert_eq!(report.parameters.get("max_id").map(String::as_str), Some("120"));
        assert_eq!(report.parameters.get("limit").map(String::as_str), Some("40"));
        assert!(report.query.contains("max_id=120"));
    }

    #[test]
    fn render_default_has_no_parameters() {
        let report = render(&Cursor::Default, &LimitClamp::default());
        assert!(report.parameters.is_empty());
        assert!(report.query.is_empty());
        assert_eq!(report.kind, "default");
    }
}
