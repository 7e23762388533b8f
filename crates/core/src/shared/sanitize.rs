use std::sync::OnceLock;

use regex::Regex;

const FALLBACK_MESSAGE: &str = "Operation failed.";

fn traceback_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)(Traceback \(most recent call last\):|stack backtrace:).*")
            .unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// A quoted absolute path, which may contain spaces.
fn quoted_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(['"])(?:/|[A-Za-z]:\\)[^'"\n]*['"]"#)
            .unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

fn unix_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(^|[\s'"(=:])/[^\s'"]+"#).unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

fn windows_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"[A-Za-z]:\\[^\s'"]+"#).unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Make an error string safe to show to a user.
///
/// Strips backtraces, replaces file-system paths with `<path>` and collapses
/// whitespace. Never returns an empty string.
pub fn sanitize_user_message(message: &str) -> String {
    if message.trim().is_empty() {
        return FALLBACK_MESSAGE.to_string();
    }

    let stripped = traceback_pattern().replace_all(message, "");
    let stripped = quoted_path_pattern().replace_all(&stripped, "${1}<path>${1}");
    let stripped = unix_path_pattern().replace_all(&stripped, "${1}<path>");
    let stripped = windows_path_pattern().replace_all(&stripped, "<path>");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        FALLBACK_MESSAGE.to_string()
    } else {
        collapsed
    }
}
