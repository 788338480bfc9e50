use regex::Regex;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

static NON_DIAL_RE: OnceLock<Regex> = OnceLock::new();

fn non_dial_re() -> &'static Regex {
    NON_DIAL_RE.get_or_init(|| Regex::new(r"[^0-9+]+").unwrap())
}

/// Canonicalize a free-text phone number.
///
/// Only digits survive, plus a `+` when the number starts with one; any
/// other `+` is dropped along with everything else. Then UK conventions are
/// applied: `00` becomes `+`, a bare leading `7` is taken as a mobile number
/// missing its `0`, `44…` gains a `+`, and a national `0…` becomes `+44…`.
/// Numbers already in `+<country code>` form are left alone. Returns an empty
/// string when there is no usable number (including a lone `+`).
pub fn normalize_phone_number(raw: &str) -> String {
    let stripped = non_dial_re().replace_all(raw, "");
    let digits: String = stripped.chars().filter(char::is_ascii_digit).collect();
    let mut number = if stripped.starts_with('+') {
        format!("+{digits}")
    } else {
        digits
    };

    if number == "0" {
        return String::new();
    }

    if let Some(rest) = number.strip_prefix("00") {
        number = format!("+{rest}");
    }
    if number.starts_with('7') {
        number.insert(0, '0');
    }
    if number.starts_with("44") {
        number.insert(0, '+');
    }
    if let Some(rest) = number.strip_prefix('0') {
        number = format!("+44{rest}");
    }
    if !number.chars().any(|c| c.is_ascii_digit()) {
        return String::new();
    }
    number
}

/// Mask a number for logs, keeping only the last three digits.
pub fn redact_phone_number(number: &str) -> String {
    let visible = number.len().saturating_sub(3);
    number
        .char_indices()
        .map(|(i, c)| if i < visible && c.is_ascii_digit() { '*' } else { c })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
