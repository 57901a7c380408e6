//! Null-safe conversion helpers for the values that line-of-business screens
//! pass to queries: Y/N flags, wildcard search text and comma lists.

/// `true` → `"Y"`, `false` → `"N"`
pub fn bool_to_yn(val: bool) -> &'static str {
    if val {
        "Y"
    } else {
        "N"
    }
}

/// Anything starting with `y`/`Y` is true; empty is false
pub fn yn_to_bool(val: &str) -> bool {
    val.chars()
        .next()
        .map(|c| c.eq_ignore_ascii_case(&'y'))
        .unwrap_or(false)
}

/// Flip a Y/N flag. Empty input stays unset.
pub fn yn_toggle(val: &str) -> Option<&'static str> {
    if val.is_empty() {
        None
    } else {
        Some(bool_to_yn(!yn_to_bool(val)))
    }
}

/// Exactly `"Y"` or `"N"`
pub fn validate_yn(val: &str) -> bool {
    val == "Y" || val == "N"
}

/// Turn `a,b,c` into `'a','b','c'` for an IN list.
///
/// Input that already contains a quote is returned untouched. Empty input
/// yields `None`.
pub fn add_quotes(s: &str) -> Option<String> {
    if s.is_empty() {
        return None;
    }
    if s.contains('\'') {
        return Some(s.to_string());
    }
    Some(format!("'{}'", s.replace(',', "','")))
}

/// Replace `*` with `%` and make sure the text ends in a wildcard
pub fn add_wildcard(val: &str) -> Option<String> {
    replace_wildcard_with(val, false, true)
}

/// Replace `*` with `%`
pub fn replace_wildcard(val: &str) -> Option<String> {
    replace_wildcard_with(val, false, false)
}

/// Replace `*` with `%`, optionally forcing a leading and/or trailing `%`
pub fn replace_wildcard_with(val: &str, lead_wild: bool, end_wild: bool) -> Option<String> {
    if val.is_empty() {
        return None;
    }
    let mut s = val.replace('*', "%");
    if lead_wild && !s.starts_with('%') {
        s.insert(0, '%');
    }
    if end_wild && !s.ends_with('%') {
        s.push('%');
    }
    Some(s)
}

/// Upper-case the first letter of every word, lower-case the rest
pub fn to_proper_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for ch in s.chars() {
        if ch.is_whitespace() {
            word_start = true;
            out.push(ch);
        } else {
            if ch.is_alphabetic() && word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            word_start = false;
        }
    }
    out
}

/// Whether the text parses as a floating point number
pub fn is_numeric(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
}

/// Contains at least one upper-case ASCII letter
pub fn is_alpha(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_uppercase())
}

/// Split an amount in cents across `item_count` items.
///
/// Returns the per-item amount and how many items take one extra cent, so
/// `1000` over 3 items is `(333, 1)`.
pub fn divide_cents_evenly(total_cents: i64, item_count: u32) -> (i64, u32) {
    if item_count == 0 {
        return (0, 0);
    }
    let count = i64::from(item_count);
    let each = total_cents / count;
    let extra = (total_cents - each * count) as u32;
    (each, extra)
}
