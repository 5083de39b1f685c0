use std::collections::BTreeSet;

use crate::validation::{is_nickname_char, NICKNAME_MAX, NICKNAME_MIN};

/// Lookup form of a nickname.
pub fn normalize_nickname(nickname: &str) -> String {
    nickname.trim().to_lowercase()
}

/// Canonical order for an unordered pair of user ids.
pub fn order_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// CRLF becomes LF, runs of three or more newlines collapse to two, and the
/// result is trimmed.
pub fn sanitize_message(input: &str) -> String {
    let unified = input.replace("\r\n", "\n");
    let mut out = String::with_capacity(unified.len());
    let mut newlines = 0usize;
    for c in unified.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(c);
            }
        } else {
            newlines = 0;
            out.push(c);
        }
    }
    out.trim().to_string()
}

/// Normalized nicknames referenced as `@name`. A token takes at most
/// `NICKNAME_MAX` characters; shorter than `NICKNAME_MIN` is not a mention.
pub fn detect_mentions(body: &str) -> BTreeSet<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut found = BTreeSet::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '@' {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while end < chars.len() && end - start < NICKNAME_MAX && is_nickname_char(chars[end]) {
            end += 1;
        }
        if end - start >= NICKNAME_MIN {
            let token: String = chars[start..end].iter().collect();
            found.insert(normalize_nickname(&token));
            i = end;
        } else {
            i += 1;
        }
    }
    found
}
