//! Repair of UTF-8 text that was decoded as windows-1252 somewhere upstream.
//!
//! A double-encoded `é` arrives as `Ã©`: the two UTF-8 bytes `C3 A9` read
//! back as two windows-1252 characters. [`recover`] looks for such
//! lead/continuation runs, maps them back to bytes through windows-1252 and
//! keeps the result only when those bytes are valid UTF-8.

use encoding_rs::{UTF_8, WINDOWS_1252};
use std::borrow::Cow;

/// Undo windows-1252 mojibake in `text`.
///
/// ```
/// use grabber_web::mojibake::recover;
///
/// assert_eq!(recover("CafÃ© crÃ¨me"), "Café crème");
/// assert_eq!(recover("Café"), "Café");
/// ```
pub fn recover(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        return Cow::Borrowed(text);
    }

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut out = String::new();
    let mut copied = 0;
    let mut i = 0;

    while i < chars.len() {
        let (start, c) = chars[i];
        let Some(needed) = continuation_count(c) else {
            i += 1;
            continue;
        };
        let end_idx = i + 1 + needed;
        let complete = end_idx <= chars.len()
            && chars[i + 1..end_idx]
                .iter()
                .all(|&(_, c)| is_continuation(c));
        if !complete {
            i += 1;
            continue;
        }
        let end = chars.get(end_idx).map_or(text.len(), |&(at, _)| at);
        match repair(&text[start..end]) {
            Some(fixed) => {
                out.push_str(&text[copied..start]);
                out.push_str(&fixed);
                copied = end;
                i = end_idx;
            }
            None => i += 1,
        }
    }

    if copied == 0 {
        return Cow::Borrowed(text);
    }
    out.push_str(&text[copied..]);
    Cow::Owned(out)
}

/// Byte offset of a lead character at the end of `text` whose continuation
/// characters have not all arrived yet.
///
/// ```
/// use grabber_web::mojibake::incomplete_tail;
///
/// assert_eq!(incomplete_tail("cafÃ"), Some(3));
/// assert_eq!(incomplete_tail("cafÃ©"), None);
/// assert_eq!(incomplete_tail("plain"), None);
/// ```
pub fn incomplete_tail(text: &str) -> Option<usize> {
    let mut after = 0;
    for (at, c) in text.char_indices().rev().take(3) {
        if let Some(needed) = continuation_count(c) {
            return (after < needed).then_some(at);
        }
        if !is_continuation(c) {
            return None;
        }
        after += 1;
    }
    None
}

fn repair(sequence: &str) -> Option<String> {
    let (bytes, _, unmappable) = WINDOWS_1252.encode(sequence);
    if unmappable {
        return None;
    }
    UTF_8
        .decode_without_bom_handling_and_without_replacement(&bytes)
        .map(Cow::into_owned)
}

/// Continuation bytes a UTF-8 lead byte announces, for the windows-1252
/// character standing in for that byte.
fn continuation_count(c: char) -> Option<usize> {
    match c {
        '\u{C2}'..='\u{DF}' => Some(1),
        '\u{E0}'..='\u{EF}' => Some(2),
        '\u{F0}'..='\u{F4}' => Some(3),
        _ => None,
    }
}

/// Whether `c` is what windows-1252 decodes a byte in `0x80..=0xBF` to.
fn is_continuation(c: char) -> bool {
    matches!(
        c,
        '\u{A0}'..='\u{BF}'
            | '\u{81}'
            | '\u{8D}'
            | '\u{8F}'
            | '\u{90}'
            | '\u{9D}'
            | '\u{20AC}'
            | '\u{201A}'
            | '\u{0192}'
            | '\u{201E}'
            | '\u{2026}'
            | '\u{2020}'
            | '\u{2021}'
            | '\u{02C6}'
            | '\u{2030}'
            | '\u{0160}'
            | '\u{2039}'
            | '\u{0152}'
            | '\u{017D}'
            | '\u{2018}'
            | '\u{2019}'
            | '\u{201C}'
            | '\u{201D}'
            | '\u{2022}'
            | '\u{2013}'
            | '\u{2014}'
            | '\u{02DC}'
            | '\u{2122}'
            | '\u{0161}'
            | '\u{203A}'
            | '\u{0153}'
            | '\u{017E}'
            | '\u{0178}'
    )
}
