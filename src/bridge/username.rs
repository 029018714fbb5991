//! Invisible per-author suffixes for webhook usernames.
//!
//! Two bridged users sharing a display name would otherwise be
//! indistinguishable on Discord. Each decimal digit of the author id maps
//! to one invisible code point, followed by a fixed terminator.

/// Discord webhook username limit.
pub const MAX_USERNAME_CHARS: usize = 80;

const DIGITS: [char; 10] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{2061}', '\u{2062}', '\u{2063}',
    '\u{2064}', '\u{206A}', '\u{206B}',
];

const TERMINATOR: char = '\u{FEFF}';

/// Append the encoded author id to `name`, truncating the visible part so
/// the result stays within [`MAX_USERNAME_CHARS`].
pub fn encode(name: &str, author_id: i64) -> String {
    let suffix: String = author_id
        .unsigned_abs()
        .to_string()
        .bytes()
        .map(|digit| DIGITS[(digit - b'0') as usize])
        .chain(std::iter::once(TERMINATOR))
        .collect();

    let visible = MAX_USERNAME_CHARS.saturating_sub(suffix.chars().count());
    let mut encoded: String = name.chars().take(visible).collect();
    encoded.push_str(&suffix);
    encoded
}

/// Recover the author id from an encoded username.
#[cfg(test)]
pub fn decode(username: &str) -> Option<i64> {
    let body = username.strip_suffix(TERMINATOR)?;
    let digits: String = body
        .chars()
        .rev()
        .map_while(|c| DIGITS.iter().position(|d| *d == c))
        .map(|digit| char::from(b'0' + digit as u8))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
