use crate::{
    index::char_table::{
        CharClass, CharTable, EXTRA_PLACEHOLDER, INTERNATIONAL_WEIGHT, international_char,
        international_code,
    },
    types::error::DatabaseError,
};

/// Text longer than this is cut before encoding.
pub const MAX_TEXT_INDEX_CHARS: usize = 255;

const SEGMENT_SEPARATOR: u8 = 0x01;
const END_OF_TEXT: u8 = 0x00;
const UNPRINTABLE_PREFIX: u16 = 0x8000;
const UNPRINTABLE_MIDFIX: u8 = 0x06;
const UNPRINTABLE_RECORD_LENGTH: usize = 4;

/*
 * Encoded Text Layout
 * ┌──────────────────────────────────────────────────────────────────────┐
 * │ inline weights | 0x01 | extra codes (trailing 0x02 trimmed)          │
 * │ [ 0x01 | international codes | 0x01 | unprintable records ] | 0x00   │
 * └──────────────────────────────────────────────────────────────────────┘
 * The bracketed tail is only written when one of its segments is non-empty.
 */

/// Appends the collation key of `text`.
pub fn encode_text(text: &str, table: &CharTable, out: &mut Vec<u8>) {
    let mut inline = Vec::with_capacity(text.len());
    let mut extras = Vec::new();
    let mut international = Vec::new();
    let mut unprintable = Vec::new();
    let mut has_extras = false;

    for c in text.chars().take(MAX_TEXT_INDEX_CHARS) {
        match table.classify(c) {
            CharClass::Simple(weight) => {
                inline.push(weight);
                extras.push(EXTRA_PLACEHOLDER);
            }
            CharClass::Accented { weight, extra } => {
                inline.push(weight);
                extras.push(extra);
                has_extras = true;
            }
            CharClass::Unprintable(code) => {
                let position = UNPRINTABLE_PREFIX | (7 + 4 * inline.len() as u16);
                unprintable.extend_from_slice(&position.to_be_bytes());
                unprintable.push(UNPRINTABLE_MIDFIX);
                unprintable.push(code);
            }
            CharClass::International => {
                inline.push(INTERNATIONAL_WEIGHT);
                extras.push(EXTRA_PLACEHOLDER);
                let lower = c.to_lowercase().next().unwrap_or(c);
                international.extend_from_slice(&international_code(lower));
            }
            CharClass::Ignored => {}
        }
    }

    out.extend_from_slice(&inline);
    out.push(SEGMENT_SEPARATOR);
    if has_extras {
        let used = extras
            .iter()
            .rposition(|code| *code != EXTRA_PLACEHOLDER)
            .map_or(0, |last| last + 1);
        out.extend_from_slice(&extras[..used]);
    }
    if !international.is_empty() || !unprintable.is_empty() {
        out.push(SEGMENT_SEPARATOR);
        out.extend_from_slice(&international);
        out.push(SEGMENT_SEPARATOR);
        out.extend_from_slice(&unprintable);
    }
    out.push(END_OF_TEXT);
}

/// Decodes a text key, returning the collation-normal text and the bytes consumed.
pub fn decode_text(bytes: &[u8], table: &CharTable) -> Result<(String, usize), DatabaseError> {
    let truncated = || DatabaseError::decode("text key ends before its terminator");

    let inline_end = bytes
        .iter()
        .position(|byte| *byte == SEGMENT_SEPARATOR || *byte == END_OF_TEXT)
        .ok_or_else(truncated)?;
    if bytes[inline_end] != SEGMENT_SEPARATOR {
        return Err(DatabaseError::decode("text key is missing its inline separator"));
    }
    let inline = &bytes[..inline_end];
    let mut position = inline_end + 1;

    let extras_start = position;
    while position < bytes.len()
        && bytes[position] != SEGMENT_SEPARATOR
        && bytes[position] != END_OF_TEXT
    {
        position += 1;
    }
    let extras = &bytes[extras_start..position];
    let next = *bytes.get(position).ok_or_else(truncated)?;
    position += 1;

    let mut international: &[u8] = &[];
    let mut unprintable: &[u8] = &[];
    if next == SEGMENT_SEPARATOR {
        let start = position;
        while position < bytes.len() && bytes[position] != SEGMENT_SEPARATOR {
            position += 1;
        }
        if position >= bytes.len() {
            return Err(truncated());
        }
        international = &bytes[start..position];
        position += 1;

        let start = position;
        loop {
            match bytes.get(position) {
                None => return Err(truncated()),
                Some(&END_OF_TEXT) => break,
                Some(_) => {
                    if position + UNPRINTABLE_RECORD_LENGTH > bytes.len() {
                        return Err(truncated());
                    }
                    position += UNPRINTABLE_RECORD_LENGTH;
                }
            }
        }
        unprintable = &bytes[start..position];
        position += 1;
    }

    let mut international_codes = international.chunks(3);
    let mut chars = Vec::with_capacity(inline.len());
    for (index, weight) in inline.iter().enumerate() {
        let c = if *weight == INTERNATIONAL_WEIGHT {
            let code = international_codes
                .next()
                .ok_or_else(|| DatabaseError::decode("missing international code"))?;
            international_char(code)
                .ok_or_else(|| DatabaseError::decode("invalid international code"))?
        } else {
            match extras.get(index).copied() {
                Some(extra) if extra != EXTRA_PLACEHOLDER => table
                    .accented_char(*weight, extra)
                    .ok_or_else(|| {
                        DatabaseError::decode(format!(
                            "unknown accent {:#04x} on weight {:#04x}",
                            extra, weight
                        ))
                    })?,
                _ => table.simple_char(*weight).ok_or_else(|| {
                    DatabaseError::decode(format!("unknown text weight {:#04x}", weight))
                })?,
            }
        };
        chars.push(c);
    }

    // unprintable characters go back in front of the inline character they preceded
    let mut text = String::with_capacity(chars.len());
    let mut records = unprintable.chunks(UNPRINTABLE_RECORD_LENGTH).peekable();
    for index in 0..=chars.len() {
        while let Some(record) = records.peek() {
            let slot = u16::from_be_bytes([record[0], record[1]]) & !UNPRINTABLE_PREFIX;
            let inline_position = (slot.saturating_sub(7) / 4) as usize;
            if inline_position != index {
                break;
            }
            if record[2] != UNPRINTABLE_MIDFIX {
                return Err(DatabaseError::decode("malformed unprintable record"));
            }
            text.push(char::from(record[3]));
            records.next();
        }
        if let Some(c) = chars.get(index) {
            text.push(*c);
        }
    }
    if records.next().is_some() {
        return Err(DatabaseError::decode("unprintable record out of order"));
    }

    Ok((text, position))
}

/// The text a key decodes back to: lower case, ignored characters dropped, cut to
/// the indexed length.
pub fn normalize_text(text: &str, table: &CharTable) -> String {
    text.chars()
        .take(MAX_TEXT_INDEX_CHARS)
        .filter_map(|c| match table.classify(c) {
            CharClass::Ignored => None,
            CharClass::Simple(weight) => table.simple_char(weight),
            CharClass::Accented { weight, extra } => table.accented_char(weight, extra),
            CharClass::Unprintable(_) => Some(c),
            CharClass::International => Some(c.to_lowercase().next().unwrap_or(c)),
        })
        .collect()
}
