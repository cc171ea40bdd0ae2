use std::{collections::HashMap, sync::LazyLock};

/// Inline weight written for characters encoded through the international segment.
pub const INTERNATIONAL_WEIGHT: u8 = 0xF0;

/// Extra code written for a character with no secondary distinction.
pub const EXTRA_PLACEHOLDER: u8 = 0x02;

pub const SPACE_WEIGHT: u8 = 0x07;
const PUNCTUATION_WEIGHT_START: u8 = 0x08;
const SYMBOL_WEIGHT_START: u8 = 0x26;
const DIGIT_WEIGHT_START: u8 = 0x50;
const LETTER_WEIGHT_START: u8 = 0x60;
const THORN_WEIGHT: u8 = 0x7A;

// extra codes for accented latin letters
const ACUTE: u8 = 0x03;
const GRAVE: u8 = 0x04;
const CIRCUMFLEX: u8 = 0x05;
const DIAERESIS: u8 = 0x06;
const TILDE: u8 = 0x07;
const RING: u8 = 0x08;
const CEDILLA: u8 = 0x09;
const STROKE: u8 = 0x0A;
const LIGATURE: u8 = 0x0B;
const SHARP: u8 = 0x0C;
const ETH: u8 = 0x0D;

/// How one character contributes to an encoded text key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// A single inline weight.
    Simple(u8),
    /// The inline weight of the base letter plus an extra code at the same position.
    Accented { weight: u8, extra: u8 },
    /// No inline byte; an unprintable record carrying `code`.
    Unprintable(u8),
    /// Inline marker plus a 3-byte code in the international segment.
    International,
    /// Contributes nothing.
    Ignored,
}

/// Character classification for the General sort order.
///
/// Built once on first use and never mutated afterwards. Encoders take it by reference.
#[derive(Debug)]
pub struct CharTable {
    latin: [CharClass; 256],
    simple_chars: [Option<char>; 256],
    accented_chars: HashMap<(u8, u8), char>,
}

static GENERAL: LazyLock<CharTable> = LazyLock::new(CharTable::build);

impl CharTable {
    pub fn general() -> &'static CharTable {
        &GENERAL
    }

    fn build() -> Self {
        let mut table = CharTable {
            latin: [CharClass::International; 256],
            simple_chars: [None; 256],
            accented_chars: HashMap::new(),
        };

        for code in (0x00..=0x1Fu8).chain([0x7F, b'-', b'\'', 0xAD]) {
            table.latin[code as usize] = CharClass::Unprintable(code);
        }

        table.set_simple(' ', SPACE_WEIGHT);

        let punctuation = (0x21..=0x7Eu8)
            .map(char::from)
            .filter(|c| c.is_ascii_punctuation() && *c != '-' && *c != '\'');
        for (offset, c) in punctuation.enumerate() {
            table.set_simple(c, PUNCTUATION_WEIGHT_START + offset as u8);
        }

        let symbols = (0xA0..=0xBFu8)
            .filter(|code| *code != 0xAD)
            .chain([0xD7, 0xF7])
            .map(char::from);
        for (offset, c) in symbols.enumerate() {
            table.set_simple(c, SYMBOL_WEIGHT_START + offset as u8);
        }

        for (offset, c) in ('0'..='9').enumerate() {
            table.set_simple(c, DIGIT_WEIGHT_START + offset as u8);
        }
        for (offset, c) in ('a'..='z').enumerate() {
            let weight = LETTER_WEIGHT_START + offset as u8;
            table.set_simple(c, weight);
            table.latin[c.to_ascii_uppercase() as usize] = CharClass::Simple(weight);
        }
        table.set_simple('þ', THORN_WEIGHT);
        table.latin['Þ' as usize] = CharClass::Simple(THORN_WEIGHT);

        let accented: [(char, char, u8); 31] = [
            ('à', 'a', GRAVE),
            ('á', 'a', ACUTE),
            ('â', 'a', CIRCUMFLEX),
            ('ã', 'a', TILDE),
            ('ä', 'a', DIAERESIS),
            ('å', 'a', RING),
            ('æ', 'a', LIGATURE),
            ('ç', 'c', CEDILLA),
            ('è', 'e', GRAVE),
            ('é', 'e', ACUTE),
            ('ê', 'e', CIRCUMFLEX),
            ('ë', 'e', DIAERESIS),
            ('ì', 'i', GRAVE),
            ('í', 'i', ACUTE),
            ('î', 'i', CIRCUMFLEX),
            ('ï', 'i', DIAERESIS),
            ('ð', 'd', ETH),
            ('ñ', 'n', TILDE),
            ('ò', 'o', GRAVE),
            ('ó', 'o', ACUTE),
            ('ô', 'o', CIRCUMFLEX),
            ('õ', 'o', TILDE),
            ('ö', 'o', DIAERESIS),
            ('ø', 'o', STROKE),
            ('ù', 'u', GRAVE),
            ('ú', 'u', ACUTE),
            ('û', 'u', CIRCUMFLEX),
            ('ü', 'u', DIAERESIS),
            ('ý', 'y', ACUTE),
            ('ÿ', 'y', DIAERESIS),
            ('ß', 's', SHARP),
        ];
        for (c, base, extra) in accented {
            let weight = LETTER_WEIGHT_START + (base as u8 - b'a');
            let class = CharClass::Accented { weight, extra };
            table.latin[c as usize] = class;
            // ß and ÿ have no upper-case form in Latin-1
            if let Some(upper) = latin1_upper(c) {
                table.latin[upper as usize] = class;
            }
            table.accented_chars.insert((weight, extra), c);
        }
        let oe_weight = LETTER_WEIGHT_START + (b'o' - b'a');
        table.accented_chars.insert((oe_weight, LIGATURE), 'œ');

        table
    }

    fn set_simple(&mut self, c: char, weight: u8) {
        self.latin[c as usize] = CharClass::Simple(weight);
        self.simple_chars[weight as usize] = Some(c);
    }

    pub fn classify(&self, c: char) -> CharClass {
        let code = c as u32;
        if code < 0x100 {
            return self.latin[code as usize];
        }
        match c {
            '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}' => CharClass::Ignored,
            'Œ' | 'œ' => CharClass::Accented {
                weight: LETTER_WEIGHT_START + (b'o' - b'a'),
                extra: LIGATURE,
            },
            'Ÿ' => CharClass::Accented {
                weight: LETTER_WEIGHT_START + (b'y' - b'a'),
                extra: DIAERESIS,
            },
            _ => CharClass::International,
        }
    }

    /// The collation-normal character of a simple inline weight.
    pub fn simple_char(&self, weight: u8) -> Option<char> {
        self.simple_chars[weight as usize]
    }

    pub fn accented_char(&self, weight: u8, extra: u8) -> Option<char> {
        self.accented_chars.get(&(weight, extra)).copied()
    }
}

fn latin1_upper(c: char) -> Option<char> {
    match c {
        'ß' | 'ÿ' => None,
        'à'..='þ' => char::from_u32(c as u32 - 0x20),
        _ => None,
    }
}

/// 3-byte code of an international character; every byte has the high bit set.
pub fn international_code(c: char) -> [u8; 3] {
    let code = c as u32;
    [
        ((code >> 14) as u8) | 0x80,
        (((code >> 7) & 0x7F) as u8) | 0x80,
        ((code & 0x7F) as u8) | 0x80,
    ]
}

pub fn international_char(code: &[u8]) -> Option<char> {
    if code.len() < 3 || code.iter().take(3).any(|byte| byte & 0x80 == 0) {
        return None;
    }
    let value = (((code[0] & 0x7F) as u32) << 14)
        | (((code[1] & 0x7F) as u32) << 7)
        | (code[2] & 0x7F) as u32;
    char::from_u32(value)
}
