//! Input normalizer.
//!
//! Collapses layered encodings into a canonical string and records every
//! obfuscation technique seen along the way. Layers are undone in a fixed
//! order and each layer sees the output of the previous one:
//!
//! 1. null bytes
//! 2. other control characters (tab, newline and carriage return are kept)
//! 3. URL percent-encoding, at most three passes
//! 4. HTML entities
//! 5. `\xNN` hex escapes
//! 6. NFKC, with homoglyph detection on the pre-normalization text
//! 7. steps 3 to 5 once more when NFKC left escape characters behind
//!    (fullwidth `％` `＼` `＆` fold to ASCII), followed by a final NFKC
//! 8. base64-wrapped SQL (detection only, the text is not substituted)
//!
//! Nesting deeper than these two decoding rounds is not fully unwrapped,
//! but any layer found is already a finding.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

const MAX_URL_DECODE_PASSES: usize = 3;
const MAX_BASE64_CANDIDATES: usize = 3;
const MAX_REPORTED_CONTROL_CHARS: usize = 5;
const MAX_REPORTED_HOMOGLYPHS: usize = 5;

/// Keywords that mark a decoded base64 run as SQL.
const BASE64_SQL_KEYWORDS: [&str; 4] = ["DROP", "DELETE", "SELECT", "UNION"];

/// Regex for `\xNN` escapes written out as text.
static HEX_ESCAPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\x([0-9a-fA-F]{2})").expect("Invalid regex: hex escape pattern"));

/// Regex for base64-looking runs long enough to hide a statement.
static BASE64_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9+/]{20,}={0,2}").expect("Invalid regex: base64 candidate pattern")
});

/// Standard alphabet, tolerant of missing padding and stray trailing bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Obfuscation technique detected by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingTechnique {
    NullByte,
    ControlCharacters,
    UrlEncoding,
    HtmlEntities,
    HexEscapes,
    Homoglyphs,
    Base64Sql,
}

/// One detected obfuscation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingFinding {
    pub technique: EncodingTechnique,
    /// Human-readable label, reported to callers as a blocked pattern.
    pub label: String,
    /// Text after this layer was undone.
    pub normalized: String,
}

/// Output of [`InputNormalizer::normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInput {
    pub canonical: String,
    pub findings: Vec<EncodingFinding>,
}

impl NormalizedInput {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.findings.iter().map(|f| f.label.clone()).collect()
    }

    pub fn techniques(&self) -> Vec<EncodingTechnique> {
        self.findings.iter().map(|f| f.technique).collect()
    }
}

type Layer = fn(&str) -> (String, Option<String>);

const STRIP_LAYERS: [(EncodingTechnique, Layer); 2] = [
    (EncodingTechnique::NullByte, strip_null_bytes),
    (EncodingTechnique::ControlCharacters, strip_control_chars),
];

const DECODE_LAYERS: [(EncodingTechnique, Layer); 3] = [
    (EncodingTechnique::UrlEncoding, decode_url),
    (EncodingTechnique::HtmlEntities, decode_html_entities),
    (EncodingTechnique::HexEscapes, decode_hex_escapes),
];

/// Stateless normalizer; cheap to copy and safe to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputNormalizer;

impl InputNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Undo every known encoding layer in `raw` and report what was found.
    ///
    /// Never fails: malformed escapes are left in place.
    pub fn normalize(&self, raw: &str) -> NormalizedInput {
        let mut text = raw.to_string();
        let mut findings = Vec::new();

        for (technique, layer) in STRIP_LAYERS.into_iter().chain(DECODE_LAYERS) {
            apply_layer(&mut text, &mut findings, technique, layer);
        }
        apply_layer(
            &mut text,
            &mut findings,
            EncodingTechnique::Homoglyphs,
            normalize_unicode,
        );

        // NFKC turns fullwidth ％ ＼ ＆ into live escape characters
        if text.contains(['%', '\\', '&']) {
            for (technique, layer) in DECODE_LAYERS {
                apply_layer(&mut text, &mut findings, technique, layer);
            }
            text = text.nfkc().collect();
        }

        apply_layer(
            &mut text,
            &mut findings,
            EncodingTechnique::Base64Sql,
            detect_base64_sql,
        );

        debug!("Normalization finished with {} findings", findings.len());

        NormalizedInput {
            canonical: text,
            findings,
        }
    }
}

fn apply_layer(
    text: &mut String,
    findings: &mut Vec<EncodingFinding>,
    technique: EncodingTechnique,
    layer: Layer,
) {
    let (next, label) = layer(text.as_str());
    *text = next;

    if let Some(label) = label {
        warn!("Encoding finding: {}", label);
        findings.push(EncodingFinding {
            technique,
            label,
            normalized: text.clone(),
        });
    }
}

fn strip_null_bytes(text: &str) -> (String, Option<String>) {
    if !text.contains('\0') {
        return (text.to_string(), None);
    }
    (
        text.replace('\0', ""),
        Some("Null byte detected".to_string()),
    )
}

fn is_stripped_control(c: char) -> bool {
    (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r')
}

fn strip_control_chars(text: &str) -> (String, Option<String>) {
    let mut seen: Vec<char> = Vec::new();
    for c in text.chars().filter(|c| is_stripped_control(*c)) {
        if !seen.contains(&c) {
            seen.push(c);
        }
    }

    if seen.is_empty() {
        return (text.to_string(), None);
    }

    let codes = seen
        .iter()
        .take(MAX_REPORTED_CONTROL_CHARS)
        .map(|c| format!("0x{:02x}", *c as u32))
        .collect::<Vec<_>>()
        .join(", ");
    let cleaned = text.chars().filter(|c| !is_stripped_control(*c)).collect();

    (cleaned, Some(format!("Control characters detected: {}", codes)))
}

fn decode_url(text: &str) -> (String, Option<String>) {
    let mut current = text.to_string();
    let mut layers = 0;

    for _ in 0..MAX_URL_DECODE_PASSES {
        let decoded =
            String::from_utf8_lossy(&urlencoding::decode_binary(current.as_bytes())).into_owned();
        if decoded == current {
            break;
        }
        current = decoded;
        layers += 1;
    }

    if layers == 0 {
        return (current, None);
    }

    debug!("Removed {} URL encoding layer(s)", layers);
    (current, Some("URL encoding detected".to_string()))
}

fn decode_html_entities(text: &str) -> (String, Option<String>) {
    let decoded = html_escape::decode_html_entities(text);
    if decoded == text {
        return (text.to_string(), None);
    }
    (
        decoded.into_owned(),
        Some("HTML entity encoding detected".to_string()),
    )
}

fn decode_hex_escapes(text: &str) -> (String, Option<String>) {
    let count = HEX_ESCAPE_REGEX.find_iter(text).count();
    if count == 0 {
        return (text.to_string(), None);
    }

    let decoded = HEX_ESCAPE_REGEX.replace_all(text, |caps: &Captures| {
        u8::from_str_radix(&caps[1], 16)
            .map_or_else(|_| caps[0].to_string(), |byte| char::from(byte).to_string())
    });

    (
        decoded.into_owned(),
        Some(format!(
            "Hex escape encoding detected ({} sequences)",
            count
        )),
    )
}

fn normalize_unicode(text: &str) -> (String, Option<String>) {
    let mut homoglyphs: Vec<char> = Vec::new();
    for c in text.chars() {
        if homoglyphs.len() == MAX_REPORTED_HOMOGLYPHS {
            break;
        }
        if ascii_lookalike(c).is_some() && !homoglyphs.contains(&c) {
            homoglyphs.push(c);
        }
    }

    let canonical: String = text.nfkc().collect();
    if canonical != text {
        debug!("NFKC normalization changed the input");
    }

    if homoglyphs.is_empty() {
        return (canonical, None);
    }

    let examples = homoglyphs
        .iter()
        .map(|c| format!("'{}' (U+{:04X})", c, *c as u32))
        .collect::<Vec<_>>()
        .join(", ");

    (
        canonical,
        Some(format!("Unicode homoglyph characters detected: {}", examples)),
    )
}

/// Latin, Greek and Cyrillic blocks outside ASCII.
fn in_lookalike_block(c: char) -> bool {
    matches!(
        c as u32,
        0x0080..=0x024F | 0x1E00..=0x1EFF | 0x0370..=0x03FF | 0x1F00..=0x1FFF | 0x0400..=0x052F
    )
}

/// ASCII letter or digit that the uppercase form of `c` passes for.
fn ascii_lookalike(c: char) -> Option<char> {
    if c.is_ascii() || !in_lookalike_block(c) {
        return None;
    }

    let mut upper = c.to_uppercase();
    let (Some(u), None) = (upper.next(), upper.next()) else {
        return None;
    };

    if u.is_ascii_alphanumeric() {
        return Some(u);
    }
    uppercase_confusable(u)
}

fn uppercase_confusable(u: char) -> Option<char> {
    let ascii = match u {
        // Greek
        'Α' => 'A',
        'Β' => 'B',
        'Ε' => 'E',
        'Ζ' => 'Z',
        'Η' => 'H',
        'Ι' => 'I',
        'Κ' => 'K',
        'Μ' => 'M',
        'Ν' => 'N',
        'Ο' => 'O',
        'Ρ' => 'P',
        'Τ' => 'T',
        'Υ' => 'Y',
        'Χ' => 'X',
        // Cyrillic
        'А' => 'A',
        'В' => 'B',
        'Е' => 'E',
        'З' => '3',
        'І' => 'I',
        'Ј' => 'J',
        'К' => 'K',
        'М' => 'M',
        'Н' => 'H',
        'О' => 'O',
        'Р' => 'P',
        'С' => 'C',
        'Ѕ' => 'S',
        'Т' => 'T',
        'У' => 'Y',
        'Х' => 'X',
        'Ԛ' => 'Q',
        'Ԝ' => 'W',
        _ => return None,
    };
    Some(ascii)
}

fn detect_base64_sql(text: &str) -> (String, Option<String>) {
    let hit = BASE64_REGEX
        .find_iter(text)
        .take(MAX_BASE64_CANDIDATES)
        .filter_map(|m| decode_base64_candidate(m.as_str()))
        .find_map(|decoded| {
            let upper = decoded.to_uppercase();
            BASE64_SQL_KEYWORDS
                .iter()
                .find(|keyword| upper.contains(*keyword))
                .copied()
        });

    match hit {
        Some(keyword) => {
            debug!("Base64 run decodes to SQL containing {}", keyword);
            (
                text.to_string(),
                Some("Base64-encoded SQL detected".to_string()),
            )
        }
        None => (text.to_string(), None),
    }
}

fn decode_base64_candidate(candidate: &str) -> Option<String> {
    let mut padded = candidate.trim_end_matches('=').to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    LENIENT_BASE64
        .decode(padded.as_bytes())
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
