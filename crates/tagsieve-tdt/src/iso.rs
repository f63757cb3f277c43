//! ISO 17363/17365 identifiers and the 6-bit alphanumeric codec
//!
//! ISO unique item identifiers pack a restricted ASCII set into 6-bit
//! groups, MSB-first across the whole identifier, data identifier
//! prefix included: the dispatch bytes 0xDC and 0xCB are just how
//! `7B` and `25S` happen to pack. Padding is the `100000` bit pattern
//! repeated out to a byte boundary.

use crate::error::DecodeError;

/// First identifier byte of an ISO 17363 tag (`7B` data identifier).
pub const HEADER_ISO_17363: u8 = 0xDC;
/// First identifier byte of an ISO 17365 tag (`25S` data identifier).
pub const HEADER_ISO_17365: u8 = 0xCB;

/// The pad group: an encoded space, whose `10…` bit pattern also fills
/// the final partial byte.
const PAD_GROUP: u8 = 0b10_0000;

/// Decodes a 6-bit packed byte slice to its ASCII string.
///
/// Trailing pad groups are stripped; a trailing group too short to hold
/// 6 bits is discarded.
pub fn decode_6bit(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut codes = Vec::with_capacity(bytes.len() * 8 / 6);
    let total_bits = bytes.len() * 8;
    let mut pos = 0;
    while pos + 6 <= total_bits {
        let mut code = 0u8;
        for _ in 0..6 {
            let bit = (bytes[pos / 8] >> (7 - pos % 8)) & 1;
            code = (code << 1) | bit;
            pos += 1;
        }
        codes.push(code);
    }
    while codes.last() == Some(&PAD_GROUP) {
        codes.pop();
    }
    codes.into_iter().map(char_for_code).collect()
}

/// Packs a restricted-ASCII string into 6-bit groups with `100000`
/// padding out to the byte boundary.
pub fn encode_6bit(text: &str) -> Result<Vec<u8>, DecodeError> {
    let mut bits: Vec<bool> = Vec::with_capacity((text.len() + 1) * 6);
    for ch in text.chars() {
        let code = code_for_char(ch)?;
        for shift in (0..6).rev() {
            bits.push((code >> shift) & 1 == 1);
        }
    }
    let mut pad = 0;
    while bits.len() % 8 != 0 {
        bits.push((PAD_GROUP >> (5 - pad % 6)) & 1 == 1);
        pad += 1;
    }
    Ok(bits
        .chunks(8)
        .map(|chunk| chunk.iter().fold(0u8, |byte, bit| (byte << 1) | u8::from(*bit)))
        .collect())
}

/// Codes 0..32 sit above the punctuation range: `'@'..'_'`; the rest
/// decode to themselves (`' '..'?'`).
fn char_for_code(code: u8) -> Result<char, DecodeError> {
    let value = if code < 0x20 { code + 0x40 } else { code };
    if !(0x20..=0x5F).contains(&value) {
        return Err(DecodeError::InvalidChar(code));
    }
    Ok(char::from(value))
}

fn code_for_char(ch: char) -> Result<u8, DecodeError> {
    match ch {
        '@'..='_' => Ok(ch as u8 - 0x40),
        ' '..='?' => Ok(ch as u8),
        _ => Err(DecodeError::InvalidChar(ch as u8)),
    }
}

/// Translates a whole ISO identifier into its URN.
pub(crate) fn decode_iso(id: &[u8], standard: u32) -> Result<String, DecodeError> {
    let payload = decode_6bit(id)?;
    Ok(format!("urn:epc:id:iso:{standard}:{payload}"))
}
