//! Z85 encoding (ZeroMQ RFC 32).
//!
//! Encodes every 4 input bytes as 5 printable characters. Inputs whose
//! length is not a multiple of the block size are rejected with `None`
//! rather than padded, so a 32-byte key always yields exactly 40
//! characters.

/// The 85-character Z85 alphabet.
const ALPHABET: &[u8; 85] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

/// Sentinel for characters outside the alphabet.
const INVALID: u8 = 0xff;

/// Reverse lookup table indexed by ASCII code.
const DECODER: [u8; 128] = build_decoder();

const fn build_decoder() -> [u8; 128] {
    let mut table = [INVALID; 128];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

/// Encodes `data` as Z85 text.
///
/// Returns `None` if `data.len()` is not a multiple of 4.
pub fn encode(data: &[u8]) -> Option<String> {
    if data.len() % 4 != 0 {
        return None;
    }
    Some(encode_aligned(data))
}

/// Encodes a 32-byte key as its 40-character armored form.
pub fn encode_key(key: &[u8; 32]) -> String {
    encode_aligned(key)
}

fn encode_aligned(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() / 4 * 5);
    for chunk in data.chunks_exact(4) {
        let mut value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let mut block = [0u8; 5];
        for slot in block.iter_mut().rev() {
            *slot = ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        for b in block {
            out.push(b as char);
        }
    }
    out
}

/// Decodes Z85 `text` back into bytes.
///
/// Returns `None` if `text.len()` is not a multiple of 5, if it holds a
/// character outside the alphabet, or if a block overflows 32 bits.
pub fn decode(text: &str) -> Option<Vec<u8>> {
    let bytes = text.as_bytes();
    if bytes.len() % 5 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len() / 5 * 4);
    for chunk in bytes.chunks_exact(5) {
        let mut value: u64 = 0;
        for &c in chunk {
            let digit = *DECODER.get(c as usize)?;
            if digit == INVALID {
                return None;
            }
            value = value * 85 + u64::from(digit);
        }
        let value = u32::try_from(value).ok()?;
        out.extend_from_slice(&value.to_be_bytes());
    }
    Some(out)
}
