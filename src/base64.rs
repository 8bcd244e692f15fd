//! Standard-alphabet base64 (RFC 4648, padded).
//!
//! Binary file transfers carry their payload as base64 text.  The client
//! ships its own codec so the wire format does not depend on whatever
//! encoder the embedding environment happens to provide.

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const PAD: u8 = b'=';

/// Marker for bytes outside the alphabet in [`DECODE_TABLE`].
const INVALID: u8 = 0xFF;

const DECODE_TABLE: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < 64 {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Why a base64 string was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base64Error {
    /// Input length is not a multiple of four.
    InvalidLength(usize),
    /// Byte at the given offset is not in the alphabet.
    InvalidByte(usize),
    /// Padding appears somewhere other than the final one or two positions.
    InvalidPadding,
}

impl core::fmt::Display for Base64Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidLength(n) => write!(f, "length {n} is not a multiple of 4"),
            Self::InvalidByte(at) => write!(f, "invalid byte at offset {at}"),
            Self::InvalidPadding => write!(f, "misplaced padding"),
        }
    }
}

impl std::error::Error for Base64Error {}

/// Encode `bytes` as padded base64.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    let mut chunks = bytes.chunks_exact(3);

    for c in &mut chunks {
        out.push(ALPHABET[(c[0] >> 2) as usize] as char);
        out.push(ALPHABET[((c[0] & 0x03) << 4 | c[1] >> 4) as usize] as char);
        out.push(ALPHABET[((c[1] & 0x0F) << 2 | c[2] >> 6) as usize] as char);
        out.push(ALPHABET[(c[2] & 0x3F) as usize] as char);
    }

    match *chunks.remainder() {
        [a] => {
            out.push(ALPHABET[(a >> 2) as usize] as char);
            out.push(ALPHABET[((a & 0x03) << 4) as usize] as char);
            out.push_str("==");
        }
        [a, b] => {
            out.push(ALPHABET[(a >> 2) as usize] as char);
            out.push(ALPHABET[((a & 0x03) << 4 | b >> 4) as usize] as char);
            out.push(ALPHABET[((b & 0x0F) << 2) as usize] as char);
            out.push('=');
        }
        _ => {}
    }

    out
}

/// Decode padded base64 back into bytes.
pub fn decode(text: &str) -> Result<Vec<u8>, Base64Error> {
    let input = text.as_bytes();
    if input.len() % 4 != 0 {
        return Err(Base64Error::InvalidLength(input.len()));
    }

    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    let quads = input.len() / 4;

    for (q, quad) in input.chunks_exact(4).enumerate() {
        let last = q + 1 == quads;
        let pads = quad.iter().rev().take_while(|&&b| b == PAD).count();
        if pads > 2 || (pads > 0 && !last) {
            return Err(Base64Error::InvalidPadding);
        }

        let mut sextets = [0u8; 4];
        for (i, &b) in quad[..4 - pads].iter().enumerate() {
            let v = DECODE_TABLE[b as usize];
            if v == INVALID {
                return Err(Base64Error::InvalidByte(q * 4 + i));
            }
            sextets[i] = v;
        }

        out.push(sextets[0] << 2 | sextets[1] >> 4);
        if pads < 2 {
            out.push(sextets[1] << 4 | sextets[2] >> 2);
        }
        if pads < 1 {
            out.push(sextets[2] << 6 | sextets[3]);
        }
    }

    Ok(out)
}
