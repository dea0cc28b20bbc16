//! Bech32 (BIP-173) checksummed encoding: the shared wire format underneath
//! BOLT11 invoices and Nostr's `npub`/`nsec` bech32 strings.
//!
//! This is hand-rolled rather than pulled from a crate: the polymod
//! generator and the 5-bit alphabet are exactly the "hard core" codec logic
//! this crate exists to implement, not ambient plumbing.

use crate::error::CodecError;

const CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &v in values {
        let top = chk >> 25;
        chk = ((chk & 0x1ffffff) << 5) ^ (v as u32);
        for (i, gen) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= gen;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(hrp.len() * 2 + 1);
    for b in hrp.bytes() {
        v.push(b >> 5);
    }
    v.push(0);
    for b in hrp.bytes() {
        v.push(b & 31);
    }
    v
}

fn create_checksum(hrp: &str, data: &[u8]) -> [u8; 6] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; 6]);
    let polymod_val = polymod(&values) ^ 1;
    let mut checksum = [0u8; 6];
    for (i, c) in checksum.iter_mut().enumerate() {
        *c = ((polymod_val >> (5 * (5 - i))) & 31) as u8;
    }
    checksum
}

fn verify_checksum(hrp: &str, data: &[u8]) -> bool {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    polymod(&values) == 1
}

/// Encodes `hrp` plus 5-bit `data` into a bech32 string.
pub fn encode(hrp: &str, data: &[u8]) -> Result<String, CodecError> {
    if hrp.is_empty() {
        return Err(CodecError::Bech32("empty hrp".into()));
    }
    if !hrp.chars().all(|c| c.is_ascii() && !c.is_ascii_uppercase()) {
        return Err(CodecError::Bech32("hrp must be lowercase ascii".into()));
    }
    for &d in data {
        if d > 31 {
            return Err(CodecError::Bech32("5-bit value out of range".into()));
        }
    }

    let checksum = create_checksum(hrp, data);
    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + 6);
    out.push_str(hrp);
    out.push('1');
    for &d in data.iter().chain(checksum.iter()) {
        out.push(CHARSET[d as usize] as char);
    }
    Ok(out)
}

/// Decodes a bech32 string into `(hrp, 5-bit data)`. Rejects mixed case,
/// invalid checksum, and characters outside the bech32 alphabet.
pub fn decode(s: &str) -> Result<(String, Vec<u8>), CodecError> {
    if s.len() < 8 || s.len() > 2000 {
        return Err(CodecError::Bech32("invalid length".into()));
    }

    let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(CodecError::Bech32("mixed case".into()));
    }
    let s_lower = s.to_ascii_lowercase();

    let sep_pos = s_lower
        .rfind('1')
        .ok_or_else(|| CodecError::Bech32("missing separator".into()))?;
    if sep_pos == 0 || sep_pos + 7 > s_lower.len() {
        return Err(CodecError::Bech32("invalid separator position".into()));
    }

    let hrp = &s_lower[..sep_pos];
    let data_part = &s_lower[sep_pos + 1..];

    let mut data = Vec::with_capacity(data_part.len());
    for c in data_part.chars() {
        let pos = CHARSET
            .iter()
            .position(|&x| x == c as u8)
            .ok_or_else(|| CodecError::Bech32(format!("invalid character: {c}")))?;
        data.push(pos as u8);
    }

    if !verify_checksum(hrp, &data) {
        return Err(CodecError::Bech32("invalid checksum".into()));
    }

    let payload = data[..data.len() - 6].to_vec();
    Ok((hrp.to_string(), payload))
}

/// Converts a byte slice into 5-bit groups (used to bech32-encode raw bytes,
/// e.g. Nostr's `npub`/`nsec`).
pub fn bytes_to_u5(data: &[u8]) -> Vec<u8> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(data.len() * 8 / 5 + 1);
    for &b in data {
        acc = (acc << 8) | b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(((acc >> bits) & 31) as u8);
        }
    }
    if bits > 0 {
        out.push(((acc << (5 - bits)) & 31) as u8);
    }
    out
}

/// Maps a 5-bit value to its bech32 alphabet character (BOLT11 reuses the
/// bech32 charset to tag its field types: `p`, `d`, `h`, `x`, `n`, `c`, `f`,
/// `r`, `9`, ...).
pub fn char_for_u5(v: u8) -> Option<char> {
    CHARSET.get(v as usize).map(|&b| b as char)
}

/// Converts 5-bit groups back to bytes. Fails if the padding bits are non-zero
/// or too many bits remain unaccounted for (BIP-173 §"Bit conversion").
pub fn u5_to_bytes(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(data.len() * 5 / 8);
    for &d in data {
        if d > 31 {
            return Err(CodecError::Bech32("5-bit value out of range".into()));
        }
        acc = (acc << 5) | d as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((acc >> bits) & 0xff) as u8);
        }
    }
    if bits >= 5 || (acc & ((1 << bits) - 1)) != 0 {
        return Err(CodecError::Bech32("non-zero padding".into()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn round_trip_random_data() {
        let mut rng = rand::thread_rng();
        for len in [0usize, 1, 8, 64, 1024] {
            let data: Vec<u8> = (0..len).map(|_| rng.gen_range(0..32)).collect();
            let encoded = encode("pulse", &data).unwrap();
            let (hrp, decoded) = decode(&encoded).unwrap();
            assert_eq!(hrp, "pulse");
            assert_eq!(decoded, data);
        }
    }

    #[test]
    fn rejects_mixed_case() {
        assert!(decode("Pulse1qqqsyqcyq5").is_err());
    }

    #[test]
    fn rejects_bad_checksum() {
        let encoded = encode("pulse", &[1, 2, 3]).unwrap();
        let mut bytes = encoded.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'q' { b'p' } else { b'q' };
        let corrupted = String::from_utf8(bytes).unwrap();
        assert!(decode(&corrupted).is_err());
    }

    #[test]
    fn byte_u5_round_trip() {
        for data in [&b""[..], &b"x"[..], &b"hello world this is pulse"[..]] {
            let u5 = bytes_to_u5(data);
            let back = u5_to_bytes(&u5).unwrap();
            assert_eq!(back, data);
        }
    }
}
