//! BOLT11 Lightning invoice parsing and validation, enough to support the
//! zap pipeline's "does this invoice actually match the zap request"
//! checks. This is a reader, not an encoder: Pulse never originates
//! invoices, it only consumes ones fetched from an LNURL callback.

use crate::codec::bech32;
use crate::error::CodecError;

const NETWORKS: [&str; 4] = ["bcrt", "tb", "bc", "sb"];
const TIMESTAMP_GROUPS: usize = 7;
const SIGNATURE_GROUPS: usize = 104;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedField {
    PaymentHash([u8; 32]),
    Description(String),
    DescriptionHash([u8; 32]),
    Expiry(u64),
    PayeePubkey([u8; 33]),
    MinFinalCltv(u64),
    Fallback(Vec<u8>),
    RoutingInfo(Vec<u8>),
    Features(Vec<u8>),
    Unknown { tag: char, data: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct ParsedInvoice {
    pub network: String,
    pub amount_msats: Option<u64>,
    pub timestamp: u64,
    pub tags: Vec<TaggedField>,
    pub signature: [u8; 65],
}

impl ParsedInvoice {
    pub fn payment_hash(&self) -> Option<[u8; 32]> {
        self.tags.iter().find_map(|t| match t {
            TaggedField::PaymentHash(h) => Some(*h),
            _ => None,
        })
    }

    pub fn description(&self) -> Option<&str> {
        self.tags.iter().find_map(|t| match t {
            TaggedField::Description(d) => Some(d.as_str()),
            _ => None,
        })
    }

    pub fn description_hash(&self) -> Option<[u8; 32]> {
        self.tags.iter().find_map(|t| match t {
            TaggedField::DescriptionHash(h) => Some(*h),
            _ => None,
        })
    }
}

fn normalize(input: &str) -> String {
    let lower = input.trim().to_ascii_lowercase();
    lower.strip_prefix("lightning:").unwrap_or(&lower).to_string()
}

fn split_amount(s: &str) -> Result<(&str, Option<char>), CodecError> {
    if s.is_empty() {
        return Err(CodecError::Bolt11Field("empty amount"));
    }
    let last = s.chars().last().expect("checked non-empty above");
    if matches!(last, 'm' | 'u' | 'n' | 'p') {
        Ok((&s[..s.len() - 1], Some(last)))
    } else if last.is_ascii_digit() {
        Ok((s, None))
    } else {
        Err(CodecError::Bolt11Amount)
    }
}

/// Converts a bech32 amount field to millisatoshis, rejecting any conversion
/// that is not exact (the pico multiplier can represent fractions of a
/// millisat, which BOLT11 forbids).
fn amount_to_msats(digits: &str, multiplier: Option<char>) -> Result<u64, CodecError> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(CodecError::Bolt11Amount);
    }
    let amount: u128 = digits.parse().map_err(|_| CodecError::Bolt11Amount)?;
    let msats: u128 = match multiplier {
        None => amount.checked_mul(100_000_000_000).ok_or(CodecError::Bolt11Amount)?,
        Some('m') => amount.checked_mul(100_000_000).ok_or(CodecError::Bolt11Amount)?,
        Some('u') => amount.checked_mul(100_000).ok_or(CodecError::Bolt11Amount)?,
        Some('n') => amount.checked_mul(100).ok_or(CodecError::Bolt11Amount)?,
        Some('p') => {
            if amount % 10 != 0 {
                return Err(CodecError::Bolt11Amount);
            }
            amount / 10
        }
        Some(_) => return Err(CodecError::Bolt11Amount),
    };
    u64::try_from(msats).map_err(|_| CodecError::Bolt11Amount)
}

fn groups_to_u64(groups: &[u8]) -> u64 {
    groups.iter().fold(0u64, |acc, &g| (acc << 5) | g as u64)
}

fn exact_bytes<const N: usize>(groups: &[u8]) -> Result<[u8; N], CodecError> {
    let bytes = bech32::u5_to_bytes(groups)?;
    bytes
        .try_into()
        .map_err(|_| CodecError::Bolt11Field("tagged field has the wrong length"))
}

fn parse_tagged_fields(groups: &[u8]) -> Result<Vec<TaggedField>, CodecError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < groups.len() {
        if i + 3 > groups.len() {
            return Err(CodecError::Bolt11Field("truncated tag header"));
        }
        let tag_type = groups[i];
        let length = ((groups[i + 1] as usize) << 5) | groups[i + 2] as usize;
        i += 3;
        if i + length > groups.len() {
            return Err(CodecError::Bolt11Field("truncated tag data"));
        }
        let field_data = &groups[i..i + length];
        i += length;

        let ch = bech32::char_for_u5(tag_type).ok_or(CodecError::Bolt11Field("unknown tag type"))?;
        let field = match ch {
            'p' => TaggedField::PaymentHash(exact_bytes::<32>(field_data)?),
            'h' => TaggedField::DescriptionHash(exact_bytes::<32>(field_data)?),
            'n' => TaggedField::PayeePubkey(exact_bytes::<33>(field_data)?),
            'd' => {
                let bytes = bech32::u5_to_bytes(field_data)?;
                let text = String::from_utf8(bytes).map_err(|_| CodecError::Bolt11Field("description not utf-8"))?;
                TaggedField::Description(text)
            }
            'x' => TaggedField::Expiry(groups_to_u64(field_data)),
            'c' => TaggedField::MinFinalCltv(groups_to_u64(field_data)),
            'f' => TaggedField::Fallback(field_data.to_vec()),
            'r' => TaggedField::RoutingInfo(field_data.to_vec()),
            '9' => TaggedField::Features(field_data.to_vec()),
            other => TaggedField::Unknown { tag: other, data: field_data.to_vec() },
        };
        out.push(field);
    }
    Ok(out)
}

/// Parses a BOLT11 invoice string (with or without the `lightning:` prefix).
pub fn parse(input: &str) -> Result<ParsedInvoice, CodecError> {
    let normalized = normalize(input);
    let (hrp, data) = bech32::decode(&normalized)?;

    let rest = hrp.strip_prefix("ln").ok_or(CodecError::Bolt11Field("missing ln prefix"))?;
    let network = NETWORKS
        .iter()
        .find(|n| rest.starts_with(*n))
        .ok_or(CodecError::Bolt11Field("unknown network"))?;
    let amount_part = &rest[network.len()..];
    let amount_msats = if amount_part.is_empty() {
        None
    } else {
        let (digits, multiplier) = split_amount(amount_part)?;
        Some(amount_to_msats(digits, multiplier)?)
    };

    if data.len() < TIMESTAMP_GROUPS + SIGNATURE_GROUPS {
        return Err(CodecError::Bolt11Field("payload too short"));
    }
    let timestamp = groups_to_u64(&data[..TIMESTAMP_GROUPS]);
    let sig_groups = &data[data.len() - SIGNATURE_GROUPS..];
    let signature = exact_bytes::<65>(sig_groups)?;

    let tag_groups = &data[TIMESTAMP_GROUPS..data.len() - SIGNATURE_GROUPS];
    let tags = parse_tagged_fields(tag_groups)?;

    Ok(ParsedInvoice { network: network.to_string(), amount_msats, timestamp, tags, signature })
}

const DISALLOWED_DESCRIPTION_SUBSTRINGS: [&str; 12] = [
    "<script",
    "</script",
    "javascript:",
    "onerror=",
    "onload=",
    "union select",
    "drop table",
    "insert into",
    "' or 1=1",
    "--",
    "/*",
    "*/",
];

/// Validates the fields a zap-receipt invoice must carry: a payment hash,
/// either a plain description or its hash, and a description free of
/// control characters (other than `\n`/`\t`) or markup-injection substrings.
pub fn validate(invoice: &ParsedInvoice) -> Result<(), CodecError> {
    if invoice.payment_hash().is_none() {
        return Err(CodecError::Bolt11Field("missing payment_hash"));
    }
    if invoice.description().is_none() && invoice.description_hash().is_none() {
        return Err(CodecError::Bolt11Field("missing description and description_hash"));
    }
    if let Some(description) = invoice.description() {
        if description
            .chars()
            .any(|c| c.is_control() && c != '\n' && c != '\t')
        {
            return Err(CodecError::Bolt11Field("description contains control characters"));
        }
        let lowered = description.to_ascii_lowercase();
        if DISALLOWED_DESCRIPTION_SUBSTRINGS.iter().any(|s| lowered.contains(s)) {
            return Err(CodecError::Bolt11Field("description contains disallowed content"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256;

    fn build_invoice(hrp: &str, timestamp_groups: &[u8], tag_groups: &[u8]) -> String {
        let mut data = Vec::new();
        data.extend_from_slice(timestamp_groups);
        data.extend_from_slice(tag_groups);
        data.extend_from_slice(&bech32::bytes_to_u5(&[0u8; 65]));
        bech32::encode(hrp, &data).unwrap()
    }

    fn tag(ch: char, payload: &[u8]) -> Vec<u8> {
        let type_idx = (0..32).find(|&i| bech32::char_for_u5(i) == Some(ch)).unwrap();
        let groups = bech32::bytes_to_u5(payload);
        let length = groups.len();
        let mut out = vec![type_idx, (length >> 5) as u8, (length & 31) as u8];
        out.extend_from_slice(&groups);
        out
    }

    #[test]
    fn parses_amount_and_network() {
        let payment_hash = sha256(b"preimage");
        let mut tags = tag('p', &payment_hash);
        tags.extend(tag('d', b"coffee"));
        let invoice = build_invoice("lnbc25m", &[0u8; 7], &tags);

        let parsed = parse(&invoice).unwrap();
        assert_eq!(parsed.network, "bc");
        assert_eq!(parsed.amount_msats, Some(25 * 100_000_000));
        assert_eq!(parsed.payment_hash(), Some(payment_hash));
        assert_eq!(parsed.description(), Some("coffee"));
    }

    #[test]
    fn strips_lightning_prefix_and_lowercases() {
        let payment_hash = sha256(b"x");
        let tags = tag('p', &payment_hash);
        let invoice = build_invoice("lntb", &[0u8; 7], &tags);
        let prefixed = format!("LIGHTNING:{invoice}");
        let parsed = parse(&prefixed).unwrap();
        assert_eq!(parsed.network, "tb");
    }

    #[test]
    fn pico_amount_requires_exact_conversion() {
        assert!(amount_to_msats("25", Some('p')).is_err());
        assert!(amount_to_msats("20", Some('p')).is_ok());
    }

    #[test]
    fn validator_requires_payment_hash_and_description() {
        let invoice = ParsedInvoice {
            network: "bc".into(),
            amount_msats: None,
            timestamp: 0,
            tags: vec![],
            signature: [0u8; 65],
        };
        assert!(validate(&invoice).is_err());
    }

    #[test]
    fn validator_rejects_unsafe_description() {
        let payment_hash = sha256(b"preimage");
        let tags = {
            let mut t = tag('p', &payment_hash);
            t.extend(tag('d', b"<script>alert(1)</script>"));
            t
        };
        let invoice_str = build_invoice("lnbc", &[0u8; 7], &tags);
        let invoice = parse(&invoice_str).unwrap();
        assert!(validate(&invoice).is_err());
    }

    #[test]
    fn validator_accepts_description_hash_only() {
        let payment_hash = sha256(b"preimage");
        let dh = sha256(b"description");
        let tags = {
            let mut t = tag('p', &payment_hash);
            t.extend(tag('h', &dh));
            t
        };
        let invoice_str = build_invoice("lnbc", &[0u8; 7], &tags);
        let invoice = parse(&invoice_str).unwrap();
        assert!(validate(&invoice).is_ok());
        assert_eq!(invoice.description_hash(), Some(dh));
    }
}
