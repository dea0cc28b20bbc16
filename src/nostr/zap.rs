//! NIP-57 zap pipeline: Lightning-address resolution, zap-request
//! construction, invoice verification, and zap-receipt validation
//! (spec §4.7 "Zap pipeline").

use super::event::{kind, new_event, NostrEvent};
use crate::clock::Clock;
use crate::codec::bolt11;
use crate::crypto::{sha256, NostrIdentity};
use crate::error::ZapError;
use serde::Deserialize;
use std::net::IpAddr;

/// Preferred wallet URI schemes, checked in order by the host application;
/// `lightning:<invoice>` is the universal fallback.
pub const WALLET_SCHEMES: [&str; 4] = ["zeusln", "phoenix", "muun", "bluewallet"];

/// Validates a Lightning address per spec §6. Returns `(local, domain)`,
/// both lowercased.
pub fn validate_lightning_address(address: &str) -> Result<(String, String), ZapError> {
    let lowered = address.to_ascii_lowercase();
    if !(3..255).contains(&lowered.len()) {
        return Err(ZapError::LnurlEndpoint("address length out of range".into()));
    }
    let mut parts = lowered.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().ok_or_else(|| ZapError::LnurlEndpoint("missing @".into()))?;
    if domain.contains('@') {
        return Err(ZapError::LnurlEndpoint("more than one @".into()));
    }

    if !(1..=64).contains(&local.len()) {
        return Err(ZapError::LnurlEndpoint("local part length out of range".into()));
    }
    let first = local.chars().next().ok_or_else(|| ZapError::LnurlEndpoint("empty local part".into()))?;
    if !first.is_ascii_alphanumeric() {
        return Err(ZapError::LnurlEndpoint("local part must start alphanumeric".into()));
    }
    if !local.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
        return Err(ZapError::LnurlEndpoint("local part has disallowed characters".into()));
    }
    if local.contains("..") || local.contains("//") || local.contains('\\') {
        return Err(ZapError::LnurlEndpoint("local part contains a disallowed sequence".into()));
    }

    if !(3..253).contains(&domain.len()) {
        return Err(ZapError::LnurlEndpoint("domain length out of range".into()));
    }
    if domain == "localhost" {
        return Err(ZapError::LnurlEndpoint("localhost is not allowed".into()));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(ZapError::LnurlEndpoint("domain needs at least two labels".into()));
    }
    for label in &labels {
        if !(1..=63).contains(&label.len()) {
            return Err(ZapError::LnurlEndpoint("domain label length out of range".into()));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ZapError::LnurlEndpoint("domain label has disallowed characters".into()));
        }
    }
    let tld = labels.last().expect("checked len >= 2 above");
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ZapError::LnurlEndpoint("tld must be at least 2 alphabetic characters".into()));
    }
    if let Ok(ip) = domain.parse::<IpAddr>() {
        if is_blocked_ip(ip) {
            return Err(ZapError::LnurlEndpoint("domain resolves to a blocked ip range".into()));
        }
    }

    Ok((local.to_string(), domain.to_string()))
}

/// Blocked ranges per spec §4.7: loopback, RFC1918 private space, and
/// link-local.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
        }
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Builds the well-known LNURL-pay endpoint URL for a validated address.
pub fn lnurl_endpoint_url(local: &str, domain: &str) -> String {
    format!("https://{domain}/.well-known/lnurlp/{}", urlencoding::encode(local))
}

#[derive(Debug, Clone, Deserialize)]
pub struct LnurlPayResponse {
    pub tag: String,
    #[serde(rename = "minSendable")]
    pub min_sendable: u64,
    #[serde(rename = "maxSendable")]
    pub max_sendable: u64,
    pub callback: String,
    #[serde(rename = "allowsNostr", default)]
    pub allows_nostr: bool,
    #[serde(rename = "nostrPubkey")]
    pub nostr_pubkey: Option<String>,
}

impl LnurlPayResponse {
    /// Validates the response per spec §4.7 step 3.
    pub fn validate(&self, amount_msats: u64) -> Result<(), ZapError> {
        if self.tag != "payRequest" {
            return Err(ZapError::LnurlEndpoint("tag is not payRequest".into()));
        }
        if !self.allows_nostr {
            return Err(ZapError::LnurlEndpoint("endpoint does not advertise zap support".into()));
        }
        if !(self.min_sendable..=self.max_sendable).contains(&amount_msats) {
            return Err(ZapError::AmountOutOfRange);
        }
        Ok(())
    }
}

/// Fetches and validates the LNURL-pay endpoint for a Lightning address,
/// enforcing the HTTPS-only and private/loopback/link-local IP blocks from
/// spec §4.7 step 2.
pub async fn resolve_lnurl_endpoint(client: &reqwest::Client, local: &str, domain: &str) -> Result<LnurlPayResponse, ZapError> {
    let lookup_target = format!("{domain}:443");
    let resolved = tokio::net::lookup_host(&lookup_target)
        .await
        .map_err(|e| ZapError::LnurlEndpoint(format!("dns resolution failed: {e}")))?;
    let mut any_resolved = false;
    for addr in resolved {
        any_resolved = true;
        if is_blocked_ip(addr.ip()) {
            return Err(ZapError::LnurlEndpoint("domain resolves to a blocked ip range".into()));
        }
    }
    if !any_resolved {
        return Err(ZapError::LnurlEndpoint("domain did not resolve to any address".into()));
    }

    let url = lnurl_endpoint_url(local, domain);
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ZapError::LnurlEndpoint(e.to_string()))?
        .json::<LnurlPayResponse>()
        .await
        .map_err(|e| ZapError::LnurlEndpoint(e.to_string()))?;
    Ok(response)
}

/// Constructs and signs a kind-9734 zap-request event (spec §4.7 step 4).
pub fn build_zap_request(
    identity: &NostrIdentity,
    clock: &dyn Clock,
    recipient_pubkey_hex: &str,
    amount_msats: u64,
    relays: &[String],
    comment: Option<&str>,
    event_id: Option<&str>,
) -> NostrEvent {
    let mut tags = Vec::new();
    let mut relay_tag = vec!["relays".to_string()];
    relay_tag.extend(relays.iter().cloned());
    tags.push(relay_tag);
    tags.push(vec!["amount".to_string(), amount_msats.to_string()]);
    tags.push(vec!["p".to_string(), recipient_pubkey_hex.to_string()]);
    if let Some(event_id) = event_id {
        tags.push(vec!["e".to_string(), event_id.to_string()]);
    }
    new_event(identity, clock, kind::ZAP_REQUEST, comment.unwrap_or(""), tags)
}

/// Appends `nostr=<url-encoded event json>` and `amount=<msats>` to the
/// LNURL callback URL.
pub fn callback_url(callback: &str, zap_request: &NostrEvent, amount_msats: u64) -> Result<String, ZapError> {
    let event_json = serde_json::to_string(zap_request).map_err(|e| ZapError::InvalidInvoice(e.to_string()))?;
    let separator = if callback.contains('?') { '&' } else { '?' };
    Ok(format!("{callback}{separator}amount={amount_msats}&nostr={}", urlencoding::encode(&event_json)))
}

#[derive(Debug, Deserialize)]
struct CallbackResponse {
    pr: String,
}

/// Fetches the invoice from an LNURL callback URL (spec §4.7 step 5).
pub async fn fetch_invoice(client: &reqwest::Client, url: &str) -> Result<String, ZapError> {
    let response = client.get(url).send().await.map_err(|e| ZapError::LnurlEndpoint(e.to_string()))?;
    let body: CallbackResponse = response.json().await.map_err(|e| ZapError::InvalidInvoice(e.to_string()))?;
    Ok(body.pr)
}

/// Three-way amount check (spec §4.7 step 6): UI amount, the zap request's
/// own `amount` tag, and the BOLT11 invoice amount must all agree exactly.
pub fn three_way_amount_check(ui_amount_msats: u64, zap_request: &NostrEvent, invoice: &bolt11::ParsedInvoice) -> Result<(), ZapError> {
    let tag_amount: u64 = zap_request
        .first_tag_value("amount")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ZapError::InvalidInvoice("zap request missing amount tag".into()))?;
    let invoice_amount = invoice.amount_msats.ok_or(ZapError::AmountMismatch)?;
    if ui_amount_msats == tag_amount && tag_amount == invoice_amount {
        Ok(())
    } else {
        Err(ZapError::AmountMismatch)
    }
}

/// Description-hash binding check (spec §4.7 step 7): the invoice's
/// `description_hash`, if present, must equal the SHA-256 of the canonical
/// zap-request serialization; otherwise its `description` must equal the
/// canonical JSON exactly.
pub fn description_hash_check(invoice: &bolt11::ParsedInvoice, zap_request: &NostrEvent) -> Result<(), ZapError> {
    let canonical = crate::codec::nostr_json::canonical_bytes(
        &zap_request.pubkey,
        zap_request.created_at,
        zap_request.kind,
        &zap_request.tags,
        &zap_request.content,
    );
    if let Some(description_hash) = invoice.description_hash() {
        if sha256(&canonical) != description_hash {
            return Err(ZapError::DescriptionHashMismatch);
        }
        return Ok(());
    }
    let canonical_str = String::from_utf8(canonical).map_err(|_| ZapError::DescriptionHashMismatch)?;
    match invoice.description() {
        Some(description) if description == canonical_str => Ok(()),
        _ => Err(ZapError::DescriptionHashMismatch),
    }
}

/// Candidate wallet URIs for the invoice, in preference order, ending with
/// the universal `lightning:` fallback. The invoice string is used verbatim
/// — no re-encoding.
pub fn candidate_wallet_uris(invoice: &str) -> Vec<String> {
    let mut uris: Vec<String> = WALLET_SCHEMES.iter().map(|scheme| format!("{scheme}:{invoice}")).collect();
    uris.push(format!("lightning:{invoice}"));
    uris
}

/// Validates an incoming kind-9735 zap receipt (spec §4.7 "Zap receipt validation").
pub fn validate_zap_receipt(receipt: &NostrEvent) -> Result<(), ZapError> {
    super::event::verify(receipt).map_err(|_| ZapError::InvalidInvoice("receipt signature invalid".into()))?;

    let bolt11_str = receipt.first_tag_value("bolt11").ok_or_else(|| ZapError::InvalidInvoice("missing bolt11 tag".into()))?;
    let invoice = bolt11::parse(bolt11_str).map_err(|e| ZapError::InvalidInvoice(e.to_string()))?;

    let description = receipt.first_tag_value("description").ok_or_else(|| ZapError::InvalidInvoice("missing description tag".into()))?;
    let description_hash = invoice.description_hash().ok_or(ZapError::DescriptionHashMismatch)?;
    if sha256(description.as_bytes()) != description_hash {
        return Err(ZapError::DescriptionHashMismatch);
    }

    let amount_tag: u64 = receipt
        .first_tag_value("amount")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ZapError::InvalidInvoice("missing amount tag".into()))?;
    let invoice_amount = invoice.amount_msats.ok_or(ZapError::AmountMismatch)?;
    if amount_tag != invoice_amount {
        return Err(ZapError::AmountMismatch);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_well_formed_address() {
        assert!(validate_lightning_address("alice@example.com").is_ok());
    }

    #[test]
    fn rejects_localhost_and_missing_at() {
        assert!(validate_lightning_address("alice@localhost").is_err());
        assert!(validate_lightning_address("alice-example.com").is_err());
    }

    #[test]
    fn rejects_double_dot_in_local_part() {
        assert!(validate_lightning_address("ali..ce@example.com").is_err());
    }

    #[test]
    fn rejects_private_ip_domain() {
        assert!(validate_lightning_address("alice@127.0.0.1").is_err());
    }

    #[test]
    fn blocked_ip_ranges() {
        assert!(is_blocked_ip("127.0.0.1".parse().unwrap()));
        assert!(is_blocked_ip("10.1.2.3".parse().unwrap()));
        assert!(is_blocked_ip("172.16.0.1".parse().unwrap()));
        assert!(is_blocked_ip("192.168.1.1".parse().unwrap()));
        assert!(is_blocked_ip("169.254.1.1".parse().unwrap()));
        assert!(!is_blocked_ip("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn pay_response_enforces_amount_bounds_and_zap_support() {
        let response = LnurlPayResponse {
            tag: "payRequest".into(),
            min_sendable: 1000,
            max_sendable: 10_000_000,
            callback: "https://example.com/cb".into(),
            allows_nostr: true,
            nostr_pubkey: None,
        };
        assert!(response.validate(5000).is_ok());
        assert!(response.validate(500).is_err());

        let no_zap = LnurlPayResponse { allows_nostr: false, ..response };
        assert!(no_zap.validate(5000).is_err());
    }

    #[test]
    fn callback_url_appends_params() {
        use crate::clock::FakeClock;
        let identity = NostrIdentity::generate();
        let clock = FakeClock::new(0);
        let zap_request = build_zap_request(&identity, &clock, "deadbeef", 1000, &["wss://relay.example".to_string()], None, None);
        let url = callback_url("https://example.com/cb", &zap_request, 1000).unwrap();
        assert!(url.contains("amount=1000"));
        assert!(url.contains("nostr="));
    }

    #[test]
    fn three_way_check_requires_exact_agreement() {
        use crate::clock::FakeClock;
        let identity = NostrIdentity::generate();
        let clock = FakeClock::new(0);
        let zap_request = build_zap_request(&identity, &clock, "deadbeef", 1000, &[], None, None);
        let invoice = bolt11::ParsedInvoice {
            network: "bc".into(),
            amount_msats: Some(1000),
            timestamp: 0,
            tags: vec![],
            signature: [0u8; 65],
        };
        assert!(three_way_amount_check(1000, &zap_request, &invoice).is_ok());
        assert!(three_way_amount_check(999, &zap_request, &invoice).is_err());
    }

    #[test]
    fn description_hash_check_matches_canonical_zap_request() {
        use crate::clock::FakeClock;
        let identity = NostrIdentity::generate();
        let clock = FakeClock::new(0);
        let zap_request = build_zap_request(&identity, &clock, "deadbeef", 1000, &[], None, None);
        let canonical = crate::codec::nostr_json::canonical_bytes(
            &zap_request.pubkey,
            zap_request.created_at,
            zap_request.kind,
            &zap_request.tags,
            &zap_request.content,
        );
        let hash = sha256(&canonical);
        let invoice = bolt11::ParsedInvoice {
            network: "bc".into(),
            amount_msats: Some(1000),
            timestamp: 0,
            tags: vec![bolt11::TaggedField::DescriptionHash(hash)],
            signature: [0u8; 65],
        };
        assert!(description_hash_check(&invoice, &zap_request).is_ok());
    }

    #[test]
    fn candidate_wallet_uris_end_with_universal_fallback() {
        let uris = candidate_wallet_uris("lnbc1...");
        assert_eq!(uris.last().unwrap(), "lightning:lnbc1...");
        assert_eq!(uris.len(), WALLET_SCHEMES.len() + 1);
    }
}
