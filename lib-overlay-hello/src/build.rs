use crate::address::validate_address;
use crate::base32;
use crate::descriptor::Descriptor;
use crate::error::HelloError;
use crate::MAX_ADDRESSES;
use chrono::{DateTime, TimeZone, Utc};
use lib_overlay_crypto::{sign, KeyPair, Purpose, PublicKey, Signature};
use std::collections::HashSet;

/// Deduplicate addresses preserving first-seen order, validating each.
fn dedup_addresses(addresses: &[String]) -> Result<Vec<String>, HelloError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for addr in addresses {
        validate_address(addr)?;
        if seen.insert(addr.clone()) {
            out.push(addr.clone());
        }
    }
    if out.len() > MAX_ADDRESSES {
        return Err(HelloError::TooManyAddresses);
    }
    Ok(out)
}

pub(crate) fn build_descriptor(
    keypair: &KeyPair,
    addresses: &[String],
    expiration_time: DateTime<Utc>,
) -> Result<Descriptor, HelloError> {
    let addresses = dedup_addresses(addresses)?;
    let payload = Descriptor::signed_payload(expiration_time, &addresses);
    let sig = sign(keypair.private(), Purpose::Hello, &payload);
    Ok(Descriptor {
        pid: *keypair.public(),
        expiration_time,
        addresses,
        sig,
    })
}

// ---------------------------------------------------------------- binary --

pub(crate) fn to_block_bytes(descriptor: &Descriptor) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 64 + 8 + 64);
    out.extend_from_slice(descriptor.pid.as_bytes());
    out.extend_from_slice(descriptor.sig.as_bytes());
    out.extend_from_slice(&descriptor.expiration_time.timestamp_micros().to_be_bytes());
    for addr in &descriptor.addresses {
        out.extend_from_slice(addr.as_bytes());
        out.push(0u8);
    }
    out
}

pub(crate) fn from_block_bytes(bytes: &[u8]) -> Result<Descriptor, HelloError> {
    const HEADER_LEN: usize = 32 + 64 + 8;
    if bytes.len() < HEADER_LEN {
        return Err(HelloError::Malformed("block shorter than header"));
    }
    let mut pid_bytes = [0u8; 32];
    pid_bytes.copy_from_slice(&bytes[0..32]);
    let pid = PublicKey::from_bytes(pid_bytes).map_err(|_| HelloError::Malformed("pid"))?;

    let mut sig_bytes = [0u8; 64];
    sig_bytes.copy_from_slice(&bytes[32..96]);
    let sig = Signature::from_bytes(sig_bytes);

    let mut exp_bytes = [0u8; 8];
    exp_bytes.copy_from_slice(&bytes[96..104]);
    let micros = i64::from_be_bytes(exp_bytes);
    let expiration_time = micros_to_datetime(micros)?;

    let addresses = parse_nul_terminated_addresses(&bytes[HEADER_LEN..])?;

    Ok(Descriptor {
        pid,
        expiration_time,
        addresses,
        sig,
    })
}

fn parse_nul_terminated_addresses(bytes: &[u8]) -> Result<Vec<String>, HelloError> {
    let mut addresses = Vec::new();
    let mut start = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        if *b == 0 {
            let addr = std::str::from_utf8(&bytes[start..i])
                .map_err(|_| HelloError::Malformed("address is not valid utf8"))?
                .to_string();
            validate_address(&addr)?;
            addresses.push(addr);
            start = i + 1;
        }
    }
    if start != bytes.len() {
        return Err(HelloError::Malformed("trailing bytes after last NUL"));
    }
    Ok(addresses)
}

// -------------------------------------------------------------------- uri --

pub(crate) fn to_url_string(descriptor: &Descriptor) -> String {
    let pid = base32::encode(descriptor.pid.as_bytes());
    let sig = base32::encode(descriptor.sig.as_bytes());
    let micros = descriptor.expiration_time.timestamp_micros();
    let mut url = format!("gnunet://hello/{pid}/{sig}/{micros}");
    if !descriptor.addresses.is_empty() {
        url.push('?');
        let pairs: Vec<String> = descriptor
            .addresses
            .iter()
            .filter_map(|addr| validate_address(addr).ok())
            .map(|(scheme, suffix)| format!("{scheme}={}", urlencoding::encode(suffix)))
            .collect();
        url.push_str(&pairs.join("&"));
    }
    url
}

pub(crate) fn from_url_string(url: &str) -> Result<Descriptor, HelloError> {
    let rest = url
        .strip_prefix("gnunet://hello/")
        .ok_or(HelloError::Malformed("missing gnunet://hello/ prefix"))?;
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    let mut parts = path.splitn(3, '/');
    let pid_b32 = parts.next().ok_or(HelloError::Malformed("missing pid"))?;
    let sig_b32 = parts.next().ok_or(HelloError::Malformed("missing sig"))?;
    let micros_str = parts.next().ok_or(HelloError::Malformed("missing expiration"))?;

    let pid_bytes: [u8; 32] = base32::decode(pid_b32)
        .map_err(|_| HelloError::Malformed("pid is not valid base32"))?
        .try_into()
        .map_err(|_| HelloError::Malformed("pid must decode to 32 bytes"))?;
    let pid = PublicKey::from_bytes(pid_bytes).map_err(|_| HelloError::Malformed("pid"))?;

    let sig_bytes: [u8; 64] = base32::decode(sig_b32)
        .map_err(|_| HelloError::Malformed("sig is not valid base32"))?
        .try_into()
        .map_err(|_| HelloError::Malformed("sig must decode to 64 bytes"))?;
    let sig = Signature::from_bytes(sig_bytes);

    let micros: i64 = micros_str
        .parse()
        .map_err(|_| HelloError::Malformed("expiration is not a decimal integer"))?;
    let expiration_time = micros_to_datetime(micros)?;

    let mut addresses = Vec::new();
    if let Some(query) = query {
        for pair in query.split('&').filter(|s| !s.is_empty()) {
            let (scheme, suffix) = pair
                .split_once('=')
                .ok_or(HelloError::Malformed("query pair missing '='"))?;
            let suffix = urlencoding::decode(suffix)
                .map_err(|_| HelloError::Malformed("suffix is not valid percent-encoding"))?;
            let addr = format!("{scheme}://{suffix}");
            validate_address(&addr)?;
            addresses.push(addr);
        }
    }

    Ok(Descriptor {
        pid,
        expiration_time,
        addresses,
        sig,
    })
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>, HelloError> {
    Utc.timestamp_micros(micros)
        .single()
        .ok_or(HelloError::Malformed("expiration out of range"))
}
