//! RPC-style request signature (HMAC-SHA1, signature version 1.0)

use crate::error::CloudError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

/// Percent-encode a value, leaving only RFC 3986 unreserved characters
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Sorted `key=value` pairs joined with `&`
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, params: &BTreeMap<String, String>) -> String {
    format!(
        "{}&{}&{}",
        method,
        percent_encode("/"),
        percent_encode(&canonical_query(params))
    )
}

/// Base64 HMAC-SHA1 signature of the request parameters
pub fn sign(
    method: &str,
    params: &BTreeMap<String, String>,
    access_key_secret: &str,
) -> Result<String, CloudError> {
    let key = format!("{access_key_secret}&");
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| CloudError::InvalidConfig(format!("signing key rejected: {e}")))?;
    mac.update(string_to_sign(method, params).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
