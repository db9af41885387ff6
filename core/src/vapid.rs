//! VAPID application server key decoding
//!
//! The server publishes its public key as URL-safe base64 without padding.
//! `PushManager.subscribe` wants the raw bytes.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of an uncompressed P-256 public key (0x04 || X || Y).
pub const UNCOMPRESSED_P256_LEN: usize = 65;

/// Standard alphabet, canonical padding, tolerant of non-zero trailing bits
/// the way `atob` is.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyDecodeError {
    #[error("VAPID key is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("VAPID key is empty")]
    Empty,
}

/// Decode a URL-safe base64 key (padding optional) into raw bytes.
pub fn decode_vapid_key(input: &str) -> Result<Vec<u8>, KeyDecodeError> {
    let padding = (4 - input.len() % 4) % 4;

    let mut standard = String::with_capacity(input.len() + padding);
    standard.extend(input.chars().map(|c| match c {
        '-' => '+',
        '_' => '/',
        other => other,
    }));
    standard.extend(std::iter::repeat('=').take(padding));

    Ok(LENIENT_STANDARD.decode(standard.as_bytes())?)
}

/// Decoded application server key, as handed to the push manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationServerKey(Vec<u8>);

impl ApplicationServerKey {
    /// Decode a key as published by the push backend.
    pub fn from_url_safe(input: &str) -> Result<Self, KeyDecodeError> {
        let bytes = decode_vapid_key(input.trim())?;
        if bytes.is_empty() {
            return Err(KeyDecodeError::Empty);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Push services only accept uncompressed P-256 points.
    pub fn is_uncompressed_p256(&self) -> bool {
        self.0.len() == UNCOMPRESSED_P256_LEN && self.0[0] == 0x04
    }

    /// Re-encode in the unpadded URL-safe form.
    pub fn to_url_safe(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }
}

impl From<Vec<u8>> for ApplicationServerKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ApplicationServerKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use proptest::prelude::*;

    // A real VAPID public key (uncompressed P-256).
    const SAMPLE_KEY: &str =
        "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

    #[test]
    fn test_decode_sample_key() {
        let bytes = decode_vapid_key(SAMPLE_KEY).unwrap();
        assert_eq!(bytes.len(), UNCOMPRESSED_P256_LEN);
        assert_eq!(bytes[0], 0x04);
    }

    #[test]
    fn test_url_safe_characters_are_remapped() {
        // 0xfb 0xff encodes to "+/8" in standard and "-_8" in URL-safe.
        assert_eq!(decode_vapid_key("-_8").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(decode_vapid_key("-_8=").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_already_padded_input() {
        assert_eq!(decode_vapid_key("aGk=").unwrap(), b"hi".to_vec());
        assert_eq!(decode_vapid_key("aGk").unwrap(), b"hi".to_vec());
    }

    #[test]
    fn test_empty_input_decodes_to_nothing() {
        assert_eq!(decode_vapid_key("").unwrap(), Vec::<u8>::new());
        assert_eq!(
            ApplicationServerKey::from_url_safe(""),
            Err(KeyDecodeError::Empty)
        );
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        assert!(decode_vapid_key("a").is_err());
        assert!(decode_vapid_key("ab$d").is_err());
        assert!(matches!(
            ApplicationServerKey::from_url_safe("not base64!"),
            Err(KeyDecodeError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_trailing_bits_are_tolerated() {
        // "aGl" has non-zero trailing bits; atob accepts it.
        assert_eq!(decode_vapid_key("aGl").unwrap(), b"hi".to_vec());
    }

    #[test]
    fn test_application_server_key_roundtrip() {
        let key = ApplicationServerKey::from_url_safe(SAMPLE_KEY).unwrap();
        assert!(key.is_uncompressed_p256());
        assert_eq!(key.to_url_safe(), SAMPLE_KEY);
    }

    #[test]
    fn test_short_key_is_not_p256() {
        let key = ApplicationServerKey::from_url_safe("aGk").unwrap();
        assert_eq!(key.len(), 2);
        assert!(!key.is_uncompressed_p256());
    }

    proptest! {
        #[test]
        fn prop_decoded_length_matches_standard(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let url_safe = URL_SAFE_NO_PAD.encode(&bytes);
            let standard = STANDARD.encode(&bytes);

            let decoded = decode_vapid_key(&url_safe).unwrap();
            prop_assert_eq!(decoded.len(), STANDARD.decode(standard).unwrap().len());
            prop_assert_eq!(decoded, bytes);
        }
    }
}
