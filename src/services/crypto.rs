// SPDX-License-Identifier: MIT

//! Signatures and AES message envelopes for the webhook channel.
//!
//! Query signatures are SHA-1 over the lexicographically sorted, concatenated
//! parts. Encrypted events carry a base64 AES-CBC envelope:
//! `16 random bytes ‖ u32 BE length ‖ inner XML ‖ appid`, padded PKCS7-style
//! to a 32-byte boundary (the vendor's block size, not the cipher's).

use crate::error::AppError;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha1::{Digest, Sha1};

/// Encoding keys are 43 arbitrary alphabet chars, so the final quantum
/// rarely has clean trailing bits; decode them leniently.
const KEY_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

const ENVELOPE_PAD_BLOCK: usize = 32;
const RANDOM_PREFIX_LEN: usize = 16;

/// SHA-1 over the sorted, joined parts, hex encoded.
///
/// Both the plaintext `signature` and the encrypted-mode `msg_signature`
/// reduce to this with different part lists.
pub fn sorted_signature(parts: &[&str]) -> String {
    let mut parts: Vec<&str> = parts.to_vec();
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    hasher.update(parts.concat().as_bytes());
    hex::encode(hasher.finalize())
}

/// AES envelope codec bound to one platform identity.
#[derive(Clone)]
pub struct MessageCryptor {
    key: [u8; 32],
    appid: String,
}

impl MessageCryptor {
    /// Build from the 43-char encoding key.
    ///
    /// The key is base64 without its padding char; the url-safe alphabet
    /// (`-`/`_`) is accepted in place of `+`/`/`.
    pub fn new(encoding_aes_key: &str, appid: &str) -> Result<Self, AppError> {
        let normalized: String = encoding_aes_key
            .chars()
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                c => c,
            })
            .collect();
        let decoded = KEY_BASE64
            .decode(normalized.as_bytes())
            .map_err(|e| AppError::Param(format!("invalid encoding AES key: {}", e)))?;
        let key: [u8; 32] = decoded
            .try_into()
            .map_err(|_| AppError::Param("encoding AES key must decode to 32 bytes".to_string()))?;

        Ok(Self {
            key,
            appid: appid.to_string(),
        })
    }

    /// Decrypt a base64 envelope and return the inner XML after verifying
    /// the length word and the trailing appid.
    pub fn decrypt(&self, encrypted_block: &str) -> Result<String, AppError> {
        let ciphertext = BASE64
            .decode(encrypted_block.as_bytes())
            .map_err(|e| AppError::DecryptIntegrity(format!("bad base64 block: {}", e)))?;
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(AppError::DecryptIntegrity("bad ciphertext length".into()));
        }

        let mut buffer = ciphertext;
        let cipher = Aes256CbcDec::new_from_slices(&self.key, &self.key[..16])
            .map_err(|e| AppError::DecryptIntegrity(format!("cipher init: {}", e)))?;
        cipher
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|e| AppError::DecryptIntegrity(format!("decrypt: {}", e)))?;

        let plaintext = strip_pad(&buffer)?;
        if plaintext.len() < RANDOM_PREFIX_LEN + 4 {
            return Err(AppError::DecryptIntegrity("envelope too short".into()));
        }

        let body = &plaintext[RANDOM_PREFIX_LEN..];
        let xml_len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
        if body.len() < 4 + xml_len {
            return Err(AppError::DecryptIntegrity("length exceeds envelope".into()));
        }

        let appid = &body[4 + xml_len..];
        if appid != self.appid.as_bytes() {
            return Err(AppError::DecryptIntegrity("appid mismatch".into()));
        }

        String::from_utf8(body[4..4 + xml_len].to_vec())
            .map_err(|e| AppError::DecryptIntegrity(format!("inner XML not UTF-8: {}", e)))
    }

    /// Encrypt inner XML into a base64 envelope (reply construction and
    /// round-trip tests).
    pub fn encrypt(&self, inner_xml: &str) -> Result<String, AppError> {
        let random: [u8; RANDOM_PREFIX_LEN] = rand::random();

        let mut plaintext = Vec::with_capacity(
            RANDOM_PREFIX_LEN + 4 + inner_xml.len() + self.appid.len() + ENVELOPE_PAD_BLOCK,
        );
        plaintext.extend_from_slice(&random);
        plaintext.extend_from_slice(&(inner_xml.len() as u32).to_be_bytes());
        plaintext.extend_from_slice(inner_xml.as_bytes());
        plaintext.extend_from_slice(self.appid.as_bytes());

        let pad = ENVELOPE_PAD_BLOCK - plaintext.len() % ENVELOPE_PAD_BLOCK;
        plaintext.extend(std::iter::repeat(pad as u8).take(pad));

        let len = plaintext.len();
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &self.key[..16])
            .map_err(|e| AppError::DecryptIntegrity(format!("cipher init: {}", e)))?;
        cipher
            .encrypt_padded_mut::<NoPadding>(&mut plaintext, len)
            .map_err(|e| AppError::DecryptIntegrity(format!("encrypt: {}", e)))?;

        Ok(BASE64.encode(&plaintext))
    }
}

/// Remove the 32-byte-block pad. The pad byte count is the last byte's value.
fn strip_pad(buffer: &[u8]) -> Result<&[u8], AppError> {
    let pad = *buffer.last().ok_or_else(|| {
        AppError::DecryptIntegrity("empty plaintext".into())
    })? as usize;
    if pad == 0 || pad > ENVELOPE_PAD_BLOCK || pad > buffer.len() {
        return Err(AppError::DecryptIntegrity("bad padding".into()));
    }
    Ok(&buffer[..buffer.len() - pad])
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";

    #[test]
    fn sorted_signature_matches_known_digest() {
        // sort(["token", "1409304348", "nonce"]) joins to
        // "1409304348noncetoken"
        let sig = sorted_signature(&["token", "1409304348", "nonce"]);

        let mut hasher = Sha1::new();
        hasher.update(b"1409304348noncetoken");
        assert_eq!(sig, hex::encode(hasher.finalize()));
    }

    #[test]
    fn envelope_roundtrip() {
        let cryptor = MessageCryptor::new(TEST_KEY, "wx_component_test").unwrap();
        let xml = "<xml><InfoType>component_verify_ticket</InfoType></xml>";

        let block = cryptor.encrypt(xml).unwrap();
        assert_eq!(cryptor.decrypt(&block).unwrap(), xml);
    }

    #[test]
    fn appid_mismatch_rejected() {
        let sender = MessageCryptor::new(TEST_KEY, "wx_other").unwrap();
        let receiver = MessageCryptor::new(TEST_KEY, "wx_component_test").unwrap();

        let block = sender.encrypt("<xml/>").unwrap();
        let err = receiver.decrypt(&block).unwrap_err();
        assert!(matches!(err, AppError::DecryptIntegrity(_)));
    }

    #[test]
    fn garbage_block_rejected() {
        let cryptor = MessageCryptor::new(TEST_KEY, "wx").unwrap();
        assert!(cryptor.decrypt("!!!not-base64!!!").is_err());
        assert!(cryptor.decrypt(&BASE64.encode(b"short")).is_err());
    }

    #[test]
    fn url_safe_key_alphabet_accepted() {
        // '-' and '_' decode like '+' and '/'
        let key_a = "aaaaaaaaaaaaaaaaaaaaa-aaaaaaaaaaaaaaaaaaa_a";
        let key_b = "aaaaaaaaaaaaaaaaaaaaa+aaaaaaaaaaaaaaaaaaa/a";
        let a = MessageCryptor::new(key_a, "wx").unwrap();
        let b = MessageCryptor::new(key_b, "wx").unwrap();
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn short_key_rejected() {
        assert!(MessageCryptor::new("dG9vc2hvcnQ", "wx").is_err());
    }
}
