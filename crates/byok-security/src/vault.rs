//! Credential vault: per-user encryption of provider API keys.
//!
//! Key derivation: `HMAC-SHA256(master_secret, "byok-credential:v1:" || user_id)`
//! gives a 256-bit key unique to each user. Keys are sealed with AES-256-GCM
//! under a random 96-bit nonce, with the user id bound as associated data, so a
//! blob copied onto another user's row fails authentication.
//!
//! Blob format: `v1.` + base64(nonce || ciphertext || tag).
//!
//! The vault holds no per-call state and no lock; plaintext lives only in the
//! returned [`SecretKey`].

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use byok_core::config::VaultConfig;
use byok_core::error::{ByokError, Result};
use byok_core::types::{EncryptedBlob, SecretKey};

type HmacSha256 = Hmac<Sha256>;

const DERIVATION_TAG: &[u8] = b"byok-credential:v1:";
const BLOB_VERSION: &str = "v1.";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypts and decrypts API keys for individual users.
pub struct CredentialVault {
    master_secret: Vec<u8>,
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Build a vault from the process-wide master secret.
    ///
    /// Secrets shorter than `min_len` bytes are refused.
    pub fn new(master_secret: impl AsRef<[u8]>, min_len: usize) -> Result<Self> {
        let master_secret = master_secret.as_ref();
        if master_secret.len() < min_len {
            return Err(ByokError::InvalidConfig(format!(
                "encryption secret must be at least {min_len} bytes"
            )));
        }
        Ok(Self {
            master_secret: master_secret.to_vec(),
        })
    }

    /// Build a vault from the env var named in the config.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        let secret = config.read_secret().ok_or_else(|| {
            ByokError::InvalidConfig(format!("{} is not set", config.secret_env))
        })?;
        Self::new(secret, config.min_secret_length)
    }

    fn cipher_for(&self, user_id: &str) -> std::result::Result<Aes256Gcm, String> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.master_secret)
            .map_err(|_| "key derivation failed".to_string())?;
        mac.update(DERIVATION_TAG);
        mac.update(user_id.as_bytes());
        let derived = mac.finalize().into_bytes();
        Aes256Gcm::new_from_slice(&derived).map_err(|_| "invalid derived key length".to_string())
    }

    /// Seal `plaintext` for `user_id`.
    pub fn encrypt(&self, plaintext: &str, user_id: &str) -> Result<EncryptedBlob> {
        let cipher = self.cipher_for(user_id).map_err(ByokError::EncryptionFailed)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: user_id.as_bytes(),
                },
            )
            .map_err(|_| ByokError::EncryptionFailed("cipher error".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + sealed.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&sealed);
        Ok(EncryptedBlob::from_encoded(format!(
            "{BLOB_VERSION}{}",
            BASE64.encode(payload)
        )))
    }

    /// Open a blob sealed for `user_id`.
    ///
    /// Corrupt blobs, unknown versions and blobs sealed for another user all
    /// fail with `DecryptionFailed`.
    pub fn decrypt(&self, blob: &EncryptedBlob, user_id: &str) -> Result<SecretKey> {
        let encoded = blob
            .as_str()
            .strip_prefix(BLOB_VERSION)
            .ok_or_else(|| ByokError::DecryptionFailed("unknown blob version".to_string()))?;
        let payload = BASE64
            .decode(encoded)
            .map_err(|_| ByokError::DecryptionFailed("malformed blob".to_string()))?;
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(ByokError::DecryptionFailed("blob too short".to_string()));
        }

        let (nonce, sealed) = payload.split_at(NONCE_LEN);
        let cipher = self.cipher_for(user_id).map_err(ByokError::DecryptionFailed)?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: user_id.as_bytes(),
                },
            )
            .map_err(|_| ByokError::DecryptionFailed("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map(SecretKey::new)
            .map_err(|_| ByokError::DecryptionFailed("plaintext is not UTF-8".to_string()))
    }
}

/// Display hint for a key: known prefix plus the last four characters
/// (`sk-...abcd`). Short keys are fully masked.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "***".to_string();
    }
    let lead = ["sk-ant-", "sk-", "AIza"]
        .into_iter()
        .find(|p| key.starts_with(p))
        .unwrap_or("");
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{lead}...{tail}")
}
