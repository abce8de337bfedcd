//! Encryption gateway
//!
//! The engine never encrypts anything itself. It hands plaintext and an
//! explicit recipient list to an [`EncryptionGateway`] on every call; there
//! is no implicit global recipient state.

mod gpg;
mod keys;

pub use gpg::GpgGateway;
pub use keys::{KeyInfo, RecipientSet};

use crate::error::EncryptionError;
use zeroize::Zeroizing;

/// Plaintext buffer wiped on drop
pub type Plaintext = Zeroizing<Vec<u8>>;

/// External encrypt/decrypt capability
pub trait EncryptionGateway: Send + Sync {
    /// Encrypt `plaintext` so that every key in `recipients` can decrypt it
    fn encrypt(&self, plaintext: &[u8], recipients: &RecipientSet)
        -> Result<Vec<u8>, EncryptionError>;

    /// Decrypt with whatever local key material applies
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Plaintext, EncryptionError>;

    /// Keys for which decryption is possible locally
    fn list_available_keys(&self) -> Result<Vec<KeyInfo>, EncryptionError>;

    /// Whether `ciphertext` is already encrypted for exactly `recipients`
    ///
    /// Gateways that cannot tell answer `false`, which makes the cascade
    /// re-encrypt unconditionally.
    #[allow(unused_variables)]
    fn is_encrypted_for(
        &self,
        ciphertext: &[u8],
        recipients: &RecipientSet,
    ) -> Result<bool, EncryptionError> {
        Ok(false)
    }
}

impl<T: EncryptionGateway + ?Sized> EncryptionGateway for std::sync::Arc<T> {
    fn encrypt(
        &self,
        plaintext: &[u8],
        recipients: &RecipientSet,
    ) -> Result<Vec<u8>, EncryptionError> {
        (**self).encrypt(plaintext, recipients)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Plaintext, EncryptionError> {
        (**self).decrypt(ciphertext)
    }

    fn list_available_keys(&self) -> Result<Vec<KeyInfo>, EncryptionError> {
        (**self).list_available_keys()
    }

    fn is_encrypted_for(
        &self,
        ciphertext: &[u8],
        recipients: &RecipientSet,
    ) -> Result<bool, EncryptionError> {
        (**self).is_encrypted_for(ciphertext, recipients)
    }
}
