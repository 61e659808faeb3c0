//! AEAD methods: `aes_gcm` (AES-256-GCM) and `chacha20_poly1305`.
//!
//! Both share one ciphertext layout:
//!
//! ```text
//! [V(1)][NONCE(12)][CIPHERTEXT(N)][TAG(16)]
//! ```
//!
//! A fresh random nonce is drawn for every encryption. The optional `aad` setting binds the
//! ciphertext to a caller-chosen label; decryption with a different label fails
//! authentication.
//!
//! ```json
//! { "type": "aes_gcm", "config": { "aad": "state" } }
//! ```

use crate::config::populate_from;
use crate::error::EncryptionError;
use crate::keyprovider::Output;
use crate::method::{Method, MethodConfig, MethodDescriptor, MethodId};
use aead::inout::InOutBuf;
use aead::{AeadInOut, Key, KeyInit, Nonce, Tag};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;
use getrandom::fill;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

pub type Aes = Aes256Gcm;
pub type ChaCha = ChaCha20Poly1305;

pub trait AeadCipher: AeadInOut + KeyInit + 'static {}
impl<T: AeadInOut + KeyInit + 'static> AeadCipher for T {}

pub const AES_GCM: MethodId = MethodId::new("aes_gcm");
pub const CHACHA20_POLY1305: MethodId = MethodId::new("chacha20_poly1305");

/// Ciphertext layout version.
pub(crate) const CIPHERTEXT_VERSION_V1: u8 = 1;

/// Header layout: `[version: u8]`
pub(crate) const HEADER_LEN: usize = 1;

/// AEAD nonce length (96-bit).
pub(crate) const NONCE_LEN: usize = 12;

/// AEAD tag length (128-bit).
pub(crate) const TAG_LEN: usize = 16;

/// Descriptor of an AEAD method over cipher `C`.
pub struct AeadDescriptor<C> {
    id: MethodId,
    _cipher: PhantomData<fn() -> C>,
}

impl AeadDescriptor<Aes> {
    #[must_use]
    pub const fn aes_gcm() -> Self {
        Self { id: AES_GCM, _cipher: PhantomData }
    }
}

impl AeadDescriptor<ChaCha> {
    #[must_use]
    pub const fn chacha20_poly1305() -> Self {
        Self { id: CHACHA20_POLY1305, _cipher: PhantomData }
    }
}

impl<C> fmt::Debug for AeadDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadDescriptor").field("id", &self.id).finish()
    }
}

impl<C: AeadCipher> MethodDescriptor for AeadDescriptor<C> {
    fn id(&self) -> MethodId {
        self.id
    }

    fn config_struct(&self) -> Box<dyn MethodConfig> {
        Box::new(AeadConfig::<C> { id: self.id, settings: AeadSettings::default(), _cipher: PhantomData })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AeadSettings {
    #[serde(default)]
    aad: Option<String>,
}

/// Configuration of an AEAD method.
pub struct AeadConfig<C> {
    id: MethodId,
    settings: AeadSettings,
    _cipher: PhantomData<fn() -> C>,
}

impl<C> fmt::Debug for AeadConfig<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadConfig")
            .field("id", &self.id)
            .field("aad", &self.settings.aad)
            .finish()
    }
}

impl<C: AeadCipher> MethodConfig for AeadConfig<C> {
    fn populate(&mut self, body: &Value) -> Result<(), EncryptionError> {
        self.settings = populate_from(body)?;
        Ok(())
    }

    fn build(&self) -> Result<Box<dyn Method>, EncryptionError> {
        let aad = self.settings.aad.clone().unwrap_or_default().into_bytes();
        Ok(Box::new(AeadMethod::<C> { id: self.id, aad, _cipher: PhantomData }))
    }
}

/// A built AEAD method. The cipher is keyed per call from the provider output.
pub struct AeadMethod<C> {
    id: MethodId,
    aad: Vec<u8>,
    _cipher: PhantomData<fn() -> C>,
}

impl<C> fmt::Debug for AeadMethod<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadMethod").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<C: AeadCipher> AeadMethod<C> {
    fn init_cipher(&self, key: &Output) -> Result<C, String> {
        let key = Key::<C>::try_from(key.key()).map_err(|_| {
            format!("{} rejected key material of {} bytes", self.id, key.len())
        })?;
        Ok(C::new(&key))
    }

    fn next_nonce() -> Result<Nonce<C>, EncryptionError> {
        let mut nonce = Nonce::<C>::default();
        fill(&mut nonce).map_err(|err| {
            EncryptionError::encryption(format!("system RNG unavailable for nonce generation: {err}"))
        })?;
        Ok(nonce)
    }
}

impl<C: AeadCipher> Method for AeadMethod<C> {
    fn encrypt(&self, plaintext: &[u8], key: &Output) -> Result<Vec<u8>, EncryptionError> {
        let cipher = self.init_cipher(key).map_err(EncryptionError::encryption)?;
        let nonce = Self::next_nonce()?;

        let mut buf = Vec::with_capacity(HEADER_LEN + NONCE_LEN + plaintext.len() + TAG_LEN);
        buf.push(CIPHERTEXT_VERSION_V1);
        buf.extend_from_slice(&nonce);
        buf.extend_from_slice(plaintext);

        let (_hdr, rest) = buf.split_at_mut(HEADER_LEN);
        let (_nonce_part, data_part) = rest.split_at_mut(nonce.len());
        let in_out = InOutBuf::from(data_part);

        let tag = cipher
            .encrypt_inout_detached(&nonce, &self.aad, in_out)
            .map_err(|_| EncryptionError::encryption(format!("{} encryption failed", self.id)))?;

        buf.extend_from_slice(tag.as_slice());
        Ok(buf)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &Output) -> Result<Vec<u8>, EncryptionError> {
        let cipher = self.init_cipher(key).map_err(EncryptionError::invalid_configuration)?;

        if ciphertext.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
            return Err(EncryptionError::decryption(format!(
                "ciphertext too short ({} bytes), expected at least {} bytes",
                ciphertext.len(),
                HEADER_LEN + NONCE_LEN + TAG_LEN
            )));
        }

        let version = ciphertext[0];
        if version != CIPHERTEXT_VERSION_V1 {
            return Err(EncryptionError::decryption(format!(
                "unsupported ciphertext version {version}"
            )));
        }

        let rest = &ciphertext[HEADER_LEN..];
        let (nonce_slice, rest) = rest.split_at(NONCE_LEN);
        let (body, tag_slice) = rest.split_at(rest.len() - TAG_LEN);

        let nonce = Nonce::<C>::try_from(nonce_slice)
            .map_err(|_| EncryptionError::decryption("invalid nonce length"))?;
        let tag = Tag::<C>::try_from(tag_slice)
            .map_err(|_| EncryptionError::decryption("invalid tag length"))?;

        let mut buf = body.to_vec();
        let in_out = InOutBuf::from(&mut buf[..]);

        cipher.decrypt_inout_detached(&nonce, &self.aad, in_out, &tag).map_err(|_| {
            EncryptionError::decryption(format!("{} authentication failed", self.id))
        })?;

        Ok(buf)
    }
}
