//! Authenticated message envelopes.
//!
//! Two modes share one framing, `MAGIC || version || mode || header ||
//! nonce || ciphertext`:
//!
//! - **symmetric**: a single pre-shared 32-byte key seals the payload with
//!   XChaCha20-Poly1305;
//! - **asymmetric**: the payload is sealed once under a fresh content key,
//!   and that key is wrapped for every public key in a [`Keychain`] under a
//!   key derived from an ephemeral X25519 exchange. Whoever holds a listed
//!   secret key can open; everyone else fails authentication.

use std::collections::HashMap;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CryptoError, CryptoResult};

const MAGIC: &[u8; 4] = b"SDXE";
const VERSION: u8 = 1;
const MODE_SYMMETRIC: u8 = 1;
const MODE_ASYMMETRIC: u8 = 2;
const NONCE_LEN: usize = 24;

const WRAP_CONTEXT: &str = "sealdex envelope v1 content-key wrap";
// Wrap keys are unique per envelope (fresh ephemeral exchange), so the wrap
// nonce can be fixed.
const WRAP_NONCE: [u8; NONCE_LEN] = [0u8; NONCE_LEN];

/// X25519 public half of an envelope identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// X25519 secret half; zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn public_key(&self) -> PublicKey {
        let secret = x25519_dalek::StaticSecret::from(self.0);
        PublicKey(x25519_dalek::PublicKey::from(&secret).to_bytes())
    }
}

/// Generate a fresh envelope identity.
pub fn generate_keypair() -> (PublicKey, SecretKey) {
    let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
    let public = x25519_dalek::PublicKey::from(&secret);
    (PublicKey(public.to_bytes()), SecretKey(secret.to_bytes()))
}

/// Named key material for asymmetric envelopes.
#[derive(Default, Clone)]
pub struct Keychain {
    pub private: HashMap<String, SecretKey>,
    pub public: HashMap<String, PublicKey>,
}

impl Keychain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_public(&mut self, name: impl Into<String>, key: PublicKey) {
        self.public.insert(name.into(), key);
    }

    pub fn add_private(&mut self, name: impl Into<String>, key: SecretKey) {
        self.private.insert(name.into(), key);
    }

    /// Generate a keypair under `name`, keeping both halves.
    pub fn generate(&mut self, name: &str) -> PublicKey {
        let (public, secret) = generate_keypair();
        self.private.insert(name.to_string(), secret);
        self.public.insert(name.to_string(), public.clone());
        public
    }
}

enum SealMode {
    Symmetric(Zeroizing<[u8; 32]>),
    Asymmetric(Keychain),
}

/// Seals payloads for one or many recipients.
pub struct Encrypter {
    mode: SealMode,
}

impl Encrypter {
    pub fn symmetric(key: [u8; 32]) -> Self {
        Self {
            mode: SealMode::Symmetric(Zeroizing::new(key)),
        }
    }

    pub fn asymmetric(keychain: Keychain) -> Self {
        Self {
            mode: SealMode::Asymmetric(keychain),
        }
    }

    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.seal_excluding(plaintext, &[])
    }

    /// Seal, omitting the named recipients (asymmetric mode only).
    pub fn seal_excluding(&self, plaintext: &[u8], exclude: &[&str]) -> CryptoResult<Vec<u8>> {
        match &self.mode {
            SealMode::Symmetric(key) => seal_symmetric(key, plaintext),
            SealMode::Asymmetric(keychain) => seal_asymmetric(keychain, plaintext, exclude),
        }
    }
}

enum OpenMode {
    Symmetric(Zeroizing<[u8; 32]>),
    Asymmetric { name: String, secret: SecretKey },
}

/// Opens envelopes addressed to one identity.
pub struct Decrypter {
    mode: OpenMode,
}

impl Decrypter {
    pub fn symmetric(key: [u8; 32]) -> Self {
        Self {
            mode: OpenMode::Symmetric(Zeroizing::new(key)),
        }
    }

    pub fn asymmetric(name: impl Into<String>, secret: SecretKey) -> Self {
        Self {
            mode: OpenMode::Asymmetric {
                name: name.into(),
                secret,
            },
        }
    }

    pub fn open(&self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        let (mode, body) = parse_header(sealed)?;
        match (&self.mode, mode) {
            (OpenMode::Symmetric(key), MODE_SYMMETRIC) => open_symmetric(key, body),
            (OpenMode::Asymmetric { name, secret }, MODE_ASYMMETRIC) => {
                open_asymmetric(name, secret, body)
            }
            _ => Err(CryptoError::Malformed(
                "envelope mode does not match decrypter".into(),
            )),
        }
    }
}

fn seal_symmetric(key: &[u8; 32], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let aead = XChaCha20Poly1305::new(key.into());
    let ciphertext = aead
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| CryptoError::Encryption("payload seal failed".into()))?;

    let mut out = header(MODE_SYMMETRIC);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open_symmetric(key: &[u8; 32], body: &[u8]) -> CryptoResult<Vec<u8>> {
    if body.len() < NONCE_LEN {
        return Err(CryptoError::Malformed("missing nonce".into()));
    }
    let (nonce, ciphertext) = body.split_at(NONCE_LEN);
    XChaCha20Poly1305::new(key.into())
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication("payload rejected".into()))
}

fn seal_asymmetric(keychain: &Keychain, plaintext: &[u8], exclude: &[&str]) -> CryptoResult<Vec<u8>> {
    let mut recipients: Vec<(&String, &PublicKey)> = keychain
        .public
        .iter()
        .filter(|(name, _)| !exclude.contains(&name.as_str()))
        .collect();
    recipients.sort_by(|a, b| a.0.cmp(b.0));
    if recipients.is_empty() {
        return Err(CryptoError::NoRecipients);
    }

    let mut content_key = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(content_key.as_mut());

    let ephemeral = x25519_dalek::StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);

    let mut out = header(MODE_ASYMMETRIC);
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&(recipients.len() as u16).to_be_bytes());

    for (name, public) in recipients {
        let wrap_key = wrap_key(&ephemeral, public)?;
        let wrapped = XChaCha20Poly1305::new((&wrap_key).into())
            .encrypt((&WRAP_NONCE).into(), content_key.as_slice())
            .map_err(|_| CryptoError::Encryption(format!("key wrap failed for {name}")))?;

        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&(wrapped.len() as u16).to_be_bytes());
        out.extend_from_slice(&wrapped);
    }

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = XChaCha20Poly1305::new((&*content_key).into())
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| CryptoError::Encryption("payload seal failed".into()))?;

    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open_asymmetric(name: &str, secret: &SecretKey, body: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut cursor = body;
    let ephemeral: [u8; 32] = take(&mut cursor, 32)?
        .try_into()
        .map_err(|_| CryptoError::Malformed("short ephemeral key".into()))?;
    let count = u16::from_be_bytes(
        take(&mut cursor, 2)?
            .try_into()
            .map_err(|_| CryptoError::Malformed("short recipient count".into()))?,
    );

    let mut wrapped = None;
    for _ in 0..count {
        let name_len = u16::from_be_bytes(
            take(&mut cursor, 2)?
                .try_into()
                .map_err(|_| CryptoError::Malformed("short name length".into()))?,
        ) as usize;
        let entry_name = take(&mut cursor, name_len)?;
        let wrapped_len = u16::from_be_bytes(
            take(&mut cursor, 2)?
                .try_into()
                .map_err(|_| CryptoError::Malformed("short wrap length".into()))?,
        ) as usize;
        let entry = take(&mut cursor, wrapped_len)?;
        if entry_name == name.as_bytes() {
            wrapped = Some(entry);
        }
    }
    let wrapped = wrapped.ok_or_else(|| CryptoError::UnknownRecipient(name.to_string()))?;

    let static_secret = x25519_dalek::StaticSecret::from(secret.0);
    let shared = static_secret.diffie_hellman(&x25519_dalek::PublicKey::from(ephemeral));
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey("non-contributory exchange".into()));
    }
    let wrap_key = blake3::derive_key(WRAP_CONTEXT, shared.as_bytes());

    let content_key = XChaCha20Poly1305::new((&wrap_key).into())
        .decrypt((&WRAP_NONCE).into(), wrapped)
        .map_err(|_| CryptoError::Authentication("key unwrap rejected".into()))?;
    let content_key: [u8; 32] = content_key
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::Malformed("content key length".into()))?;
    let content_key = Zeroizing::new(content_key);

    if cursor.len() < NONCE_LEN {
        return Err(CryptoError::Malformed("missing nonce".into()));
    }
    let (nonce, ciphertext) = cursor.split_at(NONCE_LEN);
    XChaCha20Poly1305::new((&*content_key).into())
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication("payload rejected".into()))
}

fn wrap_key(
    ephemeral: &x25519_dalek::StaticSecret,
    public: &PublicKey,
) -> CryptoResult<[u8; 32]> {
    let shared = ephemeral.diffie_hellman(&x25519_dalek::PublicKey::from(public.0));
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey("non-contributory exchange".into()));
    }
    Ok(blake3::derive_key(WRAP_CONTEXT, shared.as_bytes()))
}

fn header(mode: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(6);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(mode);
    out
}

fn parse_header(sealed: &[u8]) -> CryptoResult<(u8, &[u8])> {
    if sealed.len() < 6 {
        return Err(CryptoError::Malformed("envelope too short".into()));
    }
    if &sealed[..4] != MAGIC {
        return Err(CryptoError::Malformed("bad magic".into()));
    }
    if sealed[4] != VERSION {
        return Err(CryptoError::Malformed(format!(
            "unsupported version: {}",
            sealed[4]
        )));
    }
    Ok((sealed[5], &sealed[6..]))
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> CryptoResult<&'a [u8]> {
    if cursor.len() < n {
        return Err(CryptoError::Malformed("truncated envelope".into()));
    }
    let (head, rest) = cursor.split_at(n);
    *cursor = rest;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keychain_with(names: &[&str]) -> Keychain {
        let mut keychain = Keychain::new();
        for name in names {
            keychain.generate(name);
        }
        keychain
    }

    #[test]
    fn symmetric_roundtrip() {
        let encrypter = Encrypter::symmetric([5u8; 32]);
        let decrypter = Decrypter::symmetric([5u8; 32]);

        let sealed = encrypter.seal(b"shared-key payload").unwrap();
        assert_eq!(decrypter.open(&sealed).unwrap(), b"shared-key payload");
    }

    #[test]
    fn symmetric_wrong_key_fails() {
        let sealed = Encrypter::symmetric([5u8; 32]).seal(b"payload").unwrap();
        let result = Decrypter::symmetric([6u8; 32]).open(&sealed);
        assert!(matches!(result, Err(CryptoError::Authentication(_))));
    }

    #[test]
    fn every_listed_recipient_can_open() {
        let keychain = keychain_with(&["alice", "bob", "carol"]);
        let sealed = Encrypter::asymmetric(keychain.clone())
            .seal(b"for the group")
            .unwrap();

        for name in ["alice", "bob", "carol"] {
            let secret = keychain.private[name].clone();
            let opened = Decrypter::asymmetric(name, secret).open(&sealed).unwrap();
            assert_eq!(opened, b"for the group");
        }
    }

    #[test]
    fn excluded_recipient_cannot_open() {
        let keychain = keychain_with(&["alice", "server"]);
        let sealed = Encrypter::asymmetric(keychain.clone())
            .seal_excluding(b"not for the server", &["server"])
            .unwrap();

        let server_secret = keychain.private["server"].clone();
        let result = Decrypter::asymmetric("server", server_secret).open(&sealed);
        assert!(matches!(result, Err(CryptoError::UnknownRecipient(_))));

        let alice_secret = keychain.private["alice"].clone();
        let opened = Decrypter::asymmetric("alice", alice_secret)
            .open(&sealed)
            .unwrap();
        assert_eq!(opened, b"not for the server");
    }

    #[test]
    fn excluding_everyone_is_an_error() {
        let keychain = keychain_with(&["alice"]);
        let result = Encrypter::asymmetric(keychain).seal_excluding(b"void", &["alice"]);
        assert!(matches!(result, Err(CryptoError::NoRecipients)));
    }

    #[test]
    fn wrong_secret_fails_authentication() {
        let keychain = keychain_with(&["alice"]);
        let sealed = Encrypter::asymmetric(keychain).seal(b"payload").unwrap();

        let (_, intruder) = generate_keypair();
        let result = Decrypter::asymmetric("alice", intruder).open(&sealed);
        assert!(matches!(result, Err(CryptoError::Authentication(_))));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let keychain = keychain_with(&["alice"]);
        let secret = keychain.private["alice"].clone();
        let mut sealed = Encrypter::asymmetric(keychain).seal(b"payload").unwrap();

        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        let result = Decrypter::asymmetric("alice", secret).open(&sealed);
        assert!(matches!(result, Err(CryptoError::Authentication(_))));
    }

    #[test]
    fn truncated_envelope_is_malformed() {
        let keychain = keychain_with(&["alice"]);
        let secret = keychain.private["alice"].clone();
        let sealed = Encrypter::asymmetric(keychain).seal(b"payload").unwrap();

        let result = Decrypter::asymmetric("alice", secret).open(&sealed[..10]);
        assert!(matches!(result, Err(CryptoError::Malformed(_))));
    }

    #[test]
    fn mode_mismatch_is_malformed() {
        let sealed = Encrypter::symmetric([5u8; 32]).seal(b"payload").unwrap();
        let (_, secret) = generate_keypair();
        let result = Decrypter::asymmetric("alice", secret).open(&sealed);
        assert!(matches!(result, Err(CryptoError::Malformed(_))));
    }

    #[test]
    fn secret_key_roundtrips_public_half() {
        let (public, secret) = generate_keypair();
        assert_eq!(secret.public_key(), public);
    }
}
