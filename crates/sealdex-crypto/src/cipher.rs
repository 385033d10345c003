//! Deterministic AES modes with a pinned key-to-IV convention.
//!
//! Trapdoors must be reproducible by every party holding the same key, so
//! both modes derive their IV from the key itself:
//! `iv = sha256(IV_SALT || key)[..16]`. Changing the salt or the derivation
//! breaks every stored index.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit, StreamCipher};
use aes::Aes256;

use crate::hash::{chain, HashAlg};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const IV_SALT: &[u8] = b"sealdex.derive.iv.v1";

/// Fixed IV for `key`.
pub fn derive_iv(key: &[u8; 32]) -> [u8; 16] {
    let mut input = Vec::with_capacity(IV_SALT.len() + key.len());
    input.extend_from_slice(IV_SALT);
    input.extend_from_slice(key);
    let digest = chain(&input, 1, HashAlg::Sha256);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&digest[..16]);
    iv
}

/// AES-256-CBC with PKCS#7 padding under the derived IV.
///
/// Deterministic in `(key, plaintext)`.
pub fn cbc_encrypt(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let iv = derive_iv(key);
    Aes256CbcEnc::new(key.into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// AES-256-CTR keystream under the derived IV; applying twice restores `buf`.
pub fn ctr_apply(key: &[u8; 32], buf: &mut [u8]) {
    let iv = derive_iv(key);
    Aes256Ctr::new(key.into(), (&iv).into()).apply_keystream(buf);
}
