//! Owner-side index building and query derivation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sealdex_crypto::cipher;
use sealdex_crypto::hash::sha256;
use sealdex_crypto::Opse;

use crate::error::{CoreError, CoreResult};
use crate::indexer::DocumentSketch;
use crate::keyring::{DomainEntry, DomainKey, Keyring, SORTING};

/// Bucket payload: document id plus the OPSE image of its count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureEntry(pub String, pub u64);

/// Padded, shuffled, encrypted posting map for one domain.
///
/// `index` enumerates buckets in the shuffled build order; that order is
/// part of the format and survives serialisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureIndex {
    pub docs: Vec<String>,
    pub index: IndexMap<String, SecureEntry>,
}

/// Keyword query: every known domain, one trapdoor per document slot.
pub type Query = IndexMap<String, Vec<String>>;

/// Staircase thresholds over the maximum document size…
const PAD_STEPS: [u64; 3] = [256, 131072, 50331648];
/// …and the bucket count each tier contributes.
const PAD_BUCKETS: [u64; 3] = [256, 65536, 16777216];

/// Modulus for filler dummy counts.
const FILLER_COUNT_MOD: u64 = 131072;

/// Data owner: holds the keyring, builds secure indexes, derives queries.
pub struct Client {
    keyring: Keyring,
}

impl Client {
    /// Fresh client with a new keyring (and sorting key).
    pub fn new() -> Self {
        Self {
            keyring: Keyring::generate(),
        }
    }

    /// Rebuild a client around existing key material.
    pub fn with_keyring(keyring: Keyring) -> Self {
        Self { keyring }
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    pub(crate) fn keyring_mut(&mut self) -> &mut Keyring {
        &mut self.keyring
    }

    /// Build the padded, shuffled secure index for `domain`.
    ///
    /// `max` is the largest document size in bytes among the sketches; it
    /// alone determines the bucket total, so indexes built from equally
    /// bounded corpora are indistinguishable by size.
    pub fn secure_index(
        &mut self,
        domain: &str,
        max: u64,
        sketches: &[DocumentSketch],
    ) -> CoreResult<SecureIndex> {
        if domain == SORTING {
            return Err(CoreError::ReservedDomain(domain.to_string()));
        }
        if sketches.is_empty() {
            return Err(CoreError::NoSketches);
        }
        let target = padding_target(max)?;
        let key = DomainKey::generate();

        let mut docs: Vec<String> = Vec::new();
        let mut inverted: IndexMap<&str, Vec<(&str, u64)>> = IndexMap::new();
        for sketch in sketches {
            if !docs.iter().any(|id| id == &sketch.id) {
                docs.push(sketch.id.clone());
            }
            for (word, count) in &sketch.list {
                inverted
                    .entry(word.as_str())
                    .or_default()
                    .push((sketch.id.as_str(), *count));
            }
        }

        let opse = Opse::new(self.keyring.sorting().as_bytes());
        let mut sindex: IndexMap<String, SecureEntry> = IndexMap::new();
        for (word, postings) in &inverted {
            for (slot, (id, count)) in postings.iter().enumerate() {
                let bucket = derive_trapdoor(&key, word, slot as u32);
                sindex.insert(bucket, SecureEntry((*id).to_string(), opse.encrypt(*count)));
            }
        }

        for id in &docs {
            let stored = sindex.values().filter(|entry| &entry.0 == id).count() as u64;
            if target <= stored + 1 {
                continue;
            }
            for counter in (1..target - stored).rev() {
                let (bucket, dummy) = filler_bucket(&key, docs.len() as u64 + counter);
                sindex.insert(bucket, SecureEntry(id.clone(), dummy));
            }
        }

        let index = shuffle(sindex);
        self.keyring.insert(
            domain,
            DomainEntry {
                doc_count: docs.len(),
                key,
            },
        )?;

        debug!(domain, docs = docs.len(), buckets = index.len(), "built secure index");
        Ok(SecureIndex { docs, index })
    }

    /// Derive trapdoors for `word` across every domain in the keyring, so
    /// the server cannot tell which domain the query is really for.
    pub fn create_query(&self, word: &str) -> Query {
        let mut query = Query::new();
        for (domain, entry) in self.keyring.domains() {
            let trapdoors = (0..entry.doc_count as u32)
                .map(|slot| derive_trapdoor(&entry.key, word, slot))
                .collect();
            query.insert(domain.to_string(), trapdoors);
        }
        query
    }

    /// Forget the listed domains locally; server copies stay until replaced.
    pub fn outdate(&mut self, domains: &[&str]) {
        for domain in domains {
            self.keyring.remove(domain);
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic bucket key for `(word, slot)` under a domain key.
///
/// The word is truncated to 28 bytes and right-aligned in a zeroed block
/// whose tail carries the big-endian slot; the SHA-256 digest of the block
/// is CBC-encrypted and the first 32 ciphertext bytes become the key.
fn derive_trapdoor(key: &DomainKey, word: &str, slot: u32) -> String {
    let bytes = word.as_bytes();
    let take = bytes.len().min(28);
    let mut block = [0u8; 32];
    block[28 - take..28].copy_from_slice(&bytes[..take]);
    block[28..].copy_from_slice(&slot.to_be_bytes());

    let ciphertext = cipher::cbc_encrypt(key.as_bytes(), &sha256(&block));
    BASE64.encode(&ciphertext[..32])
}

/// Filler bucket for one counter value: bucket key plus a raw dummy count.
///
/// Filler blocks carry only the counter, so they can never collide with a
/// real trapdoor, whose block always holds at least one word byte.
fn filler_bucket(key: &DomainKey, counter: u64) -> (String, u64) {
    let mut block = [0u8; 32];
    block[28..].copy_from_slice(&(counter as u32).to_be_bytes());

    let mut plaintext = sha256(&block).to_vec();
    plaintext.extend_from_slice(&[0u8; 4]);
    let ciphertext = cipher::cbc_encrypt(key.as_bytes(), &plaintext);

    let bucket = BASE64.encode(&ciphertext[..32]);
    let dummy = u64::from(u32::from_be_bytes([
        ciphertext[32],
        ciphertext[33],
        ciphertext[34],
        ciphertext[35],
    ])) % FILLER_COUNT_MOD;
    (bucket, dummy)
}

/// Bucket target for `max`: the staircase coarsens the true size so only
/// the tier is visible.
fn padding_target(max: u64) -> CoreResult<u64> {
    let mut threshold = 0u64;
    let mut sum = 0u64;
    let mut tier = 0usize;
    while threshold <= max {
        if tier == PAD_STEPS.len() {
            return Err(CoreError::DocumentTooLarge(max));
        }
        threshold += PAD_STEPS[tier];
        sum += PAD_BUCKETS[tier];
        tier += 1;
    }
    threshold -= PAD_STEPS[tier - 1];
    Ok(sum + (max - threshold) / tier as u64)
}

/// Rebuild the bucket map in a uniformly random enumeration order.
fn shuffle(mut map: IndexMap<String, SecureEntry>) -> IndexMap<String, SecureEntry> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    let mut rng = OsRng;
    for i in (1..keys.len()).rev() {
        let j = random_index(&mut rng, i + 1);
        keys.swap(i, j);
    }

    let mut out = IndexMap::with_capacity(map.len());
    for key in keys {
        if let Some(entry) = map.swap_remove(&key) {
            out.insert(key, entry);
        }
    }
    out
}

/// Unbiased index in `[0, len)`: read the smallest byte width covering
/// `len` as a zero-padded little-endian word, resampling on overflow.
fn random_index(rng: &mut impl RngCore, len: usize) -> usize {
    debug_assert!(len > 0);
    let mut width = 1;
    while 1u64 << (8 * width) < len as u64 {
        width += 1;
    }
    let mut word = [0u8; 4];
    loop {
        word.fill(0);
        rng.fill_bytes(&mut word[..width]);
        let value = u32::from_le_bytes(word) as usize;
        if value < len {
            return value;
        }
    }
}
