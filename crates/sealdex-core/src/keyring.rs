//! Client keyring: per-domain index keys plus the shared sorting key.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::{json, Map, Value};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CoreError, CoreResult};

/// Reserved keyring entry holding the OPSE sorting key.
pub const SORTING: &str = "sorting";

/// 32-byte key protecting one domain's bucket map.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DomainKey([u8; 32]);

impl DomainKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// 32-byte OPSE key shared by every domain of one keyring.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SortingKey([u8; 32]);

impl SortingKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// One keyring row: how many documents the domain indexed, and its key.
#[derive(Clone)]
pub struct DomainEntry {
    pub doc_count: usize,
    pub key: DomainKey,
}

/// Mapping of domain name → key material, plus the reserved sorting key.
///
/// The sorting key is shared by every domain in the ring so OPSE counts stay
/// globally comparable; it is created with the ring and lives as long as any
/// domain does.
#[derive(Clone)]
pub struct Keyring {
    sorting: SortingKey,
    domains: IndexMap<String, DomainEntry>,
}

impl Keyring {
    /// Fresh keyring with a new sorting key and no domains.
    pub fn generate() -> Self {
        Self {
            sorting: SortingKey::generate(),
            domains: IndexMap::new(),
        }
    }

    pub fn sorting(&self) -> &SortingKey {
        &self.sorting
    }

    pub fn get(&self, domain: &str) -> Option<&DomainEntry> {
        self.domains.get(domain)
    }

    pub fn domains(&self) -> impl Iterator<Item = (&str, &DomainEntry)> {
        self.domains.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn insert(&mut self, domain: &str, entry: DomainEntry) -> CoreResult<()> {
        if domain == SORTING {
            return Err(CoreError::ReservedDomain(domain.to_string()));
        }
        self.domains.insert(domain.to_string(), entry);
        Ok(())
    }

    pub fn remove(&mut self, domain: &str) -> Option<DomainEntry> {
        self.domains.shift_remove(domain)
    }

    /// Install every entry of `other`, sorting key included.
    pub fn absorb(&mut self, other: Keyring) {
        self.sorting = other.sorting;
        for (domain, entry) in other.domains {
            self.domains.insert(domain, entry);
        }
    }

    /// Flat transport shape:
    /// `{"sorting": "<b64>", "<domain>": [docCount, "<b64 key>"], …}`.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(SORTING.to_string(), json!(BASE64.encode(self.sorting.as_bytes())));
        for (domain, entry) in &self.domains {
            map.insert(
                domain.clone(),
                json!([entry.doc_count, BASE64.encode(entry.key.as_bytes())]),
            );
        }
        Value::Object(map)
    }

    pub fn from_json(value: &Value) -> CoreResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| CoreError::KeyringTransport("keyring is not an object".into()))?;

        let sorting = object
            .get(SORTING)
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::KeyringTransport("missing sorting key".into()))?;
        let sorting = SortingKey::from_bytes(decode_key(sorting)?);

        let mut domains = IndexMap::new();
        for (domain, entry) in object {
            if domain == SORTING {
                continue;
            }
            let row = entry.as_array().filter(|row| row.len() == 2).ok_or_else(|| {
                CoreError::KeyringTransport(format!("bad entry for domain {domain}"))
            })?;
            let doc_count = row[0].as_u64().ok_or_else(|| {
                CoreError::KeyringTransport(format!("bad document count for {domain}"))
            })? as usize;
            let key = row[1].as_str().ok_or_else(|| {
                CoreError::KeyringTransport(format!("bad key encoding for {domain}"))
            })?;
            domains.insert(
                domain.clone(),
                DomainEntry {
                    doc_count,
                    key: DomainKey::from_bytes(decode_key(key)?),
                },
            );
        }

        Ok(Self { sorting, domains })
    }
}

fn decode_key(encoded: &str) -> CoreResult<[u8; 32]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| CoreError::KeyringTransport(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CoreError::KeyringTransport("key is not 32 bytes".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Keyring {
        let mut ring = Keyring::generate();
        ring.insert(
            "reports",
            DomainEntry {
                doc_count: 3,
                key: DomainKey::generate(),
            },
        )
        .unwrap();
        ring.insert(
            "mail",
            DomainEntry {
                doc_count: 1,
                key: DomainKey::generate(),
            },
        )
        .unwrap();
        ring
    }

    #[test]
    fn sorting_name_is_reserved() {
        let mut ring = Keyring::generate();
        let result = ring.insert(
            SORTING,
            DomainEntry {
                doc_count: 1,
                key: DomainKey::generate(),
            },
        );
        assert!(matches!(result, Err(CoreError::ReservedDomain(_))));
    }

    #[test]
    fn json_roundtrip_preserves_material() {
        let ring = sample();
        let restored = Keyring::from_json(&ring.to_json()).unwrap();

        assert_eq!(restored.sorting.as_bytes(), ring.sorting.as_bytes());
        assert_eq!(restored.len(), 2);
        for (domain, entry) in ring.domains() {
            let other = restored.get(domain).unwrap();
            assert_eq!(other.doc_count, entry.doc_count);
            assert_eq!(other.key.as_bytes(), entry.key.as_bytes());
        }
    }

    #[test]
    fn absorb_overwrites_sorting_and_merges_domains() {
        let mut mine = Keyring::generate();
        mine.insert(
            "local",
            DomainEntry {
                doc_count: 9,
                key: DomainKey::generate(),
            },
        )
        .unwrap();

        let theirs = sample();
        let their_sorting = *theirs.sorting.as_bytes();
        mine.absorb(theirs);

        assert_eq!(mine.sorting.as_bytes(), &their_sorting);
        assert_eq!(mine.len(), 3);
        assert!(mine.get("local").is_some());
        assert!(mine.get("reports").is_some());
    }

    #[test]
    fn malformed_transport_is_rejected() {
        assert!(Keyring::from_json(&json!("nope")).is_err());
        assert!(Keyring::from_json(&json!({})).is_err());
        assert!(Keyring::from_json(&json!({ "sorting": "AAAA" })).is_err());
    }
}
