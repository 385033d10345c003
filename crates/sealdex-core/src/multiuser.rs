//! State-gated multi-user layer over the single-user client and server.
//!
//! The owner mints a session state key and seals it to the current keychain;
//! the distribution list is the access-control list. Readers wrap every
//! trapdoor under the state key, and the server unwraps before delegating to
//! the inner search. Rotating the state revokes every reader left out of the
//! new envelope: their queries decrypt to buckets that do not exist.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use sealdex_crypto::cipher;
use sealdex_crypto::envelope::{Decrypter, Encrypter, Keychain, SecretKey};
use sealdex_crypto::CryptoError;

use crate::client::{Client, Query, SecureEntry};
use crate::error::{CoreError, CoreResult};
use crate::keyring::Keyring;
use crate::server::Server;

/// Client half of the multi-user extension.
///
/// One type serves both roles: owners mint states and pack keyrings,
/// readers install packed keyrings and wrap queries.
pub struct MultiUserClient {
    client: Client,
    keychain: Keychain,
    name: String,
    server_name: String,
    secret: SecretKey,
}

impl MultiUserClient {
    /// Wrap `client` for the identity `name`; `server_name` is the keychain
    /// entry that must never be able to open a packed keyring.
    pub fn new(
        client: Client,
        keychain: Keychain,
        name: impl Into<String>,
        server_name: impl Into<String>,
    ) -> CoreResult<Self> {
        let name = name.into();
        let secret = keychain
            .private
            .get(&name)
            .cloned()
            .ok_or_else(|| CryptoError::InvalidKey(format!("no private key for {name}")))?;
        Ok(Self {
            client,
            keychain,
            name,
            server_name: server_name.into(),
            secret,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Owner: mint a fresh session state sealed to every keychain member.
    pub fn state(&self) -> CoreResult<Vec<u8>> {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(key.as_mut());
        let sealed = Encrypter::asymmetric(self.keychain.clone()).seal(key.as_slice())?;
        debug!(recipients = self.keychain.public.len(), "minted session state");
        Ok(sealed)
    }

    /// Owner: pack the keyring for readers. The server is excluded, so it
    /// can store the blob but never open it.
    pub fn pack_keys(&self) -> CoreResult<Vec<u8>> {
        let json = serde_json::to_vec(&self.client.keyring().to_json())
            .map_err(|e| CoreError::KeyringTransport(e.to_string()))?;
        let sealed = Encrypter::asymmetric(self.keychain.clone())
            .seal_excluding(&json, &[self.server_name.as_str()])?;
        Ok(sealed)
    }

    /// Reader: install a packed keyring, sorting key included.
    pub fn unpack_keys(&mut self, packed: &[u8]) -> CoreResult<()> {
        let plain = self.decrypter().open(packed)?;
        let value: serde_json::Value = serde_json::from_slice(&plain)
            .map_err(|e| CoreError::KeyringTransport(e.to_string()))?;
        let ring = Keyring::from_json(&value)?;
        self.client.keyring_mut().absorb(ring);
        Ok(())
    }

    /// Reader: derive the inner query for `word` and wrap every trapdoor
    /// under the session state.
    pub fn create_query(&self, state: &[u8], word: &str) -> CoreResult<Query> {
        let key = open_state(&self.decrypter(), state)?;
        let mut query = Query::new();
        for (domain, trapdoors) in self.client.create_query(word) {
            let wrapped = trapdoors
                .iter()
                .map(|trapdoor| wrap_trapdoor(&key, trapdoor))
                .collect::<CoreResult<Vec<_>>>()?;
            query.insert(domain, wrapped);
        }
        Ok(query)
    }

    fn decrypter(&self) -> Decrypter {
        Decrypter::asymmetric(self.name.clone(), self.secret.clone())
    }
}

/// Server half of the multi-user extension: opens the state envelope and
/// unwraps trapdoors, then delegates to the inner [`Server`].
pub struct MultiUserServer {
    server: Server,
    name: String,
    secret: SecretKey,
    state: Option<Zeroizing<[u8; 32]>>,
}

impl MultiUserServer {
    pub fn new(server: Server, name: impl Into<String>, secret: SecretKey) -> Self {
        Self {
            server,
            name: name.into(),
            secret,
            state: None,
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Uploads and replacements flow through the inner server unchanged.
    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    /// Install a new session state. On failure the previous state stays.
    pub fn state(&mut self, sealed: &[u8]) -> CoreResult<()> {
        let decrypter = Decrypter::asymmetric(self.name.clone(), self.secret.clone());
        let key = open_state(&decrypter, sealed)?;
        self.state = Some(key);
        debug!("session state installed");
        Ok(())
    }

    /// Unwrap each trapdoor under the current state and search.
    ///
    /// Trapdoors wrapped under a previous state unwrap to well-formed keys
    /// that hit nothing.
    pub fn search(&self, query: &Query) -> CoreResult<Vec<SecureEntry>> {
        let key = self.state.as_ref().ok_or(CoreError::NoState)?;
        let mut inner = Query::new();
        for (domain, trapdoors) in query {
            let unwrapped = trapdoors
                .iter()
                .map(|trapdoor| wrap_trapdoor(key, trapdoor))
                .collect::<CoreResult<Vec<_>>>()?;
            inner.insert(domain.clone(), unwrapped);
        }
        self.server.search(&inner)
    }
}

fn open_state(decrypter: &Decrypter, sealed: &[u8]) -> CoreResult<Zeroizing<[u8; 32]>> {
    let plain = decrypter.open(sealed)?;
    let key: [u8; 32] = plain
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("state key must be 32 bytes".into()))?;
    Ok(Zeroizing::new(key))
}

/// CTR is self-inverse, so the same transform wraps and unwraps: decode the
/// base64 trapdoor, apply the keystream, re-encode.
fn wrap_trapdoor(key: &[u8; 32], trapdoor: &str) -> CoreResult<String> {
    let mut raw = BASE64
        .decode(trapdoor)
        .map_err(|e| CoreError::MalformedQuery(e.to_string()))?;
    cipher::ctr_apply(key, &mut raw);
    Ok(BASE64.encode(raw))
}
