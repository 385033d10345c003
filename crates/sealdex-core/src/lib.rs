//! Searchable symmetric encryption over outsourced inverted indexes.
//!
//! A [`Client`] turns document sketches (built by the streaming [`Indexer`])
//! into padded, shuffled secure indexes that an untrusted [`Server`] stores
//! and answers keyword queries against, using deterministic trapdoors. The
//! server learns neither the keywords nor, up to padding, the true posting
//! counts; ranking still works because counts are encrypted with an
//! order-preserving map. The [`multiuser`] layer wraps queries under an
//! owner-minted state key so additional readers can search, and rotating the
//! state revokes them.
//!
//! ## Example
//!
//! ```rust
//! use sealdex_core::{Client, Indexer, Server};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut indexer = Indexer::new("doc1");
//! indexer.push(b"Hello, hello WORLD");
//! let sketch = indexer.finish();
//!
//! let mut client = Client::new();
//! let index = client.secure_index("reports", 100, &[sketch])?;
//!
//! let mut server = Server::default();
//! server.update("reports", index, &[])?;
//!
//! let hits = server.search(&client.create_query("world"))?;
//! assert_eq!(hits[0].0, "doc1");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod indexer;
pub mod keyring;
pub mod multiuser;
pub mod server;

pub use client::{Client, Query, SecureEntry, SecureIndex};
pub use error::{CoreError, CoreResult};
pub use indexer::{DocumentSketch, Indexer};
pub use keyring::{DomainEntry, DomainKey, Keyring, SortingKey, SORTING};
pub use multiuser::{MultiUserClient, MultiUserServer};
pub use server::Server;
