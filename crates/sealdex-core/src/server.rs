//! Untrusted-server side: domain storage, query answering, update rule.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::client::{Query, SecureEntry, SecureIndex};
use crate::error::{CoreError, CoreResult};
use crate::keyring::SORTING;

/// Stores one secure index per domain and answers trapdoor queries.
///
/// The server only ever sees bucket keys and OPSE counts; ranking works
/// because the OPSE map preserves the order of the true counts.
pub struct Server {
    index: IndexMap<String, SecureIndex>,
}

impl Server {
    /// Start from a snapshot (possibly empty).
    pub fn new(snapshot: IndexMap<String, SecureIndex>) -> Self {
        Self { index: snapshot }
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn get(&self, domain: &str) -> Option<&SecureIndex> {
        self.index.get(domain)
    }

    /// Answer a query.
    ///
    /// Domains are visited in query order; a domain the server does not hold
    /// aborts the whole search. The first bucket hit per document wins, and
    /// the result ranks descending by the stored OPSE count (ties keep
    /// encounter order). Misses are indistinguishable from filler lookups
    /// and contribute nothing.
    pub fn search(&self, query: &Query) -> CoreResult<Vec<SecureEntry>> {
        let mut hits: Vec<SecureEntry> = Vec::new();
        for (domain, trapdoors) in query {
            let record = self
                .index
                .get(domain)
                .ok_or_else(|| CoreError::UnknownDomain(domain.clone()))?;
            for trapdoor in trapdoors {
                if let Some(entry) = record.index.get(trapdoor) {
                    if !hits.iter().any(|hit| hit.0 == entry.0) {
                        hits.push(entry.clone());
                    }
                }
            }
        }
        hits.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(hits)
    }

    /// Install `index` under `domain`, dropping every domain listed in
    /// `reps`.
    ///
    /// Any other live domain holding at least as many documents blocks the
    /// update with a merge request, so a client cannot silently shrink what
    /// the server already indexed.
    pub fn update(&mut self, domain: &str, index: SecureIndex, reps: &[&str]) -> CoreResult<()> {
        if domain == SORTING {
            return Err(CoreError::ReservedDomain(domain.to_string()));
        }
        for (name, record) in &self.index {
            if reps.contains(&name.as_str()) {
                continue;
            }
            if name == domain || index.docs.len() <= record.docs.len() {
                warn!(domain, existing = %name, "update blocked, merge required");
                return Err(CoreError::MergeRequired {
                    domain: name.clone(),
                    docs: record.docs.clone(),
                });
            }
        }
        for rep in reps {
            self.index.shift_remove(*rep);
        }
        debug!(
            domain,
            docs = index.docs.len(),
            buckets = index.index.len(),
            "domain installed"
        );
        self.index.insert(domain.to_string(), index);
        Ok(())
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(IndexMap::new())
    }
}
