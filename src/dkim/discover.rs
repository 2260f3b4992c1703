//! Concurrent selector probing across a catalog of common DKIM selectors.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::{resolve_public_key, DkimKeyRecord};
use crate::common::dns::DnsResolver;

/// Selector names commonly published by mail providers, probed in catalog
/// order when no selector is known for a domain.
pub const SELECTOR_CATALOG: &[&str] = &[
    "google",
    "default",
    "mail",
    "smtpapi",
    "dkim",
    "200608",
    "20230601",
    "20221208",
    "20210112",
    "dkim-201406",
    "1a1hai",
    "v1",
    "v2",
    "v3",
    "k1",
    "k2",
    "k3",
    "hs1",
    "hs2",
    "s1",
    "s2",
    "s3",
    "sig1",
    "sig2",
    "sig3",
    "selector",
    "selector1",
    "selector2",
    "mindbox",
    "bk",
    "sm1",
    "sm2",
    "gmail",
    "10dkim1",
    "11dkim1",
    "12dkim1",
    "memdkim",
    "m1",
    "mx",
    "sel1",
    "scph1220",
    "ml",
    "pps1",
    "scph0819",
    "skiff1",
    "s1024",
    "dkim-202308",
];

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Selector discovery across domains.
///
/// Each selector probe is an independent DNS round trip; probes for one
/// domain run concurrently, bounded by a semaphore so a large catalog does
/// not overwhelm the resolver. A probe that fails or exceeds its timeout is
/// recorded as absence for that selector only — any subset of probes
/// failing never fails the batch.
#[derive(Clone)]
pub struct KeyDiscovery<R: DnsResolver> {
    resolver: R,
    selectors: Vec<String>,
    probe_timeout: Duration,
    max_in_flight: usize,
}

impl<R: DnsResolver> KeyDiscovery<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            selectors: SELECTOR_CATALOG.iter().map(|s| s.to_string()).collect(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit.max(1);
        self
    }

    /// Override the selector catalog.
    pub fn selectors(mut self, selectors: Vec<String>) -> Self {
        self.selectors = selectors;
        self
    }

    /// Probe every catalog selector for every domain.
    ///
    /// Returns one entry per domain; a domain whose probes all fail maps to
    /// an empty list. Keys found for a domain are deduplicated by modulus
    /// (first hit wins, so a domain that rotates selector names but reuses
    /// keys contributes one entry per distinct key). Order within a domain
    /// reflects probe completion order and is not stable across runs.
    pub async fn discover(&self, domains: &[String]) -> BTreeMap<String, Vec<DkimKeyRecord>> {
        let mut out = BTreeMap::new();
        for domain in domains {
            let records = self.discover_domain(domain).await;
            info!(domain, keys = records.len(), "selector probing finished");
            out.insert(domain.clone(), records);
        }
        out
    }

    async fn discover_domain(&self, domain: &str) -> Vec<DkimKeyRecord> {
        let limiter = Arc::new(Semaphore::new(self.max_in_flight));
        let mut probes = JoinSet::new();

        for selector in &self.selectors {
            let resolver = self.resolver.clone();
            let limiter = Arc::clone(&limiter);
            let domain = domain.to_string();
            let selector = selector.clone();
            let timeout = self.probe_timeout;

            probes.spawn(async move {
                let _permit = limiter.acquire_owned().await.ok()?;
                match tokio::time::timeout(
                    timeout,
                    resolve_public_key(&resolver, &domain, &selector),
                )
                .await
                {
                    Ok(result) => result.map(|modulus| (selector, modulus)),
                    Err(_) => {
                        debug!(domain, selector, "selector probe timed out");
                        None
                    }
                }
            });
        }

        // Per-task results are merged here rather than mutating shared
        // state from the probe tasks.
        let mut records: Vec<DkimKeyRecord> = Vec::new();
        while let Some(joined) = probes.join_next().await {
            if let Ok(Some((selector, modulus))) = joined {
                if records.iter().any(|r| r.modulus == modulus) {
                    debug!(domain, selector, "duplicate key, keeping first-seen selector");
                    continue;
                }
                records.push(DkimKeyRecord {
                    domain: domain.to_string(),
                    selector,
                    modulus,
                });
            }
        }
        records
    }
}
