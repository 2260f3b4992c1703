use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("NXDOMAIN: domain does not exist")]
    NxDomain,
    #[error("SERVFAIL: server failure")]
    ServFail,
    #[error("timeout")]
    Timeout,
    #[error("DNS error: {0}")]
    Other(String),
}

/// DNS resolver trait for abstracting TXT lookups.
///
/// TXT is the only record type this crate needs: DKIM keys are published
/// as TXT records under `<selector>._domainkey.<domain>`.
///
/// Each returned string is one TXT record, with the record's
/// character-strings concatenated. A name with several TXT records yields
/// several entries; implementations must not merge records together.
pub trait DnsResolver: Clone + Send + Sync + 'static {
    fn query_txt(&self, name: &str) -> impl Future<Output = Result<Vec<String>, DnsError>> + Send;
}

/// Hickory DNS resolver implementation
#[derive(Clone)]
pub struct HickoryResolver {
    resolver: TokioResolver,
}

impl HickoryResolver {
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let resolver = TokioResolver::builder_with_config(
            ResolverConfig::default(),
            TokioConnectionProvider::default(),
        )
        .build();
        Ok(Self { resolver })
    }

    /// Resolver against the system default servers with a per-query timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        Self::with_config(ResolverConfig::default(), opts)
    }

    pub fn with_config(
        config: ResolverConfig,
        opts: ResolverOpts,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let resolver = TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Ok(Self { resolver })
    }

    fn classify_error(e: &hickory_resolver::ResolveError) -> DnsError {
        let msg = e.to_string().to_lowercase();
        if msg.contains("nxdomain") || msg.contains("no records") {
            DnsError::NxDomain
        } else if msg.contains("timeout") {
            DnsError::Timeout
        } else if msg.contains("servfail") {
            DnsError::ServFail
        } else {
            DnsError::Other(e.to_string())
        }
    }
}

impl DnsResolver for HickoryResolver {
    async fn query_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => {
                let records: Vec<String> = lookup.iter().map(|txt| txt.to_string()).collect();
                debug!(name, count = records.len(), "TXT lookup succeeded");
                Ok(records)
            }
            Err(e) => {
                let err = Self::classify_error(&e);
                debug!(name, %err, "TXT lookup failed");
                Err(err)
            }
        }
    }
}

/// Mock DNS resolver for testing
#[derive(Clone, Default)]
pub struct MockResolver {
    txt_records: Arc<Mutex<HashMap<String, Vec<String>>>>,
    nxdomain: Arc<Mutex<Vec<String>>>,
    servfail: Arc<Mutex<Vec<String>>>,
    hanging: Arc<Mutex<Vec<String>>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_txt(&self, name: &str, records: Vec<String>) {
        self.txt_records.lock().unwrap().insert(name.to_lowercase(), records);
    }

    pub fn set_nxdomain(&self, name: &str) {
        self.nxdomain.lock().unwrap().push(name.to_lowercase());
    }

    pub fn set_servfail(&self, name: &str) {
        self.servfail.lock().unwrap().push(name.to_lowercase());
    }

    /// Make queries for `name` never complete. Used to exercise probe timeouts.
    pub fn set_hanging(&self, name: &str) {
        self.hanging.lock().unwrap().push(name.to_lowercase());
    }
}

impl DnsResolver for MockResolver {
    async fn query_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        let name_lower = name.to_lowercase();
        if self.hanging.lock().unwrap().contains(&name_lower) {
            std::future::pending::<()>().await;
        }
        if self.nxdomain.lock().unwrap().contains(&name_lower) {
            return Err(DnsError::NxDomain);
        }
        if self.servfail.lock().unwrap().contains(&name_lower) {
            return Err(DnsError::ServFail);
        }
        Ok(self.txt_records.lock().unwrap().get(&name_lower).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_resolver_txt() {
        let resolver = MockResolver::new();
        resolver.add_txt("sel1._domainkey.example.com", vec!["v=DKIM1; p=abc".to_string()]);

        let result = resolver.query_txt("sel1._domainkey.example.com").await.unwrap();
        assert_eq!(result, vec!["v=DKIM1; p=abc"]);
    }

    #[tokio::test]
    async fn mock_resolver_nxdomain() {
        let resolver = MockResolver::new();
        resolver.set_nxdomain("missing._domainkey.example.com");

        let result = resolver.query_txt("missing._domainkey.example.com").await;
        assert!(matches!(result, Err(DnsError::NxDomain)));
    }

    #[tokio::test]
    async fn mock_resolver_unknown_name_is_empty() {
        let resolver = MockResolver::new();
        let result = resolver.query_txt("other._domainkey.example.com").await.unwrap();
        assert!(result.is_empty());
    }
}
