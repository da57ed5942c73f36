//! Reverse DNS naming for discovered devices.

use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{Resolver, TokioResolver};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// PTR resolver with a per-query deadline
pub struct ReverseDns {
    resolver: TokioResolver,
    timeout: Duration,
}

impl ReverseDns {
    /// Resolver using the system configuration, falling back to the
    /// built-in defaults when it cannot be read.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let resolver = match Resolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(e) => {
                debug!(error = %e, "system resolver config unavailable, using defaults");
                Resolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };
        Self { resolver, timeout }
    }

    /// First PTR name of `ip`, without the trailing dot. Any failure is `None`.
    pub async fn name_of(&self, ip: IpAddr) -> Option<String> {
        match tokio::time::timeout(self.timeout, self.resolver.reverse_lookup(ip)).await {
            Ok(Ok(lookup)) => lookup
                .iter()
                .next()
                .map(|ptr| ptr.to_string().trim_end_matches('.').to_string()),
            Ok(Err(e)) => {
                debug!(%ip, error = %e, "reverse lookup failed");
                None
            }
            Err(_) => {
                debug!(%ip, "reverse lookup timed out");
                None
            }
        }
    }
}

impl std::fmt::Debug for ReverseDns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseDns")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
