//! Status aggregation across all configured services
//!
//! Pure function of the current probe results: no caching, no memoization.
//! Every invocation reflects only the instant it ran.

use crate::config::ServiceEntry;
use crate::probe::{self, ProbeResult};
use futures::future::join_all;
use std::time::Duration;

/// Probe every configured service and return (key, result) pairs in the
/// configured order. Probes run concurrently but the full set is awaited
/// before returning, so the caller never sees a partial snapshot. A failing
/// probe is isolated into a DOWN entry and never aborts the others.
pub async fn aggregate(services: &[ServiceEntry], timeout: Duration) -> Vec<(String, ProbeResult)> {
    let probes = services.iter().map(|entry| async move {
        (entry.key.clone(), probe::probe_unit(&entry.unit, timeout).await)
    });
    join_all(probes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeState;

    fn entry(key: &str, unit: &str) -> ServiceEntry {
        ServiceEntry { key: key.into(), unit: unit.into() }
    }

    #[tokio::test]
    async fn test_aggregate_preserves_length_and_order() {
        let services = vec![
            entry("zeta", "no-such-unit-zeta.service"),
            entry("alpha", "no-such-unit-alpha.service"),
            entry("mid", "no-such-unit-mid.service"),
        ];
        let results = aggregate(&services, Duration::from_secs(5)).await;
        assert_eq!(results.len(), services.len());
        let keys: Vec<&str> = results.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_failing_probe_is_isolated() {
        // Units that cannot exist: each must still come back, marked DOWN.
        let services =
            vec![entry("a", "no-such-unit-a.service"), entry("b", "no-such-unit-b.service")];
        let results = aggregate(&services, Duration::from_secs(5)).await;
        assert_eq!(results.len(), 2);
        for (_, result) in &results {
            assert_eq!(result.state, ProbeState::Down);
        }
    }

    #[tokio::test]
    async fn test_aggregate_empty_input() {
        let results = aggregate(&[], Duration::from_secs(5)).await;
        assert!(results.is_empty());
    }
}
