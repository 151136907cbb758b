//! Ready-to-use `Orchestrator` recipes for the deployment shapes a Solana
//! meme-coin trading bot actually hits: a shared public RPC pool, a
//! privately operated validator the bot trusts, and a bulk backfill job
//! replaying historical signatures. Each function takes the caller's
//! [`Wire`] and endpoint list and returns a ready-to-call `Orchestrator`:
//! one function per common shape, built on top of [`relaywire::profile`]'s
//! config presets instead of hand-assembling an `OrchestratorConfig` at
//! every call site.

use std::sync::Arc;

use relaywire::config::EndpointConfig;
use relaywire::{Clock, MonotonicClock, Orchestrator, Wire};

/// Front a pool of public Solana RPC endpoints (e.g. the cluster's shared
/// `api.mainnet-beta.solana.com` plus a few third-party providers) behind
/// [`relaywire::profile::public_rpc_pool`]'s defaults: round-robin over
/// whichever endpoints are healthy, an aggressive cache, and a breaker
/// tuned for "some of these are always a little flaky."
pub fn public_rpc_pool<W: Wire + 'static>(wire: Arc<W>, endpoints: Vec<EndpointConfig>) -> Orchestrator<W> {
    let mut config = relaywire::profile::public_rpc_pool();
    config.selector.endpoints = endpoints;
    Orchestrator::new(config, wire, Arc::new(MonotonicClock::default()))
}

/// Talk to a single privately operated validator or RPC node the bot
/// controls: [`relaywire::profile::private_node`]'s short cache TTL (balances
/// and nonces move fast) and fast-tripping breaker (no load balancer
/// upstream to fail over to).
pub fn trusted_validator_node<W: Wire + 'static>(wire: Arc<W>, endpoint: EndpointConfig) -> Orchestrator<W> {
    let mut config = relaywire::profile::private_node();
    config.selector.endpoints = vec![endpoint];
    Orchestrator::new(config, wire, Arc::new(MonotonicClock::default()))
}

/// Replay historical signatures or backfill a detection model's training
/// set: [`relaywire::profile::batch_ingestion`]'s high rate limit and large
/// pool, fanned out with [`Orchestrator::batch_call`] rather than
/// one-at-a-time `call`s.
pub fn backfill_worker<W: Wire + 'static>(wire: Arc<W>, endpoints: Vec<EndpointConfig>) -> Orchestrator<W> {
    let mut config = relaywire::profile::batch_ingestion();
    config.selector.endpoints = endpoints;
    Orchestrator::new(config, wire, Arc::new(MonotonicClock::default()))
}

/// Build an orchestrator on a caller-supplied clock, for recipes that need
/// to share a [`ManualClock`](relaywire::ManualClock) with the rest of a
/// test harness rather than the production [`MonotonicClock`].
pub fn with_clock<W: Wire + 'static>(
    mut config: relaywire::config::OrchestratorConfig,
    endpoints: Vec<EndpointConfig>,
    wire: Arc<W>,
    clock: Arc<dyn Clock>,
) -> Orchestrator<W> {
    config.selector.endpoints = endpoints;
    Orchestrator::new(config, wire, clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relaywire::{CallOptions, SelectedEndpoint, UpstreamFailure};
    use serde_json::Value;

    struct EchoWire;

    #[async_trait]
    impl Wire for EchoWire {
        async fn send(&self, endpoint: &SelectedEndpoint, _method: &str, _params: &Value) -> Result<Value, UpstreamFailure> {
            Ok(serde_json::json!({ "endpoint": endpoint.id }))
        }
    }

    #[tokio::test]
    async fn public_rpc_pool_recipe_answers_calls() {
        let orchestrator = public_rpc_pool(
            Arc::new(EchoWire),
            vec![
                EndpointConfig::new("primary", "https://api.mainnet-beta.solana.com"),
                EndpointConfig::new("secondary", "https://solana-api.projectserum.com"),
            ],
        );
        let result = orchestrator.call("getBalance", serde_json::json!({}), CallOptions::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn trusted_validator_node_recipe_uses_a_single_endpoint() {
        let orchestrator = trusted_validator_node(Arc::new(EchoWire), EndpointConfig::new("primary", "https://my-node.internal"));
        let result = orchestrator.call("getSlot", serde_json::json!({}), CallOptions::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn backfill_worker_recipe_fans_out_with_batch_call() {
        let orchestrator =
            backfill_worker(Arc::new(EchoWire), vec![EndpointConfig::new("primary", "https://api.mainnet-beta.solana.com")]);
        let requests: Vec<_> = (0..5)
            .map(|i| ("getTransaction".to_string(), serde_json::json!({ "i": i }), CallOptions { skip_cache: true, ..Default::default() }))
            .collect();
        let results = orchestrator.batch_call(requests, 5).await;
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
