//! Cluster allocation: pick the cluster an environment deploys to.

use crate::error::{Error, Result};
use crate::model::{AllocationContext, AllocationPolicy, ClusterAllocationPolicy};
use tracing::debug;

/// Resolve the cluster name for `ctx` under `policy`.
///
/// Uniform policies use the per-env list when `env_specific` is set. Rule
/// based policies take the first rule whose matchers all equal the context
/// attributes; the last rule has to be a catch-all.
pub fn resolve_cluster_name(
    policy: &ClusterAllocationPolicy,
    ctx: &AllocationContext,
) -> Result<String> {
    match policy {
        ClusterAllocationPolicy::Uniform(p) => pick(p, ctx),
        ClusterAllocationPolicy::RuleBased(rules) => {
            match rules.last() {
                None => {
                    return Err(Error::NoDefaultCluster {
                        tenant_id: ctx.tenant_id.clone(),
                    })
                }
                Some(last) if !last.matchers.is_empty() => {
                    return Err(Error::MisconfiguredPolicy(
                        "the last allocation rule must match every application".to_string(),
                    ))
                }
                Some(_) => {}
            }

            let rule = rules
                .iter()
                .find(|rule| {
                    rule.matchers
                        .iter()
                        .all(|(key, value)| ctx.attribute(key) == Some(value.as_str()))
                })
                .ok_or_else(|| {
                    Error::MisconfiguredPolicy("no allocation rule matched".to_string())
                })?;
            debug!(matchers = ?rule.matchers, "Allocation rule matched");
            pick(&rule.policy, ctx)
        }
    }
}

fn pick(policy: &AllocationPolicy, ctx: &AllocationContext) -> Result<String> {
    let candidates = if policy.env_specific {
        policy
            .env_clusters
            .get(&ctx.environment)
            .map(Vec::as_slice)
            .unwrap_or_default()
    } else {
        policy.clusters.as_slice()
    };

    candidates
        .first()
        .cloned()
        .ok_or_else(|| Error::NoDefaultCluster {
            tenant_id: ctx.tenant_id.clone(),
        })
}
