//! BLAKE3 plan fingerprints.
//!
//! A fingerprint identifies a plan's exact contents (providers, secret
//! bindings, step sequence, attribute values) so an external state backend
//! can tell whether re-synthesis changed anything. Secret values never enter
//! a plan, so rotating one leaves the fingerprint unchanged.

use super::types::Plan;

/// Hash a single string. Returns `"blake3:{hex}"`. The benches use it as
/// the raw hashing baseline; plans go through `composite_hash`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Compute a composite hash from ordered components.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Fingerprint of a plan. The `fingerprint` field itself is ignored.
pub fn plan_fingerprint(plan: &Plan) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(plan.steps.len() + 2);
    lines.push(format!("stack\t{}", plan.stack));
    for (name, settings) in &plan.providers {
        let pairs: Vec<String> = settings.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        lines.push(format!("provider\t{}\t{}", name, pairs.join(",")));
    }
    for (key, binding) in &plan.secrets {
        lines.push(format!(
            "secret\t{}\t{}",
            key,
            binding.env.as_deref().unwrap_or_default()
        ));
    }
    for s in &plan.steps {
        let deps: Vec<&str> = s.depends_on.iter().map(String::as_str).collect();
        lines.push(format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            s.index,
            s.action,
            s.resource,
            s.kind,
            s.provider,
            deps.join(","),
            serde_json::to_string(&s.attributes).unwrap_or_default()
        ));
    }
    let components: Vec<&str> = lines.iter().map(String::as_str).collect();
    composite_hash(&components)
}
