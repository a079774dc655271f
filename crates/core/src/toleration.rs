//! Taint/toleration matching with Kubernetes semantics.

#![forbid(unsafe_code)]

use k8s_openapi::api::core::v1::{Taint, Toleration};

pub const EFFECT_NO_SCHEDULE: &str = "NoSchedule";
pub const EFFECT_PREFER_NO_SCHEDULE: &str = "PreferNoSchedule";
pub const EFFECT_NO_EXECUTE: &str = "NoExecute";

/// Whether a taint keeps untolerating workloads off the cluster.
/// `PreferNoSchedule` is advisory only.
pub fn is_blocking(taint: &Taint) -> bool {
    taint.effect == EFFECT_NO_SCHEDULE || taint.effect == EFFECT_NO_EXECUTE
}

/// Returns true when `toleration` tolerates `taint`.
///
/// - empty effect matches every effect
/// - empty key is only valid with `Exists` and then matches every key
/// - `Exists` ignores the value; `Equal` (or no operator) requires equal values
pub fn tolerates(toleration: &Toleration, taint: &Taint) -> bool {
    let effect = toleration.effect.as_deref().unwrap_or("");
    if !effect.is_empty() && effect != taint.effect { return false; }

    let operator = toleration.operator.as_deref().unwrap_or("Equal");
    let key = toleration.key.as_deref().unwrap_or("");
    if key.is_empty() {
        return operator == "Exists";
    }
    if key != taint.key { return false; }

    match operator {
        "Exists" => true,
        "Equal" | "" => toleration.value.as_deref().unwrap_or("") == taint.value.as_deref().unwrap_or(""),
        _ => false,
    }
}

/// First blocking taint not tolerated by any entry in `tolerations`.
pub fn first_untolerated<'a>(taints: &'a [Taint], tolerations: &[Toleration]) -> Option<&'a Taint> {
    taints
        .iter()
        .filter(|t| is_blocking(t))
        .find(|t| !tolerations.iter().any(|tol| tolerates(tol, t)))
}
