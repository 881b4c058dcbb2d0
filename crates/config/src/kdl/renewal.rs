//! Renewal block KDL parsing.

use std::path::PathBuf;

use tracing::trace;

use crate::{ConfigError, ConfigResult, RenewalConfig};

use super::helpers::{get_first_arg_string, get_int_entry, get_string_entry, kdl_value_to_json};

/// Parse a `renewal "<name>" { ... }` block
pub fn parse_renewal(node: &kdl::KdlNode) -> ConfigResult<RenewalConfig> {
    let name = get_first_arg_string(node).ok_or_else(|| {
        ConfigError::Invalid(
            "renewal requires a name argument, e.g., renewal \"api\" { ... }".to_string(),
        )
    })?;

    trace!(renewal = %name, "Parsing renewal");

    let role = get_string_entry(node, "role")
        .ok_or_else(|| ConfigError::Missing(format!("renewal '{}' role", name)))?;
    let common_name = get_string_entry(node, "common-name")
        .ok_or_else(|| ConfigError::Missing(format!("renewal '{}' common-name", name)))?;
    let ttl_secs = get_int_entry(node, "ttl-secs")
        .ok_or_else(|| ConfigError::Missing(format!("renewal '{}' ttl-secs", name)))?;
    let ttl_secs = u64::try_from(ttl_secs).map_err(|_| {
        ConfigError::Invalid(format!("renewal '{}' ttl-secs must be positive", name))
    })?;

    let mut extra = serde_json::Map::new();
    if let Some(fields) = node
        .children()
        .and_then(|children| children.get("extra"))
        .and_then(|n| n.children())
    {
        for field in fields.nodes() {
            let values: Vec<serde_json::Value> = field
                .entries()
                .iter()
                .map(|e| kdl_value_to_json(e.value()))
                .collect();
            let value = match values.len() {
                0 => serde_json::Value::Null,
                1 => values.into_iter().next().unwrap_or(serde_json::Value::Null),
                _ => serde_json::Value::Array(values),
            };
            extra.insert(field.name().value().to_string(), value);
        }
    }

    Ok(RenewalConfig {
        name,
        role,
        common_name,
        ttl_secs,
        extra,
        output_dir: get_string_entry(node, "output-dir").map(PathBuf::from),
    })
}
