//! CA connection and TLS trust KDL parsing.

use tracing::trace;

use crate::{ConfigError, ConfigResult, TlsTrustConfig, VaultConfig, DEFAULT_MOUNT};

use super::helpers::{get_bool_entry, get_string_args, get_string_entry};

/// Parse the `vault { ... }` block
pub fn parse_vault_config(node: &kdl::KdlNode) -> ConfigResult<VaultConfig> {
    trace!("Parsing vault configuration block");

    // Address and token may be supplied later through the environment, so an
    // absent value is left empty here and caught by validation.
    let config = VaultConfig {
        address: get_string_entry(node, "address").unwrap_or_default(),
        token: get_string_entry(node, "token").unwrap_or_default(),
        mount: get_string_entry(node, "mount").unwrap_or_else(|| DEFAULT_MOUNT.to_string()),
        tls: node
            .children()
            .and_then(|children| children.get("tls"))
            .map(parse_tls_trust)
            .transpose()?,
    };

    trace!(
        address = %config.address,
        mount = %config.mount,
        has_tls = config.tls.is_some(),
        "Parsed vault configuration"
    );

    Ok(config)
}

/// Parse the `tls { ... }` block inside `vault`
pub fn parse_tls_trust(node: &kdl::KdlNode) -> ConfigResult<TlsTrustConfig> {
    let ca = get_string_args(node, "ca");
    let skip_verify = get_bool_entry(node, "skip-verify").unwrap_or(false);

    if ca.is_empty() && !skip_verify {
        return Err(ConfigError::Invalid(
            "tls block requires 'ca' sources or 'skip-verify #true'".to_string(),
        ));
    }

    Ok(TlsTrustConfig { ca, skip_verify })
}
