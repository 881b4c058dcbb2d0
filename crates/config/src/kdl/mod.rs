//! KDL configuration parsing.
//!
//! - `helpers`: Common parsing utility functions
//! - `vault`: CA connection and TLS trust parsing
//! - `renewal`: Renewal block parsing

mod helpers;
mod renewal;
mod vault;

pub use helpers::{
    get_bool_entry, get_first_arg_string, get_int_entry, get_string_args, get_string_entry,
    offset_to_line_col,
};
pub use renewal::parse_renewal;
pub use vault::{parse_tls_trust, parse_vault_config};

use tracing::{trace, warn};

use crate::{Config, ConfigError, ConfigResult};

/// Convert a parsed KDL document to Config
pub fn parse_kdl_document(doc: kdl::KdlDocument) -> ConfigResult<Config> {
    let mut vault = None;
    let mut renewals = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "vault" => {
                vault = Some(parse_vault_config(node)?);
            }
            "renewal" => {
                renewals.push(parse_renewal(node)?);
            }
            other => {
                warn!(node = %other, "Ignoring unknown top-level configuration node");
            }
        }
    }

    let vault = vault.ok_or_else(|| ConfigError::Missing("vault".to_string()))?;

    trace!(renewal_count = renewals.len(), "Parsed KDL configuration");

    Ok(Config { vault, renewals })
}

/// Render a KDL parse failure with line/column context
pub fn format_parse_error(content: &str, e: &kdl::KdlError) -> String {
    use miette::Diagnostic;

    let mut error_msg = String::from("KDL configuration parse error:\n\n");
    let lines: Vec<&str> = content.lines().collect();

    let mut found_details = false;
    if let Some(related) = e.related() {
        for diagnostic in related {
            error_msg.push_str(&format!("  {}\n", diagnostic));
            found_details = true;

            if let Some(labels) = diagnostic.labels() {
                for label in labels {
                    let (line, col) = offset_to_line_col(content, label.offset());
                    error_msg.push_str(&format!("\n  --> at line {}, column {}\n", line, col));

                    if let Some(line_content) = lines.get(line.saturating_sub(1)) {
                        error_msg.push_str(&format!("{:>4} | {}\n", line, line_content));
                        error_msg.push_str(&format!("     | {}^", " ".repeat(col.saturating_sub(1))));
                        if let Some(label_msg) = label.label() {
                            error_msg.push_str(&format!(" {}", label_msg));
                        }
                        error_msg.push('\n');
                    }
                }
            }

            if let Some(help) = diagnostic.help() {
                error_msg.push_str(&format!("\n  Help: {}\n", help));
            }
        }
    }

    if !found_details {
        error_msg.push_str(&format!("  {}\n", e));
    }

    error_msg
}
