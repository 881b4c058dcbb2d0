//! vault-pki - issue, renew, and inspect certificates from a Vault PKI mount

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use vault_pki::{
    start_renewal, CertificateAuthority, CredentialStore, Inventory, IssueRequest,
    RenewalSubscription, VaultClient,
};
use vault_pki_config::{Config, VaultConfig, DEFAULT_MOUNT};

/// vault-pki - keep short-lived certificates from Vault fresh
#[derive(Parser, Debug)]
#[command(name = "vault-pki")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (.kdl or .json)
    #[arg(short = 'c', long = "config", env = "VAULT_PKI_CONFIG", global = true)]
    config: Option<String>,

    /// PKI mount path when running without a configuration file
    #[arg(long = "mount", global = true)]
    mount: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and exit
    Check,
    /// Issue a single certificate and print it
    Issue {
        /// Issuance role
        #[arg(long)]
        role: String,
        /// Common name
        #[arg(long = "common-name")]
        common_name: String,
        /// Requested validity in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
        /// Extra request field, as key=value (repeatable)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Keep every configured credential renewed until interrupted
    Renew,
    /// List every certificate on record
    List,
    /// Print the CA chain
    Chain,
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref(), cli.mount)?;

    match cli.command {
        Commands::Check => check(&config, cli.config.as_deref()),
        Commands::Issue {
            role,
            common_name,
            ttl,
            fields,
        } => {
            let mut request = IssueRequest::new(role, common_name, ttl);
            for (key, value) in fields {
                request = request.with_field(key, value);
            }
            issue(&config, &request).await
        }
        Commands::Renew => renew(&config).await,
        Commands::List => list(&config).await,
        Commands::Chain => chain(&config).await,
    }
}

/// Load the file if given, otherwise start from an empty config; then apply
/// environment overrides and validate.
fn load_config(path: Option<&str>, mount: Option<String>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            Config::from_file(path).context("Failed to load configuration file")?
        }
        None => Config {
            vault: VaultConfig::new("", "", DEFAULT_MOUNT),
            renewals: Vec::new(),
        },
    };

    config.apply_env_overrides();
    if let Some(mount) = mount {
        config.vault.mount = mount;
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

fn check(config: &Config, path: Option<&str>) -> Result<()> {
    info!("Configuration test successful:");
    info!("  - CA: {}/{}", config.vault.address, config.vault.mount);
    info!("  - {} renewal(s)", config.renewals.len());
    for renewal in &config.renewals {
        if renewal.output_dir.is_none() {
            warn!(
                "Renewal '{}' has no output-dir; credentials will only be logged",
                renewal.name
            );
        }
    }

    println!(
        "vault-pki: configuration {} test is successful",
        path.unwrap_or("(environment)")
    );
    Ok(())
}

async fn connect(config: &Config) -> Result<Arc<VaultClient>> {
    let client = VaultClient::connect(&config.vault)
        .await
        .context("Failed to create Vault client")?;
    Ok(Arc::new(client))
}

async fn issue(config: &Config, request: &IssueRequest) -> Result<()> {
    let client = connect(config).await?;
    let credential = client
        .issue(request)
        .await
        .context("Certificate issuance failed")?;

    println!("serial:     {}", credential.serial);
    println!("key type:   {}", credential.key_type);
    println!("expires in: {}s", credential.expires_in);
    print!("{}", credential.certificate);
    Ok(())
}

async fn renew(config: &Config) -> Result<()> {
    if config.renewals.is_empty() {
        bail!("No renewals configured");
    }

    let client: Arc<dyn CertificateAuthority> = connect(config).await?;
    let mut handles = Vec::new();

    for renewal in &config.renewals {
        let store = renewal
            .output_dir
            .as_deref()
            .map(CredentialStore::new)
            .transpose()
            .with_context(|| format!("Failed to open output-dir for renewal '{}'", renewal.name))?;

        let name = renewal.name.clone();
        let subscription = RenewalSubscription::new(renewal.name.clone(), renewal.into());

        handles.push(start_renewal(client.clone(), subscription, move |update| {
            let credential = match update {
                Ok(credential) => credential,
                Err(e) => {
                    error!(renewal = %name, error = %e, "Renewal failed, will retry");
                    return;
                }
            };
            if let Some(store) = &store {
                if let Err(e) = store.save(&credential) {
                    error!(renewal = %name, error = %e, "Failed to save renewed credential");
                }
            }
        }));
    }

    info!(renewals = handles.len(), "Renewal loops running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down renewal loops");
    for handle in &handles {
        handle.cancel();
    }
    for handle in handles {
        handle.join().await;
    }
    Ok(())
}

async fn list(config: &Config) -> Result<()> {
    let client = connect(config).await?;
    let entries = Inventory::new(client)
        .list_all()
        .await
        .context("Failed to list certificates")?;

    info!(count = entries.len(), "Certificates on record");
    for entry in entries {
        print!("{}", entry.certificate);
        println!("# chain: {} certificate(s)", entry.chain.len());
    }
    Ok(())
}

async fn chain(config: &Config) -> Result<()> {
    let client = connect(config).await?;
    let chain = client.ca_chain().await.context("Failed to fetch CA chain")?;
    for cert in chain {
        println!("{}", cert.trim_end());
    }
    Ok(())
}
