use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use domain_prover::common::dns::HickoryResolver;
use domain_prover::dkim::{resolve_public_key, KeyDiscovery};
use domain_prover::extract::DkimExtractor;
use domain_prover::header::TO_PRESELECTOR;
use domain_prover::input::assemble;

#[derive(Parser)]
#[command(
    name = "domain-prover",
    version,
    about = "Prepare proof inputs for DKIM-anchored domain-ownership proofs"
)]
struct Cli {
    /// Suppress log output
    #[arg(long, global = true)]
    silent: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a proof-input file from a raw email
    Inputs {
        /// Path to the raw email file
        #[arg(long)]
        email_file: PathBuf,
        /// Claimant address (20-byte hex identifier)
        #[arg(long)]
        address: String,
        /// Directory the input file is written to
        #[arg(long, default_value = "proofs")]
        out_dir: PathBuf,
        /// Recipient-field anchor; must match the canonicalized header form
        #[arg(long, default_value = TO_PRESELECTOR)]
        preselector: String,
        /// External witness/prover command, run with the input path appended
        #[arg(long)]
        prover_cmd: Option<String>,
        /// DNS query timeout in seconds
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
    },
    /// Resolve the published DKIM modulus for one domain and selector
    Resolve {
        domain: String,
        #[arg(long)]
        selector: String,
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
    },
    /// Probe the selector catalog for every domain in a file
    Discover {
        /// File with one domain per line
        #[arg(long)]
        domains_file: PathBuf,
        /// Write the JSON result here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
        #[arg(long, default_value_t = 16)]
        max_in_flight: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if !cli.silent {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    match cli.command {
        Command::Inputs {
            email_file,
            address,
            out_dir,
            preselector,
            prover_cmd,
            timeout_secs,
        } => {
            generate_inputs(
                &email_file,
                &address,
                &out_dir,
                &preselector,
                prover_cmd.as_deref(),
                timeout_secs,
            )
            .await
        }
        Command::Resolve {
            domain,
            selector,
            timeout_secs,
        } => {
            let resolver = resolver(timeout_secs)?;
            match resolve_public_key(&resolver, &domain, &selector).await {
                Some(modulus) => {
                    println!("{}", modulus);
                    Ok(())
                }
                None => bail!("no DKIM key for {}._domainkey.{}", selector, domain),
            }
        }
        Command::Discover {
            domains_file,
            out,
            timeout_secs,
            max_in_flight,
        } => {
            let domains: Vec<String> = std::fs::read_to_string(&domains_file)
                .with_context(|| format!("reading {}", domains_file.display()))?
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();

            let discovery = KeyDiscovery::new(resolver(timeout_secs)?)
                .probe_timeout(Duration::from_secs(timeout_secs))
                .max_in_flight(max_in_flight);
            let result = discovery.discover(&domains).await;

            let json = serde_json::to_string_pretty(&result)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "discovery results written");
                }
                None => println!("{}", json),
            }
            Ok(())
        }
    }
}

fn resolver(timeout_secs: u64) -> anyhow::Result<HickoryResolver> {
    HickoryResolver::with_timeout(Duration::from_secs(timeout_secs))
        .map_err(|e| anyhow::anyhow!("building DNS resolver: {}", e))
}

async fn generate_inputs(
    email_file: &PathBuf,
    address: &str,
    out_dir: &PathBuf,
    preselector: &str,
    prover_cmd: Option<&str>,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let raw_email = std::fs::read(email_file)
        .with_context(|| format!("reading {}", email_file.display()))?;

    let extractor = DkimExtractor::new(resolver(timeout_secs)?);
    let record = assemble(&extractor, &raw_email, address, preselector)
        .await
        .with_context(|| format!("assembling proof input for {}", email_file.display()))?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let input_path = out_dir.join("input.json");
    std::fs::write(&input_path, serde_json::to_string_pretty(&record)?)
        .with_context(|| format!("writing {}", input_path.display()))?;
    info!(path = %input_path.display(), "proof input written");

    if let Some(cmd) = prover_cmd {
        let mut parts = cmd.split_whitespace();
        let program = parts.next().context("empty prover command")?;
        let status = tokio::process::Command::new(program)
            .args(parts)
            .arg(&input_path)
            .status()
            .await
            .with_context(|| format!("running prover command {:?}", cmd))?;
        if !status.success() {
            bail!("prover command exited with {}", status);
        }
        info!("proof generation finished");
    }

    Ok(())
}
