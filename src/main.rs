//! zentinel-waf CLI tool.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use zentinel_waf::{Disruption, Phase, Result, Transaction, Waf};

#[derive(Parser)]
#[command(name = "zentinel-waf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check if rules load correctly
    Check {
        /// Rules file, or a glob such as 'rules/*.conf'
        #[arg(short, long)]
        rules: String,
    },

    /// Run a request through the rules
    Test {
        /// Rules file, or a glob
        #[arg(short, long)]
        rules: String,

        /// Request URI
        #[arg(short, long)]
        uri: String,

        /// Request method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request headers (format: "Name: Value")
        #[arg(short = 'H', long)]
        header: Vec<String>,

        /// Request body
        #[arg(short, long)]
        body: Option<String>,

        /// Read the request body from a file
        #[arg(long, conflicts_with = "body")]
        body_file: Option<PathBuf>,

        /// Client address
        #[arg(long, default_value = "127.0.0.1")]
        client: String,

        /// Response status to run the response phases with
        #[arg(long)]
        status: Option<u16>,
    },

    /// Print loaded rules by phase
    Dump {
        /// Rules file, or a glob
        #[arg(short, long)]
        rules: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Check { rules } => check_rules(&rules),
        Commands::Test {
            rules,
            uri,
            method,
            header,
            body,
            body_file,
            client,
            status,
        } => {
            let body = match (body, body_file) {
                (Some(body), _) => Some(body.into_bytes()),
                (None, Some(path)) => Some(read_body(&path)?),
                (None, None) => None,
            };
            let request = Request {
                uri,
                method,
                headers: header,
                body,
                client,
                status,
            };
            test_request(&rules, &request)
        }
        Commands::Dump { rules } => dump_rules(&rules),
    }
}

struct Request {
    uri: String,
    method: String,
    headers: Vec<String>,
    body: Option<Vec<u8>>,
    client: String,
    status: Option<u16>,
}

fn load(rules: &str) -> Result<Waf> {
    info!("loading rules from {}", rules);
    if rules.contains(['*', '?', '[']) {
        Waf::from_glob(rules)
    } else {
        Waf::from_file(rules)
    }
}

fn read_body(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| zentinel_waf::Error::RuleFileLoad {
        path: path.to_path_buf(),
        source,
    })
}

fn check_rules(rules: &str) -> Result<()> {
    let waf = load(rules)?;
    println!("Successfully loaded {} rules", waf.rule_count());
    Ok(())
}

fn test_request(rules: &str, request: &Request) -> Result<()> {
    let waf = load(rules)?;
    let mut tx = waf.new_transaction();
    let outcome = run(&mut tx, request);
    let audit = tx.process_logging();
    tx.close();

    match outcome? {
        Some(disruption) => {
            let intervention = tx.intervention();
            println!("BLOCKED ({})", intervention.map_or("", |i| i.phase.name()));
            println!("  Action: {} {}", disruption.name(), disruption.status());
            if let Some(url) = disruption.url() {
                println!("  Location: {}", url);
            }
            if let Some(intervention) = intervention {
                if let Some(id) = intervention.rule_id {
                    println!("  Rule: {}", id);
                }
                if let Some(message) = &intervention.message {
                    println!("  Message: {}", message);
                }
            }
        }
        None => println!("ALLOWED"),
    }

    println!("  Matched rules: {}", tx.matched_rules().len());
    for matched in tx.matched_rules() {
        println!("    {}", matched.format_log());
    }
    if let Some(log) = audit {
        println!("{}", waf.config().audit_log_format.format(&log)?);
    }
    Ok(())
}

fn run(tx: &mut Transaction, request: &Request) -> Result<Option<Disruption>> {
    tx.process_connection(&request.client, 0, "127.0.0.1", 80);
    tx.process_uri(&request.method, &request.uri, "HTTP/1.1");
    for header in &request.headers {
        if let Some((name, value)) = header.split_once(':') {
            tx.add_request_header(name.trim(), value.trim());
        }
    }
    if let Some(disruption) = tx.process_request_headers() {
        return Ok(Some(disruption));
    }

    if let Some(body) = &request.body {
        tx.write_request_body(body)?;
    }
    if let Some(disruption) = tx.process_request_body()? {
        return Ok(Some(disruption));
    }

    if let Some(status) = request.status {
        if let Some(disruption) = tx.process_response_headers(status, "HTTP/1.1") {
            return Ok(Some(disruption));
        }
        return tx.process_response_body();
    }
    Ok(None)
}

fn dump_rules(rules: &str) -> Result<()> {
    let waf = load(rules)?;
    println!("Total rules: {}", waf.rule_count());
    println!("\nRules by phase:");

    for phase in Phase::all() {
        let mut rules = waf.rules().phase_rules(*phase).peekable();
        if rules.peek().is_none() {
            continue;
        }
        println!("\n  Phase {} ({}):", phase.number(), phase.name());
        for rule in rules {
            let links = rule.chain_len();
            let chain = if links > 1 {
                format!(" (chain of {})", links)
            } else {
                String::new()
            };
            println!(
                "    - Rule {} {} {}{}",
                rule.id,
                rule.operator.display(),
                rule.disruptive.name(),
                chain
            );
        }
    }

    let markers: Vec<&str> = waf.rules().markers().collect();
    if !markers.is_empty() {
        println!("\nMarkers: {}", markers.join(", "));
    }
    Ok(())
}
