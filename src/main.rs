mod cli;

use std::io::{self, BufRead, Write};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use fastopendata::{
    append_to_csv, build_query, get_free_api_key, AddressFields, Client, ClientConfig,
    ClientError, ColumnSelectors, ConfigOverrides, EnrichOptions,
};

const SAMPLE_ADDRESS: &str = "1984 Lower Hawthorne Trail, Cairo, GA 39828";

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        let code = if err.is_validation()
            || matches!(
                err,
                ClientError::Config(_) | ClientError::Security(_) | ClientError::InvalidEmail(_)
            ) {
            2
        } else {
            1
        };
        std::process::exit(code);
    }
}

/// Logs go to stderr; stdout carries command output only.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("fastopendata=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> fastopendata::Result<()> {
    let workers = match &cli.command {
        Command::Csv { workers, .. } => *workers,
        _ => None,
    };
    let overrides = ConfigOverrides {
        config_path: cli.config,
        api_key: cli.api_key,
        base_url: cli.url,
        timeout_secs: cli.timeout,
        workers,
    };
    let config = ClientConfig::resolve(&overrides)?;

    match cli.command {
        Command::Get { address } => {
            let fields = AddressFields::from(address);
            // Reject bad input before complaining about a missing key.
            let query = build_query(&fields)?;
            let client = Client::new(config)?;
            let data = client.lookup(&query)?;
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }

        Command::Csv {
            input_csv,
            output_csv,
            columns,
            on_error,
            workers: _,
            json,
        } => {
            let selectors = ColumnSelectors::from(columns);
            let options = EnrichOptions {
                failure_policy: on_error.into(),
                workers: config.workers,
                ..EnrichOptions::default()
            };
            let client = Client::new(config)?;
            let report = append_to_csv(&client, &input_csv, &output_csv, &selectors, &options)?;

            for assignment in report.columns.iter().filter(|a| a.renamed()) {
                eprintln!(
                    "Column {} already existed; wrote results to {}",
                    assignment.field, assignment.column
                );
            }
            if json {
                let summary = serde_json::json!({
                    "output": output_csv.display().to_string(),
                    "rows": report.table.len(),
                    "enriched": report.succeeded(),
                    "columns": report.columns,
                    "failures": report.failures,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Done: rows={} enriched={} failed={} new_columns={}",
                    report.table.len(),
                    report.succeeded(),
                    report.failures.len(),
                    report.columns.len()
                );
            }
            Ok(())
        }

        Command::GetApiKey { email } => {
            let email = match email {
                Some(email) => email,
                None => prompt("Enter your email address: ")?,
            };
            let grant = get_free_api_key(&config, &email)?;
            println!("Your API key is:\n{}\n", grant.api_key);
            println!("To test your client, try:");
            println!(
                "  fastopendata get --api-key {} --free-form-query \"{SAMPLE_ADDRESS}\"",
                grant.api_key
            );
            if grant.replaced_old_key() {
                println!(
                    "\nNote: This email address already had an API key. The old one will be expired."
                );
            }
            Ok(())
        }
    }
}

fn prompt(message: &str) -> fastopendata::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{message}")?;
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
