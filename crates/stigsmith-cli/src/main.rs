use anyhow::{Context, Result};
use clap::{builder::PossibleValuesParser, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use stigsmith_core::simulator::{run_scenario, Operation, Scenario};
use stigsmith_core::{OrchestratorConfig, TaskRequest};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let scenarios: Vec<&'static str> = Scenario::ALL.iter().map(|s| s.as_str()).collect();

    Command::new("stigsmith")
        .version(stigsmith_core::VERSION)
        .about("STIG baseline generation and validation orchestrator")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run one task through the engine against scripted tool services")
                .arg(
                    Arg::new("product")
                        .long("product")
                        .default_value("RHEL 9")
                        .help("Product name, e.g. \"Red Hat Enterprise Linux 9\""),
                )
                .arg(
                    Arg::new("version")
                        .long("version")
                        .default_value("V1R1")
                        .help("STIG version"),
                )
                .arg(
                    Arg::new("scenario")
                        .long("scenario")
                        .default_value("discovered")
                        .value_parser(PossibleValuesParser::new(scenarios))
                        .help("Scripted tool behaviour"),
                )
                .arg(
                    Arg::new("max-remediation")
                        .long("max-remediation")
                        .value_parser(value_parser!(u32))
                        .help("Override remediation.max_attempts"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("correlation-id")
                        .long("correlation-id")
                        .help("Caller-supplied correlation id"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration as TOML")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file to validate and print"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => OrchestratorConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(OrchestratorConfig::default()),
    }
}

async fn simulate(args: &ArgMatches) -> Result<bool> {
    let mut config = load_config(args.get_one::<PathBuf>("config"))?;
    if let Some(max) = args.get_one::<u32>("max-remediation") {
        config = config.with_max_remediation_attempts(*max);
    }

    let scenario: Scenario = args
        .get_one::<String>("scenario")
        .map(String::as_str)
        .unwrap_or("discovered")
        .parse()
        .map_err(anyhow::Error::msg)?;
    let product = args.get_one::<String>("product").context("missing --product")?;
    let version = args.get_one::<String>("version").context("missing --version")?;
    let mut request = TaskRequest::new(product.as_str(), version.as_str());
    if let Some(id) = args.get_one::<String>("correlation-id") {
        request = request.with_correlation_id(id.as_str());
    }

    tracing::info!(%scenario, product = request.product(), version = request.version(), "starting simulation");
    let (report, tools) = run_scenario(scenario, request, config).await;

    if args.get_flag("json") {
        println!("{}", report.to_json().context("rendering report")?);
    } else {
        println!("{}", report.generate_text());
        println!("=== Tool Calls ===");
        for operation in Operation::ALL {
            println!("{:<20} {}", operation.as_str(), tools.calls(operation));
        }
        println!("Knowledge records: {}", tools.store().len());
    }

    Ok(report.succeeded())
}

fn show_config(args: &ArgMatches) -> Result<()> {
    let config = load_config(args.get_one::<PathBuf>("file"))?;
    config.validate()?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let succeeded = simulate(args).await?;
            std::process::exit(if succeeded { 0 } else { 1 });
        }
        Some(("config", args)) => show_config(args),
        _ => Ok(()),
    }
}
