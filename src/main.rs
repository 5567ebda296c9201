use clap::{Args, Parser, Subcommand};
use healthfinder::config::{Config, ServerSettings};
use healthfinder::cycle::{SearchController, SearchView};
use healthfinder::datasets::{Hospital, Plan, ResultList};
use healthfinder::location::{Identifier, Region};
use healthfinder::{logging, server, Finder};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Healthfinder: nearby hospitals and local healthcare plans
///
/// Give any mix of zip code, city and state. With none, the location is
/// detected from your IP address.
///
/// Examples:
///   healthfinder hospitals --zipcode 10001
///   healthfinder plans --city Boise --state ID
///   healthfinder search --json
///   healthfinder serve --port 8080
#[derive(Parser)]
#[command(name = "healthfinder", version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.healthfinder/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hospitals near the location, nearest first, with quality measures.
    Hospitals(Target),
    /// Plans offered in the location's county, cheapest first.
    Plans(Target),
    /// State and county containing the location.
    Region(Target),
    /// Hospitals and plans together, as one query cycle.
    Search(Target),
    /// Run the HTTP API.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Args)]
struct Target {
    #[arg(long)]
    zipcode: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    state: Option<String>,
    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

impl Target {
    fn identifier(&self) -> Identifier {
        [
            ("zipcode", &self.zipcode),
            ("city", &self.city),
            ("state", &self.state),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(|v| (k, v)))
        .collect()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, mut config: Config) -> Result<(), String> {
    if let Command::Serve { host, port } = &command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }

    let finder = Arc::new(Finder::new(&config));
    match command {
        Command::Serve { .. } => {
            let ServerSettings { host, port } = &config.server;
            server::start(finder, host, *port)
                .await
                .map_err(|e| format!("server on {}:{}: {}", host, port, e))?;
        }
        Command::Hospitals(target) => {
            let list = finder
                .hospitals
                .fetch_hospitals_with_measures(&target.identifier(), finder.measures_timeout())
                .await
                .map_err(|e| e.to_string())?;
            if target.json {
                print_json(&list)?;
            } else {
                print_hospitals(&list);
            }
        }
        Command::Plans(target) => {
            let list = finder
                .plans
                .fetch_plans(&target.identifier())
                .await
                .map_err(|e| e.to_string())?;
            if target.json {
                print_json(&list)?;
            } else {
                print_plans(&list);
            }
        }
        Command::Region(target) => {
            let region = finder
                .regions
                .resolve_region(&target.identifier())
                .await
                .map_err(|e| e.to_string())?;
            if target.json {
                print_json(&region)?;
            } else {
                print_region(&region);
            }
        }
        Command::Search(target) => search(finder, target).await?,
    }
    Ok(())
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    hospitals: &'a ResultList<Hospital>,
    plans: &'a ResultList<Plan>,
    errors: Vec<String>,
}

async fn search(finder: Arc<Finder>, target: Target) -> Result<(), String> {
    // Hospitals, their measures and plans each get their own bound.
    let deadline = finder.call_timeout() * 2 + finder.measures_timeout();
    let (controller, mut events) = SearchController::new(finder, Handle::current());
    let mut view = SearchView::new();
    controller.trigger_search(target.identifier());

    let settle = async {
        while !view.is_settled() {
            match events.recv().await {
                Some(event) => {
                    view.apply(event);
                }
                None => break,
            }
        }
    };
    if tokio::time::timeout(deadline, settle).await.is_err() {
        controller.cancel();
        return Err(format!("search did not finish within {}s", deadline.as_secs()));
    }

    let errors: Vec<String> = view
        .failures
        .iter()
        .map(|(target, e)| format!("{:?}: {}", target, e))
        .collect();

    if target.json {
        print_json(&SearchOutput {
            hospitals: &view.hospitals,
            plans: &view.plans,
            errors,
        })?;
    } else {
        print_hospitals(&view.hospitals);
        println!();
        print_plans(&view.plans);
        for e in &errors {
            eprintln!("  \u{26A0}\u{FE0F}  {}", e);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", out);
    Ok(())
}

fn print_hospitals(list: &ResultList<Hospital>) {
    if let Some(first) = list.iter().next() {
        eprintln!("  {} {}", "\u{1F4CD}", first.current_location.display_line());
    }
    println!("Hospitals ({})", list.len());
    for h in list {
        let city = h.record.city.as_deref().unwrap_or("");
        let met = h
            .measures
            .as_ref()
            .map(|m| {
                let met = m.iter().filter(|(_, v)| *v == Some(true)).count();
                format!("{}/{} measures met", met, m.len())
            })
            .unwrap_or_else(|| "measures pending".to_string());
        println!("  {:>8}  {:<40} {:<20} {}", h.distance_label(), h.name(), city, met);
    }
}

fn print_plans(list: &ResultList<Plan>) {
    println!("Plans ({})", list.len());
    for p in list {
        let issuer = p.issuer_name.as_deref().unwrap_or("");
        let metal = p.metal_level.as_deref().unwrap_or("");
        println!("  {:>10}  {:<45} {:<25} {}", p.premium_label(), p.name(), issuer, metal);
        if !p.plan_brochure_url.url.is_empty() {
            println!("              {}", p.plan_brochure_url.url);
        }
    }
}

fn print_region(region: &Region) {
    if region.is_resolved() {
        println!("{} County, {}", region.county_name, region.state_code);
    } else {
        println!("No county found (state: '{}', county: '{}')", region.state_code, region.county_name);
    }
}
