use clap::{Parser, Subcommand};
use gridcast::config::Config;
use gridcast::forecast::WeatherFetcher;
use gridcast::region::{RegionQuery, RegionResolver};
use gridcast::server::{self, AppState};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// gridcast: KMA weather by region name or forecast grid
///
/// Resolves Korean region names to forecast grid coordinates and proxies
/// the KMA village forecast API.
///
/// Examples:
///   gridcast serve --port 8080
///   gridcast lookup 서울특별시 종로구
///   gridcast fetch --nx 60 --ny 127
///   gridcast fetch --region "서울특별시 종로구 청운효자동"
#[derive(Parser)]
#[command(name = "gridcast", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Print the first region matching the given names.
    Lookup {
        level1: String,
        level2: Option<String>,
        level3: Option<String>,
    },
    /// Print the whole region table.
    Regions,
    /// Fetch the latest observation once and print it.
    Fetch {
        #[arg(long, allow_hyphen_values = true, requires = "ny", conflicts_with = "region")]
        nx: Option<i32>,
        #[arg(long, allow_hyphen_values = true, requires = "nx")]
        ny: Option<i32>,
        /// Space-separated region name, e.g. "서울특별시 종로구".
        #[arg(long)]
        region: Option<String>,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.config),
        Command::Lookup { level1, level2, level3 } => {
            let query = RegionQuery::new(Some(&level1), level2.as_deref(), level3.as_deref());
            let resolver = cli.config.resolver();
            let found = resolve_or_exit(&resolver, &query);
            print_json(&found);
        }
        Command::Regions => {
            let resolver = cli.config.resolver();
            let regions = resolver.try_list_all_regions().unwrap_or_else(|e| {
                error!("{}", e);
                std::process::exit(1);
            });
            print_json(&regions);
        }
        Command::Fetch { nx, ny, region } => fetch(&cli.config, nx.zip(ny), region.as_deref()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gridcast=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn serve(config: &Config) {
    let fetcher_config = config.fetcher_config().unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(1);
    });

    let resolver = config.resolver();
    // Load eagerly so a bad table shows up at startup rather than on the
    // first request. The server still starts; /health reports the failure.
    match resolver.load_table() {
        Ok(rows) => info!(regions = rows.len(), table = %config.table.display(), "region table ready"),
        Err(e) => warn!(error = %e, "starting without a region table; region lookups will fail"),
    }

    info!(cadence = %fetcher_config.cadence, upstream = %fetcher_config.base_url, "upstream configured");

    let state = AppState {
        resolver,
        fetcher: WeatherFetcher::new(fetcher_config),
    };

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        error!("cannot start runtime: {}", e);
        std::process::exit(1);
    });
    let addr = config.bind_addr();
    if let Err(e) = runtime.block_on(server::start(state, &addr)) {
        error!("server error on {}: {}", addr, e);
        std::process::exit(1);
    }
}

fn fetch(config: &Config, grid: Option<(i32, i32)>, region: Option<&str>) {
    let fetcher_config = config.fetcher_config().unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(1);
    });

    let (nx, ny) = match (grid, region) {
        (Some(grid), _) => grid,
        (None, Some(location)) => {
            let query = RegionQuery::from_location(location);
            let found = resolve_or_exit(&config.resolver(), &query);
            eprintln!("  {} → nx={} ny={}", found.display_name(), found.nx, found.ny);
            (found.nx, found.ny)
        }
        (None, None) => {
            eprintln!("Error: provide --nx and --ny, or --region.");
            std::process::exit(1);
        }
    };

    let fetcher = WeatherFetcher::new(fetcher_config);
    match fetcher.fetch_observation(nx, ny) {
        Ok(envelope) => print_json(&envelope),
        Err(e) => {
            error!(kind = e.kind(), "{}", e);
            std::process::exit(1);
        }
    }
}

fn resolve_or_exit(resolver: &RegionResolver, query: &RegionQuery) -> gridcast::region::Coordinate {
    if let Err(e) = query.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    match resolver.lookup(query) {
        Ok(Some(found)) => found,
        Ok(None) => {
            eprintln!("Error: no region matches '{}'", query);
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("cannot serialize output: {}", e);
            std::process::exit(1);
        }
    }
}
