use clap::{Parser, Subcommand};

use ledgerflow::config::{AppConfig, DatabaseLocation};
use ledgerflow::seed::SeedCounts;

#[derive(Parser, Debug)]
#[command(name = "ledgerflow", version, about = "LedgerFlow bookkeeping API")]
struct Cli {
    /// Bind address, overrides HOST.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Bind port, overrides PORT.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// SQLite location, overrides DATABASE_URL.
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default).
    Serve,

    /// Create or upgrade the schema and exit.
    Migrate,

    /// Insert random demo records.
    Seed {
        #[arg(long, default_value_t = 20)]
        customers: usize,
        #[arg(long, default_value_t = 15)]
        vendors: usize,
        #[arg(long, default_value_t = 50)]
        invoices: usize,
        #[arg(long, default_value_t = 80)]
        expenses: usize,
        #[arg(long, default_value_t = 40)]
        payments: usize,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::from_env()?;
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database) = &cli.database {
        config.database = DatabaseLocation::parse(database)?;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    ledgerflow::init_tracing(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        match cli.command.unwrap_or(Command::Serve) {
            Command::Serve => ledgerflow::run_server(config).await,
            Command::Migrate => {
                let version = ledgerflow::run_migrations(&config).await?;
                println!("schema version {version}");
                Ok(())
            }
            Command::Seed {
                customers,
                vendors,
                invoices,
                expenses,
                payments,
            } => {
                let counts = SeedCounts {
                    customers,
                    vendors,
                    invoices,
                    expenses,
                    payments,
                };
                let report = ledgerflow::run_seed(&config, counts).await?;
                println!(
                    "seeded {} customers, {} vendors, {} invoices, {} expenses, {} payments",
                    report.customers, report.vendors, report.invoices, report.expenses, report.payments
                );
                Ok(())
            }
        }
    })
}
