use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use pg_stats::prelude::*;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Format {
    #[default]
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "PostgreSQL statistics from the command line")]
struct Args {
    /// Connection URL; defaults to PG_STATS_DATABASE_URL, then DATABASE_URL
    #[arg(long, global = true)]
    url: Option<String>,
    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify the server accepts connections
    Check,
    /// Print database name and server/client versions
    Info {
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
    /// List available queries
    List,
    /// Run a named query
    Get {
        name: String,
        args: Vec<String>,
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level)
        .init();

    let source = match &args.url {
        Some(url) => ConnectionSource::Params(ConnectionParams::from_url(url)?),
        None => ConnectionSource::Direct,
    };

    match args.command {
        Command::Check => {
            Stats::check_source(&source)?;
            println!("ok");
        }
        Command::List => {
            for entry in QueryCatalog::builtin().entries() {
                println!("{:<32} {}", entry.signature(), entry.description);
            }
        }
        Command::Info { format } => {
            let mut adapter = ConnectionAdapter::establish(&source)?;
            let info = adapter.info()?.clone();
            adapter.disconnect()?;
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&info)?),
                Format::Table => {
                    println!("database        {}", info.db_name);
                    println!("server_version  {}", info.server_version);
                    println!("client_version  {}", info.client_version);
                }
            }
        }
        Command::Get { name, args, format } => {
            let params: Vec<SqlValue> = args.into_iter().map(SqlValue::Text).collect();
            let mut stats = Stats::establish(&source, QueryCatalog::builtin())?;
            let result = stats.get(&name, &params);
            stats.close()?;
            let result = result?;
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                Format::Table => print_table(&result),
            }
        }
    }
    Ok(())
}

fn print_table(result: &ResultSet) {
    let Some(columns) = result.get_column_names() else {
        println!("(0 rows)");
        return;
    };

    let cells: Vec<Vec<String>> = result
        .results
        .iter()
        .map(|row| row.values.iter().map(ToString::to_string).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            cells
                .iter()
                .filter_map(|row| row.get(idx))
                .map(String::len)
                .fold(name.len(), usize::max)
        })
        .collect();

    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, &w)| format!("{v:<w$}"))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", line(columns.as_slice()));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in &cells {
        println!("{}", line(row.as_slice()));
    }
    println!("({} rows)", cells.len());
}
