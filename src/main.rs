use anyhow::{Context, Result};
use azsql::azure::auth::{self, AzureCredentials, TokenSource};
use azsql::azure::client::ArmClient;
use azsql::azure::http::format_arm_error;
use azsql::config::{Config, OutputFormat};
use azsql::query::{KeyQuals, QueryContext};
use azsql::resource::Row;
use azsql::sql::{ServerKey, SqlClients, SqlServerTable, SubResourceKind};
use clap::{Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use std::io::Write;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Azure SQL Server inventory
#[derive(Parser, Debug)]
#[command(name = "azsql", version, about, long_about = None)]
struct Args {
    /// Azure subscription to query
    #[arg(short, long, global = true)]
    subscription: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, global = true)]
    output: Option<OutputFormat>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every SQL server in the subscription
    List {
        /// Stop after this many servers
        #[arg(short, long)]
        limit: Option<usize>,

        /// Comma separated columns to output (default: all)
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Servers hydrated at the same time
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Look up a single SQL server
    Get {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        resource_group: String,

        /// Comma separated columns to output (default: all)
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,
    },
    /// List one kind of sub-resource for a SQL server
    SubResources {
        /// e.g. firewall-rules, virtual-network-rules
        #[arg(short, long, value_parser = parse_kind)]
        kind: SubResourceKind,

        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        resource_group: String,
    },
    /// Describe the columns of azure_sql_server
    Columns,
    /// Save defaults to the config file
    Configure {
        #[arg(long)]
        subscription_id: Option<String>,

        #[arg(long)]
        tenant_id: Option<String>,

        #[arg(long)]
        client_id: Option<String>,
    },
}

fn parse_kind(s: &str) -> Result<SubResourceKind, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("azsql started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("azsql").join("azsql.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".azsql").join("azsql.log");
    }
    PathBuf::from("azsql.log")
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: {err:#}");
            None
        }
    };

    if let Err(err) = run(args).await {
        tracing::error!("{:#}", err);
        eprintln!("Error: {}", format_arm_error(&err));
        eprintln!("  {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load();

    let command = match args.command {
        Command::Columns => return print_columns(),
        Command::Configure {
            subscription_id,
            tenant_id,
            client_id,
        } => {
            if let Some(subscription) = subscription_id {
                if !auth::validate_subscription_id(&subscription) {
                    return Err(anyhow::anyhow!("Invalid subscription ID: {}", subscription));
                }
                config.subscription_id = Some(subscription);
            }
            config.tenant_id = tenant_id.or(config.tenant_id);
            config.client_id = client_id.or(config.client_id);
            config.save()?;
            if let Some(path) = Config::config_path() {
                println!("Saved {}", path.display());
            }
            return Ok(());
        }
        command => command,
    };

    let subscription = config.resolve_subscription(args.subscription.as_deref())?;

    tracing::info!("Using subscription: {}", subscription);

    let source = TokenSource::from_env(config.tenant_id.as_deref(), config.client_id.as_deref());
    let credentials = AzureCredentials::with_endpoints(
        source,
        &config.effective_authority_host(),
        &config.effective_management_endpoint(),
    )?;
    let client =
        ArmClient::with_endpoint(&subscription, credentials, &config.effective_management_endpoint())?;
    let table = SqlServerTable::new(SqlClients::new(client))?;

    let output = args.output.unwrap_or_else(|| config.effective_output());

    let ctx = QueryContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight requests");
            canceller.cancel();
        }
    });

    match command {
        Command::List {
            limit,
            columns,
            concurrency,
        } => {
            let ctx = ctx.with_limit(limit);
            let columns = table.definition().project(Some(columns.as_slice()))?;
            let concurrency = concurrency.unwrap_or_else(|| config.effective_concurrency());

            let rows = table.list_rows(&columns, &ctx, concurrency);
            futures::pin_mut!(rows);

            let mut writer = RowWriter::new(output);
            while let Some(row) = rows.try_next().await? {
                writer.push(row)?;
            }
            writer.finish()
        }
        Command::Get {
            name,
            resource_group,
            columns,
        } => {
            let columns = table.definition().project(Some(columns.as_slice()))?;
            let quals = KeyQuals::new()
                .with("name", &name)
                .with("resource_group", &resource_group);

            let mut writer = RowWriter::new(output);
            match table.get_row(&quals, &columns, &ctx).await? {
                Some(row) => writer.push(row)?,
                None => tracing::info!("SQL server {}/{} not found", resource_group, name),
            }
            writer.finish()
        }
        Command::SubResources {
            kind,
            name,
            resource_group,
        } => {
            let key = ServerKey::new(&subscription, &resource_group, &name);
            let resources = table.clients().hydrate(kind, &key, &ctx).await?;
            let value = serde_json::to_value(&resources)?;
            write_value(output, &value)
        }
        Command::Columns | Command::Configure { .. } => Ok(()),
    }
}

fn print_columns() -> Result<()> {
    let table = azsql::resource::get_table(azsql::sql::table::TABLE_NAME)
        .context("Table definition missing")?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{} - {}", azsql::sql::table::TABLE_NAME, table.description)?;
    writeln!(stdout, "key columns: {}", table.key_columns.join(", "))?;
    for column in &table.columns {
        let kind = match column.hydrate {
            Some(kind) => format!(" [{}]", kind),
            None => String::new(),
        };
        writeln!(
            stdout,
            "  {:<32} {:<7} {}{}",
            column.name,
            format!("{:?}", column.column_type).to_lowercase(),
            column.description,
            kind
        )?;
    }
    Ok(())
}

fn write_value(output: OutputFormat, value: &serde_json::Value) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match output {
        OutputFormat::Json => writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?,
        OutputFormat::Jsonl => match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    writeln!(stdout, "{}", item)?;
                }
            }
            other => writeln!(stdout, "{}", other)?,
        },
        OutputFormat::Yaml => write!(stdout, "{}", serde_yaml::to_string(value)?)?,
    }
    Ok(())
}

/// Writes rows as they arrive (jsonl) or buffers them for one document
struct RowWriter {
    output: OutputFormat,
    buffered: Vec<serde_json::Value>,
}

impl RowWriter {
    fn new(output: OutputFormat) -> Self {
        Self {
            output,
            buffered: Vec::new(),
        }
    }

    fn push(&mut self, row: Row) -> Result<()> {
        for (column, error) in &row.errors {
            eprintln!("Warning: column {} failed: {}", column, error);
        }

        let value = serde_json::Value::Object(row.values);
        match self.output {
            OutputFormat::Jsonl => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{}", value)?;
            }
            OutputFormat::Json | OutputFormat::Yaml => self.buffered.push(value),
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        match self.output {
            OutputFormat::Jsonl => Ok(()),
            _ => write_value(self.output, &serde_json::Value::Array(self.buffered)),
        }
    }
}
