use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use supabase_connector::modules::storage::ListOptions;
use supabase_connector::{ConnectOptions, ConnectorConfig, CountMethod, SupabaseConnection, Ttl};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "supabase-connector",
    version,
    about = "Query a Supabase project through the cached connector"
)]
struct Cli {
    /// Project URL; falls back to the secret store and SUPABASE_URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Access key; falls back to the secret store and SUPABASE_KEY
    #[arg(long, global = true)]
    key: Option<String>,

    /// Cache TTL for read operations (e.g. 0, 30, 10m, forever)
    #[arg(long, global = true)]
    ttl: Option<Ttl>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select rows from a table
    Query {
        table: String,
        #[arg(long, default_value = "*")]
        columns: String,
        /// Equality filter as column=value, repeatable
        #[arg(long = "eq", value_name = "COLUMN=VALUE")]
        filters: Vec<String>,
        /// Order by column; prefix with '-' for descending
        #[arg(long)]
        order: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
        /// exact, planned or estimated
        #[arg(long)]
        count: Option<CountMethod>,
    },
    /// List storage buckets
    Buckets,
    /// Show one bucket
    Bucket { id: String },
    /// List objects in a bucket
    Objects {
        bucket: String,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    /// Upload a local file
    Upload {
        bucket: String,
        file: PathBuf,
        /// Destination path; defaults to the file name
        #[arg(long)]
        dest: Option<String>,
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Download an object
    Download {
        bucket: String,
        path: String,
        /// Output file; defaults to the object's file name
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Create a signed download URL
    Sign {
        bucket: String,
        path: String,
        #[arg(long, default_value_t = 3600)]
        expires_in: u64,
    },
    /// Print the public URL of an object
    PublicUrl { bucket: String, path: String },
    /// Sign in with email and password and print the session user
    SignIn {
        email: String,
        #[arg(long, env = "SUPABASE_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = ConnectorConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let ttl = cli.ttl.unwrap_or(config.default_ttl);

    let mut options = ConnectOptions::new().config(config);
    if let Some(url) = cli.url {
        options = options.url(url);
    }
    if let Some(key) = cli.key {
        options = options.key(key);
    }
    let connection = options
        .connect()
        .context("Failed to connect to Supabase")?;

    run(&connection, cli.command, ttl).await
}

async fn run(connection: &SupabaseConnection, command: Commands, ttl: Ttl) -> anyhow::Result<()> {
    match command {
        Commands::Query {
            table,
            columns,
            filters,
            order,
            limit,
            count,
        } => {
            let mut builder = connection.query(&table, &columns, count);
            for filter in &filters {
                let (column, value) = filter
                    .split_once('=')
                    .with_context(|| format!("Filter '{}' is not COLUMN=VALUE", filter))?;
                builder = builder.eq(column, value);
            }
            if let Some(order) = order {
                builder = match order.strip_prefix('-') {
                    Some(column) => builder.order(column, true),
                    None => builder.order(&order, false),
                };
            }
            if let Some(limit) = limit {
                builder = builder.limit(limit);
            }
            print_json(&connection.execute_query(&builder, ttl).await?)
        }
        Commands::Buckets => print_json(&connection.list_buckets(ttl).await?),
        Commands::Bucket { id } => print_json(&connection.get_bucket(&id, ttl).await?),
        Commands::Objects {
            bucket,
            prefix,
            limit,
        } => {
            let options = ListOptions {
                path: prefix,
                limit,
                ..Default::default()
            };
            print_json(&connection.list_objects(&bucket, &options, ttl).await?)
        }
        Commands::Upload {
            bucket,
            file,
            dest,
            overwrite,
        } => print_json(
            &connection
                .upload(&bucket, file, dest.as_deref(), overwrite)
                .await?,
        ),
        Commands::Download { bucket, path, out } => {
            let file = connection.download(&bucket, &path, ttl).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(&file.file_name));
            tokio::fs::write(&out, &file.data)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            print_json(&serde_json::json!({
                "file": out.display().to_string(),
                "mime": file.mime,
                "bytes": file.data.len(),
            }))
        }
        Commands::Sign {
            bucket,
            path,
            expires_in,
        } => print_json(&connection.create_signed_url(&bucket, &path, expires_in).await?),
        Commands::PublicUrl { bucket, path } => {
            println!("{}", connection.get_public_url(&bucket, &path)?);
            Ok(())
        }
        Commands::SignIn { email, password } => {
            let response = connection.sign_in_with_password(&email, &password).await?;
            print_json(&response.user)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
