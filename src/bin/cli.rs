//! scriptkv CLI Client
//!
//! Runs the atomic primitives against a store from the command line.

use clap::{Parser, Subcommand};
use scriptkv::{arg, Config, Reply, ScriptKv, ScriptKvError, TcpPool};
use tracing_subscriber::{fmt, EnvFilter};

/// scriptkv CLI
#[derive(Parser, Debug)]
#[command(name = "scriptkv-cli")]
#[command(about = "Atomic primitives against a script-capable key-value store")]
#[command(version)]
struct Args {
    /// Store address
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    server: String,

    /// Connect timeout in milliseconds
    #[arg(long, default_value = "3000")]
    connect_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set KEY to NEW if it is absent or equals EXPECTED
    Cas {
        key: String,
        expected: String,
        new: String,
    },

    /// Delete KEY if it equals EXPECTED
    Cad { key: String, expected: String },

    /// Add DELTA to KEY, refusing to go below zero
    Incr {
        key: String,
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },

    /// Add DELTA to a hash field, refusing to go below zero
    Hincr {
        key: String,
        field: String,
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },

    /// Apply one delta per field, all or nothing
    Hmincr {
        key: String,

        /// Comma-separated field names
        #[arg(long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        /// Comma-separated deltas, one per field
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
        deltas: Vec<i64>,
    },

    /// Take a lease on KEY under TOKEN
    Lock {
        key: String,
        token: String,
        /// Lease length in seconds
        #[arg(long, default_value = "30")]
        ttl: u64,
    },

    /// Release a lease held under TOKEN
    Unlock { key: String, token: String },

    /// Run a program body directly
    Eval {
        body: String,
        /// Number of leading ARGS that are keys
        numkeys: usize,
        args: Vec<String>,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();

    let config = Config::builder()
        .store_addr(&args.server)
        .connect_timeout_ms(args.connect_timeout_ms)
        .pool_size(1)
        .build();

    match run(config, args.command) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(config: Config, command: Commands) -> Result<String, ScriptKvError> {
    let kv = ScriptKv::with_pool(TcpPool::new(config)?)?;

    let output = match command {
        Commands::Cas { key, expected, new } => {
            kv.compare_and_swap(&key, &expected, &new)?;
            "OK".to_string()
        }
        Commands::Cad { key, expected } => kv.compare_and_delete(&key, &expected)?.to_string(),
        Commands::Incr { key, delta } => kv.increment(&key, delta)?.to_string(),
        Commands::Hincr { key, field, delta } => kv.hash_increment(&key, &field, delta)?.to_string(),
        Commands::Hmincr { key, fields, deltas } => kv
            .multi_field_increment(&key, &fields, &deltas)?
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(" "),
        Commands::Lock { key, token, ttl } => {
            kv.lock(&key, &token, ttl)?;
            "OK".to_string()
        }
        Commands::Unlock { key, token } => {
            kv.unlock(&key, &token)?;
            "OK".to_string()
        }
        Commands::Eval { body, numkeys, args } => {
            let argv: Vec<_> = args.iter().map(|a| arg(a)).collect();
            render(&kv.exec(&body, numkeys, &argv)?)
        }
    };
    Ok(output)
}

fn render(reply: &Reply) -> String {
    match reply {
        Reply::Nil => "(nil)".to_string(),
        Reply::Status(s) => s.clone(),
        Reply::Int(n) => format!("(integer) {}", n),
        Reply::Bulk(b) => format!("\"{}\"", String::from_utf8_lossy(b)),
        Reply::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}) {}", i + 1, render(item)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
