//! ringkv CLI Client
//!
//! Command-line interface for talking to a ringkv node over HTTP.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ringkv::cluster::ENTITY_PATH;
use ringkv::network::{ENTITIES_PATH, STATUS_PATH};
use ringkv::protocol::{read_response, write_request, Method, Request, Status};

/// ringkv CLI
#[derive(Parser, Debug)]
#[command(name = "ringkv-cli")]
#[command(about = "CLI for the ringkv key-value store")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Replica factor as ack/from (server default if omitted)
    #[arg(short, long)]
    replicas: Option<String>,

    /// Request timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Insert or replace a key
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Expire the key after this many milliseconds
        #[arg(long)]
        ttl_ms: Option<u64>,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List the node's live keys in [start, end)
    Range {
        start: String,
        end: Option<String>,
    },

    /// Check that the node is up
    Status,
}

fn main() {
    let args = Args::parse();

    match execute(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    }
}

/// Returns whether the server reported success
fn execute(args: &Args) -> ringkv::Result<bool> {
    let request = match &args.command {
        Commands::Get { key } => entity(Method::Get, key, args),
        Commands::Put { key, value, ttl_ms } => {
            let mut request = entity(Method::Put, key, args).with_body(value.clone().into_bytes());
            if let Some(ttl_ms) = ttl_ms {
                request = request.with_param("ttl", ttl_ms.to_string());
            }
            request
        }
        Commands::Del { key } => entity(Method::Delete, key, args),
        Commands::Range { start, end } => {
            let mut request = Request::new(Method::Get, ENTITIES_PATH).with_param("start", start);
            if let Some(end) = end {
                request = request.with_param("end", end);
            }
            request
        }
        Commands::Status => Request::new(Method::Get, STATUS_PATH),
    };

    let timeout = Duration::from_millis(args.timeout_ms);
    let stream = TcpStream::connect(&args.server)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let request = request.with_header("Connection", "close");
    let mut writer = BufWriter::new(stream.try_clone()?);
    write_request(&mut writer, &request, &args.server)?;
    let response = read_response(&mut BufReader::new(stream))?;

    let mut stdout = io::stdout().lock();
    match response.status {
        Status::Ok => {
            stdout.write_all(response.body_bytes())?;
            if !matches!(args.command, Commands::Range { .. }) {
                writeln!(stdout)?;
            }
        }
        status => writeln!(stdout, "{} {}", status.code(), status.reason())?,
    }

    Ok(matches!(
        response.status,
        Status::Ok | Status::Created | Status::Accepted
    ))
}

fn entity(method: Method, key: &str, args: &Args) -> Request {
    let mut request = Request::new(method, ENTITY_PATH).with_param("id", key);
    if let Some(replicas) = &args.replicas {
        request = request.with_param("replicas", replicas);
    }
    request
}
