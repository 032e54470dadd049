//! The `ctx` CLI run by operation child processes to call back into the
//! parent's operation context through the proxy socket.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use weaver::ctx_proxy::{self, CTX_SOCKET_URL, client};

#[derive(Parser, Debug)]
#[command(name = "ctx", about = "Operation context proxy client")]
struct Args {
    /// Request timeout in seconds
    #[arg(short = 't', long, default_value_t = 30)]
    timeout: u64,

    /// Proxy socket url; defaults to the environment the executor set
    #[arg(long, env = CTX_SOCKET_URL)]
    socket_url: Option<String>,

    /// Prefix marking an argument as inline JSON
    #[arg(long, default_value = "@")]
    json_arg_prefix: String,

    /// Print the payload as JSON instead of plain text
    #[arg(short = 'j', long)]
    json_output: bool,

    /// The ctx call, e.g. `node attributes get ip`
    args: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let Some(socket_url) = args.socket_url else {
        eprintln!("{}", ctx_proxy::Error::MissingSocketUrl);
        return ExitCode::FAILURE;
    };

    let operands = match client::process_args(&args.json_arg_prefix, &args.args) {
        Ok(operands) => operands,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match client::request(&socket_url, operands, Duration::from_secs(args.timeout)) {
        Ok(payload) => {
            if args.json_output {
                println!("{payload}");
            } else {
                match payload {
                    serde_json::Value::Null => {}
                    serde_json::Value::String(text) => print!("{text}"),
                    other => print!("{other}"),
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
