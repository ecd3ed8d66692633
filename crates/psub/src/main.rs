//! psub
//!
//! Runs a program, captures its stdout and re-serves the captured bytes to
//! clients of a local named channel. The channel address is the only thing
//! printed on stdout.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use psub::{CommandSpec, Session};
use psub_core::Config;

#[derive(Parser, Debug)]
#[command(name = "psub")]
#[command(version, about = "Serve a program's captured stdout over a local named channel")]
struct Args {
    /// Number of endpoints listening on the channel (default 5).
    #[arg(long)]
    redundancy: Option<usize>,

    /// Directory for the socket file (unix only).
    #[arg(long)]
    socket_dir: Option<PathBuf>,

    /// Log level filter (e.g. "warn", "info", "debug").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    /// Program to run, followed by its arguments (passed through unchanged).
    #[arg(
        value_name = "PROGRAM",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<OsString>,
}

impl Args {
    fn command_spec(&self) -> anyhow::Result<CommandSpec> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("No program given"))?;
        Ok(CommandSpec::new(program, args.iter().cloned()))
    }

    fn apply(&self, config: &mut Config) {
        if let Some(n) = self.redundancy {
            config.broadcast.redundancy = n;
        }
        if let Some(dir) = &self.socket_dir {
            config.broadcast.socket_dir = Some(dir.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = psub_core::config::load_config()?;
    args.apply(&mut config);

    let log_filter = format!("psub={0},psub_core={0}", config.logging.level);
    psub_core::tracing_init::init_tracing(&log_filter, config.logging.json);

    let session = Session::new(args.command_spec()?, &config.broadcast);
    session.announce(&mut std::io::stdout().lock())?;

    let report = session.run().await?;
    info!(
        status = %report.exit_status,
        bytes = report.captured_bytes,
        served = report.pool.served,
        "Done"
    );
    Ok(())
}
