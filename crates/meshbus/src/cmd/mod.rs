use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a payload as a frame and print it as hex.
    Encode(EncodeArgs),
    /// Parse a hex-encoded frame and describe it.
    Decode(DecodeArgs),
    /// Run message buses over an in-process mesh and report deliveries.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Type tag to frame the payload with (0 = raw).
    #[arg(long, short = 't', default_value = "0")]
    pub tag: u8,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex-encoded frame. Whitespace is ignored.
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of buses on the mesh.
    #[arg(long, short = 'p', default_value = "3")]
    pub peers: usize,
    /// Messages each bus sends.
    #[arg(long, short = 'c', default_value = "5")]
    pub count: usize,
    /// Subscription queue capacity per bus.
    #[arg(long, default_value_t = meshbus_dispatch::DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// Discovery service name.
    #[arg(long, default_value = meshbus_peer::DEFAULT_SERVICE_NAME)]
    pub service: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
