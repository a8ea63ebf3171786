use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{
    actions::{SendForResponseRequest, SendRequest},
    config::Config,
    serial,
};

/// The command line interface for serial gate.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Listen on this port instead of the configured one
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),

    /// List the serial ports of this machine.
    ListPorts,
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example JSON request for sending data to the device.
    Send,

    /// Show an example JSON request for sending until the device replies as expected.
    SendForResponse,
}

fn pretty_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("Could not serialize: {e}"))
}

/// Run a command, printing its output.
pub fn handle_command(command: Commands) -> Result<(), crate::error::Error> {
    match command {
        Commands::Examples(example) => {
            let text = match example {
                Examples::Config => Config::example().serialize_pretty(),
                Examples::Send => pretty_json(&SendRequest::example()),
                Examples::SendForResponse => pretty_json(&SendForResponseRequest::example()),
            };
            println!("{text}");
        }
        Commands::ListPorts => {
            for port in serial::list_ports()? {
                println!("{port}");
            }
        }
    }

    Ok(())
}
