use clap::{Parser, Subcommand};

/// Valetgate — access-key licensing and tenant reporting backend
#[derive(Parser)]
#[command(name = "valetgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (overrides VALETGATE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}
