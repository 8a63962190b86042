use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "droplink")]
#[command(about = "Direct peer-to-peer file handoff between two terminals", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open an interactive peer session
    Open {
        /// Rendezvous server address
        #[arg(long, short = 'r', default_value = "ws://127.0.0.1:9000")]
        rendezvous: String,

        /// Directory where received files are saved
        #[arg(long, short = 'o', default_value = ".")]
        output: PathBuf,
    },

    /// Run a rendezvous server
    Serve {
        /// Port to listen on
        #[arg(long, short = 'p', default_value_t = crate::rendezvous::DEFAULT_PORT)]
        port: u16,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
