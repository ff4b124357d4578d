use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "qanda")]
#[command(about = "Q&A site: questions, answers, tags and votes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,
    },

    /// Run database migrations
    Migrate,

    /// Delete expired login sessions
    PurgeSessions,
}
