use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "huddle-server", about = "Huddle rooms, calls and chat server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/huddle.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create (or refresh) a user and print a gateway token for it.
    MintToken {
        /// Stable user id (the token subject)
        user_id: String,
        /// Display name stored for the user
        #[arg(long)]
        name: Option<String>,
    },
}
