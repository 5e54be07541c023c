use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Initialize a data directory (database, budget cache, default settings)
    Init {
        /// Data directory for the database, cache and settings
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Show stored counts per project
    Info {
        /// Data directory for the database, cache and settings
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Add a user that commit authors can resolve to
    Add {
        /// Data directory for the database, cache and settings
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// User ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Commit email of the user
        #[arg(long)]
        email: Option<String>,

        /// Login on the hosting platform
        #[arg(long)]
        login: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Add a project bound to a hosting repository
    Add {
        /// Data directory for the database, cache and settings
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Project ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Display name
        #[arg(long)]
        name: String,

        /// ID of the owning user
        #[arg(long)]
        owner: String,

        /// Hosting repository as owner/name
        #[arg(long)]
        repository: Option<String>,
    },
}

/// Arguments shared by every command that talks to the hosting API.
#[derive(Args)]
pub struct ProjectArgs {
    /// Data directory for the database, cache and settings
    #[arg(long, default_value = "./data")]
    pub data_dir: String,

    /// Project ID
    #[arg(long)]
    pub project: String,

    /// Hosting API token; anonymous budget when absent
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
