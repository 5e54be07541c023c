use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use commitsync::cli::{
    AdminCommands, ProjectArgs, ProjectCommands, UserCommands, init_store, load_settings,
    open_cache, run_discover, run_enrich, run_info, run_init, run_project_add, run_quota, run_sync,
    run_user_add,
};
use commitsync::config::ServerConfig;
use commitsync::server::{AppState, create_router};

#[derive(Parser)]
#[command(name = "commitsync")]
#[command(about = "Budget-aware commit history sync from a git hosting API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database, cache and settings
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Run a full pass: discover branches, sync commits, enrich stats
    Sync {
        #[command(flatten)]
        args: ProjectArgs,

        /// Only sync this branch
        #[arg(long)]
        branch: Option<String>,

        /// Store commit summaries without fetching diff stats
        #[arg(long)]
        shallow: bool,
    },

    /// Discover branches and their owners
    Discover {
        #[command(flatten)]
        args: ProjectArgs,
    },

    /// Backfill diff stats for commits stored without them
    Enrich {
        #[command(flatten)]
        args: ProjectArgs,
    },

    /// Show the rate budget and this project's share of it
    Quota {
        #[command(flatten)]
        args: ProjectArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("commitsync=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => run_init(data_dir)?,
            AdminCommands::User { command } => match command {
                UserCommands::Add {
                    data_dir,
                    id,
                    email,
                    login,
                } => run_user_add(data_dir, id, email, login)?,
            },
            AdminCommands::Project { command } => match command {
                ProjectCommands::Add {
                    data_dir,
                    id,
                    name,
                    owner,
                    repository,
                } => run_project_add(data_dir, id, name, owner, repository)?,
            },
            AdminCommands::Info { data_dir, json } => run_info(data_dir, json)?,
        },
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
            };
            let data_dir = config.data_dir.to_string_lossy().into_owned();

            let store = init_store(&data_dir)?;
            let cache = open_cache(&data_dir)?;
            let settings = load_settings(&data_dir)?;

            let state = Arc::new(AppState::new(Arc::new(store), Arc::new(cache), settings)?);

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
        Commands::Sync {
            args,
            branch,
            shallow,
        } => run_sync(args, branch, shallow).await?,
        Commands::Discover { args } => run_discover(args).await?,
        Commands::Enrich { args } => run_enrich(args).await?,
        Commands::Quota { args } => run_quota(args)?,
    }

    Ok(())
}
