use std::fs;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{ServerConfig, SyncSettings};
use crate::store::{SqliteStore, Store};
use crate::types::{Project, User};

use super::{init_store, open_cache};

pub fn run_init(data_dir: String) -> anyhow::Result<()> {
    let config = ServerConfig {
        data_dir: data_dir.into(),
        ..ServerConfig::default()
    };
    fs::create_dir_all(&config.data_dir)?;

    let settings_path = config.settings_path();
    if settings_path.exists() {
        anyhow::bail!(
            "Already initialized. Settings exist at: {}",
            settings_path.display()
        );
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    open_cache(&config.data_dir.to_string_lossy())?;
    fs::write(&settings_path, SyncSettings::default().to_toml()?)?;

    println!("Initialized {}", config.data_dir.display());
    println!("  database: {}", config.db_path().display());
    println!("  cache:    {}", config.cache_path().display());
    println!("  settings: {}", settings_path.display());

    Ok(())
}

pub fn run_user_add(
    data_dir: String,
    id: Option<String>,
    email: Option<String>,
    login: Option<String>,
) -> anyhow::Result<()> {
    if email.is_none() && login.is_none() {
        anyhow::bail!("At least one of --email or --login is required");
    }
    let store = init_store(&data_dir)?;

    let user = User {
        id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        email,
        hosting_username: login,
        created_at: Utc::now(),
    };
    if store.get_user(&user.id)?.is_some() {
        anyhow::bail!("User '{}' already exists", user.id);
    }
    store.create_user(&user)?;

    println!("Created user {}", user.id);
    Ok(())
}

pub fn run_project_add(
    data_dir: String,
    id: Option<String>,
    name: String,
    owner: String,
    repository: Option<String>,
) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;

    if store.get_user(&owner)?.is_none() {
        anyhow::bail!("Owner '{}' not found", owner);
    }
    if let Some(repo) = &repository {
        repo.parse::<crate::types::RepoRef>()?;
    }

    let project = Project {
        id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        name,
        owner_id: owner,
        repository,
        created_at: Utc::now(),
    };
    if store.get_project(&project.id)?.is_some() {
        anyhow::bail!("Project '{}' already exists", project.id);
    }
    store.create_project(&project)?;

    println!("Created project {}", project.id);
    Ok(())
}

#[derive(Serialize)]
struct ProjectInfo {
    id: String,
    name: String,
    repository: Option<String>,
    branches: usize,
    commits: i64,
    unenriched: i64,
}

pub fn run_info(data_dir: String, json: bool) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;

    let mut infos = Vec::new();
    for project in store.list_projects()? {
        infos.push(ProjectInfo {
            branches: store.list_branches(&project.id)?.len(),
            commits: store.count_commits(&project.id)?,
            unenriched: store.count_unenriched_commits(&project.id)?,
            id: project.id,
            name: project.name,
            repository: project.repository,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    println!();
    println!("Projects: {}", infos.len());
    println!("{}", "─".repeat(20));
    for info in &infos {
        println!(
            "{}  {}  repo={}  branches={}  commits={}  unenriched={}",
            info.id,
            info.name,
            info.repository.as_deref().unwrap_or("-"),
            info.branches,
            info.commits,
            info.unenriched
        );
    }
    println!();

    Ok(())
}
