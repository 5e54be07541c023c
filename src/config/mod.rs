mod server;
mod settings;

pub use server::ServerConfig;
pub use settings::{BudgetSettings, SyncMode, SyncSettings, SyncTuning};
