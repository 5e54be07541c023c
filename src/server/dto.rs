use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    /// Sync only this branch; every known branch when absent.
    #[serde(default)]
    pub branch: Option<String>,
}
