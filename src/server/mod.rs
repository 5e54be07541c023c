mod credential;
pub mod dto;
mod projects;
pub mod response;
mod router;

pub use credential::HostingCredential;
pub use router::{AppState, create_router};
