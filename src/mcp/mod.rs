pub mod error;
pub mod progress;
pub mod server;
pub mod turns;
pub mod types;

pub use server::{run_mcp_server, ForgeServer};
pub use turns::TurnStore;
pub use types::*;
