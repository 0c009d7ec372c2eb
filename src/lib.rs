pub mod cli;
pub mod codegen;
pub mod config;
pub mod container;
pub mod dxf;
pub mod embedding;
pub mod error;
pub mod executor;
pub mod init;
pub mod llm;
pub mod mcp;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod retrieval;
pub mod storage;

pub use error::ForgeError;
