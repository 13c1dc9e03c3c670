//! Default capability adapters for blockflow: a reqwest-backed [`HttpClient`] and an
//! in-memory [`DbAdapter`] for local runs and tests.
//!
//! [`HttpClient`]: blockflow_core::capability::HttpClient
//! [`DbAdapter`]: blockflow_core::capability::DbAdapter

mod memory_db;
mod reqwest_client;

pub use memory_db::MemoryDb;
pub use reqwest_client::ReqwestHttpClient;
