// Library surface for headless/integration tests and reuse.
// The terminal front end (App, rendering) lives in main.rs.
pub mod app_dirs;
pub mod config;
pub mod logging;
pub mod passages;
pub mod runtime;
pub mod session;
pub mod store;
