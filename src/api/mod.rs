//! API Module
//!
//! HTTP handlers and routing for the cache daemon.
//!
//! # Endpoints
//! - `PUT /set` - Store a value with optional lifetime and options
//! - `GET /get/:key` - Retrieve an entry
//! - `GET /exists/:key` - Check for a live entry
//! - `DELETE /del/:key` - Delete a key
//! - `POST /flush` - Wipe the active engine
//! - `GET|PUT /engine` - Inspect or switch the cache engine
//! - `POST /gc` - Run a garbage collection pass
//! - `GET|POST /persist` - Archive freshness / write the archive
//! - `POST /restore` - Restore the cache directory from the archive
//! - `GET /stats` - Store statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
