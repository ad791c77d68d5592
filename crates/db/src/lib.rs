pub extern crate tokio_postgres as pg;

extern crate tracing as log;

pub mod client;
pub mod migrate;

pub use client::{Client, ClientError};
pub use pg::Row;
