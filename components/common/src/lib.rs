extern crate tracing as log;

pub mod id_lock;
pub mod logging;
