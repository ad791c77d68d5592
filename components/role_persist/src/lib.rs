#[macro_use]
extern crate serde;

extern crate tracing as log;

pub mod cache;
pub mod error;
pub mod event;
pub mod models;
pub mod platform;
pub mod reactor;
pub mod service;
pub mod sf;
pub mod store;
pub mod toggle;

#[cfg(test)]
mod test_support;

pub use error::{Error, NotifyError, PlatformError, StoreError};
pub use models::{Actor, PersistKey, Role, RolePersistNotification, RolePersistRecord, RoleSet, StoreChange, ToggleOutcome};
pub use reactor::PersistenceReactor;
pub use service::RolePersistService;
pub use sf::{PartyId, RoleId, Snowflake, UserId};
