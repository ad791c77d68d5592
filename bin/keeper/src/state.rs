use std::sync::atomic::AtomicI64;

use role_persist::{PersistenceReactor, RolePersistService};

use crate::config::LocalConfig;
use crate::platform::PartyAllowList;

/// `last_event` before the feed cursor has been loaded
pub const CURSOR_UNLOADED: i64 = -1;

pub struct KeeperStateInner {
    pub config: LocalConfig,
    pub db: db::Client,
    pub reactor: PersistenceReactor,
    pub eligibility: PartyAllowList,

    /// Counter of the last event log row handled
    pub last_event: AtomicI64,
}

#[derive(Clone)]
#[repr(transparent)]
pub struct KeeperState(triomphe::Arc<KeeperStateInner>);

impl std::ops::Deref for KeeperState {
    type Target = KeeperStateInner;

    #[inline(always)]
    fn deref(&self) -> &KeeperStateInner {
        &self.0
    }
}

impl KeeperState {
    pub fn new(config: LocalConfig, db: db::Client, reactor: PersistenceReactor, eligibility: PartyAllowList) -> Self {
        KeeperState(triomphe::Arc::new(KeeperStateInner {
            config,
            db,
            reactor,
            eligibility,
            last_event: AtomicI64::new(CURSOR_UNLOADED),
        }))
    }

    #[inline]
    pub fn service(&self) -> &RolePersistService {
        self.reactor.service()
    }
}
