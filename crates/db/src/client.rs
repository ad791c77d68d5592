use std::{
    any::{Any, TypeId},
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use arc_swap::{ArcSwap, ArcSwapOption};
use failsafe::futures::CircuitBreaker;
use futures::StreamExt;
use hashbrown::HashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_postgres as pg;
use tokio_postgres::{error::SqlState, types::ToSql, AsyncMessage, Row, Statement, ToStatement};

pub struct ClientInner {
    pub readonly: bool,
    pub config: pg::Config,
    autoreconnect: AtomicBool,
    client: ArcSwapOption<pg::Client>,
    cache: ArcSwap<HashMap<TypeId, Statement>>,
}

/// Single shared connection that reconnects in the background and caches
/// prepared statements for the lifetime of each underlying connection.
#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

impl Deref for Client {
    type Target = ClientInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Database error: {0}")]
    Db(#[from] pg::Error),
    #[error("Database is disconnected")]
    Disconnected,
}

impl ClientError {
    pub fn code(&self) -> Option<&SqlState> {
        match self {
            ClientError::Db(e) => e.code(),
            ClientError::Disconnected => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(&SqlState::UNIQUE_VIOLATION)
    }
}

impl Client {
    fn spawn_forward<S, T>(this: Self, mut connection: pg::Connection<S, T>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut messages = std::pin::pin!(futures::stream::poll_fn(move |cx| connection.poll_message(cx)));

            while let Some(msg) = messages.next().await {
                match msg {
                    Ok(AsyncMessage::Notice(notice)) => log::info!("Database notice: {notice}"),
                    Ok(_) => {}
                    Err(e) => {
                        log::error!("Database connection error: {e}");
                        break;
                    }
                }
            }

            this.client.store(None);

            log::info!(
                "Disconnected from {} database {:?}",
                if this.readonly { "read-only" } else { "writable" },
                this.config.get_dbname().unwrap_or("Unnamed")
            );

            if this.autoreconnect.load(Ordering::SeqCst) {
                log::info!("Attempting reconnect...");

                if let Err(e) = this.reconnect().await {
                    log::error!("Reconnect error: {e}");
                }
            }
        });
    }

    async fn real_connect(&self, attempt: u64) -> Result<(), ClientError> {
        let name = self.config.get_dbname().unwrap_or("Unnamed");

        log::info!(
            "Connecting ({attempt}) to {} database {name:?} at {:?}:{:?}...",
            if self.readonly { "read-only" } else { "writable" },
            self.config.get_hosts(),
            self.config.get_ports(),
        );

        let (client, connection) = self.config.connect(pg::NoTls).await?;

        Self::spawn_forward(self.clone(), connection);

        // statements are bound to the connection that prepared them
        self.cache.store(Default::default());
        self.client.store(Some(Arc::new(client)));

        log::info!("Connection to database {name:?} successful!");

        Ok(())
    }

    pub async fn reconnect(&self) -> Result<(), ClientError> {
        self.client.store(None);

        let circuit_breaker = failsafe::Config::new().build();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match circuit_breaker.call(self.real_connect(attempt)).await {
                Ok(_) => return Ok(()),
                Err(failsafe::Error::Inner(e)) => log::error!("Connect error: {e}"),
                Err(failsafe::Error::Rejected) => {
                    log::warn!("Connect rate-limited!");
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                }
            }

            if !self.autoreconnect.load(Ordering::SeqCst) {
                return Err(ClientError::Disconnected);
            }
        }
    }

    pub async fn connect(config: pg::Config, readonly: bool) -> Result<Self, ClientError> {
        let this = Client(Arc::new(ClientInner {
            readonly,
            config,
            autoreconnect: AtomicBool::new(true),
            client: ArcSwapOption::from(None),
            cache: ArcSwap::default(),
        }));

        this.reconnect().await?;

        Ok(this)
    }
}

// TODO: I'm sure there is something better than a regex for this
lazy_static::lazy_static! {
    static ref WRITE_REGEX: regex::Regex =
        regex::RegexBuilder::new(r#"\b(UPDATE|INSERT|ALTER|CREATE|DROP|GRANT|REVOKE|DELETE|TRUNCATE)\b"#)
            .case_insensitive(true)
            .build()
            .expect("valid write regex");
}

impl Client {
    #[inline(always)]
    fn debug_check_readonly<'a>(&self, query: &'a str) -> &'a str {
        if cfg!(debug_assertions) && self.readonly {
            assert!(!WRITE_REGEX.is_match(query), "write query on read-only client: {query}");
        }

        query
    }

    pub fn client(&self) -> Result<Arc<pg::Client>, ClientError> {
        match self.client.load_full() {
            Some(client) => Ok(client),
            None => Err(ClientError::Disconnected),
        }
    }

    pub async fn close(&self) {
        self.autoreconnect.store(false, Ordering::SeqCst);
        self.client.store(None);
    }

    /// Prepares the query returned by `query`, keyed on the closure's type so
    /// each call site is only prepared once per connection.
    pub async fn prepare_cached<F>(&self, query: F) -> Result<Statement, ClientError>
    where
        F: Any + FnOnce() -> &'static str,
    {
        let id = TypeId::of::<F>();

        // It's fine to get a cached entry if the client is disconnected
        // since it can't be used anyway.
        if let Some(stmt) = self.cache.load().get(&id) {
            return Ok(stmt.clone());
        }

        let stmt = self.client()?.prepare(self.debug_check_readonly(query())).await?;

        self.cache.rcu(|cache| {
            let mut cache = HashMap::clone(cache);
            cache.insert(id, stmt.clone());
            cache
        });

        Ok(stmt)
    }

    pub async fn execute<T>(&self, statement: &T, params: &[&(dyn ToSql + Sync)]) -> Result<u64, ClientError>
    where
        T: ?Sized + ToStatement,
    {
        self.client()?.execute(statement, params).await.map_err(ClientError::from)
    }

    pub async fn query_one<T>(&self, statement: &T, params: &[&(dyn ToSql + Sync)]) -> Result<Row, ClientError>
    where
        T: ?Sized + ToStatement,
    {
        self.client()?.query_one(statement, params).await.map_err(ClientError::from)
    }

    pub async fn query_opt<T>(
        &self,
        statement: &T,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, ClientError>
    where
        T: ?Sized + ToStatement,
    {
        self.client()?.query_opt(statement, params).await.map_err(ClientError::from)
    }

    pub async fn execute_cached<F>(&self, query: F, params: &[&(dyn ToSql + Sync)]) -> Result<u64, ClientError>
    where
        F: Any + FnOnce() -> &'static str,
    {
        self.execute(&self.prepare_cached(query).await?, params).await
    }

    pub async fn query_cached<F>(&self, query: F, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>, ClientError>
    where
        F: Any + FnOnce() -> &'static str,
    {
        let stmt = self.prepare_cached(query).await?;

        self.client()?.query(&stmt, params).await.map_err(ClientError::from)
    }

    pub async fn query_one_cached<F>(&self, query: F, params: &[&(dyn ToSql + Sync)]) -> Result<Row, ClientError>
    where
        F: Any + FnOnce() -> &'static str,
    {
        self.query_one(&self.prepare_cached(query).await?, params).await
    }

    pub async fn query_opt_cached<F>(
        &self,
        query: F,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, ClientError>
    where
        F: Any + FnOnce() -> &'static str,
    {
        self.query_opt(&self.prepare_cached(query).await?, params).await
    }
}
