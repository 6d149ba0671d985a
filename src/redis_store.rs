//! Redis-backed [`CounterStore`].
//!
//! The counting program is registered with `SCRIPT LOAD` and run with
//! `EVALSHA <sha> 1 <key> <expiry>`. Redis executes scripts atomically, so
//! concurrent callers in any number of processes observe distinct counts.

use std::{
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use redis::{
    Client, ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo, RedisError,
    aio::ConnectionManager,
};

use crate::{CounterKey, CounterReply, CounterStore, DolphError, ExpirySeconds, ScriptHash};

/// Number of Redis connections a [`RedisCounterStore`] keeps open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionCount(usize);

impl Default for ConnectionCount {
    /// Returns a single connection.
    fn default() -> Self {
        Self(1)
    }
}

impl Deref for ConnectionCount {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<usize> for ConnectionCount {
    type Error = DolphError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(DolphError::InvalidConnectionCount(
                "Connection count must be greater than 0".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Connection parameters used when no pre-built client is supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConnection {
    /// Redis host name or address.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Logical database index.
    pub db: i64,
    /// ACL user name.
    pub username: Option<String>,
    /// Password for `AUTH`.
    pub password: Option<String>,
    /// Connections to open and hand out round-robin.
    pub connection_count: ConnectionCount,
}

impl Default for StoreConnection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
            connection_count: ConnectionCount::default(),
        }
    }
}

impl StoreConnection {
    /// Typed connection info for these parameters.
    pub fn connection_info(&self) -> Result<ConnectionInfo, DolphError> {
        let mut redis_settings = RedisConnectionInfo::default().set_db(self.db);

        if let Some(username) = &self.username {
            redis_settings = redis_settings.set_username(username);
        }

        if let Some(password) = &self.password {
            redis_settings = redis_settings.set_password(password);
        }

        let info = ConnectionAddr::Tcp(self.host.clone(), self.port)
            .into_connection_info()?
            .set_redis_settings(redis_settings);

        Ok(info)
    }

    /// Open a client for these parameters.
    pub fn client(&self) -> Result<Client, DolphError> {
        Ok(Client::open(self.connection_info()?)?)
    }
}

/// A [`CounterStore`] over one or more [`redis::aio::ConnectionManager`]s.
#[derive(Debug)]
pub struct RedisCounterStore {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

impl RedisCounterStore {
    /// Create a store holding a single connection from `client`.
    pub async fn default_from_client(client: Client) -> Result<Self, DolphError> {
        Self::from_client(client, ConnectionCount::default()).await
    }

    /// Create a store holding `connection_count` connections from `client`.
    pub async fn from_client(
        client: Client,
        connection_count: ConnectionCount,
    ) -> Result<Self, DolphError> {
        let mut connection_managers = Vec::with_capacity(*connection_count);

        for _ in 0..*connection_count {
            connection_managers.push(client.get_connection_manager().await?);
        }

        Ok(Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        })
    }

    /// Connect using `connection`.
    pub async fn connect(connection: &StoreConnection) -> Result<Self, DolphError> {
        tracing::debug!(
            host = %connection.host,
            port = connection.port,
            db = connection.db,
            "Connecting counter store"
        );

        Self::from_client(connection.client()?, connection.connection_count).await
    }

    /// Wrap an existing connection manager.
    pub fn from_connection_manager(connection_manager: ConnectionManager) -> Self {
        Self {
            connection_managers: Arc::new(vec![connection_manager]),
            track_index: AtomicUsize::new(0),
        }
    }

    /// Get a connection, round-robin.
    pub(crate) fn get(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    } // end method get
} // end impl RedisCounterStore

impl Clone for RedisCounterStore {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

impl CounterStore for RedisCounterStore {
    async fn load_script(&self, source: &str) -> Result<ScriptHash, DolphError> {
        let mut connection_manager = self.get();

        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(source)
            .query_async(&mut connection_manager)
            .await?;

        Ok(ScriptHash::from(sha))
    }

    async fn eval_counter(
        &self,
        hash: &ScriptHash,
        key: &CounterKey,
        expiry: ExpirySeconds,
    ) -> Result<CounterReply, DolphError> {
        let mut connection_manager = self.get();

        let (count, ttl): (i64, i64) = redis::cmd("EVALSHA")
            .arg(hash.as_str())
            .arg(1)
            .arg(key.as_str())
            .arg(*expiry)
            .query_async(&mut connection_manager)
            .await
            .map_err(|err| map_eval_error(err, hash))?;

        Ok(CounterReply::from_raw(count, ttl))
    }
}

fn map_eval_error(err: RedisError, hash: &ScriptHash) -> DolphError {
    let no_script = err.kind() == redis::ErrorKind::Server(redis::ServerErrorKind::NoScript)
        || err.code() == Some("NOSCRIPT");

    if no_script {
        DolphError::UnknownScript(hash.clone())
    } else {
        DolphError::RedisError(err)
    }
}
