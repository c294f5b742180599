//! SQL Server over tiberius.
//!
//! tiberius hands out single clients, so this module carries its own pool: a
//! semaphore caps the number of open clients and a queue keeps a few idle
//! ones for reuse.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::stream;
use thiserror::Error;
use tiberius::{ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::PoolSettings;
use crate::value::{Cell, RawRow, ResultSet, normalize};

type Client = tiberius::Client<Compat<TcpStream>>;

/// SQL Server pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("connection pool is closed")]
    Closed,

    #[error("timed out after {0:?} waiting for a free connection")]
    Timeout(Duration),

    #[error(transparent)]
    Driver(#[from] tiberius::error::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct PoolInner {
    config: Config,
    idle: Mutex<VecDeque<Client>>,
    semaphore: Arc<Semaphore>,
    max_idle: usize,
    acquire_timeout: Duration,
    closed: AtomicBool,
}

/// A bounded pool of tiberius clients.
#[derive(Clone)]
pub struct MssqlPool {
    inner: Arc<PoolInner>,
}

impl MssqlPool {
    /// Parse an ADO.NET connection string and open the first client.
    pub async fn connect(descriptor: &str, settings: &PoolSettings) -> Result<Self, PoolError> {
        let config = Config::from_ado_string(descriptor)?;
        let first = open_client(&config).await?;

        let inner = PoolInner {
            config,
            idle: Mutex::new(VecDeque::from([first])),
            semaphore: Arc::new(Semaphore::new(settings.max_connections as usize)),
            max_idle: settings.idle_connections as usize,
            acquire_timeout: settings.acquire_timeout(),
            closed: AtomicBool::new(false),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Check out a client, opening a new one when none is idle.
    pub async fn acquire(&self) -> Result<PooledClient, PoolError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let permit = tokio::time::timeout(inner.acquire_timeout, inner.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| PoolError::Timeout(inner.acquire_timeout))?
            .map_err(|_| PoolError::Closed)?;

        let parked = inner.idle.lock().await.pop_front();
        let client = match parked {
            Some(client) => client,
            None => open_client(&inner.config).await?,
        };

        Ok(PooledClient {
            client: Some(client),
            pool: Arc::clone(inner),
            permit: Some(permit),
            lease: Lease::default(),
        })
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        let mut client = self.acquire().await?;
        client.begin();
        let result = match client.simple_query("SELECT 1").await {
            Ok(stream) => stream.into_row().await.map(|_| ()),
            Err(e) => Err(e),
        };
        client.settle(result)
    }

    /// Run a query and read its first result set.
    pub async fn fetch(&self, sql: &str) -> Result<ResultSet, PoolError> {
        let mut client = self.acquire().await?;
        client.begin();
        let result = match client.simple_query(sql).await {
            Ok(stream) => stream.into_first_result().await,
            Err(e) => Err(e),
        };
        let rows = client.settle(result)?;
        normalize(stream::iter(rows.into_iter().map(Ok::<_, PoolError>))).await
    }

    /// Run a statement and return the rows it affected, summed over all of
    /// its result counts.
    pub async fn execute(&self, sql: &str) -> Result<u64, PoolError> {
        let mut client = self.acquire().await?;
        client.begin();
        let result = client.execute(sql, &[]).await;
        let done = client.settle(result)?;
        Ok(done.rows_affected().iter().sum())
    }

    /// Stop handing out clients and drop the idle ones. Checked-out clients
    /// are dropped when they come back.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.semaphore.close();
        self.inner.idle.lock().await.clear();
    }
}

async fn open_client(config: &Config) -> Result<Client, PoolError> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL may redirect the login to another node.
        Err(tiberius::error::Error::Routing { host, port }) => {
            let mut config = config.clone();
            config.host(&host);
            config.port(port);

            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Whether a checked-out client can go back to the idle queue.
///
/// A request dropped between `begin` and `settle` may be half written or
/// half read, which leaves the connection out of step with the server.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Lease {
    in_flight: bool,
    broken: bool,
}

impl Lease {
    fn begin(&mut self) {
        self.in_flight = true;
    }

    /// Pass a driver result through, marking the client broken when the
    /// error did not come from the server itself.
    fn settle<T>(&mut self, result: tiberius::Result<T>) -> Result<T, PoolError> {
        self.in_flight = false;
        result.map_err(|e| {
            if !matches!(e, tiberius::error::Error::Server(_)) {
                self.broken = true;
            }
            PoolError::from(e)
        })
    }

    fn reusable(&self) -> bool {
        !self.in_flight && !self.broken
    }
}

/// A checked-out client. Goes back to the idle queue on drop unless it saw a
/// transport error, was dropped mid-request, or the pool has closed.
pub struct PooledClient {
    client: Option<Client>,
    pool: Arc<PoolInner>,
    permit: Option<OwnedSemaphorePermit>,
    lease: Lease,
}

impl PooledClient {
    fn begin(&mut self) {
        self.lease.begin();
    }

    fn settle<T>(&mut self, result: tiberius::Result<T>) -> Result<T, PoolError> {
        self.lease.settle(result)
    }
}

impl Deref for PooledClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref().expect("client taken before drop")
    }
}

impl DerefMut for PooledClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.client.as_mut().expect("client taken before drop")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        if !self.lease.reusable() || self.pool.closed.load(Ordering::Acquire) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let pool = Arc::clone(&self.pool);
        // Hold the permit until the client is parked again.
        let permit = self.permit.take();
        handle.spawn(async move {
            let mut idle = pool.idle.lock().await;
            if idle.len() < pool.max_idle && !pool.closed.load(Ordering::Acquire) {
                idle.push_back(client);
            }
            drop(permit);
        });
    }
}

impl RawRow for tiberius::Row {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn cells(&self) -> Vec<Cell> {
        tiberius::Row::cells(self)
            .map(|(_, data)| cell_from(data))
            .collect()
    }
}

fn temporal<'a, T>(data: &'a ColumnData<'static>) -> Cell
where
    T: FromSql<'a> + ToString,
{
    match T::from_sql(data) {
        Ok(Some(v)) => Cell::Text(v.to_string()),
        Ok(None) => Cell::Null,
        Err(_) => Cell::Text(format!("{:?}", data)),
    }
}

fn cell_from(data: &ColumnData<'static>) -> Cell {
    match data {
        ColumnData::Bit(v) => v.map_or(Cell::Null, Cell::Bool),
        ColumnData::U8(v) => v.map_or(Cell::Null, |v| Cell::Int(v.into())),
        ColumnData::I16(v) => v.map_or(Cell::Null, |v| Cell::Int(v.into())),
        ColumnData::I32(v) => v.map_or(Cell::Null, |v| Cell::Int(v.into())),
        ColumnData::I64(v) => v.map_or(Cell::Null, Cell::Int),
        ColumnData::F32(v) => v.map_or(Cell::Null, |v| Cell::Float(v.into())),
        ColumnData::F64(v) => v.map_or(Cell::Null, Cell::Float),
        ColumnData::Numeric(v) => v.as_ref().map_or(Cell::Null, |v| Cell::Text(v.to_string())),
        ColumnData::String(v) => v
            .as_ref()
            .map_or(Cell::Null, |s| Cell::Text(s.to_string())),
        ColumnData::Binary(v) => v
            .as_ref()
            .map_or(Cell::Null, |b| Cell::Bytes(b.to_vec())),
        ColumnData::Guid(v) => v.as_ref().map_or(Cell::Null, |g| Cell::Text(g.to_string())),
        ColumnData::Xml(v) => v
            .as_ref()
            .map_or(Cell::Null, |x| Cell::Text(x.to_string())),
        ColumnData::Date(_) => temporal::<NaiveDate>(data),
        ColumnData::Time(_) => temporal::<NaiveTime>(data),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(data)
        }
        ColumnData::DateTimeOffset(_) => temporal::<DateTime<FixedOffset>>(data),
        #[allow(unreachable_patterns)]
        _ => Cell::Text(format!("{:?}", data)),
    }
}
