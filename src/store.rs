use crate::config::StoreConfig;
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, ConnectionAddr, ConnectionInfo, FromRedisValue};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Key holding the shared counter.
pub const HITS_KEY: &str = "hits";

/// Remote atomic counter. Atomicity across callers is the store's job, not the client's.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments `key` by one and returns the new value.
    async fn increment(&self, key: &str) -> anyhow::Result<i64>;

    /// Succeeds when the store answers a liveness probe.
    async fn ping(&self) -> anyhow::Result<()>;
}

/// Store handle shared by every request, created once at startup.
pub type SharedStore = Arc<dyn CounterStore>;

pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Does not connect; the first command dials the server.
    pub fn new(config: &StoreConfig) -> anyhow::Result<Self> {
        // may be built before the app, so make sure logging is up
        crate::app::logger();
        let connection_info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: Default::default(),
        };
        let client = redis::Client::open(connection_info)?;
        info!("Counter store at {}:{}", config.host, config.port);
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> redis::RedisResult<MultiplexedConnection> {
        let mut cached = self.connection.lock().await;
        if let Some(connection) = cached.as_ref() {
            return Ok(connection.clone());
        }
        let connection = self.client.get_multiplexed_async_connection().await?;
        *cached = Some(connection.clone());
        Ok(connection)
    }

    async fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> redis::RedisResult<T> {
        let mut connection = self.connection().await?;
        let result = cmd.query_async(&mut connection).await;
        let broken = result
            .as_ref()
            .is_err_and(|err| err.is_io_error() || err.is_connection_dropped());
        if broken {
            // dial again on the next call
            self.connection.lock().await.take();
        }
        result
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str) -> anyhow::Result<i64> {
        let count: i64 = self.query(redis::cmd("INCR").arg(key)).await?;
        debug!("Incremented {key} to {count}");
        Ok(count)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let reply: String = self.query(&redis::cmd("PING")).await?;
        if reply != "PONG" {
            anyhow::bail!("unexpected ping reply: {reply}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering::SeqCst};
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::{tcp::OwnedReadHalf, TcpListener, TcpStream},
    };

    /// Just enough of a redis server: INCR on a single counter, PING, OK for the rest.
    #[derive(Default)]
    struct FakeRedis {
        hits: AtomicI64,
        connections: AtomicUsize,
        hang_up: AtomicBool,
    }

    async fn fake_store() -> (RedisStore, Arc<FakeRedis>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let fake = Arc::new(FakeRedis::default());
        let state = fake.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                state.connections.fetch_add(1, SeqCst);
                tokio::spawn(serve_connection(stream, state.clone()));
            }
        });
        let store = RedisStore::new(&StoreConfig::new("127.0.0.1", port).unwrap()).unwrap();
        (store, fake)
    }

    async fn serve_connection(stream: TcpStream, state: Arc<FakeRedis>) {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        while let Some(command) = read_command(&mut reader).await {
            let name = command.first().map(|c| c.to_ascii_uppercase());
            let reply = match name.as_deref() {
                Some("INCR") => format!(":{}\r\n", state.hits.fetch_add(1, SeqCst) + 1),
                Some("PING") => "+PONG\r\n".to_string(),
                _ => "+OK\r\n".to_string(),
            };
            if write.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
            if state.hang_up.swap(false, SeqCst) {
                return;
            }
        }
    }

    /// Reads one `*<n>` array of `$<len>` bulk strings.
    async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<String>> {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let n: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
        let mut args = Vec::with_capacity(n);
        for _ in 0..n {
            line.clear();
            reader.read_line(&mut line).await.ok()?;
            line.clear();
            reader.read_line(&mut line).await.ok()?;
            args.push(line.trim_end().to_string());
        }
        Some(args)
    }

    #[tokio::test]
    async fn increments_and_pings() {
        let (store, fake) = fake_store().await;
        assert_eq!(store.increment(HITS_KEY).await.unwrap(), 1);
        assert_eq!(store.increment(HITS_KEY).await.unwrap(), 2);
        store.ping().await.unwrap();
        assert_eq!(fake.connections.load(SeqCst), 1);
    }

    #[tokio::test]
    async fn redials_after_the_connection_drops() {
        let (store, fake) = fake_store().await;
        assert_eq!(store.increment(HITS_KEY).await.unwrap(), 1);

        fake.hang_up.store(true, SeqCst);
        assert_eq!(store.increment(HITS_KEY).await.unwrap(), 2);

        // the cached connection is gone: one failure, then a fresh dial
        assert!(store.increment(HITS_KEY).await.is_err());
        assert_eq!(store.increment(HITS_KEY).await.unwrap(), 3);
        store.ping().await.unwrap();
        assert_eq!(fake.connections.load(SeqCst), 2);
    }

    fn unreachable() -> RedisStore {
        // nothing listens on port 1
        RedisStore::new(&StoreConfig::new("127.0.0.1", 1).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn ping_fails_when_store_is_down() {
        let err = unreachable().ping().await.unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn increment_fails_when_store_is_down() {
        let store = unreachable();
        assert!(store.increment(HITS_KEY).await.is_err());
        // still usable afterwards
        assert!(store.increment(HITS_KEY).await.is_err());
    }
}
