use anyhow::{anyhow, bail, Context};
use std::{
    env,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

/// Address of the external counter store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
}

impl StoreConfig {
    pub const DEFAULT_HOST: &'static str = "redis";
    pub const DEFAULT_PORT: u16 = 6379;

    /// Reads `REDIS_HOST` and `REDIS_PORT`, falling back to `redis:6379`.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let host = env::var("REDIS_HOST").unwrap_or(Self::DEFAULT_HOST.into());
        let port = match env::var("REDIS_PORT") {
            Ok(s) => parse_port("REDIS_PORT", &s)?,
            Err(_) => Self::DEFAULT_PORT,
        };
        Self::new(host, port)
    }

    pub fn new(host: impl Into<String>, port: u16) -> anyhow::Result<Self> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            bail!("REDIS_HOST must not be empty");
        }
        if port == 0 {
            bail!("REDIS_PORT must not be 0");
        }
        Ok(Self { host, port })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsConfig {
    pub pem_cert: PathBuf,
    pub pem_key: PathBuf,
}

/// Where and how the http server listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub tls: Option<TlsConfig>,
}

impl ServerConfig {
    pub const DEFAULT_BIND: &'static str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 5000;

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let bind = env::var("SERVER_BIND").unwrap_or(Self::DEFAULT_BIND.into());
        let bind = bind
            .trim()
            .parse::<IpAddr>()
            .with_context(|| format!("SERVER_BIND is not an ip address: {bind}"))?;
        let port = match env::var("SERVER_PORT") {
            Ok(s) => parse_port("SERVER_PORT", &s)?,
            Err(_) => Self::DEFAULT_PORT,
        };
        let tls = if env::var("TLS").is_ok() {
            Some(TlsConfig {
                pem_cert: env::var("TLS_PEM_CERT")
                    .context("TLS_PEM_CERT required when TLS is set")?
                    .into(),
                pem_key: env::var("TLS_PEM_KEY")
                    .context("TLS_PEM_KEY required when TLS is set")?
                    .into(),
            })
        } else {
            None
        };
        Ok(Self { bind, port, tls })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn parse_port(name: &str, value: &str) -> anyhow::Result<u16> {
    let port = value
        .trim()
        .parse::<u16>()
        .map_err(|e| anyhow!("{name} is not a valid port ({value}): {e}"))?;
    if port == 0 {
        bail!("{name} must not be 0");
    }
    Ok(port)
}
