use std::{str::FromStr, time::Duration};

use uuid::Uuid;

use crate::registry::{CheckPolicy, ServiceRegistration};

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub op_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ConsulConfig {
    /// Base URL of the agent HTTP API, e.g. `http://consul:8500`.
    pub address: String,
    pub token: Option<String>,
    pub wait_attempts: u32,
    pub wait_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub instance_id: String,
    pub address: String,
    pub port: u16,
    pub health_check_path: String,
    pub tags: Vec<String>,
    pub check: CheckPolicy,
}

impl ServiceConfig {
    pub fn registration(&self) -> ServiceRegistration {
        ServiceRegistration {
            service_name: self.name.clone(),
            instance_id: self.instance_id.clone(),
            address: self.address.clone(),
            port: self.port,
            health_check_path: self.health_check_path.clone(),
            tags: self.tags.clone(),
            check: self.check,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub redis: RedisConfig,
    pub consul: ConsulConfig,
    pub service: ServiceConfig,
    pub shutdown_timeout: Duration,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Empty values count as unset; unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let num = |key: &str, default: u64| parse_or(var(key), default);

        let port = parse_or(var("APP_PORT"), 8081u16);

        let redis_url = match var("REDIS_URL") {
            Some(url) => url,
            None => {
                let auth = var("REDIS_PASSWORD")
                    .map(|p| format!(":{p}@"))
                    .unwrap_or_default();
                format!(
                    "redis://{}{}:{}/{}",
                    auth,
                    or("REDIS_HOST", "redis"),
                    or("REDIS_PORT", "6379"),
                    num("REDIS_DB", 0)
                )
            }
        };

        let wait_attempts = parse_or(var("CONSUL_WAIT_ATTEMPTS"), 10u32);
        if wait_attempts == 0 {
            anyhow::bail!("CONSUL_WAIT_ATTEMPTS must be at least 1");
        }

        let name = or("SERVICE_NAME", "login-service");
        let instance_id = var("SERVICE_ID")
            .unwrap_or_else(|| format!("{}-{}", name, Uuid::new_v4().simple()));

        let health_check_path = or("HEALTH_CHECK_PATH", "/health");
        if !health_check_path.starts_with('/') {
            anyhow::bail!("HEALTH_CHECK_PATH must start with '/': {health_check_path}");
        }

        let tags = or("SERVICE_TAGS", "microservice,login,api")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            host: or("APP_HOST", "0.0.0.0"),
            port,
            redis: RedisConfig {
                url: redis_url,
                op_timeout: Duration::from_millis(num("REDIS_OP_TIMEOUT_MS", 2000)),
            },
            consul: ConsulConfig {
                address: format!(
                    "http://{}:{}",
                    or("CONSUL_HOST", "consul"),
                    or("CONSUL_PORT", "8500")
                ),
                token: var("CONSUL_TOKEN"),
                wait_attempts,
                wait_interval: Duration::from_secs(num("CONSUL_WAIT_INTERVAL_SECS", 2)),
            },
            service: ServiceConfig {
                name,
                instance_id,
                address: or("SERVICE_ADDRESS", "login-service"),
                port: parse_or(var("SERVICE_PORT"), port),
                health_check_path,
                tags,
                check: CheckPolicy {
                    interval: Duration::from_secs(num("HEALTH_CHECK_INTERVAL_SECS", 10)),
                    timeout: Duration::from_secs(num("HEALTH_CHECK_TIMEOUT_SECS", 5)),
                    deregister_after: Duration::from_secs(num("DEREGISTER_AFTER_SECS", 30)),
                },
            },
            shutdown_timeout: Duration::from_secs(num("SHUTDOWN_TIMEOUT_SECS", 5)),
            log: LogConfig {
                level: or("LOG_LEVEL", "info"),
                json: var("LOG_FORMAT").is_some_and(|v| v == "json"),
            },
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
