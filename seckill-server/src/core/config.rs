use crate::lock::LockKind;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Database path that selects an in-memory SQLite database
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// 服务器配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖（`.env` 文件由 `dotenvy` 预先加载）：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./data | 工作目录 |
/// | DATABASE_PATH | {WORK_DIR}/seckill.db | SQLite 路径，`:memory:` 为内存库 |
/// | HTTP_PORT | 8081 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | REDIS_URL | (未设置) | 共享存储；未设置时使用进程内存储 |
/// | LOG_LEVEL | info | 日志级别 (`RUST_LOG` 优先) |
/// | LOG_DIR | (未设置) | 日志目录，存在时按天滚动写文件 |
/// | REQUEST_TIMEOUT_MS | 30000 | 请求超时(毫秒) |
///
/// 秒杀链路配置见 [`SeckillConfig`]。
///
/// # 示例
///
/// ```ignore
/// REDIS_URL=redis://127.0.0.1:6379 HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存放数据库与日志
    pub work_dir: String,
    /// SQLite 数据库路径
    pub database_path: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    /// Redis 连接串
    pub redis_url: Option<String>,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// 请求超时时间 (毫秒)
    pub request_timeout_ms: u64,
    /// 秒杀链路
    pub seckill: SeckillConfig,
}

/// 秒杀链路配置
///
/// | 环境变量 | 默认值 |
/// |----------|--------|
/// | SECKILL_STREAM | stream.orders |
/// | SECKILL_GROUP | g1 |
/// | SECKILL_CONSUMER | c1 |
/// | SECKILL_READ_BLOCK_MS | 2000 |
/// | SECKILL_LOCK_KIND | watchdog |
/// | SECKILL_LOCK_WAIT_MS | 0 |
/// | SECKILL_LOCK_LEASE_MS | 30000 |
/// | SECKILL_RECOVERY_BACKOFF_MS | 20 |
/// | SECKILL_SWEEP_INTERVAL_MS | 5000 |
#[derive(Debug, Clone)]
pub struct SeckillConfig {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    /// Live read timeout
    pub read_block: Duration,
    pub lock_kind: LockKind,
    /// Per-user lock wait budget; zero means one attempt
    pub lock_wait: Duration,
    pub lock_lease: Duration,
    pub recovery_backoff: Duration,
    pub backlog_sweep_interval: Duration,
}

impl Default for SeckillConfig {
    fn default() -> Self {
        Self {
            stream: "stream.orders".into(),
            group: "g1".into(),
            consumer: "c1".into(),
            read_block: Duration::from_millis(2000),
            lock_kind: LockKind::Watchdog,
            lock_wait: Duration::ZERO,
            lock_lease: Duration::from_millis(30_000),
            recovery_backoff: Duration::from_millis(20),
            backlog_sweep_interval: Duration::from_millis(5000),
        }
    }
}

impl SeckillConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            parsed(lookup, key)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            stream: lookup("SECKILL_STREAM").unwrap_or(defaults.stream),
            group: lookup("SECKILL_GROUP").unwrap_or(defaults.group),
            consumer: lookup("SECKILL_CONSUMER").unwrap_or(defaults.consumer),
            read_block: millis("SECKILL_READ_BLOCK_MS", defaults.read_block),
            lock_kind: parsed(lookup, "SECKILL_LOCK_KIND").unwrap_or(defaults.lock_kind),
            lock_wait: millis("SECKILL_LOCK_WAIT_MS", defaults.lock_wait),
            lock_lease: millis("SECKILL_LOCK_LEASE_MS", defaults.lock_lease),
            recovery_backoff: millis("SECKILL_RECOVERY_BACKOFF_MS", defaults.recovery_backoff),
            backlog_sweep_interval: millis(
                "SECKILL_SWEEP_INTERVAL_MS",
                defaults.backlog_sweep_interval,
            ),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源加载配置 (测试用)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let work_dir = lookup("WORK_DIR").unwrap_or_else(|| "./data".into());
        let database_path = lookup("DATABASE_PATH").unwrap_or_else(|| {
            PathBuf::from(&work_dir)
                .join("seckill.db")
                .to_string_lossy()
                .into_owned()
        });

        Self {
            database_path,
            http_port: parsed(&lookup, "HTTP_PORT").unwrap_or(8081),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".into()),
            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_dir: lookup("LOG_DIR"),
            request_timeout_ms: parsed(&lookup, "REQUEST_TIMEOUT_MS").unwrap_or(30_000),
            seckill: SeckillConfig::from_lookup(&lookup),
            work_dir,
        }
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn uses_in_memory_database(&self) -> bool {
        self.database_path == IN_MEMORY_DATABASE
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
