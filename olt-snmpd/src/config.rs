use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::{
    is_valid_board, is_valid_pon, BOARDS, DEFAULT_CACHE_TTL_SECS, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE, PONS_PER_BOARD,
};
use crate::snmp::Oid;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub snmp: SnmpConfig,
    #[serde(default)]
    pub olt: OltConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnmpConfig {
    pub host: String,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    #[serde(default = "default_community")]
    pub community: String,
    /// Per-attempt wait for a response
    #[serde(default = "default_snmp_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// max-repetitions for GetBulk during table walks
    #[serde(default = "default_max_repetitions")]
    pub max_repetitions: u32,
}

/// Telemetry attributes the device exposes per ONU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// ONU name table; its walk defines which slots exist
    Identity,
    OnuType,
    SerialNumber,
    RxPower,
    TxPower,
    Status,
    IpAddress,
    Description,
    LastOnline,
    LastOffline,
    OfflineReason,
    OpticalDistance,
}

impl Attribute {
    pub const ALL: [Attribute; 12] = [
        Attribute::Identity,
        Attribute::OnuType,
        Attribute::SerialNumber,
        Attribute::RxPower,
        Attribute::TxPower,
        Attribute::Status,
        Attribute::IpAddress,
        Attribute::Description,
        Attribute::LastOnline,
        Attribute::LastOffline,
        Attribute::OfflineReason,
        Attribute::OpticalDistance,
    ];
}

/// Which of the two vendor subtrees an attribute lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BaseOid {
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
}

/// Where one attribute lives: `<base>.<oid>.<port index>.<onu_id>[.<instance_suffix>]`,
/// the port index being the one the port carries for `base`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeOid {
    pub base: BaseOid,
    pub oid: String,
    #[serde(default)]
    pub instance_suffix: Option<u32>,
}

impl AttributeOid {
    fn new(base: BaseOid, oid: &str, instance_suffix: Option<u32>) -> Self {
        Self {
            base,
            oid: oid.to_string(),
            instance_suffix,
        }
    }
}

/// One (board, pon) row of the address table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortConfig {
    pub board: u8,
    pub pon: u8,
    /// Port index under `base_oid_1`
    pub if_index: u32,
    /// Port index under `base_oid_2`; ZTE numbering when absent
    #[serde(default)]
    pub if_index_2: Option<u32>,
    /// Table OIDs below the base for this port only, replacing `<oid>.<port index>`
    #[serde(default)]
    pub oids: BTreeMap<Attribute, String>,
}

impl PortConfig {
    /// Port with ZTE C320 indexes and no per-attribute overrides
    pub fn zte(board: u8, pon: u8) -> Self {
        Self {
            board,
            pon,
            if_index: zte_if_index(board, pon),
            if_index_2: Some(zte_if_index_2(board, pon)),
            oids: BTreeMap::new(),
        }
    }

    pub fn index(&self, base: BaseOid) -> u32 {
        match base {
            BaseOid::First => self.if_index,
            BaseOid::Second => self
                .if_index_2
                .unwrap_or_else(|| zte_if_index_2(self.board, self.pon)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OltConfig {
    #[serde(default = "default_base_oid_1")]
    pub base_oid_1: String,
    #[serde(default = "default_base_oid_2")]
    pub base_oid_2: String,
    /// Offset of the device clock from UTC, applied when computing uptime
    #[serde(default = "default_utc_offset")]
    pub utc_offset_secs: i64,
    /// Overrides for the built-in attribute layout
    #[serde(default)]
    pub attributes: BTreeMap<Attribute, AttributeOid>,
    #[serde(default = "default_ports")]
    pub ports: Vec<PortConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackendKind,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    /// Prepended to every key, e.g. "olt-a:"
    #[serde(default)]
    pub key_prefix: String,
    /// Bound on a single backend read or write; slower calls count as misses
    #[serde(default = "default_cache_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Upper bound for one request's poll + decode pipeline
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_snmp_port() -> u16 {
    161
}

fn default_community() -> String {
    "public".to_string()
}

fn default_snmp_timeout() -> u64 {
    5
}

fn default_retries() -> u32 {
    1
}

fn default_max_repetitions() -> u32 {
    25
}

fn default_base_oid_1() -> String {
    ".1.3.6.1.4.1.3902.1012".to_string()
}

fn default_base_oid_2() -> String {
    ".1.3.6.1.4.1.3902.1082".to_string()
}

fn default_utc_offset() -> i64 {
    7 * 3600
}

/// ZTE C320 numbering under base 1: 0x1000_0000 | board << 16 | pon << 8
pub fn zte_if_index(board: u8, pon: u8) -> u32 {
    0x1000_0000 | (u32::from(board) << 16) | (u32::from(pon) << 8)
}

/// ZTE C320 numbering under base 2: 0x1101_0000 | board << 8 | pon
pub fn zte_if_index_2(board: u8, pon: u8) -> u32 {
    0x1101_0000 | (u32::from(board) << 8) | u32::from(pon)
}

fn default_ports() -> Vec<PortConfig> {
    BOARDS
        .iter()
        .flat_map(|&board| (1..=PONS_PER_BOARD).map(move |pon| PortConfig::zte(board, pon)))
        .collect()
}

fn default_attribute_oid(attribute: Attribute) -> AttributeOid {
    use BaseOid::{First, Second};
    match attribute {
        Attribute::Identity => AttributeOid::new(First, "3.28.1.1.2", None),
        Attribute::OnuType => AttributeOid::new(Second, "3.50.11.2.1.17", None),
        Attribute::SerialNumber => AttributeOid::new(First, "3.28.1.1.5", None),
        Attribute::RxPower => AttributeOid::new(First, "3.50.12.1.1.10", Some(1)),
        Attribute::TxPower => AttributeOid::new(Second, "500.20.2.2.2.1.10", Some(1)),
        Attribute::Status => AttributeOid::new(First, "3.28.2.1.4", None),
        Attribute::IpAddress => AttributeOid::new(Second, "500.10.2.3.3.1.2", Some(1)),
        Attribute::Description => AttributeOid::new(First, "3.28.1.1.3", None),
        Attribute::LastOnline => AttributeOid::new(First, "3.28.2.1.5", None),
        Attribute::LastOffline => AttributeOid::new(First, "3.28.2.1.6", None),
        Attribute::OfflineReason => AttributeOid::new(First, "3.28.2.1.7", None),
        Attribute::OpticalDistance => AttributeOid::new(First, "3.11.4.1.2", None),
    }
}

fn default_cache_backend() -> CacheBackendKind {
    CacheBackendKind::Redis
}

fn default_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_cache_timeout() -> u64 {
    500
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_listen() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    MAX_PAGE_SIZE
}

impl Default for OltConfig {
    fn default() -> Self {
        Self {
            base_oid_1: default_base_oid_1(),
            base_oid_2: default_base_oid_2(),
            utc_offset_secs: default_utc_offset(),
            attributes: BTreeMap::new(),
            ports: default_ports(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            ttl_secs: default_ttl(),
            key_prefix: String::new(),
            timeout_ms: default_cache_timeout(),
            redis: RedisConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout_secs: default_request_timeout(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl OltConfig {
    /// Layout for `attribute`, with any configured override applied
    pub fn attribute_oid(&self, attribute: Attribute) -> AttributeOid {
        self.attributes
            .get(&attribute)
            .cloned()
            .unwrap_or_else(|| default_attribute_oid(attribute))
    }

    pub fn base_oid(&self, base: BaseOid) -> &str {
        match base {
            BaseOid::First => &self.base_oid_1,
            BaseOid::Second => &self.base_oid_2,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Reject tables the resolver could not serve correctly
    pub fn validate(&self) -> Result<()> {
        for base in [&self.olt.base_oid_1, &self.olt.base_oid_2] {
            base.parse::<Oid>()
                .with_context(|| format!("Bad base OID {:?}", base))?;
        }

        for attribute in Attribute::ALL {
            let layout = self.olt.attribute_oid(attribute);
            let full = format!("{}.{}", self.olt.base_oid(layout.base), layout.oid);
            full.parse::<Oid>()
                .with_context(|| format!("Bad OID for {:?}: {:?}", attribute, layout.oid))?;
        }

        let mut seen = HashSet::new();
        for port in &self.olt.ports {
            if !is_valid_board(port.board) || !is_valid_pon(port.pon) {
                bail!("Port board={} pon={} is outside the chassis", port.board, port.pon);
            }
            if !seen.insert((port.board, port.pon)) {
                bail!("Port board={} pon={} is listed twice", port.board, port.pon);
            }
            for (attribute, fragment) in &port.oids {
                let base = self.olt.base_oid(self.olt.attribute_oid(*attribute).base);
                format!("{}.{}", base, fragment).parse::<Oid>().with_context(|| {
                    format!(
                        "Bad OID for {:?} on board={} pon={}: {:?}",
                        attribute, port.board, port.pon, fragment
                    )
                })?;
            }
        }

        if self.cache.timeout_ms == 0 {
            bail!("cache.timeout_ms must be positive");
        }

        if self.api.default_page_size == 0 || self.api.max_page_size == 0 {
            bail!("Page sizes must be positive");
        }

        Ok(())
    }
}
