use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;
use chrono::Utc;
use shared::protocol::{is_valid_onu_id, MAX_ONU_PER_PON};
use shared::types::{OnuDetail, OnuSlot, OnuSummary, Page};
use crate::cache::{CacheKey, ReadThroughCache};
use crate::config::{Attribute, Config};
use crate::decode::{self, DecodeError};
use crate::error::{OltError, Result};
use crate::occupancy;
use crate::pagination::paginate;
use crate::poller::Poller;
use crate::resolver::{PortAddress, Resolver};
use crate::snmp::{Oid, PolledValue};

/// Attributes fetched for every row of a port listing
const SUMMARY_ATTRIBUTES: [Attribute; 4] = [
    Attribute::OnuType,
    Attribute::SerialNumber,
    Attribute::RxPower,
    Attribute::Status,
];

/// Attributes fetched for a single-ONU detail view, besides the name
const DETAIL_ATTRIBUTES: [Attribute; 11] = [
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

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub cache_ttl: Duration,
    /// Bound on one operation, cache lookup included
    pub deadline: Duration,
    /// Offset of the device clock from UTC
    pub utc_offset: chrono::Duration,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl ServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_ttl: config.cache.ttl(),
            deadline: config.api.request_timeout(),
            utc_offset: chrono::Duration::seconds(config.olt.utc_offset_secs),
            default_page_size: config.api.default_page_size,
            max_page_size: config.api.max_page_size,
        }
    }
}

/// Raw values of one ONU, keyed by attribute. Missing entries read as absent.
#[derive(Debug, Default)]
struct Readings(BTreeMap<Attribute, PolledValue>);

impl Readings {
    fn value(&self, attribute: Attribute) -> PolledValue {
        self.0.get(&attribute).cloned().unwrap_or(PolledValue::Absent)
    }
}

/// Decode one attribute, falling back to the zero value. Absent values are
/// expected for idle ONUs and are not worth a warning.
fn field<T: Default>(
    readings: &Readings,
    attribute: Attribute,
    onu_id: u32,
    decoder: fn(&PolledValue) -> std::result::Result<T, DecodeError>,
) -> T {
    let value = readings.value(attribute);
    if value.is_absent() {
        return T::default();
    }
    decoder(&value).unwrap_or_else(|e| {
        tracing::warn!("ONU {} {:?} not decodable: {}", onu_id, attribute, e);
        T::default()
    })
}

/// The read-only ONU inventory operations.
pub struct OnuService {
    resolver: Resolver,
    poller: Poller,
    cache: ReadThroughCache,
    options: ServiceOptions,
}

impl OnuService {
    pub fn new(resolver: Resolver, poller: Poller, cache: ReadThroughCache, options: ServiceOptions) -> Self {
        Self {
            resolver,
            poller,
            cache,
            options,
        }
    }

    /// Every ONU on the port, ascending by id
    pub async fn list_by_port(&self, board: u8, pon: u8) -> Result<Vec<OnuSummary>> {
        let port = self.resolver.resolve(board, pon)?;
        let key = CacheKey::PortList { board, pon };

        self.bounded(
            self.cache
                .get_or_compute(key, self.options.cache_ttl, || self.collect_summaries(&port)),
        )
        .await
    }

    /// Full telemetry for one ONU. `None` when the slot is empty.
    pub async fn detail_by_port_and_slot(&self, board: u8, pon: u8, onu_id: u32) -> Result<Option<OnuDetail>> {
        let port = self.resolver.resolve(board, pon)?;
        if !is_valid_onu_id(onu_id) {
            return Err(OltError::InvalidCoordinate(format!(
                "onu {} is outside 1..={}",
                onu_id, MAX_ONU_PER_PON
            )));
        }
        let key = CacheKey::Detail { board, pon, onu_id };

        self.bounded(
            self.cache
                .get_or_compute(key, self.options.cache_ttl, || self.collect_detail(&port, onu_id)),
        )
        .await
    }

    /// Unoccupied slots on the port, ascending
    pub async fn free_slots(&self, board: u8, pon: u8) -> Result<Vec<OnuSlot>> {
        let port = self.resolver.resolve(board, pon)?;
        let key = CacheKey::FreeSlots { board, pon };

        self.bounded(
            self.cache
                .get_or_compute(key, self.options.cache_ttl, || self.collect_free_slots(&port)),
        )
        .await
    }

    /// Recompute the free slots from the device and overwrite the cached copy
    pub async fn refresh_free_slots(&self, board: u8, pon: u8) -> Result<Vec<OnuSlot>> {
        let port = self.resolver.resolve(board, pon)?;
        let key = CacheKey::FreeSlots { board, pon };

        let slots = self.bounded(self.collect_free_slots(&port)).await?;
        self.cache.store(key, &slots, self.options.cache_ttl).await;
        Ok(slots)
    }

    /// One window of `list_by_port`
    pub async fn paged_list_by_port(
        &self,
        board: u8,
        pon: u8,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Page<OnuSummary>> {
        let all = self.list_by_port(board, pon).await?;
        Ok(paginate(
            &all,
            page,
            limit,
            self.options.default_page_size,
            self.options.max_page_size,
        ))
    }

    async fn bounded<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.options.deadline, work)
            .await
            .map_err(|_| OltError::deadline_exceeded(self.options.deadline))?
    }

    /// (onu id, raw name) for every ONU the device lists on the port. This
    /// walk is the only step whose failure fails the operation.
    async fn identities(&self, port: &PortAddress) -> Result<Vec<(u32, PolledValue)>> {
        let rows = self.poller.walk_table(port.identity_table()).await?;

        let mut identities = Vec::with_capacity(rows.len());
        for row in rows {
            let onu_id = decode::slot_id_from_address(&row.oid.to_string());
            if !is_valid_onu_id(onu_id) {
                tracing::warn!("Ignoring identity row with unusable ONU id: {}", row.oid);
                continue;
            }
            identities.push((onu_id, row.value));
        }
        Ok(identities)
    }

    /// Best-effort fetch of `attributes` for one ONU in a single request
    async fn read_attributes(&self, port: &PortAddress, onu_id: u32, attributes: &[Attribute]) -> Readings {
        let oids: Vec<Oid> = attributes
            .iter()
            .map(|&attribute| port.instance(attribute, onu_id))
            .collect();

        match self.poller.get_one(&oids).await {
            Ok(values) => Readings(attributes.iter().copied().zip(values).collect()),
            Err(e) => {
                tracing::warn!(
                    "Attributes of ONU {} on board {} pon {} unavailable: {}",
                    onu_id, port.board, port.pon, e
                );
                Readings::default()
            }
        }
    }

    async fn collect_summaries(&self, port: &PortAddress) -> Result<Vec<OnuSummary>> {
        let identities = self.identities(port).await?;

        let mut summaries = Vec::with_capacity(identities.len());
        for (onu_id, name) in identities {
            let readings = self.read_attributes(port, onu_id, &SUMMARY_ATTRIBUTES).await;
            summaries.push(OnuSummary {
                board: port.board,
                pon: port.pon,
                onu_id,
                name: decode::text(&name).unwrap_or_default(),
                onu_type: field(&readings, Attribute::OnuType, onu_id, decode::text),
                serial_number: field(&readings, Attribute::SerialNumber, onu_id, decode::serial_number),
                rx_power: field(&readings, Attribute::RxPower, onu_id, decode::optical_power),
                status: decode::status(&readings.value(Attribute::Status)),
            });
        }

        summaries.sort_by_key(|summary| summary.onu_id);
        tracing::debug!(
            "Collected {} ONUs on board {} pon {}",
            summaries.len(),
            port.board,
            port.pon
        );
        Ok(summaries)
    }

    async fn collect_detail(&self, port: &PortAddress, onu_id: u32) -> Result<Option<OnuDetail>> {
        let identity = self
            .poller
            .get_one(&[port.instance(Attribute::Identity, onu_id)])
            .await?
            .into_iter()
            .next()
            .unwrap_or(PolledValue::Absent);
        if identity.is_absent() {
            return Ok(None);
        }

        let readings = self.read_attributes(port, onu_id, &DETAIL_ATTRIBUTES).await;
        let last_online = field(&readings, Attribute::LastOnline, onu_id, decode::timestamp);
        let last_offline = field(&readings, Attribute::LastOffline, onu_id, decode::timestamp);

        let uptime = if last_online.is_empty() {
            String::new()
        } else {
            decode::uptime(&last_online, Utc::now(), self.options.utc_offset).unwrap_or_else(|e| {
                tracing::warn!("ONU {} uptime not computable: {}", onu_id, e);
                String::new()
            })
        };
        let last_down_time_duration = if last_online.is_empty() || last_offline.is_empty() {
            String::new()
        } else {
            decode::downtime(&last_online, &last_offline).unwrap_or_else(|e| {
                tracing::warn!("ONU {} downtime not computable: {}", onu_id, e);
                String::new()
            })
        };

        Ok(Some(OnuDetail {
            summary: OnuSummary {
                board: port.board,
                pon: port.pon,
                onu_id,
                name: decode::text(&identity).unwrap_or_default(),
                onu_type: field(&readings, Attribute::OnuType, onu_id, decode::text),
                serial_number: field(&readings, Attribute::SerialNumber, onu_id, decode::serial_number),
                rx_power: field(&readings, Attribute::RxPower, onu_id, decode::optical_power),
                status: decode::status(&readings.value(Attribute::Status)),
            },
            description: field(&readings, Attribute::Description, onu_id, decode::text),
            tx_power: field(&readings, Attribute::TxPower, onu_id, decode::optical_power),
            ip_address: field(&readings, Attribute::IpAddress, onu_id, decode::text),
            last_online,
            last_offline,
            uptime,
            last_down_time_duration,
            offline_reason: decode::offline_reason(&readings.value(Attribute::OfflineReason)),
            gpon_optical_distance: decode::optical_distance(&readings.value(Attribute::OpticalDistance)),
        }))
    }

    async fn collect_free_slots(&self, port: &PortAddress) -> Result<Vec<OnuSlot>> {
        let occupied: BTreeSet<u32> = self
            .identities(port)
            .await?
            .into_iter()
            .map(|(onu_id, _)| onu_id)
            .collect();

        Ok(occupancy::free_slots(&occupied)
            .into_iter()
            .map(|onu_id| OnuSlot {
                board: port.board,
                pon: port.pon,
                onu_id,
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use async_trait::async_trait;
    use shared::types::{OfflineReason, OnuStatus};
    use crate::cache::backend::{CacheBackend, CacheError, MemoryBackend};
    use crate::config::OltConfig;
    use crate::poller::tests::FakeTransport;
    use crate::snmp::{SnmpError, Transport, Varbind};

    pub(crate) fn options() -> ServiceOptions {
        ServiceOptions {
            cache_ttl: Duration::from_secs(300),
            deadline: Duration::from_secs(30),
            utc_offset: chrono::Duration::hours(7),
            default_page_size: 10,
            max_page_size: 100,
        }
    }

    pub(crate) fn port(board: u8, pon: u8) -> PortAddress {
        Resolver::from_config(&OltConfig::default())
            .unwrap()
            .resolve(board, pon)
            .unwrap()
    }

    /// Populate a complete summary row for `onu_id` on board 1 pon 1
    pub(crate) fn attach(fake: &FakeTransport, onu_id: u32) {
        let port = port(1, 1);
        let bytes = |s: String| PolledValue::Bytes(s.into_bytes());
        fake.insert(port.instance(Attribute::Identity, onu_id), bytes(format!("CPE-{}", onu_id)));
        fake.insert(port.instance(Attribute::OnuType, onu_id), bytes("F660".to_string()));
        fake.insert(
            port.instance(Attribute::SerialNumber, onu_id),
            bytes(format!("1,ZTEG{:08}", onu_id)),
        );
        fake.insert(port.instance(Attribute::RxPower, onu_id), PolledValue::Integer(4250));
        fake.insert(port.instance(Attribute::Status, onu_id), PolledValue::Integer(4));
    }

    pub(crate) fn service(transport: Arc<dyn Transport>) -> OnuService {
        service_with_backend(transport, Arc::new(MemoryBackend::new()))
    }

    fn service_with_backend(transport: Arc<dyn Transport>, backend: Arc<dyn CacheBackend>) -> OnuService {
        OnuService::new(
            Resolver::from_config(&OltConfig::default()).unwrap(),
            Poller::new(transport),
            ReadThroughCache::new(backend, "", Duration::from_millis(500)),
            options(),
        )
    }

    fn fixture() -> (Arc<FakeTransport>, OnuService) {
        let fake = Arc::new(FakeTransport::default());
        attach(&fake, 7);
        attach(&fake, 3);
        let service = service(fake.clone());
        (fake, service)
    }

    #[tokio::test]
    async fn test_list_by_port_end_to_end() {
        let (_fake, service) = fixture();

        let list = service.list_by_port(1, 1).await.unwrap();
        let ids: Vec<u32> = list.iter().map(|onu| onu.onu_id).collect();
        assert_eq!(ids, vec![3, 7]);

        assert_eq!(list[0].name, "CPE-3");
        assert_eq!(list[1].name, "CPE-7");
        assert_eq!(list[0].onu_type, "F660");
        assert_eq!(list[0].serial_number, "ZTEG00000003");
        assert_eq!(list[0].rx_power, "-21.50");
        assert_eq!(list[0].status, OnuStatus::Online);
        assert_eq!((list[0].board, list[0].pon), (1, 1));
    }

    #[tokio::test]
    async fn test_free_slots_end_to_end() {
        let (_fake, service) = fixture();

        let free = service.free_slots(1, 1).await.unwrap();
        assert_eq!(free.len(), 126);
        assert!(free.iter().all(|slot| slot.onu_id != 3 && slot.onu_id != 7));
        assert!(free.windows(2).all(|w| w[0].onu_id < w[1].onu_id));
        assert_eq!(free[0], OnuSlot { board: 1, pon: 1, onu_id: 1 });
    }

    #[tokio::test]
    async fn test_attribute_failure_keeps_the_record() {
        let (fake, service) = fixture();
        fake.fail_get_of(port(1, 1).instance(Attribute::OnuType, 7));

        let list = service.list_by_port(1, 1).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].name, "CPE-7");
        assert_eq!(list[1].onu_type, "");
        assert_eq!(list[1].rx_power, "");
        assert_eq!(list[1].status, OnuStatus::Unknown);
        // The other ONU is unaffected
        assert_eq!(list[0].onu_type, "F660");
    }

    #[tokio::test]
    async fn test_undecodable_attribute_is_zero_valued() {
        let (fake, service) = fixture();
        fake.insert(port(1, 1).instance(Attribute::RxPower, 3), PolledValue::Bytes(b"n/a".to_vec()));

        let list = service.list_by_port(1, 1).await.unwrap();
        assert_eq!(list[0].rx_power, "");
        assert_eq!(list[0].serial_number, "ZTEG00000003");
    }

    #[tokio::test]
    async fn test_walk_failure_fails_the_operation() {
        let (fake, service) = fixture();
        fake.fail_walks();

        assert!(matches!(service.list_by_port(1, 1).await, Err(OltError::Timeout(_))));
        // Never an empty (all-free) list in place of an error
        assert!(service.free_slots(1, 1).await.is_err());
        assert!(service.refresh_free_slots(1, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_coordinates_never_poll() {
        let (fake, service) = fixture();

        for (board, pon) in [(0, 1), (3, 1), (1, 0), (1, 9)] {
            assert!(matches!(
                service.list_by_port(board, pon).await,
                Err(OltError::InvalidCoordinate(_))
            ));
            assert!(matches!(
                service.free_slots(board, pon).await,
                Err(OltError::InvalidCoordinate(_))
            ));
        }
        for onu_id in [0, 129] {
            assert!(matches!(
                service.detail_by_port_and_slot(1, 1, onu_id).await,
                Err(OltError::InvalidCoordinate(_))
            ));
        }
        assert_eq!(fake.walk_count(), 0);
        assert_eq!(fake.get_count(), 0);
    }

    #[tokio::test]
    async fn test_detail() {
        let (fake, service) = fixture();
        let port = port(1, 1);
        fake.insert(port.instance(Attribute::TxPower, 3), PolledValue::Integer(16050));
        fake.insert(port.instance(Attribute::IpAddress, 3), PolledValue::Text("10.10.1.3".into()));
        fake.insert(port.instance(Attribute::Description, 3), PolledValue::Bytes(b"Block A".to_vec()));
        // 2024-03-09 12:30:15 and 12:00:00
        fake.insert(
            port.instance(Attribute::LastOnline, 3),
            PolledValue::Bytes(vec![0x07, 0xe8, 3, 9, 12, 30, 15, 0]),
        );
        fake.insert(
            port.instance(Attribute::LastOffline, 3),
            PolledValue::Bytes(vec![0x07, 0xe8, 3, 9, 12, 0, 0, 0]),
        );
        fake.insert(port.instance(Attribute::OfflineReason, 3), PolledValue::Integer(9));
        fake.insert(port.instance(Attribute::OpticalDistance, 3), PolledValue::Integer(1532));

        let detail = service.detail_by_port_and_slot(1, 1, 3).await.unwrap().unwrap();
        assert_eq!(detail.summary.name, "CPE-3");
        assert_eq!(detail.summary.serial_number, "ZTEG00000003");
        assert_eq!(detail.tx_power, "2.10");
        assert_eq!(detail.ip_address, "10.10.1.3");
        assert_eq!(detail.description, "Block A");
        assert_eq!(detail.last_online, "2024-03-09 12:30:15");
        assert_eq!(detail.last_offline, "2024-03-09 12:00:00");
        assert_eq!(detail.last_down_time_duration, "0 days 0 hours 30 minutes 15 seconds");
        assert!(detail.uptime.ends_with("seconds"));
        assert_eq!(detail.offline_reason, OfflineReason::PowerOff);
        assert_eq!(detail.gpon_optical_distance, "1532");
    }

    #[tokio::test]
    async fn test_detail_of_empty_slot_is_none() {
        let (_fake, service) = fixture();
        assert_eq!(service.detail_by_port_and_slot(1, 1, 5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_detail_without_timestamps_leaves_durations_empty() {
        let (_fake, service) = fixture();
        let detail = service.detail_by_port_and_slot(1, 1, 7).await.unwrap().unwrap();
        assert_eq!(detail.last_online, "");
        assert_eq!(detail.uptime, "");
        assert_eq!(detail.last_down_time_duration, "");
        assert_eq!(detail.gpon_optical_distance, "Unknown");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_the_device() {
        let (fake, service) = fixture();

        let first = service.list_by_port(1, 1).await.unwrap();
        let second = service.list_by_port(1, 1).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fake.walk_count(), 1);

        // Other ports have their own entries
        service.list_by_port(1, 2).await.unwrap();
        assert_eq!(fake.walk_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_overwrites_cached_free_slots() {
        let (fake, service) = fixture();

        assert_eq!(service.free_slots(1, 1).await.unwrap().len(), 126);
        attach(&fake, 9);
        assert_eq!(service.free_slots(1, 1).await.unwrap().len(), 126);
        assert_eq!(fake.walk_count(), 1);

        assert_eq!(service.refresh_free_slots(1, 1).await.unwrap().len(), 125);
        assert_eq!(service.free_slots(1, 1).await.unwrap().len(), 125);
        assert_eq!(fake.walk_count(), 2);
    }

    #[tokio::test]
    async fn test_paged_list() {
        let fake = Arc::new(FakeTransport::default());
        for onu_id in 1..=25 {
            attach(&fake, onu_id);
        }
        let service = service(fake);

        let page = service.paged_list_by_port(1, 1, Some(3), Some(10)).await.unwrap();
        let ids: Vec<u32> = page.data.iter().map(|onu| onu.onu_id).collect();
        assert_eq!(ids, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.page_count, 3);
        assert_eq!(page.total_rows, 25);

        let beyond = service.paged_list_by_port(1, 1, Some(4), Some(10)).await.unwrap();
        assert!(beyond.data.is_empty());
    }

    /// Never answers
    struct HungTransport;

    #[async_trait]
    impl Transport for HungTransport {
        async fn get(&self, _oids: &[Oid]) -> std::result::Result<Vec<Varbind>, SnmpError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn walk(
            &self,
            _root: &Oid,
            _visitor: &mut (dyn FnMut(Varbind) + Send),
        ) -> std::result::Result<(), SnmpError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_the_operation() {
        let service = service(Arc::new(HungTransport));

        assert!(matches!(service.list_by_port(1, 1).await, Err(OltError::Timeout(_))));
        assert!(matches!(
            service.detail_by_port_and_slot(1, 1, 3).await,
            Err(OltError::Timeout(_))
        ));
    }

    /// Cache backend that accepts calls and never answers
    struct StalledBackend;

    #[async_trait]
    impl CacheBackend for StalledBackend {
        async fn get(&self, _key: &str) -> std::result::Result<Option<Vec<u8>>, CacheError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }

        async fn set(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _ttl: Duration,
        ) -> std::result::Result<(), CacheError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_cache_falls_through_to_the_device() {
        let fake = Arc::new(FakeTransport::default());
        attach(&fake, 3);
        let service = service_with_backend(fake.clone(), Arc::new(StalledBackend));

        let list = service.list_by_port(1, 1).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(fake.walk_count(), 1);

        let free = service.refresh_free_slots(1, 1).await.unwrap();
        assert_eq!(free.len(), 127);
    }
}
