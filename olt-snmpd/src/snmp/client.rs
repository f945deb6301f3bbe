use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::Instant;
use crate::config::SnmpConfig;
use super::ber::{self, RequestKind, Response};
use super::{Oid, PolledValue, SnmpError, Transport, Varbind};

const MAX_DATAGRAM: usize = 65_535;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub community: Vec<u8>,
    pub timeout: Duration,
    pub retries: u32,
    pub max_repetitions: u32,
}

impl From<&SnmpConfig> for ClientOptions {
    fn from(config: &SnmpConfig) -> Self {
        Self {
            community: config.community.as_bytes().to_vec(),
            timeout: Duration::from_secs(config.timeout_secs),
            retries: config.retries,
            max_repetitions: config.max_repetitions.max(1),
        }
    }
}

/// SNMPv2c client over a single connected UDP socket.
///
/// The socket lock is held for a whole request/response exchange, so callers
/// sharing one client are served one at a time.
pub struct UdpSnmpClient {
    socket: Mutex<UdpSocket>,
    options: ClientOptions,
    next_request_id: AtomicI32,
}

impl UdpSnmpClient {
    pub async fn connect(config: &SnmpConfig) -> Result<Self, SnmpError> {
        let target = tokio::net::lookup_host((config.host.as_str(), config.port))
            .await?
            .next()
            .ok_or_else(|| {
                SnmpError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} did not resolve", config.host),
                ))
            })?;

        Self::with_options(target, ClientOptions::from(config)).await
    }

    pub async fn with_options(target: SocketAddr, options: ClientOptions) -> Result<Self, SnmpError> {
        let bind_addr: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(target).await?;

        tracing::info!("SNMP client bound to {} for agent {}", socket.local_addr()?, target);

        Ok(Self {
            socket: Mutex::new(socket),
            options,
            next_request_id: AtomicI32::new(1),
        })
    }

    fn request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff
    }

    async fn exchange(&self, kind: RequestKind, oids: &[Oid]) -> Result<Response, SnmpError> {
        let socket = self.socket.lock().await;
        let request_id = self.request_id();
        let request = ber::encode_request(&self.options.community, request_id, kind, oids);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        for attempt in 0..=self.options.retries {
            socket.send(&request).await?;
            let deadline = Instant::now() + self.options.timeout;

            loop {
                let received = match tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await {
                    Ok(received) => received?,
                    Err(_) => {
                        tracing::debug!("SNMP request {} attempt {} timed out", request_id, attempt + 1);
                        break;
                    }
                };

                match ber::decode_response(&buf[..received]) {
                    Ok(response) if response.request_id == request_id => {
                        if response.error_status != 0 {
                            return Err(SnmpError::Agent {
                                status: response.error_status,
                                index: response.error_index,
                            });
                        }
                        return Ok(response);
                    }
                    Ok(response) => {
                        // Late answer to an earlier attempt
                        tracing::debug!("Discarding response for request {}", response.request_id);
                    }
                    Err(e) => {
                        tracing::warn!("Discarding undecodable datagram: {}", e);
                    }
                }
            }
        }

        Err(SnmpError::Timeout(self.options.retries + 1))
    }
}

#[async_trait]
impl Transport for UdpSnmpClient {
    async fn get(&self, oids: &[Oid]) -> Result<Vec<Varbind>, SnmpError> {
        if oids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self.exchange(RequestKind::Get, oids).await?;
        if response.varbinds.len() != oids.len() {
            return Err(SnmpError::Malformed(format!(
                "asked for {} OIDs, got {}",
                oids.len(),
                response.varbinds.len()
            )));
        }
        Ok(response.varbinds)
    }

    async fn walk(
        &self,
        root: &Oid,
        visitor: &mut (dyn FnMut(Varbind) + Send),
    ) -> Result<(), SnmpError> {
        let kind = RequestKind::GetBulk {
            non_repeaters: 0,
            max_repetitions: self.options.max_repetitions,
        };
        let mut cursor = root.clone();

        loop {
            let response = self.exchange(kind, std::slice::from_ref(&cursor)).await?;
            if response.varbinds.is_empty() {
                return Ok(());
            }

            for varbind in response.varbinds {
                if varbind.value == PolledValue::EndOfMibView || !varbind.oid.is_under(root) {
                    return Ok(());
                }
                if varbind.oid <= cursor {
                    return Err(SnmpError::Malformed(format!(
                        "walk went backwards at {}",
                        varbind.oid
                    )));
                }
                cursor = varbind.oid.clone();
                visitor(varbind);
            }
        }
    }
}
