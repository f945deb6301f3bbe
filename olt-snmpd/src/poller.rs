use std::sync::Arc;
use crate::error::Result;
use crate::snmp::{Oid, PolledValue, Transport, Varbind};

/// Thin adapter over the device transport that turns transport faults into
/// request errors.
#[derive(Clone)]
pub struct Poller {
    transport: Arc<dyn Transport>,
}

impl Poller {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Every instance under `table`, in device order
    pub async fn walk_table(&self, table: &Oid) -> Result<Vec<Varbind>> {
        let mut rows = Vec::new();
        self.transport.walk(table, &mut |varbind| rows.push(varbind)).await?;
        tracing::debug!("Walked {} rows under {}", rows.len(), table);
        Ok(rows)
    }

    /// One value per requested OID, in request order
    pub async fn get_one(&self, oids: &[Oid]) -> Result<Vec<PolledValue>> {
        let varbinds = self.transport.get(oids).await?;
        Ok(varbinds.into_iter().map(|varbind| varbind.value).collect())
    }
}
