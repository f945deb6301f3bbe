use std::collections::{BTreeMap, HashMap};
use shared::protocol::{is_valid_board, is_valid_pon};
use crate::config::{Attribute, OltConfig};
use crate::error::{OltError, Result};
use crate::snmp::{Oid, SnmpError};

/// Table OID of one attribute on one port, plus the optional arc the device
/// appends after the ONU id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeAddress {
    pub table: Oid,
    pub instance_suffix: Option<u32>,
}

impl AttributeAddress {
    /// OID of this attribute for a single ONU
    pub fn instance(&self, onu_id: u32) -> Oid {
        let oid = self.table.child(onu_id);
        match self.instance_suffix {
            Some(suffix) => oid.child(suffix),
            None => oid,
        }
    }
}

/// Every address needed to poll one PON port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortAddress {
    pub board: u8,
    pub pon: u8,
    attributes: BTreeMap<Attribute, AttributeAddress>,
}

impl PortAddress {
    pub fn attribute(&self, attribute: Attribute) -> &AttributeAddress {
        // Built from Attribute::ALL, so every key is present
        &self.attributes[&attribute]
    }

    /// Table walked to discover which ONUs exist on the port
    pub fn identity_table(&self) -> &Oid {
        &self.attribute(Attribute::Identity).table
    }

    pub fn instance(&self, attribute: Attribute, onu_id: u32) -> Oid {
        self.attribute(attribute).instance(onu_id)
    }
}

/// Maps (board, pon) to device addresses. Built once from config; lookups
/// are pure.
#[derive(Debug, Clone)]
pub struct Resolver {
    ports: HashMap<(u8, u8), PortAddress>,
}

impl Resolver {
    pub fn from_config(olt: &OltConfig) -> std::result::Result<Self, SnmpError> {
        let mut ports = HashMap::new();

        for port in &olt.ports {
            let mut attributes = BTreeMap::new();
            for attribute in Attribute::ALL {
                let layout = olt.attribute_oid(attribute);
                let base = olt.base_oid(layout.base).trim_end_matches('.');
                let table: Oid = match port.oids.get(&attribute) {
                    Some(fragment) => format!("{}.{}", base, fragment.trim_matches('.')),
                    None => format!(
                        "{}.{}.{}",
                        base,
                        layout.oid.trim_matches('.'),
                        port.index(layout.base)
                    ),
                }
                .parse()?;
                attributes.insert(
                    attribute,
                    AttributeAddress {
                        table,
                        instance_suffix: layout.instance_suffix,
                    },
                );
            }

            ports.insert(
                (port.board, port.pon),
                PortAddress {
                    board: port.board,
                    pon: port.pon,
                    attributes,
                },
            );
        }

        Ok(Self { ports })
    }

    pub fn resolve(&self, board: u8, pon: u8) -> Result<PortAddress> {
        if !is_valid_board(board) {
            return Err(OltError::InvalidCoordinate(format!("board {} does not exist", board)));
        }
        if !is_valid_pon(pon) {
            return Err(OltError::InvalidCoordinate(format!("pon {} does not exist", pon)));
        }

        self.ports.get(&(board, pon)).cloned().ok_or_else(|| {
            OltError::InvalidCoordinate(format!("board {} pon {} is not configured", board, pon))
        })
    }
}
