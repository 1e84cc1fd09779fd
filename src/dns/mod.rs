use anyhow::Result;

use crate::model::Challenge;

mod route53;

pub use route53::Route53Records;

/// TTL of the published validation record. Short so cleanup and any
/// re-validation take effect quickly.
pub const CHALLENGE_TTL_SECS: i64 = 60;

/// A single resource record set in a hosted zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    pub name: String,
    pub record_type: String,
    pub ttl: i64,
    pub values: Vec<String>,
}

impl RecordSet {
    /// The record set that answers a validation challenge.
    pub fn for_challenge(challenge: &Challenge) -> Self {
        Self {
            name: challenge.name.clone(),
            record_type: challenge.record_type.clone(),
            ttl: CHALLENGE_TTL_SECS,
            values: vec![challenge.value.clone()],
        }
    }
}

/// Mutations the controller needs from the DNS zone.
pub trait DnsRecordClient: Send + Sync {
    /// Creates or replaces the record set. Safe to repeat.
    fn upsert(&self, zone_id: &str, record: &RecordSet) -> Result<()>;

    /// Removes the record set. Removing a record set that is already gone succeeds.
    fn delete(&self, zone_id: &str, record: &RecordSet) -> Result<()>;
}
