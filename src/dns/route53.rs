use anyhow::{Result, anyhow};
use aws_sdk_route53::Client;
use aws_sdk_route53::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use log::{info, warn};

use super::{DnsRecordClient, RecordSet};
use crate::aws::AwsContext;

/// [`DnsRecordClient`] backed by a Route 53 hosted zone.
pub struct Route53Records {
    aws: AwsContext,
    client: Client,
}

impl Route53Records {
    pub fn new(aws: AwsContext) -> Self {
        let client = Client::new(aws.sdk_config());
        Self { aws, client }
    }

    fn change_batch(action: ChangeAction, record: &RecordSet) -> Result<ChangeBatch> {
        let resource_records = record
            .values
            .iter()
            .map(|value| {
                ResourceRecord::builder()
                    .value(value)
                    .build()
                    .map_err(|e| anyhow!("Failed to build ResourceRecord: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let record_set = ResourceRecordSet::builder()
            .name(&record.name)
            .set_type(Some(RrType::from(record.record_type.as_str())))
            .ttl(record.ttl)
            .set_resource_records(Some(resource_records))
            .build()
            .map_err(|e| anyhow!("Failed to build ResourceRecordSet: {}", e))?;

        let change = Change::builder()
            .action(action)
            .resource_record_set(record_set)
            .build()
            .map_err(|e| anyhow!("Failed to build Change: {}", e))?;

        ChangeBatch::builder()
            .changes(change)
            .build()
            .map_err(|e| anyhow!("Failed to build ChangeBatch: {}", e))
    }
}

impl DnsRecordClient for Route53Records {
    fn upsert(&self, zone_id: &str, record: &RecordSet) -> Result<()> {
        info!(
            "[route53] Upserting {} record {} in zone {}",
            record.record_type, record.name, zone_id
        );
        let change_batch = Self::change_batch(ChangeAction::Upsert, record)?;
        self.aws
            .block_on(
                self.client
                    .change_resource_record_sets()
                    .hosted_zone_id(zone_id)
                    .change_batch(change_batch)
                    .send(),
            )
            .map_err(|err| {
                anyhow!(
                    "Failed to upsert Route 53 record {}: {}",
                    record.name,
                    DisplayErrorContext(&err)
                )
            })?;
        Ok(())
    }

    fn delete(&self, zone_id: &str, record: &RecordSet) -> Result<()> {
        info!(
            "[route53] Deleting {} record {} from zone {}",
            record.record_type, record.name, zone_id
        );
        let change_batch = Self::change_batch(ChangeAction::Delete, record)?;
        let result = self.aws.block_on(
            self.client
                .change_resource_record_sets()
                .hosted_zone_id(zone_id)
                .change_batch(change_batch)
                .send(),
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let already_gone = err.as_service_error().is_some_and(|service| {
                    service.is_invalid_change_batch()
                        && service.message().is_some_and(is_missing_record_message)
                });
                if already_gone {
                    warn!(
                        "[route53] Record {} was already absent from zone {}",
                        record.name, zone_id
                    );
                    return Ok(());
                }
                Err(anyhow!(
                    "Failed to delete Route 53 record {}: {}",
                    record.name,
                    DisplayErrorContext(&err)
                ))
            }
        }
    }
}

// Route 53 rejects the batch with InvalidChangeBatch and the message
// "Tried to delete resource record set [name='..', type='..'] but it was not found".
fn is_missing_record_message(message: &str) -> bool {
    message.contains("Tried to delete resource record set") && message.contains("but it was not found")
}
