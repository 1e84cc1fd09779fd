use std::collections::BTreeSet;
use std::sync::Arc;

use log::{info, warn};

use crate::authority::CertificateAuthority;
use crate::dns::{DnsRecordClient, RecordSet};
use crate::domain::check_certificate_name;
use crate::error::{AuthorityError, ResourceError};
use crate::model::{
    Challenge, DesiredState, IssuanceRequest, PhysicalId, RequestEnvelope, RequestType,
    ValidationStatus,
};
use crate::poller::ValidationPoller;

/// Drives a certificate and its validation records towards the requested state.
pub struct LifecycleController {
    authority: Arc<dyn CertificateAuthority>,
    dns: Arc<dyn DnsRecordClient>,
    poller: ValidationPoller,
}

impl LifecycleController {
    pub fn new(
        authority: Arc<dyn CertificateAuthority>,
        dns: Arc<dyn DnsRecordClient>,
        poller: ValidationPoller,
    ) -> Self {
        Self {
            authority,
            dns,
            poller,
        }
    }

    /// Applies one request and returns the certificate's physical id.
    pub fn reconcile(&self, request: &RequestEnvelope) -> Result<PhysicalId, ResourceError> {
        match &request.request_type {
            RequestType::Create => {
                self.create(&request.desired_state()?, &request.idempotency_token())
            }
            RequestType::Update => {
                let id = required_physical_id(request)?;
                let previous = request.previous_state()?;
                self.update(id, &previous, &request.desired_state()?)
            }
            // Only the identity matters here; the properties are never read.
            RequestType::Delete => self.delete(required_physical_id(request)?),
            RequestType::Unknown(raw) => Err(ResourceError::InvalidRequest(format!(
                "Invalid request type: {raw}"
            ))),
        }
    }

    pub fn create(
        &self,
        desired: &DesiredState,
        idempotency_token: &str,
    ) -> Result<PhysicalId, ResourceError> {
        info!("[acm-create] Creating certificate for \"{}\"", desired.domain_name);
        check_names(desired)?;
        if desired.hosted_zone_id.trim().is_empty() {
            return Err(ResourceError::InvalidRequest(
                "HostedZoneId is required".to_string(),
            ));
        }
        let timeout_secs = desired.timeout_secs()?;

        let request = IssuanceRequest {
            domain_name: desired.domain_name.clone(),
            subject_alternative_names: desired.subject_alternative_names.clone(),
            idempotency_token: idempotency_token.to_string(),
            transparency: desired.transparency(),
            tags: desired.tags.clone(),
        };
        let id = self.authority.request_certificate(&request)?;
        info!("[acm-create] Certificate requested; ARN: {}", id);

        let records: Vec<RecordSet> = self
            .pending_challenges(&id)?
            .iter()
            .map(RecordSet::for_challenge)
            .collect();
        for record in &records {
            info!(
                "[acm-create] Publishing validation record: name=\"{}\", value=\"{}\"",
                record.name,
                record.values.join(" ")
            );
            self.dns
                .upsert(&desired.hosted_zone_id, record)
                .map_err(ResourceError::Dns)?;
        }

        self.poller.await_validation(&id, timeout_secs)?;

        let mut cleanup_failure = None;
        for record in &records {
            info!("[acm-create] Removing validation record {}", record.name);
            if let Err(source) = self.dns.delete(&desired.hosted_zone_id, record) {
                warn!(
                    "[acm-create] Certificate {} is valid but cleanup of {} failed: {}",
                    id, record.name, source
                );
                if cleanup_failure.is_none() {
                    cleanup_failure = Some(source);
                }
            }
        }
        if let Some(source) = cleanup_failure {
            return Err(ResourceError::ChallengeCleanup {
                physical_id: id,
                source,
            });
        }

        info!(
            "[acm-create] Created and validated certificate for {}; ARN: {}",
            desired.domain_name, id
        );
        Ok(id)
    }

    pub fn update(
        &self,
        id: &PhysicalId,
        previous: &DesiredState,
        desired: &DesiredState,
    ) -> Result<PhysicalId, ResourceError> {
        if desired.domain_name != previous.domain_name {
            return Err(ResourceError::ImmutableFieldChanged("domain name"));
        }
        if desired.hosted_zone_id != previous.hosted_zone_id {
            return Err(ResourceError::ImmutableFieldChanged("hosted zone ID"));
        }
        if desired.san_set() != previous.san_set() {
            return Err(ResourceError::ImmutableFieldChanged(
                "subject alternative names",
            ));
        }

        let transparency = desired.transparency();
        if transparency != previous.transparency() {
            info!(
                "[acm-update] Transparency logging preference of {}: {} -> {}",
                id,
                previous.transparency(),
                transparency
            );
            self.authority
                .update_transparency_preference(id, transparency)?;
        }

        if desired.tags != previous.tags {
            info!("[acm-update] Replacing tags of {}", id);
            let current = self.authority.list_tags(id)?;
            self.authority.remove_tags(id, &current)?;
            self.authority.add_tags(id, &desired.tags)?;
        }

        info!("[acm-update] Updated certificate {}", id);
        Ok(id.clone())
    }

    pub fn delete(&self, id: &PhysicalId) -> Result<PhysicalId, ResourceError> {
        match self.authority.delete_certificate(id) {
            Ok(()) => info!("[acm-delete] Deleted certificate {}", id),
            Err(AuthorityError::NotFound(_)) => {
                warn!("[acm-delete] Certificate {} was already deleted", id)
            }
            Err(err) => return Err(err.into()),
        }
        Ok(id.clone())
    }

    /// Reads the distinct challenge records of a freshly requested certificate.
    fn pending_challenges(&self, id: &PhysicalId) -> Result<Vec<Challenge>, ResourceError> {
        let descriptor = self.authority.describe_validation(id)?;
        if let Some(method) = descriptor.foreign_method() {
            return Err(ResourceError::UnexpectedState(format!(
                "Certificate unexpectedly changed its validation method from \"DNS\" to \"{}\"",
                method
            )));
        }
        if descriptor.validations.is_empty() {
            return Err(ResourceError::UnexpectedState(format!(
                "Certificate {id} has no domain validation options"
            )));
        }
        for validation in &descriptor.validations {
            if validation.status != ValidationStatus::PendingValidation {
                return Err(ResourceError::UnexpectedState(format!(
                    "Certificate status is \"{}\" for {}, expected \"{}\"",
                    validation.status,
                    validation.domain_name,
                    ValidationStatus::PendingValidation
                )));
            }
            if validation.record.is_none() {
                return Err(ResourceError::UnexpectedState(format!(
                    "Certificate {id} has no DNS validation record for {}",
                    validation.domain_name
                )));
            }
        }
        let challenges: Vec<Challenge> = descriptor.challenges().into_iter().cloned().collect();
        if let Some(challenge) = challenges.iter().find(|c| c.record_type != "CNAME") {
            return Err(ResourceError::UnexpectedState(format!(
                "Unexpected DNS resource record type: \"{}\"",
                challenge.record_type
            )));
        }
        Ok(challenges)
    }
}

fn required_physical_id(request: &RequestEnvelope) -> Result<&PhysicalId, ResourceError> {
    request.existing_physical_id().ok_or_else(|| {
        ResourceError::InvalidRequest(format!(
            "{} request is missing PhysicalResourceId",
            request.request_type
        ))
    })
}

fn check_names(desired: &DesiredState) -> Result<(), ResourceError> {
    let names: BTreeSet<&str> = std::iter::once(desired.domain_name.as_str())
        .chain(desired.san_set())
        .collect();
    for name in names {
        check_certificate_name(name)
            .map_err(|err| ResourceError::InvalidRequest(err.to_string()))?;
    }
    Ok(())
}
