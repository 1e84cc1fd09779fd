use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use aws_sdk_acm::Client;
use aws_sdk_acm::error::{DisplayErrorContext, SdkError};
use aws_sdk_acm::operation::delete_certificate::DeleteCertificateError;
use aws_sdk_acm::operation::describe_certificate::DescribeCertificateError;
use aws_sdk_acm::types::{
    CertificateOptions, CertificateTransparencyLoggingPreference, DomainValidation, Tag,
    ValidationMethod as AcmValidationMethod,
};
use log::{debug, info, warn};

use super::CertificateAuthority;
use crate::aws::AwsContext;
use crate::config::Settings;
use crate::error::AuthorityError;
use crate::model::{
    Challenge, IssuanceRequest, NameValidation, PhysicalId, TagSet, TransparencyPreference,
    ValidationDescriptor, ValidationMethod, ValidationStatus,
};

/// [`CertificateAuthority`] backed by AWS Certificate Manager.
pub struct AcmAuthority {
    aws: AwsContext,
    client: Client,
    record_attempts: u32,
    record_retry_delay: Duration,
}

impl AcmAuthority {
    pub fn new(aws: AwsContext, settings: &Settings) -> Self {
        let client = Client::new(aws.sdk_config());
        Self {
            aws,
            client,
            record_attempts: settings.record_attempts,
            record_retry_delay: settings.record_retry_delay,
        }
    }

    async fn describe_once(&self, id: &PhysicalId) -> Result<ValidationDescriptor, AuthorityError> {
        let output = self
            .client
            .describe_certificate()
            .certificate_arn(id.as_str())
            .send()
            .await
            .map_err(|err| {
                classify(
                    err,
                    id,
                    "DescribeCertificate",
                    DescribeCertificateError::is_resource_not_found_exception,
                )
            })?;
        let detail = output
            .certificate()
            .ok_or_else(|| anyhow!("ACM returned no certificate detail for {id}"))?;
        Ok(ValidationDescriptor {
            validations: detail
                .domain_validation_options()
                .iter()
                .map(name_validation_from)
                .collect(),
        })
    }

    fn acm_tags(tags: &TagSet) -> Result<Vec<Tag>, AuthorityError> {
        tags.iter()
            .map(|(key, value)| {
                Tag::builder()
                    .key(key)
                    .value(value)
                    .build()
                    .map_err(|e| AuthorityError::Service(anyhow!("Failed to build Tag: {}", e)))
            })
            .collect()
    }
}

impl CertificateAuthority for AcmAuthority {
    fn request_certificate(&self, request: &IssuanceRequest) -> Result<PhysicalId, AuthorityError> {
        info!(
            "[acm] Requesting certificate for \"{}\" ({} alternate name(s))",
            request.domain_name,
            request.subject_alternative_names.len()
        );
        let options = CertificateOptions::builder()
            .certificate_transparency_logging_preference(transparency_to_acm(request.transparency))
            .build();
        let mut call = self
            .client
            .request_certificate()
            .domain_name(&request.domain_name)
            .validation_method(AcmValidationMethod::Dns)
            .idempotency_token(&request.idempotency_token)
            .options(options);
        if !request.subject_alternative_names.is_empty() {
            call = call.set_subject_alternative_names(Some(request.subject_alternative_names.clone()));
        }
        if !request.tags.is_empty() {
            call = call.set_tags(Some(Self::acm_tags(&request.tags)?));
        }

        let output = self
            .aws
            .block_on(call.send())
            .map_err(|err| service_failure("RequestCertificate", &request.domain_name, err))?;
        output
            .certificate_arn()
            .map(PhysicalId::new)
            .ok_or_else(|| AuthorityError::Service(anyhow!("ACM returned no certificate ARN")))
    }

    fn describe_validation(&self, id: &PhysicalId) -> Result<ValidationDescriptor, AuthorityError> {
        // ACM fills in the validation records shortly after the request.
        let mut attempt = 0;
        loop {
            attempt += 1;
            let descriptor = self.aws.block_on(self.describe_once(id))?;
            if records_published(&descriptor) {
                return Ok(descriptor);
            }
            if attempt >= self.record_attempts {
                warn!(
                    "[acm] Validation records for {} still incomplete after {} attempt(s)",
                    id, attempt
                );
                return Ok(descriptor);
            }
            debug!(
                "[acm] Validation records for {} not available yet (attempt {}), retrying in {}ms",
                id,
                attempt,
                self.record_retry_delay.as_millis()
            );
            thread::sleep(self.record_retry_delay);
        }
    }

    fn update_transparency_preference(
        &self,
        id: &PhysicalId,
        preference: TransparencyPreference,
    ) -> Result<(), AuthorityError> {
        let options = CertificateOptions::builder()
            .certificate_transparency_logging_preference(transparency_to_acm(preference))
            .build();
        self.aws
            .block_on(
                self.client
                    .update_certificate_options()
                    .certificate_arn(id.as_str())
                    .options(options)
                    .send(),
            )
            .map_err(|err| service_failure("UpdateCertificateOptions", id.as_str(), err))?;
        Ok(())
    }

    fn list_tags(&self, id: &PhysicalId) -> Result<TagSet, AuthorityError> {
        let output = self
            .aws
            .block_on(
                self.client
                    .list_tags_for_certificate()
                    .certificate_arn(id.as_str())
                    .send(),
            )
            .map_err(|err| service_failure("ListTagsForCertificate", id.as_str(), err))?;
        Ok(output
            .tags()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().unwrap_or_default().to_string()))
            .collect())
    }

    fn remove_tags(&self, id: &PhysicalId, tags: &TagSet) -> Result<(), AuthorityError> {
        if tags.is_empty() {
            return Ok(());
        }
        self.aws
            .block_on(
                self.client
                    .remove_tags_from_certificate()
                    .certificate_arn(id.as_str())
                    .set_tags(Some(Self::acm_tags(tags)?))
                    .send(),
            )
            .map_err(|err| service_failure("RemoveTagsFromCertificate", id.as_str(), err))?;
        Ok(())
    }

    fn add_tags(&self, id: &PhysicalId, tags: &TagSet) -> Result<(), AuthorityError> {
        if tags.is_empty() {
            return Ok(());
        }
        self.aws
            .block_on(
                self.client
                    .add_tags_to_certificate()
                    .certificate_arn(id.as_str())
                    .set_tags(Some(Self::acm_tags(tags)?))
                    .send(),
            )
            .map_err(|err| service_failure("AddTagsToCertificate", id.as_str(), err))?;
        Ok(())
    }

    fn delete_certificate(&self, id: &PhysicalId) -> Result<(), AuthorityError> {
        self.aws
            .block_on(
                self.client
                    .delete_certificate()
                    .certificate_arn(id.as_str())
                    .send(),
            )
            .map_err(|err| {
                classify(
                    err,
                    id,
                    "DeleteCertificate",
                    DeleteCertificateError::is_resource_not_found_exception,
                )
            })?;
        Ok(())
    }
}

fn classify<E>(
    err: SdkError<E>,
    id: &PhysicalId,
    operation: &str,
    is_not_found: fn(&E) -> bool,
) -> AuthorityError
where
    E: std::error::Error + 'static,
{
    if err.as_service_error().is_some_and(is_not_found) {
        return AuthorityError::NotFound(id.to_string());
    }
    service_failure(operation, id.as_str(), err)
}

fn service_failure<E>(operation: &str, subject: &str, err: SdkError<E>) -> AuthorityError
where
    E: std::error::Error + 'static,
{
    AuthorityError::Service(anyhow!(
        "ACM {operation} failed for {subject}: {}",
        DisplayErrorContext(&err)
    ))
}

fn transparency_to_acm(preference: TransparencyPreference) -> CertificateTransparencyLoggingPreference {
    match preference {
        TransparencyPreference::Enabled => CertificateTransparencyLoggingPreference::Enabled,
        TransparencyPreference::Disabled => CertificateTransparencyLoggingPreference::Disabled,
    }
}

fn records_published(descriptor: &ValidationDescriptor) -> bool {
    !descriptor.validations.is_empty()
        && descriptor
            .validations
            .iter()
            .all(|validation| validation.record.is_some())
}

fn name_validation_from(validation: &DomainValidation) -> NameValidation {
    NameValidation {
        domain_name: validation.domain_name().to_string(),
        method: parse_method(validation.validation_method().map(|m| m.as_str())),
        status: parse_status(validation.validation_status().map(|s| s.as_str())),
        record: validation.resource_record().map(|record| Challenge {
            name: record.name().to_string(),
            record_type: record.r#type().as_str().to_string(),
            value: record.value().to_string(),
        }),
    }
}

fn parse_method(raw: Option<&str>) -> ValidationMethod {
    match raw {
        Some("DNS") => ValidationMethod::Dns,
        Some("EMAIL") => ValidationMethod::Email,
        Some("HTTP") => ValidationMethod::Http,
        Some(other) => ValidationMethod::Other(other.to_string()),
        None => ValidationMethod::Other("NONE".to_string()),
    }
}

fn parse_status(raw: Option<&str>) -> ValidationStatus {
    match raw {
        Some("PENDING_VALIDATION") => ValidationStatus::PendingValidation,
        Some("SUCCESS") => ValidationStatus::Success,
        Some("FAILED") => ValidationStatus::Failed,
        Some(other) => ValidationStatus::Other(other.to_string()),
        None => ValidationStatus::Other("NONE".to_string()),
    }
}
