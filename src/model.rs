use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ResourceError;

/// Validation window used when the resource does not set `Timeout`.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// ACM rejects idempotency tokens longer than this.
const IDEMPOTENCY_TOKEN_LEN: usize = 32;

/// Tag key → value. Ordering is irrelevant; equality is set equality.
pub type TagSet = BTreeMap<String, String>;

/// The authority-assigned identifier of a managed certificate (an ACM ARN).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalId(String);

impl PhysicalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PhysicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransparencyPreference {
    Enabled,
    #[default]
    Disabled,
}

impl fmt::Display for TransparencyPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransparencyPreference::Enabled => f.write_str("ENABLED"),
            TransparencyPreference::Disabled => f.write_str("DISABLED"),
        }
    }
}

/// Post-issuance certificate options (`Options` property).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateOptions {
    #[serde(default)]
    pub certificate_transparency_logging_preference: TransparencyPreference,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TagEntry {
    key: String,
    #[serde(default)]
    value: String,
}

/// The desired configuration of the certificate (`ResourceProperties`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DesiredState {
    pub domain_name: String,
    #[serde(default)]
    pub subject_alternative_names: Vec<String>,
    pub hosted_zone_id: String,
    #[serde(default)]
    pub options: CertificateOptions,
    #[serde(default, rename = "CertificateTags", deserialize_with = "tags_from_entries")]
    pub tags: TagSet,
    #[serde(default, rename = "Timeout")]
    timeout: Option<Value>,
}

impl DesiredState {
    pub fn transparency(&self) -> TransparencyPreference {
        self.options.certificate_transparency_logging_preference
    }

    /// Subject alternative names as a set; order and duplicates do not matter.
    pub fn san_set(&self) -> BTreeSet<&str> {
        self.subject_alternative_names
            .iter()
            .map(String::as_str)
            .collect()
    }

    /// Validation window in seconds. Only Create reads `Timeout`.
    ///
    /// CloudFormation passes every scalar property as a string, so both
    /// `"300"` and `300` are accepted.
    pub fn timeout_secs(&self) -> Result<u64, ResourceError> {
        let invalid =
            |raw: &Value| ResourceError::InvalidRequest(format!("invalid Timeout value: {raw}"));
        match &self.timeout {
            None | Some(Value::Null) => Ok(DEFAULT_TIMEOUT_SECS),
            Some(raw @ Value::Number(number)) => number.as_u64().ok_or_else(|| invalid(raw)),
            Some(raw @ Value::String(text)) => text.trim().parse().map_err(|_| invalid(raw)),
            Some(raw) => Err(invalid(raw)),
        }
    }
}

fn tags_from_entries<'de, D>(deserializer: D) -> Result<TagSet, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<TagEntry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RequestType {
    Create,
    Update,
    Delete,
    Unknown(String),
}

impl From<String> for RequestType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Create" => RequestType::Create,
            "Update" => RequestType::Update,
            "Delete" => RequestType::Delete,
            _ => RequestType::Unknown(value),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Create => f.write_str("Create"),
            RequestType::Update => f.write_str("Update"),
            RequestType::Delete => f.write_str("Delete"),
            RequestType::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// Correlation fields echoed back to CloudFormation, plus where to send them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackTarget {
    #[serde(rename = "StackId")]
    pub stack_id: String,
    #[serde(rename = "RequestId")]
    pub request_id: String,
    #[serde(rename = "LogicalResourceId")]
    pub logical_resource_id: String,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
}

/// One custom-resource invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestEnvelope {
    pub request_type: RequestType,
    #[serde(flatten)]
    pub callback: CallbackTarget,
    /// Raw `ResourceProperties`; parsed only by the operations that use them.
    #[serde(default)]
    pub resource_properties: Value,
    #[serde(default)]
    pub old_resource_properties: Option<Value>,
    #[serde(default)]
    pub physical_resource_id: Option<PhysicalId>,
}

impl RequestEnvelope {
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn desired_state(&self) -> Result<DesiredState, ResourceError> {
        parse_properties("ResourceProperties", &self.resource_properties)
    }

    pub fn previous_state(&self) -> Result<DesiredState, ResourceError> {
        match &self.old_resource_properties {
            Some(value) if !value.is_null() => parse_properties("OldResourceProperties", value),
            _ => Err(ResourceError::InvalidRequest(format!(
                "{} request is missing OldResourceProperties",
                self.request_type
            ))),
        }
    }

    /// Deduplication key for the issuance request.
    ///
    /// Stable for a given stack and request, so a retried Create maps onto
    /// the certificate the first attempt requested.
    pub fn idempotency_token(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.callback.stack_id.as_bytes());
        hasher.update(self.callback.request_id.as_bytes());
        let mut token = hex::encode(hasher.finalize());
        token.truncate(IDEMPOTENCY_TOKEN_LEN);
        token
    }

    /// The physical id supplied by the caller, if it is usable.
    pub fn existing_physical_id(&self) -> Option<&PhysicalId> {
        self.physical_resource_id
            .as_ref()
            .filter(|id| !id.is_empty())
    }
}

fn parse_properties(field: &str, value: &Value) -> Result<DesiredState, ResourceError> {
    DesiredState::deserialize(value)
        .map_err(|err| ResourceError::InvalidRequest(format!("{field}: {err}")))
}

/// Everything the authority needs to issue a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceRequest {
    pub domain_name: String,
    pub subject_alternative_names: Vec<String>,
    pub idempotency_token: String,
    pub transparency: TransparencyPreference,
    pub tags: TagSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationMethod {
    Dns,
    Email,
    Http,
    Other(String),
}

impl fmt::Display for ValidationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMethod::Dns => f.write_str("DNS"),
            ValidationMethod::Email => f.write_str("EMAIL"),
            ValidationMethod::Http => f.write_str("HTTP"),
            ValidationMethod::Other(raw) => f.write_str(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    PendingValidation,
    Success,
    Failed,
    Other(String),
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::PendingValidation => f.write_str("PENDING_VALIDATION"),
            ValidationStatus::Success => f.write_str("SUCCESS"),
            ValidationStatus::Failed => f.write_str("FAILED"),
            ValidationStatus::Other(raw) => f.write_str(raw),
        }
    }
}

/// The DNS record the authority asks to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub name: String,
    pub record_type: String,
    pub value: String,
}

/// Validation state of one name on the certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameValidation {
    pub domain_name: String,
    pub method: ValidationMethod,
    pub status: ValidationStatus,
    pub record: Option<Challenge>,
}

/// Snapshot of a certificate's domain validation, one entry per name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationDescriptor {
    pub validations: Vec<NameValidation>,
}

impl ValidationDescriptor {
    /// The first validation method other than DNS, if any name uses one.
    pub fn foreign_method(&self) -> Option<&ValidationMethod> {
        self.validations
            .iter()
            .map(|validation| &validation.method)
            .find(|method| **method != ValidationMethod::Dns)
    }

    /// True once every name on the certificate is validated.
    pub fn is_validated(&self) -> bool {
        !self.validations.is_empty()
            && self
                .validations
                .iter()
                .all(|validation| validation.status == ValidationStatus::Success)
    }

    /// Distinct challenge records. Names that share a record (a wildcard and
    /// its base name) yield it once.
    pub fn challenges(&self) -> Vec<&Challenge> {
        let mut challenges: Vec<&Challenge> = Vec::new();
        for record in self.validations.iter().filter_map(|v| v.record.as_ref()) {
            if !challenges.contains(&record) {
                challenges.push(record);
            }
        }
        challenges
    }

    pub fn status_summary(&self) -> String {
        self.validations
            .iter()
            .map(|validation| format!("{}={}", validation.domain_name, validation.status))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Terminal result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_id: Option<PhysicalId>,
}

impl Outcome {
    pub fn success(physical_id: PhysicalId) -> Self {
        Self {
            status: ResponseStatus::Success,
            reason: "Success".to_string(),
            physical_id: Some(physical_id),
        }
    }

    pub fn failure(reason: impl Into<String>, physical_id: Option<PhysicalId>) -> Self {
        Self {
            status: ResponseStatus::Failed,
            reason: reason.into(),
            physical_id: physical_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}
