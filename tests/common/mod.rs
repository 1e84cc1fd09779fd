#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use acm_certificate_resource::authority::CertificateAuthority;
use acm_certificate_resource::callback::OutcomeReporter;
use acm_certificate_resource::controller::LifecycleController;
use acm_certificate_resource::dns::{DnsRecordClient, RecordSet};
use acm_certificate_resource::error::AuthorityError;
use acm_certificate_resource::handler::ResourceHandler;
use acm_certificate_resource::model::{
    CallbackTarget, Challenge, DesiredState, IssuanceRequest, NameValidation, Outcome, PhysicalId,
    TagSet, TransparencyPreference, ValidationDescriptor, ValidationMethod, ValidationStatus,
};
use acm_certificate_resource::poller::{Clock, ManualClock, ValidationPoller};

#[derive(Debug, Clone, PartialEq)]
pub enum AuthorityCall {
    Request(IssuanceRequest),
    Describe(PhysicalId),
    UpdateTransparency(PhysicalId, TransparencyPreference),
    ListTags(PhysicalId),
    RemoveTags(PhysicalId, TagSet),
    AddTags(PhysicalId, TagSet),
    Delete(PhysicalId),
}

impl AuthorityCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, AuthorityCall::Describe(_) | AuthorityCall::ListTags(_))
    }
}

struct AuthorityState {
    calls: Vec<AuthorityCall>,
    issued: BTreeMap<String, PhysicalId>,
    certificates: BTreeMap<PhysicalId, TagSet>,
    method: ValidationMethod,
    statuses: VecDeque<ValidationStatus>,
    challenge: Challenge,
    alternate_names: Vec<(String, Challenge, VecDeque<ValidationStatus>)>,
    panic_on_describe: bool,
}

/// Pops the next scripted status; the last one repeats.
fn next_status(statuses: &mut VecDeque<ValidationStatus>) -> ValidationStatus {
    if statuses.len() > 1 {
        statuses.pop_front().unwrap()
    } else {
        statuses.front().cloned().unwrap()
    }
}

pub fn cname(name: &str, value: &str) -> Challenge {
    Challenge {
        name: name.to_string(),
        record_type: "CNAME".to_string(),
        value: value.to_string(),
    }
}

/// In-memory certificate authority that deduplicates on the idempotency token.
pub struct FakeAuthority {
    state: Mutex<AuthorityState>,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AuthorityState {
                calls: Vec::new(),
                issued: BTreeMap::new(),
                certificates: BTreeMap::new(),
                method: ValidationMethod::Dns,
                statuses: VecDeque::from(vec![ValidationStatus::PendingValidation]),
                challenge: cname("_val.example.com", "abc123"),
                alternate_names: Vec::new(),
                panic_on_describe: false,
            }),
        }
    }

    /// Statuses returned by successive describe calls; the last one repeats.
    pub fn set_statuses(&self, statuses: Vec<ValidationStatus>) {
        self.state.lock().unwrap().statuses = statuses.into();
    }

    pub fn set_method(&self, method: ValidationMethod) {
        self.state.lock().unwrap().method = method;
    }

    pub fn set_record_type(&self, record_type: &str) {
        self.state.lock().unwrap().challenge.record_type = record_type.to_string();
    }

    /// Adds a further name to the certificate with its own challenge and
    /// status script.
    pub fn add_alternate_name(&self, name: &str, challenge: Challenge, statuses: Vec<ValidationStatus>) {
        self.state
            .lock()
            .unwrap()
            .alternate_names
            .push((name.to_string(), challenge, statuses.into()));
    }

    pub fn panic_on_describe(&self) {
        self.state.lock().unwrap().panic_on_describe = true;
    }

    /// Registers an existing certificate with the given tags.
    pub fn insert_certificate(&self, id: &str, tags: TagSet) {
        self.state
            .lock()
            .unwrap()
            .certificates
            .insert(PhysicalId::new(id), tags);
    }

    pub fn tags_of(&self, id: &str) -> Option<TagSet> {
        self.state
            .lock()
            .unwrap()
            .certificates
            .get(&PhysicalId::new(id))
            .cloned()
    }

    pub fn certificate_count(&self) -> usize {
        self.state.lock().unwrap().certificates.len()
    }

    pub fn calls(&self) -> Vec<AuthorityCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<AuthorityCall> {
        self.calls().into_iter().filter(AuthorityCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

impl CertificateAuthority for FakeAuthority {
    fn request_certificate(&self, request: &IssuanceRequest) -> Result<PhysicalId, AuthorityError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(AuthorityCall::Request(request.clone()));
        if let Some(id) = state.issued.get(&request.idempotency_token) {
            return Ok(id.clone());
        }
        let id = PhysicalId::new(format!("arn:cert:{}", state.issued.len() + 1));
        state
            .issued
            .insert(request.idempotency_token.clone(), id.clone());
        state.certificates.insert(id.clone(), request.tags.clone());
        Ok(id)
    }

    fn describe_validation(&self, id: &PhysicalId) -> Result<ValidationDescriptor, AuthorityError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(AuthorityCall::Describe(id.clone()));
        if state.panic_on_describe {
            drop(state);
            panic!("describe exploded");
        }
        let state = &mut *state;
        let mut validations = vec![NameValidation {
            domain_name: "example.com".to_string(),
            method: state.method.clone(),
            status: next_status(&mut state.statuses),
            record: Some(state.challenge.clone()),
        }];
        for (name, challenge, statuses) in &mut state.alternate_names {
            validations.push(NameValidation {
                domain_name: name.clone(),
                method: ValidationMethod::Dns,
                status: next_status(statuses),
                record: Some(challenge.clone()),
            });
        }
        Ok(ValidationDescriptor { validations })
    }

    fn update_transparency_preference(
        &self,
        id: &PhysicalId,
        preference: TransparencyPreference,
    ) -> Result<(), AuthorityError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(AuthorityCall::UpdateTransparency(id.clone(), preference));
        Ok(())
    }

    fn list_tags(&self, id: &PhysicalId) -> Result<TagSet, AuthorityError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(AuthorityCall::ListTags(id.clone()));
        state
            .certificates
            .get(id)
            .cloned()
            .ok_or_else(|| AuthorityError::NotFound(id.to_string()))
    }

    fn remove_tags(&self, id: &PhysicalId, tags: &TagSet) -> Result<(), AuthorityError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(AuthorityCall::RemoveTags(id.clone(), tags.clone()));
        let current = state
            .certificates
            .get_mut(id)
            .ok_or_else(|| AuthorityError::NotFound(id.to_string()))?;
        for key in tags.keys() {
            current.remove(key);
        }
        Ok(())
    }

    fn add_tags(&self, id: &PhysicalId, tags: &TagSet) -> Result<(), AuthorityError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(AuthorityCall::AddTags(id.clone(), tags.clone()));
        let current = state
            .certificates
            .get_mut(id)
            .ok_or_else(|| AuthorityError::NotFound(id.to_string()))?;
        current.extend(tags.clone());
        Ok(())
    }

    fn delete_certificate(&self, id: &PhysicalId) -> Result<(), AuthorityError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(AuthorityCall::Delete(id.clone()));
        match state.certificates.remove(id) {
            Some(_) => Ok(()),
            None => Err(AuthorityError::NotFound(id.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DnsCall {
    Upsert(String, RecordSet),
    Delete(String, RecordSet),
}

/// In-memory hosted zones keyed by (zone, record name).
#[derive(Default)]
pub struct FakeDns {
    calls: Mutex<Vec<DnsCall>>,
    records: Mutex<BTreeMap<(String, String), RecordSet>>,
    fail_delete: Mutex<bool>,
}

impl FakeDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deletes(&self) {
        *self.fail_delete.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<DnsCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl DnsRecordClient for FakeDns {
    fn upsert(&self, zone_id: &str, record: &RecordSet) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(DnsCall::Upsert(zone_id.to_string(), record.clone()));
        self.records
            .lock()
            .unwrap()
            .insert((zone_id.to_string(), record.name.clone()), record.clone());
        Ok(())
    }

    fn delete(&self, zone_id: &str, record: &RecordSet) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(DnsCall::Delete(zone_id.to_string(), record.clone()));
        if *self.fail_delete.lock().unwrap() {
            return Err(anyhow!("Route 53 throttled the request"));
        }
        self.records
            .lock()
            .unwrap()
            .remove(&(zone_id.to_string(), record.name.clone()));
        Ok(())
    }
}

/// Collects reported outcomes instead of sending them.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(CallbackTarget, Outcome)>>,
    fail: Mutex<bool>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_delivery(&self) {
        *self.fail.lock().unwrap() = true;
    }

    pub fn reports(&self) -> Vec<(CallbackTarget, Outcome)> {
        self.reports.lock().unwrap().clone()
    }
}

impl OutcomeReporter for RecordingReporter {
    fn report(&self, target: &CallbackTarget, outcome: &Outcome) -> Result<()> {
        self.reports
            .lock()
            .unwrap()
            .push((target.clone(), outcome.clone()));
        if *self.fail.lock().unwrap() {
            return Err(anyhow!("connection reset"));
        }
        Ok(())
    }
}

/// Fakes for every collaborator plus a simulated clock.
pub struct Harness {
    pub authority: Arc<FakeAuthority>,
    pub dns: Arc<FakeDns>,
    pub clock: Arc<ManualClock>,
    pub reporter: Arc<RecordingReporter>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            authority: Arc::new(FakeAuthority::new()),
            dns: Arc::new(FakeDns::new()),
            clock: Arc::new(ManualClock::new()),
            reporter: Arc::new(RecordingReporter::new()),
        }
    }

    pub fn controller(&self) -> LifecycleController {
        let poller = ValidationPoller::new(self.authority.clone(), self.clock.clone());
        LifecycleController::new(self.authority.clone(), self.dns.clone(), poller)
    }

    pub fn handler(&self) -> ResourceHandler {
        ResourceHandler::new(self.controller(), self.reporter.clone())
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.clock.now().as_secs()
    }
}

pub fn properties(domain: &str, sans: &[&str], zone: &str) -> Value {
    json!({
        "ServiceToken": "arn:aws:lambda:eu-west-1:123456789012:function:acm-certificate",
        "DomainName": domain,
        "SubjectAlternativeNames": sans,
        "HostedZoneId": zone,
    })
}

pub fn desired(properties: Value) -> DesiredState {
    serde_json::from_value(properties).unwrap()
}

pub fn event(request_type: &str, properties: Value) -> Value {
    json!({
        "RequestType": request_type,
        "ServiceToken": "arn:aws:lambda:eu-west-1:123456789012:function:acm-certificate",
        "ResponseURL": "https://cloudformation-custom-resource-response-euwest1.s3.amazonaws.com/signed",
        "StackId": "arn:aws:cloudformation:eu-west-1:123456789012:stack/web/5b2a",
        "RequestId": "7bfe2d54-710d-4e0e-9d25-6b4c0e9e8d4e",
        "LogicalResourceId": "Certificate",
        "ResourceType": "Custom::AcmCertificate",
        "ResourceProperties": properties,
    })
}

pub fn update_event(physical_id: &str, old: Value, new: Value) -> Value {
    let mut event = event("Update", new);
    event["OldResourceProperties"] = old;
    event["PhysicalResourceId"] = json!(physical_id);
    event
}

pub fn delete_event(physical_id: &str, properties: Value) -> Value {
    let mut event = event("Delete", properties);
    event["PhysicalResourceId"] = json!(physical_id);
    event
}

pub fn tags(pairs: &[(&str, &str)]) -> TagSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn tag_list(pairs: &[(&str, &str)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(k, v)| json!({ "Key": k, "Value": v }))
            .collect(),
    )
}
