pub mod authority;
pub mod aws;
pub mod callback;
pub mod config;
pub mod controller;
pub mod dns;
pub mod domain;
pub mod error;
pub mod handler;
pub mod model;
pub mod poller;

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use authority::{AcmAuthority, CertificateAuthority};
use aws::AwsContext;
use callback::{HttpOutcomeReporter, OutcomeReporter};
use config::Settings;
use controller::LifecycleController;
use dns::Route53Records;
use handler::ResourceHandler;
use model::Outcome;
use poller::{SystemClock, ValidationPoller};

/// Wires the ACM and Route 53 adapters and the poller into a controller
/// using the default AWS configuration chain.
pub fn aws_controller(settings: &Settings) -> Result<LifecycleController> {
    let aws = AwsContext::load()?;
    let authority: Arc<dyn CertificateAuthority> =
        Arc::new(AcmAuthority::new(aws.clone(), settings));
    let dns = Arc::new(Route53Records::new(aws));
    let poller = ValidationPoller::new(authority.clone(), Arc::new(SystemClock::new()));
    Ok(LifecycleController::new(authority, dns, poller))
}

/// Handles one event against AWS and reports the outcome over HTTP.
///
/// A failure to set up the AWS clients is still reported to the caller.
pub fn handle_event(event: Value, settings: &Settings) -> Result<Outcome> {
    let reporter: Arc<dyn OutcomeReporter> = Arc::new(HttpOutcomeReporter::new(settings)?);
    match aws_controller(settings) {
        Ok(controller) => ResourceHandler::new(controller, reporter).handle_event(event),
        Err(err) => {
            log::error!("[handler] Failed to initialise AWS clients: {err:#}");
            handler::report_failure(reporter.as_ref(), &event, format!("{err:#}"))
        }
    }
}
