use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info};
use serde::Deserialize;
use serde_json::Value;

use crate::callback::OutcomeReporter;
use crate::controller::LifecycleController;
use crate::model::{CallbackTarget, Outcome, PhysicalId, RequestEnvelope};

/// Runs one custom-resource invocation end to end.
///
/// Whatever happens inside the controller, exactly one outcome is handed
/// to the reporter.
pub struct ResourceHandler {
    controller: LifecycleController,
    reporter: Arc<dyn OutcomeReporter>,
}

impl ResourceHandler {
    pub fn new(controller: LifecycleController, reporter: Arc<dyn OutcomeReporter>) -> Self {
        Self {
            controller,
            reporter,
        }
    }

    /// Handles a raw event and reports its outcome.
    ///
    /// Errors only when the outcome could not be delivered, including when
    /// the event does not say where to deliver it.
    pub fn handle_event(&self, event: Value) -> Result<Outcome> {
        let envelope = match RequestEnvelope::from_json(event.clone()) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!("[handler] Malformed request: {}", err);
                return report_failure(
                    self.reporter.as_ref(),
                    &event,
                    format!("Invalid request: {err}"),
                );
            }
        };
        info!(
            "[handler] {} request for {}",
            envelope.request_type, envelope.callback.logical_resource_id
        );
        let outcome = self.outcome_for(&envelope);
        self.reporter
            .report(&envelope.callback, &outcome)
            .context("Failed to report outcome")?;
        Ok(outcome)
    }

    /// Converts the controller's result into an outcome.
    pub fn outcome_for(&self, envelope: &RequestEnvelope) -> Outcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.controller.reconcile(envelope)));
        match result {
            Ok(Ok(id)) => {
                info!("[handler] Success: {}", id);
                Outcome::success(id)
            }
            Ok(Err(err)) => {
                error!("[handler] ERROR: {}", err);
                let id = err
                    .physical_id()
                    .or_else(|| envelope.existing_physical_id())
                    .cloned();
                Outcome::failure(err.to_string(), id)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("[handler] Internal error: {}", message);
                Outcome::failure(
                    format!("Internal error: {message}"),
                    envelope.existing_physical_id().cloned(),
                )
            }
        }
    }
}

/// Reports a failure for an event the controller never got to see.
pub fn report_failure(
    reporter: &dyn OutcomeReporter,
    event: &Value,
    reason: impl Into<String>,
) -> Result<Outcome> {
    let target = CallbackTarget::deserialize(event)
        .context("event has no usable callback fields; cannot report an outcome")?;
    let echoed = event
        .get("PhysicalResourceId")
        .and_then(Value::as_str)
        .map(PhysicalId::new);
    let outcome = Outcome::failure(reason, echoed);
    reporter
        .report(&target, &outcome)
        .context("Failed to report outcome")?;
    Ok(outcome)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
