use super::aggregator::AggregatedVerdict;
use super::evaluator::SafetyVerdict;

/// Operator alerts raised on stable-verdict edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertPolicy {
    pub alert_on_fake_guardrail: bool,
    pub alert_on_no_detection: bool,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            alert_on_fake_guardrail: true,
            alert_on_no_detection: false,
        }
    }
}

/// Alert raised for an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alert {
    FakeGuardrail,
    NoDetection,
}

impl AlertPolicy {
    /// Returns the alert for this tick, if any. Only edges alert.
    pub fn check(&self, aggregated: &AggregatedVerdict) -> Option<Alert> {
        if !aggregated.changed {
            return None;
        }
        let alert = match aggregated.current {
            SafetyVerdict::GuardrailMisclassified if self.alert_on_fake_guardrail => {
                Some(Alert::FakeGuardrail)
            }
            SafetyVerdict::Indeterminate if self.alert_on_no_detection => Some(Alert::NoDetection),
            _ => None,
        };
        match alert {
            Some(Alert::FakeGuardrail) => {
                log::warn!("ALERT: guardrail misclassification is now stable")
            }
            Some(Alert::NoDetection) => {
                log::warn!("ALERT: guardrail/scaffold pair no longer detected")
            }
            None => {}
        }
        alert
    }
}
