//! Background credential renewal
//!
//! Keeps one credential alive by re-issuing it before it expires. Each cycle:
//!
//! 1. Issue a certificate through the [`CertificateAuthority`].
//! 2. Deliver the outcome to the subscriber, exactly once.
//! 3. Sleep for 90% of the new certificate's remaining lifetime, or for
//!    [`RETRY_DELAY`] if issuance failed.
//!
//! The delay always comes from the outcome just observed, so the loop tracks
//! whatever lifetime the CA actually grants. Failures never end the loop;
//! there is no failure cap and no circuit breaker. A subscriber that ignores
//! errors simply sees fresh credentials resume once the CA recovers.
//!
//! A subscriber that panics is treated like a failed issuance: the panic is
//! reported as a [`RenewalEvent::Failed`] and the loop retries after
//! [`RETRY_DELAY`].
//!
//! Cycles for one subscription are strictly sequential. Separate
//! subscriptions run as independent tasks sharing only the CA client.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::authority::CertificateAuthority;
use crate::error::PkiError;
use crate::types::{Credential, IssueRequest};

/// Delay before retrying after a failed issuance
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Fraction of the remaining lifetime to wait before renewing
pub const RENEW_AT_FRACTION: f64 = 0.9;

/// Delay until the next issuance for a credential with `expires_in` seconds left.
///
/// Non-positive lifetimes renew immediately.
pub fn renewal_delay(expires_in: i64) -> Duration {
    if expires_in <= 0 {
        return Duration::ZERO;
    }
    let millis = (expires_in as f64 * 1000.0 * RENEW_AT_FRACTION).round();
    Duration::from_millis(millis as u64)
}

/// Structured events emitted by a renewal loop
#[derive(Debug, Clone, PartialEq)]
pub enum RenewalEvent {
    /// A credential was issued and delivered
    Issued { serial: String, expires_in: i64 },
    /// Issuance failed and the error was delivered
    Failed { message: String },
    /// The next cycle is scheduled after `delay`
    Scheduled { delay: Duration },
    /// The loop stopped because its handle was cancelled
    Cancelled,
}

/// Sink for [`RenewalEvent`]s
pub trait RenewalEvents: Send + Sync {
    fn on_event(&self, subscription: &str, event: &RenewalEvent);
}

/// Forwards renewal events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl RenewalEvents for TracingEvents {
    fn on_event(&self, subscription: &str, event: &RenewalEvent) {
        match event {
            RenewalEvent::Issued { serial, expires_in } => {
                info!(
                    subscription = %subscription,
                    serial = %serial,
                    expires_in_secs = expires_in,
                    "Credential issued"
                );
            }
            RenewalEvent::Failed { message } => {
                warn!(subscription = %subscription, error = %message, "Credential issuance failed");
            }
            RenewalEvent::Scheduled { delay } => {
                debug!(
                    subscription = %subscription,
                    delay_secs = delay.as_secs(),
                    "Scheduled next issuance"
                );
            }
            RenewalEvent::Cancelled => {
                info!(subscription = %subscription, "Renewal cancelled");
            }
        }
    }
}

/// A credential to keep renewed
#[derive(Debug, Clone)]
pub struct RenewalSubscription {
    /// Name used in events and logs
    pub name: String,
    /// What to issue on every cycle
    pub request: IssueRequest,
}

impl RenewalSubscription {
    pub fn new(name: impl Into<String>, request: IssueRequest) -> Self {
        Self {
            name: name.into(),
            request,
        }
    }
}

/// Handle to a running renewal loop.
///
/// Dropping the handle leaves the loop running.
#[derive(Debug)]
pub struct RenewalHandle {
    name: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl RenewalHandle {
    /// Subscription name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the loop before its next cycle.
    ///
    /// An issuance already in flight completes and is delivered first.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that stops the loop when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop task to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(subscription = %self.name, error = %e, "Renewal task ended abnormally");
        }
    }
}

/// Renewal loop for a single subscription
pub struct RenewalLoop<F> {
    ca: Arc<dyn CertificateAuthority>,
    subscription: RenewalSubscription,
    on_update: F,
    events: Arc<dyn RenewalEvents>,
}

impl<F> RenewalLoop<F>
where
    F: FnMut(Result<Credential, PkiError>) + Send + 'static,
{
    /// Create a loop delivering every outcome to `on_update`
    pub fn new(
        ca: Arc<dyn CertificateAuthority>,
        subscription: RenewalSubscription,
        on_update: F,
    ) -> Self {
        Self {
            ca,
            subscription,
            on_update,
            events: Arc::new(TracingEvents),
        }
    }

    /// Replace the default `tracing` event sink
    pub fn with_events(mut self, events: Arc<dyn RenewalEvents>) -> Self {
        self.events = events;
        self
    }

    /// Spawn the loop onto the current tokio runtime
    pub fn spawn(self) -> RenewalHandle {
        let token = CancellationToken::new();
        let name = self.subscription.name.clone();
        let task = tokio::spawn(self.run(token.clone()));
        RenewalHandle { name, token, task }
    }

    /// Run cycles until `token` is cancelled
    pub async fn run(mut self, token: CancellationToken) {
        let name = self.subscription.name.clone();

        info!(
            subscription = %name,
            role = %self.subscription.request.role,
            common_name = %self.subscription.request.common_name,
            "Starting credential renewal"
        );

        loop {
            if token.is_cancelled() {
                break;
            }

            let delay = self.cycle(&name).await;
            self.events
                .on_event(&name, &RenewalEvent::Scheduled { delay });

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.events.on_event(&name, &RenewalEvent::Cancelled);
    }

    /// One issue-and-deliver step, returning the delay before the next one
    async fn cycle(&mut self, name: &str) -> Duration {
        match self.ca.issue(&self.subscription.request).await {
            Ok(credential) => {
                let delay = renewal_delay(credential.expires_in);
                self.events.on_event(
                    name,
                    &RenewalEvent::Issued {
                        serial: credential.serial.clone(),
                        expires_in: credential.expires_in,
                    },
                );
                if self.deliver(name, Ok(credential)) {
                    delay
                } else {
                    RETRY_DELAY
                }
            }
            Err(e) => {
                self.events.on_event(
                    name,
                    &RenewalEvent::Failed {
                        message: e.to_string(),
                    },
                );
                self.deliver(name, Err(e));
                RETRY_DELAY
            }
        }
    }

    /// Hand `update` to the subscriber. A panicking subscriber is reported as
    /// a failed cycle and does not take the loop down with it.
    fn deliver(&mut self, name: &str, update: Result<Credential, PkiError>) -> bool {
        let on_update = &mut self.on_update;
        match panic::catch_unwind(AssertUnwindSafe(move || on_update(update))) {
            Ok(()) => true,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.events.on_event(
                    name,
                    &RenewalEvent::Failed {
                        message: format!("Subscriber panicked: {}", message),
                    },
                );
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

impl<F> fmt::Debug for RenewalLoop<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenewalLoop")
            .field("subscription", &self.subscription.name)
            .finish()
    }
}

/// Start keeping `subscription` renewed, delivering every outcome to `on_update`.
///
/// Must be called from within a tokio runtime.
pub fn start_renewal<F>(
    ca: Arc<dyn CertificateAuthority>,
    subscription: RenewalSubscription,
    on_update: F,
) -> RenewalHandle
where
    F: FnMut(Result<Credential, PkiError>) + Send + 'static,
{
    RenewalLoop::new(ca, subscription, on_update).spawn()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_ninety_percent() {
        assert_eq!(renewal_delay(100), Duration::from_secs(90));
        assert_eq!(renewal_delay(3600), Duration::from_secs(3240));
        assert_eq!(renewal_delay(1), Duration::from_millis(900));
    }

    #[test]
    fn test_delay_rounds_to_millis() {
        assert_eq!(renewal_delay(7), Duration::from_millis(6300));
    }

    #[test]
    fn test_expired_renews_immediately() {
        assert_eq!(renewal_delay(0), Duration::ZERO);
        assert_eq!(renewal_delay(-50), Duration::ZERO);
    }
}
