use crate::context::ContextType;
use crate::gate::Gate;

/// Events emitted while a request is resolved and gated
///
/// These events let observers trace every gate decision without the
/// pipeline knowing where the trace goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    // ===== Context Lifecycle =====
    /// A fresh signed envelope was verified and its context stored
    ContextResolved {
        /// Application the context belongs to
        app_id: String,
        /// Type of the new context
        context_type: ContextType,
    },

    /// A signed envelope failed verification
    ContextVerificationFailed {
        /// Application the envelope was addressed to
        app_id: String,
        /// Verification error message
        error: String,
    },

    /// Verification failed but the previously stored context is still served
    ContextRetained {
        /// Application the context belongs to
        app_id: String,
        /// Type of the retained context, if one was stored
        context_type: Option<ContextType>,
    },

    /// Verification failed and the previously stored context was removed
    ContextInvalidated {
        /// Application the context belonged to
        app_id: String,
    },

    // ===== Gate Lifecycle =====
    /// The route does not declare this gate's requirement
    GateSkipped {
        gate: Gate,
    },

    /// The gate accepted the request
    GatePassed {
        gate: Gate,
        /// Short description of what was accepted
        detail: String,
    },

    /// The gate rejected the request; the pipeline stops here
    GateFailed {
        gate: Gate,
        /// Stable error kind, see [`crate::GateError::kind`]
        kind: &'static str,
        /// Error message
        message: String,
    },

    // ===== Credentials =====
    /// Outbound calls now use the user's grant token
    TokenSwitched {
        /// Platform id of the user, when known
        user_id: Option<String>,
    },
}

/// Hook for observing gate events
///
/// Implement this trait to receive notifications about gate decisions.
///
/// # Example
/// ```
/// use canvasgate_core::events::{GateEvent, GateHook};
///
/// struct Printer;
///
/// impl GateHook for Printer {
///     fn on_event(&self, event: &GateEvent) {
///         if let GateEvent::GateFailed { gate, message, .. } = event {
///             println!("{} gate rejected request: {}", gate, message);
///         }
///     }
/// }
/// ```
pub trait GateHook: Send + Sync {
    /// Called when an event occurs
    fn on_event(&self, event: &GateEvent);
}

/// Blanket implementation for closures
impl<F> GateHook for F
where
    F: Fn(&GateEvent) + Send + Sync,
{
    fn on_event(&self, event: &GateEvent) {
        self(event)
    }
}

/// Hook that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl GateHook for NoopHook {
    fn on_event(&self, _event: &GateEvent) {}
}

/// Hook forwarding events to the `log` facade.
///
/// Passes and resolutions log at info, failures at error, skips at debug,
/// and a stale context being kept or dropped at warn.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHook;

impl GateHook for LogHook {
    fn on_event(&self, event: &GateEvent) {
        match event {
            GateEvent::ContextResolved {
                app_id,
                context_type,
            } => {
                log::info!("Resolved {} context for application {}", context_type, app_id);
            }
            GateEvent::ContextVerificationFailed { app_id, error } => {
                log::error!("Signed request for application {} rejected: {}", app_id, error);
            }
            GateEvent::ContextRetained {
                app_id,
                context_type,
            } => match context_type {
                Some(context_type) => log::warn!(
                    "Keeping stale {} context for application {} after failed verification",
                    context_type,
                    app_id
                ),
                None => log::warn!(
                    "No stored context for application {} after failed verification",
                    app_id
                ),
            },
            GateEvent::ContextInvalidated { app_id } => {
                log::warn!("Dropped stored context for application {}", app_id);
            }
            GateEvent::GateSkipped { gate } => {
                log::debug!("{} gate not required", gate);
            }
            GateEvent::GatePassed { gate, detail } => {
                log::info!("{} gate passed: {}", gate, detail);
            }
            GateEvent::GateFailed {
                gate,
                kind,
                message,
            } => {
                log::error!("{} gate failed ({}): {}", gate, kind, message);
            }
            GateEvent::TokenSwitched { user_id } => {
                log::debug!(
                    "Switched outbound token to user {}",
                    user_id.as_deref().unwrap_or("<unknown>")
                );
            }
        }
    }
}
