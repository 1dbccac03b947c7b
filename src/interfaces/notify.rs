use crate::domain::ports::{NotificationKind, NotificationSink};
use tracing::{error, info, warn};

/// Notification sink that emits each message as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, kind: NotificationKind, message: &str) {
        match kind {
            NotificationKind::Info | NotificationKind::Success => {
                info!(target: "paysync::notify", ?kind, "{message}")
            }
            NotificationKind::Warning => warn!(target: "paysync::notify", "{message}"),
            NotificationKind::Error => error!(target: "paysync::notify", "{message}"),
        }
    }
}
