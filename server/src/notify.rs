//! Operator notifications.

use log::info;

/// Fire-and-forget channel to online operators.
pub trait OperatorNotifier: Send + Sync {
    fn notify_ops(&self, message: &str);
}

/// Notifier that only writes to the server log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl OperatorNotifier for LogNotifier {
    fn notify_ops(&self, message: &str) {
        info!("(to ops) {}", message);
    }
}
