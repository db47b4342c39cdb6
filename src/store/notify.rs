use super::{NotificationEvent, Notifier};

/// Notifier that only writes inbound events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &NotificationEvent) {
        match event {
            NotificationEvent::IncomingSms {
                device_name,
                from,
                content,
                ..
            } => {
                log::info!("📩 [{device_name}] SMS from {from}: {content}");
            }
            NotificationEvent::IncomingCall {
                device_name, from, ..
            } => {
                log::info!("📞 [{device_name}] incoming call from {from}");
            }
        }
    }
}
