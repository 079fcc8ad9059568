use std::sync::OnceLock;

use crossbeam_channel::{Receiver, bounded};

static SHUTDOWN: OnceLock<Receiver<()>> = OnceLock::new();

/// Returns a receiver that gets one message per Ctrl+C press.
///
/// The handler is installed once per process; later calls share the same
/// channel. A run that consumed a cancellation message leaves the channel
/// empty, so the next run (watch mode) starts clean.
pub fn shutdown_receiver() -> Receiver<()> {
    SHUTDOWN
        .get_or_init(|| {
            let (sender, receiver) = bounded(1);

            if let Err(error) = ctrlc::set_handler(move || {
                let _ = sender.try_send(());
            }) {
                tracing::warn!("Failed to install Ctrl+C handler: {error}");
            }

            receiver
        })
        .clone()
}
