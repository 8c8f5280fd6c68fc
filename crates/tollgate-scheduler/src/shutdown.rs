//! Shutdown signalling shared by workers and watchers.

use tokio::sync::watch;

/// Resolves once `true` is sent. Stays pending forever if the sender is
/// dropped without signalling, so loops selecting on it never spin.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
