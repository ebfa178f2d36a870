//! Ctrl-C wiring.

use super::CancellationToken;

/// Cancel `token` on Ctrl-C.
pub fn install_ctrlc(token: CancellationToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        token.cancel();
    })
}
