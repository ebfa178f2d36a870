//! Cross-cutting helpers.

mod cancel;
mod signal;

pub use cancel::CancellationToken;
pub use signal::install_ctrlc;
