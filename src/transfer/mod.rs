//! Transfer backends
//!
//! A [`TransferBackend`] moves bytes for one source onto disk, naming every
//! file it writes with the request's id as prefix and reporting progress
//! through a [`ProgressSink`]. The pipeline decides what happens afterwards.

mod images;
mod traits;
mod ytdlp;

pub use images::ImageFetcher;
pub use traits::{
    ProgressSink, TransferBackend, TransferCapabilities, TransferOutcome, TransferRequest,
};
pub use ytdlp::{YtDlpBackend, format_selector, locate_ytdlp};
