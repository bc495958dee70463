//! Event persistence
//!
//! Events are stored one JSON document per file under
//! `<root>/<stream_id>/<event_id>.json`. Zero-padded sequences make the
//! directory listing the ordering source for a stream.

mod local;

pub use local::{EventPersistenceManager, StreamTail};
