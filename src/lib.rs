//! Limit-governed streaming consumer for multipart/form-data uploads.
//!
//! Sits between a push based multipart wire parser and the application:
//! the parser drives an [`UploadSink`] with events, the application awaits
//! the [`Fields`] map and pulls uploaded files off the [`FileSequence`] one
//! at a time, each body capped by [`UploadLimits`] and counted through a
//! truncating stream. Memory stays bounded no matter how large the upload
//! is; nothing survives the request.

mod error;
pub use error::{Error, FieldLimitKind, TotalLimitKind};

mod limits;
pub use limits::{
    ByteLengthPolicy, FieldOverride, FileCountPolicy, FileFieldLimits, UploadLimits, WireLimits,
};

mod counter;

mod length;
pub use length::{BodyStream, ByteLength, ByteLengthInfo, TruncateStream};

mod file;
pub use file::{FileData, FileEntry, FileInfo};

mod source;
pub use source::{FieldFlags, FieldMap, ParserEvent, UploadSink};

mod fields;
pub use fields::Fields;

mod sequence;
pub use sequence::FileSequence;

use std::sync::Arc;

use source::Shared;

/// Wires up one upload request.
///
/// Both returned observers share the sink's state and are attached before
/// the sink is handed to a parser, so no early event can be lost. Hand
/// [`UploadSink`] to the wire parser, await [`Fields`] for the key/value
/// map and iterate [`FileSequence`] for the files.
pub fn upload(limits: UploadLimits) -> (UploadSink, Fields, FileSequence) {
    let limits = Arc::new(limits);
    let shared = Shared::new(limits);

    let sink = UploadSink::new(shared.clone());
    let fields = Fields::new(shared.clone());
    let files = FileSequence::new(shared);

    (sink, fields, files)
}
