//! Runs a small simulated upload end to end: a stand-in for the wire parser
//! forwards its events into the sink while the consumer walks the file
//! sequence on a single-threaded runtime.
//!
//! RUST_LOG=info cargo run --example simulated_upload

use bytes::Bytes;
use futures::{future, stream, Future, Stream};
use log::{error, info};

use multipart_limits::{
    upload, ByteLengthPolicy, Error, FieldOverride, FileData, FileEntry, FileInfo, ParserEvent,
    UploadLimits,
};

fn main() {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    let mut limits = UploadLimits::default();
    limits.max_total_file_field_count = 2;
    limits.field_overrides.insert(
        "thumbnail".to_string(),
        FieldOverride {
            max_file_byte_length: Some(12),
            on_byte_length_limit: Some(ByteLengthPolicy::Truncate),
            ..FieldOverride::default()
        },
    );

    let (sink, fields, files) = upload(limits);

    // The events a parser would push for a two file upload. The oversized
    // thumbnail gets cut at its 12 byte cap instead of failing.
    let events = stream::iter_ok::<_, Error>(vec![
        ParserEvent::field("album", "summer"),
        ParserEvent::field("visibility", "private"),
        ParserEvent::file(
            "photo",
            FileInfo {
                filename: Some("beach.jpg".to_string()),
                content_type: Some(mime::IMAGE_JPEG),
                encoding: None,
            },
            Box::new(stream::iter_ok(vec![Bytes::from_static(
                b"pretend this is a jpeg",
            )])),
        ),
        ParserEvent::file(
            "thumbnail",
            FileInfo {
                filename: Some("beach_small.jpg".to_string()),
                content_type: Some(mime::IMAGE_JPEG),
                encoding: None,
            },
            Box::new(stream::iter_ok(vec![Bytes::from_static(
                b"this thumbnail is far too large",
            )])),
        ),
        ParserEvent::Finished,
    ]);

    let mut runtime = tokio::runtime::current_thread::Runtime::new().expect("runtime");

    runtime.spawn(
        events
            .forward(sink)
            .map(|_| ())
            .map_err(|e| error!("parser stopped: {}", e)),
    );

    let fields = runtime.block_on(fields).expect("field map");
    info!("fields: {:?}", fields);

    let consume = files.for_each(|entry| -> Box<dyn Future<Item = (), Error = Error>> {
        let FileEntry { field, info, data } = entry;

        match data {
            FileData::Skipped => {
                info!("{}: skipped", field);
                Box::new(future::ok(()))
            }

            FileData::Processed {
                stream,
                byte_length,
            } => Box::new(stream.collect().join(byte_length).map(move |(chunks, outcome)| {
                let bytes: usize = chunks.iter().map(|c| c.len()).sum();
                info!(
                    "{} ({:?}): {} bytes, truncated: {}",
                    field, info.filename, bytes, outcome.truncated
                );
            })),
        }
    });

    runtime.block_on(consume).expect("file iteration");
}
