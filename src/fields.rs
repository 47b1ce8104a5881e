use futures::{Async, Future, Poll};

use crate::error::Error;
use crate::source::{FieldMap, Shared};

/// Future for the upload's non-file key/value map.
///
/// Resolves exactly once: with a snapshot on the first file event (so file
/// processing never waits on trailing fields), on normal completion when no
/// file arrived, or with the request's first error. Polling it again serves
/// the same result.
pub struct Fields {
    shared: Shared,
}

impl Fields {
    pub(crate) fn new(shared: Shared) -> Fields {
        Fields { shared }
    }
}

impl Future for Fields {
    type Item = FieldMap;
    type Error = Error;

    fn poll(&mut self) -> Poll<FieldMap, Error> {
        let mut inner = self.shared.lock();

        match inner.fields_result() {
            Some(Ok(map)) => Ok(Async::Ready(map)),
            Some(Err(e)) => Err(e),
            None => {
                inner.park_fields();
                Ok(Async::NotReady)
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use std::sync::Arc;

    use bytes::Bytes;
    use futures::{future, stream, Async, Future, Sink};

    use super::*;
    use crate::error::FieldLimitKind;
    use crate::file::FileInfo;
    use crate::length::BodyStream;
    use crate::limits::UploadLimits;
    use crate::source::{FieldFlags, ParserEvent, UploadSink};

    fn wire() -> (UploadSink, Fields) {
        let shared = Shared::new(Arc::new(UploadLimits::default()));
        (UploadSink::new(shared.clone()), Fields::new(shared))
    }

    fn push(sink: &mut UploadSink, event: ParserEvent) {
        match sink.start_send(event) {
            Ok(futures::AsyncSink::Ready) => {}
            _ => panic!("push failed"),
        }
    }

    #[test]
    fn resolves_on_normal_completion() {
        let (mut sink, fields) = wire();

        push(&mut sink, ParserEvent::field("album", "summer"));
        push(&mut sink, ParserEvent::field("visibility", "private"));
        push(&mut sink, ParserEvent::Finished);

        let map = fields.wait().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["album"], "summer");
        assert_eq!(map["visibility"], "private");
    }

    #[test]
    fn last_value_wins_for_a_repeated_key() {
        let (mut sink, fields) = wire();

        push(&mut sink, ParserEvent::field("k", "first"));
        push(&mut sink, ParserEvent::field("k", "second"));
        push(&mut sink, ParserEvent::Finished);

        assert_eq!(fields.wait().unwrap()["k"], "second");
    }

    #[test]
    fn resolves_on_the_first_file_event() {
        let (mut sink, fields) = wire();

        push(&mut sink, ParserEvent::field("album", "summer"));

        let body: BodyStream = Box::new(stream::iter_ok(vec![Bytes::from_static(b"x")]));
        push(
            &mut sink,
            ParserEvent::file("photo", FileInfo::default(), body),
        );

        let map = fields.wait().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["album"], "summer");
    }

    #[test]
    fn rejects_a_truncated_field_value() {
        let (mut sink, fields) = wire();

        let event = ParserEvent::Field {
            name: "essay".to_string(),
            value: "cut short".to_string(),
            flags: FieldFlags {
                name_truncated: false,
                value_truncated: true,
            },
        };
        push(&mut sink, event);

        match fields.wait() {
            Err(Error::FieldLimit { kind, ref field, .. }) => {
                assert_eq!(kind, FieldLimitKind::FieldValueByteLength);
                assert_eq!(field, "essay");
            }
            _ => panic!("expected a field limit error"),
        }
    }

    #[test]
    fn serves_the_same_result_on_every_poll() {
        let (mut sink, mut fields) = wire();

        push(&mut sink, ParserEvent::field("k", "v"));
        push(&mut sink, ParserEvent::Finished);

        future::lazy(|| -> Result<(), ()> {
            for _ in 0..2 {
                match fields.poll() {
                    Ok(Async::Ready(ref map)) => assert_eq!(map["k"], "v"),
                    _ => panic!("expected the map to be ready"),
                }
            }
            Ok(())
        })
        .wait()
        .unwrap();
    }

    #[test]
    fn pending_until_a_trigger_arrives() {
        let (mut sink, mut fields) = wire();

        push(&mut sink, ParserEvent::field("k", "v"));

        future::lazy(|| -> Result<(), ()> {
            match fields.poll() {
                Ok(Async::NotReady) => Ok(()),
                _ => panic!("fields must stay pending before a trigger"),
            }
        })
        .wait()
        .unwrap();
    }
}
