use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::{task, Async, Future, Poll, Stream};
use log::{debug, trace};

use crate::error::{Error, FieldLimitKind};
use crate::limits::{ByteLengthPolicy, FileFieldLimits};

/// Chunked body of one uploaded file, as handed over by the wire parser.
/// Pulling from it drives the parser's buffer for the active file.
pub type BodyStream = Box<dyn Stream<Item = Bytes, Error = Error> + Send>;

/// How one file's byte counting ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteLengthInfo {
    /// Bytes forwarded to the consumer.
    pub bytes_written: u64,
    /// Whether the byte length cap cut the stream short.
    pub truncated: bool,
}

struct OutcomeCell {
    value: Option<Result<ByteLengthInfo, Error>>,
    task: Option<task::Task>,
}

/// Future for a file's [`ByteLengthInfo`]. Resolves when the file's stream
/// reaches end of input; the value is kept, so attaching late never misses
/// it.
#[derive(Clone)]
pub struct ByteLength {
    cell: Arc<Mutex<OutcomeCell>>,
}

impl Future for ByteLength {
    type Item = ByteLengthInfo;
    type Error = Error;

    fn poll(&mut self) -> Poll<ByteLengthInfo, Error> {
        let mut cell = self.cell.lock().expect("byte length cell poisoned");

        match cell.value {
            Some(Ok(info)) => Ok(Async::Ready(info)),
            Some(Err(ref e)) => Err(e.clone()),
            None => {
                cell.task = Some(task::current());
                Ok(Async::NotReady)
            }
        }
    }
}

/// Counting, truncating pass-through over one file's body.
///
/// Chunks are forwarded unchanged while they fit under the cap. The chunk
/// that first overruns it is cut exactly at the cap boundary; everything
/// after that is pulled from the source and discarded, so the parser never
/// stalls behind an unread remainder. At most one chunk is in flight.
pub struct TruncateStream {
    inner: BodyStream,
    field: String,
    cap: u64,
    policy: ByteLengthPolicy,
    written: u64,
    truncated: bool,
    done: bool,
    cell: Arc<Mutex<OutcomeCell>>,
}

impl TruncateStream {
    pub(crate) fn new(
        field: String,
        limits: &FileFieldLimits,
        inner: BodyStream,
    ) -> (TruncateStream, ByteLength) {
        let cell = Arc::new(Mutex::new(OutcomeCell {
            value: None,
            task: None,
        }));

        let stream = TruncateStream {
            inner,
            field,
            cap: limits.max_file_byte_length,
            policy: limits.on_byte_length_limit,
            written: 0,
            truncated: false,
            done: false,
            cell: cell.clone(),
        };

        (stream, ByteLength { cell })
    }

    fn fulfill(&mut self, value: Result<ByteLengthInfo, Error>) {
        self.done = true;

        let mut cell = self.cell.lock().expect("byte length cell poisoned");
        if cell.value.is_none() {
            cell.value = Some(value);
        }
        if let Some(task) = cell.task.take() {
            task.notify();
        }
    }
}

impl Stream for TruncateStream {
    type Item = Bytes;
    type Error = Error;

    fn poll(&mut self) -> Poll<Option<Bytes>, Error> {
        if self.done {
            return Ok(Async::Ready(None));
        }

        loop {
            match self.inner.poll() {
                Ok(Async::NotReady) => return Ok(Async::NotReady),

                Ok(Async::Ready(None)) => {
                    self.fulfill(Ok(ByteLengthInfo {
                        bytes_written: self.written,
                        truncated: self.truncated,
                    }));
                    return Ok(Async::Ready(None));
                }

                Ok(Async::Ready(Some(chunk))) => {
                    if self.truncated {
                        // Cap already hit; swallow the remainder.
                        trace!(
                            "discarding {} bytes past the cap on field {:?}",
                            chunk.len(),
                            self.field
                        );
                        continue;
                    }

                    let len = chunk.len() as u64;
                    if self.written + len <= self.cap {
                        self.written += len;
                        return Ok(Async::Ready(Some(chunk)));
                    }

                    let fits = (self.cap - self.written) as usize;
                    self.truncated = true;
                    self.written = self.cap;
                    debug!(
                        "field {:?} hit its byte length cap of {}",
                        self.field, self.cap
                    );

                    match self.policy {
                        ByteLengthPolicy::Truncate => {
                            if fits == 0 {
                                continue;
                            }
                            return Ok(Async::Ready(Some(chunk.slice_to(fits))));
                        }
                        ByteLengthPolicy::Abort => {
                            let err = Error::field_limit(
                                FieldLimitKind::FileByteLength,
                                self.field.clone(),
                                self.cap,
                            );
                            self.fulfill(Err(err.clone()));
                            return Err(err);
                        }
                    }
                }

                Err(e) => {
                    self.fulfill(Err(e.clone()));
                    return Err(e);
                }
            }
        }
    }
}
