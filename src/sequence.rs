use futures::{Async, Poll, Stream};
use log::{debug, trace};

use crate::counter::{Admission, FileCounter};
use crate::error::Error;
use crate::file::{FileData, FileEntry};
use crate::length::{BodyStream, TruncateStream};
use crate::source::{FileEvent, Shared, Terminal};

enum State {
    Open,
    Errored(Error),
    Cancelled,
    Completed,
}

/// Decision taken under the state lock, acted on outside of it.
enum Step {
    Fail(Error),
    File(FileEvent),
    Finish,
    Park,
}

/// The upload's files as one ordered pull sequence.
///
/// Polling it is the `next()` of the push-to-pull adapter: it suspends until
/// a file event, a fatal signal or normal completion. A buffered fatal
/// signal wins over a buffered-but-undelivered file; entries already handed
/// out are immune. Terminal states are sticky: a sequence that failed keeps
/// returning the same error, a completed or cancelled one keeps returning
/// end-of-stream.
///
/// The active entry's stream must be consumed (or the entry dropped) before
/// the parser can hand over the next file; the upstream buffers no more
/// than one file ahead.
pub struct FileSequence {
    shared: Shared,
    counter: FileCounter,
    state: State,
    /// Bodies of skipped files, pulled dry as polls come in.
    drains: Vec<BodyStream>,
}

impl FileSequence {
    pub(crate) fn new(shared: Shared) -> FileSequence {
        let counter = FileCounter::new(shared.limits.clone());

        FileSequence {
            shared,
            counter,
            state: State::Open,
            drains: Vec::new(),
        }
    }

    /// Consumer-initiated early stop: releases the upstream connection and
    /// ends the sequence. Idempotent; dropping an open sequence does the
    /// same.
    pub fn cancel(&mut self) {
        match self.state {
            State::Open => {
                debug!("file sequence cancelled");
                self.state = State::Cancelled;
                self.drains.clear();
                self.shared.lock().cancel();
            }
            _ => {}
        }
    }

    fn poll_drains(&mut self) {
        let mut index = 0;

        while index < self.drains.len() {
            let finished = loop {
                match self.drains[index].poll() {
                    Ok(Async::Ready(Some(chunk))) => {
                        trace!("drained {} bytes of a skipped file", chunk.len());
                    }
                    Ok(Async::NotReady) => break false,
                    Ok(Async::Ready(None)) => break true,
                    Err(e) => {
                        debug!("skipped file failed while draining: {}", e);
                        break true;
                    }
                }
            };

            if finished {
                self.drains.swap_remove(index);
            } else {
                index += 1;
            }
        }
    }

    fn admit(&mut self, event: FileEvent) -> Result<FileEntry, Error> {
        let FileEvent { field, info, body } = event;

        self.counter.on_field_seen(&field)?;

        match self.counter.on_file(&field)? {
            Admission::Skip => {
                self.drains.push(body);
                Ok(FileEntry {
                    field,
                    info,
                    data: FileData::Skipped,
                })
            }
            Admission::Accept(limits) => {
                let (stream, byte_length) = TruncateStream::new(field.clone(), &limits, body);
                Ok(FileEntry {
                    field,
                    info,
                    data: FileData::Processed {
                        stream,
                        byte_length,
                    },
                })
            }
        }
    }
}

impl Stream for FileSequence {
    type Item = FileEntry;
    type Error = Error;

    fn poll(&mut self) -> Poll<Option<FileEntry>, Error> {
        self.poll_drains();

        match self.state {
            State::Errored(ref e) => return Err(e.clone()),
            State::Cancelled | State::Completed => return Ok(Async::Ready(None)),
            State::Open => {}
        }

        let step = {
            let mut inner = self.shared.lock();

            let failed = match inner.terminal() {
                Some(&Terminal::Failed(ref e)) => Some(e.clone()),
                _ => None,
            };
            let finished = match inner.terminal() {
                Some(&Terminal::Finished) => true,
                _ => false,
            };

            if let Some(e) = failed {
                Step::Fail(e)
            } else if let Some(event) = inner.take_file() {
                Step::File(event)
            } else if finished {
                Step::Finish
            } else {
                inner.park_files();
                Step::Park
            }
        };

        match step {
            Step::Fail(e) => {
                self.state = State::Errored(e.clone());
                Err(e)
            }

            Step::Finish => {
                self.state = State::Completed;
                Ok(Async::Ready(None))
            }

            Step::Park => Ok(Async::NotReady),

            Step::File(event) => match self.admit(event) {
                Ok(entry) => Ok(Async::Ready(Some(entry))),
                Err(e) => {
                    // A tracker violation fails the whole sequence and
                    // releases the upstream.
                    self.shared.lock().fail(e.clone());
                    self.state = State::Errored(e.clone());
                    Err(e)
                }
            },
        }
    }
}

impl Drop for FileSequence {
    fn drop(&mut self) {
        self.cancel();
    }
}
