use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::{task, Async, AsyncSink, Poll, Sink, StartSend};
use log::debug;

use crate::error::{Error, FieldLimitKind, TotalLimitKind};
use crate::file::FileInfo;
use crate::length::BodyStream;
use crate::limits::UploadLimits;

/// Field key/value map handed to the application once the collector
/// resolves. The last value wins for a repeated key.
pub type FieldMap = HashMap<String, String>;

/// Truncation bits the parser reports alongside a field event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldFlags {
    pub name_truncated: bool,
    pub value_truncated: bool,
}

/// One push event from the wire parser.
///
/// A parser modeled as a `Stream` of these wires up with
/// `events.forward(sink)`; closing the sink counts as `Finished`.
pub enum ParserEvent {
    Field {
        name: String,
        value: String,
        flags: FieldFlags,
    },
    File {
        field: String,
        info: FileInfo,
        body: BodyStream,
    },
    PartsLimit,
    FilesLimit,
    FieldsLimit,
    ParseError(String),
    Finished,
}

impl ParserEvent {
    pub fn field<N: Into<String>, V: Into<String>>(name: N, value: V) -> ParserEvent {
        ParserEvent::Field {
            name: name.into(),
            value: value.into(),
            flags: FieldFlags::default(),
        }
    }

    pub fn file<F: Into<String>>(field: F, info: FileInfo, body: BodyStream) -> ParserEvent {
        ParserEvent::File {
            field: field.into(),
            info,
            body,
        }
    }
}

/// A file event sitting in the rendezvous slot.
pub(crate) struct FileEvent {
    pub(crate) field: String,
    pub(crate) info: FileInfo,
    pub(crate) body: BodyStream,
}

/// The at-most-one terminal signal for the request.
pub(crate) enum Terminal {
    Finished,
    Failed(Error),
}

/// Per-request state shared by the sink, the field collector and the file
/// sequence. Everything in here is touched under one mutex, which is what
/// lets a parser thread drive the sink while the consumer polls.
pub(crate) struct Inner {
    /// Capacity-1 rendezvous for file events.
    slot: Option<FileEvent>,
    terminal: Option<Terminal>,
    /// Sink no longer accepts events.
    detached: bool,
    /// The cleanup coordinator already ran.
    released: bool,
    fields: FieldMap,
    resolved: Option<Result<FieldMap, Error>>,
    fields_task: Option<task::Task>,
    files_task: Option<task::Task>,
    sink_task: Option<task::Task>,
}

impl Inner {
    fn notify_all(&mut self) {
        for task in self
            .fields_task
            .take()
            .into_iter()
            .chain(self.files_task.take())
            .chain(self.sink_task.take())
        {
            task.notify();
        }
    }

    fn resolve_fields(&mut self, result: Result<FieldMap, Error>) {
        if self.resolved.is_none() {
            self.resolved = Some(result);
            if let Some(task) = self.fields_task.take() {
                task.notify();
            }
        }
    }

    pub(crate) fn fields_result(&self) -> Option<Result<FieldMap, Error>> {
        self.resolved.clone()
    }

    pub(crate) fn park_fields(&mut self) {
        self.fields_task = Some(task::current());
    }

    pub(crate) fn park_files(&mut self) {
        self.files_task = Some(task::current());
    }

    pub(crate) fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    fn push_field(&mut self, name: String, value: String) {
        if self.resolved.is_none() {
            self.fields.insert(name, value);
        }
    }

    fn accept_file(&mut self, event: FileEvent) {
        // The first file settles the field map; file processing must not
        // wait on trailing fields.
        let snapshot = self.fields.clone();
        self.resolve_fields(Ok(snapshot));

        self.slot = Some(event);
        if let Some(task) = self.files_task.take() {
            task.notify();
        }
    }

    /// Hands the buffered file event to the sequence and unparks a writer
    /// waiting for the slot.
    pub(crate) fn take_file(&mut self) -> Option<FileEvent> {
        let event = self.slot.take();
        if event.is_some() {
            if let Some(task) = self.sink_task.take() {
                task.notify();
            }
        }
        event
    }

    /// Records a failure. The first terminal signal wins; a later one is a
    /// no-op apart from the release below.
    pub(crate) fn fail(&mut self, error: Error) {
        if self.terminal.is_none() {
            debug!("upload failed: {}", error);
            self.resolve_fields(Err(error.clone()));
            self.terminal = Some(Terminal::Failed(error));
            self.release();
        }
    }

    fn finish(&mut self) {
        if self.terminal.is_none() {
            debug!("upstream finished");
            let snapshot = self.fields.clone();
            self.resolve_fields(Ok(snapshot));
            self.terminal = Some(Terminal::Finished);
            // A file buffered before the finish still gets delivered, so
            // the slot stays; only new events are refused.
            self.detached = true;
            self.notify_all();
        }
    }

    /// Consumer-initiated early stop.
    pub(crate) fn cancel(&mut self) {
        if self.resolved.is_none() {
            let snapshot = self.fields.clone();
            self.resolve_fields(Ok(snapshot));
        }
        self.release();
    }

    /// The cleanup coordinator: detaches the upstream connection, drops an
    /// undelivered file event and wakes every parked task so nothing stays
    /// parked on a dead request. Runs at most once.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.detached = true;

        if self.slot.take().is_some() {
            debug!("dropping an undelivered file event");
        }
        self.notify_all();
    }

    fn refusal(&self) -> Error {
        match self.terminal {
            Some(Terminal::Failed(ref e)) => e.clone(),
            _ => Error::Cancelled,
        }
    }
}

/// Shared handle over the per-request state.
#[derive(Clone)]
pub(crate) struct Shared {
    inner: Arc<Mutex<Inner>>,
    pub(crate) limits: Arc<UploadLimits>,
}

impl Shared {
    pub(crate) fn new(limits: Arc<UploadLimits>) -> Shared {
        Shared {
            inner: Arc::new(Mutex::new(Inner {
                slot: None,
                terminal: None,
                detached: false,
                released: false,
                fields: FieldMap::new(),
                resolved: None,
                fields_task: None,
                files_task: None,
                sink_task: None,
            })),
            limits,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<Inner> {
        self.inner.lock().expect("upload state poisoned")
    }
}

/// Push handle the wire parser drives.
///
/// File events go through a capacity-1 rendezvous: when the previous file
/// has not been picked up yet, `start_send` hands the event back and
/// `poll_complete` parks the writer until the consumer drains the slot.
/// Limit and error signals bypass the slot and are always accepted.
pub struct UploadSink {
    shared: Shared,
}

impl UploadSink {
    pub(crate) fn new(shared: Shared) -> UploadSink {
        UploadSink { shared }
    }
}

impl Sink for UploadSink {
    type SinkItem = ParserEvent;
    type SinkError = Error;

    fn start_send(&mut self, event: ParserEvent) -> StartSend<ParserEvent, Error> {
        let mut inner = self.shared.lock();

        if inner.detached {
            return match event {
                ParserEvent::Field { .. } | ParserEvent::File { .. } => Err(inner.refusal()),
                // Late signals are no-ops; the first one won.
                _ => Ok(AsyncSink::Ready),
            };
        }

        match event {
            ParserEvent::Field { name, value, flags } => {
                if flags.name_truncated {
                    let e = Error::field_limit(
                        FieldLimitKind::FieldKeyByteLength,
                        name,
                        self.shared.limits.max_field_key_byte_length,
                    );
                    inner.fail(e);
                } else if flags.value_truncated {
                    let e = Error::field_limit(
                        FieldLimitKind::FieldValueByteLength,
                        name,
                        self.shared.limits.max_field_value_byte_length,
                    );
                    inner.fail(e);
                } else {
                    inner.push_field(name, value);
                }
            }

            ParserEvent::File { field, info, body } => {
                if inner.slot.is_some() {
                    // NotReady obliges us to wake the writer once the slot
                    // drains.
                    inner.sink_task = Some(task::current());
                    return Ok(AsyncSink::NotReady(ParserEvent::File { field, info, body }));
                }
                inner.accept_file(FileEvent { field, info, body });
            }

            ParserEvent::PartsLimit => {
                let e = Error::total(
                    TotalLimitKind::PartCount,
                    self.shared.limits.max_total_part_count,
                );
                inner.fail(e);
            }

            ParserEvent::FilesLimit => {
                let e = Error::total(
                    TotalLimitKind::FileCount,
                    self.shared.limits.max_total_file_count,
                );
                inner.fail(e);
            }

            ParserEvent::FieldsLimit => {
                let e = Error::total(
                    TotalLimitKind::FieldCount,
                    self.shared.limits.max_total_field_count,
                );
                inner.fail(e);
            }

            ParserEvent::ParseError(message) => {
                inner.fail(Error::upstream(message));
            }

            ParserEvent::Finished => inner.finish(),
        }

        Ok(AsyncSink::Ready)
    }

    fn poll_complete(&mut self) -> Poll<(), Error> {
        let mut inner = self.shared.lock();

        if inner.released {
            return Err(inner.refusal());
        }

        if inner.slot.is_none() || inner.detached {
            Ok(Async::Ready(()))
        } else {
            inner.sink_task = Some(task::current());
            Ok(Async::NotReady)
        }
    }

    fn close(&mut self) -> Poll<(), Error> {
        let mut inner = self.shared.lock();
        inner.finish();
        Ok(Async::Ready(()))
    }
}

impl Drop for UploadSink {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if inner.terminal().is_none() {
            // A parser that vanishes without a terminal signal would leave
            // the consumer parked forever.
            inner.fail(Error::upstream("parser went away before finishing"));
        }
    }
}
