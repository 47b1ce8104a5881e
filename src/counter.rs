use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::error::{Error, FieldLimitKind, TotalLimitKind};
use crate::limits::{FileCountPolicy, FileFieldLimits, UploadLimits};

/// Decision for one observed file.
pub(crate) enum Admission {
    Accept(FileFieldLimits),
    Skip,
}

struct FieldState {
    count: u64,
    limits: FileFieldLimits,
}

/// Per-request tracker for file fields: how many distinct fields carried
/// files, and how many files each one received. Counts only ever grow.
pub(crate) struct FileCounter {
    limits: Arc<UploadLimits>,
    fields: HashMap<String, FieldState>,
}

impl FileCounter {
    pub(crate) fn new(limits: Arc<UploadLimits>) -> FileCounter {
        FileCounter {
            limits,
            fields: HashMap::new(),
        }
    }

    /// Registers `field`, resolving and caching its limits on first
    /// encounter. Returns the distinct file-field count. A NEW field that
    /// would push the distinct count past the cap is rejected before any
    /// state mutates.
    pub(crate) fn on_field_seen(&mut self, field: &str) -> Result<usize, Error> {
        if !self.fields.contains_key(field) {
            let cap = self.limits.max_total_file_field_count;
            if self.fields.len() as u64 + 1 > cap {
                return Err(Error::total(TotalLimitKind::FileFieldCount, cap));
            }

            debug!("resolving file limits for field {:?}", field);
            let resolved = self.limits.resolve(field);
            self.fields.insert(
                field.to_string(),
                FieldState {
                    count: 0,
                    limits: resolved,
                },
            );
        }

        Ok(self.fields.len())
    }

    /// Records one file for `field`, which must have been seen.
    pub(crate) fn on_file(&mut self, field: &str) -> Result<Admission, Error> {
        let state = self
            .fields
            .get_mut(field)
            .expect("file field was never registered");

        if state.count + 1 > state.limits.max_file_count_per_field {
            let cap = state.limits.max_file_count_per_field;

            match state.limits.on_file_count_limit {
                FileCountPolicy::Abort => Err(Error::field_limit(
                    FieldLimitKind::FileCountPerField,
                    field,
                    cap,
                )),
                FileCountPolicy::Skip => {
                    debug!("field {:?} is over its file count cap of {}", field, cap);
                    Ok(Admission::Skip)
                }
            }
        } else {
            state.count += 1;
            Ok(Admission::Accept(state.limits))
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::limits::{ByteLengthPolicy, FieldOverride};

    fn counter(limits: UploadLimits) -> FileCounter {
        FileCounter::new(Arc::new(limits))
    }

    #[test]
    fn distinct_field_cap_rejects_the_second_field() {
        let mut c = counter(UploadLimits::default());

        assert_eq!(Ok(1), c.on_field_seen("a"));
        // Re-seeing a known field is not a new distinct field.
        assert_eq!(Ok(1), c.on_field_seen("a"));

        match c.on_field_seen("b") {
            Err(Error::TotalLimit { kind, configured }) => {
                assert_eq!(kind, TotalLimitKind::FileFieldCount);
                assert_eq!(configured, 1);
            }
            other => panic!("expected a total limit error, got {:?}", other),
        }

        // The rejected field left no state behind.
        assert_eq!(Ok(1), c.on_field_seen("a"));
    }

    #[test]
    fn per_field_cap_aborts_by_default() {
        let mut c = counter(UploadLimits::default());
        c.on_field_seen("f").unwrap();

        assert!(match c.on_file("f") {
            Ok(Admission::Accept(_)) => true,
            _ => false,
        });

        match c.on_file("f") {
            Err(Error::FieldLimit {
                kind,
                ref field,
                configured,
            }) => {
                assert_eq!(kind, FieldLimitKind::FileCountPerField);
                assert_eq!(field, "f");
                assert_eq!(configured, 1);
            }
            _ => panic!("expected a field limit error"),
        }
    }

    #[test]
    fn per_field_cap_skip_never_increments() {
        let mut limits = UploadLimits::default();
        limits.on_file_count_limit = FileCountPolicy::Skip;

        let mut c = counter(limits);
        c.on_field_seen("f").unwrap();

        assert!(match c.on_file("f") {
            Ok(Admission::Accept(_)) => true,
            _ => false,
        });

        // Every file past the cap keeps skipping; the count stays put.
        for _ in 0..3 {
            assert!(match c.on_file("f") {
                Ok(Admission::Skip) => true,
                _ => false,
            });
        }
    }

    #[test]
    fn admission_carries_the_resolved_override() {
        let mut limits = UploadLimits::default();
        limits.max_total_file_field_count = 2;
        limits.field_overrides.insert(
            "thumb".to_string(),
            FieldOverride {
                max_file_byte_length: Some(64),
                on_byte_length_limit: Some(ByteLengthPolicy::Truncate),
                ..FieldOverride::default()
            },
        );

        let mut c = counter(limits);
        c.on_field_seen("thumb").unwrap();

        match c.on_file("thumb") {
            Ok(Admission::Accept(resolved)) => {
                assert_eq!(resolved.max_file_byte_length, 64);
                assert_eq!(resolved.on_byte_length_limit, ByteLengthPolicy::Truncate);
            }
            _ => panic!("expected the file to be admitted"),
        }
    }
}
