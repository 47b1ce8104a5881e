use std::collections::HashMap;

/// What to do when a file overruns its byte length cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteLengthPolicy {
    /// Fail the file's stream with a limit error.
    Abort,
    /// Cut the stream at the cap and record the truncation in the outcome.
    Truncate,
}

/// What to do when a field receives more files than its count cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCountPolicy {
    /// Fail the whole sequence with a limit error.
    Abort,
    /// Yield a skipped entry and drain the file's bytes off the wire.
    Skip,
}

/// Per-request upload limits.
///
/// The request-wide count caps are enforced by the wire parser (see
/// [`UploadLimits::wire_limits`]) and reported back as signals; the file
/// field caps and policies are enforced on this side. Never mutated after
/// the request is wired up.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_total_header_pairs: u64,
    pub max_total_part_count: u64,
    pub max_total_field_count: u64,
    pub max_total_file_count: u64,
    pub max_total_file_field_count: u64,
    pub max_field_key_byte_length: u64,
    pub max_field_value_byte_length: u64,
    pub max_file_byte_length: u64,
    pub max_file_count_per_field: u64,
    pub on_byte_length_limit: ByteLengthPolicy,
    pub on_file_count_limit: FileCountPolicy,
    /// Per-field overrides of the file caps, keyed by field name.
    pub field_overrides: HashMap<String, FieldOverride>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadLimits {
            max_total_header_pairs: 2000,
            max_total_part_count: 110,
            max_total_field_count: 100,
            max_total_file_count: 10,
            max_total_file_field_count: 1,
            max_field_key_byte_length: 100,
            max_field_value_byte_length: 1024 * 1024,
            max_file_byte_length: 50 * 1024 * 1024,
            max_file_count_per_field: 1,
            on_byte_length_limit: ByteLengthPolicy::Abort,
            on_file_count_limit: FileCountPolicy::Abort,
            field_overrides: HashMap::new(),
        }
    }
}

/// Partial per-field override. Set knobs win over the base limits, knob by
/// knob; unset ones fall through.
#[derive(Debug, Clone, Default)]
pub struct FieldOverride {
    pub max_file_byte_length: Option<u64>,
    pub max_file_count_per_field: Option<u64>,
    pub on_byte_length_limit: Option<ByteLengthPolicy>,
    pub on_file_count_limit: Option<FileCountPolicy>,
}

/// Frozen merge of the base limits with one field's override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFieldLimits {
    pub max_file_byte_length: u64,
    pub max_file_count_per_field: u64,
    pub on_byte_length_limit: ByteLengthPolicy,
    pub on_file_count_limit: FileCountPolicy,
}

/// Caps the wire parser is expected to enforce itself. Whatever it catches
/// comes back to us as a limit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireLimits {
    pub header_pairs: u64,
    pub parts: u64,
    pub files: u64,
    pub fields: u64,
    pub field_key_bytes: u64,
    pub field_value_bytes: u64,
}

impl UploadLimits {
    /// Merges the base limits with the override for `field`.
    ///
    /// Pure; the caller caches the result on first encounter of a field, so
    /// each field is merged at most once per request.
    pub fn resolve(&self, field: &str) -> FileFieldLimits {
        let over = self.field_overrides.get(field);

        FileFieldLimits {
            max_file_byte_length: over
                .and_then(|o| o.max_file_byte_length)
                .unwrap_or(self.max_file_byte_length),
            max_file_count_per_field: over
                .and_then(|o| o.max_file_count_per_field)
                .unwrap_or(self.max_file_count_per_field),
            on_byte_length_limit: over
                .and_then(|o| o.on_byte_length_limit)
                .unwrap_or(self.on_byte_length_limit),
            on_file_count_limit: over
                .and_then(|o| o.on_file_count_limit)
                .unwrap_or(self.on_file_count_limit),
        }
    }

    /// The caps to hand to the wire parser for the concerns it owns.
    pub fn wire_limits(&self) -> WireLimits {
        WireLimits {
            header_pairs: self.max_total_header_pairs,
            // The parser's part cap is exclusive, ours is inclusive.
            parts: self.max_total_part_count + 1,
            files: self.max_total_file_count,
            fields: self.max_total_field_count,
            field_key_bytes: self.max_field_key_byte_length,
            field_value_bytes: self.max_field_value_byte_length,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn resolve_without_override_uses_base_values() {
        let limits = UploadLimits::default();
        let resolved = limits.resolve("avatar");

        assert_eq!(resolved.max_file_byte_length, limits.max_file_byte_length);
        assert_eq!(
            resolved.max_file_count_per_field,
            limits.max_file_count_per_field
        );
        assert_eq!(resolved.on_byte_length_limit, ByteLengthPolicy::Abort);
        assert_eq!(resolved.on_file_count_limit, FileCountPolicy::Abort);
    }

    #[test]
    fn resolve_merges_knob_by_knob() {
        let mut limits = UploadLimits::default();
        limits.field_overrides.insert(
            "gallery".to_string(),
            FieldOverride {
                max_file_count_per_field: Some(4),
                on_file_count_limit: Some(FileCountPolicy::Skip),
                ..FieldOverride::default()
            },
        );

        let resolved = limits.resolve("gallery");

        // Overridden knobs win,
        assert_eq!(resolved.max_file_count_per_field, 4);
        assert_eq!(resolved.on_file_count_limit, FileCountPolicy::Skip);
        // the untouched ones fall through.
        assert_eq!(resolved.max_file_byte_length, limits.max_file_byte_length);
        assert_eq!(resolved.on_byte_length_limit, ByteLengthPolicy::Abort);

        // Other fields are unaffected by the override.
        let other = limits.resolve("avatar");
        assert_eq!(other.max_file_count_per_field, 1);
    }

    #[test]
    fn wire_limits_part_cap_is_made_inclusive() {
        let limits = UploadLimits::default();
        let wire = limits.wire_limits();

        assert_eq!(wire.parts, limits.max_total_part_count + 1);
        assert_eq!(wire.header_pairs, 2000);
        assert_eq!(wire.files, 10);
        assert_eq!(wire.fields, 100);
    }
}
