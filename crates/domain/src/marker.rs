use uuid::Uuid;

use registra_core::EventId;

/// Logical name of the external column the marker is stamped onto.
pub const MARKER_ATTRIBUTE: &str = "registra_syncmarker";

const MARKER_PREFIX: &str = "registra/";
const MARKER_VERSION: u32 = 1;

/// Echo marker stamped onto an external record at write-back time.
///
/// The marker references the local event whose write produced the external
/// change, so the sync loop can recognize its own writes when they echo back
/// through the change feed. The encoding is versioned; decoding fails toward
/// "not an echo" so unrecognized markers are reprocessed rather than dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMarker {
    event_id: EventId,
}

impl SyncMarker {
    /// Creates a marker referencing the originating local event.
    #[must_use]
    pub fn new(event_id: EventId) -> Self {
        Self { event_id }
    }

    /// Returns the referenced local event.
    #[must_use]
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Encodes the marker for stamping onto the external record.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{MARKER_PREFIX}{MARKER_VERSION}:{}", self.event_id)
    }

    /// Decodes a marker value read back from the change feed.
    ///
    /// Returns `None` for malformed values and unknown versions.
    #[must_use]
    pub fn decode(value: &str) -> Option<Self> {
        let rest = value.strip_prefix(MARKER_PREFIX)?;
        let (version, raw_id) = rest.split_once(':')?;

        if version.parse::<u32>().ok()? != MARKER_VERSION {
            return None;
        }

        let event_id = Uuid::parse_str(raw_id).ok()?;
        Some(Self {
            event_id: EventId::from_uuid(event_id),
        })
    }
}
