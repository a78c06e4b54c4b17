use std::fmt;
use std::num::ParseIntError;

/// A 16-byte value which identifies a given trace.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Invalid trace id
    pub const INVALID: TraceId = TraceId(0);

    /// Create a trace id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// Return the representation of this trace id as a byte array.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a trace id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// An 8-byte value which identifies a given span.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid span id
    pub const INVALID: SpanId = SpanId(0);

    /// Create a span id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// Return the representation of this span id as a byte array.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a span id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Tri-state sampling decision carried by a [`SpanContext`].
///
/// `Unset` means the upstream has not decided; the decision is deferred to
/// the next tracer that creates a span in the lineage. Once a context
/// carries `Yes` or `No` the decision never changes downstream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Sampled {
    /// The trace is sampled; spans will be reported on finish.
    Yes,
    /// The trace is not sampled; spans carry identifiers only.
    No,
    /// No decision has been made yet.
    #[default]
    Unset,
}

impl Sampled {
    /// Returns `true` only for an affirmative decision.
    pub fn is_sampled(&self) -> bool {
        matches!(self, Sampled::Yes)
    }

    /// Returns `true` if a decision has been made either way.
    pub fn is_decided(&self) -> bool {
        !matches!(self, Sampled::Unset)
    }

    /// Construct from a decision made by a sampler.
    pub fn from_decision(sampled: bool) -> Self {
        if sampled {
            Sampled::Yes
        } else {
            Sampled::No
        }
    }
}

const MAX_BAGGAGE_ENTRIES: usize = 64;

/// Insertion-ordered string key/value data carried alongside a trace.
///
/// Baggage rides with the trace identifiers but is not part of them.
/// Whether an entry crosses process boundaries is decided by the
/// propagator configuration, not by the baggage itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Baggage {
    entries: Vec<(String, String)>,
}

impl Baggage {
    /// Creates an empty `Baggage`.
    pub fn new() -> Self {
        Baggage::default()
    }

    /// Returns the value for the given key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Inserts a key/value pair, overwriting in place if the key exists.
    ///
    /// Entries beyond the pair cap are dropped rather than erroring, so a
    /// hostile upstream cannot grow baggage without bound.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else if self.entries.len() < MAX_BAGGAGE_ENTRIES {
            self.entries.push((key, value));
        } else {
            tracing::debug!(key = %key, "baggage entry cap reached, dropping entry");
        }
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Baggage {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut baggage = Baggage::new();
        for (k, v) in iter {
            baggage.insert(k, v);
        }
        baggage
    }
}

/// Immutable identifier triple of a span, plus baggage.
///
/// A `SpanContext` is a value: child contexts are new instances sharing the
/// parent's trace id, and a captured context never observes later changes.
/// This is what propagators serialize and what async adapters snapshot at
/// submission time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    parent_id: Option<SpanId>,
    sampled: Sampled,
    is_remote: bool,
    baggage: Baggage,
}

impl SpanContext {
    /// An invalid span context
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        parent_id: None,
        sampled: Sampled::Unset,
        is_remote: false,
        baggage: Baggage {
            entries: Vec::new(),
        },
    };

    /// Create an invalid empty span context
    pub fn empty_context() -> Self {
        SpanContext::NONE
    }

    /// Construct a new `SpanContext`.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        parent_id: Option<SpanId>,
        sampled: Sampled,
        is_remote: bool,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            parent_id,
            sampled,
            is_remote,
            baggage: Baggage::new(),
        }
    }

    /// Returns a copy of this context with the given baggage attached.
    pub fn with_baggage(self, baggage: Baggage) -> Self {
        SpanContext { baggage, ..self }
    }

    /// The trace id of this context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The span id of this context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The parent span id; `None` for a root span.
    pub fn parent_id(&self) -> Option<SpanId> {
        self.parent_id
    }

    /// The sampling decision carried by this context.
    pub fn sampled(&self) -> Sampled {
        self.sampled
    }

    /// Returns `true` if this context was extracted from a remote carrier.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// The baggage carried by this context.
    pub fn baggage(&self) -> &Baggage {
        &self.baggage
    }

    /// Returns `true` if the context has a non-zero trace id and span id.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn trace_id_test_data() -> Vec<(TraceId, &'static str, [u8; 16])> {
        vec![
            (TraceId(0), "00000000000000000000000000000000", [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            (TraceId(42), "0000000000000000000000000000002a", [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 42]),
            (TraceId(126642714606581564793456114182061442190), "5f467fe7bf42676c05e20ba4a90e448e", [95, 70, 127, 231, 191, 66, 103, 108, 5, 226, 11, 164, 169, 14, 68, 142])
        ]
    }

    #[rustfmt::skip]
    fn span_id_test_data() -> Vec<(SpanId, &'static str, [u8; 8])> {
        vec![
            (SpanId(0), "0000000000000000", [0, 0, 0, 0, 0, 0, 0, 0]),
            (SpanId(42), "000000000000002a", [0, 0, 0, 0, 0, 0, 0, 42]),
            (SpanId(5508496025762705295), "4c721bf33e3caf8f", [76, 114, 27, 243, 62, 60, 175, 143])
        ]
    }

    #[test]
    fn test_trace_id() {
        for test_case in trace_id_test_data() {
            assert_eq!(format!("{}", test_case.0), test_case.1);
            assert_eq!(format!("{:032x}", test_case.0), test_case.1);
            assert_eq!(test_case.0.to_bytes(), test_case.2);

            assert_eq!(test_case.0, TraceId::from_hex(test_case.1).unwrap());
            assert_eq!(test_case.0, TraceId::from_bytes(test_case.2));
        }
    }

    #[test]
    fn test_span_id() {
        for test_case in span_id_test_data() {
            assert_eq!(format!("{}", test_case.0), test_case.1);
            assert_eq!(format!("{:016x}", test_case.0), test_case.1);
            assert_eq!(test_case.0.to_bytes(), test_case.2);

            assert_eq!(test_case.0, SpanId::from_hex(test_case.1).unwrap());
            assert_eq!(test_case.0, SpanId::from_bytes(test_case.2));
        }
    }

    #[test]
    fn baggage_insert_preserves_order_and_overwrites() {
        let mut baggage = Baggage::new();
        baggage.insert("user", "alice");
        baggage.insert("request", "42");
        baggage.insert("user", "bob");

        assert_eq!(baggage.get("user"), Some("bob"));
        let keys: Vec<&str> = baggage.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["user", "request"]);
    }

    #[test]
    fn baggage_caps_entries() {
        let mut baggage = Baggage::new();
        for i in 0..(MAX_BAGGAGE_ENTRIES + 10) {
            baggage.insert(format!("key-{i}"), "v");
        }
        assert_eq!(baggage.len(), MAX_BAGGAGE_ENTRIES);
        // overwriting an existing key still works at the cap
        baggage.insert("key-0", "updated");
        assert_eq!(baggage.get("key-0"), Some("updated"));
    }

    #[test]
    fn context_validity() {
        assert!(!SpanContext::empty_context().is_valid());
        assert!(!SpanContext::new(
            TraceId::INVALID,
            SpanId::from(1),
            None,
            Sampled::Yes,
            false
        )
        .is_valid());
        assert!(SpanContext::new(
            TraceId::from(1),
            SpanId::from(2),
            None,
            Sampled::Unset,
            false
        )
        .is_valid());
    }
}
