//! # B3 Propagator
//!
//! The `B3Propagator` facilitates `SpanContext` propagation using
//! B3 headers. This propagator supports both versions of B3 headers,
//!  1. Single Header:
//!    b3: {trace_id}-{span_id}-{sampling_state}-{parent_span_id}
//!  2. Multiple Headers:
//!    X-B3-TraceId: {trace_id}
//!    X-B3-ParentSpanId: {parent_span_id}
//!    X-B3-SpanId: {span_id}
//!    X-B3-Sampled: {sampling_state}
//!    X-B3-Flags: {debug_flag}
//!
//! If `single_header` is set to `true` then the `b3` header is used to
//! inject and extract. Otherwise, separate headers are used.
//!
//! An undecided sampling state is a first-class value: it is injected as
//! *no* sampled header and extracted back as undecided, so a deferred
//! decision survives process hops. Extraction never fails outward; a
//! carrier that cannot be parsed leaves the supplied context unchanged.

use crate::context::Context;
use crate::propagation::{Extractor, FieldIter, Injector, TextMapPropagator};
use crate::trace::{Baggage, Sampled, SpanContext, SpanId, TraceId};

static B3_SINGLE_HEADER: &str = "b3";
static B3_DEBUG_FLAG_HEADER: &str = "X-B3-Flags";
static B3_TRACE_ID_HEADER: &str = "X-B3-TraceId";
static B3_SPAN_ID_HEADER: &str = "X-B3-SpanId";
static B3_SAMPLED_HEADER: &str = "X-B3-Sampled";
static B3_PARENT_SPAN_ID_HEADER: &str = "X-B3-ParentSpanId";

static BAGGAGE_PREFIX: &str = "baggage-";

// `from_str_radix` tolerates a leading sign, which is not valid B3.
fn is_hex(value: &str) -> bool {
    value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Extracts and injects `SpanContext`s into carriers using B3 header format.
#[derive(Clone, Debug)]
pub struct B3Propagator {
    single_header: bool,
    baggage_fields: Vec<String>,
    fields: Vec<String>,
}

impl Default for B3Propagator {
    fn default() -> Self {
        B3Propagator::new(false)
    }
}

impl B3Propagator {
    /// Create a new `B3Propagator`.
    pub fn new(single_header: bool) -> Self {
        let mut propagator = B3Propagator {
            single_header,
            baggage_fields: Vec::new(),
            fields: Vec::new(),
        };
        propagator.rebuild_fields();
        propagator
    }

    /// Also propagate the named baggage entry as a `baggage-{name}` header.
    ///
    /// Only configured names cross the wire; unknown `baggage-` headers on
    /// the extract side are ignored.
    pub fn with_remote_field(mut self, name: impl Into<String>) -> Self {
        self.baggage_fields.push(name.into());
        self.rebuild_fields();
        self
    }

    fn rebuild_fields(&mut self) {
        let mut fields = if self.single_header {
            vec![B3_SINGLE_HEADER.to_string()]
        } else {
            vec![
                B3_TRACE_ID_HEADER.to_string(),
                B3_SPAN_ID_HEADER.to_string(),
                B3_PARENT_SPAN_ID_HEADER.to_string(),
                B3_SAMPLED_HEADER.to_string(),
                B3_DEBUG_FLAG_HEADER.to_string(),
            ]
        };
        fields.extend(
            self.baggage_fields
                .iter()
                .map(|name| format!("{BAGGAGE_PREFIX}{name}")),
        );
        self.fields = fields;
    }

    /// Extract trace id from hex encoded &str value.
    ///
    /// B3 allows 64-bit (16 hex chars) and 128-bit (32 hex chars) trace
    /// ids; short ids are zero-extended on the left.
    fn extract_trace_id(&self, trace_id: &str) -> Result<TraceId, ()> {
        if (trace_id.len() != 16 && trace_id.len() != 32) || !is_hex(trace_id) {
            return Err(());
        }
        TraceId::from_hex(trace_id).map_err(|_| ())
    }

    /// Extract span id from hex encoded &str value.
    fn extract_span_id(&self, span_id: &str) -> Result<SpanId, ()> {
        if span_id.len() != 16 || !is_hex(span_id) {
            return Err(());
        }
        SpanId::from_hex(span_id).map_err(|_| ())
    }

    /// Extract sampled state from encoded &str value.
    fn extract_sampled_state(&self, sampled: Option<&str>) -> Result<Sampled, ()> {
        match sampled {
            None | Some("") => Ok(Sampled::Unset),
            Some("0") => Ok(Sampled::No),
            Some("1") => Ok(Sampled::Yes),
            Some("false") if !self.single_header => Ok(Sampled::No),
            Some("true") if !self.single_header => Ok(Sampled::Yes),
            // debug requests are always kept
            Some("d") if self.single_header => Ok(Sampled::Yes),
            _ => Err(()),
        }
    }

    fn extract_debug_flag(&self, debug: Option<&str>) -> Result<bool, ()> {
        match debug {
            None | Some("") | Some("0") => Ok(false),
            Some("1") => Ok(true),
            _ => Err(()),
        }
    }

    /// Extract a `SpanContext` from a single B3 header.
    fn extract_single_header(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let header_value = extractor.get(B3_SINGLE_HEADER).unwrap_or("");
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        if parts.len() > 4 || parts.len() < 2 {
            return Err(());
        }

        let trace_id = self.extract_trace_id(parts[0])?;
        let span_id = self.extract_span_id(parts[1])?;
        let sampled = if parts.len() > 2 {
            self.extract_sampled_state(Some(parts[2]))?
        } else {
            Sampled::Unset
        };
        let parent_id = if parts.len() == 4 {
            Some(self.extract_span_id(parts[3])?)
        } else {
            None
        };

        let span_context = SpanContext::new(trace_id, span_id, parent_id, sampled, true);
        if span_context.is_valid() {
            Ok(span_context)
        } else {
            Err(())
        }
    }

    /// Extract a `SpanContext` from multiple B3 headers.
    fn extract_multi_header(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let trace_id = self.extract_trace_id(extractor.get(B3_TRACE_ID_HEADER).unwrap_or(""))?;
        let span_id = self.extract_span_id(extractor.get(B3_SPAN_ID_HEADER).unwrap_or(""))?;
        // an empty value is how our own inject clears the field
        let parent_id = match extractor.get(B3_PARENT_SPAN_ID_HEADER) {
            None | Some("") => None,
            Some(parent) => Some(self.extract_span_id(parent)?),
        };
        let mut sampled = self.extract_sampled_state(extractor.get(B3_SAMPLED_HEADER))?;
        if self.extract_debug_flag(extractor.get(B3_DEBUG_FLAG_HEADER))? {
            sampled = Sampled::Yes;
        }

        let span_context = SpanContext::new(trace_id, span_id, parent_id, sampled, true);
        if span_context.is_valid() {
            Ok(span_context)
        } else {
            Err(())
        }
    }

    fn extract_baggage(&self, extractor: &dyn Extractor) -> Baggage {
        self.baggage_fields
            .iter()
            .filter_map(|name| {
                extractor
                    .get(&format!("{BAGGAGE_PREFIX}{name}"))
                    .map(|value| (name.clone(), value.to_string()))
            })
            .collect()
    }

    fn inject_baggage(&self, baggage: &Baggage, injector: &mut dyn Injector) {
        for name in &self.baggage_fields {
            if let Some(value) = baggage.get(name) {
                injector.set(&format!("{BAGGAGE_PREFIX}{name}"), value.to_string());
            }
        }
    }
}

impl TextMapPropagator for B3Propagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span_context = match cx.span_context() {
            Some(sc) if sc.is_valid() => sc,
            _ => return,
        };

        if self.single_header {
            let mut header = format!(
                "{:032x}-{:016x}",
                span_context.trace_id(),
                span_context.span_id()
            );
            // sampled and parent positions exist only once a decision exists
            match span_context.sampled() {
                Sampled::Yes => header.push_str("-1"),
                Sampled::No => header.push_str("-0"),
                Sampled::Unset => {}
            }
            if span_context.sampled().is_decided() {
                if let Some(parent_id) = span_context.parent_id() {
                    header.push_str(&format!("-{parent_id:016x}"));
                }
            }
            injector.set(B3_SINGLE_HEADER, header);
        } else {
            // every owned field is written so a reused carrier holds no
            // stale values from an earlier inject
            injector.set(
                B3_TRACE_ID_HEADER,
                format!("{:032x}", span_context.trace_id()),
            );
            injector.set(B3_SPAN_ID_HEADER, format!("{:016x}", span_context.span_id()));
            let parent = match span_context.parent_id() {
                Some(parent_id) => format!("{parent_id:016x}"),
                None => String::new(),
            };
            injector.set(B3_PARENT_SPAN_ID_HEADER, parent);
            let sampled = match span_context.sampled() {
                Sampled::Yes => "1",
                Sampled::No => "0",
                Sampled::Unset => "",
            };
            injector.set(B3_SAMPLED_HEADER, sampled.to_string());
        }

        self.inject_baggage(span_context.baggage(), injector);
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let extracted = if self.single_header {
            self.extract_single_header(extractor)
        } else {
            self.extract_multi_header(extractor)
        };
        match extracted {
            Ok(span_context) => {
                let span_context = span_context.with_baggage(self.extract_baggage(extractor));
                cx.with_remote_parent(span_context)
            }
            // fail open: a bad carrier must not break the receiving side
            Err(()) => cx.clone(),
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&self.fields)
    }
}
