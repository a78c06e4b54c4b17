use crate::trace::span_context::Sampled;
use crate::trace::TraceId;
use std::fmt;

/// Decides whether a new root (or decision-less) trace lineage is sampled.
///
/// A sampler is only consulted when no decision exists yet: children of a
/// decided parent inherit the parent's flag and never reach the sampler.
/// A `Yes`/`No` result is fixed into the resulting context for the rest
/// of that lineage; returning [`Sampled::Unset`] defers the decision to
/// the next participant instead.
pub trait ShouldSample: Send + Sync + fmt::Debug {
    /// Returns the sampling decision for a trace id.
    fn should_sample(&self, trace_id: TraceId) -> Sampled;
}

/// Built-in sampling strategies.
///
/// For more elaborate policies implement [`ShouldSample`] directly.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Always sample the trace.
    AlwaysOn,
    /// Never sample the trace.
    AlwaysOff,
    /// Sample a given fraction of traces, keyed off the trace id so every
    /// participant in a trace makes the same decision. Fractions >= 1
    /// always sample, fractions <= 0 never do.
    TraceIdRatio(f64),
}

impl ShouldSample for Sampler {
    fn should_sample(&self, trace_id: TraceId) -> Sampled {
        match self {
            Sampler::AlwaysOn => Sampled::Yes,
            Sampler::AlwaysOff => Sampled::No,
            Sampler::TraceIdRatio(ratio) => {
                Sampled::from_decision(sample_based_on_probability(*ratio, trace_id))
            }
        }
    }
}

fn sample_based_on_probability(prob: f64, trace_id: TraceId) -> bool {
    if prob >= 1.0 {
        return true;
    }
    let prob_upper_bound = (prob.max(0.0) * (1u64 << 63) as f64) as u64;
    // Use the low 64 bits so 64-bit-only upstream trace ids still spread.
    let bytes = trace_id.to_bytes();
    let low: [u8; 8] = bytes[8..].try_into().expect("trace id has 16 bytes");
    let rnd_from_trace_id = u64::from_be_bytes(low) >> 1;

    rnd_from_trace_id < prob_upper_bound
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_samplers() {
        let id = TraceId::from(0xdead_beefu128);
        assert_eq!(Sampler::AlwaysOn.should_sample(id), Sampled::Yes);
        assert_eq!(Sampler::AlwaysOff.should_sample(id), Sampled::No);
    }

    #[test]
    fn ratio_bounds() {
        let id = TraceId::from(u128::MAX);
        assert_eq!(Sampler::TraceIdRatio(1.0).should_sample(id), Sampled::Yes);
        assert_eq!(Sampler::TraceIdRatio(1.5).should_sample(id), Sampled::Yes);
        assert_eq!(Sampler::TraceIdRatio(0.0).should_sample(id), Sampled::No);
        assert_eq!(Sampler::TraceIdRatio(-1.0).should_sample(id), Sampled::No);
    }

    #[test]
    fn ratio_is_deterministic_per_trace_id() {
        let sampler = Sampler::TraceIdRatio(0.5);
        let id = TraceId::from(0x1234_5678_9abc_def0u128);
        let first = sampler.should_sample(id);
        for _ in 0..10 {
            assert_eq!(sampler.should_sample(id), first);
        }
    }

    #[test]
    fn ratio_roughly_matches_probability() {
        let sampler = Sampler::TraceIdRatio(0.25);
        let sampled = (0u64..4000)
            .filter(|i| {
                // spread ids across the u64 space
                let id = (*i as u128).wrapping_mul(0x9e37_79b9_7f4a_7c15) << 1;
                sampler.should_sample(TraceId::from(id)).is_sampled()
            })
            .count();
        let ratio = sampled as f64 / 4000.0;
        assert!((0.15..0.35).contains(&ratio), "observed ratio {ratio}");
    }
}
