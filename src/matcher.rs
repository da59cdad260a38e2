use std::fmt;

use crate::inference::Descriptor;

pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;
pub const UNKNOWN_LABEL: &str = "unknown";

/// Reference descriptors for one identity. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDescriptorSet {
    label: String,
    descriptors: Vec<Descriptor>,
}

impl LabeledDescriptorSet {
    /// `None` when there are no descriptors.
    pub fn new(label: impl Into<String>, descriptors: Vec<Descriptor>) -> Option<Self> {
        if descriptors.is_empty() {
            return None;
        }
        Some(Self {
            label: label.into(),
            descriptors,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    fn mean_distance(&self, descriptor: &[f32]) -> f32 {
        let total: f32 = self
            .descriptors
            .iter()
            .map(|d| euclidean_distance(d, descriptor))
            .sum();
        total / self.descriptors.len() as f32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Known { label: String, distance: f32 },
    /// Best distance is `None` when there is nothing to compare against.
    Unknown { distance: Option<f32> },
}

impl MatchOutcome {
    pub fn label(&self) -> &str {
        match self {
            MatchOutcome::Known { label, .. } => label,
            MatchOutcome::Unknown { .. } => UNKNOWN_LABEL,
        }
    }

    pub fn distance(&self) -> Option<f32> {
        match self {
            MatchOutcome::Known { distance, .. } => Some(*distance),
            MatchOutcome::Unknown { distance } => *distance,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, MatchOutcome::Known { .. })
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.distance() {
            Some(d) => write!(f, "{} ({:.2})", self.label(), d),
            None => f.write_str(self.label()),
        }
    }
}

/// Nearest-identity lookup over a fixed roster.
#[derive(Debug, Clone)]
pub struct Matcher {
    sets: Vec<LabeledDescriptorSet>,
    threshold: f32,
}

impl Matcher {
    pub fn new(sets: Vec<LabeledDescriptorSet>, threshold: f32) -> Self {
        Self { sets, threshold }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), DEFAULT_DISTANCE_THRESHOLD)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().map(|s| s.label())
    }

    /// Identity with the smallest mean distance, if it is within the threshold.
    pub fn query(&self, descriptor: &[f32]) -> MatchOutcome {
        let best = self
            .sets
            .iter()
            .map(|set| (set, set.mean_distance(descriptor)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((set, distance)) if distance <= self.threshold => MatchOutcome::Known {
                label: set.label().to_string(),
                distance,
            },
            Some((_, distance)) => MatchOutcome::Unknown {
                distance: distance.is_finite().then_some(distance),
            },
            None => MatchOutcome::Unknown { distance: None },
        }
    }
}

/// Euclidean distance; descriptors of different lengths are infinitely apart.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(i: usize, len: usize) -> Descriptor {
        let mut v = vec![0.0; len];
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_self_query_is_zero_distance() {
        let d = vec![0.1, 0.2, 0.3, 0.4];
        let matcher = Matcher::new(
            vec![LabeledDescriptorSet::new("alice", vec![d.clone()]).unwrap()],
            DEFAULT_DISTANCE_THRESHOLD,
        );
        assert_eq!(
            matcher.query(&d),
            MatchOutcome::Known {
                label: "alice".into(),
                distance: 0.0
            }
        );
    }

    #[test]
    fn test_beyond_threshold_is_unknown() {
        let d = vec![0.0; 4];
        let mut far = d.clone();
        far[0] = 0.8;
        let matcher = Matcher::new(
            vec![LabeledDescriptorSet::new("alice", vec![d]).unwrap()],
            DEFAULT_DISTANCE_THRESHOLD,
        );
        let outcome = matcher.query(&far);
        assert!(!outcome.is_known());
        assert_eq!(outcome.label(), UNKNOWN_LABEL);
        assert!((outcome.distance().unwrap() - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_empty_matcher_always_unknown() {
        let matcher = Matcher::empty();
        assert_eq!(
            matcher.query(&[0.5, 0.5]),
            MatchOutcome::Unknown { distance: None }
        );
    }

    #[test]
    fn test_mean_distance_picks_closest_identity() {
        let alice = LabeledDescriptorSet::new("alice", vec![unit(0, 3), unit(1, 3)]).unwrap();
        let bob = LabeledDescriptorSet::new("bob", vec![unit(2, 3)]).unwrap();
        let matcher = Matcher::new(vec![alice, bob], 2.0);
        assert_eq!(matcher.query(&unit(2, 3)).label(), "bob");
        // equidistant from alice's two references
        let query = vec![0.5, 0.5, 0.0];
        assert_eq!(matcher.query(&query).label(), "alice");
    }

    #[test]
    fn test_empty_set_is_rejected() {
        assert!(LabeledDescriptorSet::new("ghost", vec![]).is_none());
    }

    #[test]
    fn test_dimension_mismatch_never_matches() {
        let matcher = Matcher::new(
            vec![LabeledDescriptorSet::new("alice", vec![vec![0.0; 4]]).unwrap()],
            DEFAULT_DISTANCE_THRESHOLD,
        );
        assert_eq!(
            matcher.query(&[0.0; 3]),
            MatchOutcome::Unknown { distance: None }
        );
    }

    #[test]
    fn test_display() {
        let known = MatchOutcome::Known {
            label: "alice".into(),
            distance: 0.314,
        };
        assert_eq!(known.to_string(), "alice (0.31)");
    }
}
