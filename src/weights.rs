//! Component weighting for training progress.
//!
//! Priority is fixed: video > quiz > sub-units. Only presence matters here,
//! never how many sub-units or questions there are.

use serde::Serialize;

/// Which components a training currently has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentPresence {
    pub video: bool,
    pub quiz: bool,
    pub sub_units: bool,
}

/// Normalized weights; always sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weights {
    pub video: f64,
    pub quiz: f64,
    pub sub_units: f64,
}

impl Weights {
    const fn new(video: f64, quiz: f64, sub_units: f64) -> Self {
        Self { video, quiz, sub_units }
    }

    pub fn total(&self) -> f64 {
        self.video + self.quiz + self.sub_units
    }
}

/// Returns `None` when the training has no components at all; callers treat
/// that as 0% and never completed.
pub fn weights_for(presence: ComponentPresence) -> Option<Weights> {
    let w = match (presence.video, presence.quiz, presence.sub_units) {
        (true, true, true) => Weights::new(0.5, 0.3, 0.2),
        (true, true, false) => Weights::new(0.5, 0.5, 0.0),
        (true, false, true) => Weights::new(0.6, 0.0, 0.4),
        (false, true, true) => Weights::new(0.0, 0.6, 0.4),
        (true, false, false) => Weights::new(1.0, 0.0, 0.0),
        (false, true, false) => Weights::new(0.0, 1.0, 0.0),
        (false, false, true) => Weights::new(0.0, 0.0, 1.0),
        (false, false, false) => return None,
    };
    Some(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(video: bool, quiz: bool, sub_units: bool) -> ComponentPresence {
        ComponentPresence { video, quiz, sub_units }
    }

    #[test]
    fn every_non_empty_shape_sums_to_one() {
        for bits in 1u8..8 {
            let p = presence(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
            let w = weights_for(p).expect("non-empty shape has weights");
            assert!((w.total() - 1.0).abs() < 1e-9, "{p:?} -> {w:?}");
        }
    }

    #[test]
    fn empty_shape_has_no_weights() {
        assert_eq!(weights_for(presence(false, false, false)), None);
    }

    #[test]
    fn full_shape_uses_fifty_thirty_twenty() {
        assert_eq!(
            weights_for(presence(true, true, true)),
            Some(Weights::new(0.5, 0.3, 0.2))
        );
    }

    #[test]
    fn absent_components_get_zero_weight() {
        let w = weights_for(presence(true, false, true)).unwrap();
        assert_eq!(w, Weights::new(0.6, 0.0, 0.4));

        let w = weights_for(presence(false, true, true)).unwrap();
        assert_eq!(w, Weights::new(0.0, 0.6, 0.4));

        let w = weights_for(presence(true, true, false)).unwrap();
        assert_eq!(w, Weights::new(0.5, 0.5, 0.0));
    }

    #[test]
    fn single_component_takes_everything() {
        assert_eq!(weights_for(presence(true, false, false)).unwrap().video, 1.0);
        assert_eq!(weights_for(presence(false, true, false)).unwrap().quiz, 1.0);
        assert_eq!(weights_for(presence(false, false, true)).unwrap().sub_units, 1.0);
    }
}
