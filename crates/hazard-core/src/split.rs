//! Reproducible train/test partitioning of the labeled inventories.
//!
//! Every point draws a partition tag in [0, 1); tags below the split fraction
//! go to training, the rest to testing. Events and non-events draw from
//! separate generators so each class keeps roughly the same split ratio and
//! the split of one pool does not depend on the size of the other.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::error::{HazardError, Result};
use crate::points::LabeledPoint;

const EVENT_SALT: u64 = 0x51DE_5A17_0000_0001;
const NON_EVENT_SALT: u64 = 0x51DE_5A17_0000_0002;

/// A labeled point with its partition tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedPoint {
    pub point: LabeledPoint,
    /// Uniform draw in [0, 1).
    pub tag: f64,
}

/// Disjoint training and testing subsets of one class pool.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub train: Vec<LabeledPoint>,
    pub test: Vec<LabeledPoint>,
}

/// The four subsets produced from the event and non-event pools.
#[derive(Debug, Clone)]
pub struct SampleSplit {
    pub events: Partition,
    pub non_events: Partition,
}

impl SampleSplit {
    /// Training points of both classes, events first.
    pub fn training_points(&self) -> Vec<LabeledPoint> {
        self.events.train.iter().chain(&self.non_events.train).copied().collect()
    }
}

fn check_fraction(fraction: f64) -> Result<()> {
    if fraction > 0.0 && fraction < 1.0 {
        Ok(())
    } else {
        Err(HazardError::InvalidConfig(format!("split fraction must be in (0, 1), got {fraction}")))
    }
}

/// Draw one tag per point, in input order.
pub fn tag_points<R: Rng>(points: &[LabeledPoint], rng: &mut R) -> Vec<TaggedPoint> {
    points.iter().map(|&point| TaggedPoint { point, tag: rng.gen::<f64>() }).collect()
}

/// Split one pool: tag < fraction → train, otherwise test.
pub fn partition_pool<R: Rng>(points: &[LabeledPoint], fraction: f64, rng: &mut R) -> Result<Partition> {
    check_fraction(fraction)?;
    let mut part = Partition::default();
    for t in tag_points(points, rng) {
        if t.tag < fraction {
            part.train.push(t.point);
        } else {
            part.test.push(t.point);
        }
    }
    Ok(part)
}

/// Split both inventories with `fraction` of each pool going to training.
///
/// Same seed and same input order give an identical split.
pub fn split_samples(
    events: &[LabeledPoint],
    non_events: &[LabeledPoint],
    fraction: f64,
    seed: u64,
) -> Result<SampleSplit> {
    check_fraction(fraction)?;
    let mut event_rng = StdRng::seed_from_u64(seed ^ EVENT_SALT);
    let mut non_event_rng = StdRng::seed_from_u64(seed ^ NON_EVENT_SALT);

    let split = SampleSplit {
        events: partition_pool(events, fraction, &mut event_rng)?,
        non_events: partition_pool(non_events, fraction, &mut non_event_rng)?,
    };

    info!(
        train_events = split.events.train.len(),
        test_events = split.events.test.len(),
        train_non_events = split.non_events.train.len(),
        test_non_events = split.non_events.test.len(),
        "inventory split"
    );

    if split.events.train.is_empty() || split.non_events.train.is_empty() {
        return Err(HazardError::insufficient(format!(
            "training pool is empty ({} events, {} non-events)",
            split.events.train.len(),
            split.non_events.train.len()
        )));
    }
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::Label;

    fn pool(n: usize, label: Label) -> Vec<LabeledPoint> {
        (0..n)
            .map(|i| {
                let p = LabeledPoint::event(27.0 + i as f64 * 1e-4, 85.0 + i as f64 * 1e-4);
                LabeledPoint { label, ..p }
            })
            .collect()
    }

    fn same_points(a: &[LabeledPoint], b: &[LabeledPoint]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
    }

    #[test]
    fn partitions_are_disjoint_and_cover_the_pool() {
        let events = pool(100, Label::Event);
        let non_events = pool(100, Label::NonEvent);
        let split = split_samples(&events, &non_events, 0.7, 42).unwrap();

        for (part, original) in [(&split.events, &events), (&split.non_events, &non_events)] {
            assert_eq!(part.train.len() + part.test.len(), original.len());
            for p in &part.train {
                assert!(!part.test.contains(p), "point in both train and test");
            }
            for p in original {
                assert!(part.train.contains(p) || part.test.contains(p));
            }
        }
    }

    #[test]
    fn seventy_percent_fraction_gives_roughly_seventy_thirty() {
        let split = split_samples(&pool(100, Label::Event), &pool(100, Label::NonEvent), 0.7, 42).unwrap();
        for part in [&split.events, &split.non_events] {
            assert!((50..=90).contains(&part.train.len()), "train={}", part.train.len());
            assert!((10..=50).contains(&part.test.len()), "test={}", part.test.len());
        }
    }

    #[test]
    fn same_seed_gives_identical_split() {
        let events = pool(200, Label::Event);
        let non_events = pool(150, Label::NonEvent);
        let a = split_samples(&events, &non_events, 0.6, 7).unwrap();
        let b = split_samples(&events, &non_events, 0.6, 7).unwrap();
        assert!(same_points(&a.events.train, &b.events.train));
        assert!(same_points(&a.non_events.test, &b.non_events.test));

        let c = split_samples(&events, &non_events, 0.6, 8).unwrap();
        assert!(!same_points(&a.events.train, &c.events.train));
    }

    #[test]
    fn class_pools_are_split_independently() {
        let events = pool(300, Label::Event);
        let a = split_samples(&events, &pool(50, Label::NonEvent), 0.7, 3).unwrap();
        let b = split_samples(&events, &pool(500, Label::NonEvent), 0.7, 3).unwrap();
        assert!(same_points(&a.events.train, &b.events.train));
    }

    #[test]
    fn realised_fraction_converges_on_large_pools() {
        let events = pool(20_000, Label::Event);
        let non_events = pool(20_000, Label::NonEvent);
        for (seed, f) in [(1u64, 0.3), (42, 0.7), (99, 0.5), (1234, 0.9)] {
            let split = split_samples(&events, &non_events, f, seed).unwrap();
            for part in [&split.events, &split.non_events] {
                let realised = part.train.len() as f64 / 20_000.0;
                assert!((realised - f).abs() < 0.02, "seed {seed}: f={f}, realised={realised}");
            }
        }
    }

    #[test]
    fn fraction_outside_open_interval_is_rejected() {
        let events = pool(10, Label::Event);
        for f in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                split_samples(&events, &events, f, 1),
                Err(HazardError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn empty_training_pool_fails_fast() {
        let err = split_samples(&[], &pool(10, Label::NonEvent), 0.7, 1).unwrap_err();
        assert!(matches!(err, HazardError::InsufficientEvaluationData { .. }));
    }

    #[test]
    fn partition_pool_threads_an_explicit_generator() {
        let points = pool(50, Label::Event);
        let mut rng = StdRng::seed_from_u64(5);
        let first = partition_pool(&points, 0.5, &mut rng).unwrap();
        let second = partition_pool(&points, 0.5, &mut rng).unwrap();
        // The generator advanced, so a second draw almost surely differs.
        assert!(!same_points(&first.train, &second.train));
        let tags = tag_points(&points, &mut StdRng::seed_from_u64(5));
        assert!(tags.iter().all(|t| (0.0..1.0).contains(&t.tag)));
    }
}
