//! Uniform random search over a [`ParameterSpace`].
//!
//! Stepped ranges are discretized: the sampler picks uniformly among the
//! candidates `min, min + step, ...` that do not exceed `max`, never from the
//! continuous interval. The number of candidates therefore sets each value's
//! probability.

use hs_types::{ConfigError, SpaceError, SweepResult};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::assignment::HyperparameterAssignment;
use crate::space::ParameterSpace;

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: ChaCha8Rng,
}

impl RandomSampler {
    /// Sampler seeded from OS entropy; draws differ between processes.
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Deterministic sampler: the same seed yields the same assignments.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Draw `count` independent assignments from `space`.
    pub fn generate(
        &mut self,
        space: &ParameterSpace,
        count: usize,
    ) -> SweepResult<Vec<HyperparameterAssignment>> {
        if count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sample count".to_string(),
                value: count.to_string(),
                expected: "at least 1".to_string(),
            }
            .into());
        }

        let samples = (0..count)
            .map(|_| self.sample_one(space))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            samples = samples.len(),
            parameters = space.len(),
            "random search generated"
        );
        Ok(samples)
    }

    fn sample_one(&mut self, space: &ParameterSpace) -> Result<HyperparameterAssignment, SpaceError> {
        let mut assignment = HyperparameterAssignment::new();

        for param in space {
            let count = param.candidate_count()?;
            let index = if count > 1 {
                self.rng.gen_range(0..count)
            } else {
                0
            };
            assignment.insert(param.name.clone(), param.candidate(index)?);
        }

        Ok(assignment)
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::{ParamValue, SweepError};
    use std::collections::HashSet;

    fn cnn_space() -> ParameterSpace {
        ParameterSpace::builder()
            .add_static("batch_size", 128)
            .unwrap()
            .add_static("epochs", 10)
            .unwrap()
            .add_enumerated_list("optimizer", ["sgd", "adam"])
            .unwrap()
            .add_power_range("num_filters_1", 5, 8, 2)
            .unwrap()
            .add_stepped_range("filter_size_1", 2, 3, 1)
            .unwrap()
            .add_stepped_range("dropout_1", 0.1, 0.9, 0.1)
            .unwrap()
            .add_stepped_range("momentum", 0.0, 1.0, 0.3)
            .unwrap()
            .build()
    }

    #[test]
    fn end_to_end_scenario() {
        let space = ParameterSpace::builder()
            .add_static("batch_size", 128)
            .unwrap()
            .add_stepped_range("dropout", 0.1, 0.3, 0.1)
            .unwrap()
            .add_power_range("filters", 5, 6, 2)
            .unwrap()
            .build();

        let samples = RandomSampler::new().generate(&space, 1).unwrap();
        assert_eq!(samples.len(), 1);

        let sample = &samples[0];
        assert_eq!(sample.get("batch_size"), Some(&ParamValue::Integer(128)));
        let dropout = sample.get("dropout").and_then(ParamValue::as_f64).unwrap();
        assert!([0.1, 0.2, 0.3].contains(&dropout), "dropout {dropout}");
        let filters = sample.get("filters").and_then(ParamValue::as_i64).unwrap();
        assert!([32, 64].contains(&filters), "filters {filters}");
    }

    #[test]
    fn every_assignment_is_complete() {
        let space = cnn_space();
        let samples = RandomSampler::seeded(7).generate(&space, 40).unwrap();
        assert_eq!(samples.len(), 40);
        for sample in &samples {
            assert_eq!(sample.len(), space.len());
            for name in space.names() {
                assert!(sample.get(name).is_some(), "missing {name}");
            }
        }
    }

    #[test]
    fn stepped_values_lie_on_the_lattice() {
        let space = cnn_space();
        let samples = RandomSampler::seeded(11).generate(&space, 200).unwrap();

        for sample in &samples {
            let size = sample.get("filter_size_1").and_then(ParamValue::as_i64).unwrap();
            assert!((2..=3).contains(&size));

            let dropout = sample.get("dropout_1").and_then(ParamValue::as_f64).unwrap();
            assert!((0.1..=0.9).contains(&dropout), "dropout {dropout}");
            let k = (dropout - 0.1) / 0.1;
            assert!((k - k.round()).abs() < 1e-9, "dropout {dropout} off lattice");

            let momentum = sample.get("momentum").and_then(ParamValue::as_f64).unwrap();
            assert!([0.0, 0.3, 0.6, 0.9].contains(&momentum), "momentum {momentum}");
        }
    }

    #[test]
    fn power_and_list_values_are_members() {
        let space = cnn_space();
        let samples = RandomSampler::seeded(3).generate(&space, 200).unwrap();

        for sample in &samples {
            let filters = sample.get("num_filters_1").and_then(ParamValue::as_i64).unwrap();
            assert!([32, 64, 128, 256].contains(&filters), "filters {filters}");

            let optimizer = sample.get("optimizer").and_then(ParamValue::as_str).unwrap();
            assert!(["sgd", "adam"].contains(&optimizer));

            assert_eq!(sample.get("epochs"), Some(&ParamValue::Integer(10)));
        }
    }

    #[test]
    fn all_candidates_reachable() {
        let space = ParameterSpace::builder()
            .add_stepped_range("dropout", 0.1, 0.3, 0.1)
            .unwrap()
            .build();
        let samples = RandomSampler::seeded(42).generate(&space, 300).unwrap();

        let seen: HashSet<String> = samples
            .iter()
            .map(|s| s.get("dropout").unwrap().to_string())
            .collect();
        let expected: HashSet<String> =
            ["0.1", "0.2", "0.3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn same_seed_same_assignments() {
        let space = cnn_space();
        let a = RandomSampler::seeded(99).generate(&space, 10).unwrap();
        let b = RandomSampler::seeded(99).generate(&space, 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_count_rejected() {
        let err = RandomSampler::seeded(1).generate(&cnn_space(), 0).unwrap_err();
        assert!(matches!(err, SweepError::Config(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn empty_space_yields_empty_assignments() {
        let samples = RandomSampler::seeded(1)
            .generate(&ParameterSpace::default(), 3)
            .unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(HyperparameterAssignment::is_empty));
    }
}
