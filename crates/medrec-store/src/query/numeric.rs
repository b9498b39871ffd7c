//! Per-patient reduction of numeric observations.

use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use medrec_types::{Observation, PatientId, PatientSet, TimeModifier};

use super::definition::Comparison;

/// Numeric values of each patient, in chronological order.
pub(crate) type ValueGroups = BTreeMap<PatientId, Vec<f64>>;

/// Groups the numeric values of chronologically ordered observations by
/// patient. Observations without a numeric value are dropped.
pub(crate) fn group_values(observations: &[Observation]) -> ValueGroups {
    let mut groups = ValueGroups::new();
    for obs in observations {
        if let Some(value) = obs.value_numeric {
            groups.entry(obs.patient_id).or_default().push(value);
        }
    }
    groups
}

/// Reduces one patient's values to the value under test.
///
/// `Any` and `No` have no single value; they are handled by
/// [`any_matches`].
fn reduce(values: &[f64], modifier: TimeModifier) -> Option<f64> {
    match modifier {
        TimeModifier::First => values.first().copied(),
        TimeModifier::Last => values.last().copied(),
        TimeModifier::Min => values.iter().copied().reduce(f64::min),
        TimeModifier::Max => values.iter().copied().reduce(f64::max),
        TimeModifier::Avg => {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        TimeModifier::Any | TimeModifier::No => None,
    }
}

fn any_matches(values: &[f64], comparison: Option<Comparison>) -> bool {
    match comparison {
        Some(c) => values.iter().any(|&v| c.operator.holds(v, c.value)),
        None => !values.is_empty(),
    }
}

/// Returns true if the patient with these values satisfies the test.
///
/// `No` is answered as `Any`; the caller complements it against the
/// population.
fn patient_matches(values: &[f64], modifier: TimeModifier, comparison: Option<Comparison>) -> bool {
    match modifier {
        TimeModifier::Any | TimeModifier::No => any_matches(values, comparison),
        _ => match (reduce(values, modifier), comparison) {
            (Some(value), Some(c)) => c.operator.holds(value, c.value),
            (Some(_), None) => true,
            (None, _) => false,
        },
    }
}

/// Patients whose values satisfy the test. Runs in parallel above
/// `parallel_threshold` groups when the `parallel` feature is on.
pub(crate) fn matching_patients(
    groups: ValueGroups,
    modifier: TimeModifier,
    comparison: Option<Comparison>,
    parallel_threshold: usize,
) -> PatientSet {
    #[cfg(feature = "parallel")]
    if groups.len() >= parallel_threshold {
        let matched: Vec<PatientId> = groups
            .into_par_iter()
            .filter(|(_, values)| patient_matches(values, modifier, comparison))
            .map(|(patient_id, _)| patient_id)
            .collect();
        return matched.into_iter().collect();
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel_threshold;

    groups
        .into_iter()
        .filter(|(_, values)| patient_matches(values, modifier, comparison))
        .map(|(patient_id, _)| patient_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use medrec_types::ComparisonOperator;

    fn gt(value: f64) -> Option<Comparison> {
        Some(Comparison {
            operator: ComparisonOperator::GreaterThan,
            value,
        })
    }

    fn make_test_groups() -> ValueGroups {
        BTreeMap::from([(1, vec![3.0, 6.0]), (2, vec![3.0, 4.0]), (3, vec![8.0, 2.0])])
    }

    #[test]
    fn test_any() {
        let set = matching_patients(make_test_groups(), TimeModifier::Any, gt(5.0), usize::MAX);
        assert_eq!(set.to_vec(), vec![1, 3]);
    }

    #[test]
    fn test_first_and_last() {
        let first = matching_patients(make_test_groups(), TimeModifier::First, gt(5.0), usize::MAX);
        assert_eq!(first.to_vec(), vec![3]);
        let last = matching_patients(make_test_groups(), TimeModifier::Last, gt(5.0), usize::MAX);
        assert_eq!(last.to_vec(), vec![1]);
    }

    #[test]
    fn test_aggregates() {
        let groups = make_test_groups();
        assert_eq!(reduce(&groups[&1], TimeModifier::Min), Some(3.0));
        assert_eq!(reduce(&groups[&3], TimeModifier::Max), Some(8.0));
        assert_eq!(reduce(&groups[&2], TimeModifier::Avg), Some(3.5));
        assert_eq!(reduce(&[], TimeModifier::Avg), None);

        let avg = matching_patients(groups, TimeModifier::Avg, gt(4.5), usize::MAX);
        assert_eq!(avg.to_vec(), vec![3]);
    }

    #[test]
    fn test_without_comparison() {
        let groups = BTreeMap::from([(1, vec![1.0]), (2, vec![])]);
        let set = matching_patients(groups, TimeModifier::Max, None, usize::MAX);
        assert_eq!(set.to_vec(), vec![1]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let groups: ValueGroups = (0..500).map(|p| (p, vec![f64::from(p % 10)])).collect();
        let sequential = matching_patients(groups.clone(), TimeModifier::Last, gt(6.0), usize::MAX);
        let parallel = matching_patients(groups, TimeModifier::Last, gt(6.0), 0);
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.len(), 150);
    }

    #[test]
    fn test_group_values_skips_non_numeric() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let observations = vec![
            Observation::numeric(1, 7, 5089, at, 60.0),
            Observation::text(2, 7, 5089, at, "n/a"),
            Observation::numeric(3, 8, 5089, at, 70.0),
        ];
        let groups = group_values(&observations);
        assert_eq!(groups[&7], vec![60.0]);
        assert_eq!(groups[&8], vec![70.0]);
    }
}
