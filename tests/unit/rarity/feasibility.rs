use super::*;
use crate::grid::layout::{GridPosition, TraitVariant};

fn position(slot: usize, weights: &[f64], required: bool) -> GridPosition {
    let variants = weights
        .iter()
        .enumerate()
        .map(|(v, &w)| TraitVariant::new(format!("v{v}"), format!("{slot}/v{v}.png"), w))
        .collect();
    GridPosition::new(
        PositionIndex::from_slot(slot).unwrap(),
        format!("slot{slot}"),
        required,
        variants,
        None,
    )
    .unwrap()
}

fn uniform(counts: &[usize]) -> GridLayout {
    GridLayout::new(
        counts
            .iter()
            .enumerate()
            .map(|(slot, &n)| position(slot, &vec![1.0; n], true))
            .collect(),
    )
    .unwrap()
}

#[test]
fn unique_collection_larger_than_space_is_infeasible() {
    let layout = uniform(&[3, 4]);

    let report = check(&layout, 13, false);
    assert!(!report.feasible);
    assert_eq!(report.level, FeasibilityLevel::Infeasible);
    assert_eq!(report.total_combinations, 12);
    assert_eq!(
        report.errors,
        vec![FeasibilityError::InfeasibleCollectionSize {
            requested: 13,
            total_combinations: 12,
        }]
    );
    assert!(report.into_result().is_err());
}

#[test]
fn exact_fit_is_feasible_but_challenging() {
    let report = check(&uniform(&[3, 4]), 12, false);
    assert!(report.feasible);
    assert!(report.errors.is_empty());
    assert_eq!(report.level, FeasibilityLevel::Challenging);
    assert!(
        report
            .warnings
            .contains(&FeasibilityWarning::HighUtilization { utilization: 1.0 })
    );
}

#[test]
fn utilization_thresholds_grade_the_run() {
    let layout = uniform(&[10, 10]);
    let level = |size| check(&layout, size, false).level;
    assert_eq!(level(1), FeasibilityLevel::Optimal);
    assert_eq!(level(70), FeasibilityLevel::Optimal);
    assert_eq!(level(71), FeasibilityLevel::Feasible);
    assert_eq!(level(90), FeasibilityLevel::Feasible);
    assert_eq!(level(91), FeasibilityLevel::Challenging);
    assert_eq!(level(101), FeasibilityLevel::Infeasible);
}

#[test]
fn duplicates_allowed_never_block() {
    let report = check(&uniform(&[3, 4]), 100, true);
    assert!(report.feasible);
    assert!(report.errors.is_empty());
    assert_eq!(report.level, FeasibilityLevel::Challenging);
    assert!(report.warnings.contains(&FeasibilityWarning::DuplicatesRequired {
        requested: 100,
        total_combinations: 12,
    }));
    assert!(
        !report
            .warnings
            .iter()
            .any(|w| matches!(w, FeasibilityWarning::HighUtilization { .. }))
    );
}

#[test]
fn optional_position_counts_the_empty_option() {
    let layout = GridLayout::new(vec![
        position(0, &[1.0, 1.0, 1.0], true),
        position(1, &[1.0, 1.0], false),
    ])
    .unwrap();
    assert_eq!(check(&layout, 1, false).total_combinations, 9);
}

#[test]
fn rare_variants_are_flagged_as_underrepresented() {
    let layout = GridLayout::new(vec![position(0, &[1000.0, 1.0], true)]).unwrap();
    for allow_duplicates in [false, true] {
        let report = check(&layout, 2, allow_duplicates);
        let flagged: Vec<&str> = report
            .warnings
            .iter()
            .filter_map(|w| match w {
                FeasibilityWarning::UnderrepresentedVariant { variant, .. } => {
                    Some(variant.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(flagged, vec!["v1"]);
    }
}

#[test]
fn single_option_and_large_collection_warnings() {
    let layout = uniform(&[1, 300, 300]);
    let report = check(&layout, 60_000, false);
    assert!(report.feasible);
    assert!(report.warnings.contains(&FeasibilityWarning::SingleOptionPosition {
        position: PositionIndex::new(1).unwrap(),
    }));
    assert!(
        report
            .warnings
            .contains(&FeasibilityWarning::LargeCollection { requested: 60_000 })
    );
}

#[test]
fn suggested_sizes_cover_fixed_fractions() {
    assert_eq!(suggested_sizes(12), vec![1, 3, 8, 10, 12]);
    assert_eq!(suggested_sizes(3), vec![1, 2, 3]);
    assert_eq!(suggested_sizes(1), vec![1]);
    assert!(suggested_sizes(0).is_empty());
    assert_eq!(suggested_sizes(1000), vec![100, 300, 700, 900, 1000]);
}

#[test]
fn render_summarizes_the_verdict() {
    let text = check(&uniform(&[3, 4]), 13, false).render();
    assert!(text.starts_with("Feasibility: INFEASIBLE (infeasible)"));
    assert!(text.contains("Distinct combinations: 12"));
    assert!(text.contains("Suggested sizes: 1, 3, 8, 10, 12"));
    assert!(text.contains("error: requested 13 unique items"));
}
