use super::*;
use crate::grid::layout::TraitVariant;

fn p(raw: u8) -> PositionIndex {
    PositionIndex::new(raw).unwrap()
}

fn position(raw: u8, variants: Vec<TraitVariant>) -> GridPosition {
    GridPosition::new(p(raw), format!("slot{raw}"), true, variants, None).unwrap()
}

fn variant(id: &str, weight: f64, tier: Option<&str>) -> TraitVariant {
    let v = TraitVariant::new(id, format!("{id}.png"), weight);
    match tier {
        Some(t) => v.with_tier(t),
        None => v,
    }
}

fn tiers(entries: &[(&str, f64, f64)]) -> RarityTiers {
    entries
        .iter()
        .map(|(name, min, max)| (name.to_string(), TierBound::new(*min, *max)))
        .collect()
}

fn standard_tiers() -> RarityTiers {
    tiers(&[("common", 50.0, 100.0), ("rare", 1.0, 49.0)])
}

fn single(variants: Vec<TraitVariant>) -> GridLayout {
    GridLayout::new(vec![position(1, variants)]).unwrap()
}

#[test]
fn weights_inside_declared_tiers_pass() {
    let layout = single(vec![
        variant("gold", 80.0, Some("common")),
        variant("ruby", 10.0, Some("rare")),
        variant("jade", 30.0, None),
    ]);
    let report = validate(&layout, &standard_tiers());
    assert!(report.is_valid(), "{:?}", report.errors);
    assert_eq!(report.positions.len(), 1);
    assert_eq!(report.positions[0].variant_probabilities.len(), 3);
}

#[test]
fn weight_outside_every_tier_is_an_error() {
    let layout = single(vec![variant("gold", 80.0, None), variant("huge", 200.0, None)]);
    let report = validate(&layout, &standard_tiers());
    assert_eq!(
        report.errors,
        vec![DistributionIssue::WeightOutsideTiers {
            position: p(1),
            variant: "huge".into(),
            weight: 200.0,
        }]
    );
    assert!(report.into_result().is_err());
}

#[test]
fn declared_tier_mismatch_lists_matching_tiers() {
    let layout = single(vec![variant("gold", 80.0, Some("rare")), variant("ruby", 5.0, None)]);
    let report = validate(&layout, &standard_tiers());
    assert_eq!(report.errors.len(), 1);
    match &report.errors[0] {
        DistributionIssue::TierMismatch {
            variant,
            declared,
            matching,
            ..
        } => {
            assert_eq!(variant.as_str(), "gold");
            assert_eq!(declared, "rare");
            assert_eq!(matching, &vec!["common".to_string()]);
        }
        other => panic!("unexpected issue {other:?}"),
    }
}

#[test]
fn unknown_declared_tier_is_an_error() {
    let layout = single(vec![variant("gold", 80.0, Some("legendary"))]);
    let report = validate(&layout, &standard_tiers());
    assert!(matches!(
        report.errors.as_slice(),
        [DistributionIssue::UnknownTier { tier, .. }] if tier == "legendary"
    ));
}

#[test]
fn tier_checks_are_skipped_without_a_tier_table() {
    let layout = single(vec![
        variant("gold", 1e6, Some("whatever")),
        variant("ruby", 0.5, None),
    ]);
    let report = validate(&layout, &RarityTiers::new());
    assert!(report.is_valid());
}

#[test]
fn tier_table_problems_are_reported() {
    let table = tiers(&[("a", 10.0, 50.0), ("b", 40.0, 90.0), ("broken", 9.0, 1.0)]);
    let layout = single(vec![variant("x", 20.0, None)]);
    let report = validate(&layout, &table);

    assert!(report.errors.contains(&DistributionIssue::InvertedTier {
        tier: "broken".to_string(),
        min_weight: 9.0,
        max_weight: 1.0,
    }));
    let overlaps: Vec<_> = report
        .warnings
        .iter()
        .filter(|w| matches!(w, DistributionIssue::OverlappingTiers { .. }))
        .collect();
    assert_eq!(
        overlaps,
        vec![&DistributionIssue::OverlappingTiers {
            first: "a".to_string(),
            second: "b".to_string(),
        }]
    );
}

#[test]
fn weight_in_several_tiers_without_declaration_is_ambiguous() {
    let table = tiers(&[("a", 10.0, 50.0), ("b", 40.0, 90.0)]);
    let layout = single(vec![variant("x", 45.0, None), variant("y", 80.0, Some("b"))]);
    let report = validate(&layout, &table);
    assert!(report.is_valid());
    assert!(report.warnings.iter().any(|w| matches!(
        w,
        DistributionIssue::AmbiguousTier { variant, tiers, .. }
            if variant.as_str() == "x" && tiers == &vec!["a".to_string(), "b".to_string()]
    )));
}

#[test]
fn equal_weights_warn_only_when_tiers_imply_skew() {
    let skewed = single(vec![
        variant("a", 10.0, Some("common")),
        variant("b", 10.0, Some("rare")),
    ]);
    let report = validate(&skewed, &RarityTiers::new());
    assert!(report.is_valid());
    assert!(report.warnings.contains(&DistributionIssue::DegenerateDistribution {
        position: p(1),
        weight: 10.0,
        variants: 2,
    }));

    let flat = single(vec![variant("a", 10.0, None), variant("b", 10.0, None)]);
    let report = validate(&flat, &RarityTiers::new());
    assert!(
        !report
            .warnings
            .iter()
            .any(|w| matches!(w, DistributionIssue::DegenerateDistribution { .. }))
    );
}

#[test]
fn incomplete_grid_is_a_warning() {
    let layout = single(vec![variant("a", 1.0, None)]);
    let report = validate(&layout, &RarityTiers::new());
    assert!(report.is_valid());
    assert!(
        report
            .warnings
            .contains(&DistributionIssue::IncompleteGrid { configured: 1 })
    );

    let full = GridLayout::new(
        (1..=9)
            .map(|raw| position(raw, vec![variant("a", 2.0, None), variant("b", 1.0, None)]))
            .collect(),
    )
    .unwrap();
    let report = validate(&full, &RarityTiers::new());
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
}

#[test]
fn monotonicity_detects_inverted_probabilities() {
    let ids: Vec<VariantId> = vec!["heavy".into(), "light".into()];
    let issues = check_monotonicity(p(2), &ids, &[3.0, 1.0], &[0.25, 0.75]);
    assert_eq!(
        issues,
        vec![DistributionIssue::MonotonicityViolation {
            position: p(2),
            heavier: "heavy".into(),
            lighter: "light".into(),
            heavier_probability: 0.25,
            lighter_probability: 0.75,
        }]
    );
    assert!(issues[0].is_error());

    assert!(check_monotonicity(p(2), &ids, &[3.0, 1.0], &[0.75, 0.25]).is_empty());
    assert!(check_monotonicity(p(2), &ids, &[1.0, 1.0], &[0.5, 0.5]).is_empty());
}

#[test]
fn balance_score_rewards_even_weights() {
    assert_eq!(balance_score(&[]), 0.0);
    assert!((balance_score(&[5.0, 5.0, 5.0]) - 1.0).abs() < 1e-12);
    // mean 2, population std 1, cv 0.5
    assert!((balance_score(&[1.0, 3.0]) - 2.0 / 3.0).abs() < 1e-12);
    assert!(balance_score(&[100.0, 1.0]) < balance_score(&[2.0, 1.0]));
}

#[test]
fn render_lists_probabilities_and_findings() {
    let layout = single(vec![variant("gold", 80.0, None), variant("huge", 200.0, None)]);
    let text = validate(&layout, &standard_tiers()).render();
    assert!(text.starts_with("Distribution: INVALID"));
    assert!(text.contains("gold: 28.57%"));
    assert!(text.contains("error: position 1 variant 'huge' weight 200 matches no rarity tier"));
}

#[test]
fn simulation_tracks_declared_probabilities() {
    let layout = single(vec![
        variant("gold", 100.0, None),
        variant("ruby", 50.0, None),
        variant("jade", 25.0, None),
    ]);
    let mut rng = RandomSource::from_seed(7);
    let accuracy = simulate_accuracy(&layout, &mut rng, 20_000, 0.02);

    assert_eq!(accuracy.samples, 20_000);
    let pos = &accuracy.positions[0];
    assert_eq!(pos.position, p(1));
    assert_eq!(pos.options.len(), 3);
    assert_eq!(pos.options[0].variant, Some("gold".into()));
    assert!((pos.options[0].expected - 100.0 / 175.0).abs() < 1e-12);
    for o in &pos.options {
        assert!((o.deviation - (o.observed - o.expected).abs()).abs() < 1e-12);
    }
    assert!(pos.within_tolerance, "{pos:?}");
    assert!(accuracy.within_tolerance());
    assert_eq!(accuracy.max_deviation(), pos.max_deviation);
}

#[test]
fn simulation_covers_the_empty_option() {
    let hat = GridPosition::new(
        p(5),
        "hat".to_string(),
        false,
        vec![variant("cap", 2.0, None), variant("crown", 1.0, None)],
        None,
    )
    .unwrap();
    let layout = GridLayout::new(vec![hat]).unwrap();
    let accuracy = simulate_accuracy(&layout, &mut RandomSource::from_seed(1), 1_000, 0.05);

    let options = &accuracy.positions[0].options;
    assert_eq!(options.len(), 3);
    assert_eq!(options[2].variant, None);
    let observed: f64 = options.iter().map(|o| o.observed).sum();
    assert!((observed - 1.0).abs() < 1e-9);
}

#[test]
fn deviation_beyond_tolerance_is_a_warning() {
    let layout = single(vec![variant("gold", 100.0, None), variant("ruby", 50.0, None)]);
    let accuracy = simulate_accuracy(&layout, &mut RandomSource::from_seed(3), 1_000, 0.0);
    assert!(!accuracy.within_tolerance());

    let report = validate(&layout, &RarityTiers::new()).with_accuracy(accuracy);
    assert!(report.is_valid());
    assert!(report.warnings.iter().any(|w| matches!(
        w,
        DistributionIssue::SimulationDeviation { position, tolerance, .. }
            if *position == p(1) && *tolerance == 0.0
    )));
    assert!(report.render().contains("Simulation: 1000 draws/position"));
    assert!(report.render().contains("OUT OF TOLERANCE"));
}

#[test]
fn simulation_is_skipped_with_zero_samples() {
    let layout = single(vec![variant("gold", 100.0, None), variant("ruby", 50.0, None)]);
    let off = SimulationSettings {
        samples: 0,
        ..SimulationSettings::default()
    };
    assert!(validate_with_simulation(&layout, &RarityTiers::new(), &off).accuracy.is_none());

    let on = validate_with_simulation(&layout, &RarityTiers::new(), &SimulationSettings::default());
    let accuracy = on.accuracy.as_ref().unwrap();
    assert_eq!(accuracy.samples, 10_000);
    assert_eq!(accuracy.tolerance, 0.02);
    let json = serde_json::to_value(&on).unwrap();
    assert_eq!(json["accuracy"]["samples"], 10_000);
}
