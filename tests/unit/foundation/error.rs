use super::*;

#[test]
fn display_prefix_names_the_error_family() {
    let e: GenError = ConfigurationError::EmptyWeightSet { position: None }.into();
    assert_eq!(e.to_string(), "configuration error: weight set has no weights");

    let e: GenError = FeasibilityError::InfeasibleCollectionSize {
        requested: 13,
        total_combinations: 12,
    }
    .into();
    assert_eq!(
        e.to_string(),
        "feasibility error: requested 13 unique items but only 12 distinct combinations exist"
    );

    assert!(GenError::validation("bad").to_string().starts_with("validation error:"));
    assert_eq!(GenError::Cancelled.to_string(), "generation cancelled");
}

#[test]
fn invalid_weight_reports_position_index_and_defect() {
    let e = ConfigurationError::InvalidWeight {
        position: None,
        index: 2,
        weight: -1.0,
        defect: WeightDefect::NonPositive,
    }
    .at_position(PositionIndex::new(4).unwrap());
    assert_eq!(e.to_string(), "position 4 weight #2 (-1) is not positive");
}

#[test]
fn cache_error_exposes_key_and_recoverability() {
    let key = TraitKey::new(PositionIndex::new(2).unwrap(), "glasses");

    let oversized = CacheError::OversizedAsset {
        key: key.clone(),
        size: 10,
        capacity: 4,
    };
    assert!(oversized.is_recoverable());
    assert_eq!(oversized.key(), &key);

    let timeout = CacheError::LoadTimeout {
        key: key.clone(),
        timeout: Duration::from_millis(5),
        attempts: 3,
    };
    assert!(!timeout.is_recoverable());
    assert!(timeout.to_string().contains("2:glasses"));
}

#[test]
fn anyhow_errors_pass_through_transparently() {
    let e: GenError = anyhow::anyhow!("disk unplugged").into();
    assert_eq!(e.to_string(), "disk unplugged");
}

#[test]
fn cancelled_cache_wait_becomes_a_cancelled_run() {
    let key = TraitKey::new(PositionIndex::new(1).unwrap(), "a");

    let e: GenError = CacheError::Cancelled { key: key.clone() }.into();
    assert!(matches!(e, GenError::Cancelled));

    let e: GenError = CacheError::LoadFailed {
        key,
        message: "corrupt".to_string(),
    }
    .into();
    assert!(matches!(e, GenError::Cache(CacheError::LoadFailed { .. })));
}
