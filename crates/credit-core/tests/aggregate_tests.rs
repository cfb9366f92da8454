//! Aggregation engine integration tests

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;

use credit_core::{
    Aggregator, CreditTier, DataStatus, ScoreCard, Source, SubScore, Weights,
};

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
}

fn card(score: u8) -> ScoreCard {
    let mut breakdown = credit_core::Breakdown::new();
    breakdown.insert("metric".to_string(), f64::from(score));
    ScoreCard { score, breakdown }
}

/// Aggregator weighting GitHub alone, so the total equals the GitHub score
fn github_only() -> Aggregator {
    Aggregator {
        weights: Weights {
            github: 1.0,
            farcaster: 0.0,
            lens: 0.0,
            onchain: 0.0,
            identity: 0.0,
        },
        ..Aggregator::default()
    }
}

fn total_of(agg: &Aggregator, score: u8) -> Vec<SubScore> {
    vec![agg.sub_score(Source::GitHub, card(score))]
}

#[test]
fn test_aggregate_is_deterministic() {
    let agg = Aggregator::default();
    let subs = vec![
        agg.sub_score(Source::GitHub, card(72)),
        agg.sub_score(Source::Farcaster, card(41)),
        agg.missing(Source::Lens, DataStatus::Unavailable("timeout".into())),
        agg.sub_score(Source::OnChain, card(63)),
        agg.sub_score(Source::Identity, card(88)),
    ];

    let first = agg.aggregate(&subs, at());
    let second = agg.aggregate(&subs, at());
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[test]
fn test_no_sources_connected() {
    let agg = Aggregator::default();
    let result = agg.aggregate(&[], at());

    assert_eq!(result.total_score, 0);
    assert_eq!(result.tier, CreditTier::Unqualified);
    assert!(!result.eligibility.eligible);
    assert_eq!(result.eligibility.amount, 0);
    for source in Source::ALL {
        assert!(
            result.recommendations.iter().any(|r| r.source == source),
            "missing recommendation for {source}"
        );
    }
}

#[test]
fn test_missing_source_is_not_renormalized() {
    let agg = Aggregator::default();
    let subs = vec![
        agg.sub_score(Source::GitHub, card(90)),
        agg.sub_score(Source::Farcaster, card(60)),
        agg.missing(Source::Lens, DataStatus::NotConnected),
        agg.sub_score(Source::OnChain, card(70)),
        agg.missing(Source::Identity, DataStatus::NotConnected),
    ];
    let result = agg.aggregate(&subs, at());

    // 90*0.40 + 60*0.15 + 0*0.15 + 70*0.20 + 0*0.10
    assert_eq!(result.total_score, 59);
    assert_eq!(result.tier, CreditTier::Good);
    assert!((result.sub_score(Source::Lens).unwrap().weight - 0.15).abs() < f64::EPSILON);
}

#[test]
fn test_tier_boundaries_through_aggregate() {
    let agg = github_only();
    assert_eq!(agg.aggregate(&total_of(&agg, 85), at()).tier, CreditTier::Premium);
    assert_eq!(agg.aggregate(&total_of(&agg, 84), at()).tier, CreditTier::Excellent);
    assert_eq!(agg.aggregate(&total_of(&agg, 55), at()).tier, CreditTier::Good);
    assert_eq!(agg.aggregate(&total_of(&agg, 54), at()).tier, CreditTier::Fair);
}

#[test]
fn test_every_score_maps_to_one_tier_monotonically() {
    let mut previous = CreditTier::Unqualified;
    for score in 0..=100u8 {
        let tier = CreditTier::from_score(score);
        assert!(tier >= previous, "tier dropped at {score}");
        assert!(score >= tier.min_score());
        previous = tier;
    }
    assert_eq!(previous, CreditTier::Premium);
}

#[test]
fn test_amount_never_decreases_with_score() {
    let agg = github_only();
    let mut previous = 0;
    for score in 0..=100u8 {
        let result = agg.aggregate(&total_of(&agg, score), at());
        assert!(
            result.eligibility.amount >= previous,
            "amount dropped at score {score}"
        );
        previous = result.eligibility.amount;
    }
}

#[test]
fn test_amount_constant_within_tier_band() {
    let agg = github_only();
    let amounts: Vec<u64> = (55..=69u8)
        .map(|s| agg.aggregate(&total_of(&agg, s), at()).eligibility.amount)
        .collect();
    assert!(amounts.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(amounts[0], 10_000);
}

#[test]
fn test_premium_with_bonuses() {
    let agg = Aggregator::default();
    let subs = vec![
        agg.sub_score(Source::GitHub, card(95)),
        agg.sub_score(Source::Farcaster, card(85)),
        agg.sub_score(Source::Lens, card(80)),
        agg.sub_score(Source::OnChain, card(80)),
        agg.sub_score(Source::Identity, card(90)),
    ];
    let result = agg.aggregate(&subs, at());

    assert_eq!(result.total_score, 88);
    assert_eq!(result.tier, CreditTier::Premium);
    assert!(result.eligibility.eligible);
    // 50_000 * (100 + 10 + 5 + 5) / 100
    assert_eq!(result.eligibility.amount, 60_000);
    assert_eq!(result.eligibility.interest_rate, 3.0);
    assert!(result.recommendations.is_empty());
}

#[test]
fn test_custom_weights() {
    let weights = Weights {
        github: 0.5,
        farcaster: 0.1,
        lens: 0.1,
        onchain: 0.2,
        identity: 0.1,
    };
    assert!(weights.check().is_ok());
    let agg = Aggregator {
        weights,
        ..Aggregator::default()
    };
    let result = agg.aggregate(&[agg.sub_score(Source::GitHub, card(80))], at());
    assert_eq!(result.total_score, 40);
}

#[test]
fn test_configured_weights_override_sub_score_weights() {
    let agg = Aggregator::default();
    let subs: Vec<SubScore> = [Source::GitHub, Source::Farcaster, Source::OnChain]
        .into_iter()
        .map(|source| SubScore::scored(source, card(60), 1.0))
        .collect();
    let result = agg.aggregate(&subs, at());

    // 60*0.40 + 60*0.15 + 60*0.20
    assert_eq!(result.total_score, 45);
    assert_eq!(result.tier, CreditTier::Fair);
    assert!((result.sub_score(Source::GitHub).unwrap().weight - 0.40).abs() < f64::EPSILON);
}

#[test]
fn test_funding_request_payload() {
    let agg = github_only();
    let result = agg.aggregate(&total_of(&agg, 72), at());
    let request = result.funding_request("0xdev");
    assert!(request.eligible);
    assert_eq!(request.amount, 25_000);
    assert_eq!(request.developer_address, "0xdev");
}
