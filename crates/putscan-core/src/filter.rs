//! The ordered contract filter pipeline.
//!
//! Stages run strictly in order — moneyness, price usability, minimum
//! intrinsic, richness, liquidity — and each survivor increments that
//! stage's [`ScanStats`] counter before the next stage runs. A rejected
//! contract is dropped immediately, so the kept-counts are non-increasing
//! along the pipeline for every ticker.

use crate::config::{ScanMode, ScanOptions};
use crate::domain::{Hit, OptionContract, PriceSource, ScanStats, Ticker};
use crate::pricing;

/// Run one contract through the pipeline. Returns the enriched hit when
/// every stage passes.
pub fn evaluate(
    ticker: &Ticker,
    contract: &OptionContract,
    spot: f64,
    dte: i64,
    options: &ScanOptions,
    stats: &mut ScanStats,
) -> Option<Hit> {
    stats.puts_seen += 1;

    // Stage 1: moneyness.
    if spot <= 0.0 || (contract.strike - spot).abs() / spot > options.near {
        return None;
    }
    stats.near_kept += 1;

    // Stage 2: price usability.
    let intrinsic = pricing::intrinsic_put(spot, contract.strike);
    let (used_price, price_used) = usable_price(contract, intrinsic, options)?;
    stats.priced_kept += 1;

    // Stage 3: minimum intrinsic (afterhours only, 0 disables).
    if options.mode == ScanMode::Afterhours
        && options.min_intrinsic > 0.0
        && intrinsic < options.min_intrinsic
    {
        return None;
    }
    stats.min_intrinsic_kept += 1;

    // Stage 4: richness.
    let t_years = dte as f64 / 365.0;
    let theo_price = pricing::put_value(spot, contract.strike, t_years, contract.implied_volatility);
    let ratio = if theo_price > 0.0 {
        used_price / theo_price
    } else {
        f64::INFINITY
    };
    if ratio < options.min_bid_theo {
        return None;
    }
    stats.rich_kept += 1;

    // Stage 5: liquidity.
    if contract.volume < options.min_vol || contract.open_interest < options.min_oi {
        return None;
    }
    stats.vol_oi_kept += 1;

    Some(Hit {
        ticker: ticker.clone(),
        contract_symbol: contract.contract_symbol.clone(),
        strike: contract.strike,
        expiration: contract.expiration,
        dte,
        spot,
        bid: contract.bid,
        ask: contract.ask,
        last_price: contract.last_price,
        used_price,
        price_used,
        theo_price,
        ratio,
        intrinsic_value: intrinsic,
        intrinsic_gap: used_price - intrinsic,
        moneyness_pct: (contract.strike - spot) / spot * 100.0,
        iv_pct: pricing::effective_sigma(contract.implied_volatility) * 100.0,
        volume: contract.volume,
        open_interest: contract.open_interest,
    })
}

/// Mode-dependent used-price resolution.
///
/// Regular mode takes the bid/ask mid, or whichever side is present when the
/// other is absent or zero. Afterhours falls back from mid to last price to
/// intrinsic value (the latter only when enabled), and `intrinsic_only`
/// forces intrinsic outright. No finite positive price means rejection.
fn usable_price(
    contract: &OptionContract,
    intrinsic: f64,
    options: &ScanOptions,
) -> Option<(f64, PriceSource)> {
    if options.mode == ScanMode::Afterhours && options.intrinsic_only {
        return positive(intrinsic).map(|p| (p, PriceSource::Intrinsic));
    }

    let mid = mid_price(contract.bid, contract.ask);

    match options.mode {
        ScanMode::Regular => mid.map(|p| (p, PriceSource::Mid)),
        ScanMode::Afterhours => {
            if let Some(p) = mid {
                return Some((p, PriceSource::Mid));
            }
            if let Some(p) = contract.last_price.and_then(positive) {
                return Some((p, PriceSource::Last));
            }
            if options.intrinsic {
                positive(intrinsic).map(|p| (p, PriceSource::Intrinsic))
            } else {
                None
            }
        }
    }
}

fn mid_price(bid: Option<f64>, ask: Option<f64>) -> Option<f64> {
    let bid = bid.and_then(positive);
    let ask = ask.and_then(positive);
    match (bid, ask) {
        (Some(b), Some(a)) => Some((b + a) / 2.0),
        (Some(b), None) => Some(b),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn ticker() -> Ticker {
        Ticker::parse("AAPL").expect("ticker")
    }

    fn contract(strike: f64, bid: Option<f64>, ask: Option<f64>) -> OptionContract {
        OptionContract {
            contract_symbol: format!("AAPL_P{strike}"),
            strike,
            expiration: date!(2026 - 09 - 18),
            bid,
            ask,
            last_price: None,
            implied_volatility: Some(0.30),
            volume: 100,
            open_interest: 100,
        }
    }

    fn loose() -> ScanOptions {
        ScanOptions {
            min_bid_theo: 0.0,
            ..ScanOptions::default()
        }
    }

    #[test]
    fn worked_example_survives_with_mid_price() {
        let mut stats = ScanStats::default();
        let contract = contract(140.0, Some(2.0), Some(2.2));

        let hit = evaluate(
            &ticker(),
            &contract,
            150.0,
            30,
            &ScanOptions::default(),
            &mut stats,
        )
        .expect("contract should survive");

        assert!((hit.used_price - 2.10).abs() < 1e-9);
        assert_eq!(hit.price_used, PriceSource::Mid);
        assert!(hit.ratio >= 1.2, "ratio={}", hit.ratio);
        assert!((hit.theo_price - 1.36).abs() < 0.05);
        assert_eq!(
            (stats.near_kept, stats.priced_kept, stats.vol_oi_kept),
            (1, 1, 1)
        );
    }

    #[test]
    fn far_strikes_fail_moneyness() {
        let mut stats = ScanStats::default();
        let contract = contract(90.0, Some(2.0), Some(2.2));

        let hit = evaluate(&ticker(), &contract, 150.0, 30, &loose(), &mut stats);

        assert!(hit.is_none());
        assert_eq!(stats.puts_seen, 1);
        assert_eq!(stats.near_kept, 0);
    }

    #[test]
    fn one_sided_quote_uses_the_present_side() {
        let mut stats = ScanStats::default();
        let bid_only = contract(140.0, Some(2.0), Some(0.0));
        let hit = evaluate(&ticker(), &bid_only, 150.0, 30, &loose(), &mut stats)
            .expect("bid-only survives");
        assert_eq!(hit.used_price, 2.0);
        assert_eq!(hit.price_used, PriceSource::Mid);

        let ask_only = contract(140.0, None, Some(2.4));
        let hit = evaluate(&ticker(), &ask_only, 150.0, 30, &loose(), &mut stats)
            .expect("ask-only survives");
        assert_eq!(hit.used_price, 2.4);
    }

    #[test]
    fn regular_mode_never_uses_last_price() {
        let mut stats = ScanStats::default();
        let mut quoteless = contract(140.0, None, None);
        quoteless.last_price = Some(2.5);

        let hit = evaluate(&ticker(), &quoteless, 150.0, 30, &loose(), &mut stats);

        assert!(hit.is_none());
        assert_eq!(stats.near_kept, 1);
        assert_eq!(stats.priced_kept, 0);
    }

    #[test]
    fn afterhours_falls_back_to_last_then_intrinsic() {
        let options = ScanOptions {
            mode: ScanMode::Afterhours,
            intrinsic: true,
            ..loose()
        };

        let mut stats = ScanStats::default();
        let mut stale = contract(140.0, None, None);
        stale.last_price = Some(2.5);
        let hit = evaluate(&ticker(), &stale, 150.0, 30, &options, &mut stats)
            .expect("last price survives");
        assert_eq!(hit.price_used, PriceSource::Last);
        assert_eq!(hit.used_price, 2.5);

        // ITM put with no quotes at all: intrinsic carries it.
        let dead = contract(160.0, None, None);
        let hit = evaluate(&ticker(), &dead, 150.0, 30, &options, &mut stats)
            .expect("intrinsic survives");
        assert_eq!(hit.price_used, PriceSource::Intrinsic);
        assert_eq!(hit.used_price, 10.0);

        // Intrinsic fallback disabled: same contract is rejected.
        let no_intrinsic = ScanOptions {
            intrinsic: false,
            ..options
        };
        let mut stats = ScanStats::default();
        let dead = contract(160.0, None, None);
        assert!(evaluate(&ticker(), &dead, 150.0, 30, &no_intrinsic, &mut stats).is_none());
    }

    #[test]
    fn intrinsic_only_overrides_live_quotes() {
        let options = ScanOptions {
            mode: ScanMode::Afterhours,
            intrinsic_only: true,
            ..loose()
        };
        let mut stats = ScanStats::default();
        let contract = contract(160.0, Some(9.0), Some(9.4));

        let hit = evaluate(&ticker(), &contract, 150.0, 30, &options, &mut stats)
            .expect("intrinsic-only survives");

        assert_eq!(hit.price_used, PriceSource::Intrinsic);
        assert_eq!(hit.used_price, 10.0);
    }

    #[test]
    fn min_intrinsic_gates_afterhours_only() {
        let afterhours = ScanOptions {
            mode: ScanMode::Afterhours,
            min_intrinsic: 5.0,
            ..loose()
        };
        let mut stats = ScanStats::default();
        // OTM put: intrinsic 0 < 5.
        let otm = contract(140.0, Some(2.0), Some(2.2));
        assert!(evaluate(&ticker(), &otm, 150.0, 30, &afterhours, &mut stats).is_none());
        assert_eq!(stats.priced_kept, 1);
        assert_eq!(stats.min_intrinsic_kept, 0);

        // Same contract in regular mode: the stage does not apply.
        let regular = ScanOptions {
            min_intrinsic: 5.0,
            ..loose()
        };
        let mut stats = ScanStats::default();
        let otm = contract(140.0, Some(2.0), Some(2.2));
        assert!(evaluate(&ticker(), &otm, 150.0, 30, &regular, &mut stats).is_some());
    }

    #[test]
    fn richness_threshold_rejects_fairly_priced_contracts() {
        let strict = ScanOptions {
            min_bid_theo: 5.0,
            ..ScanOptions::default()
        };
        let mut stats = ScanStats::default();
        let fair = contract(140.0, Some(2.0), Some(2.2));

        assert!(evaluate(&ticker(), &fair, 150.0, 30, &strict, &mut stats).is_none());
        assert_eq!(stats.min_intrinsic_kept, 1);
        assert_eq!(stats.rich_kept, 0);
        assert_eq!(stats.vol_oi_kept, 0);
    }

    #[test]
    fn zero_theo_means_infinite_ratio_and_always_passes_richness() {
        // Expiring OTM put: theoretical value is intrinsic, which is zero.
        let strict = ScanOptions {
            min_bid_theo: 50.0,
            ..ScanOptions::default()
        };
        let mut stats = ScanStats::default();
        let expiring = contract(140.0, Some(0.05), Some(0.15));

        let hit = evaluate(&ticker(), &expiring, 150.0, 0, &strict, &mut stats)
            .expect("infinite ratio passes any threshold");

        assert_eq!(hit.theo_price, 0.0);
        assert!(hit.ratio.is_infinite());
    }

    #[test]
    fn liquidity_floor_rejects_thin_contracts() {
        let options = ScanOptions {
            min_vol: 500,
            min_oi: 50,
            ..loose()
        };
        let mut stats = ScanStats::default();
        let thin = contract(140.0, Some(2.0), Some(2.2));

        assert!(evaluate(&ticker(), &thin, 150.0, 30, &options, &mut stats).is_none());
        assert_eq!(stats.rich_kept, 1);
        assert_eq!(stats.vol_oi_kept, 0);
    }

    #[test]
    fn kept_counts_never_increase_along_the_pipeline() {
        let mut stats = ScanStats::default();
        let options = ScanOptions {
            min_vol: 150,
            ..ScanOptions::default()
        };

        let contracts = vec![
            contract(90.0, Some(2.0), Some(2.2)),   // fails moneyness
            contract(140.0, None, None),            // fails pricing
            contract(140.0, Some(2.0), Some(2.2)),  // fails liquidity (vol 100)
            contract(145.0, Some(0.1), Some(0.2)),  // fails richness
        ];
        for c in &contracts {
            let _ = evaluate(&ticker(), c, 150.0, 30, &options, &mut stats);
        }

        assert!(stats.puts_seen >= stats.near_kept);
        assert!(stats.near_kept >= stats.priced_kept);
        assert!(stats.priced_kept >= stats.min_intrinsic_kept);
        assert!(stats.min_intrinsic_kept >= stats.rich_kept);
        assert!(stats.rich_kept >= stats.vol_oi_kept);
    }
}
