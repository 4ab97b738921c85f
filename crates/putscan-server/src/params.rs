//! Query-parameter parsing for the scan surfaces.
//!
//! Everything loosely typed in the query string funnels through
//! [`ScanParams::scan_options`] into one validated, clamped [`ScanOptions`]
//! at the request boundary.

use serde::Deserialize;

use putscan_core::{clamp_concurrency, clamp_limit, ScanMode, ScanOptions, ValidationError};

const DEFAULT_CONCURRENCY: i64 = 8;
const DEFAULT_LIMIT: i64 = 1000;

/// Raw query parameters shared by the batch, CSV, and streaming scans.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanParams {
    /// Inline comma-separated ticker list; bypasses universe files.
    pub tickers: Option<String>,
    pub min_bid_theo: Option<f64>,
    pub min_vol: Option<u64>,
    pub min_oi: Option<u64>,
    pub max_dte: Option<u32>,
    pub near: Option<f64>,
    /// Maximum expiries to consider per ticker.
    pub exp: Option<usize>,
    pub concurrency: Option<i64>,
    pub limit: Option<i64>,
    pub sleep_ms: Option<u64>,
    pub mode: Option<String>,
    pub intrinsic: Option<bool>,
    pub intrinsic_only: Option<bool>,
    pub min_intrinsic: Option<f64>,
    pub debug: Option<bool>,
}

impl ScanParams {
    /// Build the typed, normalized scan options.
    pub fn scan_options(&self) -> Result<ScanOptions, ValidationError> {
        let defaults = ScanOptions::default();
        let mode = match &self.mode {
            Some(raw) => ScanMode::parse(raw)?,
            None => defaults.mode,
        };

        Ok(ScanOptions {
            max_dte: self.max_dte.unwrap_or(defaults.max_dte),
            near: self.near.unwrap_or(defaults.near),
            max_exp: self.exp.unwrap_or(defaults.max_exp),
            min_bid_theo: self.min_bid_theo.unwrap_or(defaults.min_bid_theo),
            min_vol: self.min_vol.unwrap_or(defaults.min_vol),
            min_oi: self.min_oi.unwrap_or(defaults.min_oi),
            sleep_ms: self.sleep_ms.unwrap_or(defaults.sleep_ms),
            mode,
            intrinsic: self.intrinsic.unwrap_or(defaults.intrinsic),
            intrinsic_only: self.intrinsic_only.unwrap_or(defaults.intrinsic_only),
            min_intrinsic: self.min_intrinsic.unwrap_or(defaults.min_intrinsic),
            debug: self.debug.unwrap_or(defaults.debug),
        }
        .normalized())
    }

    pub fn concurrency(&self) -> usize {
        clamp_concurrency(self.concurrency.unwrap_or(DEFAULT_CONCURRENCY))
    }

    pub fn limit(&self) -> usize {
        clamp_limit(self.limit.unwrap_or(DEFAULT_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_params_are_absent() {
        let params = ScanParams::default();
        let options = params.scan_options().expect("options");
        assert_eq!(options, ScanOptions::default());
        assert_eq!(params.concurrency(), 8);
        assert_eq!(params.limit(), 1000);
    }

    #[test]
    fn explicit_params_override_defaults() {
        let params = ScanParams {
            near: Some(0.15),
            exp: Some(5),
            mode: Some("afterhours".to_owned()),
            intrinsic: Some(true),
            concurrency: Some(100),
            limit: Some(0),
            ..ScanParams::default()
        };

        let options = params.scan_options().expect("options");
        assert_eq!(options.near, 0.15);
        assert_eq!(options.max_exp, 5);
        assert_eq!(options.mode, ScanMode::Afterhours);
        assert!(options.intrinsic);
        assert_eq!(params.concurrency(), 16);
        assert_eq!(params.limit(), 1);
    }

    #[test]
    fn bogus_mode_is_rejected() {
        let params = ScanParams {
            mode: Some("overnight".to_owned()),
            ..ScanParams::default()
        };
        assert!(matches!(
            params.scan_options(),
            Err(ValidationError::InvalidMode { .. })
        ));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let params = ScanParams {
            near: Some(99.0),
            exp: Some(50),
            ..ScanParams::default()
        };
        let options = params.scan_options().expect("options");
        assert_eq!(options.near, 5.0);
        assert_eq!(options.max_exp, 12);
    }
}
