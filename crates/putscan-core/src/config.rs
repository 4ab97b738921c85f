//! Typed scan configuration.
//!
//! All scan parameters live in a single [`ScanOptions`] structure with
//! named defaults and per-field clamped ranges, built once at the request
//! boundary and read-only for the rest of the scan.

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Pricing regime for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    #[default]
    Regular,
    /// Tolerates stale/absent bid-ask by falling back to last trade price
    /// or intrinsic value.
    Afterhours,
}

impl ScanMode {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "afterhours" | "ah" => Ok(Self::Afterhours),
            _ => Err(ValidationError::InvalidMode {
                value: input.to_owned(),
            }),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Afterhours => "afterhours",
        }
    }
}

/// Immutable per-scan configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Maximum days-to-expiry an expiry may have before it is skipped.
    pub max_dte: u32,
    /// Moneyness tolerance as a fraction of spot.
    pub near: f64,
    /// Number of expiries to consider per ticker.
    pub max_exp: usize,
    /// Richness threshold: reject when `used / theo` falls below it.
    pub min_bid_theo: f64,
    pub min_vol: u64,
    pub min_oi: u64,
    /// Pacing delay before every chain fetch, in milliseconds.
    pub sleep_ms: u64,
    pub mode: ScanMode,
    /// Allow intrinsic value as the afterhours price fallback of last resort.
    pub intrinsic: bool,
    /// Force the used price to intrinsic value (afterhours only).
    pub intrinsic_only: bool,
    /// Minimum intrinsic value (afterhours only, `0` disables the stage).
    pub min_intrinsic: f64,
    /// Collect per-ticker stats and notes in responses.
    pub debug: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_dte: 45,
            near: 0.30,
            max_exp: 3,
            min_bid_theo: 1.2,
            min_vol: 0,
            min_oi: 0,
            sleep_ms: 250,
            mode: ScanMode::Regular,
            intrinsic: false,
            intrinsic_only: false,
            min_intrinsic: 0.0,
            debug: false,
        }
    }
}

impl ScanOptions {
    /// Clamp every field into its supported range, replacing non-finite
    /// floats with their defaults. Applied once when the options are built.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();

        self.max_dte = self.max_dte.clamp(1, 730);
        self.max_exp = self.max_exp.clamp(1, 12);
        self.sleep_ms = self.sleep_ms.min(10_000);

        if !self.near.is_finite() {
            self.near = defaults.near;
        }
        self.near = self.near.clamp(0.0, 5.0);

        if !self.min_bid_theo.is_finite() {
            self.min_bid_theo = defaults.min_bid_theo;
        }
        self.min_bid_theo = self.min_bid_theo.clamp(0.0, 100.0);

        if !self.min_intrinsic.is_finite() {
            self.min_intrinsic = 0.0;
        }
        self.min_intrinsic = self.min_intrinsic.max(0.0);

        self
    }

    /// Loosened thresholds for the diagnostic surface, tuned so every
    /// pipeline stage sees traffic.
    pub fn diagnostic() -> Self {
        Self {
            near: 0.5,
            max_exp: 2,
            min_bid_theo: 0.0,
            min_vol: 0,
            min_oi: 0,
            debug: true,
            ..Self::default()
        }
    }
}
