//! Privacy policy that turns a flat set of diagnosis keys into publishable
//! buckets.
//!
//! Keys are partitioned by package (primary country, plus an optional union
//! package), then by UTC date and hour of their rolling start. Hour buckets
//! whose real-key count is below the configured floor are never published on
//! their own; their keys only ship in the daily bucket, which always carries
//! the whole day. Keys dated today (or later) are withheld until the day has
//! fully elapsed.
//!
//! All containers are ordered maps, so iteration order is stable no matter
//! how the input was ordered or how later stages are scheduled.

mod padding;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnosis_key::{DiagnosisKey, KeyError};

pub use padding::PaddingPolicy;
use padding::PaddingGenerator;

#[derive(Debug, thiserror::Error)]
pub enum BundlerError {
    #[error("min_keys_per_hour must be at least 1")]
    InvalidFloor,
    #[error("retention_days must be at least 1")]
    InvalidRetention,
    #[error("padding multiple must be at least 1")]
    InvalidPadding,
    #[error("padding seed is not valid hex: {0}")]
    InvalidSeed(#[from] hex::FromHexError),
    #[error("padding needs a secret padding_seed of at least {MIN_PADDING_SEED_BYTES} bytes, got {0}")]
    WeakSeed(usize),
    #[error("union package {0:?} is also a supported country")]
    UnionCollides(String),
    #[error("invalid country code {0:?}")]
    InvalidCountry(String),
    #[error("failed to derive padding key: {0}")]
    Padding(#[from] KeyError),
}

/// Shortest padding seed accepted while padding is enabled.
pub const MIN_PADDING_SEED_BYTES: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlingConfig {
    /// Minimum number of real keys an hour bucket needs to be published.
    #[serde(default = "default_min_keys_per_hour")]
    pub min_keys_per_hour: usize,
    /// Countries to distribute; empty accepts every origin country.
    #[serde(default)]
    pub supported_countries: Vec<String>,
    /// Name of an additional package aggregating every supported country.
    #[serde(default)]
    pub union_package: Option<String>,
    /// Also publish a key in the package of every supported country its
    /// owner visited.
    #[serde(default = "default_include_visited")]
    pub include_visited_countries: bool,
    #[serde(default)]
    pub padding: PaddingPolicy,
    /// Hex-encoded secret mixed into padding key derivation. Anyone holding
    /// it can tell padding from real keys, so it must not be published.
    #[serde(default)]
    pub padding_seed: String,
    #[serde(default = "default_padding_risk")]
    pub padding_transmission_risk_level: i32,
    /// Keys dated before `today - retention_days` are no longer distributed.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_min_keys_per_hour() -> usize {
    1
}

fn default_include_visited() -> bool {
    true
}

fn default_padding_risk() -> i32 {
    3
}

fn default_retention_days() -> u32 {
    14
}

impl Default for BundlingConfig {
    fn default() -> Self {
        Self {
            min_keys_per_hour: default_min_keys_per_hour(),
            supported_countries: Vec::new(),
            union_package: None,
            include_visited_countries: default_include_visited(),
            padding: PaddingPolicy::default(),
            padding_seed: String::new(),
            padding_transmission_risk_level: default_padding_risk(),
            retention_days: default_retention_days(),
        }
    }
}

impl BundlingConfig {
    pub fn validate(&self) -> Result<(), BundlerError> {
        if self.min_keys_per_hour == 0 {
            return Err(BundlerError::InvalidFloor);
        }
        if self.retention_days == 0 {
            return Err(BundlerError::InvalidRetention);
        }
        if let PaddingPolicy::RoundUp { multiple: 0 } = self.padding {
            return Err(BundlerError::InvalidPadding);
        }
        let seed = hex::decode(&self.padding_seed)?;
        if !self.padding.is_noop() && seed.len() < MIN_PADDING_SEED_BYTES {
            return Err(BundlerError::WeakSeed(seed.len()));
        }
        if let Some(union) = &self.union_package {
            if self.supported_countries.contains(union) {
                return Err(BundlerError::UnionCollides(union.clone()));
            }
        }
        let names = self
            .supported_countries
            .iter()
            .chain(self.union_package.iter());
        for name in names {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(BundlerError::InvalidCountry(name.clone()));
            }
        }
        Ok(())
    }
}

/// Time range a bucket covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Window {
    Day(NaiveDate),
    Hour(NaiveDate, u32),
}

impl Window {
    pub fn date(&self) -> NaiveDate {
        match *self {
            Window::Day(date) | Window::Hour(date, _) => date,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        let midnight = self.date().and_time(NaiveTime::MIN).and_utc();
        match *self {
            Window::Day(_) => midnight,
            Window::Hour(_, hour) => midnight + TimeDelta::hours(i64::from(hour)),
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        match *self {
            Window::Day(_) => self.start() + TimeDelta::days(1),
            Window::Hour(..) => self.start() + TimeDelta::hours(1),
        }
    }

    /// Stable textual identity, e.g. `2021-01-01` or `2021-01-01T05`.
    pub fn label(&self) -> String {
        match *self {
            Window::Day(date) => date.format("%Y-%m-%d").to_string(),
            Window::Hour(date, hour) => format!("{}T{:02}", date.format("%Y-%m-%d"), hour),
        }
    }
}

/// One publishable bucket: the real keys of a package in a time window plus
/// the padding keys that normalize its size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBundle {
    package: String,
    window: Window,
    keys: Vec<DiagnosisKey>,
    padding: Vec<DiagnosisKey>,
}

impl KeyBundle {
    pub fn new(package: impl Into<String>, window: Window, mut keys: Vec<DiagnosisKey>) -> Self {
        keys.sort_by(|a, b| a.key_data().cmp(b.key_data()));
        Self {
            package: package.into(),
            window,
            keys,
            padding: Vec::new(),
        }
    }

    fn with_padding(mut self, mut padding: Vec<DiagnosisKey>) -> Self {
        padding.sort_by(|a, b| a.key_data().cmp(b.key_data()));
        self.padding = padding;
        self
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Keys submitted by diagnosed users.
    pub fn keys(&self) -> &[DiagnosisKey] {
        &self.keys
    }

    /// Synthetic keys added for size normalization.
    pub fn padding(&self) -> &[DiagnosisKey] {
        &self.padding
    }

    /// Every key that goes into the export, real and padding.
    pub fn all_keys(&self) -> impl Iterator<Item = &DiagnosisKey> {
        self.keys.iter().chain(self.padding.iter())
    }

    pub fn len(&self) -> usize {
        self.keys.len() + self.padding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Buckets for a single date of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateBundles {
    pub daily: KeyBundle,
    /// Hour buckets that met the floor, keyed by hour of day.
    pub hours: BTreeMap<u32, KeyBundle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageBundles {
    pub dates: BTreeMap<NaiveDate, DateBundles>,
}

/// Everything a run distributes, keyed by package name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BundleSet {
    pub packages: BTreeMap<String, PackageBundles>,
}

impl BundleSet {
    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Number of real keys across all daily buckets.
    pub fn key_count(&self) -> usize {
        self.packages
            .values()
            .flat_map(|p| p.dates.values())
            .map(|d| d.daily.keys().len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.values().all(|p| p.dates.is_empty())
    }
}

pub struct KeyBundler {
    config: BundlingConfig,
    seed: Vec<u8>,
    today: NaiveDate,
}

impl KeyBundler {
    /// `today` is the distribution date; only keys dated strictly before it
    /// are published.
    pub fn new(config: BundlingConfig, today: NaiveDate) -> Result<Self, BundlerError> {
        config.validate()?;
        let seed = hex::decode(&config.padding_seed)?;
        Ok(Self {
            config,
            seed,
            today,
        })
    }

    /// Earliest date still distributed.
    pub fn cutoff(&self) -> NaiveDate {
        self.today - Days::new(u64::from(self.config.retention_days))
    }

    pub fn bundle<I>(&self, keys: I) -> Result<BundleSet, BundlerError>
    where
        I: IntoIterator<Item = DiagnosisKey>,
    {
        let cutoff = self.cutoff();
        let supported: BTreeSet<&str> = self
            .config
            .supported_countries
            .iter()
            .map(String::as_str)
            .collect();

        let mut by_package: BTreeMap<String, BTreeMap<NaiveDate, Vec<DiagnosisKey>>> =
            BTreeMap::new();
        for name in &supported {
            by_package.entry(name.to_string()).or_default();
        }
        if let Some(union) = &self.config.union_package {
            by_package.entry(union.clone()).or_default();
        }

        let (mut withheld, mut expired, mut unsupported) = (0usize, 0usize, 0usize);
        let mut earliest: Option<NaiveDate> = None;

        for key in keys {
            let date = key.date();
            if date >= self.today {
                withheld += 1;
                continue;
            }
            if date < cutoff {
                expired += 1;
                continue;
            }
            let targets = self.packages_for(&key, &supported);
            if targets.is_empty() {
                unsupported += 1;
                continue;
            }

            earliest = Some(earliest.map_or(date, |e| e.min(date)));
            for package in targets {
                by_package
                    .entry(package)
                    .or_default()
                    .entry(date)
                    .or_default()
                    .push(key.clone());
            }
        }

        if withheld + expired + unsupported > 0 {
            tracing::info!(
                withheld,
                expired,
                unsupported,
                "keys excluded from distribution"
            );
        }

        let dates: Vec<NaiveDate> = match earliest {
            Some(first) => first
                .iter_days()
                .take_while(|d| *d < self.today)
                .collect(),
            None => Vec::new(),
        };

        let padding = PaddingGenerator::new(
            self.config.padding,
            &self.seed,
            self.config.padding_transmission_risk_level,
        );

        let mut set = BundleSet::default();
        for (package, mut keys_by_date) in by_package {
            let mut bundles = PackageBundles::default();
            for date in &dates {
                let keys = keys_by_date.remove(date).unwrap_or_default();
                let day = self.date_bundles(&package, *date, keys, &padding)?;
                bundles.dates.insert(*date, day);
            }
            set.packages.insert(package, bundles);
        }

        tracing::debug!(
            packages = set.packages.len(),
            dates = dates.len(),
            keys = set.key_count(),
            "bundled diagnosis keys"
        );
        Ok(set)
    }

    /// Packages a key is published in: its origin and, if enabled, every
    /// visited country, restricted to the supported ones; plus the union
    /// package when any of those matched.
    fn packages_for(&self, key: &DiagnosisKey, supported: &BTreeSet<&str>) -> BTreeSet<String> {
        let visited = self
            .config
            .include_visited_countries
            .then(|| key.visited_countries())
            .unwrap_or_default();
        let mut targets: BTreeSet<String> = std::iter::once(key.origin_country())
            .chain(visited.iter().map(String::as_str))
            .filter(|country| supported.is_empty() || supported.contains(country))
            .map(str::to_string)
            .collect();
        if let Some(union) = &self.config.union_package {
            if !targets.is_empty() {
                targets.insert(union.clone());
            }
        }
        targets
    }

    fn date_bundles(
        &self,
        package: &str,
        date: NaiveDate,
        keys: Vec<DiagnosisKey>,
        padding: &PaddingGenerator<'_>,
    ) -> Result<DateBundles, BundlerError> {
        let mut by_hour: BTreeMap<u32, Vec<DiagnosisKey>> = BTreeMap::new();
        for key in &keys {
            by_hour.entry(key.hour()).or_default().push(key.clone());
        }

        let mut hours = BTreeMap::new();
        for (hour, hour_keys) in by_hour {
            if hour_keys.len() < self.config.min_keys_per_hour {
                tracing::debug!(
                    package,
                    %date,
                    hour,
                    keys = hour_keys.len(),
                    "hour bucket below floor, folded into daily bucket"
                );
                continue;
            }
            let window = Window::Hour(date, hour);
            let pad = padding.padding_for(package, &window, hour_keys.len())?;
            hours.insert(hour, KeyBundle::new(package, window, hour_keys).with_padding(pad));
        }

        let window = Window::Day(date);
        let pad = padding.padding_for(package, &window, keys.len())?;
        let daily = KeyBundle::new(package, window, keys).with_padding(pad);

        Ok(DateBundles { daily, hours })
    }
}
