//! Cache Category Module
//!
//! The closed set of subsystems sharing the cache, each with its own default
//! TTL and entry quota.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

// == Cache Category ==
/// Logical partition of the cache.
///
/// Keys are unique within a category; the category also names the disk
/// subdirectory its persisted entries live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheCategory {
    PrayerTimes,
    QiblaDirections,
    IslamicContent,
    UserPreferences,
    LocationData,
    ApiResponses,
    MagneticDeclination,
    CalendarEvents,
    TrackingHistory,
    TemporaryData,
}

impl CacheCategory {
    /// Every category, in declaration order.
    pub const ALL: [CacheCategory; 10] = [
        CacheCategory::PrayerTimes,
        CacheCategory::QiblaDirections,
        CacheCategory::IslamicContent,
        CacheCategory::UserPreferences,
        CacheCategory::LocationData,
        CacheCategory::ApiResponses,
        CacheCategory::MagneticDeclination,
        CacheCategory::CalendarEvents,
        CacheCategory::TrackingHistory,
        CacheCategory::TemporaryData,
    ];

    /// Categories dropped wholesale on memory pressure, lowest priority first.
    pub const PRESSURE_ORDER: [CacheCategory; 2] =
        [CacheCategory::TemporaryData, CacheCategory::ApiResponses];

    /// Stable identifier used in qualified keys and directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::PrayerTimes => "prayerTimes",
            CacheCategory::QiblaDirections => "qiblaDirections",
            CacheCategory::IslamicContent => "islamicContent",
            CacheCategory::UserPreferences => "userPreferences",
            CacheCategory::LocationData => "locationData",
            CacheCategory::ApiResponses => "apiResponses",
            CacheCategory::MagneticDeclination => "magneticDeclination",
            CacheCategory::CalendarEvents => "calendarEvents",
            CacheCategory::TrackingHistory => "trackingHistory",
            CacheCategory::TemporaryData => "temporaryData",
        }
    }

    /// Parses the identifier produced by [`CacheCategory::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// TTL applied when `store` is called without an override.
    pub fn default_ttl(&self) -> Duration {
        let secs = match self {
            CacheCategory::PrayerTimes => 7 * DAY,
            CacheCategory::QiblaDirections => 30 * DAY,
            CacheCategory::IslamicContent => 7 * DAY,
            CacheCategory::UserPreferences => 365 * DAY,
            CacheCategory::LocationData => DAY,
            CacheCategory::ApiResponses => HOUR,
            CacheCategory::MagneticDeclination => 30 * DAY,
            CacheCategory::CalendarEvents => 30 * DAY,
            CacheCategory::TrackingHistory => 7 * DAY,
            CacheCategory::TemporaryData => 5 * MINUTE,
        };
        Duration::from_secs(secs)
    }

    /// Maximum number of live entries this category may hold.
    pub fn max_entries(&self) -> usize {
        match self {
            CacheCategory::PrayerTimes => 60,
            CacheCategory::QiblaDirections => 100,
            CacheCategory::IslamicContent => 200,
            CacheCategory::UserPreferences => 50,
            CacheCategory::LocationData => 100,
            CacheCategory::ApiResponses => 200,
            CacheCategory::MagneticDeclination => 50,
            CacheCategory::CalendarEvents => 100,
            CacheCategory::TrackingHistory => 500,
            CacheCategory::TemporaryData => 100,
        }
    }

    /// Builds the category-prefixed key, `category + "_" + key`.
    pub fn qualify(&self, key: &str) -> String {
        format!("{}_{}", self.as_str(), key)
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
