use anyhow::{Context, Result};
use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

/// Display timezone, resolved once per run and threaded explicitly through
/// every conversion. No ambient zone state anywhere else in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneConfig {
    tz: Tz,
}

impl TimezoneConfig {
    /// Resolution chain: explicit override (the `timezone` config key) →
    /// `TZ` env var when it names an IANA zone → system zone → UTC.
    pub fn resolve(override_zone: Option<&str>) -> Self {
        if let Some(name) = override_zone {
            if let Ok(tz) = name.parse::<Tz>() {
                return Self { tz };
            }
            debug!("ignoring unknown timezone override: {name}");
        }

        if let Ok(name) = std::env::var("TZ") {
            if let Ok(tz) = name.parse::<Tz>() {
                return Self { tz };
            }
        }

        if let Ok(name) = iana_time_zone::get_timezone() {
            if let Ok(tz) = name.parse::<Tz>() {
                return Self { tz };
            }
        }

        Self { tz: Tz::UTC }
    }

    pub fn utc() -> Self {
        Self { tz: Tz::UTC }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let tz = name
            .parse::<Tz>()
            .ok()
            .with_context(|| format!("Unknown IANA timezone: {name}"))?;
        Ok(Self { tz })
    }

    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    /// Interpret `input` in this zone and return the UTC instant.
    ///
    /// Date-only strings (`YYYY-MM-DD`) mean local midnight; date-time
    /// strings (`YYYY-MM-DDTHH:MM[:SS]`, space separator also accepted)
    /// mean that exact local wall-clock time. Ambiguous wall-clock times
    /// (DST fall-back) take the first valid offset; times skipped by a DST
    /// spring-forward are an error.
    pub fn to_utc(&self, input: &str) -> Result<DateTime<Utc>> {
        let input = input.trim();

        if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            let midnight = date.and_time(NaiveTime::MIN);
            return self.local_to_utc(midnight);
        }

        let naive = parse_naive_datetime(input)
            .with_context(|| format!("Unrecognized date/time: {input}"))?;
        self.local_to_utc(naive)
    }

    /// Convert a UTC instant to this zone.
    pub fn to_local(&self, utc: DateTime<Utc>) -> DateTime<Tz> {
        utc.with_timezone(&self.tz)
    }

    /// Local calendar date of a UTC instant.
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        self.to_local(utc).date_naive()
    }

    /// `YYYY-MM-DD HH:MM` in this zone, the grid/window display format.
    pub fn format_local(&self, utc: DateTime<Utc>) -> String {
        self.to_local(utc).format("%Y-%m-%d %H:%M").to_string()
    }

    fn local_to_utc(&self, naive: NaiveDateTime) -> Result<DateTime<Utc>> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            // Fall-back ambiguity: first valid offset, per the zone database.
            LocalResult::Ambiguous(first, _) => Ok(first.with_timezone(&Utc)),
            LocalResult::None => anyhow::bail!(
                "Local time {naive} does not exist in {} (DST gap)",
                self.tz.name()
            ),
        }
    }
}

fn parse_naive_datetime(input: &str) -> Option<NaiveDateTime> {
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(dt);
        }
    }
    None
}

/// Parse a window bound that may carry its own offset (`...Z`, `...+02:00`).
/// Falls back to zone-local interpretation via [`TimezoneConfig::to_utc`].
pub fn parse_bound(input: &str, tz: &TimezoneConfig) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    tz.to_utc(input)
}
