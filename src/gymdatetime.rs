use std::fmt::{Display, Formatter};
use std::str::FromStr;
use chrono::{DateTime, Local, MappedLocalTime, NaiveDateTime, SubsecRound, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use crate::impl_sqlx_text_type_encode_decode;

const DB_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";
const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M";

/// UTC instant with seconds precision.
///
/// Stored as `YYYY-MM-DDTHH:MM:SSZ` text, so comparing the column text in SQL
/// orders instants chronologically.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct GymDateTime(pub DateTime<Utc>);

impl GymDateTime {
    pub fn now() -> Self {
        Self(Utc::now()).trimmed_to_sec()
    }
    pub fn trimmed_to_sec(self) -> Self {
        Self(self.0.trunc_subsecs(0))
    }
    pub fn checked_add(self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(delta).map(Self)
    }
    pub fn checked_sub(self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_sub_signed(delta).map(Self)
    }
    pub fn is_after(&self, other: &GymDateTime) -> bool {
        self.0 > other.0
    }
    /// Parses the value of an HTML `datetime-local` input, interpreted in the server's time zone.
    pub fn from_local_input(input: &str) -> anyhow::Result<Self> {
        let input = input.trim();
        let naive = NaiveDateTime::parse_from_str(input, INPUT_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S"))?;
        match Local.from_local_datetime(&naive) {
            MappedLocalTime::Single(dt) => Ok(Self(dt.with_timezone(&Utc)).trimmed_to_sec()),
            MappedLocalTime::Ambiguous(earliest, _) => Ok(Self(earliest.with_timezone(&Utc)).trimmed_to_sec()),
            MappedLocalTime::None => Err(anyhow::anyhow!("{input} does not exist in the local time zone")),
        }
    }
    pub fn to_local_input(self) -> String {
        self.0.with_timezone(&Local).format(INPUT_FORMAT).to_string()
    }
    pub fn to_display_string(self) -> String {
        self.0.with_timezone(&Local).format(DISPLAY_FORMAT).to_string()
    }
}

impl Display for GymDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(DB_FORMAT))
    }
}
impl FromStr for GymDateTime {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = DateTime::parse_from_rfc3339(s)?;
        Ok(Self(dt.with_timezone(&Utc)).trimmed_to_sec())
    }
}
impl From<DateTime<Utc>> for GymDateTime {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value).trimmed_to_sec()
    }
}
impl_sqlx_text_type_encode_decode!(GymDateTime);

/// Template helper value: stored text to local display, `---` when unset or unparsable.
pub(crate) fn dtstr(stored: Option<&str>) -> String {
    let Some(s) = stored else {
        return "---".to_string()
    };
    match s.parse::<GymDateTime>() {
        Ok(dt) => dt.to_display_string(),
        Err(_) => s.to_string(),
    }
}
pub(crate) fn dtinput(stored: Option<&str>) -> String {
    stored.and_then(|s| s.parse::<GymDateTime>().ok())
        .map(|dt| dt.to_local_input())
        .unwrap_or_default()
}
