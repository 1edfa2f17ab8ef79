//! Conversions between the API's `time::OffsetDateTime` and the chrono-based
//! `DateTimeWithTimeZone` that Sea-ORM columns use.

use chrono::{DateTime, SubsecRound, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use time::OffsetDateTime;

use crate::error::{Error, Result};

/// Current instant as a UTC column value, at the microsecond precision
/// `timestamptz` keeps, so values handed back to callers match what a later
/// read returns.
pub(crate) fn now_db() -> DateTimeWithTimeZone {
    Utc::now().trunc_subsecs(6).fixed_offset()
}

/// Converts an API timestamp into a UTC column value.
pub(crate) fn to_db(time: OffsetDateTime) -> Result<DateTimeWithTimeZone> {
    DateTime::<Utc>::from_timestamp(time.unix_timestamp(), time.nanosecond())
        .map(|datetime| datetime.fixed_offset())
        .ok_or_else(|| Error::validation(format!("timestamp {time} is out of range")))
}

pub(crate) fn to_db_opt(time: Option<OffsetDateTime>) -> Result<Option<DateTimeWithTimeZone>> {
    time.map(to_db).transpose()
}

/// Converts a stored column value back into a UTC `OffsetDateTime`.
pub(crate) fn from_db(datetime: DateTimeWithTimeZone) -> Result<OffsetDateTime> {
    let seconds = OffsetDateTime::from_unix_timestamp(datetime.timestamp())
        .map_err(|e| Error::Decode(e.to_string()))?;
    seconds
        .replace_nanosecond(datetime.timestamp_subsec_nanos())
        .map_err(|e| Error::Decode(e.to_string()))
}

pub(crate) fn from_db_opt(datetime: Option<DateTimeWithTimeZone>) -> Result<Option<OffsetDateTime>> {
    datetime.map(from_db).transpose()
}
