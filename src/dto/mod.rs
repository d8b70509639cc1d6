use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::state::match_state::EpochMillis;

pub mod health;
pub mod matches;
pub mod sse;
pub mod sync;

fn format_epoch_millis(millis: EpochMillis) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_millis_render_as_rfc3339() {
        assert_eq!(format_epoch_millis(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_epoch_millis(1_500), "1970-01-01T00:00:01.5Z");
    }
}
