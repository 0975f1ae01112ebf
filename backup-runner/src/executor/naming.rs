//! Archive file naming: `{base}_{YYYYMMDDThhmmssZ}.{ext}` in UTC.
//!
//! Names sort by base name first, then by creation time. Existing files are
//! never consulted; whole-second resolution is the only collision guard.

use chrono::{DateTime, Utc};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Source of the instant an archive is stamped with.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

pub fn archive_file_name(base: &str, now: DateTime<Utc>, extension: &str) -> String {
    format!("{}_{}.{}", base, timestamp(now), extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_is_fixed_width() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 5, 4, 9).unwrap();
        assert_eq!(timestamp(now), "20240307T050409Z");
        assert_eq!(
            archive_file_name("Pictures", now, "tar.gz"),
            "Pictures_20240307T050409Z.tar.gz"
        );
    }

    #[test]
    fn test_deterministic() {
        let now = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            archive_file_name("Old", now, "tar.gz"),
            archive_file_name("Old", now, "tar.gz")
        );
    }

    #[test]
    fn test_names_sort_by_base_then_time() {
        let early = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut names = vec![
            archive_file_name("SSHKeys", late, "tar.gz"),
            archive_file_name("Pictures", late, "tar.gz"),
            archive_file_name("SSHKeys", early, "tar.gz"),
            archive_file_name("Pictures", early, "tar.gz"),
        ];
        names.sort();

        assert_eq!(
            names,
            vec![
                "Pictures_20231231T235959Z.tar.gz",
                "Pictures_20240101T000000Z.tar.gz",
                "SSHKeys_20231231T235959Z.tar.gz",
                "SSHKeys_20240101T000000Z.tar.gz",
            ]
        );
    }

    #[test]
    fn test_sub_second_instants_collide() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(900);
        assert_eq!(archive_file_name("X", a, "tar.gz"), archive_file_name("X", b, "tar.gz"));
    }
}
