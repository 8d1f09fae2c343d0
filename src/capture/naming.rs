//! Output file naming.
//!
//! Stills and clips are named after their capture time,
//! `yyyy-MM-dd-HH-mm-ss-SSS`, in local time, with a `.jpg` or `.mp4`
//! extension. Every field is zero-padded, so lexical order of names is
//! chronological order.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::path::{Path, PathBuf};

/// `chrono` format string for the file stem.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%3f";

/// Kind of artifact written by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video clip.
    Video,
}

impl MediaKind {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }
}

/// Builds the file name for an artifact captured at `at`.
pub fn file_name<Tz: TimeZone>(kind: MediaKind, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}.{}", at.format(TIMESTAMP_FORMAT), kind.extension())
}

/// Builds the output path for an artifact captured now, under `dir`.
pub fn output_path(dir: &Path, kind: MediaKind) -> PathBuf {
    dir.join(file_name(kind, &Local::now()))
}

/// Parses the capture time back out of a file name produced by [`file_name`].
///
/// Returns `None` for names that do not follow the pattern or carry the wrong
/// extension for `kind`.
pub fn parse_file_name(kind: MediaKind, name: &str) -> Option<NaiveDateTime> {
    let stem = name.strip_suffix(kind.extension())?.strip_suffix('.')?;
    // Fixed width: 10 date + 1 + 8 time + 1 + 3 millis, all separated by '-'.
    if stem.len() != 23 {
        return None;
    }
    NaiveDateTime::parse_from_str(stem, TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use proptest::prelude::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> DateTime<Utc> {
        let naive = NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_milli_opt(h, mi, s, ms)
            .unwrap();
        Utc.from_utc_datetime(&naive)
    }

    #[test]
    fn test_video_name_format() {
        let name = file_name(MediaKind::Video, &at(2024, 3, 7, 9, 5, 2, 45));
        assert_eq!(name, "2024-03-07-09-05-02-045.mp4");
    }

    #[test]
    fn test_image_name_format() {
        let name = file_name(MediaKind::Image, &at(2023, 12, 31, 23, 59, 59, 999));
        assert_eq!(name, "2023-12-31-23-59-59-999.jpg");
    }

    #[test]
    fn test_parse_rejects_wrong_extension() {
        assert!(parse_file_name(MediaKind::Image, "2024-03-07-09-05-02-045.mp4").is_none());
        assert!(parse_file_name(MediaKind::Video, "2024-03-07-09-05-02-045.mp4").is_some());
        assert!(parse_file_name(MediaKind::Video, "clip.mp4").is_none());
        assert!(parse_file_name(MediaKind::Video, "2024-03-07-09-05-02-45.mp4").is_none());
    }

    #[test]
    fn test_output_path_under_dir() {
        let path = output_path(Path::new("/data/clips"), MediaKind::Video);
        assert_eq!(path.parent(), Some(Path::new("/data/clips")));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(parse_file_name(MediaKind::Video, name).is_some());
    }

    proptest! {
        #[test]
        fn names_sort_chronologically(
            a in 0i64..4_000_000_000_000,
            b in 0i64..4_000_000_000_000,
        ) {
            let ta = Utc.timestamp_millis_opt(a).unwrap();
            let tb = Utc.timestamp_millis_opt(b).unwrap();
            let na = file_name(MediaKind::Video, &ta);
            let nb = file_name(MediaKind::Video, &tb);
            prop_assert_eq!(na.cmp(&nb), ta.cmp(&tb));
        }

        #[test]
        fn names_carry_millisecond_time(millis in 0i64..4_000_000_000_000) {
            let t = Utc.timestamp_millis_opt(millis).unwrap();
            let name = file_name(MediaKind::Image, &t);
            prop_assert_eq!(parse_file_name(MediaKind::Image, &name), Some(t.naive_utc()));
        }
    }
}
