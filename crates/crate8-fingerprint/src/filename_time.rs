//! Filename-derived capture-time heuristics.
//!
//! Archivers routinely lose EXIF data to re-encoding and downloads, but keep a
//! date baked into the file or directory name: `IMG_20210615_100000.jpg`,
//! `2021-06-15_10-00-00.jpg`, or a `2021/06/15/` directory path. This module
//! tries a handful of common shapes, in order of specificity, and bounds the
//! result to a plausible camera-era range so that incidental numbers (a phone
//! model, a resolution) don't get mistaken for a date.

use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

/// Earliest year accepted as a plausible capture date.
const YEAR_MIN: i32 = 1990;
/// How far into the future a capture date may plausibly sit, to tolerate clock skew.
const YEAR_MAX_SLACK: i32 = 3;

fn date_time_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"(\d{4})[-_](\d{2})[-_](\d{2}).{1,4}?(\d{2})\D(\d{2})\D(\d{2})").unwrap()
	})
}

fn date_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"(\d{4})[-_](\d{2})[-_](\d{2})").unwrap())
}

fn date_path_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"(\d{4})/(\d{1,2})(?:/(\d{1,2}))?").unwrap())
}

fn compact_date_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"(202[0-9]|201[0-9]|200[0-9]|19[0-9]{2})(1[0-2]|0[1-9])(3[01]|[0-2][0-9])").unwrap()
	})
}

fn year_in_bounds(year: i32) -> bool {
	let year_max = Utc::now().format("%Y").to_string().parse::<i32>().unwrap_or(YEAR_MIN) + YEAR_MAX_SLACK;
	(YEAR_MIN..=year_max).contains(&year)
}

fn ymd(y: i32, mo: u32, d: u32) -> Option<NaiveDate> {
	if !year_in_bounds(y) {
		return None;
	}
	NaiveDate::from_ymd_opt(y, mo, d)
}

/// Tries, in order of specificity, to find a plausible capture time encoded in a
/// string: a full timestamp (`2021-06-15_10-00-00`), a plain date
/// (`2021-06-15`), a date-shaped directory path (`2021/06/15`), or a compact
/// date (`20210615`). Returns `None` if nothing in range matches.
pub fn time_from_name(s: &str) -> Option<DateTime<Utc>> {
	if let Some(caps) = date_time_re().captures(s) {
		let y: i32 = caps[1].parse().ok()?;
		let mo: u32 = caps[2].parse().ok()?;
		let d: u32 = caps[3].parse().ok()?;
		let h: u32 = caps[4].parse().ok()?;
		let mi: u32 = caps[5].parse().ok()?;
		let se: u32 = caps[6].parse().ok()?;
		if let Some(date) = ymd(y, mo, d) {
			if let Some(naive) = date.and_hms_opt(h, mi, se) {
				return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
			}
		}
	}

	if let Some(caps) = date_re().captures(s) {
		let y: i32 = caps[1].parse().ok()?;
		let mo: u32 = caps[2].parse().ok()?;
		let d: u32 = caps[3].parse().ok()?;
		if let Some(date) = ymd(y, mo, d) {
			return Some(DateTime::<Utc>::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0)?, Utc));
		}
	}

	if let Some(caps) = date_path_re().captures(s) {
		let y: i32 = caps[1].parse().ok()?;
		let mo: u32 = caps[2].parse().ok()?;
		let d: u32 = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(1);
		if let Some(date) = ymd(y, mo, d) {
			return Some(DateTime::<Utc>::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0)?, Utc));
		}
	}

	if let Some(caps) = compact_date_re().captures(s) {
		let y: i32 = caps[1].parse().ok()?;
		let mo: u32 = caps[2].parse().ok()?;
		let d: u32 = caps[3].parse().ok()?;
		if let Some(date) = ymd(y, mo, d) {
			return Some(DateTime::<Utc>::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0)?, Utc));
		}
	}

	None
}

/// Tries the full path and the basename independently, returning the earlier of
/// the two when both yield a time. A directory named `2021/` holding a file named
/// `20210615_whatever.jpg` with a mismatched date should prefer the more specific
/// (and usually more trustworthy) basename match when it predates the path match.
pub fn best_filename_time(path: &Path) -> Option<DateTime<Utc>> {
	let full = path.to_string_lossy();
	let base = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

	let full_time = time_from_name(&full);
	let base_time = time_from_name(&base);

	match (full_time, base_time) {
		(Some(a), Some(b)) => Some(a.min(b)),
		(Some(a), None) => Some(a),
		(None, Some(b)) => Some(b),
		(None, None) => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_full_timestamp() {
		let dt = time_from_name("IMG_2021-06-15_10-30-45.jpg").unwrap();
		assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2021-06-15 10:30:45");
	}

	#[test]
	fn parses_plain_date() {
		let dt = time_from_name("vacation-2019_12_25-beach.png").unwrap();
		assert_eq!(dt.format("%Y-%m-%d").to_string(), "2019-12-25");
	}

	#[test]
	fn parses_compact_date() {
		let dt = time_from_name("IMG_20180304_142233.jpg").unwrap();
		assert_eq!(dt.format("%Y-%m-%d").to_string(), "2018-03-04");
	}

	#[test]
	fn parses_date_shaped_path() {
		let dt = time_from_name("archive/2017/08/03/snap.jpg").unwrap();
		assert_eq!(dt.format("%Y-%m-%d").to_string(), "2017-08-03");
	}

	#[test]
	fn rejects_out_of_range_year() {
		assert!(time_from_name("spec-1969-01-01.txt").is_none());
		assert!(time_from_name("model-3000-01-01.txt").is_none());
	}

	#[test]
	fn ignores_non_dates() {
		assert!(time_from_name("DSC04213.jpg").is_none());
		assert!(time_from_name("IMG_1234.jpg").is_none());
	}

	#[test]
	fn best_filename_time_prefers_earlier_of_path_and_basename() {
		let path = Path::new("photos/2022/01/01/IMG_20210615_100000.jpg");
		let dt = best_filename_time(path).unwrap();
		assert_eq!(dt.format("%Y-%m-%d").to_string(), "2021-06-15");
	}
}
