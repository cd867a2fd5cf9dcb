//! EXIF/container metadata extraction via an external `exiftool` process, with a
//! content-addressed on-disk cache so a file's metadata is only ever extracted once.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::error::ExifError;
use crate::fingerprint::Fingerprint;

/// A handle to the `exiftool` binary, resolved once per worker. If the binary
/// can't be found on `PATH`, the handle is still constructed but every call to
/// [`ExifTool::run`] returns `Ok(None)` rather than erroring: metadata extraction
/// is a best-effort enrichment, not a prerequisite for indexing a file.
pub struct ExifTool {
	bin: Option<PathBuf>,
}

impl ExifTool {
	/// Resolves `bin_name` against `PATH`.
	pub fn discover(bin_name: &str) -> Self {
		let bin = which_on_path(bin_name);
		if bin.is_none() {
			tracing::warn!(bin_name, "exiftool not found on PATH; metadata extraction disabled");
		}
		Self { bin }
	}

	pub fn is_available(&self) -> bool {
		self.bin.is_some()
	}

	/// Runs `exiftool -n -j <path>` and returns the first (only) object of its
	/// JSON array output, or `None` if the tool is unavailable or exits non-zero
	/// (corrupt file, unsupported format — not worth failing the whole index run).
	#[tracing::instrument(level = "debug", skip(self), fields(path = %path.display()))]
	pub fn run(&self, path: &Path) -> Result<Option<RawExifToolOutput>, ExifError> {
		let Some(bin) = &self.bin else {
			return Ok(None);
		};

		let output = duct::cmd(
			bin,
			["-n", "-j", "-api", "LargeFileSupport=1", &path.to_string_lossy()],
		)
		.stdout_capture()
		.stderr_capture()
		.unchecked()
		.run()
		.map_err(|source| ExifError::Spawn { path: path.to_path_buf(), source })?;

		if !output.status.success() {
			tracing::debug!(status = ?output.status, "exiftool exited non-zero");
			return Ok(None);
		}

		let mut values: Vec<RawExifToolOutput> = serde_json::from_slice(&output.stdout)
			.map_err(|source| ExifError::Parse { path: path.to_path_buf(), source })?;
		Ok(values.pop())
	}
}

fn which_on_path(bin_name: &str) -> Option<PathBuf> {
	let path_var = std::env::var_os("PATH")?;
	std::env::split_paths(&path_var).find_map(|dir| {
		let candidate = dir.join(bin_name);
		candidate.is_file().then_some(candidate)
	})
}

/// Subset of `exiftool -j` output fields this archiver reads. Deliberately
/// tolerant: every field is optional, since tag availability varies wildly by
/// format and by file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExifToolOutput {
	#[serde(rename = "MIMEType")]
	pub mime_type: Option<String>,
	#[serde(rename = "DateTimeOriginal")]
	pub date_time_original: Option<String>,
	#[serde(rename = "CreateDate")]
	pub create_date: Option<String>,
	#[serde(rename = "MediaCreateDate")]
	pub media_create_date: Option<String>,
	#[serde(rename = "OffsetTimeOriginal")]
	pub offset_time_original: Option<String>,
	#[serde(rename = "OffsetTime")]
	pub offset_time: Option<String>,
	#[serde(rename = "TimeZone")]
	pub time_zone: Option<String>,
	#[serde(rename = "ImageWidth")]
	pub width: Option<u32>,
	#[serde(rename = "ImageHeight")]
	pub height: Option<u32>,
}

/// A resolved capture time together with the timezone name it was resolved against,
/// kept for the audit trail (`files.info`) rather than re-derived on every read.
#[derive(Debug, Clone)]
pub struct CaptureTime {
	pub utc: DateTime<Utc>,
	pub time_zone_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
	pub capture_time: Option<CaptureTime>,
	pub mime_type: Option<String>,
	pub width: Option<u32>,
	pub height: Option<u32>,
}

/// Path the JSON metadata cache for `fingerprint` lives at, under `cache_root`.
/// Sharded by the first two hex characters, matching the catalog's own sharding
/// convention, to keep any one cache directory from accumulating too many entries.
pub fn cache_path(cache_root: &Path, fingerprint: Fingerprint) -> PathBuf {
	let hex = fingerprint.to_hex();
	cache_root.join("json").join(&hex[0..2]).join(format!("{hex}_exiftool.json"))
}

/// Extracts capture time and basic dimensions for a file, consulting and
/// populating the content-addressed cache at `cache_root` so a given fingerprint
/// is only ever run through `exiftool` once. `default_zone` is used when neither
/// an explicit offset nor an embedded timezone name is present in the metadata.
#[tracing::instrument(level = "debug", skip(tool, default_zone), fields(path = %path.display(), %fingerprint))]
pub fn extract(
	tool: &ExifTool,
	path: &Path,
	fingerprint: Fingerprint,
	cache_root: &Path,
	default_zone: &Tz,
) -> Result<ExtractionResult, ExifError> {
	let cache_file = cache_path(cache_root, fingerprint);

	let raw = if cache_file.is_file() {
		let bytes = std::fs::read(&cache_file)
			.map_err(|source| ExifError::CacheRead { path: cache_file.clone(), source })?;
		serde_json::from_slice::<RawExifToolOutput>(&bytes).ok()
	} else {
		let result = tool.run(path)?;
		if let Some(parsed) = &result {
			if capture_year(parsed).map(|y| y >= 1900).unwrap_or(false) {
				if let Some(parent) = cache_file.parent() {
					let _ = std::fs::create_dir_all(parent);
				}
				if let Ok(bytes) = serde_json::to_vec(parsed) {
					let _ = std::fs::write(&cache_file, bytes);
				}
			}
		}
		result
	};

	let Some(raw) = raw else {
		return Ok(ExtractionResult::default());
	};

	Ok(ExtractionResult {
		capture_time: resolve_capture_time(&raw, default_zone),
		mime_type: raw.mime_type.clone(),
		width: raw.width,
		height: raw.height,
	})
}

fn capture_year(raw: &RawExifToolOutput) -> Option<i32> {
	let s = raw
		.date_time_original
		.as_deref()
		.or(raw.create_date.as_deref())
		.or(raw.media_create_date.as_deref())?;
	s.get(0..4)?.parse().ok()
}

/// Resolves a capture time following the priority order: an explicit embedded
/// UTC offset wins outright; otherwise MP4/QuickTime container times are assumed
/// to already be UTC (per the format spec, unlike most still-image EXIF); otherwise
/// an embedded timezone *name* (rather than a raw offset) is used; otherwise the
/// caller-supplied default zone applies.
fn resolve_capture_time(raw: &RawExifToolOutput, default_zone: &Tz) -> Option<CaptureTime> {
	let candidate = raw
		.date_time_original
		.as_deref()
		.or(raw.create_date.as_deref())
		.or(raw.media_create_date.as_deref())?;

	let (naive, embedded_offset) = parse_exiftool_datetime(candidate)?;

	let explicit_offset = embedded_offset.or_else(|| {
		raw.offset_time_original
			.as_deref()
			.or(raw.offset_time.as_deref())
			.and_then(parse_offset_string)
	});

	if let Some(offset) = explicit_offset {
		let dt = offset.from_local_datetime(&naive).single()?;
		return Some(CaptureTime { utc: dt.with_timezone(&Utc), time_zone_name: Some(offset.to_string()) });
	}

	let is_quicktime_container = matches!(
		raw.mime_type.as_deref(),
		Some(m) if m.eq_ignore_ascii_case("video/mp4") || m.eq_ignore_ascii_case("video/quicktime")
	);
	if is_quicktime_container {
		return Some(CaptureTime {
			utc: DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc),
			time_zone_name: Some("UTC".to_string()),
		});
	}

	if let Some(tz) = raw.time_zone.as_deref().and_then(|s| s.parse::<Tz>().ok()) {
		let dt = tz.from_local_datetime(&naive).single()?;
		return Some(CaptureTime { utc: dt.with_timezone(&Utc), time_zone_name: Some(tz.name().to_string()) });
	}

	let dt = default_zone.from_local_datetime(&naive).single()?;
	Some(CaptureTime { utc: dt.with_timezone(&Utc), time_zone_name: Some(default_zone.name().to_string()) })
}

fn exif_dt_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"^(\d{4}):(\d{2}):(\d{2})\s(\d{2}):(\d{2}):(\d{2})(?:([+-])(\d{2}):?(\d{2})?)?").unwrap()
	})
}

fn offset_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"^([+-])(\d{2}):?(\d{2})?$").unwrap())
}

/// Parses exiftool's `-n` datetime form, `YYYY:MM:DD HH:MM:SS[+-]HH:MM`, returning
/// the naive timestamp and an embedded offset if one is present.
fn parse_exiftool_datetime(s: &str) -> Option<(chrono::NaiveDateTime, Option<FixedOffset>)> {
	let caps = exif_dt_re().captures(s)?;
	let y: i32 = caps[1].parse().ok()?;
	let mo: u32 = caps[2].parse().ok()?;
	let d: u32 = caps[3].parse().ok()?;
	let h: u32 = caps[4].parse().ok()?;
	let mi: u32 = caps[5].parse().ok()?;
	let se: u32 = caps[6].parse().ok()?;
	let naive = NaiveDate::from_ymd_opt(y, mo, d)?.and_hms_opt(h, mi, se)?;

	let offset = match caps.get(7) {
		Some(sign) => {
			let oh: i32 = caps[8].parse().ok()?;
			let om: i32 = caps.get(9).map(|m| m.as_str()).unwrap_or("0").parse().unwrap_or(0);
			let total = (oh * 3600 + om * 60) * if sign.as_str() == "-" { -1 } else { 1 };
			FixedOffset::east_opt(total)
		}
		None => None,
	};

	Some((naive, offset))
}

fn parse_offset_string(s: &str) -> Option<FixedOffset> {
	let caps = offset_re().captures(s.trim())?;
	let oh: i32 = caps[2].parse().ok()?;
	let om: i32 = caps.get(3).map(|m| m.as_str()).unwrap_or("0").parse().unwrap_or(0);
	let total = (oh * 3600 + om * 60) * if &caps[1] == "-" { -1 } else { 1 };
	FixedOffset::east_opt(total)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn raw(date_time_original: Option<&str>, mime: Option<&str>) -> RawExifToolOutput {
		RawExifToolOutput {
			mime_type: mime.map(String::from),
			date_time_original: date_time_original.map(String::from),
			..Default::default()
		}
	}

	#[test]
	fn explicit_offset_wins() {
		let mut r = raw(Some("2021:06:15 10:00:00+08:00"), Some("image/jpeg"));
		r.offset_time_original = None;
		let tokyo: Tz = "Asia/Tokyo".parse().unwrap();
		let resolved = resolve_capture_time(&r, &tokyo).unwrap();
		assert_eq!(resolved.utc.format("%Y-%m-%d %H:%M:%S").to_string(), "2021-06-15 02:00:00");
	}

	#[test]
	fn quicktime_container_implies_utc() {
		let r = raw(Some("2021:06:15 10:00:00"), Some("video/quicktime"));
		let tokyo: Tz = "Asia/Tokyo".parse().unwrap();
		let resolved = resolve_capture_time(&r, &tokyo).unwrap();
		assert_eq!(resolved.utc.format("%Y-%m-%d %H:%M:%S").to_string(), "2021-06-15 10:00:00");
		assert_eq!(resolved.time_zone_name.as_deref(), Some("UTC"));
	}

	#[test]
	fn embedded_timezone_name_used_over_default() {
		let mut r = raw(Some("2021:06:15 10:00:00"), Some("image/jpeg"));
		r.time_zone = Some("Australia/Sydney".to_string());
		let utc: Tz = "UTC".parse().unwrap();
		let resolved = resolve_capture_time(&r, &utc).unwrap();
		assert_eq!(resolved.time_zone_name.as_deref(), Some("Australia/Sydney"));
	}

	#[test]
	fn falls_back_to_default_zone() {
		let r = raw(Some("2021:06:15 10:00:00"), Some("image/jpeg"));
		let sydney: Tz = "Australia/Sydney".parse().unwrap();
		let resolved = resolve_capture_time(&r, &sydney).unwrap();
		assert_eq!(resolved.time_zone_name.as_deref(), Some("Australia/Sydney"));
	}

	#[test]
	fn no_datetime_fields_yields_none() {
		let r = raw(None, Some("image/jpeg"));
		let utc: Tz = "UTC".parse().unwrap();
		assert!(resolve_capture_time(&r, &utc).is_none());
	}

	#[test]
	fn cache_path_is_sharded_by_fingerprint_prefix() {
		let root = Path::new("/cache");
		let fp = Fingerprint(0xabcd_0000_0000_0001);
		let path = cache_path(root, fp);
		assert_eq!(path, Path::new("/cache/json/ab/abcd000000000001_exiftool.json"));
	}
}
