//! Best-effort file-type sniffing from header bytes, falling back to extension.

/// Broad media class, matching the `mime_type` column of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeClass {
	Image,
	Video,
	Audio,
	Other,
}

impl MimeClass {
	pub fn as_str(self) -> &'static str {
		match self {
			MimeClass::Image => "image",
			MimeClass::Video => "video",
			MimeClass::Audio => "audio",
			MimeClass::Other => "other",
		}
	}

	/// Files catalogued but not eligible for backup are anything outside image/video/audio.
	pub fn is_media(self) -> bool {
		!matches!(self, MimeClass::Other)
	}
}

/// Sniffs a MIME class and subtype (e.g. `(Image, "jpeg")`) from a file's header bytes,
/// falling back to its extension when the magic bytes are inconclusive.
pub fn sniff(head: &[u8], file_name: &str) -> (MimeClass, String) {
	sniff_magic(head).unwrap_or_else(|| sniff_extension(file_name))
}

fn sniff_magic(head: &[u8]) -> Option<(MimeClass, String)> {
	if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
		return Some((MimeClass::Image, "jpeg".into()));
	}
	if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
		return Some((MimeClass::Image, "png".into()));
	}
	if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
		return Some((MimeClass::Image, "gif".into()));
	}
	if head.starts_with(b"BM") {
		return Some((MimeClass::Image, "bmp".into()));
	}
	if head.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || head.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
		return Some((MimeClass::Image, "tiff".into()));
	}
	if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
		return Some((MimeClass::Image, "webp".into()));
	}
	if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WAVE" {
		return Some((MimeClass::Audio, "wav".into()));
	}
	if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"AVI " {
		return Some((MimeClass::Video, "avi".into()));
	}
	if head.starts_with(b"fLaC") {
		return Some((MimeClass::Audio, "flac".into()));
	}
	if head.starts_with(b"ID3") || (head.len() >= 2 && head[0] == 0xFF && (head[1] & 0xE0) == 0xE0) {
		return Some((MimeClass::Audio, "mp3".into()));
	}
	if head.starts_with(b"OggS") {
		return Some((MimeClass::Audio, "ogg".into()));
	}
	if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
		return Some((MimeClass::Video, "webm".into()));
	}
	if head.len() >= 12 && &head[4..8] == b"ftyp" {
		let brand = String::from_utf8_lossy(&head[8..12]).to_string();
		return Some(match brand.as_str() {
			"heic" | "heix" | "heis" | "hevc" | "mif1" | "msf1" => (MimeClass::Image, "heif".into()),
			b if b.starts_with("qt") => (MimeClass::Video, "quicktime".into()),
			_ => (MimeClass::Video, "mp4".into()),
		});
	}

	None
}

fn sniff_extension(file_name: &str) -> (MimeClass, String) {
	let ext = file_name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();

	match ext.as_str() {
		"jpg" | "jpeg" => (MimeClass::Image, "jpeg".into()),
		"png" => (MimeClass::Image, "png".into()),
		"heic" | "heif" => (MimeClass::Image, "heif".into()),
		"gif" => (MimeClass::Image, "gif".into()),
		"tif" | "tiff" => (MimeClass::Image, "tiff".into()),
		"bmp" => (MimeClass::Image, "bmp".into()),
		"webp" => (MimeClass::Image, "webp".into()),
		"cr2" | "nef" | "arw" | "dng" | "raf" | "orf" => (MimeClass::Image, "raw".into()),
		"mp4" | "m4v" => (MimeClass::Video, "mp4".into()),
		"mov" | "qt" => (MimeClass::Video, "quicktime".into()),
		"avi" => (MimeClass::Video, "avi".into()),
		"mkv" => (MimeClass::Video, "matroska".into()),
		"webm" => (MimeClass::Video, "webm".into()),
		"3gp" => (MimeClass::Video, "3gpp".into()),
		"mp3" => (MimeClass::Audio, "mp3".into()),
		"wav" => (MimeClass::Audio, "wav".into()),
		"flac" => (MimeClass::Audio, "flac".into()),
		"m4a" => (MimeClass::Audio, "m4a".into()),
		"ogg" | "oga" => (MimeClass::Audio, "ogg".into()),
		_ if ext.is_empty() => (MimeClass::Other, "unknown".into()),
		_ => (MimeClass::Other, ext),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sniffs_jpeg_by_magic_even_with_wrong_extension() {
		let head = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
		let (class, sub) = sniff(&head, "photo.txt");
		assert_eq!(class, MimeClass::Image);
		assert_eq!(sub, "jpeg");
	}

	#[test]
	fn falls_back_to_extension_for_unrecognised_magic() {
		let (class, sub) = sniff(b"not a real header", "clip.mov");
		assert_eq!(class, MimeClass::Video);
		assert_eq!(sub, "quicktime");
	}

	#[test]
	fn png_magic() {
		let head = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
		let (class, sub) = sniff(&head, "image.dat");
		assert_eq!(class, MimeClass::Image);
		assert_eq!(sub, "png");
	}

	#[test]
	fn unknown_extension_is_other() {
		let (class, _) = sniff(b"", "notes.txt");
		assert_eq!(class, MimeClass::Other);
		assert!(!class.is_media());
	}

	#[test]
	fn mp4_ftyp_box() {
		let mut head = vec![0, 0, 0, 0x18];
		head.extend_from_slice(b"ftyp");
		head.extend_from_slice(b"isom");
		let (class, sub) = sniff(&head, "clip.bin");
		assert_eq!(class, MimeClass::Video);
		assert_eq!(sub, "mp4");
	}
}
