use std::path::Path;

use uuid::Uuid;

pub const DEFAULT_IMAGE_EXT: &str = "jpg";

/// Declared content type names an image media type.
pub fn is_image(content_type: &str) -> bool {
    content_type
        .trim()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

fn ext_from_filename(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    let ok = !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    ok.then(|| ext.to_ascii_lowercase())
}

/// Random file name keeping the uploaded extension, else one derived from the
/// content type, else [`DEFAULT_IMAGE_EXT`].
pub fn unique_filename(original: Option<&str>, content_type: &str) -> String {
    let ext = original
        .and_then(ext_from_filename)
        .or_else(|| ext_from_mime(content_type).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXT.to_string());
    format!("{}.{}", Uuid::new_v4().simple(), ext)
}

/// Storage key prefix owned by one observation.
pub fn observation_prefix(observation_id: i64) -> String {
    observation_id.to_string()
}

pub fn object_key(observation_id: i64, filename: &str) -> String {
    format!("{}/{}", observation_prefix(observation_id), filename)
}

/// `<base_url>/<static_path>/<observation_id>/<filename>`.
pub fn public_url(base_url: &str, static_path: &str, observation_id: i64, filename: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = static_path.trim_matches('/');
    let key = object_key(observation_id, filename);
    if path.is_empty() {
        format!("{base}/{key}")
    } else {
        format!("{base}/{path}/{key}")
    }
}
