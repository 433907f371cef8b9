//! Path and sizing rules for stored site images.

/// Pixels at or above this alpha are treated as fully opaque.
pub const OPAQUE_ALPHA_THRESHOLD: u8 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredFormat {
    Jpeg,
    Png,
}

impl StoredFormat {
    /// Recognise an optimizable image from its object path.
    pub fn from_path(path: &str) -> Option<Self> {
        let (_, extension) = path.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

pub fn is_protected(path: &str, protected_prefixes: &[String]) -> bool {
    protected_prefixes
        .iter()
        .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
}

/// Swap the extension of `path` for the one matching `format`.
pub fn path_with_format(path: &str, format: StoredFormat) -> String {
    let stem = match path.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() && !stem.ends_with('/') => stem,
        _ => path,
    };
    format!("{stem}.{}", format.extension())
}

/// Dimensions that fit inside `max_dimension` while keeping the aspect ratio.
/// Returns `None` when the image already fits; images are never upscaled.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if width <= max_dimension && height <= max_dimension {
        return None;
    }

    let scale = f64::from(max_dimension) / f64::from(width.max(height));
    let scaled = |value: u32| ((f64::from(value) * scale).round() as u32).max(1);
    Some((scaled(width), scaled(height)))
}

/// Whether shrinking `before` to `after` saves strictly more than `min_percent`.
pub fn savings_exceed(before: u64, after: u64, min_percent: u8) -> bool {
    if before == 0 || after >= before {
        return false;
    }
    let saved = before - after;
    saved * 100 > before * u64::from(min_percent)
}
