//! Offline optimization pass over stored site images.
//!
//! Large JPEG and PNG objects are downscaled and recompressed. Opaque PNGs are
//! converted to JPEG, which changes their path; those renames are reported so
//! referencing content can be updated. Nothing is written unless the job runs
//! in [`RunMode::Apply`].

use std::collections::BTreeSet;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::storage::{ObjectStore, StorageError, StoredObject};
use crate::domain::images::{
    OPAQUE_ALPHA_THRESHOLD, StoredFormat, fit_within, is_protected, path_with_format,
    savings_exceed,
};

/// Images larger than this many pixels are refused before decoding.
const MAX_DECODED_PIXELS: u64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    DryRun,
    Apply,
}

impl RunMode {
    pub fn from_apply_flag(apply: bool) -> Self {
        if apply { Self::Apply } else { Self::DryRun }
    }

    pub fn is_apply(self) -> bool {
        matches!(self, Self::Apply)
    }
}

#[derive(Debug, Clone)]
pub struct OptimizeSettings {
    pub mode: RunMode,
    /// Only objects under this prefix are listed.
    pub prefix: String,
    /// Objects at or below this size are left alone.
    pub min_bytes: u64,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub min_savings_percent: u8,
    pub protected_prefixes: Vec<String>,
}

impl Default for OptimizeSettings {
    fn default() -> Self {
        Self {
            mode: RunMode::DryRun,
            prefix: String::new(),
            min_bytes: 200 * 1024,
            max_dimension: 1920,
            jpeg_quality: 82,
            min_savings_percent: 10,
            protected_prefixes: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("image header could not be read: {0}")]
    Probe(String),
    #[error("image is {width}x{height}, too large to decode")]
    TooLarge { width: u64, height: u64 },
    #[error("image could not be decoded: {0}")]
    Decode(#[source] image::ImageError),
    #[error("image could not be encoded: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image worker failed: {0}")]
    Worker(String),
    #[error("rename target `{0}` already exists")]
    RenameConflict(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Optimized {
        before: u64,
        after: u64,
        renamed_to: Option<String>,
    },
    /// The converted object was written but the original could not be
    /// removed. The rename still has to be reconciled; a later run finishes it.
    RenamedOriginalKept {
        before: u64,
        after: u64,
        renamed_to: String,
        reason: String,
    },
    InsufficientSavings {
        before: u64,
        after: u64,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub path: String,
    pub outcome: ItemOutcome,
}

impl fmt::Display for ItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::util::bytes::{format_bytes, percent_saved};

        match &self.outcome {
            ItemOutcome::Optimized {
                before,
                after,
                renamed_to,
            } => {
                write!(
                    f,
                    "optimized {} {} -> {} (-{}%)",
                    self.path,
                    format_bytes(*before),
                    format_bytes(*after),
                    percent_saved(*before, *after)
                )?;
                if let Some(target) = renamed_to {
                    write!(f, " (renamed to {target})")?;
                }
                Ok(())
            }
            ItemOutcome::RenamedOriginalKept {
                before,
                after,
                renamed_to,
                reason,
            } => write!(
                f,
                "optimized {} {} -> {} (renamed to {renamed_to}; original not removed: {reason})",
                self.path,
                format_bytes(*before),
                format_bytes(*after)
            ),
            ItemOutcome::InsufficientSavings { before, after } => write!(
                f,
                "skipped {} {} -> {} (savings below threshold)",
                self.path,
                format_bytes(*before),
                format_bytes(*after)
            ),
            ItemOutcome::Failed { reason } => write!(f, "failed {}: {reason}", self.path),
        }
    }
}

/// End-of-run totals. Byte totals cover optimized items only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    pub scanned: usize,
    pub optimized: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub renames: Vec<Rename>,
    /// Originals left behind after their converted copy was written.
    pub leftovers: Vec<String>,
}

impl OptimizeReport {
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }

    fn record(&mut self, item: &ItemReport) {
        match &item.outcome {
            ItemOutcome::Optimized {
                before,
                after,
                renamed_to,
            } => {
                self.optimized += 1;
                self.bytes_before += before;
                self.bytes_after += after;
                if let Some(target) = renamed_to {
                    self.renames.push(Rename {
                        from: item.path.clone(),
                        to: target.clone(),
                    });
                }
            }
            ItemOutcome::RenamedOriginalKept {
                before,
                after,
                renamed_to,
                ..
            } => {
                self.optimized += 1;
                self.bytes_before += before;
                self.bytes_after += after;
                self.renames.push(Rename {
                    from: item.path.clone(),
                    to: renamed_to.clone(),
                });
                self.leftovers.push(item.path.clone());
            }
            ItemOutcome::InsufficientSavings { .. } => self.skipped += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

impl fmt::Display for OptimizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::util::bytes::format_bytes;

        writeln!(
            f,
            "scanned {}, optimized {}, skipped {}, failed {}",
            self.scanned, self.optimized, self.skipped, self.failed
        )?;
        write!(
            f,
            "bytes {} -> {} (saved {})",
            format_bytes(self.bytes_before),
            format_bytes(self.bytes_after),
            format_bytes(self.bytes_saved())
        )?;
        if !self.renames.is_empty() {
            write!(f, "\nrenamed paths to update in content:")?;
            for rename in &self.renames {
                write!(f, "\n  {} -> {}", rename.from, rename.to)?;
            }
        }
        if !self.leftovers.is_empty() {
            write!(f, "\noriginals still present (rerun to remove):")?;
            for path in &self.leftovers {
                write!(f, "\n  {path}")?;
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ImageOptimizer {
    store: Arc<dyn ObjectStore>,
    settings: OptimizeSettings,
}

impl ImageOptimizer {
    pub fn new(store: Arc<dyn ObjectStore>, settings: OptimizeSettings) -> Self {
        Self { store, settings }
    }

    /// Run the pass, calling `on_item` after each candidate is processed.
    ///
    /// Only a failed listing aborts the run; per-object failures are reported
    /// and the pass moves on.
    pub async fn run<F>(&self, mut on_item: F) -> Result<OptimizeReport, StorageError>
    where
        F: FnMut(&ItemReport),
    {
        let objects = self.store.list(&self.settings.prefix).await?;
        let existing: BTreeSet<&str> = objects.iter().map(|object| object.path.as_str()).collect();
        let candidates = select_candidates(&objects, &self.settings);

        info!(
            target = "teebox::optimize",
            mode = ?self.settings.mode,
            listed = objects.len(),
            candidates = candidates.len(),
            "Starting image optimization"
        );

        let mut report = OptimizeReport {
            scanned: candidates.len(),
            ..OptimizeReport::default()
        };

        for (object, format) in candidates {
            let outcome = match self.process(object, format, &existing).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        target = "teebox::optimize",
                        path = %object.path,
                        error = %err,
                        "Image optimization failed; skipping"
                    );
                    ItemOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };

            let item = ItemReport {
                path: object.path.clone(),
                outcome,
            };
            report.record(&item);
            on_item(&item);
        }

        if self.settings.mode.is_apply() {
            counter!("teebox_optimize_bytes_saved_total").increment(report.bytes_saved());
        }

        info!(
            target = "teebox::optimize",
            scanned = report.scanned,
            optimized = report.optimized,
            skipped = report.skipped,
            failed = report.failed,
            bytes_saved = report.bytes_saved(),
            "Image optimization finished"
        );

        Ok(report)
    }

    async fn process(
        &self,
        object: &StoredObject,
        format: StoredFormat,
        existing: &BTreeSet<&str>,
    ) -> Result<ItemOutcome, OptimizeError> {
        let original = self.store.download(&object.path).await?;
        let before = original.len() as u64;

        let encode = EncodeOptions {
            max_dimension: self.settings.max_dimension,
            jpeg_quality: self.settings.jpeg_quality,
        };
        let recompressed = tokio::task::spawn_blocking(move || recompress(&original, format, encode))
            .await
            .map_err(|err| OptimizeError::Worker(err.to_string()))??;

        let after = recompressed.bytes.len() as u64;
        if !savings_exceed(before, after, self.settings.min_savings_percent) {
            return Ok(ItemOutcome::InsufficientSavings { before, after });
        }

        let Some(target) = (recompressed.format != format)
            .then(|| path_with_format(&object.path, recompressed.format))
        else {
            if self.settings.mode.is_apply() {
                self.store.upload(&object.path, recompressed.bytes).await?;
            }
            return Ok(ItemOutcome::Optimized {
                before,
                after,
                renamed_to: None,
            });
        };

        // An existing target is only ours if it holds exactly what this pass
        // would write, which happens when an earlier run could not delete the
        // original.
        let resuming = existing.contains(target.as_str());
        if resuming && self.store.download(&target).await? != recompressed.bytes {
            return Err(OptimizeError::RenameConflict(target));
        }

        if self.settings.mode.is_apply() {
            if !resuming {
                self.store.upload(&target, recompressed.bytes).await?;
            }
            if let Err(err) = self.store.delete(&object.path).await {
                warn!(
                    target = "teebox::optimize",
                    path = %object.path,
                    renamed_to = %target,
                    error = %err,
                    "Converted image written but original could not be removed"
                );
                return Ok(ItemOutcome::RenamedOriginalKept {
                    before,
                    after,
                    renamed_to: target,
                    reason: err.to_string(),
                });
            }
        }

        Ok(ItemOutcome::Optimized {
            before,
            after,
            renamed_to: Some(target),
        })
    }
}

/// Listed objects worth recompressing, ordered by path stem with a PNG ahead
/// of a JPEG sharing its stem, so a pending conversion is checked against the
/// sibling before that sibling is itself recompressed.
pub fn select_candidates<'a>(
    objects: &'a [StoredObject],
    settings: &OptimizeSettings,
) -> Vec<(&'a StoredObject, StoredFormat)> {
    let mut candidates: Vec<_> = objects
        .iter()
        .filter(|object| object.size > settings.min_bytes)
        .filter(|object| !is_protected(&object.path, &settings.protected_prefixes))
        .filter_map(|object| StoredFormat::from_path(&object.path).map(|format| (object, format)))
        .collect();
    candidates.sort_by(|(left, left_format), (right, right_format)| {
        path_stem(&left.path)
            .cmp(path_stem(&right.path))
            .then(conversion_rank(*left_format).cmp(&conversion_rank(*right_format)))
            .then(left.path.cmp(&right.path))
    });
    candidates
}

fn path_stem(path: &str) -> &str {
    path.rsplit_once('.').map_or(path, |(stem, _)| stem)
}

fn conversion_rank(format: StoredFormat) -> u8 {
    match format {
        StoredFormat::Png => 0,
        StoredFormat::Jpeg => 1,
    }
}

#[derive(Debug, Clone, Copy)]
struct EncodeOptions {
    max_dimension: u32,
    jpeg_quality: u8,
}

struct Recompressed {
    bytes: Bytes,
    format: StoredFormat,
}

fn recompress(
    original: &[u8],
    source: StoredFormat,
    options: EncodeOptions,
) -> Result<Recompressed, OptimizeError> {
    let size = imagesize::blob_size(original).map_err(|err| OptimizeError::Probe(err.to_string()))?;
    let (width, height) = (size.width as u64, size.height as u64);
    if width.saturating_mul(height) > MAX_DECODED_PIXELS {
        return Err(OptimizeError::TooLarge { width, height });
    }

    let image_format = match source {
        StoredFormat::Jpeg => ImageFormat::Jpeg,
        StoredFormat::Png => ImageFormat::Png,
    };
    let mut image =
        image::load_from_memory_with_format(original, image_format).map_err(OptimizeError::Decode)?;

    let target = match source {
        StoredFormat::Png if !has_transparency(&image) => StoredFormat::Jpeg,
        other => other,
    };

    if let Some((width, height)) = fit_within(image.width(), image.height(), options.max_dimension)
    {
        image = image.resize_exact(width, height, FilterType::Lanczos3);
    }

    let mut buffer = Cursor::new(Vec::new());
    match target {
        StoredFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, options.jpeg_quality);
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(OptimizeError::Encode)?;
        }
        StoredFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, PngFilter::Adaptive);
            image.write_with_encoder(encoder).map_err(OptimizeError::Encode)?;
        }
    }

    Ok(Recompressed {
        bytes: Bytes::from(buffer.into_inner()),
        format: target,
    })
}

/// True when any pixel is less opaque than [`OPAQUE_ALPHA_THRESHOLD`].
///
/// An alpha channel alone does not count; exported PNGs often carry one that
/// is fully opaque.
pub fn has_transparency(image: &DynamicImage) -> bool {
    if !image.color().has_alpha() {
        return false;
    }
    image
        .to_rgba8()
        .pixels()
        .any(|pixel| pixel.0[3] < OPAQUE_ALPHA_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;

    fn object(path: &str, size: u64) -> StoredObject {
        StoredObject {
            path: path.to_string(),
            size,
        }
    }

    #[test]
    fn opaque_alpha_channel_is_not_transparency() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255])));
        assert!(!has_transparency(&image));

        let mut nearly = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        nearly.put_pixel(3, 3, Rgba([10, 20, 30, 249]));
        assert!(has_transparency(&DynamicImage::ImageRgba8(nearly)));

        let mut edge = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        edge.put_pixel(0, 0, Rgba([0, 0, 0, 250]));
        assert!(!has_transparency(&DynamicImage::ImageRgba8(edge)));
    }

    #[test]
    fn rgb_images_are_opaque() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        assert!(!has_transparency(&image));
    }

    #[test]
    fn candidates_respect_size_format_and_protection() {
        let settings = OptimizeSettings {
            min_bytes: 100,
            protected_prefixes: vec!["brand/".to_string()],
            ..OptimizeSettings::default()
        };
        let objects = vec![
            object("clubs/z.png", 500),
            object("clubs/small.jpg", 100),
            object("brand/logo.png", 5_000),
            object("docs/menu.pdf", 5_000),
            object("clubs/a.JPEG", 101),
        ];

        let picked: Vec<_> = select_candidates(&objects, &settings)
            .into_iter()
            .map(|(object, format)| (object.path.as_str(), format))
            .collect();

        assert_eq!(
            picked,
            vec![
                ("clubs/a.JPEG", StoredFormat::Jpeg),
                ("clubs/z.png", StoredFormat::Png)
            ]
        );
    }

    #[test]
    fn png_is_visited_before_its_jpeg_sibling() {
        let settings = OptimizeSettings {
            min_bytes: 0,
            ..OptimizeSettings::default()
        };
        let objects = vec![
            object("clubs/iron.jpg", 10),
            object("clubs/iron.png", 10),
            object("clubs/iron-set.png", 10),
        ];

        let order: Vec<_> = select_candidates(&objects, &settings)
            .into_iter()
            .map(|(object, _)| object.path.as_str())
            .collect();

        assert_eq!(order, vec!["clubs/iron.png", "clubs/iron.jpg", "clubs/iron-set.png"]);
    }

    #[test]
    fn kept_original_still_counts_as_rename() {
        let mut report = OptimizeReport::default();
        report.record(&ItemReport {
            path: "a.png".into(),
            outcome: ItemOutcome::RenamedOriginalKept {
                before: 1000,
                after: 400,
                renamed_to: "a.jpg".into(),
                reason: "status 403".into(),
            },
        });

        assert_eq!(report.optimized, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.renames.len(), 1);
        assert_eq!(report.leftovers, vec!["a.png".to_string()]);
        assert!(report.to_string().contains("originals still present"));
    }

    #[test]
    fn report_totals_and_renames() {
        let mut report = OptimizeReport::default();
        report.record(&ItemReport {
            path: "a.png".into(),
            outcome: ItemOutcome::Optimized {
                before: 1000,
                after: 400,
                renamed_to: Some("a.jpg".into()),
            },
        });
        report.record(&ItemReport {
            path: "b.jpg".into(),
            outcome: ItemOutcome::InsufficientSavings {
                before: 1000,
                after: 950,
            },
        });
        report.record(&ItemReport {
            path: "c.png".into(),
            outcome: ItemOutcome::Failed {
                reason: "truncated".into(),
            },
        });

        assert_eq!((report.optimized, report.skipped, report.failed), (1, 1, 1));
        assert_eq!(report.bytes_saved(), 600);
        assert_eq!(
            report.renames,
            vec![Rename {
                from: "a.png".into(),
                to: "a.jpg".into()
            }]
        );
    }

    #[test]
    fn item_lines_show_sizes_and_rename() {
        let item = ItemReport {
            path: "clubs/driver.png".into(),
            outcome: ItemOutcome::Optimized {
                before: 400 * 1024,
                after: 100 * 1024,
                renamed_to: Some("clubs/driver.jpg".into()),
            },
        };
        assert_eq!(
            item.to_string(),
            "optimized clubs/driver.png 400 KiB -> 100 KiB (-75%) (renamed to clubs/driver.jpg)"
        );
    }
}
