use crate::cache::PageRecord;
use crate::crawler::{FetchError, PoliteFetcher};
use sha2::{Digest, Sha256};
use std::path::Path;
use url::Url;

/// Downloads the bodies of a record's images into `dir`
///
/// Runs on the same fetcher as page fetches, so image requests serialize
/// with the main crawl and inherit its politeness. Failures are logged and
/// leave `local_path` unset; the page record is persisted regardless.
///
/// Returns how many images were stored.
pub async fn download_images(
    fetcher: &PoliteFetcher,
    record: &mut PageRecord,
    dir: &Path,
) -> Result<usize, FetchError> {
    let mut stored = 0;

    for image in &mut record.images {
        if image.local_path.is_some() {
            continue;
        }

        let Ok(url) = Url::parse(&image.src) else {
            tracing::debug!("Skipping unparseable image src {}", image.src);
            continue;
        };

        match fetcher.fetch_image(&url).await {
            Ok(bytes) => {
                let filename = image_filename(&image.src);
                let path = dir.join(&filename);
                match std::fs::write(&path, &bytes) {
                    Ok(()) => {
                        image.local_path = Some(path.to_string_lossy().to_string());
                        stored += 1;
                        tracing::debug!("Stored image {} ({} bytes)", filename, bytes.len());
                    }
                    Err(e) => {
                        tracing::debug!("Failed to write image {}: {}", path.display(), e);
                    }
                }
            }
            // Cancellation propagates; ordinary failures just skip the image
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(e) => {
                tracing::debug!("Failed to download image {}: {}", image.src, e);
            }
        }
    }

    Ok(stored)
}

/// Content-addressed image filename: hash of the source URL plus its
/// extension when it looks like an image extension
fn image_filename(src: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(src.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let ext = src
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" | "ico")
        })
        .unwrap_or_else(|| "img".to_string());

    format!("img_{}.{}", &digest[..12], ext)
}
