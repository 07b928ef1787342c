//! Image file loading and saving
//!
//! Keeps file I/O out of the processor so the pipeline can be tested with
//! in-memory images.

use crate::error::{BgRemovalError, Result};
use image::DynamicImage;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// The format is taken from the extension first and sniffed from the
    /// content if that fails. No EXIF orientation is applied, so the decoded
    /// dimensions are the stored ones.
    ///
    /// # Errors
    /// - File does not exist (`Io` with `NotFound` kind)
    /// - File cannot be read or decoded
    ///
    /// # Examples
    /// ```rust,no_run
    /// use logo_bgremove::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("public/peterson-pro-services-logo.png")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        match fs::metadata(path_ref) {
            Ok(metadata) if metadata.is_file() => {},
            Ok(_) => {
                return Err(BgRemovalError::file_io_error(
                    "read image file",
                    path_ref,
                    &std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
                ));
            },
            Err(e) => return Err(BgRemovalError::file_io_error("read image file", path_ref, &e)),
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = fs::read(path_ref).map_err(|io_err| {
                    BgRemovalError::file_io_error("read image data", path_ref, &io_err)
                })?;

                image::load_from_memory(&data)
                    .map_err(|content_err| BgRemovalError::image_load_error(path_ref, &content_err))
            },
        }
    }

    /// Save an image as PNG, replacing `path` atomically
    ///
    /// The PNG is encoded into a temporary file in the destination directory
    /// and renamed over `path` only after encoding succeeded. On failure the
    /// temporary file is removed and an existing file at `path` is left as it
    /// was. The destination directory is not created.
    ///
    /// # Errors
    /// - Destination directory missing or not writable
    /// - PNG encoding failures
    pub fn save_png<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();
        let parent = match path_ref.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let file_name = path_ref
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("output");
        let mut temp_file = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| BgRemovalError::file_io_error("write image to", path_ref, &e))?;

        {
            let mut writer = BufWriter::new(temp_file.as_file_mut());
            image
                .write_to(&mut writer, image::ImageFormat::Png)
                .map_err(|e| {
                    BgRemovalError::processing_stage_error(
                        "image save",
                        &format!("Failed to encode PNG: {}", e),
                        Some(&format!("path: {}", path_ref.display())),
                    )
                })?;
            writer
                .flush()
                .map_err(|e| BgRemovalError::file_io_error("write image to", path_ref, &e))?;
        }

        Self::apply_output_permissions(temp_file.as_file(), path_ref)?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| BgRemovalError::file_io_error("sync image file", path_ref, &e))?;

        temp_file
            .persist(path_ref)
            .map_err(|e| BgRemovalError::file_io_error("replace image file", path_ref, &e.error))?;

        log::debug!("Saved PNG to {}", path_ref.display());
        Ok(())
    }

    /// Temp files are created owner-only; give the output the permissions of
    /// the file it replaces, or world-readable for a new file.
    #[cfg(unix)]
    fn apply_output_permissions(file: &fs::File, path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let permissions = fs::metadata(path)
            .map(|metadata| metadata.permissions())
            .unwrap_or_else(|_| fs::Permissions::from_mode(0o644));
        file.set_permissions(permissions)
            .map_err(|e| BgRemovalError::file_io_error("set permissions for", path, &e))
    }

    #[cfg(not(unix))]
    fn apply_output_permissions(_file: &fs::File, _path: &Path) -> Result<()> {
        Ok(())
    }
}
