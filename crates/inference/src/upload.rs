use crate::config::UploadPolicy;
use crate::errors::ServiceError;
use std::path::Path;

/// Lowercased extension of `filename` including the dot, or an empty string.
pub fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

impl UploadPolicy {
    /// Rejects an upload before any decoding happens: extension first, then size.
    pub fn validate(&self, filename: &str, size: usize) -> Result<(), ServiceError> {
        self.check_extension(filename)?;
        self.check_size(filename, size)?;

        tracing::debug!(filename, size, "File validation passed");
        Ok(())
    }

    pub fn check_extension(&self, filename: &str) -> Result<(), ServiceError> {
        let extension = file_extension(filename);
        let allowed = self
            .allowed_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&extension));

        if !allowed {
            tracing::warn!(filename, extension = %extension, "Unsupported file format");
            return Err(ServiceError::UnsupportedFormat {
                extension,
                allowed: self.allowed_extensions.clone(),
            });
        }
        Ok(())
    }

    pub fn check_size(&self, filename: &str, size: usize) -> Result<(), ServiceError> {
        if size > self.max_file_size {
            tracing::warn!(filename, size, max = self.max_file_size, "File too large");
            return Err(ServiceError::ImageTooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }
}
