//! Input rules shared by the JSON create route and the upload pipeline.

use crate::error::AppError;

pub const MIN_IMAGES: usize = 1;
pub const MAX_IMAGES: usize = 5;
pub const MAX_CAPTION_CHARS: usize = 500;

/// A caption must contain something other than whitespace and fit in
/// [`MAX_CAPTION_CHARS`] characters.
pub fn validate_caption(caption: &str) -> Result<(), AppError> {
    if caption.trim().is_empty() {
        return Err(AppError::validation("Caption cannot be empty"));
    }
    if caption.chars().count() > MAX_CAPTION_CHARS {
        return Err(AppError::validation(format!(
            "Caption must be at most {MAX_CAPTION_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn validate_image_count(count: usize) -> Result<(), AppError> {
    if count < MIN_IMAGES {
        return Err(AppError::validation("At least 1 image is required"));
    }
    if count > MAX_IMAGES {
        return Err(AppError::validation(format!(
            "Maximum {MAX_IMAGES} images allowed"
        )));
    }
    Ok(())
}

/// Rejects out-of-range and non-finite coordinates.
pub fn validate_coordinates(longitude: f64, latitude: f64) -> Result<(), AppError> {
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::validation(
            "Longitude must be between -180 and 180",
        ));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::validation("Latitude must be between -90 and 90"));
    }
    Ok(())
}

pub fn validate_image_urls(urls: &[String]) -> Result<(), AppError> {
    validate_image_count(urls.len())?;
    if urls.iter().any(|u| u.trim().is_empty()) {
        return Err(AppError::validation("Image URLs cannot be empty"));
    }
    Ok(())
}
