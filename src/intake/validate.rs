use std::path::Path;

pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff", "webp"];

/// Check that an upload is an image we accept: a known extension, an
/// `image/*` content type and a payload that decodes. Returns the content type.
pub fn validate_image<'a>(
    filename: &str,
    content_type: Option<&'a str>,
    data: &[u8],
) -> Result<&'a str, String> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| format!("File '{filename}' has no extension"))?;

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(format!(
            "Unsupported file extension '.{extension}'. Allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        ));
    }

    let content_type = match content_type {
        Some(ct) if ct.to_ascii_lowercase().starts_with("image/") => ct,
        Some(ct) => return Err(format!("File must be an image, got content type '{ct}'")),
        None => return Err("File must be an image, content type missing".to_string()),
    };

    if data.is_empty() {
        return Err("Uploaded file is empty".to_string());
    }

    image::load_from_memory(data).map_err(|e| format!("File is not a valid image: {e}"))?;
    Ok(content_type)
}
