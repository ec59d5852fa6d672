use jiwani_core::menu::NewMenuItem;
use jiwani_core::{CoreError, CoreResult};

pub const MAX_ITEM_NAME_LEN: usize = 100;
pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

pub fn validate_price(price: i64) -> CoreResult<()> {
    if price < 0 {
        return Err(CoreError::validation("price must not be negative"));
    }
    Ok(())
}

/// Checks a create/update payload before it reaches the store.
pub fn validate_menu_item(item: &NewMenuItem) -> CoreResult<()> {
    let name = item.name.trim();
    if name.is_empty() {
        return Err(CoreError::validation("menu item name is required"));
    }
    if name.chars().count() > MAX_ITEM_NAME_LEN {
        return Err(CoreError::validation(format!(
            "menu item name must be at most {} characters",
            MAX_ITEM_NAME_LEN
        )));
    }
    validate_price(item.price)?;
    if item.category_id <= 0 {
        return Err(CoreError::validation("category_id is required"));
    }
    if let Some(image) = &item.image {
        validate_image_reference(image)?;
    }
    Ok(())
}

/// Image references are stored upload names, never paths.
pub fn validate_image_reference(image: &str) -> CoreResult<()> {
    if image.is_empty() || image.contains('/') || image.contains('\\') || image.contains("..") {
        return Err(CoreError::validation(format!("invalid image reference '{}'", image)));
    }
    match image_extension(image) {
        Some(_) => Ok(()),
        None => Err(CoreError::validation(format!("unsupported image type '{}'", image))),
    }
}

/// Lower-cased extension if it is one we accept.
pub fn image_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}
