pub mod menu;
pub mod pricing;

pub use menu::{validate_menu_item, validate_price};
pub use pricing::{price_lines, requested_item_ids, LineRequest, PricedOrder};
