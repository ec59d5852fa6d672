use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// A sellable menu entry. `price` is in the smallest currency unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub image: Option<String>,
    pub category_id: i64,
    pub category: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload for create and full update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMenuItem {
    pub name: String,
    pub price: i64,
    pub image: Option<String>,
    pub category_id: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool { true }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenuFilter {
    pub category_id: Option<i64>,
    pub is_active: Option<bool>,
}

impl MenuFilter {
    pub fn matches(&self, item: &MenuItem) -> bool {
        self.category_id.map_or(true, |c| item.category_id == c)
            && self.is_active.map_or(true, |a| item.is_active == a)
    }
}

/// The slice of a menu item the order workflow prices against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuPrice {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub is_active: bool,
}
