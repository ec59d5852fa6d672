use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use jiwani_core::menu::MenuPrice;
use jiwani_core::order::NewOrderLine;
use jiwani_core::{CoreError, CoreResult};

pub const MAX_LINE_QUANTITY: i32 = 99;

/// One requested line. `line_total` is what the client computed, if anything;
/// it is only ever compared against the catalog, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRequest {
    pub item_id: i64,
    pub quantity: i32,
    pub line_total: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub lines: Vec<NewOrderLine>,
    pub total: i64,
}

/// Prices every requested line from authoritative catalog prices.
///
/// Rejects unknown or inactive items, out-of-range quantities and any client
/// total that disagrees with `price * quantity`.
pub fn price_lines(requests: &[LineRequest], catalog: &[MenuPrice]) -> CoreResult<PricedOrder> {
    if requests.is_empty() {
        return Err(CoreError::validation("order must contain at least one item"));
    }

    let prices: HashMap<i64, &MenuPrice> = catalog.iter().map(|p| (p.id, p)).collect();
    let mut lines = Vec::with_capacity(requests.len());
    let mut total: i64 = 0;

    for request in requests {
        if !(1..=MAX_LINE_QUANTITY).contains(&request.quantity) {
            return Err(CoreError::validation(format!(
                "quantity for item {} must be between 1 and {}",
                request.item_id, MAX_LINE_QUANTITY
            )));
        }

        let entry = prices
            .get(&request.item_id)
            .ok_or_else(|| CoreError::validation(format!("unknown menu item {}", request.item_id)))?;

        if !entry.is_active {
            return Err(CoreError::validation(format!("menu item '{}' is not available", entry.name)));
        }

        let line_total = entry
            .price
            .checked_mul(i64::from(request.quantity))
            .ok_or_else(|| CoreError::validation("line total overflows"))?;

        if let Some(claimed) = request.line_total {
            if claimed != line_total {
                return Err(CoreError::validation(format!(
                    "line total for '{}' is {} but {} was submitted",
                    entry.name, line_total, claimed
                )));
            }
        }

        total = total
            .checked_add(line_total)
            .ok_or_else(|| CoreError::validation("order total overflows"))?;

        lines.push(NewOrderLine {
            item_id: entry.id,
            quantity: request.quantity,
            line_total,
        });
    }

    Ok(PricedOrder { lines, total })
}

/// Distinct item ids, in request order, for the catalog lookup.
pub fn requested_item_ids(requests: &[LineRequest]) -> Vec<i64> {
    let mut ids: Vec<i64> = Vec::with_capacity(requests.len());
    for request in requests {
        if !ids.contains(&request.item_id) {
            ids.push(request.item_id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<MenuPrice> {
        vec![
            MenuPrice { id: 1, name: "Nasi Goreng".into(), price: 25000, is_active: true },
            MenuPrice { id: 2, name: "Es Teh".into(), price: 5000, is_active: true },
            MenuPrice { id: 3, name: "Sate Kambing".into(), price: 40000, is_active: false },
        ]
    }

    fn line(item_id: i64, quantity: i32, line_total: Option<i64>) -> LineRequest {
        LineRequest { item_id, quantity, line_total }
    }

    #[test]
    fn test_prices_from_catalog() {
        let priced = price_lines(&[line(1, 2, None), line(2, 3, Some(15000))], &catalog()).unwrap();

        assert_eq!(priced.total, 65000);
        assert_eq!(priced.lines.len(), 2);
        assert_eq!(priced.lines[0], NewOrderLine { item_id: 1, quantity: 2, line_total: 50000 });
    }

    #[test]
    fn test_rejects_tampered_total() {
        let err = price_lines(&[line(1, 2, Some(1000))], &catalog()).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn test_rejects_empty_unknown_and_inactive() {
        assert!(price_lines(&[], &catalog()).is_err());
        assert!(price_lines(&[line(42, 1, None)], &catalog()).is_err());
        assert!(price_lines(&[line(3, 1, None)], &catalog()).is_err());
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(price_lines(&[line(1, 0, None)], &catalog()).is_err());
        assert!(price_lines(&[line(1, MAX_LINE_QUANTITY + 1, None)], &catalog()).is_err());
        assert!(price_lines(&[line(1, MAX_LINE_QUANTITY, None)], &catalog()).is_ok());
    }

    #[test]
    fn test_requested_item_ids_are_distinct() {
        let ids = requested_item_ids(&[line(2, 1, None), line(1, 1, None), line(2, 4, None)]);
        assert_eq!(ids, vec![2, 1]);
    }
}
