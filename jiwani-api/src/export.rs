use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use jiwani_core::order::{OrderFilter, OrderStatus, OrderView};

use crate::error::AppError;
use crate::state::AppState;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const HEADERS: [&str; 7] = ["Order", "Date", "Member", "Table", "Item", "Quantity", "Line total"];

pub fn routes() -> Router<AppState> {
    Router::new().route("/orders/export/completed", get(export_completed))
}

/// One row per order line followed by a totals row.
pub fn completed_orders_workbook(orders: &[OrderView]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Completed orders")?;

    for (col, title) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &bold)?;
    }

    let mut row: u32 = 1;
    let mut quantity_total: i64 = 0;
    let mut grand_total: i64 = 0;
    for order in orders {
        let date = order.created_at.format("%Y-%m-%d %H:%M").to_string();
        for line in &order.items {
            sheet.write_number(row, 0, order.id as f64)?;
            sheet.write_string(row, 1, date.as_str())?;
            sheet.write_string(row, 2, order.member.name.as_str())?;
            sheet.write_string(row, 3, order.table.number.as_str())?;
            sheet.write_string(row, 4, line.name.as_str())?;
            sheet.write_number(row, 5, line.quantity as f64)?;
            sheet.write_number(row, 6, line.line_total as f64)?;
            quantity_total += line.quantity as i64;
            grand_total += line.line_total;
            row += 1;
        }
    }

    sheet.write_string_with_format(row, 0, "Total", &bold)?;
    sheet.write_number_with_format(row, 5, quantity_total as f64, &bold)?;
    sheet.write_number_with_format(row, 6, grand_total as f64, &bold)?;

    workbook.save_to_buffer()
}

/// GET /api/orders/export/completed
async fn export_completed(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let filter = OrderFilter { member_id: None, status: Some(OrderStatus::Completed) };
    let orders = state.order_repo.list_orders(&filter).await?;

    let bytes = completed_orders_workbook(&orders)
        .map_err(|e| AppError::InternalServerError(format!("xlsx export failed: {}", e)))?;
    tracing::info!("Exported {} completed orders ({} bytes)", orders.len(), bytes.len());

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"completed-orders.xlsx\""),
        ],
        bytes,
    ))
}
