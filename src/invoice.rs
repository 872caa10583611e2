//! PDF invoice rendering.
//!
//! Writes a plain PDF 1.4 document by hand: Helvetica text only, A4 pages,
//! one content stream per page and a byte-accurate cross-reference table.

use std::fmt::Write as _;

use thiserror::Error;

use crate::domain::aggregates::Order;
use crate::domain::value_objects::Money;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const FIRST_PAGE_OBJECT: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvoiceError {
    #[error("Invoices are only available for paid orders")]
    Unpaid,
}

/// Who the invoice is addressed to.
#[derive(Debug, Clone)]
pub struct BillTo<'a> {
    pub name: &'a str,
    pub email: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face { Regular, Bold }

impl Face {
    fn resource(self) -> &'static str {
        match self { Face::Regular => "/F1", Face::Bold => "/F2" }
    }
}

struct Row {
    size: f32,
    cells: Vec<(f32, Face, String)>,
}

impl Row {
    fn text(size: f32, face: Face, text: impl Into<String>) -> Self {
        Self { size, cells: vec![(MARGIN, face, text.into())] }
    }
    fn blank() -> Self { Self { size: 8.0, cells: vec![] } }
    fn height(&self) -> f32 { self.size * 1.5 }
}

pub fn render(order: &Order, bill_to: &BillTo<'_>, store_name: &str, currency: &str) -> Result<Vec<u8>, InvoiceError> {
    if !order.is_paid() {
        return Err(InvoiceError::Unpaid);
    }
    let pages = paginate(layout(order, bill_to, store_name, currency));
    Ok(assemble(&pages.iter().map(|rows| content_stream(rows)).collect::<Vec<_>>()))
}

fn amount(currency: &str, money: Money) -> String { format!("{currency} {money}") }

fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max.saturating_sub(3)).collect::<String>())
    }
}

fn layout(order: &Order, bill_to: &BillTo<'_>, store_name: &str, currency: &str) -> Vec<Row> {
    let number = order.id().simple().to_string()[..8].to_uppercase();
    let mut rows = vec![
        Row::text(20.0, Face::Bold, store_name),
        Row::text(14.0, Face::Bold, "INVOICE"),
        Row::blank(),
        Row::text(10.0, Face::Regular, format!("Invoice no: INV-{number}")),
        Row::text(10.0, Face::Regular, format!("Order id: {}", order.id())),
        Row::text(10.0, Face::Regular, format!("Order date: {}", order.created_at().format("%d %b %Y"))),
    ];
    if let Some(paid_at) = order.paid_at() {
        rows.push(Row::text(10.0, Face::Regular, format!("Paid on: {}", paid_at.format("%d %b %Y %H:%M UTC"))));
    }
    if let Some(payment_id) = &order.gateway().remote_payment_id {
        rows.push(Row::text(10.0, Face::Regular, format!("Payment reference: {payment_id}")));
    }

    let ship = order.shipping_address();
    rows.push(Row::blank());
    rows.push(Row::text(11.0, Face::Bold, "Bill to"));
    rows.push(Row::text(10.0, Face::Regular, bill_to.name));
    rows.push(Row::text(10.0, Face::Regular, bill_to.email));
    rows.push(Row::blank());
    rows.push(Row::text(11.0, Face::Bold, "Ship to"));
    let mut address = vec![ship.full_name.clone(), ship.line1.clone()];
    address.extend(ship.line2.clone().filter(|l| !l.is_empty()));
    address.push(format!("{}, {} {}", ship.city, ship.state, ship.postal_code));
    address.push(ship.country.clone());
    address.push(format!("Phone: {}", ship.phone));
    rows.extend(address.into_iter().map(|l| Row::text(10.0, Face::Regular, l)));

    let columns = [MARGIN, 250.0, 390.0, 430.0, 510.0];
    rows.push(Row::blank());
    rows.push(Row {
        size: 10.0,
        cells: ["Item", "Variant", "Qty", "Unit price", "Total"]
            .iter()
            .zip(columns)
            .map(|(h, x)| (x, Face::Bold, h.to_string()))
            .collect(),
    });
    for item in order.items() {
        rows.push(Row {
            size: 9.0,
            cells: vec![
                (columns[0], Face::Regular, clip(&item.name, 36)),
                (columns[1], Face::Regular, clip(&item.variant_label, 24)),
                (columns[2], Face::Regular, item.quantity.to_string()),
                (columns[3], Face::Regular, item.unit_price.to_string()),
                (columns[4], Face::Regular, item.line_total().to_string()),
            ],
        });
    }

    let label = columns[3];
    rows.push(Row::blank());
    rows.push(Row {
        size: 10.0,
        cells: vec![(label, Face::Regular, format!("Subtotal: {}", amount(currency, order.items_price())))],
    });
    if let Some(discount) = order.discount() {
        rows.push(Row {
            size: 10.0,
            cells: vec![(label, Face::Regular, format!("Discount ({}): -{}", discount.coupon_code, amount(currency, discount.amount)))],
        });
    }
    rows.push(Row {
        size: 11.0,
        cells: vec![(label, Face::Bold, format!("Total: {}", amount(currency, order.total_price())))],
    });
    rows.push(Row::blank());
    rows.push(Row::text(9.0, Face::Regular, format!("Thank you for shopping with {store_name}.")));
    rows
}

fn paginate(rows: Vec<Row>) -> Vec<Vec<Row>> {
    let usable = PAGE_HEIGHT - 2.0 * MARGIN;
    let mut pages = vec![vec![]];
    let mut used = 0.0;
    for row in rows {
        if used + row.height() > usable {
            pages.push(vec![]);
            used = 0.0;
        }
        used += row.height();
        if let Some(page) = pages.last_mut() {
            page.push(row);
        }
    }
    pages
}

/// PDF string literal; characters outside printable ASCII become `?`.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => { out.push('\\'); out.push(c); }
            ' '..='~' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn content_stream(rows: &[Row]) -> String {
    let mut stream = String::from("BT\n");
    let mut y = PAGE_HEIGHT - MARGIN;
    for row in rows {
        y -= row.height();
        for (x, face, text) in &row.cells {
            let x = x.min(PAGE_WIDTH - MARGIN);
            let _ = writeln!(stream, "{} {} Tf", face.resource(), row.size);
            let _ = writeln!(stream, "1 0 0 1 {x:.1} {y:.1} Tm");
            let _ = writeln!(stream, "({}) Tj", escape(text));
        }
    }
    stream.push_str("ET");
    stream
}

fn assemble(pages: &[String]) -> Vec<u8> {
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", FIRST_PAGE_OBJECT + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>".to_string(),
    ];
    for (i, content) in pages.iter().enumerate() {
        let content_id = FIRST_PAGE_OBJECT + 2 * i + 1;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {content_id} 0 R >>"
        ));
        objects.push(format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()));
    }

    let mut out: Vec<u8> = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_at = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = writeln!(xref, "{offset:010} 00000 n ");
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    );
    out.extend_from_slice(xref.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::item;
    use crate::domain::aggregates::{PaymentResult, ShippingAddress};
    use uuid::Uuid;

    fn paid(items: usize) -> Order {
        let lines = (0..items).map(|_| item(1, 500)).collect();
        let mut order = Order::place(Uuid::now_v7(), lines, ShippingAddress {
            full_name: "Asha (Home)".into(), city: "Pune".into(), ..Default::default()
        }, None).unwrap();
        order.mark_paid(PaymentResult { payment_id: "pay_1".into(), status: "captured".into(), email: None, method: None });
        order
    }

    fn bill_to() -> BillTo<'static> { BillTo { name: "Asha", email: "asha@example.com" } }

    fn text(pdf: &[u8]) -> String { String::from_utf8_lossy(pdf).into_owned() }

    #[test]
    fn test_rejects_unpaid_order() {
        let order = Order::place(Uuid::now_v7(), vec![item(1, 500)], ShippingAddress::default(), None).unwrap();
        assert_eq!(render(&order, &bill_to(), "Storefront", "INR"), Err(InvoiceError::Unpaid));
    }

    #[test]
    fn test_renders_wellformed_pdf() {
        let pdf = render(&paid(2), &bill_to(), "Storefront", "INR").unwrap();
        let body = text(&pdf);
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(body.ends_with("%%EOF\n"));
        assert!(body.contains("(Linen Shirt) Tj"));
        assert!(body.contains("(Total: INR 1000.00) Tj"));
        assert!(body.contains("(Asha \\(Home\\)) Tj"));
        assert!(body.contains("/Count 1"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let pdf = render(&paid(1), &bill_to(), "Storefront", "INR").unwrap();
        let startxref: usize = text(&pdf).rsplit("startxref\n").next().unwrap().lines().next().unwrap().parse().unwrap();
        let table = text(&pdf[startxref..]);
        assert!(table.starts_with("xref"));
        let entries: Vec<usize> = table
            .lines()
            .skip(3)
            .take_while(|l| l.ends_with(" n "))
            .map(|l| l[..10].parse().unwrap())
            .collect();
        assert_eq!(entries.len(), 6);
        for (i, offset) in entries.iter().enumerate() {
            assert!(pdf[*offset..].starts_with(format!("{} 0 obj", i + 1).as_bytes()));
        }
    }

    #[test]
    fn test_long_orders_span_pages() {
        let two = render(&paid(45), &bill_to(), "Storefront", "INR").unwrap();
        assert!(text(&two).contains("/Count 2"));
        let three = render(&paid(80), &bill_to(), "Storefront", "INR").unwrap();
        assert!(text(&three).contains("/Count 3"));
    }
}
