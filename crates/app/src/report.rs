use kvitto_core::ParsedReceipt;

/// Render a parsed receipt as a console summary block.
pub fn format_summary(receipt: &ParsedReceipt) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Merchant: {}", receipt.merchant.as_deref().unwrap_or("-")));
    if let Some(cashier) = &receipt.cashier {
        lines.push(format!("Cashier: {cashier}"));
    }
    if let Some(bill_no) = &receipt.bill_no {
        lines.push(format!("Bill: {bill_no}"));
    }

    lines.push("Items:".to_string());
    if receipt.items.is_empty() {
        lines.push("  (No structured items parsed; see raw text)".to_string());
    } else {
        for item in &receipt.items {
            lines.push(format!("  - {:<15} x{:<3} {:.2}", item.name, item.qty, item.price));
        }
    }

    let mut footer = Vec::new();
    if let Some(v) = receipt.subtotal {
        footer.push(format!("Sub Total: {v:.2}"));
    }
    if let Some(v) = receipt.total {
        footer.push(format!("Total: {v:.2}"));
    }
    if let Some(v) = receipt.cash {
        footer.push(format!("Cash: {v:.2}"));
    }
    if let Some(v) = receipt.change {
        footer.push(format!("Change: {v:.2}"));
    }
    if !footer.is_empty() {
        lines.push(footer.join(" | "));
    }

    lines.join("\n")
}
