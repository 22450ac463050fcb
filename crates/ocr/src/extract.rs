use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use kvitto_core::{ParsedReceipt, ReceiptItem};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Label roots tolerate OCR garbling of their suffix ("Cashiersn", "Billt#")
// but not of the root itself.
re!(re_cashier, r"(?i)Cashier\w*\s*[:#]?\s*([A-Za-z0-9-]+)");
re!(re_bill, r"(?i)Bill\w*\s*[:#]?\s*([A-Za-z0-9-]+)");

re!(re_sub_total_spaced, r"(?i)Sub\s*Total\s*[:#=]?\s*([0-9]+(?:[.,][0-9]{1,2})?)");
re!(re_sub_total_joined, r"(?i)Subtotal\s*[:#=]?\s*([0-9]+(?:[.,][0-9]{1,2})?)");
re!(re_sub_total_hyphen, r"(?i)Sub-?Total\s*[:#=]?\s*([0-9]+(?:[.,][0-9]{1,2})?)");
re!(re_total, r"(?i)Total\s*[:#=]?\s*([0-9]+(?:[.,][0-9]{1,2})?)");
re!(re_cash, r"(?i)Cash\s*[:#=]?\s*([0-9]+(?:[.,][0-9]{1,2})?)");
re!(re_change, r"(?i)Change\s*[:#=]?\s*([0-9]+(?:[.,][0-9]{1,2})?)");
re!(re_balance, r"(?i)Balance\s*[:#=]?\s*([0-9]+(?:[.,][0-9]{1,2})?)");
re!(re_return, r"(?i)Return\s*[:#=]?\s*([0-9]+(?:[.,][0-9]{1,2})?)");

// Lines like "Fried Chicken 2 1000" or "Water 2 2.00".
re!(re_item, r"^(.+?)\s+([0-9]{1,3})\s+([0-9]+(?:[.,][0-9]{1,2})?)$");

re!(re_receipt_marker, r"(?i)(Sub\s*Total|TOTAL|Cash|Change)");

// ── Public parsing API ────────────────────────────────────────────────────────

/// Parse one blob of OCR text into a structured receipt record.
///
/// Pure and deterministic; every heuristic degrades to an absent field
/// rather than failing the record. The first matching label synonym wins —
/// there is no scoring across candidates.
pub fn parse_receipt(text: &str) -> ParsedReceipt {
    let mut out = ParsedReceipt::empty(text);

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    // Merchant: the first early line with some substance.
    out.merchant = lines
        .iter()
        .take(6)
        .find(|l| l.len() >= 3 && l.chars().any(|c| c.is_ascii_alphabetic()))
        .map(|l| l.to_string());

    // Cashier and bill number search the whole text, not line by line, so
    // OCR line-merging doesn't hide them.
    out.cashier = capture_token(re_cashier(), text);
    out.bill_no = capture_token(re_bill(), text);

    out.subtotal = find_amount(
        text,
        &[re_sub_total_spaced(), re_sub_total_joined(), re_sub_total_hyphen()],
    );
    out.total = find_amount(text, &[re_total()]);
    out.cash = find_amount(text, &[re_cash()]);
    out.change = find_amount(text, &[re_change(), re_balance(), re_return()]);

    for line in &lines {
        if let Some(caps) = re_item().captures(line) {
            let name = caps.get(1).map_or("", |m| m.as_str()).trim();
            if !name.chars().any(|c| c.is_ascii_alphabetic()) {
                continue;
            }
            let Some(price) = caps.get(3).and_then(|m| parse_amount(m.as_str())) else {
                continue;
            };
            let qty = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(1);
            out.items.push(ReceiptItem { name: name.to_string(), qty, price });
        }
    }

    out
}

/// Split OCR text containing several receipts into per-receipt chunks at
/// the lines that usually end one (Sub Total / TOTAL / Cash / Change).
/// Trailing lines after the last marker become a final chunk.
pub fn split_receipts(text: &str) -> Vec<String> {
    let mut receipts = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        current.push(line);
        if re_receipt_marker().is_match(line) {
            receipts.push(current.join("\n"));
            current.clear();
        }
    }
    if !current.is_empty() {
        receipts.push(current.join("\n"));
    }
    receipts
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn capture_token(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Try each label pattern in order; the first that matches decides the
/// field. A matched label whose numeric token fails to parse yields
/// absent — later synonyms are not consulted.
fn find_amount(text: &str, patterns: &[&Regex]) -> Option<f64> {
    for re in patterns {
        if let Some(caps) = re.captures(text) {
            return caps.get(1).and_then(|m| parse_amount(m.as_str()));
        }
    }
    None
}

fn parse_amount(token: &str) -> Option<f64> {
    let normalized = token.replace(',', ".");
    Decimal::from_str(&normalized).ok()?.to_f64()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Merchant ──────────────────────────────────────────────────────────────

    #[test]
    fn merchant_is_first_substantial_line() {
        let r = parse_receipt("STORE ABC\n123 Main St\nTotal 5.00");
        assert_eq!(r.merchant.as_deref(), Some("STORE ABC"));
    }

    #[test]
    fn merchant_skips_short_and_numeric_lines() {
        let r = parse_receipt("--\n42\nKIOSK NORD\nTotal 5.00");
        assert_eq!(r.merchant.as_deref(), Some("KIOSK NORD"));
    }

    #[test]
    fn merchant_absent_beyond_first_six_lines() {
        let r = parse_receipt("1\n2\n3\n4\n5\n6\nLATE STORE");
        assert_eq!(r.merchant, None);
    }

    // ── Cashier / bill number ─────────────────────────────────────────────────

    #[test]
    fn cashier_with_clean_label() {
        let r = parse_receipt("STORE\nCashier: John\nTotal 5.00");
        assert_eq!(r.cashier.as_deref(), Some("John"));
    }

    #[test]
    fn cashier_with_garbled_label_suffix() {
        let r = parse_receipt("STORE\nCashiersn Mary-01\nTotal 5.00");
        assert_eq!(r.cashier.as_deref(), Some("Mary-01"));
    }

    #[test]
    fn bill_number_with_garbled_label() {
        let r = parse_receipt("STORE\nBillt# A-1042\nTotal 5.00");
        assert_eq!(r.bill_no.as_deref(), Some("A-1042"));
    }

    // ── Monetary fields ───────────────────────────────────────────────────────

    #[test]
    fn comma_decimal_is_normalized() {
        let r = parse_receipt("TOTAL: 12,50");
        assert_eq!(r.total, Some(12.50));
    }

    #[test]
    fn missing_label_is_absent_not_zero() {
        let r = parse_receipt("nothing to see here");
        assert_eq!(r.total, None);
        assert_eq!(r.subtotal, None);
    }

    #[test]
    fn change_synonyms_in_order() {
        assert_eq!(parse_receipt("Balance 3.00").change, Some(3.0));
        assert_eq!(parse_receipt("Return 1.25").change, Some(1.25));
        // "Change" outranks "Balance" when both appear.
        let r = parse_receipt("Balance 3.00\nChange 5.00");
        assert_eq!(r.change, Some(5.0));
    }

    #[test]
    fn label_without_number_stays_absent() {
        let r = parse_receipt("Total due next week");
        assert_eq!(r.total, None);
    }

    // ── Items ─────────────────────────────────────────────────────────────────

    #[test]
    fn item_line_with_qty_and_price() {
        let r = parse_receipt("Water 2 2.00");
        assert_eq!(
            r.items,
            vec![ReceiptItem { name: "Water".into(), qty: 2, price: 2.0 }]
        );
    }

    #[test]
    fn numeric_only_name_is_rejected() {
        let r = parse_receipt("1234 5 6");
        assert!(r.items.is_empty());
    }

    #[test]
    fn item_price_accepts_comma_decimals() {
        let r = parse_receipt("Kaffe 1 12,50");
        assert_eq!(r.items[0].price, 12.50);
    }

    #[test]
    fn items_keep_line_order_and_duplicates() {
        let r = parse_receipt("Tea 1 2.00\nTea 1 2.00\nBun 3 9.00");
        let names: Vec<&str> = r.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Tea", "Tea", "Bun"]);
    }

    #[test]
    fn item_match_does_not_block_amount_fields() {
        // "Fried Chicken 2 1000" is an item; totals still extract.
        let r = parse_receipt("Fried Chicken 2 1000\nTotal 1000");
        assert_eq!(r.items.len(), 1);
        assert_eq!(r.total, Some(1000.0));
    }

    // ── Degradation ───────────────────────────────────────────────────────────

    #[test]
    fn empty_text_yields_bare_record() {
        let r = parse_receipt("");
        assert_eq!(r.raw_text, "");
        assert!(r.is_bare());
    }

    #[test]
    fn whitespace_only_text_yields_bare_record() {
        let r = parse_receipt("  \n\t\n ");
        assert!(r.items.is_empty());
        assert!(r.merchant.is_none());
    }

    #[test]
    fn garbage_input_never_panics() {
        let _ = parse_receipt("!@#$%^&*()\n\0\x01\x02");
    }

    #[test]
    fn parsing_is_deterministic() {
        let text = "STORE ABC\nCashier: Ann\nWater 2 2.00\nTotal 2.00";
        assert_eq!(parse_receipt(text), parse_receipt(text));
    }

    // ── Full scenario ─────────────────────────────────────────────────────────

    #[test]
    fn well_formed_receipt_extracts_every_field() {
        let text = "STORE ABC\nSub Total 45.00\nTOTAL 45.00\nCash 50.00\nChange 5.00";
        let r = parse_receipt(text);
        assert_eq!(r.merchant.as_deref(), Some("STORE ABC"));
        assert_eq!(r.subtotal, Some(45.0));
        assert_eq!(r.total, Some(45.0));
        assert_eq!(r.cash, Some(50.0));
        assert_eq!(r.change, Some(5.0));
        assert_eq!(r.raw_text, text);
    }

    // ── split_receipts ────────────────────────────────────────────────────────

    #[test]
    fn splits_at_total_markers() {
        let text = "SHOP A\nTea 1 2.00\nTOTAL 2.00\nSHOP B\nBun 1 3.00\nTOTAL 3.00";
        let chunks = split_receipts(text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("SHOP A"));
        assert!(chunks[1].starts_with("SHOP B"));
    }

    #[test]
    fn leftover_lines_form_a_final_chunk() {
        let chunks = split_receipts("SHOP A\nTOTAL 2.00\ntrailing note");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], "trailing note");
    }

    #[test]
    fn no_markers_is_one_chunk() {
        let chunks = split_receipts("just\nsome\nlines");
        assert_eq!(chunks, vec!["just\nsome\nlines".to_string()]);
    }
}
