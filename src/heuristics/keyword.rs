use super::{Field, FieldMap, Template};

/// Single pass over the lines, matching keyword anchors from the template.
///
/// A line claims at most one rule (the first whose keyword it contains).
/// Same-line rules take the text between the keyword and its next repeat
/// on the line (or the line end); when nothing follows it,
/// the next line is consumed as the value instead. Offset rules read the line
/// `offset` below the anchor, if there is one. A field keeps its first value.
pub fn extract<S: AsRef<str>>(lines: &[S], template: &Template) -> FieldMap {
    let mut fields = FieldMap::default();
    let mut pending: Option<Field> = None;

    for (i, raw) in lines.iter().enumerate() {
        let line = raw.as_ref().trim();

        if let Some(field) = pending.take() {
            fields.set(field, line);
            continue;
        }

        let Some(rule) = template
            .rules
            .iter()
            .find(|r| line.contains(r.keyword.as_str()))
        else {
            continue;
        };

        if !fields.get(rule.field).is_empty() {
            continue;
        }

        match rule.offset {
            Some(offset) => {
                if let Some(target) = lines.get(i + offset) {
                    fields.set(rule.field, target.as_ref().trim());
                }
            }
            None => {
                let value = line
                    .split(rule.keyword.as_str())
                    .nth(1)
                    .map(str::trim)
                    .unwrap_or_default();
                if value.is_empty() {
                    pending = Some(rule.field);
                } else {
                    fields.set(rule.field, value);
                }
            }
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::KeywordRule;

    /// Text laid out the way pdf text extraction renders an IDT invoice:
    /// the four order headers sit in a block, their values six lines later.
    fn idt_lines() -> Vec<&'static str> {
        vec![
            "Integrated DNA Technologies Pte. Ltd.",   // 0
            "Invoice Nbr: 5583021",                    // 1
            "Invoice Date:",                           // 2
            "  14 Mar 2023  ",                         // 3
            "Package Ids: 7712093",                    // 4
            "P.O. #",                                  // 5
            "Order Date",                              // 6
            "Sales Order #",                           // 7
            "Ship Date",                               // 8
            "Terms",                                   // 9
            "Ship Via",                                // 10
            "PO-4471",                                 // 11
            "02 Mar 2023",                             // 12
            "SO-99812",                                // 13
            "09 Mar 2023",                             // 14
            "Net 30",                                  // 15
            "Order Total: S$ 120.50",                  // 16
            "Tax: S$ 9.64",                            // 17
            "Invoice Total: S$ 130.14",                // 18
        ]
    }

    #[test]
    fn test_idt_layout_recovers_every_field() {
        let map = extract(&idt_lines(), &Template::idt());
        assert_eq!(map.invoice_number, "5583021");
        assert_eq!(map.invoice_date, "14 Mar 2023");
        assert_eq!(map.do_number, "7712093");
        assert_eq!(map.po_number, "PO-4471");
        assert_eq!(map.order_date, "02 Mar 2023");
        assert_eq!(map.sale_order, "SO-99812");
        assert_eq!(map.delivery_date, "09 Mar 2023");
        assert_eq!(map.order_total, "S$ 120.50");
        assert_eq!(map.tax, "S$ 9.64");
        assert_eq!(map.invoice_total, "S$ 130.14");
        assert_eq!(map.coverage(), (10, 10));
    }

    #[test]
    fn test_same_line_value() {
        let map = extract(&["Invoice Nbr: INV-1023"], &Template::idt());
        assert_eq!(map.invoice_number, "INV-1023");
        assert_eq!(map.coverage(), (1, 10));
    }

    #[test]
    fn test_offset_value_at_line_sixteen() {
        let mut lines = vec!["filler"; 20];
        lines[10] = "P.O. #";
        lines[16] = "PO-4471";
        let map = extract(&lines, &Template::idt());
        assert_eq!(map.po_number, "PO-4471");
    }

    #[test]
    fn test_offset_past_end_leaves_field_empty() {
        let lines = ["a", "b", "Ship Date", "c", "d"];
        let map = extract(&lines, &Template::idt());
        assert_eq!(map.delivery_date, "");
    }

    #[test]
    fn test_pending_line_is_not_matched_as_keyword() {
        // the consumed line happens to contain another keyword
        let lines = ["Invoice Nbr:", "Tax: looks like a keyword", "Tax: S$ 1.00"];
        let map = extract(&lines, &Template::idt());
        assert_eq!(map.invoice_number, "Tax: looks like a keyword");
        assert_eq!(map.tax, "S$ 1.00");
    }

    #[test]
    fn test_trailing_keyword_on_last_line() {
        let map = extract(&["Invoice Total:"], &Template::idt());
        assert_eq!(map.invoice_total, "");
    }

    #[test]
    fn test_first_rule_claims_the_line() {
        // "Order Total:" precedes "Tax:" in the table
        let map = extract(&["Order Total: S$ 5.00 Tax: S$ 0.40"], &Template::idt());
        assert_eq!(map.order_total, "S$ 5.00 Tax: S$ 0.40");
        assert_eq!(map.tax, "");
    }

    #[test]
    fn test_same_line_value_stops_at_repeated_keyword() {
        let map = extract(&["Tax: S$ 1 Tax: S$ 2"], &Template::idt());
        assert_eq!(map.tax, "S$ 1");
    }

    #[test]
    fn test_first_hit_wins_on_repeated_keyword() {
        let lines = ["Invoice Nbr: 111", "page 2", "Invoice Nbr: 222"];
        let map = extract(&lines, &Template::idt());
        assert_eq!(map.invoice_number, "111");
    }

    #[test]
    fn test_missing_structure_yields_empty_map() {
        let map = extract(&["nothing", "to", "see"], &Template::idt());
        assert_eq!(map, FieldMap::default());
        let empty: [&str; 0] = [];
        assert_eq!(extract(&empty, &Template::idt()), FieldMap::default());
    }

    #[test]
    fn test_custom_offset_table() {
        let template = Template {
            rules: vec![KeywordRule {
                keyword: "P.O. #".to_string(),
                field: Field::PoNumber,
                offset: Some(2),
            }],
        };
        let map = extract(&["P.O. #", "x", "PO-7"], &template);
        assert_eq!(map.po_number, "PO-7");
    }
}
