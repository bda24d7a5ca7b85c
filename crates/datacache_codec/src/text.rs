//! Delimited text (CSV/TSV) decoding with per-column type inference.

use datacache_common::{Column, ColumnData, Table};

use crate::error::CodecError;
use crate::options::DecodeOptions;

/// A parsed record and the line it started on.
struct Record {
    line: usize,
    fields: Vec<String>,
}

/// Decodes delimited text into a table.
///
/// Quoted fields may contain delimiters, doubled quotes and newlines.
/// Blank lines are skipped. Every record must have as many fields as the
/// first one. Empty cells become nulls.
pub fn decode_delimited(bytes: &[u8], options: &DecodeOptions) -> Result<Table, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|e| CodecError::Text {
        line: 1 + bytes[..e.valid_up_to()].iter().filter(|b| **b == b'\n').count(),
        reason: format!("invalid UTF-8: {e}"),
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let records = split_records(
        text,
        char::from(options.effective_delimiter()),
        char::from(options.quote),
    )?;
    let mut records = records.into_iter();

    let (names, body): (Vec<String>, Vec<Record>) = if options.has_header {
        match records.next() {
            Some(header) => (header.fields, records.collect()),
            None => return Ok(Table::empty()),
        }
    } else {
        let body: Vec<Record> = records.collect();
        let width = body.first().map_or(0, |r| r.fields.len());
        ((0..width).map(|i| format!("column_{i}")).collect(), body)
    };

    let width = names.len();
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(body.len()); width];
    for record in body {
        if record.fields.len() != width {
            return Err(CodecError::Text {
                line: record.line,
                reason: format!(
                    "expected {width} fields, found {}",
                    record.fields.len()
                ),
            });
        }
        for (column, field) in cells.iter_mut().zip(record.fields) {
            column.push(if field.is_empty() { None } else { Some(field) });
        }
    }

    let columns = names
        .into_iter()
        .zip(cells)
        .map(|(name, values)| Column::new(name, infer_column(values)))
        .collect();

    Table::new(columns).map_err(|e| CodecError::Text {
        line: 1,
        reason: e.to_string(),
    })
}

fn split_records(text: &str, delimiter: char, quote: char) -> Result<Vec<Record>, CodecError> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == quote {
                if chars.peek() == Some(&quote) {
                    chars.next();
                    field.push(quote);
                } else {
                    in_quotes = false;
                }
            } else {
                if c == '\n' {
                    line += 1;
                }
                field.push(c);
            }
            continue;
        }

        match c {
            c if c == quote && field.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            c if c == delimiter => {
                fields.push(std::mem::take(&mut field));
                quoted = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                if !is_blank(&fields, quoted) {
                    records.push(Record {
                        line: record_line,
                        fields: std::mem::take(&mut fields),
                    });
                }
                fields.clear();
                quoted = false;
                line += 1;
                record_line = line;
            }
            c => field.push(c),
        }
    }

    if in_quotes {
        return Err(CodecError::Text {
            line: record_line,
            reason: "unterminated quoted field".to_string(),
        });
    }

    fields.push(field);
    if !is_blank(&fields, quoted) {
        records.push(Record {
            line: record_line,
            fields,
        });
    }

    Ok(records)
}

/// A record made of a single unquoted empty field is a blank line.
fn is_blank(fields: &[String], quoted: bool) -> bool {
    !quoted && fields.len() == 1 && fields[0].is_empty()
}

fn infer_column(values: Vec<Option<String>>) -> ColumnData {
    let present = || values.iter().flatten().map(|v| v.trim());

    if present().all(|v| v.parse::<i64>().is_ok()) {
        return ColumnData::Int(
            values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse().ok()))
                .collect(),
        );
    }
    if present().all(|v| parse_float(v).is_some()) {
        return ColumnData::Float(
            values
                .iter()
                .map(|v| v.as_deref().and_then(|s| parse_float(s.trim())))
                .collect(),
        );
    }
    if present().all(|v| parse_bool(v).is_some()) {
        return ColumnData::Bool(
            values
                .iter()
                .map(|v| v.as_deref().and_then(|s| parse_bool(s.trim())))
                .collect(),
        );
    }
    ColumnData::Text(values)
}

/// Finite numbers only; words such as `nan` or `inf` stay text.
fn parse_float(s: &str) -> Option<f64> {
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacache_common::Shape;

    fn decode(text: &str) -> Table {
        decode_delimited(text.as_bytes(), &DecodeOptions::default()).unwrap()
    }

    #[test]
    fn header_and_rows() {
        let t = decode("id,name\n1,alice\n2,bob\n");
        assert_eq!(t.shape(), Shape::new(2, 2));
        assert_eq!(t.column_names().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(
            t.column("id").unwrap().data,
            ColumnData::Int(vec![Some(1), Some(2)])
        );
        assert_eq!(
            t.column("name").unwrap().data,
            ColumnData::Text(vec![Some("alice".into()), Some("bob".into())])
        );
    }

    #[test]
    fn type_inference() {
        let t = decode("i,f,b,s\n1,1.5,true,x\n-2,2,FALSE,3\n");
        assert_eq!(t.column("i").unwrap().data.type_name(), "int");
        assert_eq!(
            t.column("f").unwrap().data,
            ColumnData::Float(vec![Some(1.5), Some(2.0)])
        );
        assert_eq!(
            t.column("b").unwrap().data,
            ColumnData::Bool(vec![Some(true), Some(false)])
        );
        assert_eq!(t.column("s").unwrap().data.type_name(), "text");
    }

    #[test]
    fn nan_words_stay_text() {
        let t = decode("v\nnan\ninf\n");
        assert_eq!(t.column("v").unwrap().data.type_name(), "text");
    }

    #[test]
    fn empty_cells_are_null() {
        let t = decode("a,b\n1,\n,x\n");
        assert_eq!(
            t.column("a").unwrap().data,
            ColumnData::Int(vec![Some(1), None])
        );
        assert_eq!(
            t.column("b").unwrap().data,
            ColumnData::Text(vec![None, Some("x".into())])
        );
    }

    #[test]
    fn quoted_fields() {
        let t = decode("a,b\n\"x,y\",\"say \"\"hi\"\"\"\n\"multi\nline\",z\n");
        assert_eq!(t.shape(), Shape::new(2, 2));
        assert_eq!(
            t.column("a").unwrap().data,
            ColumnData::Text(vec![Some("x,y".into()), Some("multi\nline".into())])
        );
        assert_eq!(
            t.column("b").unwrap().data,
            ColumnData::Text(vec![Some("say \"hi\"".into()), Some("z".into())])
        );
    }

    #[test]
    fn crlf_and_missing_trailing_newline() {
        let t = decode("a,b\r\n1,2\r\n3,4");
        assert_eq!(t.shape(), Shape::new(2, 2));
        assert_eq!(
            t.column("b").unwrap().data,
            ColumnData::Int(vec![Some(2), Some(4)])
        );
    }

    #[test]
    fn blank_lines_skipped() {
        let t = decode("a\n1\n\n2\n\n");
        assert_eq!(t.shape(), Shape::new(2, 1));
    }

    #[test]
    fn tab_delimiter() {
        let opts = DecodeOptions::default().with_delimiter(b'\t');
        let t = decode_delimited(b"a\tb\n1\t2\n", &opts).unwrap();
        assert_eq!(t.shape(), Shape::new(1, 2));
    }

    #[test]
    fn headerless_names_columns() {
        let opts = DecodeOptions::default().without_header();
        let t = decode_delimited(b"1,2\n3,4\n", &opts).unwrap();
        assert_eq!(t.shape(), Shape::new(2, 2));
        assert_eq!(
            t.column_names().collect::<Vec<_>>(),
            vec!["column_0", "column_1"]
        );
    }

    #[test]
    fn header_only_has_zero_rows() {
        let t = decode("a,b\n");
        assert_eq!(t.shape(), Shape::new(0, 2));
    }

    #[test]
    fn empty_input_is_empty_table() {
        assert_eq!(decode("").shape(), Shape::new(0, 0));
    }

    #[test]
    fn bom_stripped() {
        let t = decode("\u{feff}a\n1\n");
        assert_eq!(t.column_names().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn ragged_row_reports_line() {
        let err = decode_delimited(b"a,b\n1,2\n3\n", &DecodeOptions::default()).unwrap_err();
        match err {
            CodecError::Text { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("expected 2 fields, found 1"));
            }
            other => panic!("expected Text error, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_quote_errors() {
        let err = decode_delimited(b"a\n\"open\n", &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, CodecError::Text { line: 2, .. }));
    }

    #[test]
    fn invalid_utf8_errors() {
        let err = decode_delimited(b"a\n\xff\n", &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, CodecError::Text { line: 2, .. }));
    }
}
