// ABOUTME: CSV serialization of result pages
// ABOUTME: Header row plus one record per row, RFC 4180 quoting, no index column

use crate::models::ResultPage;

const DELIMITER: char = ',';
const QUALIFIER: char = '"';
const RECORD_DELIMITER: &str = "\n";

/// Quote a field only when it contains a delimiter, quote, or line break
fn qualify(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c == DELIMITER || c == QUALIFIER || c == '\n' || c == '\r');
    if needs_quotes {
        let escaped = value.replace(QUALIFIER, "\"\"");
        format!("{}{}{}", QUALIFIER, escaped, QUALIFIER)
    } else {
        value.to_string()
    }
}

fn write_record(out: &mut String, fields: impl Iterator<Item = String>) {
    let line = fields
        .map(|field| qualify(&field))
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string());
    out.push_str(&line);
    out.push_str(RECORD_DELIMITER);
}

/// Render `page` as UTF-8 CSV
pub fn to_csv(page: &ResultPage) -> Vec<u8> {
    let mut out = String::new();
    write_record(&mut out, page.columns.iter().cloned());
    for row in &page.rows {
        write_record(&mut out, row.iter().map(|value| value.to_string()));
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    /// Read output back with an independent RFC 4180 reader
    fn parse(bytes: &[u8]) -> Vec<Vec<String>> {
        ::csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes)
            .into_records()
            .map(|record| record.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    fn page(rows: Vec<Vec<Value>>) -> ResultPage {
        ResultPage {
            table: "Orders".to_string(),
            offset: 0,
            columns: vec!["id".to_string(), "note".to_string(), "total".to_string()],
            rows,
        }
    }

    #[test]
    fn test_plain_output() {
        let bytes = to_csv(&page(vec![
            vec![Value::Int(1), Value::Text("first".into()), Value::Decimal("9.50".into())],
            vec![Value::Int(2), Value::Null, Value::Decimal("0.00".into())],
        ]));
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "id,note,total\n1,first,9.50\n2,,0.00\n"
        );
    }

    #[test]
    fn test_embedded_delimiters_are_quoted() {
        let bytes = to_csv(&page(vec![vec![
            Value::Int(1),
            Value::Text("said \"hi\", then left".into()),
            Value::Text("line\nbreak".into()),
        ]]));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"said \"\"hi\"\", then left\""));
        assert!(text.contains("\"line\nbreak\""));
    }

    #[test]
    fn test_round_trip() {
        let original = page(vec![
            vec![Value::Int(7), Value::Text("a, b".into()), Value::Float(2.5)],
            vec![Value::Int(8), Value::Text("quote \" inside".into()), Value::Bool(false)],
            vec![Value::Int(9), Value::Text("Zürich".into()), Value::Null],
            vec![Value::Int(10), Value::Text("two\nlines".into()), Value::Text("cr\r\nlf".into())],
        ]);
        let parsed = parse(&to_csv(&original));

        assert_eq!(parsed[0], original.columns);
        assert_eq!(parsed.len(), original.rows.len() + 1);
        for (record, row) in parsed[1..].iter().zip(&original.rows) {
            let expected: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            assert_eq!(record, &expected);
        }
    }

    #[test]
    fn test_empty_page_still_has_header() {
        let text = String::from_utf8(to_csv(&page(Vec::new()))).unwrap();
        assert_eq!(text, "id,note,total\n");
    }
}
