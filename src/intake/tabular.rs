//! CSV upload decoding.
//!
//! Headers are matched case-insensitively against a small alias table, so
//! exports from the old spreadsheet (Chinese headers) and hand-written files
//! (`code,name,type,price,owner`) both load.

use csv::{ReaderBuilder, StringRecord, Trim};

use super::IntakeEntry;
use crate::error::StockError;
use crate::model::Person;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    ProductCode,
    Name,
    Type,
    Price,
    Owner,
}

fn column_for(header: &str) -> Option<Column> {
    let header = header.trim().to_lowercase();
    let column = match header.as_str() {
        "product_code" | "code" | "product" | "產品代碼" => Column::ProductCode,
        "name" | "名稱" => Column::Name,
        "type" | "種類" => Column::Type,
        "price" | "價格" => Column::Price,
        "owner_name" | "owner" | "owner_user" | "holder" | "持有人" => Column::Owner,
        _ => return None,
    };
    Some(column)
}

/// Decode an uploaded CSV into intake entries, one per non-blank data row.
pub fn parse_csv(data: &[u8]) -> Result<Vec<IntakeEntry>, StockError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|e| StockError::validation(format!("unreadable CSV header: {e}")))?
        .clone();
    let columns: Vec<Option<Column>> = headers.iter().map(column_for).collect();
    if !columns.contains(&Some(Column::ProductCode)) {
        log::warn!("CSV upload has no product code column; headers: {headers:?}");
    }

    let mut entries = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            StockError::validation(format!("unreadable CSV row {}: {e}", line + 2))
        })?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        entries.push(entry_from_record(&columns, &record));
    }
    Ok(entries)
}

fn entry_from_record(columns: &[Option<Column>], record: &StringRecord) -> IntakeEntry {
    let mut entry = IntakeEntry::default();
    for (column, value) in columns.iter().zip(record.iter()) {
        let Some(column) = column else { continue };
        let value = (!value.is_empty()).then(|| value.to_string());
        match column {
            Column::ProductCode => entry.product_code = value.unwrap_or_default(),
            Column::Name => entry.name = value,
            Column::Type => entry.product_type = value,
            Column::Price => entry.price = value,
            Column::Owner => entry.owner_name = value,
        }
    }
    entry
}

/// Decode a directory export (`id_number,name,department,email,phone,title`)
/// for seeding the in-memory backend. Only `id_number` and `name` are required.
pub fn parse_people_csv(data: &[u8]) -> Result<Vec<Person>, StockError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(data);

    let mut people = Vec::new();
    for (line, person) in reader.deserialize::<Person>().enumerate() {
        let person = person.map_err(|e| {
            StockError::validation(format!("unreadable people row {}: {e}", line + 2))
        })?;
        if person.id_number.is_empty() || person.name.is_empty() {
            return Err(StockError::validation(format!(
                "people row {} needs id_number and name",
                line + 2
            )));
        }
        people.push(person);
    }
    Ok(people)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_headers() {
        let csv = "product_code,name,type,price,owner_name\n\
                   NB,Notebook,IT,25000,May\n\
                   NB,Notebook,IT,25000,\n";
        let entries = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].product_code, "NB");
        assert_eq!(entries[0].name.as_deref(), Some("Notebook"));
        assert_eq!(entries[0].price.as_deref(), Some("25000"));
        assert_eq!(entries[0].owner_name.as_deref(), Some("May"));
        assert_eq!(entries[1].owner_name, None);
    }

    #[test]
    fn test_chinese_headers_with_bom() {
        let csv = "\u{FEFF}產品代碼,名稱,種類,價格,持有人\nSK,掃描器,設備,1200,陳小美\n";
        let entries = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].product_code, "SK");
        assert_eq!(entries[0].product_type.as_deref(), Some("設備"));
        assert_eq!(entries[0].owner_name.as_deref(), Some("陳小美"));
    }

    #[test]
    fn test_aliases_short_rows_and_blank_lines() {
        let csv = "Code,Owner\nPR,\n\n,\nPR\n";
        let entries = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.product_code == "PR"));
        assert!(entries.iter().all(|e| e.price.is_none()));
    }

    #[test]
    fn test_missing_code_column_yields_blank_codes() {
        let csv = "name,price\nNotebook,10\n";
        let entries = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].product_code.is_empty());
    }

    #[test]
    fn test_people_csv_optional_columns() {
        let csv = "id_number,name,department,title\nA100,May Chen,IT,Engineer\nB300,Kai Wu,,\n";
        let people = parse_people_csv(csv.as_bytes()).unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].title.as_deref(), Some("Engineer"));
        assert_eq!(people[0].department.as_deref(), Some("IT"));
        assert_eq!(people[1].department, None);
        assert_eq!(people[1].email, None);

        let err = parse_people_csv(b"id_number,name\n,Nobody\n").unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));
    }
}
