//! Google Sheets v4 tabular source.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    application::ports::{RowFetch, TabularError, TabularSource},
    domain::entities::SheetReference,
};

#[derive(Debug, Clone)]
pub enum SheetsAuth {
    /// `key=` query parameter; enough for link-shared sheets.
    ApiKey(String),
    /// OAuth access token sent as `Authorization: Bearer`.
    Bearer(String),
}

/// A parsed A1 range: column span plus the row holding the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRange {
    pub sheet: Option<String>,
    pub first_column: String,
    pub last_column: String,
    pub header_row: u64,
}

impl SheetRange {
    /// Parse `Sheet!A:N`, `Sheet!A2:N` or `A1:N100`; trailing row numbers are ignored.
    pub fn parse(range: &str) -> Result<Self, TabularError> {
        let invalid = |reason: &str| TabularError::InvalidRange {
            range: range.to_string(),
            reason: reason.to_string(),
        };

        let (sheet, cells) = match range.rsplit_once('!') {
            Some((sheet, cells)) => {
                let sheet = sheet
                    .strip_prefix('\'')
                    .and_then(|inner| inner.strip_suffix('\''))
                    .map(|inner| inner.replace("''", "'"))
                    .unwrap_or_else(|| sheet.to_string());
                if sheet.is_empty() {
                    return Err(invalid("empty sheet name"));
                }
                (Some(sheet), cells)
            }
            None => (None, range),
        };

        let (start, end) = cells
            .split_once(':')
            .ok_or_else(|| invalid("expected `<start>:<end>`"))?;
        let (first_column, start_row) = split_cell(start).ok_or_else(|| invalid("bad start cell"))?;
        let (last_column, _) = split_cell(end).ok_or_else(|| invalid("bad end cell"))?;

        Ok(Self {
            sheet,
            first_column,
            last_column,
            header_row: start_row.unwrap_or(1),
        })
    }

    /// Range covering one sheet row.
    pub fn row(&self, row: u64) -> String {
        let prefix = match &self.sheet {
            Some(sheet) => format!("'{}'!", sheet.replace('\'', "''")),
            None => String::new(),
        };
        format!("{prefix}{}{row}:{}{row}", self.first_column, self.last_column)
    }

    /// Open-ended range from `row` to the last populated row of the sheet.
    pub fn rows_from(&self, row: u64) -> String {
        let prefix = match &self.sheet {
            Some(sheet) => format!("'{}'!", sheet.replace('\'', "''")),
            None => String::new(),
        };
        format!("{prefix}{}{row}:{}", self.first_column, self.last_column)
    }

    /// Sheet row holding data row `offset`.
    pub fn data_row(&self, offset: u64) -> Option<u64> {
        self.header_row.checked_add(1)?.checked_add(offset)
    }
}

fn split_cell(cell: &str) -> Option<(String, Option<u64>)> {
    let digits_at = cell
        .find(|ch: char| ch.is_ascii_digit())
        .unwrap_or(cell.len());
    let (column, row) = cell.split_at(digits_at);
    if column.is_empty() || !column.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return None;
    }
    let row = if row.is_empty() {
        None
    } else {
        Some(row.parse::<u64>().ok().filter(|row| *row > 0)?)
    };
    Some((column.to_ascii_uppercase(), row))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

fn header_text(cell: &Value) -> String {
    match cell {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn decode(body: BatchGetResponse) -> Result<RowFetch, TabularError> {
    let mut ranges = body.value_ranges.into_iter();
    let header_range = ranges
        .next()
        .ok_or_else(|| TabularError::Decode("response has no header range".into()))?;
    let row_range = ranges.next().unwrap_or_default();

    let header = header_range
        .values
        .into_iter()
        .next()
        .map(|cells| cells.iter().map(header_text).collect())
        .unwrap_or_default();
    let row = row_range.values.into_iter().next().filter(|row| !row.is_empty());

    Ok(RowFetch { header, row })
}

/// Reads header and row in one `values:batchGet` round trip.
#[derive(Debug, Clone)]
pub struct GoogleSheetsSource {
    client: Client,
    api_base: Url,
    auth: Option<SheetsAuth>,
}

impl GoogleSheetsSource {
    /// Without `auth` every fetch fails; deployments that only process invoices need none.
    pub fn new(api_base: Url, auth: Option<SheetsAuth>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("docket/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_base,
            auth,
        })
    }

    fn batch_url(&self, sheet_id: &str, ranges: &[String]) -> Result<Url, TabularError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| TabularError::Request(format!("`{}` cannot be a base", self.api_base)))?
            .pop_if_empty()
            .push("spreadsheets")
            .push(sheet_id)
            .push("values:batchGet");
        {
            let mut query = url.query_pairs_mut();
            for range in ranges {
                query.append_pair("ranges", range);
            }
            query
                .append_pair("majorDimension", "ROWS")
                .append_pair("valueRenderOption", "UNFORMATTED_VALUE")
                .append_pair("dateTimeRenderOption", "FORMATTED_STRING");
            if let Some(SheetsAuth::ApiKey(key)) = &self.auth {
                query.append_pair("key", key);
            }
        }
        Ok(url)
    }

    async fn batch_get(
        &self,
        sheet_id: &str,
        ranges: &[String],
    ) -> Result<BatchGetResponse, TabularError> {
        let Some(auth) = &self.auth else {
            return Err(TabularError::Request(
                "no Google Sheets credential configured".into(),
            ));
        };
        let url = self.batch_url(sheet_id, ranges)?;

        let mut request = self.client.get(url);
        if let SheetsAuth::Bearer(token) = auth {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|err| TabularError::Request(err.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| TabularError::Request(err.to_string()))?;
        if !status.is_success() {
            return Err(TabularError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| TabularError::Decode(err.to_string()))
    }
}

#[async_trait]
impl TabularSource for GoogleSheetsSource {
    async fn fetch_row(
        &self,
        sheet: &SheetReference,
        offset: u64,
    ) -> Result<RowFetch, TabularError> {
        let range = SheetRange::parse(&sheet.range)?;
        let data_row = sheet_row(&range, &sheet.range, offset)?;
        let body = self
            .batch_get(
                &sheet.sheet_id,
                &[range.row(range.header_row), range.row(data_row)],
            )
            .await?;
        decode(body)
    }

    async fn has_rows_after(
        &self,
        sheet: &SheetReference,
        offset: u64,
    ) -> Result<bool, TabularError> {
        let range = SheetRange::parse(&sheet.range)?;
        let next_row = sheet_row(&range, &sheet.range, offset)?
            .checked_add(1)
            .ok_or_else(|| TabularError::InvalidRange {
                range: sheet.range.clone(),
                reason: format!("offset {offset} overflows the row index"),
            })?;
        let body = self
            .batch_get(&sheet.sheet_id, &[range.rows_from(next_row)])
            .await?;
        Ok(any_populated_row(&body))
    }
}

fn sheet_row(range: &SheetRange, raw: &str, offset: u64) -> Result<u64, TabularError> {
    range.data_row(offset).ok_or_else(|| TabularError::InvalidRange {
        range: raw.to_string(),
        reason: format!("offset {offset} overflows the row index"),
    })
}

fn any_populated_row(body: &BatchGetResponse) -> bool {
    body.value_ranges.iter().any(|range| {
        range.values.iter().any(|row| {
            row.iter()
                .any(|cell| !matches!(cell, Value::Null) && cell.as_str() != Some(""))
        })
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn open_ended_ranges_and_populated_rows() {
        let range = SheetRange::parse("Form Responses 1!A:N").expect("range");
        assert_eq!(range.rows_from(5), "'Form Responses 1'!A5:N");

        let blank: BatchGetResponse = serde_json::from_value(json!({
            "valueRanges": [{"range": "A5:N9", "values": [[], ["", null]]}]
        }))
        .expect("blank body");
        assert!(!any_populated_row(&blank));

        let later: BatchGetResponse = serde_json::from_value(json!({
            "valueRanges": [{"range": "A5:N9", "values": [[], [], ["1/3/2026 10:30:00"]]}]
        }))
        .expect("later body");
        assert!(any_populated_row(&later));
    }

    #[test]
    fn parses_ranges_with_and_without_rows() {
        let range = SheetRange::parse("Form Responses 1!A:N").expect("range");
        assert_eq!(range.sheet.as_deref(), Some("Form Responses 1"));
        assert_eq!(range.header_row, 1);
        assert_eq!(range.row(2), "'Form Responses 1'!A2:N2");
        assert_eq!(range.data_row(0), Some(2));

        let range = SheetRange::parse("'Owner''s'!b3:k").expect("quoted");
        assert_eq!(range.sheet.as_deref(), Some("Owner's"));
        assert_eq!(range.first_column, "B");
        assert_eq!(range.data_row(4), Some(8));
        assert_eq!(range.row(3), "'Owner''s'!B3:K3");

        let range = SheetRange::parse("A1:C10").expect("bare");
        assert_eq!(range.sheet, None);
        assert_eq!(range.row(1), "A1:C1");
    }

    #[test]
    fn rejects_malformed_ranges() {
        for bad in ["A", "!A:B", "Sheet!1:2", "Sheet!A0:B"] {
            assert!(SheetRange::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn decodes_header_and_missing_rows() {
        let body: BatchGetResponse = serde_json::from_value(json!({
            "spreadsheetId": "abc",
            "valueRanges": [
                {"range": "A1:C1", "values": [["Timestamp", 2, "Name"]]},
                {"range": "A2:C2", "values": [["1/2/2026 9:00:00", 12.5, true]]}
            ]
        }))
        .expect("body");
        let fetch = decode(body).expect("decode");
        assert_eq!(fetch.header, vec!["Timestamp", "2", "Name"]);
        assert_eq!(
            fetch.row,
            Some(vec![json!("1/2/2026 9:00:00"), json!(12.5), json!(true)])
        );

        let body: BatchGetResponse = serde_json::from_value(json!({
            "valueRanges": [{"range": "A1:C1", "values": [["Timestamp"]]}, {"range": "A9:C9"}]
        }))
        .expect("body");
        let fetch = decode(body).expect("decode");
        assert_eq!(fetch.header, vec!["Timestamp"]);
        assert_eq!(fetch.row, None);
    }

    #[test]
    fn batch_url_carries_ranges_and_key() {
        let source = GoogleSheetsSource::new(
            Url::parse("https://sheets.googleapis.com/v4").expect("url"),
            Some(SheetsAuth::ApiKey("k".into())),
        )
        .expect("client");
        let url = source
            .batch_url("sheet-1", &["A1:B1".into(), "A2:B2".into()])
            .expect("url");
        assert_eq!(url.path(), "/v4/spreadsheets/sheet-1/values:batchGet");
        let query = url.query().unwrap_or_default();
        assert!(query.contains("ranges=A1%3AB1&ranges=A2%3AB2"), "{query}");
        assert!(query.ends_with("key=k"), "{query}");
    }

    #[tokio::test]
    async fn fetch_without_credential_fails_before_any_request() {
        let source = GoogleSheetsSource::new(
            Url::parse("http://127.0.0.1:9/v4").expect("url"),
            None,
        )
        .expect("client");
        let sheet = SheetReference {
            sheet_id: "sheet-1".into(),
            range: "A:C".into(),
        };
        let err = source.fetch_row(&sheet, 0).await.expect_err("no credential");
        assert!(matches!(err, TabularError::Request(message) if message.contains("credential")));
    }
}
