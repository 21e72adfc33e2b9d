//! Positional decoder for one CNAB line (C2).

use chrono::{NaiveDate, NaiveTime};

pub const LINE_LENGTH: usize = 80;

/// A transaction decoded from one line, before it is given an idempotency
/// key or an owning upload id by the line processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransaction {
    /// Legacy artefact: the raw nature digit, preserved as an observable field.
    pub bank_code: String,
    pub nature_code: u8,
    pub amount_cents: i64,
    pub cpf_cnpj: String,
    pub card: String,
    pub transaction_time: NaiveTime,
    pub store_owner: String,
    pub store_name: String,
    pub transaction_date: NaiveDate,
}

impl ParsedTransaction {
    /// `+` for income natures {1,4,5,6,7,8}, `-` for expense natures {2,3,9}.
    /// Pure logic; the sign itself is never persisted.
    pub fn is_income(&self) -> bool {
        matches!(self.nature_code, 1 | 4 | 5 | 6 | 7 | 8)
    }

    pub fn signed_amount_cents(&self) -> i64 {
        if self.is_income() {
            self.amount_cents
        } else {
            -self.amount_cents
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line_index}: {reason}")]
pub struct ParseError {
    pub line_index: u64,
    pub reason: String,
}

impl ParseError {
    fn new(line_index: u64, reason: impl Into<String>) -> Self {
        Self {
            line_index,
            reason: reason.into(),
        }
    }
}

/// Decodes one 80-byte line. Decoding is strictly byte-positional: the
/// fields are ASCII digits and ASCII-padded names, so indexing by byte
/// (not `char`) is correct and required — non-ASCII input that would
/// misalign byte boundaries is rejected rather than decoded leniently.
pub fn parse_line(line: &[u8], line_index: u64) -> Result<ParsedTransaction, ParseError> {
    if !line.is_ascii() {
        return Err(ParseError::new(line_index, "non-ascii byte in line"));
    }
    if line.len() != LINE_LENGTH {
        return Err(ParseError::new(
            line_index,
            format!("expected {LINE_LENGTH} bytes, got {}", line.len()),
        ));
    }

    let mut cursor = Cursor { bytes: line, pos: 0 };
    let nature_raw = cursor.take(1);
    let date_raw = cursor.take(8);
    let amount_raw = cursor.take(10);
    let cpf_raw = cursor.take(11);
    let card_raw = cursor.take(12);
    let time_raw = cursor.take(6);
    let store_owner_raw = cursor.take(14);
    let store_name_raw = cursor.take(18);

    let nature_code = nature_raw[0];
    if !nature_code.is_ascii_digit() || nature_code == b'0' {
        return Err(ParseError::new(line_index, "invalid nature code"));
    }
    let nature_code = nature_code - b'0';

    let transaction_date = parse_date(date_raw)
        .ok_or_else(|| ParseError::new(line_index, "invalid date"))?;

    let amount_cents = parse_ascii_digits(amount_raw)
        .ok_or_else(|| ParseError::new(line_index, "invalid amount"))?;

    let transaction_time = parse_time(time_raw)
        .ok_or_else(|| ParseError::new(line_index, "invalid time"))?;

    Ok(ParsedTransaction {
        bank_code: (nature_raw[0] as char).to_string(),
        nature_code,
        amount_cents,
        cpf_cnpj: trim_trailing_spaces(cpf_raw),
        card: trim_trailing_spaces(card_raw),
        transaction_time,
        store_owner: trim_trailing_spaces(store_owner_raw),
        store_name: trim_trailing_spaces(store_name_raw),
        transaction_date,
    })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        slice
    }
}

fn trim_trailing_spaces(bytes: &[u8]) -> String {
    let trimmed = bytes
        .iter()
        .rposition(|&b| b != b' ')
        .map(|idx| &bytes[..=idx])
        .unwrap_or(&[]);
    String::from_utf8_lossy(trimmed).into_owned()
}

fn parse_ascii_digits(bytes: &[u8]) -> Option<i64> {
    if !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn parse_date(bytes: &[u8]) -> Option<NaiveDate> {
    let s = std::str::from_utf8(bytes).ok()?;
    NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}

fn parse_time(bytes: &[u8]) -> Option<NaiveTime> {
    let s = std::str::from_utf8(bytes).ok()?;
    NaiveTime::parse_from_str(s, "%H%M%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_line() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"1"); // nature
        bytes.extend_from_slice(b"20190115"); // date
        bytes.extend_from_slice(b"0000010000"); // amount cents = 10000
        bytes.extend_from_slice(b"11111111111"); // cpf
        bytes.extend_from_slice(b"123456789012"); // card
        bytes.extend_from_slice(b"120000"); // time
        bytes.extend_from_slice(b"STORE OWNER   "); // 14 chars
        bytes.extend_from_slice(b"STORE NAME        "); // 18 chars
        assert_eq!(bytes.len(), LINE_LENGTH);

        let tx = parse_line(&bytes, 0).unwrap();
        assert_eq!(tx.nature_code, 1);
        assert_eq!(tx.bank_code, "1");
        assert_eq!(tx.amount_cents, 10000);
        assert_eq!(tx.cpf_cnpj, "11111111111");
        assert_eq!(tx.card, "123456789012");
        assert_eq!(tx.store_owner, "STORE OWNER");
        assert_eq!(tx.store_name, "STORE NAME");
        assert_eq!(tx.transaction_date, NaiveDate::from_ymd_opt(2019, 1, 15).unwrap());
        assert_eq!(tx.transaction_time, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert!(tx.is_income());
        assert_eq!(tx.signed_amount_cents(), 10000);
    }

    #[test]
    fn rejects_short_lines() {
        let err = parse_line(b"too short", 5).unwrap_err();
        assert_eq!(err.line_index, 5);
    }

    #[test]
    fn rejects_non_ascii() {
        let mut bytes = vec![b' '; LINE_LENGTH];
        bytes[0] = 0xFF;
        let err = parse_line(&bytes, 0).unwrap_err();
        assert!(err.reason.contains("ascii"));
    }

    #[test]
    fn rejects_invalid_date() {
        let mut bytes = vec![b'0'; LINE_LENGTH];
        bytes[0] = b'1';
        // date field (bytes 1..9) is all zeros -> invalid date
        let err = parse_line(&bytes, 0).unwrap_err();
        assert!(err.reason.contains("date") || err.reason.contains("amount"));
    }

    #[test]
    fn expense_natures_are_negative() {
        for nature in [2u8, 3, 9] {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(format!("{nature}").as_bytes());
            bytes.extend_from_slice(b"20190115");
            bytes.extend_from_slice(b"0000050000");
            bytes.extend_from_slice(b"11111111111");
            bytes.extend_from_slice(b"123456789012");
            bytes.extend_from_slice(b"120000");
            bytes.extend_from_slice(b"STORE OWNER   ");
            bytes.extend_from_slice(b"STORE NAME        ");
            let tx = parse_line(&bytes, 0).unwrap();
            assert!(!tx.is_income());
            assert_eq!(tx.signed_amount_cents(), -50000);
        }
    }
}
