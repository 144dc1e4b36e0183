//! Minimal CSV reading and writing: comma delimiter, `"` quoting, doubled
//! quotes as escape. Quoted fields may contain delimiters and line breaks.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CsvSyntaxError {
    #[error("line {line}: unterminated quoted field")]
    UnterminatedQuote { line: usize },

    #[error("line {line}: unexpected character {found:?} after closing quote")]
    TrailingAfterQuote { line: usize, found: char },
}

/// One parsed record and the line it started on (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    pub line: usize,
    pub fields: Vec<String>,
}

/// Split a whole document into records. Blank lines are skipped; a leading
/// UTF-8 BOM is ignored; `\r\n` and `\n` both end a record.
pub fn parse_records(text: &str) -> Result<Vec<CsvRecord>, CsvSyntaxError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1usize;

    while chars.peek().is_some() {
        let start_line = line;
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut end_of_record = false;

        while !end_of_record {
            if chars.peek() == Some(&'"') {
                chars.next();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '"' {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            field.push('"');
                        } else {
                            closed = true;
                            break;
                        }
                    } else {
                        if c == '\n' {
                            line += 1;
                        }
                        field.push(c);
                    }
                }
                if !closed {
                    return Err(CsvSyntaxError::UnterminatedQuote { line: start_line });
                }
                match chars.next() {
                    Some(',') => fields.push(std::mem::take(&mut field)),
                    Some('\r') if chars.peek() == Some(&'\n') => {
                        chars.next();
                        line += 1;
                        end_of_record = true;
                    }
                    Some('\n') => {
                        line += 1;
                        end_of_record = true;
                    }
                    None => end_of_record = true,
                    Some(found) => {
                        return Err(CsvSyntaxError::TrailingAfterQuote { line, found });
                    }
                }
            } else {
                loop {
                    match chars.next() {
                        Some(',') => {
                            fields.push(std::mem::take(&mut field));
                            break;
                        }
                        Some('\r') if chars.peek() == Some(&'\n') => {
                            chars.next();
                            line += 1;
                            end_of_record = true;
                            break;
                        }
                        Some('\n') => {
                            line += 1;
                            end_of_record = true;
                            break;
                        }
                        Some(c) => field.push(c),
                        None => {
                            end_of_record = true;
                            break;
                        }
                    }
                }
            }
        }
        fields.push(field);

        let blank = fields.len() == 1 && fields[0].is_empty();
        if !blank {
            records.push(CsvRecord {
                line: start_line,
                fields,
            });
        }
    }

    Ok(records)
}

/// Quote a field if it contains a delimiter, quote, or line break.
pub fn quote_field(value: &str) -> String {
    let needs_quoting =
        value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r');

    if needs_quoting {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Append one record, newline-terminated.
pub fn write_record<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let line = fields
        .iter()
        .map(|f| quote_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}
