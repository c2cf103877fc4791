//! CSV reading and writing for [`Frame`]s.
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//!   Output is always UTF-8.
//! - **Nulls**: empty cells and placeholder tokens (`NA`, `NaN`, `null`, ...)
//!   are read as nulls, so every column starts out as a nullable string column.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::{
    data::{Value, is_null_token},
    frame::{Column, Frame},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads a whole CSV source into a string-typed [`Frame`].
pub fn read_frame<R>(reader: R, delimiter: u8, encoding: &'static Encoding) -> Result<Frame>
where
    R: Read,
{
    let mut reader = open_csv_reader(reader, delimiter);
    let header_record = reader.byte_headers()?.clone();
    let headers = decode_record(&header_record, encoding)?
        .into_iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect::<Vec<_>>();

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", row_idx + 2))?;
        for (col_idx, column) in cells.iter_mut().enumerate() {
            let raw = decoded.get(col_idx).map(String::as_str).unwrap_or("");
            column.push((!is_null_token(raw)).then(|| raw.trim().to_string()));
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| Column::from_strings(name, values))
        .collect();
    Frame::new(columns).context("Assembling table from CSV")
}

pub fn read_frame_from_path(
    path: &Path,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> Result<Frame> {
    let delimiter = resolve_input_delimiter(path, delimiter);
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    read_frame(reader, delimiter, encoding).with_context(|| format!("Reading {path:?}"))
}

pub fn write_frame<W>(writer: &mut csv::Writer<W>, frame: &Frame) -> Result<()>
where
    W: Write,
{
    writer.write_record(frame.column_names())?;
    for row_idx in 0..frame.row_count() {
        let record = frame
            .row(row_idx)
            .into_iter()
            .map(|cell| cell.map(Value::key_token).unwrap_or_default())
            .collect::<Vec<_>>();
        writer.write_record(&record)?;
    }
    writer.flush().context("Flushing CSV output")?;
    Ok(())
}

pub fn write_frame_to_path(path: Option<&Path>, delimiter: u8, frame: &Frame) -> Result<()> {
    let mut writer = open_csv_writer(path, delimiter)?;
    write_frame(&mut writer, frame)
}
