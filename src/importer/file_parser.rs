// ==========================================
// 财务导入引擎 - 文件解析器实现
// ==========================================
// 支持: CSV (.csv) / Excel (.xlsx/.xlsm/.xls)
// 日期单元格: 转为 ISO 日期文本
// 输出: ParsedFile（行记录 + 列名 + 行数）
// 说明: 纯函数式解析, 除读取文件外无副作用
// ==========================================

use crate::domain::{FileFormat, ParseOptions, ParsedFile, ParsedRow, SheetSelector};
use crate::importer::error::{ImportError, ImporterResult};
use crate::importer::importer_trait::FileParser;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn ensure_exists(path: &Path) -> ImporterResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

/// 表头规范化: 空表头 → column_{n}, 重名 → {name}_{k}
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(idx, header)| {
            let base = if header.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                header
            };
            let mut name = base.clone();
            let mut k = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, k);
                k += 1;
            }
            name
        })
        .collect()
}

fn ordinal_headers(width: usize) -> Vec<String> {
    (1..=width).map(|i| format!("column_{}", i)).collect()
}

/// 将原始记录序列组装为 ParsedFile
///
/// - 首条记录为表头（has_headers）或决定序号列宽（无表头）
/// - 短行补空值; 超出列宽且有非空值的行无法恢复 → MalformedInput
/// - 完全空白的行跳过
/// - limit: 物化到上限行数即停止
fn assemble_rows<I>(records: I, options: &ParseOptions) -> ImporterResult<ParsedFile>
where
    I: Iterator<Item = ImporterResult<Vec<String>>>,
{
    let mut records = records;
    let first = match records.next() {
        None => return Ok(ParsedFile::empty()),
        Some(first) => first?,
    };

    // 无表头时首条记录也是数据行
    let (columns, pending) = if options.has_headers {
        (normalize_headers(first), None)
    } else {
        (ordinal_headers(first.len()), Some(first))
    };

    let mut rows = Vec::new();
    for (idx, record) in pending.map(Ok).into_iter().chain(records).enumerate() {
        if options.limit.is_some_and(|limit| rows.len() >= limit) {
            break;
        }

        let record = record?;
        if record.len() > columns.len() && record[columns.len()..].iter().any(|v| !v.is_empty())
        {
            return Err(ImportError::MalformedInput(format!(
                "第 {} 行字段数 {} 超过列数 {}",
                idx + 1,
                record.len(),
                columns.len()
            )));
        }

        // 跳过完全空白的行
        if record.iter().all(|v| v.is_empty()) {
            continue;
        }

        let mut row_map = ParsedRow::with_capacity(columns.len());
        for (col_idx, header) in columns.iter().enumerate() {
            let value = record.get(col_idx).cloned().unwrap_or_default();
            row_map.insert(header.clone(), value);
        }
        rows.push(row_map);
    }

    Ok(ParsedFile::new(columns, rows))
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse(&self, file_path: &Path, options: &ParseOptions) -> ImporterResult<ParsedFile> {
        ensure_exists(file_path)?;

        let bytes = std::fs::read(file_path)?;
        let content = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
        if content.iter().all(|b| b.is_ascii_whitespace()) {
            debug!(file = %file_path.display(), "CSV 文件为空");
            return Ok(ParsedFile::empty());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .trim(csv::Trim::All)
            .delimiter(options.delimiter.unwrap_or(b','))
            .from_reader(content);

        // 非 UTF-8 内容按有损方式解码（会计系统导出常见 ANSI 编码）
        let records = reader.byte_records().map(|result| {
            result.map_err(ImportError::from).map(|record| {
                record
                    .iter()
                    .map(|field| String::from_utf8_lossy(field).trim().to_string())
                    .collect::<Vec<_>>()
            })
        });

        assemble_rows(records, options)
    }
}

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Excel 序列日期 → ISO 文本（整日为 YYYY-MM-DD, 否则带时分秒）
///
/// 纪元 1899-12-30（沿用 1900 闰年偏差）
pub fn excel_serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * MILLIS_PER_DAY as f64).round() as i64;
    let at = base.checked_add_signed(Duration::milliseconds(millis))?;
    if millis % MILLIS_PER_DAY == 0 {
        Some(at.format("%Y-%m-%d").to_string())
    } else {
        Some(at.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

/// 单元格 → 文本; 日期单元格输出 ISO 日期而非序列值
fn cell_to_string(cell: &Data) -> String {
    let text = match cell {
        Data::DateTime(dt) if !dt.is_duration() => {
            excel_serial_to_iso(dt.as_f64()).unwrap_or_else(|| cell.to_string())
        }
        Data::DateTimeIso(iso) => match iso.split_once('T') {
            Some((date, "00:00:00")) => date.to_string(),
            _ => iso.replacen('T', " ", 1),
        },
        other => other.to_string(),
    };
    text.trim().to_string()
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse(&self, file_path: &Path, options: &ParseOptions) -> ImporterResult<ParsedFile> {
        ensure_exists(file_path)?;

        let mut workbook = open_workbook_auto(file_path)?;

        let sheet_names = workbook.sheet_names();
        if sheet_names.is_empty() {
            return Err(ImportError::MalformedInput("Excel 文件无工作表".to_string()));
        }

        let sheet_name = match &options.sheet {
            None => sheet_names[0].clone(),
            Some(SheetSelector::Index(idx)) => sheet_names.get(*idx).cloned().ok_or_else(|| {
                ImportError::MalformedInput(format!(
                    "工作表序号越界: {} (共 {} 个)",
                    idx,
                    sheet_names.len()
                ))
            })?,
            Some(SheetSelector::Name(name)) => sheet_names
                .iter()
                .find(|s| s.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| ImportError::MalformedInput(format!("工作表不存在: {}", name)))?,
        };

        let range = workbook.worksheet_range(&sheet_name)?;
        debug!(sheet = %sheet_name, height = range.height(), "读取工作表");

        let records = range
            .rows()
            .map(|row| Ok(row.iter().map(cell_to_string).collect::<Vec<_>>()));

        assemble_rows(records, options)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名或格式提示自动选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    /// 识别文件格式: 优先使用格式提示, 否则按扩展名
    pub fn detect_format(file_path: &Path, hint: Option<FileFormat>) -> ImporterResult<FileFormat> {
        if let Some(format) = hint {
            return Ok(format);
        }
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        FileFormat::from_extension(ext).ok_or_else(|| {
            ImportError::UnsupportedFormat(if ext.is_empty() {
                file_path.display().to_string()
            } else {
                ext.to_string()
            })
        })
    }

    pub fn parse<P: AsRef<Path>>(
        &self,
        file_path: P,
        hint: Option<FileFormat>,
        options: &ParseOptions,
    ) -> ImporterResult<ParsedFile> {
        let path = file_path.as_ref();
        match Self::detect_format(path, hint)? {
            FileFormat::Csv => CsvParser.parse(path, options),
            FileFormat::Xlsx | FileFormat::Xlsm | FileFormat::Xls => {
                ExcelParser.parse(path, options)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn csv_file(lines: &[&str]) -> NamedTempFile {
        let mut temp_file = Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(temp_file, "{}", line).unwrap();
        }
        temp_file
    }

    #[test]
    fn test_csv_header_order_and_row_count() {
        let file = csv_file(&["account,department,amount", "4000,D01,10", "4010,D02,-3"]);
        let parsed = UniversalFileParser
            .parse(file.path(), None, &ParseOptions::default())
            .unwrap();

        assert_eq!(parsed.columns, vec!["account", "department", "amount"]);
        assert_eq!(parsed.row_count, 2);
        assert_eq!(parsed.rows.len(), parsed.row_count);
        assert_eq!(parsed.rows[1].get("amount"), Some(&"-3".to_string()));
    }

    #[test]
    fn test_csv_skip_empty_rows_and_trim() {
        let file = csv_file(&["account , amount", " X ,10", ",", "Y, 2"]);
        let parsed = CsvParser.parse(file.path(), &ParseOptions::default()).unwrap();

        assert_eq!(parsed.columns, vec!["account", "amount"]);
        assert_eq!(parsed.row_count, 2);
        assert_eq!(parsed.rows[0].get("account"), Some(&"X".to_string()));
    }

    #[test]
    fn test_csv_limit_counts_only_materialized_rows() {
        let file = csv_file(&["a", "1", "2", "3", "4"]);
        let parsed = CsvParser.parse(file.path(), &ParseOptions::preview(2)).unwrap();
        assert_eq!(parsed.row_count, 2);
    }

    #[test]
    fn test_csv_headerless_synthesizes_ordinals() {
        let file = csv_file(&["X;10", "Y;20"]);
        let options = ParseOptions {
            delimiter: Some(b';'),
            has_headers: false,
            ..ParseOptions::default()
        };
        let parsed = CsvParser.parse(file.path(), &options).unwrap();

        assert_eq!(parsed.columns, vec!["column_1", "column_2"]);
        assert_eq!(parsed.row_count, 2);
        assert_eq!(parsed.rows[1].get("column_2"), Some(&"20".to_string()));
    }

    #[test]
    fn test_csv_duplicate_and_blank_headers_are_unique() {
        let file = csv_file(&["amount,amount,", "1,2,3"]);
        let parsed = CsvParser.parse(file.path(), &ParseOptions::default()).unwrap();
        assert_eq!(parsed.columns, vec!["amount", "amount_2", "column_3"]);
    }

    #[test]
    fn test_csv_short_rows_are_padded() {
        let file = csv_file(&["a,b,c", "1"]);
        let parsed = CsvParser.parse(file.path(), &ParseOptions::default()).unwrap();
        assert_eq!(parsed.rows[0].get("c"), Some(&String::new()));
    }

    #[test]
    fn test_csv_overlong_row_is_malformed() {
        let file = csv_file(&["a,b", "1,2,3"]);
        let result = CsvParser.parse(file.path(), &ParseOptions::default());
        assert!(matches!(result, Err(ImportError::MalformedInput(_))));
    }

    #[test]
    fn test_csv_empty_file_is_not_error() {
        let file = csv_file(&["", "   "]);
        let parsed = CsvParser.parse(file.path(), &ParseOptions::default()).unwrap();
        assert_eq!(parsed.row_count, 0);
        assert!(parsed.columns.is_empty());
    }

    #[test]
    fn test_csv_header_only_has_columns_no_rows() {
        let file = csv_file(&["\u{feff}account,amount"]);
        let parsed = CsvParser.parse(file.path(), &ParseOptions::default()).unwrap();
        assert_eq!(parsed.columns, vec!["account", "amount"]);
        assert_eq!(parsed.row_count, 0);
    }

    #[test]
    fn test_file_not_found() {
        let result = CsvParser.parse(Path::new("non_existent.csv"), &ParseOptions::default());
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_format() {
        let result =
            UniversalFileParser.parse("statement.pdf", None, &ParseOptions::default());
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(ext)) if ext == "pdf"));
    }

    #[test]
    fn test_excel_serial_dates_become_iso() {
        assert_eq!(excel_serial_to_iso(45382.0).as_deref(), Some("2024-03-31"));
        assert_eq!(excel_serial_to_iso(45382.5).as_deref(), Some("2024-03-31 12:00:00"));
        assert_eq!(excel_serial_to_iso(f64::NAN), None);
    }

    #[test]
    fn test_iso_datetime_cells_keep_date_only_when_midnight() {
        assert_eq!(
            cell_to_string(&Data::DateTimeIso("2024-03-31T00:00:00".to_string())),
            "2024-03-31"
        );
        assert_eq!(
            cell_to_string(&Data::DateTimeIso("2024-03-31T08:30:00".to_string())),
            "2024-03-31 08:30:00"
        );
        assert_eq!(cell_to_string(&Data::Float(100.0)), "100");
        assert_eq!(cell_to_string(&Data::String(" 1000 ".to_string())), "1000");
    }

    #[test]
    fn test_corrupt_workbook_is_malformed() {
        let mut temp_file = Builder::new().suffix(".xlsx").tempfile().unwrap();
        writeln!(temp_file, "not a zip archive").unwrap();
        let result = UniversalFileParser.parse(temp_file.path(), None, &ParseOptions::default());
        assert!(matches!(result, Err(ImportError::MalformedInput(_))));
    }
}
