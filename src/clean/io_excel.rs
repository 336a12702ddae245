use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::clean::io_common::SurveyTable;
use crate::clean::*;

/// Reads a worksheet: the named one if given, the first one otherwise.
/// The first row is the header.
pub fn read_excel_table(path: &str, worksheet_name: Option<&str>) -> CleanResult<SurveyTable> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let wrange = match worksheet_name {
        Some(name) => workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { name, path })?
            .context(OpeningExcelSnafu { path })?,
        None => workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu { path })?
            .context(OpeningExcelSnafu { path })?,
    };

    let mut iter = wrange.rows();
    let header: Vec<String> = iter
        .next()
        .context(EmptyTableSnafu { path })?
        .iter()
        .map(read_cell)
        .collect();
    debug!("read_excel_table: header: {:?}", header);

    let rows: Vec<Vec<String>> = iter.map(|row| row.iter().map(read_cell).collect()).collect();
    Ok(SurveyTable::new(header, rows))
}

/// Renders a cell as the text it would have in a CSV export.
/// Whole numbers lose their decimal part, so that 2.0 reads as 2.
fn read_cell(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        DataType::String(s) => s.clone(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        _ => {
            warn!("read_cell: unexpected cell {:?}", cell);
            format!("{:?}", cell)
        }
    }
}
