// Primitives for reading and writing CSV files.

use crate::clean::io_common::SurveyTable;
use crate::clean::*;

/// Reads a CSV file. The first line is the header.
pub fn read_csv_table(path: &str) -> CleanResult<SurveyTable> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut records = rdr.into_records();

    let header: Vec<String> = match records.next() {
        Some(line_r) => line_r
            .context(CsvLineParseSnafu { path, lineno: 1usize })?
            .iter()
            .map(|s| s.trim_start_matches('\u{feff}').to_string())
            .collect(),
        None => return EmptyTableSnafu { path }.fail(),
    };
    debug!("read_csv_table: header: {:?}", header);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        // Line 1 is the header.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        rows.push(line.iter().map(|s| s.to_string()).collect());
    }
    Ok(SurveyTable::new(header, rows))
}

pub fn write_csv_table(path: &Path, header: &[String], rows: &[Vec<String>]) -> CleanResult<()> {
    let p = path.display().to_string();
    let mut wtr = csv::Writer::from_path(path).context(WritingCsvSnafu { path: p.clone() })?;
    wtr.write_record(header)
        .context(WritingCsvSnafu { path: p.clone() })?;
    for row in rows.iter() {
        wtr.write_record(row)
            .context(WritingCsvSnafu { path: p.clone() })?;
    }
    wtr.flush().context(WritingFileSnafu { path: p })?;
    debug!("write_csv_table: {} rows written to {:?}", rows.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_ragged_csv() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("in.csv");
        fs::write(&p, "\u{feff}ID,Genero,Grado,Pregunta_1\n1,0,3,2\n2,1\n").unwrap();
        let t = read_csv_table(p.to_str().unwrap()).unwrap();
        assert_eq!(t.header[0], "ID");
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[1], vec!["2", "1", "", ""]);
    }

    #[test]
    fn empty_csv_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty.csv");
        fs::write(&p, "").unwrap();
        assert!(matches!(
            read_csv_table(p.to_str().unwrap()),
            Err(CleanError::EmptyTable { .. })
        ));
    }

    #[test]
    fn written_fields_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("out.csv");
        let header = vec!["ID".to_string(), "removal_reason".to_string()];
        let rows = vec![vec!["1".to_string(), "a, b".to_string()]];
        write_csv_table(&p, &header, &rows).unwrap();
        let back = read_csv_table(p.to_str().unwrap()).unwrap();
        assert_eq!(back.rows[0][1], "a, b");
        assert!(fs::read_to_string(&p).unwrap().contains("\"a, b\""));
    }
}
