/*!

This is the long-form manual for `casm_scoring` and `casmclean`.

## Input formats

The following formats are supported:
* `xlsx` Excel workbook (the first worksheet, or the worksheet given with `excelWorksheetName`)
* `csv` Comma Separated Values

In both cases the first row is the header. The table is expected to look as follows:

```text
ID,Genero,Grado,Pregunta_1,Pregunta_2,...,Pregunta_143
1,0,3,1,2,...,0
2,1,4,3,,...,1
```

- `ID` identifies the respondent. Identifiers should be unique; duplicates are reported but
  the rows are kept, since every row is tracked by its position.
- `Genero` is `0` (female) or `1` (male). The labels `Femenino` / `Masculino` (and a few
  common variants) are also understood. Any other value is reported.
- `Grado` is the school grade. `0` or an empty cell means that it was not recorded.
- `Pregunta_<n>` is the answer to item `n`: `0` neither activity, `1` the first one, `2` the
  second one, `3` both of them. An empty cell is a missing answer. Any other value is reported
  as a value-domain warning and scores 0.

Columns that are not items are copied as-is to the outputs.

## The cleaning rules

A respondent is removed when any of the following holds:
1. strictly more than `zeroThreshold` percent (default 70) of the available items are `0`;
2. the truthfulness (`VERA`) score is below the truthfulness threshold;
3. the consistency (`CONS`) score is below the consistency threshold.

The control thresholds (default 5) are defined for 11 items. When some control items are
absent from the dataset, the threshold is scaled down: `floor(threshold * available / 11)`.
When no item of a control subscale is present, every respondent fails it.

The removal reason lists every criterion that fired, for example
`Excess zeros (82.1%) | Low truthfulness (3/11)`. The second number is the count of control
items present in the dataset: `0/0` when the subscale is absent.

## Scores

For each of the 11 interest areas, the score is the sum of the answers in {1, 2, 3} and the
percentage is the score over three times the number of available items. The dominant area
is the area with the highest score. Ties are broken by the order of the areas in the
catalog (`CCFM` first, `JURI` last); the `dominant_tied` column lists all the tied areas.

The completion rate is the percentage of available items with an answer. An explicit `0` is
an answer.

## Configuration

`casmclean` comes with the defaults of the CASM-83 R2014. A JSON configuration file can
change them:

```json
{
  "outputSettings": { "datasetName": "CASM83", "outputDirectory": "out" },
  "source": {
    "provider": "xlsx",
    "filePath": "CASM83.xlsx",
    "excelWorksheetName": "Hoja1",
    "idColumn": "ID",
    "genderColumn": "Genero",
    "gradeColumn": "Grado",
    "itemPrefix": "Pregunta_"
  },
  "rules": {
    "zeroThreshold": 70,
    "truthfulnessThreshold": 5,
    "consistencyThreshold": 5,
    "controlReferenceItems": 11
  }
}
```

All the keys are optional except `source.filePath`. Relative paths in the file are resolved
against the directory of the configuration file, relative paths given on the command line
against the working directory. The command line options override the configuration.

## Outputs

- `<datasetName>_clean.csv`: the retained respondents with the derived columns.
- `<datasetName>_removed.csv`: the removed respondents with their response counts and a
  `removal_reason` column.
- `<datasetName>_report.txt`: a summary of the cleaning.
- `<datasetName>_summary.json`: the figures of the report, in JSON. `--print-summary` also
  prints it to the standard output.

A derived column whose name is already used by the input is written with a `_recomputed`
suffix. The input columns are never overwritten.

With `--reference <file>`, the summary is compared with a previous summary and the
differences are printed. The run fails if they differ.

 */
