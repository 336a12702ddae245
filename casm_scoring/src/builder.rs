pub use crate::config::*;
use crate::{resolve, run_pipeline};

use log::debug;

/// A builder for adding respondents.
///
/// The builder checks the responses against the columns of the dataset as they are added.
///
/// ```
/// pub use casm_scoring::builder::Builder;
/// pub use casm_scoring::*;
/// # use casm_scoring::PipelineErrors;
///
/// let catalog = ItemCatalog {
///     item_prefix: "Q".to_string(),
///     total_items: 6,
///     interest: vec![
///         Subscale::new("A", "Area A", &[1, 2]),
///         Subscale::new("B", "Area B", &[3, 4]),
///     ],
///     truthfulness: Subscale::new("V", "Truthfulness", &[5]),
///     consistency: Subscale::new("C", "Consistency", &[6]),
/// };
/// let header: Vec<String> = (1..=6).map(|i| format!("Q{}", i)).collect();
/// let mut builder = Builder::new(&catalog)?.columns(&header)?;
///
/// builder.add_respondent_simple("student-1", &[1, 2, 0, 0, 1, 1])?;
///
/// let result = builder.run(&CleaningRules::DEFAULT_RULES)?;
/// assert_eq!(result.retained[0].dominant.as_ref().map(|d| d.code.as_str()), Some("A"));
///
/// # Ok::<(), PipelineErrors>(())
/// ```
pub struct Builder {
    pub(crate) _catalog: ItemCatalog,
    pub(crate) _resolution: SchemaResolution,
    pub(crate) _respondents: Vec<Respondent>,
}

impl Builder {
    /// Starts with the assumption that every item of the catalog is present.
    pub fn new(catalog: &ItemCatalog) -> Result<Builder, PipelineErrors> {
        catalog.validate()?;
        let all_columns: Vec<String> = catalog
            .all_subscales()
            .flat_map(|s| s.items.iter().map(|i| catalog.item_column(*i)))
            .collect();
        Ok(Builder {
            _catalog: catalog.clone(),
            _resolution: resolve(&all_columns, catalog),
            _respondents: Vec::new(),
        })
    }

    /// Restricts the items to the columns of the dataset.
    pub fn columns(self, header: &[String]) -> Result<Builder, PipelineErrors> {
        let resolution = resolve(header, &self._catalog);
        Ok(Builder {
            _catalog: self._catalog,
            _resolution: resolution,
            _respondents: Vec::new(),
        })
    }

    pub fn resolution(&self) -> &SchemaResolution {
        &self._resolution
    }

    pub fn respondents(&self) -> &[Respondent] {
        &self._respondents
    }

    /// Adds a respondent with one response code per available item, in item order.
    ///
    /// Extra codes are ignored, missing codes are recorded as missing responses.
    pub fn add_respondent_simple(&mut self, id: &str, codes: &[u32]) -> Result<(), PipelineErrors> {
        let responses: Vec<(u32, Response)> = self
            ._resolution
            .available_items
            .iter()
            .zip(codes.iter())
            .map(|(item, code)| (*item, Response::from_code(*code as f64)))
            .collect();
        self.add_respondent(id, Gender::Unrecorded, None, &responses)
    }

    /// Adds a respondent.
    ///
    /// responses: the answers, keyed by item number. Every item must be available in the dataset.
    pub fn add_respondent(
        &mut self,
        id: &str,
        gender: Gender,
        grade: Option<u32>,
        responses: &[(u32, Response)],
    ) -> Result<(), PipelineErrors> {
        for (item, _) in responses.iter() {
            if self._resolution.available_items.binary_search(item).is_err() {
                return Err(PipelineErrors::UnknownItem {
                    respondent: id.to_string(),
                    item: *item,
                });
            }
        }
        self.add_respondent_2(&Respondent {
            id: id.to_string(),
            gender,
            grade,
            responses: responses.iter().cloned().collect(),
        })
    }

    pub fn add_respondent_2(&mut self, respondent: &Respondent) -> Result<(), PipelineErrors> {
        debug!("add_respondent: {:?}", respondent.id);
        self._respondents.push(respondent.clone());
        Ok(())
    }

    /// Runs the pipeline over all the respondents added so far.
    pub fn run(&self, rules: &CleaningRules) -> Result<PipelineResult, PipelineErrors> {
        run_pipeline(&self._respondents, &self._resolution, rules)
    }
}
