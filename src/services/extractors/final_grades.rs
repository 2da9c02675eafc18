//! Final grades page (`dla_stud/studia/oceny/index`).

use scraper::Html;

use super::{Extractor, ExtractorOutput, child_elements, first_text, parse_selector};
use crate::error::{AppError, Result};
use crate::models::{Entity, FINAL_GRADES, Record};
use crate::services::browser::Browser;
use crate::utils::clean_cell;

const MISSING: &str = "(brak)";

/// Reads the grades table of every semester.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalGradesExtractor;

impl FinalGradesExtractor {
    pub const KEY: &'static str = "dla_stud-studia-oceny-index";

    pub fn boxed() -> Box<dyn Extractor> {
        Box::new(Self)
    }

    /// Parse the `#tab1` table into a `final-grades` entity.
    ///
    /// Rows without data cells (headers, semester separators) are skipped.
    pub fn parse(document: &Html) -> Result<Entity> {
        let table_sel = parse_selector("[id=\"tab1\"]")?;
        let row_sel = parse_selector("tr")?;
        let link_sel = parse_selector("a")?;
        let span_sel = parse_selector("span")?;
        let div_sel = parse_selector("div")?;

        let table = document
            .select(&table_sel)
            .next()
            .ok_or_else(|| AppError::extract(Self::KEY, "element #tab1 not found"))?;

        let mut entries = Vec::new();
        for row in table.select(&row_sel) {
            let columns: Vec<_> = child_elements(row, "td").collect();
            if columns.len() < 3 {
                continue;
            }

            let course = first_text(columns[0], &link_sel)
                .ok_or_else(|| AppError::extract(Self::KEY, "course name link missing"))?;
            let course_code = first_text(columns[0], &span_sel)
                .ok_or_else(|| AppError::extract(Self::KEY, "course code missing"))?;
            let semester = first_text(columns[1], &span_sel)
                .ok_or_else(|| AppError::extract(Self::KEY, "semester missing"))?;

            let grades = columns[2]
                .select(&div_sel)
                .map(|grade| {
                    let title = first_text(grade, &link_sel).unwrap_or_else(|| MISSING.into());
                    let value = first_text(grade, &span_sel).unwrap_or_else(|| MISSING.into());
                    format!("{}: {}", clean_cell(&title), clean_cell(&value))
                })
                .collect();

            entries.push(Record::new(
                clean_cell(&semester),
                clean_cell(&course_code),
                clean_cell(&course),
                grades,
            ));
        }

        log::debug!("Parsed {} final grade row(s)", entries.len());
        Ok(Entity::new(FINAL_GRADES, entries))
    }
}

impl Extractor for FinalGradesExtractor {
    fn name(&self) -> &'static str {
        Self::KEY
    }

    fn get_data(&self, browser: &dyn Browser) -> Result<Option<ExtractorOutput>> {
        let document = browser.document()?;
        let entity = Self::parse(&document)?;
        Ok(Some(ExtractorOutput::results(vec![entity])))
    }
}
