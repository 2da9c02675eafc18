//! Single course results page (`dla_stud/studia/sprawdziany/pokaz`).
//!
//! The page shows a tree of assessments. Every node is a one-row table
//! followed, for nodes with children, by a `div[id]` holding the subtree.
//! Subtrees pair with the node tables of their parent by position.

use scraper::{ElementRef, Html, Node};

use super::{Extractor, ExtractorOutput, child_elements, parse_selector};
use crate::error::{AppError, Result};
use crate::models::{COURSE_RESULTS_TREE, Entity, Record};
use crate::services::browser::Browser;
use crate::utils::clean_cell;

/// Link text of the cell that only expands a node.
const DETAILS_LINK: &str = "pokaż szczegóły";

#[derive(Debug, Clone, Copy, Default)]
pub struct CourseResultsExtractor;

struct Course {
    name: String,
    code: String,
}

impl CourseResultsExtractor {
    pub const KEY: &'static str = "dla_stud-studia-sprawdziany-pokaz";

    pub fn boxed() -> Box<dyn Extractor> {
        Box::new(Self)
    }

    /// Parse the results tree into a `course-results-tree` entity.
    pub fn parse(document: &Html) -> Result<Entity> {
        let layout_sel = parse_selector("[id=\"layout-c22a\"]")?;
        let tree_sel = parse_selector("[id=\"drzewo\"]")?;

        let layout = document
            .select(&layout_sel)
            .next()
            .ok_or_else(|| AppError::extract(Self::KEY, "element #layout-c22a not found"))?;

        let course = Self::parse_course(layout)?;

        let tree = layout
            .select(&tree_sel)
            .next()
            .ok_or_else(|| AppError::extract(Self::KEY, "element #drzewo not found"))?;
        let root = child_elements(tree, "div")
            .find(|div| div.value().attr("id").is_some())
            .ok_or_else(|| AppError::extract(Self::KEY, "results tree is empty"))?;

        let mut entries = Vec::new();
        Self::walk(root, "", &course, &mut entries)?;

        log::debug!(
            "Parsed {} result node(s) of course {}",
            entries.len(),
            course.code
        );
        Ok(Entity::new(COURSE_RESULTS_TREE, entries))
    }

    /// Course name and code from the page heading.
    fn parse_course(layout: ElementRef<'_>) -> Result<Course> {
        let heading_sel = parse_selector("h1 span")?;
        let heading = layout
            .select(&heading_sel)
            .next()
            .ok_or_else(|| AppError::extract(Self::KEY, "course heading not found"))?;

        let text_of = |tag: &'static str| {
            child_elements(heading, tag)
                .next()
                .map(|el| clean_cell(&el.text().collect::<String>()))
                .ok_or_else(|| AppError::extract(Self::KEY, format!("course heading has no <{tag}>")))
        };

        Ok(Course {
            name: text_of("a")?,
            code: text_of("span")?,
        })
    }

    fn walk(
        subtree: ElementRef<'_>,
        hierarchy: &str,
        course: &Course,
        entries: &mut Vec<Record>,
    ) -> Result<()> {
        let mut titles = Vec::new();
        for table in child_elements(subtree, "table") {
            let record = Self::parse_node(table, hierarchy, course)?;
            titles.push(record.item.clone());
            entries.push(record);
        }

        for (index, child) in child_elements(subtree, "div")
            .filter(|div| div.value().attr("id").is_some())
            .enumerate()
        {
            let title = titles.get(index).ok_or_else(|| {
                AppError::extract(Self::KEY, format!("subtree {index} has no matching node"))
            })?;
            let path = if hierarchy.is_empty() {
                title.clone()
            } else {
                format!("{hierarchy}/{title}")
            };
            Self::walk(child, &path, course, entries)?;
        }
        Ok(())
    }

    fn parse_node(table: ElementRef<'_>, hierarchy: &str, course: &Course) -> Result<Record> {
        let row_sel = parse_selector("tr")?;
        let row = table
            .select(&row_sel)
            .next()
            .ok_or_else(|| AppError::extract(Self::KEY, "result node without rows"))?;

        let columns: Vec<_> = child_elements(row, "td").collect();
        if columns.len() < 3 {
            return Err(AppError::extract(
                Self::KEY,
                format!("result node has {} cell(s), expected at least 3", columns.len()),
            ));
        }

        let title = node_title(columns[1]);
        let mut values = vec![cell_text(columns[2])];
        if let Some(extra) = columns.get(3) {
            let extra = cell_text(*extra);
            if !extra.contains(DETAILS_LINK) {
                values.push(extra);
            }
        }

        Ok(Record::new(&course.code, &course.name, title, values).with_hierarchy(hierarchy))
    }
}

/// Leading text of the title cell; nested elements hold descriptions.
fn node_title(cell: ElementRef<'_>) -> String {
    match cell.children().next().map(|node| node.value()) {
        Some(Node::Text(text)) => text.trim().to_string(),
        _ => cell_text(cell),
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    clean_cell(&cell.text().collect::<String>())
}

impl Extractor for CourseResultsExtractor {
    fn name(&self) -> &'static str {
        Self::KEY
    }

    fn get_data(&self, browser: &dyn Browser) -> Result<Option<ExtractorOutput>> {
        let document = browser.document()?;
        let entity = Self::parse(&document)?;
        if entity.is_empty() {
            return Ok(None);
        }
        Ok(Some(ExtractorOutput::results(vec![entity])))
    }
}
