//! Reads raw listing fragments out of a rendered results page.
//!
//! Every selector in a [`SiteLayout`] list is a fallback chain: the first
//! selector that matches anything inside the container wins. A field whose
//! chain matches nothing is left empty; it is the assembler's job to decide
//! whether the listing is still worth keeping.

use avtoscrape_core::error::AppError;
use avtoscrape_core::extract::parse_spec_rows;
use avtoscrape_core::models::{RawListing, RenderedPage};
use avtoscrape_core::site::{EngineLocation, SiteLayout};
use avtoscrape_core::traits::ListingParser;
use scraper::{ElementRef, Html, Selector};

/// [`ListingParser`] backed by `scraper`.
#[derive(Debug, Clone, Default)]
pub struct HtmlListingParser;

impl HtmlListingParser {
    pub fn new() -> Self {
        Self
    }
}

impl ListingParser for HtmlListingParser {
    fn parse(&self, page: &RenderedPage, layout: &SiteLayout) -> Result<Vec<RawListing>, AppError> {
        let selectors = CompiledLayout::compile(layout)?;
        let document = Html::parse_document(&page.html);

        let Some(containers) = selectors
            .containers
            .iter()
            .map(|selector| document.select(selector).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
        else {
            // A rendered page past the last results page has text but no
            // listings. A blank document means rendering never finished.
            if has_text(&document) {
                tracing::debug!(url = %page.final_url, "No listing containers, page is empty");
                return Ok(Vec::new());
            }
            return Err(AppError::UnexpectedMarkup(format!(
                "blank document at {}",
                page.final_url
            )));
        };

        tracing::debug!(
            url = %page.final_url,
            containers = containers.len(),
            "Located listing containers"
        );

        Ok(containers
            .into_iter()
            .map(|container| selectors.read(container))
            .collect())
    }
}

fn has_text(document: &Html) -> bool {
    document
        .root_element()
        .text()
        .any(|fragment| !fragment.trim().is_empty())
}

/// A [`SiteLayout`] with every selector parsed once per page.
struct CompiledLayout {
    containers: Vec<Selector>,
    name: Vec<Selector>,
    regular_price: Vec<Selector>,
    special_price: Vec<Selector>,
    spec_rows: Vec<Selector>,
    spec_cell: Selector,
    spec_values: Vec<Selector>,
    engine: Option<EngineLocation>,
    misc: Vec<Selector>,
    image: Vec<Selector>,
    image_attr: &'static str,
    link: Vec<Selector>,
    link_attr: &'static str,
}

impl CompiledLayout {
    fn compile(layout: &SiteLayout) -> Result<Self, AppError> {
        Ok(Self {
            containers: compile_all(layout.containers)?,
            name: compile_all(layout.name)?,
            regular_price: compile_all(layout.regular_price)?,
            special_price: compile_all(layout.special_price)?,
            spec_rows: compile_all(layout.spec_rows)?,
            spec_cell: compile(layout.spec_cell)?,
            spec_values: compile_all(layout.spec_values)?,
            engine: layout.engine,
            misc: compile_all(layout.misc)?,
            image: compile_all(layout.image)?,
            image_attr: layout.image_attr,
            link: compile_all(layout.link)?,
            link_attr: layout.link_attr,
        })
    }

    fn read(&self, container: ElementRef<'_>) -> RawListing {
        let mut listing = first_text(container, &self.name)
            .map(|name| RawListing::with_name(&name))
            .unwrap_or_default();

        listing.regular_price = first_text(container, &self.regular_price);
        listing.special_price = first_text(container, &self.special_price);

        if let Some(rows) = first_matches(container, &self.spec_rows) {
            let cells: Vec<Vec<String>> = rows
                .into_iter()
                .map(|row| row.select(&self.spec_cell).map(text_of).collect())
                .collect();
            listing.spec_pairs = parse_spec_rows(cells);
        }

        if let Some(values) = first_matches(container, &self.spec_values) {
            listing.spec_values = values.into_iter().map(text_of).collect();
        }

        listing.engine = match self.engine {
            Some(EngineLocation::SpecRow(key)) => listing.spec_pairs.get(key).cloned(),
            Some(EngineLocation::SpecValue(index)) => listing.spec_values.get(index).cloned(),
            None => None,
        };

        listing.misc = first_text(container, &self.misc);
        listing.image = first_attr(container, &self.image, self.image_attr);
        listing.link = first_attr(container, &self.link, self.link_attr);
        listing
    }
}

fn compile(selector: &str) -> Result<Selector, AppError> {
    Selector::parse(selector)
        .map_err(|e| AppError::ParseError(format!("Invalid selector {selector:?}: {e}")))
}

fn compile_all(selectors: &[&str]) -> Result<Vec<Selector>, AppError> {
    selectors.iter().map(|s| compile(s)).collect()
}

/// All matches of the first selector in the chain that matches anything.
fn first_matches<'a>(scope: ElementRef<'a>, chain: &[Selector]) -> Option<Vec<ElementRef<'a>>> {
    chain
        .iter()
        .map(|selector| scope.select(selector).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
}

fn first_element<'a>(scope: ElementRef<'a>, chain: &[Selector]) -> Option<ElementRef<'a>> {
    chain.iter().find_map(|selector| scope.select(selector).next())
}

fn first_text(scope: ElementRef<'_>, chain: &[Selector]) -> Option<String> {
    first_element(scope, chain)
        .map(text_of)
        .filter(|text| !text.is_empty())
}

fn first_attr(scope: ElementRef<'_>, chain: &[Selector], attr: &str) -> Option<String> {
    first_element(scope, chain)
        .and_then(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Element text with whitespace runs collapsed to single spaces.
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
