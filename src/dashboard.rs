//! Interaction scripts for the Vahan report view.

use std::time::Duration;

use crate::domain::{ReportLevel, UnitOfWork};
use crate::error::HarvestError;
use crate::manifest::GLOBAL_PARENT;

pub const DEFAULT_DASHBOARD_URL: &str =
    "https://vahan.parivahan.gov.in/vahan4dashboard/vahan/view/reportview.xhtml";

const STATE_DROPDOWN: &str = r#"//label[starts-with(text(), "All Vahan4 Running States")]"#;
const OFFICE_DROPDOWN: &str = r#"//label[starts-with(text(), "All Vahan4 Running Office")]"#;
const OFFICE_ITEMS: &str = "//ul[@id='selectedRto_items']";
const ALL_OFFICES_ITEM: &str = "All Vahan4 Running Office";
const MAIN_REFRESH: &str = concat!(
    "button[class='ui-button ui-widget ui-state-default ui-corner-all ",
    "ui-button-text-icon-left button']"
);
const FILTER_REFRESH: &str =
    "button[class='ui-button ui-widget ui-state-default ui-corner-all ui-button-text-icon-left']";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    XPath(String),
    Css(String),
    Tag(String),
}

impl Locator {
    pub fn id(value: &str) -> Self {
        Locator::Id(value.to_string())
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Locator::XPath(value.into())
    }

    pub fn css(value: &str) -> Self {
        Locator::Css(value.to_string())
    }

    /// Strategy and value in WebDriver terms.
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Id(id) => ("css selector", format!("[id=\"{}\"]", id.replace('"', "\\\""))),
            Locator::XPath(xpath) => ("xpath", xpath.clone()),
            Locator::Css(css) => ("css selector", css.clone()),
            Locator::Tag(tag) => ("tag name", tag.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Navigate,
    Click(Locator),
    Pause(Duration),
}

/// Steps that open a list and the elements whose text forms the child list.
#[derive(Debug, Clone)]
pub struct ListingScript {
    pub steps: Vec<Step>,
    pub container: Locator,
    pub item: Locator,
    pub exclude: Option<&'static str>,
}

fn pause(secs: u64) -> Step {
    Step::Pause(Duration::from_secs(secs))
}

fn click(locator: Locator) -> Step {
    Step::Click(locator)
}

/// Quotes `value` as an XPath string literal.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    let parts = value
        .split('"')
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join(", '\"', ");
    format!("concat({parts})")
}

fn select_state(state: &str) -> Vec<Step> {
    vec![
        click(Locator::xpath(STATE_DROPDOWN)),
        pause(2),
        click(Locator::xpath(format!(
            "//li[starts-with(text(), {})]",
            xpath_literal(state)
        ))),
        pause(2),
    ]
}

fn select_axes(y_axis_item: &str) -> Vec<Step> {
    vec![
        click(Locator::id("yaxisVar_label")),
        pause(2),
        click(Locator::id(y_axis_item)),
        pause(2),
        click(Locator::id("xaxisVar_label")),
        pause(1),
        click(Locator::xpath("//ul[@id='xaxisVar_items']/li[text()='Fuel']")),
        pause(2),
    ]
}

fn select_year_and_refresh(year: &str) -> Vec<Step> {
    vec![
        click(Locator::id("selectedYear_label")),
        pause(2),
        click(Locator::xpath(format!(
            "//ul[@id='selectedYear_items']/li[text()='{year}']"
        ))),
        pause(5),
        click(Locator::css(MAIN_REFRESH)),
        pause(5),
    ]
}

fn select_month(month: &str) -> Vec<Step> {
    vec![
        click(Locator::id("groupingTable:selectMonth_label")),
        pause(2),
        click(Locator::xpath(format!(
            "//ul[@id='groupingTable:selectMonth_items']/li[text()='{month}']"
        ))),
        pause(2),
    ]
}

fn download() -> Vec<Step> {
    vec![click(Locator::id("groupingTable:xls"))]
}

/// The click sequence that downloads the report for `unit`.
pub fn report_script(unit: &UnitOfWork) -> Result<Vec<Step>, HarvestError> {
    let year = unit.period.year.to_string();
    let month = unit.period.month.label();
    let mut steps = vec![Step::Navigate];
    steps.extend(select_state(&unit.state));

    match unit.level {
        ReportLevel::State => {
            steps.extend(select_axes("yaxisVar_1"));
            steps.extend(select_year_and_refresh(&year));
            steps.extend(select_month(month));
        }
        ReportLevel::Rto => {
            let label = unit.child.as_deref().unwrap_or_default();
            let office = unit
                .office()
                .ok_or_else(|| HarvestError::UnresolvableLabel(label.to_string()))?;
            steps.push(click(Locator::xpath(OFFICE_DROPDOWN)));
            steps.push(pause(1));
            steps.push(click(Locator::xpath(format!(
                "{OFFICE_ITEMS}/li[contains(text(), {})]",
                xpath_literal(&format!(" - {}(", office.code))
            ))));
            steps.push(pause(2));
            steps.extend(select_axes("yaxisVar_1"));
            steps.extend(select_year_and_refresh(&year));
            steps.extend(select_month(month));
        }
        ReportLevel::Oem => {
            let category = unit.child.as_deref().unwrap_or_default();
            steps.extend(select_axes("yaxisVar_4"));
            steps.extend(select_year_and_refresh(&year));
            steps.extend(select_month(month));
            steps.push(click(Locator::id("filterLayout-toggler")));
            steps.push(pause(2));
            steps.push(click(Locator::xpath(format!(
                "//label[text()={}]",
                xpath_literal(category)
            ))));
            steps.push(pause(5));
            steps.push(click(Locator::css(FILTER_REFRESH)));
            steps.push(pause(5));
        }
    }

    steps.extend(download());
    Ok(steps)
}

/// The sequence that reveals the child list under `parent` for `level`.
pub fn listing_script(level: ReportLevel, parent: &str) -> Option<ListingScript> {
    match level {
        ReportLevel::State => None,
        ReportLevel::Oem => {
            debug_assert_eq!(parent, GLOBAL_PARENT);
            Some(ListingScript {
                steps: vec![
                    Step::Navigate,
                    pause(5),
                    click(Locator::id("filterLayout-toggler")),
                    pause(2),
                ],
                container: Locator::xpath(r#"//table[@id="VhClass"]/tbody"#),
                item: Locator::Tag("tr".to_string()),
                exclude: None,
            })
        }
        ReportLevel::Rto => {
            let mut steps = vec![Step::Navigate, pause(5)];
            steps.extend(select_state(parent));
            steps.push(click(Locator::xpath(OFFICE_DROPDOWN)));
            steps.push(pause(2));
            Some(ListingScript {
                steps,
                container: Locator::xpath(OFFICE_ITEMS),
                item: Locator::Tag("li".to_string()),
                exclude: Some(ALL_OFFICES_ITEM),
            })
        }
    }
}
