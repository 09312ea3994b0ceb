//! Navigation chrome: brand header, nav links, page container.

use std::fmt;
use std::fmt::Write;

pub const BRAND: &str = "FinanceOps";
const FRAME_WIDTH: usize = 72;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Dashboard,
    Upload,
    Results(String),
    Reports,
    Analytics,
    NotFound(String),
}

/// Links shown in the header, in order.
pub const NAV_ITEMS: &[(&str, &str)] = &[
    ("Dashboard", "/"),
    ("Upload Invoice", "/upload"),
    ("Reports", "/reports"),
    ("Analytics", "/analytics"),
];

impl Route {
    pub fn parse(path: &str) -> Route {
        let trimmed = path.trim();
        let normalized = trimmed.trim_end_matches('/');
        match normalized {
            "" => Route::Dashboard,
            "/upload" => Route::Upload,
            "/reports" => Route::Reports,
            "/analytics" => Route::Analytics,
            p => match p.strip_prefix("/results/") {
                Some(task) if !task.is_empty() && !task.contains('/') => {
                    Route::Results(task.to_string())
                }
                _ => Route::NotFound(trimmed.to_string()),
            },
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Dashboard => "/".to_string(),
            Route::Upload => "/upload".to_string(),
            Route::Results(task) => format!("/results/{}", task),
            Route::Reports => "/reports".to_string(),
            Route::Analytics => "/analytics".to_string(),
            Route::NotFound(p) => p.clone(),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Dashboard => "Financial Operations Center",
            Route::Upload => "Invoice Processing",
            Route::Results(_) => "Invoice Analysis Results",
            Route::Reports => "Reports",
            Route::Analytics => "Analytics",
            Route::NotFound(_) => "Page not found",
        }
    }

    /// Results pages highlight no nav link; everything else matches by path.
    fn is_nav_active(&self, nav_path: &str) -> bool {
        !matches!(self, Route::Results(_) | Route::NotFound(_)) && self.path() == nav_path
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

pub fn nav_bar(route: &Route) -> String {
    NAV_ITEMS
        .iter()
        .map(|(name, path)| {
            if route.is_nav_active(path) {
                format!("[{}]", name)
            } else {
                format!(" {} ", name)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Header, nav and a page container around `body`.
pub fn render_frame(route: &Route, body: &str) -> String {
    let rule = "=".repeat(FRAME_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, " {}  |  {}", BRAND, nav_bar(route));
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, " {}", route.title());
    let _ = writeln!(out, "{}", "-".repeat(FRAME_WIDTH));
    for line in body.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            let _ = writeln!(out, " {}", line);
        }
    }
    out
}

/// Body for routes that have no page yet.
pub fn unavailable(route: &Route) -> String {
    match route {
        Route::NotFound(path) => format!("No page at '{}'. Try one of: {}", path, paths()),
        other => format!("{} is not available in this client yet.", other.title()),
    }
}

fn paths() -> String {
    NAV_ITEMS
        .iter()
        .map(|(_, p)| *p)
        .chain(std::iter::once("/results/<task_id>"))
        .collect::<Vec<_>>()
        .join(", ")
}
