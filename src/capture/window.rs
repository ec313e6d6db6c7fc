//! Window eligibility rules and title-derived metadata.

use std::collections::HashSet;

use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;

/// A window grabbed during one capture tick.
#[derive(Debug, Clone)]
pub struct CapturedWindow {
    pub image: DynamicImage,
    pub app_name: String,
    pub window_name: String,
    pub process_id: u32,
    pub is_focused: bool,
}

/// User-configured include/ignore substrings, matched case-insensitively
/// against the app name or the window title.
#[derive(Debug, Clone, Default)]
pub struct WindowFilters {
    ignore_set: HashSet<String>,
    include_set: HashSet<String>,
}

impl WindowFilters {
    pub fn new(ignore_list: &[String], include_list: &[String]) -> Self {
        let normalize = |list: &[String]| {
            list.iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            ignore_set: normalize(ignore_list),
            include_set: normalize(include_list),
        }
    }

    /// Ignore wins over include; an empty include list admits everything.
    pub fn is_valid(&self, app_name: &str, title: &str) -> bool {
        let app = app_name.to_lowercase();
        let title = title.to_lowercase();
        let hits = |needle: &String| app.contains(needle.as_str()) || title.contains(needle.as_str());

        if self.ignore_set.iter().any(hits) {
            return false;
        }
        self.include_set.is_empty() || self.include_set.iter().any(hits)
    }
}

#[cfg(target_os = "windows")]
static SKIP_APPS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "Windows Shell Experience Host",
        "Microsoft Text Input Application",
        "Windows Explorer",
        "Program Manager",
        "Microsoft Store",
        "Search",
        "TaskBar",
    ])
});

#[cfg(not(target_os = "windows"))]
static SKIP_APPS: Lazy<HashSet<&'static str>> = Lazy::new(HashSet::new);

#[cfg(target_os = "windows")]
static SKIP_TITLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "Program Manager",
        "Windows Input Experience",
        "Microsoft Text Input Application",
        "Task View",
        "Start",
        "System Tray",
        "Notification Area",
        "Action Center",
        "Task Bar",
        "Desktop",
    ])
});

#[cfg(not(target_os = "windows"))]
static SKIP_TITLES: Lazy<HashSet<&'static str>> = Lazy::new(HashSet::new);

/// Known shell/system surfaces that never carry user content.
pub fn is_system_window(app_name: &str, title: &str) -> bool {
    SKIP_APPS.contains(app_name) || SKIP_TITLES.contains(title)
}

const BROWSERS: &[&str] = &["chrome", "edge", "firefox", "brave", "opera", "vivaldi", "arc"];

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid URL regex"));

/// Pull a URL out of a focused browser window's title, if one is shown.
pub fn extract_browser_url(is_focused: bool, app_name: &str, window_title: &str) -> Option<String> {
    if !is_focused {
        return None;
    }

    let app = app_name.to_lowercase();
    if !BROWSERS.iter().any(|needle| app.contains(needle)) {
        return None;
    }

    let found = URL_RE.find(window_title)?;
    let url = found
        .as_str()
        .trim_end_matches(|c: char| ",.;)]}>\"'".contains(c));
    (!url.is_empty()).then(|| url.to_string())
}
