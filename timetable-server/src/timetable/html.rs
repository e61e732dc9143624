//! Small helpers over `scraper` for pulling text out of timetable markup.

use scraper::{ElementRef, Selector};

/// Compile a CSS selector that is known to be valid.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static CSS selector must parse")
}

/// Concatenated text of every element under `scope` matching `selector`, trimmed.
pub(crate) fn select_text(scope: ElementRef<'_>, selector: &Selector) -> String {
    scope
        .select(selector)
        .flat_map(|el| el.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Text nodes that are direct children of `element`, whitespace-collapsed.
///
/// Text inside child elements (e.g. a `<span>` holding the minute) is excluded.
pub(crate) fn own_text(element: ElementRef<'_>) -> String {
    let raw: Vec<&str> = element
        .children()
        .filter_map(|node| node.value().as_text().map(|text| &**text))
        .collect();
    normalize_ws(&raw.join(" "))
}

/// Collapse runs of whitespace into a single space and trim.
pub(crate) fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn select_text_concatenates_matches() {
        let doc = Html::parse_fragment("<div><p class='a'> 八戸</p><p class='a'>ノ里 </p></div>");
        assert_eq!(select_text(doc.root_element(), &selector("p.a")), "八戸ノ里");
    }

    #[test]
    fn own_text_skips_child_elements() {
        let doc = Html::parse_fragment("<a href='#'><span>05</span>\n 奈良<br>  普通 </a>");
        let a = doc.root_element().select(&selector("a")).next().unwrap();
        assert_eq!(own_text(a), "奈良 普通");
    }

    #[test]
    fn normalize_ws_collapses_runs() {
        assert_eq!(normalize_ws("  a \n\t b  c "), "a b c");
        assert_eq!(normalize_ws(""), "");
    }
}
