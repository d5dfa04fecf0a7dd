use crate::adapter::{Locator, Marker, Step};
use crate::error::ParseError;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

pub fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

/// Collapse runs of whitespace and trim
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn element_text(element: &ElementRef) -> String {
    normalize_text(&element.text().collect::<String>())
}

pub fn parse_document(url: &str, body: &str) -> Result<Html, ParseError> {
    if body.trim().is_empty() {
        return Err(ParseError::EmptyDocument {
            url: url.to_string(),
        });
    }
    Ok(Html::parse_document(body))
}

/// First element matching the marker's selector (and text, if given)
pub fn find_marker<'a>(document: &'a Html, marker: &Marker) -> Result<Option<ElementRef<'a>>, ParseError> {
    let sel = selector(&marker.selector)?;
    Ok(document
        .select(&sel)
        .find(|el| text_matches(el, marker.text.as_deref())))
}

fn text_matches(element: &ElementRef, expected: Option<&str>) -> bool {
    match expected {
        Some(expected) => element_text(element) == normalize_text(expected),
        None => true,
    }
}

/// Resolve a locator to its value. Empty values count as not found.
pub fn locate(document: &Html, locator: &Locator) -> Result<Option<String>, ParseError> {
    let sel = selector(&locator.selector)?;
    let step = match &locator.then {
        Some(step) => Some((step, selector(step.selector())?)),
        None => None,
    };

    for anchor in document
        .select(&sel)
        .filter(|el| text_matches(el, locator.text.as_deref()))
    {
        let target = match &step {
            Some((step, step_sel)) => match step {
                Step::Following(_) => following(anchor, step_sel),
                Step::NextSibling(_) => next_sibling(anchor, step_sel),
                Step::Child(_) => anchor.select(step_sel).next(),
            },
            None => Some(anchor),
        };

        let value = target.map(|el| match &locator.attr {
            Some(attr) => el.value().attr(attr).map(normalize_text).unwrap_or_default(),
            None => element_text(&el),
        });

        if let Some(value) = value.filter(|v| !v.is_empty()) {
            return Ok(Some(value));
        }
    }

    Ok(None)
}

/// First element matching `sel` after `element` in document order,
/// descendants of `element` included
pub fn following<'a>(element: ElementRef<'a>, sel: &Selector) -> Option<ElementRef<'a>> {
    let inner = element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|el| sel.matches(el));
    if inner.is_some() {
        return inner;
    }

    let mut node = *element;
    loop {
        for sibling in node.next_siblings() {
            let found = sibling
                .descendants()
                .filter_map(ElementRef::wrap)
                .find(|el| sel.matches(el));
            if found.is_some() {
                return found;
            }
        }
        node = node.parent()?;
    }
}

pub fn next_sibling<'a>(element: ElementRef<'a>, sel: &Selector) -> Option<ElementRef<'a>> {
    element
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| sel.matches(el))
}

/// `href` of the element itself, or of the first link inside it
pub fn link_href<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    if let Some(href) = element.value().attr("href") {
        return Some(href);
    }
    let anchor = Selector::parse("a[href]").ok()?;
    element
        .select(&anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
}

/// Resolve a possibly relative link against a base URL, dropping any fragment
pub fn resolve_url(base: &str, href: &str) -> Result<String, ParseError> {
    let href = href.trim();
    let invalid = |message: String| ParseError::Url {
        url: href.to_string(),
        message,
    };

    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return Err(invalid("not a page link".to_string()));
    }

    let base = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    let mut resolved = base.join(href).map_err(|e| invalid(e.to_string()))?;
    resolved.set_fragment(None);
    Ok(resolved.to_string())
}

/// `url` with `param` set to `value`, other query pairs kept in order
pub fn with_query_param(url: &str, param: &str, value: &str) -> Result<String, ParseError> {
    let mut parsed = Url::parse(url).map_err(|e| ParseError::Url {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(param, value);
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(selector: &str) -> Locator {
        Locator {
            selector: selector.to_string(),
            text: None,
            then: None,
            attr: None,
        }
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Toyota\n   Corolla \t 2012 "), "Toyota Corolla 2012");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_invalid_selector_is_parse_error() {
        let err = selector("div[[").unwrap_err();
        assert!(matches!(err, ParseError::Selector { ref selector, .. } if selector == "div[["));
    }

    #[test]
    fn test_empty_body_is_parse_error() {
        let err = parse_document("https://x.test/", " \n ").unwrap_err();
        assert_eq!(
            err,
            ParseError::EmptyDocument {
                url: "https://x.test/".to_string()
            }
        );
    }

    #[test]
    fn test_locate_following_element() {
        // Mirrors Autochek: the price sits in the first h5 after the title
        let doc = Html::parse_document(
            r#"<div><h1 itemprop="name">Kia Rio</h1></div><section><h5> GH₵ 80,000 </h5></section>"#,
        );
        let mut locator = loc("h1[itemprop=name]");
        locator.then = Some(Step::Following("h5".to_string()));

        assert_eq!(locate(&doc, &locator).unwrap(), Some("GH₵ 80,000".to_string()));
    }

    #[test]
    fn test_locate_next_sibling_and_child() {
        let doc = Html::parse_document(
            r#"<div><h3>Model</h3><p>ignored</p><a>Corolla</a></div><div class="p"><span>12</span></div>"#,
        );

        let mut sibling = loc("h3");
        sibling.text = Some("Model".to_string());
        sibling.then = Some(Step::NextSibling("a".to_string()));
        assert_eq!(locate(&doc, &sibling).unwrap(), Some("Corolla".to_string()));

        let mut child = loc("div.p");
        child.then = Some(Step::Child("span".to_string()));
        assert_eq!(locate(&doc, &child).unwrap(), Some("12".to_string()));
    }

    #[test]
    fn test_locate_attribute_and_missing() {
        let doc = Html::parse_document(r#"<meta itemprop="price" content=" 5000 "><p class="empty"> </p>"#);

        let mut attr = loc("meta[itemprop=price]");
        attr.attr = Some("content".to_string());
        assert_eq!(locate(&doc, &attr).unwrap(), Some("5000".to_string()));

        assert_eq!(locate(&doc, &loc("p.empty")).unwrap(), None);
        assert_eq!(locate(&doc, &loc("h1")).unwrap(), None);
    }

    #[test]
    fn test_find_marker_with_text() {
        let doc = Html::parse_document(
            r#"<a class="js-handle-click-ctr">2</a><a class="js-handle-click-ctr"> 500 </a>"#,
        );
        let marker = Marker {
            selector: "a.js-handle-click-ctr".to_string(),
            text: Some("500".to_string()),
        };
        assert!(find_marker(&doc, &marker).unwrap().is_some());

        let marker = Marker {
            text: Some("501".to_string()),
            ..marker
        };
        assert!(find_marker(&doc, &marker).unwrap().is_none());
    }

    #[test]
    fn test_link_href_from_container() {
        let doc = Html::parse_document(r#"<div class="car-item"><span><a href="/car/1">x</a></span></div>"#);
        let sel = selector("div.car-item").unwrap();
        let element = doc.select(&sel).next().unwrap();
        assert_eq!(link_href(&element), Some("/car/1"));
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("https://autochek.africa/en/gh/car/", "toyota-camry-123").unwrap(),
            "https://autochek.africa/en/gh/car/toyota-camry-123"
        );
        assert_eq!(
            resolve_url("https://deals.jumia.com.gh", "/cars/kia-rio-99#gallery").unwrap(),
            "https://deals.jumia.com.gh/cars/kia-rio-99"
        );
        assert_eq!(
            resolve_url("https://tonaton.com", "https://tonaton.com/a_1.html").unwrap(),
            "https://tonaton.com/a_1.html"
        );
        assert!(resolve_url("https://tonaton.com", "#top").is_err());
        assert!(resolve_url("https://tonaton.com", "").is_err());
    }

    #[test]
    fn test_with_query_param_replaces_existing_value() {
        assert_eq!(
            with_query_param("https://jiji.com.gh/cars", "page", "2").unwrap(),
            "https://jiji.com.gh/cars?page=2"
        );
        assert_eq!(
            with_query_param(
                "https://autochek.africa/gh/cars-for-sale?country=gh&page_number=3",
                "page_number",
                "4"
            )
            .unwrap(),
            "https://autochek.africa/gh/cars-for-sale?country=gh&page_number=4"
        );
    }
}
