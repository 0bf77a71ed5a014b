//! Readable text extraction from fetched markup

use scraper::Html;

/// Elements whose text is never page content
const NOISE_ELEMENTS: [&str; 7] = ["script", "style", "nav", "header", "footer", "aside", "menu"];

/// Strip markup noise and return the readable text of a document.
///
/// Text nodes are whitespace-normalized and joined with single spaces.
/// The html5ever parser recovers from any input, so malformed or partial
/// markup still yields best-effort text.
///
/// Input with no tags or entities is only whitespace-normalized. Text that
/// decodes to something tag-like (`&lt;script&gt;`) is not a fixed point:
/// a second pass reads the decoded `<script>` as markup.
pub fn extract_text(markup: &str) -> String {
    if !markup.contains(['<', '&']) {
        return markup.split_whitespace().collect::<Vec<_>>().join(" ");
    }

    let document = Html::parse_document(markup);
    let mut words: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let in_noise = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| NOISE_ELEMENTS.contains(&el.name()))
        });
        if in_noise {
            continue;
        }

        words.extend(text.split_whitespace());
    }

    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_script_keeps_paragraph() {
        let html = r#"<html><head><script>var secret = "tracking";</script></head>
            <body><p>Flights from Lagos start at $540.</p></body></html>"#;
        let text = extract_text(html);
        assert!(text.contains("Flights from Lagos start at $540."));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_drops_navigation_chrome() {
        let html = r#"<body>
            <header>Site Header</header>
            <nav><a href="/">Home</a><a href="/about">About</a></nav>
            <menu><li>Menu item</li></menu>
            <main><h1>Title</h1><p>Body   text
               here</p></main>
            <aside>Sidebar ad</aside>
            <style>.x { color: red }</style>
            <footer>Copyright</footer>
        </body>"#;
        assert_eq!(extract_text(html), "Title Body text here");
    }

    #[test]
    fn test_malformed_markup_is_best_effort() {
        let html = "<div><p>Unclosed paragraph <b>bold <script>alert(1)";
        let text = extract_text(html);
        assert_eq!(text, "Unclosed paragraph bold");
    }

    #[test]
    fn test_idempotent_on_clean_text() {
        let once = extract_text("<p>  Plain\n\ttext &amp; more </p>");
        assert_eq!(once, "Plain text & more");
        assert_eq!(extract_text(&once), once);
    }

    #[test]
    fn test_plain_text_skips_parsing() {
        let text = "Use script tags wisely,\n  and style   them";
        assert_eq!(extract_text(text), "Use script tags wisely, and style them");
        assert_eq!(extract_text(&extract_text(text)), extract_text(text));
    }

    #[test]
    fn test_escaped_markup_is_decoded_once() {
        let once = extract_text("<p>Use &lt;script&gt; tags wisely</p>");
        assert_eq!(once, "Use <script> tags wisely");
        // The decoded text now reads as markup
        assert_eq!(extract_text(&once), "Use");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract_text(""), "");
        assert_eq!(extract_text("<script>only()</script>"), "");
    }
}
