use dom_smoothie::{Config, Readability};

use crate::error::CrawlError;

/// Readability output for one page.
#[derive(Debug, Clone)]
pub struct ExtractedArticle {
    pub title: String,
    pub byline: String,
    pub content: String,
}

/// Run readability heuristics over a fetched page. `url` anchors
/// relative links in the extracted fragment. Pure function of its
/// inputs; fails when no article-like content can be isolated.
pub fn extract_article(body: &[u8], url: &str) -> Result<ExtractedArticle, CrawlError> {
    let html = String::from_utf8_lossy(body);
    let config = Config {
        max_elements_to_parse: 9000,
        ..Default::default()
    };
    let mut readability = Readability::new(html.as_ref(), Some(url), Some(config))
        .map_err(|err| CrawlError::Extract(err.to_string()))?;
    let article = readability
        .parse()
        .map_err(|err| CrawlError::Extract(err.to_string()))?;

    Ok(ExtractedArticle {
        title: article.title.to_string(),
        byline: article.byline.map(|byline| byline.to_string()).unwrap_or_default(),
        content: article.content.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_html() -> String {
        let paragraph = "The cats of the old harbour knew every fishmonger by gait and by \
            generosity, and they arranged their mornings accordingly. ";
        format!(
            "<html><head><title>Concerning Cats</title>\
             <meta name=\"author\" content=\"Jane Doe\"></head>\
             <body><article><h1>Concerning Cats</h1><p>{p}</p><p>{p}</p>\
             <p>{p}</p><p>{p}</p><p>{p}</p></article></body></html>",
            p = paragraph.repeat(4)
        )
    }

    #[test]
    fn extracts_title_and_content_from_an_article_page() {
        let html = article_html();
        let article = extract_article(html.as_bytes(), "http://example.com/cats").unwrap();
        assert_eq!(article.title, "Concerning Cats");
        assert!(article.content.contains("fishmonger"));
    }

    #[test]
    fn fails_on_a_page_with_no_article_body() {
        let result = extract_article(
            b"<html><body><p>hi</p></body></html>",
            "http://example.com/empty",
        );
        assert!(result.is_err());
    }
}
