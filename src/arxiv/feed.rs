use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::ArxivError;
use super::types::{Page, Paper};

#[derive(Default)]
struct EntryBuilder {
    id: String,
    title: String,
    summary: String,
    published: String,
    updated: String,
    authors: Vec<String>,
    link: Option<String>,
}

impl EntryBuilder {
    fn finish(self) -> Result<Paper, ArxivError> {
        if self.id.contains("/api/errors") {
            let message = if self.summary.is_empty() { self.title } else { self.summary };
            return Err(ArxivError::Api(message));
        }
        if self.id.is_empty() {
            return Err(ArxivError::Feed("entry without <id>".into()));
        }
        let published = parse_timestamp(&self.published, "published", &self.id)?;
        let updated = parse_timestamp(&self.updated, "updated", &self.id)?;
        Ok(Paper {
            link: self.link.unwrap_or_else(|| self.id.clone()),
            entry_id: self.id,
            title: collapse_whitespace(&self.title),
            authors: self.authors,
            summary: self.summary,
            published,
            updated,
        })
    }
}

fn parse_timestamp(raw: &str, field: &str, id: &str) -> Result<DateTime<Utc>, ArxivError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ArxivError::Feed(format!("bad <{field}> '{raw}' in {id}: {e}")))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn alternate_href(e: &BytesStart<'_>) -> Option<String> {
    let mut rel = None;
    let mut href = None;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().ok()?.into_owned();
        match attr.key.as_ref() {
            b"rel" => rel = Some(value),
            b"href" => href = Some(value),
            _ => {}
        }
    }
    // Atom: a link without rel is "alternate".
    match rel.as_deref() {
        None | Some("alternate") => href,
        _ => None,
    }
}

/// Parse an arXiv Atom response into a [`Page`].
pub fn parse_page(xml: &str) -> Result<Page, ArxivError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut page = Page::default();
    let mut entry: Option<EntryBuilder> = None;
    let mut in_author = false;
    let mut text = String::new();

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ArxivError::Feed(format!("XML error at {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                text.clear();
                match e.local_name().as_ref() {
                    b"entry" => entry = Some(EntryBuilder::default()),
                    b"author" => in_author = true,
                    b"link" => {
                        if let Some(cur) = entry.as_mut()
                            && cur.link.is_none()
                        {
                            cur.link = alternate_href(&e);
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"link"
                    && let Some(cur) = entry.as_mut()
                    && cur.link.is_none()
                {
                    cur.link = alternate_href(&e);
                }
            }
            Event::Text(t) => {
                let chunk = t
                    .unescape()
                    .map_err(|e| ArxivError::Feed(format!("bad text: {e}")))?;
                text.push_str(&chunk);
            }
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::End(e) => {
                let value = std::mem::take(&mut text).trim().to_string();
                let name = e.local_name();
                if name.as_ref() == b"entry" {
                    if let Some(done) = entry.take() {
                        page.papers.push(done.finish()?);
                    }
                    continue;
                }
                match (name.as_ref(), entry.as_mut()) {
                    (b"author", _) => in_author = false,
                    (b"name", Some(cur)) if in_author && !value.is_empty() => {
                        cur.authors.push(value);
                    }
                    (b"id", Some(cur)) => cur.id = value,
                    (b"title", Some(cur)) => cur.title = value,
                    (b"summary", Some(cur)) => cur.summary = value,
                    (b"published", Some(cur)) => cur.published = value,
                    (b"updated", Some(cur)) => cur.updated = value,
                    (b"totalResults", None) => {
                        page.total_results = value.parse().ok();
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Ok(page)
}

#[cfg(test)]
pub(crate) fn atom_entry(id: &str, updated: &str, title: &str) -> String {
    format!(
        r#"<entry>
    <id>{id}</id>
    <updated>{updated}</updated>
    <published>2023-11-02T09:00:00Z</published>
    <title>{title}</title>
    <summary>  Abstract of {title}.
    </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name><arxiv:affiliation>Bletchley</arxiv:affiliation></author>
    <link href="{id}" rel="alternate" type="text/html"/>
    <link title="pdf" href="{id}.pdf" rel="related" type="application/pdf"/>
  </entry>"#
    )
}

#[cfg(test)]
pub(crate) fn atom_feed(total: usize, entries: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query</title>
  <id>http://arxiv.org/api/abc</id>
  <updated>2024-01-02T00:00:00-05:00</updated>
  <opensearch:totalResults>{total}</opensearch:totalResults>
  <opensearch:startIndex>0</opensearch:startIndex>
  {}
</feed>"#,
        entries.join("\n  ")
    )
}
