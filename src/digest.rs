use chrono::{DateTime, Utc};

use crate::arxiv::types::Paper;
use crate::state::format_query_time;

const BANNER_RULE: &str =
    "====================================================================\n";
const TITLE_RULE: &str = "------------------------------------------------------\n";
const ENTRY_DATE_FORMAT: &str = "%d.%m.%y";

/// The papers a digest reports on. `updated` is already empty when updated papers are muted.
#[derive(Debug, Clone, Copy)]
pub struct Digest<'a> {
    pub generated_at: DateTime<Utc>,
    pub new: &'a [Paper],
    pub updated: &'a [Paper],
}

impl Digest<'_> {
    /// Plain-text rendering, as written to the results file.
    pub fn to_text(&self) -> String {
        let mut out = String::from(BANNER_RULE);
        out.push_str(&format!(
            "                {}                   \n",
            format_query_time(self.generated_at)
        ));
        out.push_str(BANNER_RULE);

        if !self.new.is_empty() {
            out.push_str(&format!("New Papers ({}): \n\n", self.new.len()));
            for paper in self.new {
                push_text_entry(paper, &mut out);
            }
        }
        if !self.updated.is_empty() {
            out.push_str(&format!("Updated Papers ({}): \n\n", self.updated.len()));
            for paper in self.updated {
                push_text_entry(paper, &mut out);
            }
        }
        out
    }

    /// HTML rendering, used as the email body.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<html><body>");
        out.push_str(&format!(
            "<p><b>{}</b></p>",
            escape_html(&format_query_time(self.generated_at))
        ));

        if !self.new.is_empty() {
            out.push_str(&format!("<p>New Papers({}): </p>", self.new.len()));
            for paper in self.new {
                push_html_entry(paper, &mut out);
            }
        }
        if !self.updated.is_empty() {
            out.push_str(&format!("<p>Updated Papers({}): </p>", self.updated.len()));
            for paper in self.updated {
                push_html_entry(paper, &mut out);
            }
        }
        out.push_str("</body></html>");
        out
    }
}

fn dates_line(paper: &Paper) -> String {
    format!(
        "Submitted: {}, Last Updated: {}",
        paper.published.format(ENTRY_DATE_FORMAT),
        paper.updated.format(ENTRY_DATE_FORMAT)
    )
}

fn push_text_entry(paper: &Paper, out: &mut String) {
    out.push_str(&paper.title);
    out.push('\n');
    out.push_str(TITLE_RULE);
    out.push_str(&paper.authors.join(", "));
    out.push('\n');
    out.push_str(&dates_line(paper));
    out.push('\n');
    out.push_str(&paper.link);
    out.push('\n');
    out.push('\n');
    out.push_str(&paper.summary);
    out.push_str("\n\n\n");
}

fn push_html_entry(paper: &Paper, out: &mut String) {
    let link = escape_html(&paper.link);
    out.push_str(&format!("<p><b>{}</b></p>", escape_html(&paper.title)));
    out.push_str(&format!("<p><i>{}</i></p>", escape_html(&paper.authors.join(", "))));
    out.push_str(&format!("<p>{}</p>", dates_line(paper)));
    out.push_str(&format!("<p><a href=\"{link}\">{link}</a></p>"));
    out.push_str(&format!("<p>{}<br><br></p>", escape_html(&paper.summary)));
}

/// Escape characters with meaning in HTML text and attribute values.
pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
