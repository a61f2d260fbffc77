//! Human and JSON renderings of command results.
//!
//! Every function returns the text instead of printing it so the binary
//! decides where it goes and tests can inspect it.

use serde::Serialize;

use crate::{
    error::Result,
    page::Page,
    query::{SearchHit, SearchResults, TagCount},
    user::User,
    wiki::{DriftReport, Status},
};

/// Serialize any result for `--json` output.
pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn page_human(slug: &str, page: &Page) -> String {
    let mut out = format!("--- {slug} ---\n");
    if !page.metadata.title.is_empty() {
        out.push_str(&format!("Title: {}\n", page.metadata.title));
    }
    if !page.metadata.tags.is_empty() {
        out.push_str(&format!("Tags: {}\n", page.metadata.tags.join(", ")));
    }
    out.push_str(&format!(
        "Modified: {}\n\n",
        page.metadata.modified.to_rfc3339()
    ));
    out.push_str(&page.contents);
    if !page.contents.ends_with('\n') {
        out.push('\n');
    }
    out
}

pub fn search_human(results: &SearchResults, from: usize) -> String {
    if results.total == 0 {
        return "No results found.\n".to_string();
    }

    let mut out = String::new();
    for (offset, hit) in results.hits.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. [{:.3}] {}\n",
            from + offset + 1,
            hit.score,
            hit.id
        ));
        push_hit_details(&mut out, hit);
        if !hit.snippet.is_empty() {
            for line in hit.snippet.lines() {
                out.push_str(&format!("     | {line}\n"));
            }
        }
    }

    if !results.facets.is_empty() {
        out.push_str("\nTags:\n");
        out.push_str(&tags_human(&results.facets));
    }

    out.push_str(&format!(
        "\n{} of {} result(s)\n",
        results.hits.len(),
        results.total
    ));
    out
}

fn push_hit_details(out: &mut String, hit: &SearchHit) {
    if !hit.title.is_empty() {
        out.push_str(&format!("     {}\n", hit.title));
    }
    if !hit.tags.is_empty() {
        out.push_str(&format!("     #{}\n", hit.tags.join(" #")));
    }
}

pub fn tags_human(tags: &[TagCount]) -> String {
    if tags.is_empty() {
        return "No tags.\n".to_string();
    }
    let width = tags.iter().map(|t| t.tag.len()).max().unwrap_or(0);
    tags.iter()
        .map(|t| format!("  {:<width$}  {}\n", t.tag, t.count))
        .collect()
}

/// Pages under one tag, as returned by [`crate::Wiki::pages_with_tag`].
pub fn tagged_pages_human(tag: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No pages tagged '{tag}'.\n");
    }
    let mut out = String::new();
    for hit in hits {
        if hit.title.is_empty() {
            out.push_str(&format!("{}\n", hit.id));
        } else {
            out.push_str(&format!("{}  ({})\n", hit.id, hit.title));
        }
    }
    out
}

/// Public view of a user; the derived key and salt stay out of output.
#[derive(Debug, Serialize)]
pub struct UserSummary<'a> {
    pub username: &'a str,
    pub admin: bool,
}

impl<'a> From<&'a User> for UserSummary<'a> {
    fn from(user: &'a User) -> Self {
        Self {
            username: &user.username,
            admin: user.admin,
        }
    }
}

pub fn users_human(users: &[User]) -> String {
    if users.is_empty() {
        return "No users.\n".to_string();
    }
    users
        .iter()
        .map(|u| {
            if u.admin {
                format!("{} (admin)\n", u.username)
            } else {
                format!("{}\n", u.username)
            }
        })
        .collect()
}

pub fn drift_human(report: &DriftReport) -> String {
    if report.is_consistent() {
        return "Index is consistent with the record store.\n".to_string();
    }
    let mut out = String::new();
    if !report.missing.is_empty() {
        out.push_str(&format!("Missing from index ({}):\n", report.missing.len()));
        for slug in &report.missing {
            out.push_str(&format!("  {slug}\n"));
        }
    }
    if !report.orphaned.is_empty() {
        out.push_str(&format!(
            "Orphaned in index ({}):\n",
            report.orphaned.len()
        ));
        for slug in &report.orphaned {
            out.push_str(&format!("  {slug}\n"));
        }
    }
    out
}

pub fn status_human(data_dir: &std::path::Path, status: &Status) -> String {
    format!(
        "Data directory: {}\nPages: {}\nUsers: {}\nIndexed documents: {}\n",
        data_dir.display(),
        status.pages,
        status.users,
        status.indexed
    )
}
