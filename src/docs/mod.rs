//! Documentation output model.
//!
//! Formats, section types, and the per-repository [`DocumentSet`] that the
//! writer stage produces and the git stage commits.

mod layout;

pub use layout::{repo_files, write_outputs, OutputFile};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::workflow::RepoKey;

/// Output format of a generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Markdown,
    Mdx,
    #[serde(rename = "openapi")]
    OpenApi,
    Html,
}

impl OutputFormat {
    pub const ALL: [Self; 4] = [Self::Markdown, Self::Mdx, Self::OpenApi, Self::Html];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Mdx => "mdx",
            Self::OpenApi => "openapi",
            Self::Html => "html",
        }
    }

    /// File extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Mdx => "mdx",
            Self::OpenApi => "yaml",
            Self::Html => "html",
        }
    }

    /// Whether documents in this format are split into sections.
    ///
    /// OpenAPI output is a single specification per repository.
    pub fn is_sectioned(&self) -> bool {
        !matches!(self, Self::OpenApi)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "mdx" => Ok(Self::Mdx),
            "openapi" | "yaml" | "openapi-yaml" => Ok(Self::OpenApi),
            "html" => Ok(Self::Html),
            other => {
                let known: Vec<&str> = Self::ALL.iter().map(Self::as_str).collect();
                Err(format!(
                    "unknown output format: {other} (expected one of: {})",
                    known.join(", ")
                ))
            }
        }
    }
}

/// Kind of documentation section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Overview,
    Installation,
    Usage,
    Api,
    Architecture,
    Contributing,
    Changelog,
}

impl SectionType {
    pub const ALL: [Self; 7] = [
        Self::Overview,
        Self::Installation,
        Self::Usage,
        Self::Api,
        Self::Architecture,
        Self::Contributing,
        Self::Changelog,
    ];

    /// Identifier used in file names and section tags.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Installation => "installation",
            Self::Usage => "usage",
            Self::Api => "api",
            Self::Architecture => "architecture",
            Self::Contributing => "contributing",
            Self::Changelog => "changelog",
        }
    }

    pub fn default_title(&self) -> &'static str {
        match self {
            Self::Overview => "Overview",
            Self::Installation => "Installation",
            Self::Usage => "Usage",
            Self::Api => "API Reference",
            Self::Architecture => "Architecture",
            Self::Contributing => "Contributing",
            Self::Changelog => "Changelog",
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for SectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|section| section.slug() == lower)
            .ok_or_else(|| format!("unknown section type: {s}"))
    }
}

/// One section rendered in every requested sectioned format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSection {
    pub section: SectionType,
    pub title: String,
    pub content: BTreeMap<OutputFormat, String>,
}

/// Full documentation for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSet {
    pub repo: RepoKey,
    pub sections: Vec<DocSection>,
    /// OpenAPI specification, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openapi: Option<String>,
}

impl DocumentSet {
    pub fn new(repo: RepoKey) -> Self {
        Self { repo, sections: Vec::new(), openapi: None }
    }


    /// All sections joined into one document of `format`.
    pub fn combined(&self, format: OutputFormat, language: &str) -> Option<String> {
        let title = self.repo.name();
        match format {
            OutputFormat::OpenApi => self.openapi.clone(),
            OutputFormat::Markdown => {
                self.joined(format).map(|joined| format!("# {title}\n\n{joined}\n"))
            }
            OutputFormat::Mdx => self
                .joined(format)
                .map(|joined| format!("{}# {title}\n\n{joined}\n", frontmatter(title))),
            OutputFormat::Html => {
                self.joined(format).map(|joined| html_document(title, language, &joined))
            }
        }
    }

    /// Section bodies in `format`, in section order, or `None` if there are none.
    fn joined(&self, format: OutputFormat) -> Option<String> {
        let bodies: Vec<&str> = self
            .sections
            .iter()
            .filter_map(|s| s.content.get(&format).map(String::as_str))
            .collect();
        (!bodies.is_empty()).then(|| bodies.join("\n\n"))
    }

    /// Files making up this set, relative to `docs_dir`.
    pub fn files(&self, docs_dir: &str) -> Vec<OutputFile> {
        let dir = docs_dir.trim_end_matches('/');
        let join = |name: String| if dir.is_empty() { name } else { format!("{dir}/{name}") };

        let mut files = Vec::new();
        for section in &self.sections {
            for (format, body) in &section.content {
                let content = match format {
                    OutputFormat::Mdx => format!("{}{body}\n", frontmatter(&section.title)),
                    _ => format!("{body}\n"),
                };
                files.push(OutputFile {
                    path: join(format!("{}.{}", section.section.slug(), format.extension())),
                    content,
                });
            }
        }
        if let Some(spec) = &self.openapi {
            let path = join("openapi.yaml".to_string());
            files.push(OutputFile { path, content: spec.clone() });
        }
        files
    }
}

fn frontmatter(title: &str) -> String {
    format!("---\ntitle: \"{}\"\n---\n\n", title.replace('"', "\\\""))
}

fn html_document(title: &str, language: &str, body: &str) -> String {
    let title = escape_html(title);
    format!(
        "<!DOCTYPE html>\n<html lang=\"{language}\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>\n"
    )
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

/// Render a section from its outline when no generated text is available.
pub fn render_outline(format: OutputFormat, title: &str, outline: &[String]) -> String {
    match format {
        OutputFormat::Html => {
            let mut out = format!("<section>\n<h2>{}</h2>\n", escape_html(title));
            if !outline.is_empty() {
                out.push_str("<ul>\n");
                for item in outline {
                    out.push_str(&format!("<li>{}</li>\n", escape_html(item)));
                }
                out.push_str("</ul>\n");
            }
            out.push_str("</section>");
            out
        }
        _ => {
            let mut out = format!("## {title}\n");
            if !outline.is_empty() {
                out.push('\n');
                for item in outline {
                    out.push_str(&format!("- {item}\n"));
                }
            }
            out.trim_end().to_string()
        }
    }
}
