//! The converted-document shapes a [`Converter`](super::adapter::Converter) returns.

/// A table recognized by the engine, as rows of cell text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rendered PNG of the table region, when the engine produced one.
    pub image: Option<Vec<u8>>,
}

impl Table {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            header,
            rows,
            image: None,
        }
    }

    pub fn with_image(mut self, png: Vec<u8>) -> Self {
        self.image = Some(png);
        self
    }

    /// RFC 4180 CSV, header first.
    pub fn export_csv(&self) -> String {
        let mut out = String::new();
        for row in std::iter::once(&self.header).chain(self.rows.iter()) {
            if row.is_empty() {
                continue;
            }
            let line: Vec<String> = row.iter().map(|c| csv_field(c)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    pub fn export_html(&self) -> String {
        let mut out = String::from("<table>");
        if !self.header.is_empty() {
            out.push_str("<thead><tr>");
            for cell in &self.header {
                out.push_str("<th>");
                out.push_str(&html_escape(cell));
                out.push_str("</th>");
            }
            out.push_str("</tr></thead>");
        }
        out.push_str("<tbody>");
        for row in &self.rows {
            out.push_str("<tr>");
            for cell in row {
                out.push_str("<td>");
                out.push_str(&html_escape(cell));
                out.push_str("</td>");
            }
            out.push_str("</tr>");
        }
        out.push_str("</tbody></table>");
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Table,
    Picture,
}

/// A visual element in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    tables: Vec<Table>,
    elements: Vec<Element>,
    markdown: String,
}

impl Document {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            tables: Vec::new(),
            elements: Vec::new(),
            markdown: markdown.into(),
        }
    }

    pub fn push_table(&mut self, table: Table) {
        self.elements.push(Element {
            kind: ElementKind::Table,
            image: table.image.clone(),
        });
        self.tables.push(table);
    }

    pub fn push_picture(&mut self, png: Option<Vec<u8>>) {
        self.elements.push(Element {
            kind: ElementKind::Picture,
            image: png,
        });
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn iterate_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn export_markdown(&self) -> &str {
        &self.markdown
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
