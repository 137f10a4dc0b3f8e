use colored::Colorize;
use std::fmt;

// =============================================================================
// Milestone 1: Inline fragments
// =============================================================================

const MAX_HEADER_LEVEL: usize = 6;

fn bold(text: &str) -> String {
    format!("**{text}**")
}

fn italic(text: &str) -> String {
    format!("*{text}*")
}

fn table_line<S: AsRef<str>>(cells: &[S]) -> String {
    let joined = cells.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("|");
    format!("|{joined}|")
}

// =============================================================================
// Milestone 2: Nested builders (link -> cell -> row -> table)
// =============================================================================

#[derive(Debug, Default)]
pub struct LinkBuilder {
    label: String,
}

impl LinkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_text(&mut self, text: &str) -> &mut Self {
        self.label.push_str(text);
        self
    }

    pub fn add_bold(&mut self, text: &str) -> &mut Self {
        self.label.push_str(&bold(text));
        self
    }

    pub fn add_italic(&mut self, text: &str) -> &mut Self {
        self.label.push_str(&italic(text));
        self
    }

    pub fn build(&self) -> String {
        self.label.clone()
    }
}

#[derive(Debug, Default)]
pub struct CellBuilder {
    content: String,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_text(&mut self, text: &str) -> &mut Self {
        self.content.push_str(text);
        self
    }

    pub fn add_bold(&mut self, text: &str) -> &mut Self {
        self.content.push_str(&bold(text));
        self
    }

    pub fn add_italic(&mut self, text: &str) -> &mut Self {
        self.content.push_str(&italic(text));
        self
    }

    /// The closure configures the visible label; `url` is the target.
    pub fn add_link<F>(&mut self, configure: F, url: &str) -> &mut Self
    where
        F: FnOnce(&mut LinkBuilder),
    {
        let mut link = LinkBuilder::new();
        configure(&mut link);
        self.content.push_str(&format!("[{}]({url})", link.build()));
        self
    }

    pub fn build(&self) -> String {
        self.content.clone()
    }
}

#[derive(Debug, Default)]
pub struct RowBuilder {
    row: String,
}

impl RowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cell<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&mut CellBuilder),
    {
        let mut cell = CellBuilder::new();
        configure(&mut cell);
        self.row.push('|');
        self.row.push_str(&cell.build());
        self
    }

    // Every cell opened its own leading pipe, so only the closing one is missing.
    pub fn build(&self) -> String {
        format!("{}|", self.row)
    }
}

#[derive(Debug, Default)]
pub struct TableBuilder {
    rows: String,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&mut RowBuilder),
    {
        let mut row = RowBuilder::new();
        configure(&mut row);
        self.rows.push_str(&row.build());
        self.rows.push('\n');
        self
    }

    pub fn build(&self) -> String {
        self.rows.clone()
    }
}

// =============================================================================
// Milestone 3: The fluent document builder
// =============================================================================

/// Accumulates a Markdown document through chained calls.
///
/// Text is appended as-is; nothing is escaped.
#[derive(Debug, Default)]
pub struct MarkdownBuilder {
    document: String,
}

impl MarkdownBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_text(&mut self, text: &str) -> &mut Self {
        self.document.push_str(text);
        self
    }

    pub fn add_bold(&mut self, text: &str) -> &mut Self {
        self.document.push_str(&bold(text));
        self
    }

    pub fn add_italic(&mut self, text: &str) -> &mut Self {
        self.document.push_str(&italic(text));
        self
    }

    /// Levels outside `1..=6` are clamped to the nearest valid level.
    pub fn add_header(&mut self, level: usize, text: &str) -> &mut Self {
        let level = level.clamp(1, MAX_HEADER_LEVEL);
        self.document.push_str(&"#".repeat(level));
        self.document.push(' ');
        self.document.push_str(text);
        self.document.push('\n');
        self
    }

    pub fn add_link(&mut self, name: &str, url: &str) -> &mut Self {
        self.document.push_str(&format!("[{name}]({url})"));
        self
    }

    pub fn new_line(&mut self) -> &mut Self {
        self.document.push('\n');
        self
    }

    pub fn add_table<H, R>(&mut self, headers: &[H], rows: &[R]) -> &mut Self
    where
        H: AsRef<str>,
        R: AsRef<[H]>,
    {
        self.push_table_header(headers);
        for row in rows {
            self.document.push_str(&table_line(row.as_ref()));
            self.document.push('\n');
        }
        self
    }

    pub fn add_table_with<H, F>(&mut self, headers: &[H], configure: F) -> &mut Self
    where
        H: AsRef<str>,
        F: FnOnce(&mut TableBuilder),
    {
        self.push_table_header(headers);
        let mut table = TableBuilder::new();
        configure(&mut table);
        self.document.push_str(&table.build());
        self
    }

    pub fn build(&self) -> String {
        self.document.clone()
    }

    fn push_table_header<H: AsRef<str>>(&mut self, headers: &[H]) {
        self.document.push_str(&table_line(headers));
        self.document.push('\n');
        self.document.push_str(&table_line(&vec!["---"; headers.len()]));
        self.document.push('\n');
    }
}

impl fmt::Display for MarkdownBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.document)
    }
}

fn main() {
    println!("{}", "=== Fluent Markdown Builder ===".bold());

    let mut markdown = MarkdownBuilder::new();
    markdown
        .add_header(1, "Course Report")
        .add_text("Generated by the ")
        .add_bold("fluent")
        .add_text(" builder, ")
        .add_italic("no templates")
        .add_text(". Source: ")
        .add_link("repository", "https://example.com/course")
        .new_line()
        .new_line()
        .add_header(2, "Scores")
        .add_table(&["Student", "Score"], &[["Alice", "92"], ["Bob", "85"]])
        .new_line()
        .add_header(2, "Resources")
        .add_table_with(&["Topic", "Link"], |table| {
            table
                .add_row(|row| {
                    row.add_cell(|cell| {
                        cell.add_bold("Builder");
                    })
                    .add_cell(|cell| {
                        cell.add_link(
                            |link| {
                                link.add_text("read the ").add_italic("builder").add_bold(" docs");
                            },
                            "https://example.com/builder",
                        );
                    });
                })
                .add_row(|row| {
                    row.add_cell(|cell| {
                        cell.add_italic("Proxy");
                    })
                    .add_cell(|cell| {
                        cell.add_text("n/a");
                    });
                });
        });

    let document = markdown.build();
    println!("{document}");
    println!("({} characters)", document.len());
}

// =============================================================================
// Tests
// =============================================================================
