//! DOCX document parser using docx-rs
//!
//! Extracts paragraph text and tables (rendered as Markdown) from
//! Microsoft Word documents.

use std::path::Path;

use docx_rs::{read_docx, DocumentChild, Paragraph, ParagraphChild, RunChild};

use crate::{DocumentParser, FileType, ParsedDocument, ParserError, Result, Table};

/// DOCX document parser
#[derive(Debug, Default)]
pub struct DocxParser;

impl DocxParser {
    /// Create a new DOCX parser
    pub fn new() -> Self {
        Self
    }

    /// Extract text from DOCX bytes
    pub fn extract_from_bytes(&self, bytes: &[u8]) -> Result<String> {
        let docx = read_docx(bytes).map_err(|e| ParserError::DocxError(e.to_string()))?;

        let mut content = String::new();

        for child in docx.document.children {
            match child {
                DocumentChild::Paragraph(para) => {
                    content.push_str(&paragraph_text(&para));
                    content.push('\n');
                }
                DocumentChild::Table(tbl) => {
                    let mut table = Table::new();

                    for row in &tbl.rows {
                        let docx_rs::TableChild::TableRow(tr) = row;
                        let cells: Vec<String> = tr
                            .cells
                            .iter()
                            .map(|cell| {
                                let docx_rs::TableRowChild::TableCell(tc) = cell;
                                tc.children
                                    .iter()
                                    .filter_map(|c| match c {
                                        docx_rs::TableCellContent::Paragraph(p) => {
                                            Some(paragraph_text(p))
                                        }
                                        _ => None,
                                    })
                                    .collect::<Vec<_>>()
                                    .join(" ")
                                    .trim()
                                    .to_string()
                            })
                            .collect();

                        if table.headers.is_empty() {
                            table.headers = cells;
                        } else {
                            table.rows.push(cells);
                        }
                    }

                    content.push_str(&table.to_markdown());
                    content.push('\n');
                }
                _ => {}
            }
        }

        Ok(content)
    }
}

fn paragraph_text(para: &Paragraph) -> String {
    let mut text = String::new();
    for child in &para.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

impl DocumentParser for DocxParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let content = self.extract_from_bytes(&bytes)?;
        Ok(ParsedDocument::new(path.display().to_string(), FileType::Docx).with_content(content))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Docx]
    }
}
