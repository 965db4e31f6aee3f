//! PDF composition with genpdf.

use std::path::Path;

use genpdf::{
    Document, SimplePageDecorator,
    elements::{Break, Paragraph},
    fonts::{FontData, FontFamily},
    style::{Style, StyledString},
};

use crate::application::ports::{ComposeError, ComposedDocument, DocumentComposer};

const TITLE_FONT_SIZE: u8 = 16;
const BODY_FONT_SIZE: u8 = 11;
const PAGE_MARGIN_MM: i32 = 15;

/// Renders composed documents with one font family loaded at startup.
pub struct GenpdfComposer {
    fonts: FontFamily<FontData>,
}

impl GenpdfComposer {
    /// Load `{family}-Regular.ttf`, `-Bold`, `-Italic` and `-BoldItalic` from `dir`.
    pub fn from_dir(dir: &Path, family: &str) -> Result<Self, ComposeError> {
        let fonts = genpdf::fonts::from_files(dir, family, None)
            .map_err(|err| ComposeError::Fonts(format!("{family} in {}: {err}", dir.display())))?;
        Ok(Self { fonts })
    }
}

impl DocumentComposer for GenpdfComposer {
    fn render_pdf(&self, document: &ComposedDocument) -> Result<Vec<u8>, ComposeError> {
        let mut doc = Document::new(self.fonts.clone());
        doc.set_title(document.title.clone());
        doc.set_font_size(BODY_FONT_SIZE);
        doc.set_line_spacing(1.25);

        let mut decorator = SimplePageDecorator::new();
        decorator.set_margins(PAGE_MARGIN_MM);
        doc.set_page_decorator(decorator);

        doc.push(Paragraph::new(StyledString::new(
            document.title.clone(),
            Style::new().bold().with_font_size(TITLE_FONT_SIZE),
        )));
        doc.push(Break::new(1));

        for field in &document.fields {
            let mut line = Paragraph::new(StyledString::new(
                format!("{}: ", field.label),
                Style::new().bold(),
            ));
            line.push(StyledString::new(field.value.clone(), Style::new()));
            doc.push(line);
        }

        let mut out = Vec::new();
        doc.render(&mut out)
            .map_err(|err| ComposeError::Render(err.to_string()))?;
        Ok(out)
    }
}
