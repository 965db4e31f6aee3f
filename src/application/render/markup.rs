//! Markup-template substitution: `((Token))` placeholders filled with escaped values.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::info;

use crate::{
    application::{
        error::PipelineError,
        pipeline::context::PipelineContext,
        render::{MARKUP_SOURCE, job_input_prefix},
    },
    domain::{
        entities::{GenerationJobRecord, InvoiceRecord, JobInput, TemplateRecord},
        error::DomainError,
    },
};

const TOKEN_OPEN: &str = "((";
const TOKEN_CLOSE: &str = "))";
const DEFAULT_ATTACHMENT_STEM: &str = "document";

#[derive(Debug, Clone, PartialEq, Eq)]
struct TokenValue {
    text: String,
    /// Pre-built markup inserted verbatim instead of the escaped text.
    markup: Option<String>,
}

/// Named values available to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    values: BTreeMap<String, TokenValue>,
}

impl TokenSet {
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.values.insert(
            name.into(),
            TokenValue {
                text: text.into(),
                markup: None,
            },
        );
    }

    fn insert_markup(&mut self, name: &str, text: String, markup: String) {
        self.values.insert(
            name.to_string(),
            TokenValue {
                text,
                markup: Some(markup),
            },
        );
    }

    /// One token per header, named by the trimmed header text.
    pub fn from_row(headers: &[String], cells: &[String]) -> Self {
        let mut tokens = Self::default();
        for (index, header) in headers.iter().enumerate() {
            let name = header.trim();
            if name.is_empty() {
                continue;
            }
            let value = cells.get(index).map(String::as_str).unwrap_or_default();
            tokens.insert(name, value);
        }
        tokens
    }

    /// Fails when a line or the invoice total does not fit in cents.
    pub fn from_invoice(invoice: &InvoiceRecord) -> Result<Self, DomainError> {
        let mut tokens = Self::default();
        tokens.insert("InvoiceNumber", invoice.number.as_str());
        tokens.insert("CustomerName", invoice.customer_name.as_str());
        tokens.insert("CustomerEmail", invoice.customer_email.as_str());
        tokens.insert("IssuedOn", invoice.issued_on.to_string());
        tokens.insert("Currency", invoice.currency.as_str());
        tokens.insert("Total", format_cents(invoice.total_cents()?));

        let plain = invoice
            .lines
            .iter()
            .map(|line| format!("{} x{}", line.title, line.quantity))
            .collect::<Vec<_>>()
            .join("; ");
        let markup = invoice
            .lines
            .iter()
            .map(|line| {
                Ok(format!(
                    "{} & {} & {} & {} \\\\",
                    escape_markup(&line.title),
                    line.quantity,
                    format_cents(line.unit_price_cents),
                    format_cents(line.total_cents()?)
                ))
            })
            .collect::<Result<Vec<_>, DomainError>>()?
            .join("\n");
        tokens.insert_markup("LineItems", plain, markup);
        Ok(tokens)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|value| value.text.as_str())
    }
}

/// Escape the markup language's control characters in an interpolated value.
pub fn escape_markup(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\textbackslash{}"),
            '{' | '}' | '$' | '&' | '#' | '_' | '%' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '^' => escaped.push_str("\\textasciicircum{}"),
            '~' => escaped.push_str("\\textasciitilde{}"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Substitute tokens with escaped values for the markup source.
pub fn fill_markup(template: &str, tokens: &TokenSet) -> String {
    substitute(template, |name| {
        tokens.values.get(name).map(|value| match &value.markup {
            Some(markup) => markup.clone(),
            None => escape_markup(&value.text),
        })
    })
}

/// Substitute tokens verbatim, for subjects and file names.
pub fn fill_plain(template: &str, tokens: &TokenSet) -> String {
    substitute(template, |name| tokens.get(name).map(str::to_string))
}

fn substitute(template: &str, mut lookup: impl FnMut(&str) -> Option<String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(TOKEN_OPEN) {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + TOKEN_OPEN.len()..];
        let Some(end) = after_open.find(TOKEN_CLOSE) else {
            output.push_str(&rest[start..]);
            return output;
        };

        let name = &after_open[..end];
        match lookup(name.trim()) {
            Some(value) => output.push_str(&value),
            None => {
                output.push_str(TOKEN_OPEN);
                output.push_str(name);
                output.push_str(TOKEN_CLOSE);
            }
        }
        rest = &after_open[end + TOKEN_CLOSE.len()..];
    }

    output.push_str(rest);
    output
}

/// Slugified attachment name with a forced `.pdf` extension.
pub fn attachment_file_name(rendered: &str) -> String {
    let trimmed = rendered.trim();
    let stem = trimmed
        .strip_suffix(".pdf")
        .or_else(|| trimmed.strip_suffix(".PDF"))
        .unwrap_or(trimmed);
    let slug = slug::slugify(stem);
    if slug.is_empty() {
        format!("{DEFAULT_ATTACHMENT_STEM}.pdf")
    } else {
        format!("{slug}.pdf")
    }
}

/// Fixed-point rendering of a cent amount, e.g. `123456` → `1234.56`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let absolute = cents.unsigned_abs();
    format!("{sign}{}.{:02}", absolute / 100, absolute % 100)
}

/// Clone the template's blobs into the job's input prefix and write the filled main source.
///
/// Returns the blob path of the filled source.
pub(crate) async fn render_markup(
    ctx: &PipelineContext,
    job: &GenerationJobRecord,
    template: &TemplateRecord,
) -> Result<String, PipelineError> {
    let prefix = template
        .source_prefix
        .as_deref()
        .map(|prefix| format!("{}/", prefix.trim_end_matches('/')))
        .ok_or_else(|| DomainError::template(&template.id, "no markup source prefix"))?;
    let input_prefix = job_input_prefix(&job.id);

    let sources = ctx.blobs.list(&prefix).await?;
    for source in &sources {
        let relative = source.strip_prefix(&prefix).unwrap_or(source);
        ctx.blobs
            .copy(source, &format!("{input_prefix}{relative}"))
            .await?;
    }

    let main_path = format!("{input_prefix}{MARKUP_SOURCE}");
    if !sources
        .iter()
        .any(|source| source.strip_prefix(&prefix) == Some(MARKUP_SOURCE))
    {
        return Err(DomainError::template(
            &template.id,
            format!("no {MARKUP_SOURCE} under `{prefix}`"),
        )
        .into());
    }

    let raw = ctx.blobs.get(&main_path).await?;
    let source = String::from_utf8(raw.to_vec()).map_err(|err| {
        DomainError::validation(format!("{main_path} is not valid UTF-8: {err}"))
    })?;

    let tokens = tokens_for(ctx, job).await?;
    let filled = fill_markup(&source, &tokens);
    ctx.blobs.put(&main_path, Bytes::from(filled)).await?;

    info!(
        target = "application::render::markup",
        op = "render_markup",
        job_id = %job.id,
        template_id = %template.id,
        cloned = sources.len(),
        "Markup source filled"
    );

    Ok(main_path)
}

async fn tokens_for(
    ctx: &PipelineContext,
    job: &GenerationJobRecord,
) -> Result<TokenSet, PipelineError> {
    match &job.input {
        JobInput::SheetRow { headers, cells, .. } => Ok(TokenSet::from_row(headers, cells)),
        JobInput::Invoice { invoice_id } => {
            let invoice = ctx
                .invoices
                .find_invoice(*invoice_id)
                .await?
                .ok_or_else(|| PipelineError::upstream_not_found("invoice", invoice_id.to_string()))?;
            Ok(TokenSet::from_invoice(&invoice)?)
        }
    }
}
