//! Programmatic composition of registration documents from a sheet row.

use bytes::Bytes;
use tracing::info;

use crate::{
    application::{
        error::PipelineError,
        pipeline::context::PipelineContext,
        ports::{ComposeError, ComposedDocument, ComposedField},
        render::{COMPOSED_ARTIFACT, RenderOutcome, finalize_job, job_output_prefix},
    },
    domain::{
        entities::{GenerationJobRecord, JobInput, TemplateRecord},
        error::DomainError,
        types::DocumentKind,
    },
};

/// Separator used when several adjacent columns form one field.
const MERGE_SEPARATOR: &str = ", ";

/// A labelled field built from one or more adjacent columns.
#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    label: &'static str,
    columns: &'static [usize],
}

const CANINE_FIELDS: &[FieldSpec] = &[
    FieldSpec { label: "Owner", columns: &[2] },
    FieldSpec { label: "Phone", columns: &[3] },
    FieldSpec { label: "Dog name", columns: &[4] },
    FieldSpec { label: "Breed", columns: &[5] },
    FieldSpec { label: "Sex", columns: &[6] },
    FieldSpec { label: "Date of birth", columns: &[7] },
    FieldSpec { label: "Colour", columns: &[8] },
    FieldSpec { label: "Address", columns: &[9, 10, 11, 12] },
    FieldSpec { label: "Notes", columns: &[13] },
];

const EQUINE_FIELDS: &[FieldSpec] = &[
    FieldSpec { label: "Owner", columns: &[2] },
    FieldSpec { label: "Horse name", columns: &[3] },
    FieldSpec { label: "Breed", columns: &[4] },
    FieldSpec { label: "Height", columns: &[5] },
    FieldSpec { label: "Sex", columns: &[6] },
    FieldSpec { label: "Foaling date", columns: &[7] },
    FieldSpec { label: "Markings", columns: &[8, 9, 10, 11] },
    FieldSpec { label: "Microchip", columns: &[12] },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeVariant {
    Canine,
    Equine,
}

impl ComposeVariant {
    pub fn for_kind(kind: DocumentKind) -> Option<Self> {
        match kind {
            DocumentKind::Canine => Some(ComposeVariant::Canine),
            DocumentKind::Equine => Some(ComposeVariant::Equine),
            DocumentKind::Markup => None,
        }
    }

    fn title(self) -> &'static str {
        match self {
            ComposeVariant::Canine => "Canine registration",
            ComposeVariant::Equine => "Equine registration",
        }
    }

    fn fields(self) -> &'static [FieldSpec] {
        match self {
            ComposeVariant::Canine => CANINE_FIELDS,
            ComposeVariant::Equine => EQUINE_FIELDS,
        }
    }

    /// Column holding the submitter identity checked against the allow-list.
    pub fn submitter_column(self) -> usize {
        1
    }

    /// Map a row onto the variant's layout. Missing trailing columns contribute nothing.
    pub fn compose(self, cells: &[String]) -> ComposedDocument {
        let fields = self
            .fields()
            .iter()
            .filter_map(|spec| {
                let value = spec
                    .columns
                    .iter()
                    .filter_map(|column| cells.get(*column))
                    .map(|cell| cell.trim())
                    .filter(|cell| !cell.is_empty())
                    .collect::<Vec<_>>()
                    .join(MERGE_SEPARATOR);
                (!value.is_empty()).then(|| ComposedField {
                    label: spec.label.to_string(),
                    value,
                })
            })
            .collect();

        ComposedDocument {
            title: self.title().to_string(),
            fields,
        }
    }
}

/// Allow-list outcome for a row's submitter identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitterCheck {
    /// No allow-list configured, or no identity on the row.
    Unchecked,
    Permitted,
    Denied { submitter: String },
}

/// Fail open on a missing identity, closed on a present but unlisted one.
pub fn check_submitter(allowed: Option<&[String]>, submitter: Option<&str>) -> SubmitterCheck {
    let Some(allowed) = allowed else {
        return SubmitterCheck::Unchecked;
    };
    let Some(submitter) = submitter.map(str::trim).filter(|value| !value.is_empty()) else {
        return SubmitterCheck::Unchecked;
    };

    if allowed
        .iter()
        .any(|entry| entry.trim().eq_ignore_ascii_case(submitter))
    {
        SubmitterCheck::Permitted
    } else {
        SubmitterCheck::Denied {
            submitter: submitter.to_string(),
        }
    }
}

pub(crate) async fn render_composed(
    ctx: &PipelineContext,
    job: &GenerationJobRecord,
    template: &TemplateRecord,
    variant: ComposeVariant,
) -> Result<RenderOutcome, PipelineError> {
    let JobInput::SheetRow { cells, .. } = &job.input else {
        return Err(
            DomainError::template(&template.id, "composed documents need a sheet row").into(),
        );
    };

    let submitter = cells.get(variant.submitter_column()).map(String::as_str);
    if let SubmitterCheck::Denied { submitter } =
        check_submitter(template.allowed_submitters.as_deref(), submitter)
    {
        finalize_job(ctx, job, false, None).await?;
        ctx.emails
            .mark_email_processed(&job.id, time::OffsetDateTime::now_utc())
            .await?;
        info!(
            target = "application::render::compose",
            op = "render_composed",
            result = "rejected",
            job_id = %job.id,
            submitter = %submitter,
            "Submitter not on allow-list; job closed without a document"
        );
        return Ok(RenderOutcome::Rejected { submitter });
    }

    let document = variant.compose(cells);
    let composer = ctx.composer.clone();
    let pdf = tokio::task::spawn_blocking(move || composer.render_pdf(&document))
        .await
        .map_err(|err| ComposeError::Render(format!("composition task failed: {err}")))??;

    let artifact_path = format!("{}{COMPOSED_ARTIFACT}", job_output_prefix(&job.id));
    let size = pdf.len();
    ctx.blobs.put(&artifact_path, Bytes::from(pdf)).await?;
    finalize_job(ctx, job, true, Some(artifact_path.clone())).await?;

    info!(
        target = "application::render::compose",
        op = "render_composed",
        result = "composed",
        job_id = %job.id,
        artifact = %artifact_path,
        size_bytes = size as u64,
        "Composed document uploaded"
    );

    Ok(RenderOutcome::Composed { artifact_path })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| cell.to_string()).collect()
    }

    #[test]
    fn canine_layout_merges_address_columns() {
        let cells = row(&[
            "10/19/2026 14:03:22",
            "owner@example.com",
            "Ada",
            "555-0100",
            "Rex",
            "Collie",
            "M",
            "2024-01-02",
            "Sable",
            "1 Main St",
            "",
            "Springfield",
            "12345",
            "Friendly",
        ]);

        let document = ComposeVariant::Canine.compose(&cells);
        assert_eq!(document.title, "Canine registration");
        let address = document
            .fields
            .iter()
            .find(|field| field.label == "Address")
            .expect("address field");
        assert_eq!(address.value, "1 Main St, Springfield, 12345");
        assert_eq!(document.fields.len(), 9);
    }

    #[test]
    fn short_rows_drop_missing_trailing_fields() {
        let cells = row(&["ts", "who", "Ada", "Star", "Arabian"]);
        let document = ComposeVariant::Equine.compose(&cells);
        let labels: Vec<_> = document.fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["Owner", "Horse name", "Breed"]);
    }

    #[test]
    fn allow_list_fails_open_on_missing_identity_and_closed_on_unknown() {
        let allowed = vec!["Vet@Example.com ".to_string()];
        assert_eq!(check_submitter(None, Some("x@example.com")), SubmitterCheck::Unchecked);
        assert_eq!(check_submitter(Some(&allowed), None), SubmitterCheck::Unchecked);
        assert_eq!(check_submitter(Some(&allowed), Some("  ")), SubmitterCheck::Unchecked);
        assert_eq!(
            check_submitter(Some(&allowed), Some(" vet@example.COM")),
            SubmitterCheck::Permitted
        );
        assert_eq!(
            check_submitter(Some(&allowed), Some("intruder@example.com")),
            SubmitterCheck::Denied {
                submitter: "intruder@example.com".into()
            }
        );
    }

    #[test]
    fn markup_templates_have_no_composition_variant() {
        assert_eq!(ComposeVariant::for_kind(DocumentKind::Markup), None);
        assert_eq!(
            ComposeVariant::for_kind(DocumentKind::Equine),
            Some(ComposeVariant::Equine)
        );
    }
}
