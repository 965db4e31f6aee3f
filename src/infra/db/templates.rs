use std::convert::TryFrom;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, TemplatesRepo},
    domain::{
        entities::{SheetReference, TemplateRecord},
        types::DocumentKind,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const TEMPLATE_COLUMNS: &str = "id, kind, sheet_id, sheet_range, recipient, cc, subject_template, \
     attachment_name_template, body_text, allowed_submitters, source_prefix, created_at";

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: String,
    kind: String,
    sheet_id: Option<String>,
    sheet_range: Option<String>,
    recipient: String,
    cc: Option<String>,
    subject_template: String,
    attachment_name_template: String,
    body_text: Option<String>,
    allowed_submitters: Option<Vec<String>>,
    source_prefix: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<TemplateRow> for TemplateRecord {
    type Error = RepoError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let kind = DocumentKind::try_from(row.kind.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown document kind `{}`", row.kind))
        })?;

        let sheet = match (row.sheet_id, row.sheet_range) {
            (Some(sheet_id), Some(range)) => Some(SheetReference { sheet_id, range }),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            kind,
            sheet,
            recipient: row.recipient,
            cc: row.cc,
            subject_template: row.subject_template,
            attachment_name_template: row.attachment_name_template,
            body_text: row.body_text,
            allowed_submitters: row.allowed_submitters,
            source_prefix: row.source_prefix,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl TemplatesRepo for PostgresRepositories {
    async fn find_template(&self, id: &str) -> Result<Option<TemplateRecord>, RepoError> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = $1");
        sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(TemplateRecord::try_from)
            .transpose()
    }

    async fn list_sheet_templates(&self) -> Result<Vec<TemplateRecord>, RepoError> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE sheet_id IS NOT NULL ORDER BY id"
        );
        sqlx::query_as::<_, TemplateRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(TemplateRecord::try_from)
            .collect()
    }
}
