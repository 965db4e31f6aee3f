//! Postgres repository guards. These need a database reachable through `DATABASE_URL`.

use docket::{
    application::repos::{
        ClaimResult, ClaimRowParams, FinishJobParams, GenerationJobsRepo, IngestCursorsRepo,
        InvoicesRepo, LeasesRepo, NewJobParams, OutboundEmailsRepo, SourceRowsRepo,
        TemplatesRepo, WorkflowStepsRepo,
    },
    domain::{
        entities::JobInput,
        types::{DocumentKind, ExecutionStrategy},
    },
    infra::db::PostgresRepositories,
};
use serde_json::json;
use sqlx::PgPool;
use time::{OffsetDateTime, macros::datetime};
use uuid::Uuid;

async fn seed_template(pool: &PgPool) {
    sqlx::query(
        "INSERT INTO templates (id, kind, sheet_id, sheet_range, recipient, subject_template, \
         attachment_name_template, allowed_submitters, source_prefix) \
         VALUES ('registration', 'markup', 'sheet-1', 'Form Responses 1!A:C', \
         'office@example.com', 'Registration ((Pet))', '((Name))', \
         ARRAY['vet@example.com'], 'templates/registration')",
    )
    .execute(pool)
    .await
    .expect("seed template");
}

fn job_params(job_id: &str) -> NewJobParams {
    NewJobParams {
        job_id: job_id.to_string(),
        template_id: "registration".to_string(),
        input: JobInput::SheetRow {
            row_offset: 0,
            headers: vec!["Name".into()],
            cells: vec!["Ada".into()],
        },
        strategy: ExecutionStrategy::Polling,
        to_address: "office@example.com".to_string(),
        cc: None,
        subject: "Registration Rex".to_string(),
        attachment_name: "ada.pdf".to_string(),
        body_text: None,
    }
}

fn row_params(job_id: &str, hash: &str) -> ClaimRowParams {
    ClaimRowParams {
        content_hash: hash.to_string(),
        row_offset: 0,
        row_created_at: None,
        job: job_params(job_id),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn template_columns_decode(pool: PgPool) {
    seed_template(&pool).await;
    let repos = PostgresRepositories::new(pool);

    let template = repos
        .find_template("registration")
        .await
        .expect("query")
        .expect("template");

    assert_eq!(template.kind, DocumentKind::Markup);
    assert_eq!(
        template.sheet.as_ref().map(|sheet| sheet.range.as_str()),
        Some("Form Responses 1!A:C")
    );
    assert_eq!(
        template.allowed_submitters,
        Some(vec!["vet@example.com".to_string()])
    );
    assert_eq!(repos.list_sheet_templates().await.expect("list").len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn row_claim_is_unique_per_content_hash(pool: PgPool) {
    seed_template(&pool).await;
    let repos = PostgresRepositories::new(pool);

    let first = repos
        .claim_row(row_params("job-a", "hash-1"))
        .await
        .expect("first claim");
    let second = repos
        .claim_row(row_params("job-b", "hash-1"))
        .await
        .expect("second claim");

    assert_eq!(first, ClaimResult::Claimed { job_id: "job-a".into() });
    assert_eq!(
        second,
        ClaimResult::AlreadyClaimed {
            job_id: Some("job-a".into())
        }
    );
    assert!(repos.find_job("job-b").await.expect("query").is_none());
    assert!(repos.find_email("job-a").await.expect("query").is_some());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn terminal_states_are_stamped_once(pool: PgPool) {
    seed_template(&pool).await;
    let repos = PostgresRepositories::new(pool);
    repos
        .claim_row(row_params("job-a", "hash-1"))
        .await
        .expect("claim");
    assert!(
        repos
            .oldest_deliverable_email(ExecutionStrategy::Polling)
            .await
            .expect("query")
            .is_none()
    );

    let finish = FinishJobParams {
        id: "job-a".into(),
        successful: true,
        artifact_path: Some("jobs/job-a/output/main.pdf".into()),
        processed_at: OffsetDateTime::now_utc(),
    };
    assert!(repos.finish_job(finish.clone()).await.expect("finish"));
    assert!(!repos.finish_job(finish).await.expect("finish again"));
    assert!(
        repos
            .oldest_unprocessed_job(ExecutionStrategy::Polling)
            .await
            .expect("query")
            .is_none()
    );

    let deliverable = repos
        .oldest_deliverable_email(ExecutionStrategy::Polling)
        .await
        .expect("query")
        .expect("deliverable email");
    assert_eq!(deliverable.id, "job-a");

    let now = OffsetDateTime::now_utc();
    assert!(repos.mark_email_processed("job-a", now).await.expect("mark"));
    assert!(!repos.mark_email_processed("job-a", now).await.expect("mark again"));
    assert!(
        repos
            .oldest_deliverable_email(ExecutionStrategy::Polling)
            .await
            .expect("query")
            .is_none()
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn polling_queries_skip_workflow_jobs(pool: PgPool) {
    seed_template(&pool).await;
    let repos = PostgresRepositories::new(pool);
    let mut params = row_params("job-wf", "hash-wf");
    params.job.strategy = ExecutionStrategy::Workflow;
    repos.claim_row(params).await.expect("claim");

    assert!(
        repos
            .oldest_unprocessed_job(ExecutionStrategy::Polling)
            .await
            .expect("query")
            .is_none()
    );
    let owned = repos
        .oldest_unprocessed_job(ExecutionStrategy::Workflow)
        .await
        .expect("query")
        .expect("workflow job");
    assert_eq!(owned.strategy, ExecutionStrategy::Workflow);

    repos
        .finish_job(FinishJobParams {
            id: "job-wf".into(),
            successful: true,
            artifact_path: None,
            processed_at: OffsetDateTime::now_utc(),
        })
        .await
        .expect("finish");
    assert!(
        repos
            .oldest_deliverable_email(ExecutionStrategy::Polling)
            .await
            .expect("query")
            .is_none()
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn lease_advances_only_from_the_observed_timestamp(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let lease = repos.load_lease("row-ingest").await.expect("load");
    assert_eq!(lease.last_executed_at, OffsetDateTime::UNIX_EPOCH);
    assert_eq!(lease.execution_count, 0);

    let now = datetime!(2026-10-19 12:00 UTC);
    assert!(
        repos
            .try_advance_lease("row-ingest", lease.last_executed_at, now)
            .await
            .expect("advance")
    );
    assert!(
        !repos
            .try_advance_lease("row-ingest", lease.last_executed_at, now)
            .await
            .expect("stale advance")
    );

    repos.record_execution("row-ingest").await.expect("record");
    let lease = repos.load_lease("row-ingest").await.expect("reload");
    assert_eq!(lease.last_executed_at, now);
    assert_eq!(lease.execution_count, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn cursors_only_move_forward(pool: PgPool) {
    seed_template(&pool).await;
    let repos = PostgresRepositories::new(pool);

    assert_eq!(repos.next_offset("registration").await.expect("read"), 0);
    repos.advance_past("registration", 0).await.expect("advance");
    repos.advance_past("registration", 0).await.expect("repeat");
    assert_eq!(repos.next_offset("registration").await.expect("read"), 1);
    repos.advance_past("registration", 4).await.expect("jump");
    repos.advance_past("registration", 2).await.expect("behind");
    assert_eq!(repos.next_offset("registration").await.expect("read"), 5);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn first_recorded_step_output_wins(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    repos
        .record_step("row-registration-0", "claim", json!({ "job_id": "job-a" }))
        .await
        .expect("record");
    repos
        .record_step("row-registration-0", "claim", json!({ "job_id": "job-b" }))
        .await
        .expect("record again");

    let step = repos
        .find_step("row-registration-0", "claim")
        .await
        .expect("query")
        .expect("step");
    assert_eq!(step.output["job_id"], "job-a");
    assert!(
        repos
            .find_step("row-registration-0", "render")
            .await
            .expect("query")
            .is_none()
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn invoice_claim_stamps_the_invoice_once(pool: PgPool) {
    seed_template(&pool).await;
    let invoice_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO invoices (id, template_id, number, customer_name, customer_email, issued_on, \
         ready_for_processing) VALUES ($1, 'registration', 'INV-1', 'Ada', 'ada@example.com', \
         '2026-10-01', TRUE)",
    )
    .bind(invoice_id)
    .execute(&pool)
    .await
    .expect("seed invoice");
    for (position, title) in [(2, "Booster"), (1, "Checkup")] {
        sqlx::query(
            "INSERT INTO invoice_lines (id, invoice_id, position, title, quantity, \
             unit_price_cents) VALUES ($1, $2, $3, $4, 1, 1000)",
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(position)
        .bind(title)
        .execute(&pool)
        .await
        .expect("seed line");
    }
    let repos = PostgresRepositories::new(pool);

    let ready = repos
        .oldest_ready_invoice()
        .await
        .expect("query")
        .expect("ready invoice");
    let titles: Vec<_> = ready.lines.iter().map(|line| line.title.as_str()).collect();
    assert_eq!(titles, ["Checkup", "Booster"]);
    assert_eq!(ready.total_cents().expect("total"), 2000);

    let mut job = job_params("job-inv");
    job.input = JobInput::Invoice { invoice_id };
    let claimed = repos
        .claim_invoice(invoice_id, job.clone(), OffsetDateTime::now_utc())
        .await
        .expect("claim");
    job.job_id = "job-inv-2".into();
    let replay = repos
        .claim_invoice(invoice_id, job, OffsetDateTime::now_utc())
        .await
        .expect("replay");

    assert_eq!(claimed, ClaimResult::Claimed { job_id: "job-inv".into() });
    assert_eq!(
        replay,
        ClaimResult::AlreadyClaimed {
            job_id: Some("job-inv".into())
        }
    );
    assert!(repos.oldest_ready_invoice().await.expect("query").is_none());
    assert!(repos.find_job("job-inv-2").await.expect("query").is_none());
}
