// Human-readable migration overview served at `/status`.

use axum::extract::State;
use axum::response::Html;
use std::fmt::Write;
use std::sync::Arc;

use super::router::AppState;
use crate::core::migration::TableStatus;

pub async fn status_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let statuses = state.migrations.stats_for_all().await;
    Html(render(state.migrations.bucket(), &statuses))
}

fn render(bucket: &str, statuses: &[TableStatus]) -> String {
    let mut rows = String::new();
    for status in statuses {
        let slug = escape(status.table.slug);
        let table = escape(status.table.table);
        match (&status.stats, &status.error) {
            (Some(stats), _) => {
                let class = if stats.pending_migration == 0 { "done" } else { "pending" };
                let _ = write!(
                    rows,
                    r#"<tr class="{class}"><td>{slug}</td><td>{table}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
                    stats.total_rows,
                    stats.rows_with_audio_url,
                    stats.rows_with_bucket_url,
                    stats.pending_migration,
                );
            }
            (None, error) => {
                let error = escape(error.as_deref().unwrap_or("unavailable"));
                let _ = write!(
                    rows,
                    r#"<tr class="error"><td>{slug}</td><td>{table}</td><td colspan="4">{error}</td></tr>"#,
                );
            }
        }
        rows.push('\n');
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Audio migration status</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
table {{ border-collapse: collapse; }}
th, td {{ border: 1px solid #ccc; padding: 0.4rem 0.8rem; text-align: left; }}
tr.done td {{ background: #e8f5e9; }}
tr.pending td {{ background: #fff8e1; }}
tr.error td {{ background: #ffebee; }}
</style>
</head>
<body>
<h1>Audio migration status</h1>
<p>Bucket: <code>{bucket}</code></p>
<table>
<tr><th>Slug</th><th>Table</th><th>Rows</th><th>With audio URL</th><th>Migrated</th><th>Pending</th></tr>
{rows}</table>
</body>
</html>
"#,
        bucket = escape(bucket),
        rows = rows,
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::migration::{AudioTable, MigrationStats};

    #[test]
    fn test_render_marks_pending_and_failed_tables() {
        let statuses = vec![
            TableStatus {
                table: *AudioTable::find("listening_tarea1").unwrap(),
                stats: Some(MigrationStats {
                    total_rows: 10,
                    rows_with_audio_url: 10,
                    rows_with_bucket_url: 4,
                    pending_migration: 6,
                }),
                error: None,
            },
            TableStatus {
                table: *AudioTable::find("oral_tarea2").unwrap(),
                stats: None,
                error: Some("relation <oral_tarea2_solution> does not exist".into()),
            },
        ];

        let html = render("content", &statuses);

        assert!(html.contains(r#"<tr class="pending"><td>listening_tarea1</td>"#));
        assert!(html.contains("<td>6</td>"));
        assert!(html.contains("relation &lt;oral_tarea2_solution&gt; does not exist"));
        assert!(html.contains("<code>content</code>"));
    }
}
