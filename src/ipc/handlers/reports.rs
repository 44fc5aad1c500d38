use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use super::analysis;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Display model for the staff dashboard / PDF layer: group metadata, the
/// questionnaire with its role mapping, and the full analysis output. The
/// renderer takes this as-is; no computation happens on the UI side.
fn handle_group_summary_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let group_row: Option<(String, Option<String>, Option<String>)> = match conn
        .query_row(
            "SELECT g.name, g.grade, i.name
             FROM groups g
             LEFT JOIN institutions i ON i.id = g.institution_id
             WHERE g.id = ?",
            [&group_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((group_name, grade, institution_name)) = group_row else {
        return err(&req.id, "not_found", "group not found", None);
    };

    let questions = {
        let mut stmt = match conn.prepare(
            "SELECT id, position, text, role FROM questions ORDER BY position",
        ) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let position: i64 = row.get(1)?;
                let text: String = row.get(2)?;
                let role: Option<String> = row.get(3)?;
                Ok(json!({
                    "id": id,
                    "position": position,
                    "text": text,
                    "role": role
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        match rows {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let (group_analysis, thresholds) =
        match analysis::compute_group_analysis(conn, &group_id, req.params.get("options")) {
            Ok(v) => v,
            Err(e) => return err(&req.id, &e.code, e.message, e.details),
        };

    ok(
        &req.id,
        json!({
            "group": {
                "id": group_id,
                "name": group_name,
                "grade": grade,
                "institutionName": institution_name
            },
            "questions": questions,
            "thresholds": thresholds,
            "perStudent": group_analysis.per_student,
            "summary": group_analysis.summary
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.groupSummaryModel" => Some(handle_group_summary_model(state, req)),
        _ => None,
    }
}
