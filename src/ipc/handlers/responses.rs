use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

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

fn handle_responses_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let question_id = match required_str(req, "questionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // The submitter must belong to the named group; nominations themselves
    // are validated at analysis time (unknown ids are dropped, not fatal).
    let member: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND group_id = ?",
            (&student_id, &group_id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if member.is_none() {
        return err(&req.id, "not_found", "student not found in group", None);
    }

    let question: Option<i64> = match conn
        .query_row("SELECT 1 FROM questions WHERE id = ?", [&question_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if question.is_none() {
        return err(&req.id, "not_found", "question not found", None);
    }

    let Some(raw_nominated) = req.params.get("nominatedStudentIds").and_then(|v| v.as_array())
    else {
        return err(&req.id, "bad_params", "missing nominatedStudentIds", None);
    };
    let mut nominated: Vec<String> = Vec::with_capacity(raw_nominated.len());
    for v in raw_nominated {
        let Some(s) = v.as_str() else {
            return err(
                &req.id,
                "bad_params",
                "nominatedStudentIds must contain only strings",
                None,
            );
        };
        nominated.push(s.to_string());
    }

    let submitted_at = match req.params.get("submittedAt") {
        None => Utc::now(),
        Some(v) if v.is_null() => Utc::now(),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return err(
                    &req.id,
                    "bad_params",
                    "submittedAt must be an RFC 3339 string",
                    None,
                );
            };
            match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(e) => {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("submittedAt is not valid RFC 3339: {}", e),
                        Some(json!({ "submittedAt": s })),
                    )
                }
            }
        }
    };

    let answer_json = match serde_json::to_string(&nominated) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    // Responses are immutable: a re-submission inserts a new row and the
    // engine resolves the pair last-write-wins by timestamp.
    let response_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO responses(id, student_id, question_id, answer_json, submitted_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &response_id,
            &student_id,
            &question_id,
            &answer_json,
            submitted_at.to_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "responses" })),
        );
    }

    ok(
        &req.id,
        json!({
            "responseId": response_id,
            "submittedAt": submitted_at.to_rfc3339(),
            "nominatedCount": nominated.len()
        }),
    )
}

fn handle_responses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let group: Option<i64> = match conn
        .query_row("SELECT 1 FROM groups WHERE id = ?", [&group_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if group.is_none() {
        return err(&req.id, "not_found", "group not found", None);
    }

    let mut stmt = match conn.prepare(
        "SELECT r.id, r.student_id, r.question_id, r.answer_json, r.submitted_at
         FROM responses r
         JOIN students s ON s.id = r.student_id
         WHERE s.group_id = ?
         ORDER BY r.submitted_at, r.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&group_id], |row| {
            let id: String = row.get(0)?;
            let student_id: String = row.get(1)?;
            let question_id: String = row.get(2)?;
            let answer_json: String = row.get(3)?;
            let submitted_at: String = row.get(4)?;
            Ok((id, student_id, question_id, answer_json, submitted_at))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    let rows = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut responses = Vec::with_capacity(rows.len());
    for (id, student_id, question_id, answer_json, submitted_at) in rows {
        let nominated: Vec<String> = serde_json::from_str(&answer_json).unwrap_or_default();
        responses.push(json!({
            "id": id,
            "studentId": student_id,
            "questionId": question_id,
            "nominatedStudentIds": nominated,
            "submittedAt": submitted_at
        }));
    }

    ok(&req.id, json!({ "responses": responses }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "responses.submit" => Some(handle_responses_submit(state, req)),
        "responses.list" => Some(handle_responses_list(state, req)),
        _ => None,
    }
}
