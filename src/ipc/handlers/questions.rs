use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::sociometry::QuestionRole;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn handle_questions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

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
        Ok(questions) => ok(&req.id, json!({ "questions": questions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn parse_role_param(
    req: &Request,
    value: Option<&serde_json::Value>,
) -> Result<Option<QuestionRole>, serde_json::Value> {
    match value {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(err(&req.id, "bad_params", "role must be string or null", None));
            };
            match QuestionRole::parse(&s.trim().to_ascii_lowercase()) {
                Some(role) => Ok(Some(role)),
                None => Err(err(
                    &req.id,
                    "bad_params",
                    "role must be one of: positive, negative, aggressor, victim",
                    Some(json!({ "role": s })),
                )),
            }
        }
    }
}

fn handle_questions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let text = match req.params.get("text").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing text", None),
    };
    let position = match req.params.get("position").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing position", None),
    };
    let role = match parse_role_param(req, req.params.get("role")) {
        Ok(v) => v.map(QuestionRole::as_str),
        Err(resp) => return resp,
    };

    let question_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO questions(id, position, text, role) VALUES(?, ?, ?, ?)",
        (&question_id, position, &text, &role),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "questions" })),
        );
    }

    ok(
        &req.id,
        json!({ "questionId": question_id, "position": position, "role": role }),
    )
}

fn handle_questions_set_role(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let question_id = match req.params.get("questionId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing questionId", None),
    };
    let found: Option<i64> = match conn
        .query_row("SELECT 1 FROM questions WHERE id = ?", [&question_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if found.is_none() {
        return err(&req.id, "not_found", "question not found", None);
    }

    let role = match parse_role_param(req, req.params.get("role")) {
        Ok(v) => v.map(QuestionRole::as_str),
        Err(resp) => return resp,
    };

    if let Err(e) = conn.execute(
        "UPDATE questions SET role = ? WHERE id = ?",
        (&role, &question_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "questionId": question_id, "role": role }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "questions.list" => Some(handle_questions_list(state, req)),
        "questions.create" => Some(handle_questions_create(state, req)),
        "questions.setRole" => Some(handle_questions_set_role(state, req)),
        _ => None,
    }
}
