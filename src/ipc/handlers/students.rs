use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
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

fn group_exists(
    conn: &Connection,
    req: &Request,
    group_id: &str,
) -> Result<(), serde_json::Value> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM groups WHERE id = ?", [group_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    if found.is_none() {
        return Err(err(&req.id, "not_found", "group not found", None));
    }
    Ok(())
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = group_exists(conn, req, &group_id) {
        return resp;
    }

    let mut stmt = match conn.prepare(
        "SELECT id, last_name, first_name, document_no, active, sort_order
         FROM students
         WHERE group_id = ?
         ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&group_id], |row| {
            let id: String = row.get(0)?;
            let last: String = row.get(1)?;
            let first: String = row.get(2)?;
            let document_no: Option<String> = row.get(3)?;
            let active: i64 = row.get(4)?;
            let sort_order: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "lastName": last,
                "firstName": first,
                "displayName": format!("{}, {}", last, first),
                "documentNo": document_no,
                "active": active != 0,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = group_exists(conn, req, &group_id) {
        return resp;
    }

    let last_name = match required_str(req, "lastName") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    if last_name.is_empty() || first_name.is_empty() {
        return err(&req.id, "bad_params", "names must not be empty", None);
    }
    let document_no = req
        .params
        .get("documentNo")
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let next_sort: i64 = match conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE group_id = ?",
            [&group_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v.unwrap_or(0),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let student_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, group_id, last_name, first_name, document_no, active, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &group_id,
            &last_name,
            &first_name,
            &document_no,
            active as i64,
            next_sort,
            &now,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "displayName": format!("{}, {}", last_name, first_name),
            "sortOrder": next_sort
        }),
    )
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let found: Option<i64> = match conn
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
    if found.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch object", None);
    };

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<rusqlite::types::Value> = Vec::new();
    for (key, value) in patch {
        match key.as_str() {
            "firstName" => {
                let Some(s) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "firstName must be non-empty", None);
                };
                sets.push("first_name = ?");
                values.push(rusqlite::types::Value::Text(s.to_string()));
            }
            "lastName" => {
                let Some(s) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "lastName must be non-empty", None);
                };
                sets.push("last_name = ?");
                values.push(rusqlite::types::Value::Text(s.to_string()));
            }
            "documentNo" => {
                sets.push("document_no = ?");
                match value.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                    Some(s) => values.push(rusqlite::types::Value::Text(s.to_string())),
                    None => values.push(rusqlite::types::Value::Null),
                }
            }
            "active" => {
                let Some(b) = value.as_bool() else {
                    return err(&req.id, "bad_params", "active must be boolean", None);
                };
                sets.push("active = ?");
                values.push(rusqlite::types::Value::Integer(b as i64));
            }
            other => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown patch field: {}", other),
                    None,
                );
            }
        }
    }
    if sets.is_empty() {
        return err(&req.id, "bad_params", "patch must not be empty", None);
    }

    sets.push("updated_at = ?");
    values.push(rusqlite::types::Value::Text(Utc::now().to_rfc3339()));
    values.push(rusqlite::types::Value::Text(student_id.clone()));

    let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
    if let Err(e) = conn.execute(&sql, rusqlite::params_from_iter(values)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let found: Option<i64> = match conn
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
    if found.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Their own submissions go with them. Nominations of this student left
    // inside other students' answers stay stored; the analysis engine drops
    // them as unknown ids.
    if let Err(e) = tx.execute("DELETE FROM responses WHERE student_id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "responses" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
