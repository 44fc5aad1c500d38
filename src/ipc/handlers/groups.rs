use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_groups_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "groups": [] }));
    };

    // Include counts so the dashboard can show data coverage at a glance.
    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = match conn.prepare(
        "SELECT
           g.id,
           g.name,
           g.grade,
           g.institution_id,
           (SELECT COUNT(*) FROM students s WHERE s.group_id = g.id) AS student_count,
           (SELECT COUNT(*) FROM responses r
              JOIN students s ON s.id = r.student_id
             WHERE s.group_id = g.id) AS response_count
         FROM groups g
         ORDER BY g.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let grade: Option<String> = row.get(2)?;
            let institution_id: Option<String> = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let response_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "grade": grade,
                "institutionId": institution_id,
                "studentCount": student_count,
                "responseCount": response_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(groups) => ok(&req.id, json!({ "groups": groups })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let grade = req
        .params
        .get("grade")
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let institution_id = req
        .params
        .get("institutionId")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string());

    if let Some(iid) = institution_id.as_ref() {
        let exists: Option<i64> = match conn
            .query_row("SELECT 1 FROM institutions WHERE id = ?", [iid], |r| {
                r.get(0)
            })
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if exists.is_none() {
            return err(&req.id, "not_found", "institution not found", None);
        }
    }

    let group_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO groups(id, institution_id, name, grade) VALUES(?, ?, ?, ?)",
        (&group_id, &institution_id, &name, &grade),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "groups" })),
        );
    }

    ok(
        &req.id,
        json!({ "groupId": group_id, "name": name, "grade": grade }),
    )
}

fn handle_groups_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let group_id = match req.params.get("groupId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing groupId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM groups WHERE id = ?", [&group_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "group not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    if let Err(e) = tx.execute(
        "DELETE FROM responses
         WHERE student_id IN (SELECT id FROM students WHERE group_id = ?)",
        [&group_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "responses" })),
        );
    }

    if let Err(e) = tx.execute("DELETE FROM students WHERE group_id = ?", [&group_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    if let Err(e) = tx.execute("DELETE FROM groups WHERE id = ?", [&group_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "groups" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "groups.list" => Some(handle_groups_list(state, req)),
        "groups.create" => Some(handle_groups_create(state, req)),
        "groups.delete" => Some(handle_groups_delete(state, req)),
        _ => None,
    }
}
