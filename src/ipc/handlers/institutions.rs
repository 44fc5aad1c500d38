use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_institutions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "institutions": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           i.id,
           i.name,
           (SELECT COUNT(*) FROM groups g WHERE g.institution_id = i.id) AS group_count
         FROM institutions i
         ORDER BY i.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let group_count: i64 = row.get(2)?;
            Ok(json!({
                "id": id,
                "name": name,
                "groupCount": group_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(institutions) => ok(&req.id, json!({ "institutions": institutions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_institutions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let institution_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO institutions(id, name) VALUES(?, ?)",
        (&institution_id, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "institutions" })),
        );
    }

    ok(
        &req.id,
        json!({ "institutionId": institution_id, "name": name }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "institutions.list" => Some(handle_institutions_list(state, req)),
        "institutions.create" => Some(handle_institutions_create(state, req)),
        _ => None,
    }
}
