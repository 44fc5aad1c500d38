use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::sociometry::{
    self, analyze_group, AnalysisError, GroupAnalysis, QuestionRole, ResponseRecord,
    RosterStudent, Thresholds,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

pub const THRESHOLDS_SETTING_KEY: &str = "analysis.thresholds";

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

fn analysis_err_response(req: &Request, e: AnalysisError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

/// Roster provider: the group's students in roster order. Inactive students
/// stay in the roster — they can still be nominated by peers.
pub(super) fn load_roster(
    conn: &Connection,
    group_id: &str,
) -> Result<Vec<RosterStudent>, AnalysisError> {
    let group: Option<i64> = conn
        .query_row("SELECT 1 FROM groups WHERE id = ?", [group_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| AnalysisError::new("db_query_failed", e.to_string()))?;
    if group.is_none() {
        return Err(AnalysisError::new("not_found", "group not found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, last_name, first_name
             FROM students
             WHERE group_id = ?
             ORDER BY sort_order",
        )
        .map_err(|e| AnalysisError::new("db_query_failed", e.to_string()))?;
    stmt.query_map([group_id], |r| {
        let last: String = r.get(1)?;
        let first: String = r.get(2)?;
        Ok(RosterStudent {
            id: r.get(0)?,
            display_name: format!("{}, {}", last, first),
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| AnalysisError::new("db_query_failed", e.to_string()))
}

/// Response provider: all stored submissions for the group, oldest first so
/// equal-timestamp duplicates resolve toward the later insert.
pub(super) fn load_responses(
    conn: &Connection,
    group_id: &str,
) -> Result<Vec<ResponseRecord>, AnalysisError> {
    let mut stmt = conn
        .prepare(
            "SELECT r.student_id, r.question_id, r.answer_json, r.submitted_at
             FROM responses r
             JOIN students s ON s.id = r.student_id
             WHERE s.group_id = ?
             ORDER BY r.submitted_at, r.rowid",
        )
        .map_err(|e| AnalysisError::new("db_query_failed", e.to_string()))?;
    let rows = stmt
        .query_map([group_id], |r| {
            let student_id: String = r.get(0)?;
            let question_id: String = r.get(1)?;
            let answer_json: String = r.get(2)?;
            let submitted_at: String = r.get(3)?;
            Ok((student_id, question_id, answer_json, submitted_at))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| AnalysisError::new("db_query_failed", e.to_string()))?;

    let mut out = Vec::with_capacity(rows.len());
    for (student_id, question_id, answer_json, submitted_at) in rows {
        let nominated: Vec<String> = serde_json::from_str(&answer_json).map_err(|e| {
            AnalysisError::new("malformed_response", format!("invalid answer payload: {}", e))
                .with_details(json!({ "studentId": student_id }))
        })?;
        let submitted_at = DateTime::parse_from_rfc3339(&submitted_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                AnalysisError::new(
                    "malformed_response",
                    format!("invalid submission timestamp: {}", e),
                )
                .with_details(json!({ "studentId": student_id }))
            })?;
        out.push(ResponseRecord {
            student_id,
            question_id,
            nominated,
            submitted_at,
        });
    }
    Ok(out)
}

/// The administrator-maintained question-to-role mapping. Questions with a
/// NULL role are simply absent from the map.
pub(super) fn load_question_roles(
    conn: &Connection,
) -> Result<HashMap<String, QuestionRole>, AnalysisError> {
    let mut stmt = conn
        .prepare("SELECT id, role FROM questions WHERE role IS NOT NULL")
        .map_err(|e| AnalysisError::new("db_query_failed", e.to_string()))?;
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let role: String = r.get(1)?;
            Ok((id, role))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| AnalysisError::new("db_query_failed", e.to_string()))?;

    let mut out = HashMap::with_capacity(rows.len());
    for (id, raw) in rows {
        let Some(role) = QuestionRole::parse(&raw) else {
            // A bad role value is a configuration defect, not survey data;
            // skipping it matches the unmapped-question rule.
            continue;
        };
        out.insert(id, role);
    }
    Ok(out)
}

/// Defaults, overridden by the persisted workspace setting, overridden by
/// the request's `options.thresholds`.
pub(super) fn resolve_thresholds(
    conn: &Connection,
    options: Option<&serde_json::Value>,
) -> Result<Thresholds, AnalysisError> {
    let mut thresholds = Thresholds::default();

    let persisted = db::settings_get_json(conn, THRESHOLDS_SETTING_KEY)
        .map_err(|e| AnalysisError::new("db_query_failed", e.to_string()))?;
    thresholds = sociometry::parse_threshold_overrides(thresholds, persisted.as_ref())?;

    let request_overrides = options.and_then(|o| o.get("thresholds"));
    sociometry::parse_threshold_overrides(thresholds, request_overrides)
}

pub(super) fn compute_group_analysis(
    conn: &Connection,
    group_id: &str,
    options: Option<&serde_json::Value>,
) -> Result<(GroupAnalysis, Thresholds), AnalysisError> {
    let roster = load_roster(conn, group_id)?;
    let responses = load_responses(conn, group_id)?;
    let question_roles = load_question_roles(conn)?;
    let thresholds = resolve_thresholds(conn, options)?;
    let analysis = analyze_group(&roster, &responses, &question_roles, &thresholds)?;
    Ok((analysis, thresholds))
}

fn handle_analysis_group(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let (analysis, thresholds) =
        match compute_group_analysis(conn, &group_id, req.params.get("options")) {
            Ok(v) => v,
            Err(e) => return analysis_err_response(req, e),
        };

    ok(
        &req.id,
        json!({
            "groupId": group_id,
            "thresholds": thresholds,
            "perStudent": analysis.per_student,
            "summary": analysis.summary
        }),
    )
}

fn handle_analysis_student(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let (analysis, thresholds) =
        match compute_group_analysis(conn, &group_id, req.params.get("options")) {
            Ok(v) => v,
            Err(e) => return analysis_err_response(req, e),
        };

    let Some(student) = analysis
        .per_student
        .iter()
        .find(|s| s.student_id == student_id)
    else {
        return err(&req.id, "not_found", "student not found in group", None);
    };

    ok(
        &req.id,
        json!({
            "groupId": group_id,
            "thresholds": thresholds,
            "student": student,
            "groupSummary": analysis.summary
        }),
    )
}

fn handle_analysis_set_thresholds(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let raw = req.params.get("thresholds");
    if raw.map(|v| v.is_null()).unwrap_or(true) {
        // Clearing the setting restores the built-in defaults.
        if let Err(e) = conn.execute(
            "DELETE FROM settings WHERE key = ?",
            [THRESHOLDS_SETTING_KEY],
        ) {
            return err(&req.id, "db_delete_failed", e.to_string(), None);
        }
        return ok(&req.id, json!({ "thresholds": Thresholds::default() }));
    }

    // Validate against the defaults before persisting the raw overrides.
    let merged = match sociometry::parse_threshold_overrides(Thresholds::default(), raw) {
        Ok(v) => v,
        Err(e) => return analysis_err_response(req, e),
    };
    let Some(raw) = raw else {
        return err(&req.id, "bad_params", "missing thresholds", None);
    };
    if let Err(e) = db::settings_set_json(conn, THRESHOLDS_SETTING_KEY, raw) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "thresholds": merged }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analysis.group" => Some(handle_analysis_group(state, req)),
        "analysis.student" => Some(handle_analysis_student(state, req)),
        "analysis.setThresholds" => Some(handle_analysis_set_thresholds(state, req)),
        _ => None,
    }
}
