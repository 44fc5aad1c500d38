use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_sociogramd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn sociogramd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("sociogram-router-smoke");
    let bundle_out = workspace.join("smoke-backup.sgbackup.zip");
    let csv_out = workspace.join("smoke-export.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "3", "institutions.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "institutions.create",
        json!({ "name": "Smoke School" }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "5",
        "groups.create",
        json!({ "name": "Smoke Group" }),
    );
    let group_id = created
        .get("result")
        .and_then(|v| v.get("groupId"))
        .and_then(|v| v.as_str())
        .expect("groupId")
        .to_string();
    let _ = request(&mut stdin, &mut reader, "6", "groups.list", json!({}));

    let created_student = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({
            "groupId": group_id,
            "lastName": "Smoke",
            "firstName": "Student",
            "active": true
        }),
    );
    let student_id = created_student
        .get("result")
        .and_then(|v| v.get("studentId"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "students.list",
        json!({ "groupId": group_id }),
    );
    if !student_id.is_empty() {
        let _ = request(
            &mut stdin,
            &mut reader,
            "8a",
            "students.update",
            json!({
                "groupId": group_id,
                "studentId": student_id,
                "patch": { "firstName": "Updated" }
            }),
        );
    }

    let created_question = request(
        &mut stdin,
        &mut reader,
        "9",
        "questions.create",
        json!({ "position": 1, "text": "Smoke question", "role": "positive" }),
    );
    let question_id = created_question
        .get("result")
        .and_then(|v| v.get("questionId"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let _ = request(&mut stdin, &mut reader, "10", "questions.list", json!({}));
    if !question_id.is_empty() {
        let _ = request(
            &mut stdin,
            &mut reader,
            "10a",
            "questions.setRole",
            json!({ "questionId": question_id, "role": "negative" }),
        );
        if !student_id.is_empty() {
            let _ = request(
                &mut stdin,
                &mut reader,
                "11",
                "responses.submit",
                json!({
                    "groupId": group_id,
                    "studentId": student_id,
                    "questionId": question_id,
                    "nominatedStudentIds": []
                }),
            );
        }
    }
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "responses.list",
        json!({ "groupId": group_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "analysis.group",
        json!({ "groupId": group_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "analysis.setThresholds",
        json!({ "thresholds": { "participation": 0.5 } }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "reports.groupSummaryModel",
        json!({ "groupId": group_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "exchange.exportGroupCsv",
        json!({ "groupId": group_id, "outPath": csv_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle_out.to_string_lossy()
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "inPath": bundle_out.to_string_lossy()
        }),
    );
    if !student_id.is_empty() {
        let _ = request(
            &mut stdin,
            &mut reader,
            "19",
            "students.delete",
            json!({ "groupId": group_id, "studentId": student_id }),
        );
    }
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "groups.delete",
        json!({ "groupId": group_id }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
