
use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

#[test]
fn group_csv_export_writes_one_row_per_student() {
    let workspace = temp_dir("sociogram-csv-export");
    let out_path = workspace.join("exports/group.csv");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let group = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "groups.create",
        json!({ "name": "CSV Group" }),
    );
    let group_id = group
        .get("groupId")
        .and_then(|v| v.as_str())
        .expect("groupId")
        .to_string();

    let mut ids = Vec::new();
    for (i, last) in ["Quinn, Jr", "Reyes"].iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({ "groupId": group_id, "lastName": last, "firstName": "Sam" }),
        );
        ids.push(
            created
                .get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string(),
        );
    }
    let question = request_ok(
        &mut stdin,
        &mut reader,
        "q",
        "questions.create",
        json!({ "position": 1, "text": "Pick a friend", "role": "positive" }),
    );
    let question_id = question
        .get("questionId")
        .and_then(|v| v.as_str())
        .expect("questionId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r",
        "responses.submit",
        json!({
            "groupId": group_id,
            "studentId": ids[0],
            "questionId": question_id,
            "nominatedStudentIds": [ids[1]]
        }),
    );

    let export = request_ok(
        &mut stdin,
        &mut reader,
        "x",
        "exchange.exportGroupCsv",
        json!({ "groupId": group_id, "outPath": out_path.to_string_lossy() }),
    );
    assert_eq!(export.get("rowCount").and_then(|v| v.as_u64()), Some(2));

    let text = std::fs::read_to_string(&out_path).expect("read exported csv");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("student_id,display_name,sociometric_status"));
    // The comma inside the display name must be quoted.
    assert!(text.contains("\"Quinn, Jr, Sam\""));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
